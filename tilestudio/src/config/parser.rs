//! INI parsing: `Ini` → [`ConfigFile`].
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::{ConfigFile, ConfigFileError};

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses `section.key` with `FromStr`, reporting `reason` on failure.
fn parse_value<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    match props.get(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, v, reason)),
    }
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [server] section
    if let Some(section) = ini.section(Some("server")) {
        if let Some(bind) = parse_value(section, "server", "bind", "expected host:port")? {
            config.server.bind = bind;
        }
    }

    // [tiles] section
    if let Some(section) = ini.section(Some("tiles")) {
        if let Some(v) = parse_value(
            section,
            "tiles",
            "cache_max_age",
            "must be a non-negative integer (seconds)",
        )? {
            config.tiles.cache_max_age = v;
        }
        if let Some(v) = parse_value(
            section,
            "tiles",
            "grid_max_age",
            "must be a non-negative integer (seconds)",
        )? {
            config.tiles.grid_max_age = v;
        }
    }

    // [static] section
    if let Some(section) = ini.section(Some("static")) {
        if let Some(v) = parse_value::<u64>(
            section,
            "static",
            "pixel_limit",
            "must be a positive integer (pixels)",
        )? {
            if v == 0 {
                return Err(invalid(
                    "static",
                    "pixel_limit",
                    "0",
                    "must be a positive integer (pixels)",
                ));
            }
            config.static_maps.pixel_limit = v;
        }
        if let Some(v) = parse_value::<usize>(
            section,
            "static",
            "workers",
            "must be a positive integer",
        )? {
            if v == 0 {
                return Err(invalid("static", "workers", "0", "must be a positive integer"));
            }
            config.static_maps.workers = v;
        }
        if let Some(v) = parse_value::<u8>(
            section,
            "static",
            "jpeg_quality",
            "must be between 1 and 100",
        )? {
            if !(1..=100).contains(&v) {
                return Err(invalid(
                    "static",
                    "jpeg_quality",
                    &v.to_string(),
                    "must be between 1 and 100",
                ));
            }
            config.static_maps.jpeg_quality = v;
        }
    }

    // [ledger] section
    if let Some(section) = ini.section(Some("ledger")) {
        if let Some(v) = parse_value::<usize>(
            section,
            "ledger",
            "capacity",
            "must be a positive integer",
        )? {
            if v == 0 {
                return Err(invalid("ledger", "capacity", "0", "must be a positive integer"));
            }
            config.ledger.capacity = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory").map(str::trim) {
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file").map(str::trim) {
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
