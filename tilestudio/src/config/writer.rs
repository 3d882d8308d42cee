//! INI serialization: [`ConfigFile`] → commented `config.ini` text.

use super::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[server]
; Address the HTTP server listens on
bind = {}

[tiles]
; Cache lifetime of tiles, in seconds (default: 3600)
cache_max_age = {}
; Cache lifetime of UTFGrids, in seconds (default: 86400)
grid_max_age = {}

[static]
; Maximum output pixels (width x height x scale^2) of a static map
; (default: 400000000, a 20000 x 20000 image)
pixel_limit = {}
; Concurrent tile fetches per static map (default: 8)
workers = {}
; JPEG quality when a request names none, 1-100 (default: 80)
jpeg_quality = {}

[ledger]
; Render errors remembered per style (default: 32)
capacity = {}

[logging]
; Directory for log files (default: ~/.tilestudio/logs)
directory = {}
; Log file name (default: tilestudio.log)
file = {}
"#,
        config.server.bind,
        config.tiles.cache_max_age,
        config.tiles.grid_max_age,
        config.static_maps.pixel_limit,
        config.static_maps.workers,
        config.static_maps.jpeg_quality,
        config.ledger.capacity,
        config.logging.directory.display(),
        config.logging.file,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_every_section() {
        let content = to_config_string(&ConfigFile::default());
        for section in ["[server]", "[tiles]", "[static]", "[ledger]", "[logging]"] {
            assert!(content.contains(section), "missing {}", section);
        }
        assert!(content.contains("bind = 127.0.0.1:3000"));
        assert!(content.contains("grid_max_age = 86400"));
    }
}
