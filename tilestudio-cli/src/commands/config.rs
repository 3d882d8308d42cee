//! Configuration CLI commands.
//!
//! Provides `config path`, `config init` and `config show`.

use clap::Subcommand;
use tilestudio::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Write a default configuration file if none exists
    Init,

    /// Print the effective configuration
    Show,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
        ConfigCommands::Init => {
            let path = ConfigFile::ensure_exists()?;
            println!("Configuration file: {}", path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = ConfigFile::load()?;
            print!("{}", render(&config));
            Ok(())
        }
    }
}

/// Formats the effective settings, one `[section]` block each.
fn render(config: &ConfigFile) -> String {
    let sections: [(&str, Vec<(&str, String)>); 5] = [
        ("server", vec![("bind", config.server.bind.to_string())]),
        (
            "tiles",
            vec![
                ("cache_max_age", config.tiles.cache_max_age.to_string()),
                ("grid_max_age", config.tiles.grid_max_age.to_string()),
            ],
        ),
        (
            "static",
            vec![
                ("pixel_limit", config.static_maps.pixel_limit.to_string()),
                ("workers", config.static_maps.workers.to_string()),
                ("jpeg_quality", config.static_maps.jpeg_quality.to_string()),
            ],
        ),
        ("ledger", vec![("capacity", config.ledger.capacity.to_string())]),
        (
            "logging",
            vec![
                ("directory", config.logging.directory.display().to_string()),
                ("file", config.logging.file.clone()),
            ],
        ),
    ];

    let mut out = String::new();
    for (i, (section, keys)) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("[{}]\n", section));
        for (key, value) in keys {
            out.push_str(&format!("  {} = {}\n", key, value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_defaults() {
        let out = render(&ConfigFile::default());
        assert!(out.starts_with("[server]\n  bind = 127.0.0.1:3000\n"));
        assert!(out.contains("[static]\n  pixel_limit = 400000000\n"));
        assert!(out.contains("  capacity = 32\n"));
    }
}
