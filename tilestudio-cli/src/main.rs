//! Tilestudio CLI - serve tiles and static maps from the command line.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::serve::ServeArgs;

#[derive(Parser)]
#[command(name = "tilestudio")]
#[command(version = tilestudio::VERSION)]
#[command(about = "Serve map tiles and static map images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP tile server
    Serve(ServeArgs),

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve(args) => commands::serve::run(args),
        Command::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
