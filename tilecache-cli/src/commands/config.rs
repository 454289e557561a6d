//! Configuration file commands.

use std::path::Path;

use clap::Subcommand;
use tilecache::config::ConfigFile;

use crate::error::CliError;

/// Config action subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the path of the config file in use
    Path,
    /// Write a default config file if none exists
    Init,
}

/// Run a config subcommand against `path`.
pub fn run(action: ConfigAction, path: &Path) -> Result<(), CliError> {
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Init => {
            if path.exists() {
                println!("Config file already exists: {}", path.display());
                return Ok(());
            }
            ConfigFile::default().save_to(path)?;
            println!("Created config file: {}", path.display());
            Ok(())
        }
    }
}
