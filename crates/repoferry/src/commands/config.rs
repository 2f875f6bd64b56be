//! Config command implementation.

use anyhow::{Context, Result};

use repoferry_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let config = super::load_config();
            let content = config.to_toml().context("Failed to render configuration")?;
            println!("# {}", Config::config_path().display());
            println!("# run directory: {}", config.run_dir().display());
            println!();
            print!("{}", content);
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }
    }
    Ok(())
}
