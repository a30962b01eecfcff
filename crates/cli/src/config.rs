//! Command-line configuration.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use corelib::Config;
use tracing::{debug, Level};

use crate::commands::Command;

/// Drive the completion-event and handle-resolution paths from the shell.
#[derive(Parser, Debug)]
#[command(name = "portals", version, about)]
pub struct CliConfig {
    /// JSON configuration file; defaults apply to anything it omits.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Level,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn run(self) -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(self.log_level)
            .with_target(false)
            .init();

        let settings = self.load()?;
        debug!(?settings, "effective configuration");

        let result = self.command.execute(&settings)?;
        println!("{}", result);
        Ok(())
    }

    /// Load the configuration file, or defaults when none was given.
    pub fn load(&self) -> anyhow::Result<Config> {
        match &self.config {
            Some(path) => Config::from_path(path)
                .with_context(|| format!("loading {}", path.display())),
            None => Ok(Config::default()),
        }
    }
}
