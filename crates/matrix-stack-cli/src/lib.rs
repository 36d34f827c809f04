//! matrix-stack-verify CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Consistency checks for rendered matrix-stack manifests
#[derive(Parser, Debug)]
#[command(name = "matrix-stack-verify")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to $MATRIX_STACK_VERIFY_CONFIG, then
    /// ./matrix-stack-verify.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify a rendered chart
    Check(commands::check::CheckArgs),
    /// Inspect the chart's deployables
    Topology(commands::topology::TopologyArgs),
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        let config = config::load_config(config::resolve_config_path(self.config.as_deref()))?;
        match self.command {
            Commands::Check(args) => commands::check::run(args, &config),
            Commands::Topology(args) => commands::topology::run(args, &config),
        }
    }
}
