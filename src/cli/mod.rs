//! Command-line interface for distpack
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build`: Bundle every input once per bundle type
//! - `init`: Write a default distpack.toml

mod build;
mod init;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use build::{BuildCommand, BuildOptions};
pub use init::InitCommand;

/// distpack - bundles a multi-entry component library into dist/
#[derive(Parser, Debug)]
#[command(name = "distpack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to distpack.toml config file
    #[arg(short, long, global = true, default_value = "distpack.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clean the output directory and build every bundle
    Build(BuildCommand),

    /// Write a distpack.toml with the default configuration
    Init(InitCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
            Commands::Init(cmd) => cmd.execute().await,
        }
    }
}

/// Print the distpack banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "📦".cyan(),
        "distpack".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
