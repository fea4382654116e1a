//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::output::OutputContext;

/// Package and roll out releases to a remote host
#[derive(Parser)]
#[command(
    name = "relay",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the release archive
    Package(commands::package::PackageArgs),

    /// Package and deploy to the remote host
    Deploy(commands::deploy::DeployArgs),

    /// Show remote deployment state
    Status(commands::status::StatusArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            no_color,
            quiet,
            json,
            command,
        } = self;
        // JSON mode keeps stdout machine-readable.
        let ctx = OutputContext::new(no_color, quiet || json);
        match command {
            Command::Version => {
                commands::version::run(json);
                Ok(())
            }
            Command::Package(args) => commands::package::run(&ctx, &args, json),
            Command::Deploy(args) => commands::deploy::run(&ctx, &args, json).await,
            Command::Status(args) => commands::status::run(&ctx, &args, json).await,
        }
    }
}
