//! `relay deploy` — package the project and roll it out to the remote
//! host with rollback on failure.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::commands::{ConnectionArgs, resolve_connection};
use crate::config;
use crate::deploy::health::{HttpProbe, ProbeSettings};
use crate::deploy::{self, DeploySettings};
use crate::output::OutputContext;
use crate::packager::{self, PackageOptions};
use crate::remote::{SshRemote, SshTarget};
use crate::state::StateManager;

/// Arguments for the deploy command.
#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Credential written to the service's runtime env file
    #[arg(long = "api-key", env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Public domain for the reverse proxy (enables proxy and cert stages)
    #[arg(long)]
    pub domain: Option<String>,

    /// Skip the Python runtime install on the remote host
    #[arg(long)]
    pub skip_runtime: bool,

    /// Skip reverse-proxy setup
    #[arg(long)]
    pub skip_proxy: bool,

    /// Skip certificate issuance
    #[arg(long)]
    pub skip_certs: bool,

    /// Project root to package
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Deploy a pre-built archive instead of packaging
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Health probe attempts
    #[arg(long, default_value_t = 10)]
    pub probe_attempts: u32,

    /// Seconds between health probe attempts
    #[arg(long, default_value_t = 5)]
    pub probe_delay: u64,
}

/// Assemble deploy settings from flags and the config file.
///
/// # Errors
///
/// Returns an error when a required value is missing from both sources.
pub fn resolve_settings(args: &DeployArgs, defaults: &config::Defaults) -> Result<DeploySettings> {
    let mut settings = resolve_connection(&args.connection, defaults)?;
    settings.domain = args.domain.clone().or(settings.domain);
    settings.credential = args.api_key.clone();
    settings.skip_runtime = args.skip_runtime;
    settings.skip_proxy = args.skip_proxy;
    settings.skip_certs = args.skip_certs;
    settings.probe = ProbeSettings {
        attempts: args.probe_attempts,
        delay: Duration::from_secs(args.probe_delay),
    };
    Ok(settings)
}

/// Run `relay deploy`.
///
/// # Errors
///
/// Returns an error if packaging fails or any deploy stage ends the run
/// in a failed state.
pub async fn run(ctx: &OutputContext, args: &DeployArgs, json: bool) -> Result<()> {
    let file = config::load(&config::config_path()?)?;
    let settings = resolve_settings(args, &file.defaults)?;

    let (archive_path, sha256) = match &args.archive {
        Some(path) => {
            let sha = packager::sha256_file(path)
                .with_context(|| format!("hashing {}", path.display()))?;
            (path.clone(), sha)
        }
        None => {
            ctx.stage("Packaging release");
            let summary = packager::package(&PackageOptions::for_root(args.root.clone()))?;
            ctx.kv("Archive", &summary.path.display().to_string());
            ctx.kv("Files", &summary.entries.to_string());
            (summary.path, summary.sha256)
        }
    };

    let remote = SshRemote::new(SshTarget {
        host: settings.host.clone(),
        user: settings.user.clone(),
        key_path: settings.key_path.clone(),
        ssh_port: settings.ssh_port,
    });
    let probe = HttpProbe {
        settings: settings.probe,
    };
    let state_mgr = StateManager::new()?;

    deploy::run_deploy(
        &remote,
        &probe,
        &settings,
        &archive_path,
        &sha256,
        &state_mgr,
        ctx,
    )
    .await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": "active",
                "host": settings.host,
                "sha256": sha256,
            })
        );
    }
    Ok(())
}
