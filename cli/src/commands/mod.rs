//! Command implementations

pub mod deploy;
pub mod package;
pub mod status;
pub mod version;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::Defaults;
use crate::deploy::DeploySettings;
use crate::deploy::health::ProbeSettings;

/// Fallback SSH user (cloud VM convention).
pub const DEFAULT_USER: &str = "ubuntu";
/// Fallback port the deployed service listens on.
pub const DEFAULT_SERVICE_PORT: u16 = 8000;
/// Fallback remote directory for the deployment slots.
pub const DEFAULT_REMOTE_ROOT: &str = "/opt/outfit-api";
/// Fallback systemd unit name.
pub const DEFAULT_UNIT: &str = "outfit-api";

/// Connection flags shared by `deploy` and `status`.
#[derive(Args, Default)]
pub struct ConnectionArgs {
    /// Remote host address
    #[arg(long)]
    pub host: Option<String>,

    /// SSH user
    #[arg(long)]
    pub user: Option<String>,

    /// Path to the SSH identity file
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// SSH port
    #[arg(long)]
    pub ssh_port: Option<u16>,

    /// Port the service listens on (health probe target)
    #[arg(long)]
    pub port: Option<u16>,

    /// Remote directory holding the deployment slots
    #[arg(long)]
    pub remote_root: Option<String>,

    /// systemd unit name of the service
    #[arg(long)]
    pub unit: Option<String>,
}

/// Merge connection flags with config-file defaults. Flags win; host and
/// key have no built-in fallback and are required.
///
/// # Errors
///
/// Returns an error when the host or key is missing from both sources.
pub fn resolve_connection(args: &ConnectionArgs, defaults: &Defaults) -> Result<DeploySettings> {
    let host = args
        .host
        .clone()
        .or_else(|| defaults.host.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "missing remote host: pass --host or set defaults.host in ~/.relay/config.yaml"
            )
        })?;
    let key_path = args
        .key
        .clone()
        .or_else(|| defaults.key.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "missing SSH key: pass --key or set defaults.key in ~/.relay/config.yaml"
            )
        })?;

    Ok(DeploySettings {
        host,
        user: args
            .user
            .clone()
            .or_else(|| defaults.user.clone())
            .unwrap_or_else(|| DEFAULT_USER.to_string()),
        key_path,
        ssh_port: args.ssh_port.unwrap_or(22),
        service_port: args.port.or(defaults.port).unwrap_or(DEFAULT_SERVICE_PORT),
        remote_root: args
            .remote_root
            .clone()
            .or_else(|| defaults.remote_root.clone())
            .unwrap_or_else(|| DEFAULT_REMOTE_ROOT.to_string()),
        unit: args
            .unit
            .clone()
            .or_else(|| defaults.unit.clone())
            .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        domain: defaults.domain.clone(),
        credential: None,
        skip_runtime: false,
        skip_proxy: false,
        skip_certs: false,
        probe: ProbeSettings::default(),
    })
}
