//! `relay package` — build the release archive without deploying it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::output::OutputContext;
use crate::packager::{self, DEFAULT_ARCHIVE_NAME, ExclusionSet, PackageOptions};

/// Arguments for the package command.
#[derive(Args)]
pub struct PackageArgs {
    /// Project root to package
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Output archive path (default: <root>/release.tar.gz)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Additional exclusion pattern (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,
}

/// Run `relay package`.
///
/// # Errors
///
/// Returns an error if the archive cannot be produced.
pub fn run(ctx: &OutputContext, args: &PackageArgs, json: bool) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.root.join(DEFAULT_ARCHIVE_NAME));
    let opts = PackageOptions {
        root: args.root.clone(),
        output,
        excludes: ExclusionSet::defaults_with(&args.exclude),
    };
    let summary = packager::package(&opts)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "archive": summary.path.display().to_string(),
                "sha256": summary.sha256,
                "entries": summary.entries,
                "bytes": summary.bytes,
            })
        );
    } else {
        ctx.success("Release archive ready.");
        ctx.kv("Archive", &summary.path.display().to_string());
        ctx.kv("Digest", &summary.sha256);
        ctx.kv("Files", &summary.entries.to_string());
    }
    Ok(())
}
