//! Release packaging — stage a filtered copy of the project tree, then
//! compress it into a gzip tar archive with a SHA-256 sidecar.
//!
//! Staging always happens first, into an isolated temp directory: the
//! archive is built from an immutable snapshot, so a concurrently edited
//! project tree can never produce a torn read. If compression still
//! fails, one retry runs against the same snapshot before giving up.

pub mod exclude;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

pub use exclude::{DEFAULT_EXCLUDES, ExclusionSet};

use crate::error::PackageError;

/// Default archive file name, written under the project root.
pub const DEFAULT_ARCHIVE_NAME: &str = "release.tar.gz";

/// Inputs for one packaging run.
pub struct PackageOptions {
    /// Project root to snapshot.
    pub root: PathBuf,
    /// Where the archive is written.
    pub output: PathBuf,
    /// Patterns removed from the deployable set.
    pub excludes: ExclusionSet,
}

impl PackageOptions {
    /// Options for `root` with the default output path and exclusions.
    #[must_use]
    pub fn for_root(root: PathBuf) -> Self {
        let output = root.join(DEFAULT_ARCHIVE_NAME);
        Self {
            root,
            output,
            excludes: ExclusionSet::defaults(),
        }
    }
}

/// Result of a packaging run.
#[derive(Debug)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Hex SHA-256 of the archive file.
    pub sha256: String,
    /// Number of files in the archive.
    pub entries: usize,
    /// Total uncompressed bytes staged.
    pub bytes: u64,
}

/// Package the project tree into a compressed archive.
///
/// # Errors
///
/// Returns an error if the root is missing, staging fails, or
/// compression fails twice.
pub fn package(opts: &PackageOptions) -> Result<ArchiveSummary> {
    if !opts.root.is_dir() {
        return Err(PackageError::RootNotFound(opts.root.display().to_string()).into());
    }
    // Absolute paths throughout, so the walk can recognize (and skip) a
    // previous archive sitting at the output path inside the tree.
    let root = std::path::absolute(&opts.root)
        .with_context(|| format!("resolving {}", opts.root.display()))?;
    let output = std::path::absolute(&opts.output)
        .with_context(|| format!("resolving {}", opts.output.display()))?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let staging = tempfile::tempdir().context("creating staging directory")?;
    anyhow::ensure!(
        !output.starts_with(staging.path()),
        "archive output must not live inside the staging directory"
    );

    let files = stage(&root, staging.path(), &output, &opts.excludes)?;
    let bytes = files
        .iter()
        .map(|rel| staging.path().join(rel).metadata().map(|m| m.len()))
        .sum::<std::io::Result<u64>>()
        .context("sizing staged files")?;

    // The snapshot is immutable, so a second attempt can only fail for
    // environmental reasons (disk full, permissions) — after that, abort
    // without leaving a partial archive behind.
    if let Err(first) = compress(staging.path(), &files, &output) {
        let _ = std::fs::remove_file(&output);
        if let Err(second) = compress(staging.path(), &files, &output) {
            let _ = std::fs::remove_file(&output);
            return Err(PackageError::Archive(format!("{first:#}; retry: {second:#}")).into());
        }
    }

    let sha256 = sha256_file(&output)?;
    write_sidecar(&output, &sha256)?;

    Ok(ArchiveSummary {
        path: output,
        sha256,
        entries: files.len(),
        bytes,
    })
}

/// Copy the filtered file set into `staging`, returning sorted
/// root-relative paths. Excluded directories are pruned during the walk
/// so their contents are never even visited.
fn stage(
    root: &Path,
    staging: &Path,
    output: &Path,
    excludes: &ExclusionSet,
) -> Result<Vec<PathBuf>> {
    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e, excludes));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| PackageError::Staging(format!("reading tree: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        // Never sweep a previous archive (or its sidecar) into the new one.
        if entry.path() == output || entry.path().extension().is_some_and(|e| e == "sha256") {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| PackageError::Staging(format!("path outside root: {}", entry.path().display())))?
            .to_path_buf();
        let dest = staging.join(&rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::copy(entry.path(), &dest)
            .with_context(|| format!("staging {}", entry.path().display()))?;
        files.push(rel);
    }
    files.sort();
    Ok(files)
}

fn is_excluded(entry: &walkdir::DirEntry, excludes: &ExclusionSet) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| excludes.matches(name))
}

/// Write `files` from `staging` into a gzip tar at `output`, in sorted
/// order so repeated runs over an unchanged tree agree on membership.
fn compress(staging: &Path, files: &[PathBuf], output: &Path) -> Result<()> {
    let file = std::fs::File::create(output)
        .with_context(|| format!("creating {}", output.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for rel in files {
        builder
            .append_path_with_name(staging.join(rel), rel)
            .with_context(|| format!("archiving {}", rel.display()))?;
    }
    builder
        .into_inner()
        .context("finalizing tar stream")?
        .finish()
        .context("finalizing gzip stream")?;
    Ok(())
}

/// Hex SHA-256 of a file, streamed in 64 KiB chunks.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file.read(&mut buf).context("reading archive")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Lowercase hex encoding.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::new(), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Write the `sha256sum`-compatible sidecar next to the archive.
fn write_sidecar(output: &Path, sha256: &str) -> Result<()> {
    let mut sidecar = output.as_os_str().to_owned();
    sidecar.push(".sha256");
    let sidecar = PathBuf::from(sidecar);
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    std::fs::write(&sidecar, format!("{sha256}  {name}\n"))
        .with_context(|| format!("writing {}", sidecar.display()))
}
