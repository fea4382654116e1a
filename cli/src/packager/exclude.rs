//! Exclusion patterns for archive membership.
//!
//! Two pattern forms: exact path-component names (`.git`, `__pycache__`)
//! and `*.suffix` globs (`*.pyc`). A name pattern excludes a whole
//! directory subtree when it matches a directory component.

/// Patterns excluded from every archive: version-control metadata,
/// dependency and compiled caches, logs, editor swap files, prior
/// archives, and secret/credential files.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    "node_modules",
    ".venv",
    "venv",
    ".DS_Store",
    ".env",
    "*.pyc",
    "*.pyo",
    "*.log",
    "*.swp",
    "*.swo",
    "*.tar.gz",
    "*.tgz",
    "*.pem",
];

/// Compiled set of exclusion patterns.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    names: Vec<String>,
    suffixes: Vec<String>,
}

impl ExclusionSet {
    /// Build a set from raw patterns. `*`-prefixed patterns become
    /// suffix matches; everything else matches a component name exactly.
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = Vec::new();
        let mut suffixes = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if let Some(suffix) = pattern.strip_prefix('*') {
                suffixes.push(suffix.to_string());
            } else {
                names.push(pattern.to_string());
            }
        }
        Self { names, suffixes }
    }

    /// The default exclusion set.
    #[must_use]
    pub fn defaults() -> Self {
        Self::new(DEFAULT_EXCLUDES.iter().copied())
    }

    /// The default set extended with additional patterns.
    #[must_use]
    pub fn defaults_with<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::defaults();
        let extended = Self::new(extra);
        set.names.extend(extended.names);
        set.suffixes.extend(extended.suffixes);
        set
    }

    /// Whether a single file or directory name matches the set.
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        self.names.iter().any(|n| n == file_name)
            || self.suffixes.iter().any(|s| file_name.ends_with(s.as_str()))
    }
}
