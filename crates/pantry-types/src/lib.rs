//! Core domain types for pantry.
//!
//! This crate provides the types shared across the pantry workspace:
//! cookbook records from the lockfile, resolved cookbooks, upload options
//! and per-cookbook outcomes.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Constraint recorded for a dependency that did not declare one.
pub const DEFAULT_CONSTRAINT: &str = ">= 0.0.0";

/// A single declared dependency of a cookbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Dependency cookbook name
    pub name: String,
    /// Version constraint as written in the lockfile (opaque to pantry)
    #[serde(default = "default_constraint")]
    pub constraint: String,
}

fn default_constraint() -> String {
    DEFAULT_CONSTRAINT.to_string()
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: default_constraint(),
        }
    }
}

/// Graph lookup result: a cookbook and its direct dependencies in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookbookRecord {
    pub name: String,
    pub dependencies: Vec<Dependency>,
}

impl CookbookRecord {
    /// Dependency names in declared order.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|d| d.name.as_str())
    }

    pub fn is_leaf(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// A cookbook materialized from the lockfile, ready to validate and upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCookbook {
    pub name: String,
    pub version: String,
    /// Cookbook directory on disk
    pub path: PathBuf,
    pub dependencies: Vec<Dependency>,
    /// Whether the store reports this version as frozen. Only authoritative
    /// after the store has answered an upload for it.
    #[serde(default)]
    pub frozen: bool,
    /// Compiled metadata file; present only while an upload attempt is running.
    #[serde(skip)]
    pub compiled_metadata: Option<PathBuf>,
}

impl ResolvedCookbook {
    /// `name@version`, used in log lines and error messages.
    pub fn label(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Why a cookbook was skipped instead of uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The store already holds this version and it is frozen
    AlreadyFrozen,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyFrozen => write!(f, "already frozen"),
        }
    }
}

/// Result of processing one cookbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded,
    Skipped { reason: SkipReason },
    /// Never recorded by the upload engine: a fatal error ends its run with
    /// `Err` instead. For callers that keep their own per-cookbook summaries
    /// across failed runs.
    Failed { message: String },
}

impl UploadOutcome {
    pub fn short(&self) -> &'static str {
        match self {
            UploadOutcome::Uploaded => "uploaded",
            UploadOutcome::Skipped { .. } => "skipped",
            UploadOutcome::Failed { .. } => "failed",
        }
    }
}

/// A cookbook the pipeline finished with, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedCookbook {
    pub cookbook: ResolvedCookbook,
    pub outcome: UploadOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u128,
}

/// Flags forwarded to the store with each upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadFlags {
    /// Overwrite even if the store has the version frozen
    pub force: bool,
    /// Ask the store to freeze the version once uploaded
    pub freeze: bool,
}

/// Upload run options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOptions {
    pub force: bool,
    pub freeze: bool,
    pub halt_on_frozen: bool,
    pub validate: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            force: false,
            freeze: true,
            halt_on_frozen: false,
            validate: true,
        }
    }
}

impl UploadOptions {
    /// Build options from a flat mapping, normalizing each key first.
    ///
    /// Keys not present keep their defaults; unrecognized keys are an error.
    pub fn from_flat<I, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, bool)>,
        K: AsRef<str>,
    {
        let mut opts = Self::default();
        for (key, value) in pairs {
            let normalized = normalize_option_key(key.as_ref());
            match normalized.as_str() {
                "force" => opts.force = value,
                "freeze" => opts.freeze = value,
                "halt_on_frozen" => opts.halt_on_frozen = value,
                "validate" => opts.validate = value,
                _ => bail!("unknown upload option: {}", key.as_ref()),
            }
        }
        Ok(opts)
    }

    pub fn flags(&self) -> UploadFlags {
        UploadFlags {
            force: self.force,
            freeze: self.freeze,
        }
    }
}

/// Normalize an option key to `snake_case`.
///
/// `-` and spaces become `_`, and a lower-to-upper case boundary starts a new word,
/// so `halt-on-frozen`, `HaltOnFrozen` and `HALT_ON_FROZEN` all map to `halt_on_frozen`.
pub fn normalize_option_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.trim().chars() {
        if c == '-' || c == ' ' || c == '_' {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        out.extend(c.to_lowercase());
    }
    out
}
