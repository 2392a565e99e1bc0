use std::fmt;
use std::path::PathBuf;

/// Errors that end a pantry run.
///
/// A frozen conflict is only an error when `halt_on_frozen` is set; otherwise
/// the engine records it as a skip and never constructs this type for it.
#[derive(Debug, thiserror::Error)]
pub enum PantryError {
    #[error("cookbook not found in lockfile: {name}")]
    UnknownPackage { name: String },

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error("{name}@{version}: version is already frozen on the store")]
    FrozenPackage { name: String, version: String },

    #[error("{name}@{version}: upload failed")]
    Upload {
        name: String,
        version: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to load lockfile {}", .path.display())]
    Lockfile {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{name}: failed to compile metadata")]
    Metadata {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to connect to the cookbook store")]
    Store(#[source] anyhow::Error),
}

/// One problem found in a cookbook's local artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// `name@version` of the offending cookbook
    pub cookbook: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cookbook, self.message)
    }
}

/// Every issue found across a batch. Never empty when returned as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed ({} issue(s))", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  - {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}
