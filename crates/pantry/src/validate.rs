//! Pre-upload validation of cookbook artifacts on disk.

use std::fs;
use std::path::Path;

use pantry_types::ResolvedCookbook;

use crate::error::{ValidationFailure, ValidationIssue};
use crate::files::{cookbook_files, slash_path};
use crate::metadata::{COMPILED_FILE, CookbookMetadata, SOURCE_FILE};

/// Checks a whole batch of cookbooks before anything is uploaded.
pub trait Validator {
    /// `Ok` only if every cookbook passes. Implementations should report all
    /// issues they find rather than stopping at the first.
    fn validate_all(&self, cookbooks: &[ResolvedCookbook]) -> Result<(), ValidationFailure>;
}

/// Validator that inspects each cookbook directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemValidator;

impl Validator for FilesystemValidator {
    fn validate_all(&self, cookbooks: &[ResolvedCookbook]) -> Result<(), ValidationFailure> {
        let mut issues = Vec::new();
        for cb in cookbooks {
            for message in check_cookbook(cb) {
                issues.push(ValidationIssue {
                    cookbook: cb.label(),
                    message,
                });
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailure { issues })
        }
    }
}

fn check_cookbook(cb: &ResolvedCookbook) -> Vec<String> {
    if !cb.path.is_dir() {
        return vec![format!("cookbook directory not found: {}", cb.path.display())];
    }

    let mut problems = Vec::new();

    if !cb.path.join(SOURCE_FILE).is_file() {
        problems.push(format!("{SOURCE_FILE} is missing"));
    } else {
        match CookbookMetadata::load(&cb.path) {
            Ok(meta) => {
                if meta.name != cb.name {
                    problems.push(format!(
                        "{SOURCE_FILE} name {:?} does not match lockfile name {:?}",
                        meta.name, cb.name
                    ));
                }
                if meta.version != cb.version {
                    problems.push(format!(
                        "{SOURCE_FILE} version {} does not match lockfile version {}",
                        meta.version, cb.version
                    ));
                }
            }
            Err(e) => problems.push(format!("{e:#}")),
        }
    }

    if cb.path.join(COMPILED_FILE).exists() {
        problems.push(format!(
            "stale {COMPILED_FILE} present; pantry compiles it during upload"
        ));
    }

    let files = match cookbook_files(&cb.path) {
        Ok(files) => files,
        Err(e) => {
            problems.push(format!("{e:#}"));
            return problems;
        }
    };

    for rel in files {
        let shown = slash_path(&rel);
        if has_bad_name(&rel) {
            problems.push(format!("{shown}: file name contains whitespace or control characters"));
            continue;
        }
        if rel == Path::new(SOURCE_FILE) {
            continue;
        }
        if let Some(problem) = check_syntax(&cb.path.join(&rel)) {
            problems.push(format!("{shown}: {problem}"));
        }
    }

    problems
}

fn has_bad_name(rel: &Path) -> bool {
    rel.components().any(|c| {
        c.as_os_str()
            .to_string_lossy()
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control())
    })
}

/// Structured files must parse; everything else is taken as-is.
fn check_syntax(path: &Path) -> Option<String> {
    let ext = path.extension().and_then(|e| e.to_str())?;
    if ext != "json" && ext != "toml" {
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return Some(format!("unreadable: {e}")),
    };
    match ext {
        "json" => serde_json::from_str::<serde_json::Value>(&content)
            .err()
            .map(|e| format!("invalid JSON: {e}")),
        _ => toml::from_str::<toml::Table>(&content)
            .err()
            .map(|e| format!("invalid TOML: {}", e.message())),
    }
}
