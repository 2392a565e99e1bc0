//! Lockfile loading (`Pantry.lock`).
//!
//! The lockfile is the source of truth for which cookbook versions exist and
//! what each one depends on. Resolution already happened when it was written;
//! pantry only reads it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use pantry_types::{CookbookRecord, Dependency, ResolvedCookbook};
use serde::{Deserialize, Serialize};

use crate::closure::DependencyGraph;
use crate::error::PantryError;

/// Default lockfile name
pub const LOCKFILE_NAME: &str = "Pantry.lock";

/// Access to resolved cookbooks by name.
pub trait Lockfile: DependencyGraph {
    /// Names the project declares directly, in declared order.
    fn root_names(&self) -> Vec<String>;

    /// Materialize one cookbook.
    fn retrieve(&self, name: &str) -> Result<ResolvedCookbook, PantryError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LockDocument {
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default, rename = "cookbook")]
    cookbooks: Vec<LockedCookbook>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockedCookbook {
    name: String,
    version: String,
    path: PathBuf,
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

/// TOML lockfile on disk.
#[derive(Debug, Clone)]
pub struct TomlLockfile {
    path: PathBuf,
    roots: Vec<String>,
    cookbooks: BTreeMap<String, LockedCookbook>,
}

impl TomlLockfile {
    /// Read and parse a lockfile. Relative cookbook paths are resolved
    /// against the lockfile's directory.
    pub fn load(path: &Path) -> Result<Self, PantryError> {
        let parsed = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))
            .and_then(|content| {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                Self::parse(&content, base)
            })
            .map_err(|source| PantryError::Lockfile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            ..parsed
        })
    }

    /// Parse lockfile content; `base_dir` anchors relative cookbook paths.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let doc: LockDocument = toml::from_str(content).context("invalid lockfile TOML")?;

        let mut cookbooks = BTreeMap::new();
        for mut cb in doc.cookbooks {
            if cb.path.is_relative() {
                cb.path = base_dir.join(&cb.path);
            }
            let name = cb.name.clone();
            if cookbooks.insert(name.clone(), cb).is_some() {
                bail!("cookbook {name} is listed more than once");
            }
        }

        Ok(Self {
            path: base_dir.join(LOCKFILE_NAME),
            roots: doc.dependencies,
            cookbooks,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.cookbooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookbooks.is_empty()
    }

    fn locked(&self, name: &str) -> Result<&LockedCookbook, PantryError> {
        self.cookbooks
            .get(name)
            .ok_or_else(|| PantryError::UnknownPackage {
                name: name.to_string(),
            })
    }
}

impl DependencyGraph for TomlLockfile {
    fn find(&self, name: &str) -> Result<CookbookRecord, PantryError> {
        let cb = self.locked(name)?;
        Ok(CookbookRecord {
            name: cb.name.clone(),
            dependencies: cb.dependencies.clone(),
        })
    }
}

impl Lockfile for TomlLockfile {
    fn root_names(&self) -> Vec<String> {
        self.roots.clone()
    }

    fn retrieve(&self, name: &str) -> Result<ResolvedCookbook, PantryError> {
        let cb = self.locked(name)?;
        Ok(ResolvedCookbook {
            name: cb.name.clone(),
            version: cb.version.clone(),
            path: cb.path.clone(),
            dependencies: cb.dependencies.clone(),
            frozen: false,
            compiled_metadata: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use pantry_types::DEFAULT_CONSTRAINT;
    use tempfile::tempdir;

    use super::*;
    use crate::closure::resolve_closure;

    const SAMPLE: &str = r#"
dependencies = ["app", "web"]

[[cookbook]]
name = "app"
version = "1.2.0"
path = "cookbooks/app"
dependencies = [{ name = "users" }, { name = "base", constraint = "~> 2.0" }]

[[cookbook]]
name = "users"
version = "0.4.1"
path = "cookbooks/users"
dependencies = [{ name = "base" }]

[[cookbook]]
name = "base"
version = "2.1.0"
path = "/opt/cookbooks/base"

[[cookbook]]
name = "web"
version = "0.3.0"
path = "cookbooks/web"
"#;

    #[test]
    fn parse_reads_roots_and_cookbooks() {
        let lock = TomlLockfile::parse(SAMPLE, Path::new("/project")).expect("parse");
        assert_eq!(lock.root_names(), vec!["app", "web"]);
        assert_eq!(lock.len(), 4);
        assert!(!lock.is_empty());
    }

    #[test]
    fn relative_paths_are_anchored_to_base_dir() {
        let lock = TomlLockfile::parse(SAMPLE, Path::new("/project")).expect("parse");
        let app = lock.retrieve("app").expect("app");
        assert_eq!(app.path, Path::new("/project").join("cookbooks/app"));
        assert_eq!(app.version, "1.2.0");
        assert!(!app.frozen);
        assert!(app.compiled_metadata.is_none());

        let base = lock.retrieve("base").expect("base");
        assert_eq!(base.path, PathBuf::from("/opt/cookbooks/base"));
    }

    #[test]
    fn find_keeps_declared_dependency_order_and_constraints() {
        let lock = TomlLockfile::parse(SAMPLE, Path::new(".")).expect("parse");
        let record = lock.find("app").expect("app");
        assert_eq!(record.dependency_names().collect::<Vec<_>>(), vec!["users", "base"]);
        assert_eq!(record.dependencies[0].constraint, DEFAULT_CONSTRAINT);
        assert_eq!(record.dependencies[1].constraint, "~> 2.0");
        assert!(lock.find("base").expect("base").is_leaf());
    }

    #[test]
    fn closure_over_lockfile_roots() {
        let lock = TomlLockfile::parse(SAMPLE, Path::new(".")).expect("parse");
        let order = resolve_closure(&lock, &lock.root_names()).expect("order");
        assert_eq!(order, vec!["base", "users", "app", "web"]);
    }

    #[test]
    fn unknown_names_are_reported() {
        let lock = TomlLockfile::parse(SAMPLE, Path::new(".")).expect("parse");
        assert!(matches!(
            lock.retrieve("ghost"),
            Err(PantryError::UnknownPackage { ref name }) if name == "ghost"
        ));
        assert!(matches!(
            lock.find("ghost"),
            Err(PantryError::UnknownPackage { .. })
        ));
    }

    #[test]
    fn duplicate_cookbooks_are_rejected() {
        let content = r#"
[[cookbook]]
name = "a"
version = "1.0.0"
path = "a"

[[cookbook]]
name = "a"
version = "1.0.1"
path = "a2"
"#;
        let err = TomlLockfile::parse(content, Path::new(".")).expect_err("dup");
        assert!(err.to_string().contains("listed more than once"));
    }

    #[test]
    fn load_reports_path_on_failure() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join(LOCKFILE_NAME);
        std::fs::write(&path, "dependencies = [").expect("write");

        let err = TomlLockfile::load(&path).expect_err("invalid");
        assert!(matches!(err, PantryError::Lockfile { .. }));
        assert!(err.to_string().contains(LOCKFILE_NAME));
    }

    #[test]
    fn load_from_disk() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join(LOCKFILE_NAME);
        std::fs::write(&path, SAMPLE).expect("write");

        let lock = TomlLockfile::load(&path).expect("load");
        assert_eq!(lock.path(), path.as_path());
        assert_eq!(
            lock.retrieve("web").expect("web").path,
            td.path().join("cookbooks/web")
        );
    }

    #[test]
    fn empty_lockfile_has_no_roots() {
        let lock = TomlLockfile::parse("", Path::new(".")).expect("parse");
        assert!(lock.is_empty());
        assert!(lock.root_names().is_empty());
    }
}
