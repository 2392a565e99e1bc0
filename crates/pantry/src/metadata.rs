//! Cookbook metadata and its compiled form.
//!
//! Each cookbook carries `metadata.toml`. Right before upload it is compiled
//! into `metadata.json`, the representation the store expects. The compiled
//! file only exists for the duration of one upload attempt: [`compile`]
//! returns a [`CompiledMetadata`] guard that deletes it when dropped.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use pantry_types::{Dependency, ResolvedCookbook};
use serde::{Deserialize, Serialize};

use crate::error::PantryError;

/// Source metadata file name
pub const SOURCE_FILE: &str = "metadata.toml";

/// Compiled metadata file name
pub const COMPILED_FILE: &str = "metadata.json";

/// Metadata as written by the cookbook author.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CookbookMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub maintainer_email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub platforms: BTreeMap<String, String>,
    #[serde(default)]
    pub recipes: BTreeMap<String, String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl CookbookMetadata {
    /// Load `metadata.toml` from a cookbook directory.
    pub fn load(cookbook_dir: &Path) -> Result<Self> {
        let path = cookbook_dir.join(SOURCE_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// The document written to `metadata.json`.
///
/// Every descriptive field is present; older store protocol versions reject
/// documents with missing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledDocument {
    pub name: String,
    pub version: String,
    pub maintainer: String,
    pub maintainer_email: String,
    pub description: String,
    pub long_description: String,
    pub license: String,
    pub platforms: BTreeMap<String, String>,
    pub dependencies: BTreeMap<String, String>,
    pub recipes: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl CompiledDocument {
    /// Fill absent optional fields with empty placeholders. Dependencies
    /// always come from the lockfile, not the author's metadata.
    pub fn with_defaults(meta: CookbookMetadata, dependencies: &[Dependency]) -> Self {
        Self {
            name: meta.name,
            version: meta.version,
            maintainer: meta.maintainer.unwrap_or_default(),
            maintainer_email: meta.maintainer_email.unwrap_or_default(),
            description: meta.description.unwrap_or_default(),
            long_description: meta.long_description.unwrap_or_default(),
            license: meta.license.unwrap_or_default(),
            platforms: meta.platforms,
            dependencies: dependencies
                .iter()
                .map(|d| (d.name.clone(), d.constraint.clone()))
                .collect(),
            recipes: meta.recipes,
            attributes: meta.attributes,
        }
    }
}

/// Owns a compiled `metadata.json` on disk; removes it on drop.
#[derive(Debug)]
pub struct CompiledMetadata {
    path: PathBuf,
}

impl CompiledMetadata {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the compiled document back as JSON.
    pub fn read_json(path: &Path) -> Result<serde_json::Value> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read compiled metadata {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse compiled metadata {}", path.display()))
    }
}

impl Drop for CompiledMetadata {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Compile a cookbook's metadata into `metadata.json` inside its directory.
///
/// Refuses to overwrite a `metadata.json` it did not create.
pub fn compile(cookbook: &ResolvedCookbook) -> Result<CompiledMetadata, PantryError> {
    write_compiled(cookbook).map_err(|source| PantryError::Metadata {
        name: cookbook.name.clone(),
        source,
    })
}

fn write_compiled(cookbook: &ResolvedCookbook) -> Result<CompiledMetadata> {
    let meta = CookbookMetadata::load(&cookbook.path)?;
    if meta.name != cookbook.name || meta.version != cookbook.version {
        bail!(
            "{} declares {}@{}, lockfile expects {}",
            SOURCE_FILE,
            meta.name,
            meta.version,
            cookbook.label()
        );
    }

    let path = cookbook.path.join(COMPILED_FILE);
    if path.exists() {
        bail!(
            "{} already exists; remove it so pantry can compile metadata",
            path.display()
        );
    }

    let doc = CompiledDocument::with_defaults(meta, &cookbook.dependencies);
    let json = serde_json::to_string_pretty(&doc).context("failed to serialize metadata")?;

    // Guard before writing so a partial write is removed too.
    let guard = CompiledMetadata { path };
    fs::write(&guard.path, json)
        .with_context(|| format!("failed to write {}", guard.path.display()))?;
    Ok(guard)
}
