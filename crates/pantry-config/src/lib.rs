//! Configuration file handling for pantry.
//!
//! This crate provides configuration loading from `.pantry.toml` files
//! with support for merging with CLI arguments and defaults.
//!
//! # Example
//!
//! ```
//! use pantry_config::{find_config, load_config_from_file};
//! use std::path::Path;
//!
//! // Nearest .pantry.toml at or above the current directory
//! if let Some(path) = find_config(Path::new(".")) {
//!     let config = load_config_from_file(&path).expect("load config");
//!     if let Some(url) = config.store_url() {
//!         println!("Store: {}", url);
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use pantry_types::{UploadOptions, normalize_option_key};
use serde::{Deserialize, Serialize};

/// Default configuration file name
pub const CONFIG_FILE: &str = ".pantry.toml";

/// Default lockfile name, relative to the config file's directory
pub const DEFAULT_LOCKFILE: &str = "Pantry.lock";

/// Get the config file path for a directory
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Complete pantry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store connection settings
    #[serde(default)]
    store: StoreConfig,
    /// Upload options as a flat mapping; keys are normalized on read
    #[serde(default)]
    upload: BTreeMap<String, bool>,
    /// Lockfile location
    #[serde(default)]
    lockfile: LockfileConfig,
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the store base URL
    pub fn store_url(&self) -> Option<&str> {
        self.store.url.as_deref()
    }

    /// Get the store token, if one is written in the config
    pub fn token(&self) -> Option<&str> {
        self.store.token.as_deref()
    }

    /// Get the store request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }

    /// Get the configured lockfile path, if any
    pub fn lockfile_path(&self) -> Option<&Path> {
        self.lockfile.path.as_deref()
    }

    /// Upload options built from the `[upload]` table
    pub fn upload_options(&self) -> Result<UploadOptions> {
        UploadOptions::from_flat(self.upload.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    /// Set a single upload option; the key is normalized before it is stored
    pub fn set_upload_option(&mut self, key: &str, value: bool) {
        self.upload.insert(normalize_option_key(key), value);
    }

    /// Set the store URL
    pub fn set_store_url(&mut self, url: impl Into<String>) {
        self.store.url = Some(url.into());
    }

    /// Set the lockfile path
    pub fn set_lockfile_path(&mut self, path: impl Into<PathBuf>) {
        self.lockfile.path = Some(path.into());
    }

    /// Merge this config with another (other takes precedence)
    pub fn merge(&self, other: &Config) -> Config {
        let mut upload = normalized(&self.upload);
        upload.extend(normalized(&other.upload));

        Config {
            store: StoreConfig {
                url: other.store.url.as_ref().or(self.store.url.as_ref()).cloned(),
                token: other.store.token.as_ref().or(self.store.token.as_ref()).cloned(),
                timeout_secs: if other.store.timeout_secs != default_timeout() {
                    other.store.timeout_secs
                } else {
                    self.store.timeout_secs
                },
            },
            upload,
            lockfile: LockfileConfig {
                path: other.lockfile.path.as_ref().or(self.lockfile.path.as_ref()).cloned(),
            },
        }
    }
}

fn normalized(upload: &BTreeMap<String, bool>) -> BTreeMap<String, bool> {
    upload
        .iter()
        .map(|(k, v)| (normalize_option_key(k), *v))
        .collect()
}

/// Store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Bearer token for the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Lockfile configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockfileConfig {
    /// Path to the lockfile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Load configuration from a config file. A missing file is an error.
pub fn load_config_from_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        bail!("config file not found: {}", path.display());
    }
    parse_config_file(path)
}

fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    // Surface unknown upload keys at load time rather than mid-run.
    config
        .upload_options()
        .with_context(|| format!("invalid [upload] section in {}", path.display()))?;

    Ok(config)
}

/// Find configuration file by walking up the directory tree
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        let config_file = config_path(current);
        if config_file.exists() {
            return Some(config_file);
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}
