//! # Pantry
//!
//! Uploads locked cookbooks to a cookbook store, dependencies first.
//!
//! ## Pipeline
//!
//! The core flow is **resolve → validate → upload**:
//!
//! 1. [`engine::Uploader::plan`] expands the lockfile's declared dependencies
//!    into their transitive closure, ordered so every cookbook follows its
//!    dependencies ([`closure::resolve_closure`]). Explicitly named cookbooks
//!    are taken as given.
//! 2. [`engine::Uploader::validate`] checks every artifact in the batch. Any
//!    issue anywhere blocks the whole batch; nothing is uploaded.
//! 3. [`engine::Uploader::run`] opens one store session and uploads cookbooks
//!    one at a time. Each cookbook's `metadata.json` is compiled right before
//!    its upload and removed right after.
//!
//! ## Example
//!
//! ```ignore
//! use std::path::Path;
//! use pantry::engine::Uploader;
//! use pantry::lockfile::TomlLockfile;
//! use pantry::store::HttpStore;
//! use pantry::validate::FilesystemValidator;
//!
//! let lockfile = TomlLockfile::load(Path::new("Pantry.lock"))?;
//! let store = HttpStore::new("https://cookbooks.example.com");
//! let uploader = Uploader::new(&lockfile, &FilesystemValidator, &store);
//! let processed = uploader.run(&[], &Default::default(), &mut reporter)?;
//! ```
//!
//! ## Modules
//!
//! - [`closure`]: Dependency closure and upload ordering
//! - [`engine`]: Upload pipeline and the [`engine::Reporter`] seam
//! - [`lockfile`]: `Pantry.lock` parsing and cookbook lookup
//! - [`metadata`]: `metadata.toml` loading and scoped `metadata.json` compilation
//! - [`validate`]: Pre-upload artifact checks
//! - [`store`]: Store session traits and the HTTP adapter
//! - [`auth`]: Store token resolution
//! - [`error`]: Error taxonomy

/// Token resolution: `PANTRY_STORE_TOKEN` → config → `$PANTRY_HOME/credentials.toml`.
pub mod auth;

/// Dependency closure and upload ordering.
pub mod closure;

/// Upload pipeline.
pub mod engine;

/// Error taxonomy.
pub mod error;

mod files;

/// `Pantry.lock` parsing and cookbook lookup.
pub mod lockfile;

/// Cookbook metadata and its compiled form.
pub mod metadata;

/// Store session traits and the HTTP adapter.
pub mod store;

/// Pre-upload artifact checks.
pub mod validate;

pub use error::PantryError;
