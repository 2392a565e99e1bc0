//! Store abstraction used by the upload engine.
//!
//! The engine only sees [`Store`] and [`StoreSession`]; [`HttpStore`] adapts
//! the `pantry-store` HTTP client to them.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pantry_store::{CookbookFile, CookbookUpload, StoreClient, UploadError};
use pantry_types::{ResolvedCookbook, UploadFlags};
use sha2::{Digest, Sha256};

use crate::files::{cookbook_files, slash_path};
use crate::metadata::CompiledMetadata;

/// How a single upload went wrong.
#[derive(Debug)]
pub enum UploadFailure {
    /// The store already holds this version frozen
    Frozen(String),
    Other(anyhow::Error),
}

/// What the store acknowledged for a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadAck {
    /// Whether the version is now frozen on the store
    pub frozen: bool,
}

/// A connection to the store, held for a whole run.
///
/// `upload` takes `&mut self`: a session never has two uploads in flight.
pub trait StoreSession {
    fn upload(
        &mut self,
        cookbook: &ResolvedCookbook,
        flags: UploadFlags,
    ) -> Result<UploadAck, UploadFailure>;
}

/// Something that can open a [`StoreSession`].
pub trait Store {
    fn connect(&self) -> Result<Box<dyn StoreSession + '_>>;
}

/// HTTP cookbook store.
#[derive(Debug, Clone)]
pub struct HttpStore {
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout: Duration::from_secs(pantry_store::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Build the underlying client without opening a session.
    pub fn client(&self) -> StoreClient {
        let client = StoreClient::new(&self.url).with_timeout(self.timeout);
        match &self.token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        }
    }
}

impl Store for HttpStore {
    fn connect(&self) -> Result<Box<dyn StoreSession + '_>> {
        if self.url.trim().is_empty() {
            bail!("store URL is empty");
        }
        Ok(Box::new(HttpSession {
            client: self.client(),
        }))
    }
}

struct HttpSession {
    client: StoreClient,
}

impl StoreSession for HttpSession {
    fn upload(
        &mut self,
        cookbook: &ResolvedCookbook,
        flags: UploadFlags,
    ) -> Result<UploadAck, UploadFailure> {
        let request = build_upload(cookbook, flags.freeze).map_err(UploadFailure::Other)?;
        match self.client.upload(&request, flags.force) {
            Ok(receipt) => Ok(UploadAck {
                frozen: receipt.frozen.unwrap_or(flags.freeze),
            }),
            Err(UploadError::Frozen { message }) => Err(UploadFailure::Frozen(message)),
            Err(other) => Err(UploadFailure::Other(anyhow::Error::new(other))),
        }
    }
}

/// Assemble the request body: compiled metadata plus every cookbook file.
fn build_upload(cookbook: &ResolvedCookbook, freeze: bool) -> Result<CookbookUpload> {
    let compiled = cookbook
        .compiled_metadata
        .as_deref()
        .ok_or_else(|| anyhow!("{}: metadata was not compiled", cookbook.label()))?;
    let metadata = CompiledMetadata::read_json(compiled)?;

    let mut files = Vec::new();
    for rel in cookbook_files(&cookbook.path)? {
        let full = cookbook.path.join(&rel);
        let bytes = fs::read(&full).with_context(|| format!("failed to read {}", full.display()))?;
        files.push(CookbookFile {
            path: slash_path(&rel),
            checksum: hex::encode(Sha256::digest(&bytes)),
            size: bytes.len() as u64,
            content: STANDARD.encode(&bytes),
        });
    }

    Ok(CookbookUpload {
        cookbook_name: cookbook.name.clone(),
        version: cookbook.version.clone(),
        metadata,
        frozen: freeze,
        files,
    })
}
