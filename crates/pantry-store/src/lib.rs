//! Cookbook store API client for pantry.
//!
//! This crate provides a blocking HTTP client for a cookbook store: one
//! `PUT` per cookbook version, carrying the compiled metadata and a file
//! manifest, plus a reachability check.
//!
//! # Example
//!
//! ```no_run
//! use pantry_store::StoreClient;
//!
//! let client = StoreClient::new("https://cookbooks.example.com").with_token("secret");
//! let reachable = client.ping().is_ok();
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Default timeout for store requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent for store requests
pub const USER_AGENT: &str = concat!("pantry/", env!("CARGO_PKG_VERSION"));

/// Errors reported by the store for a single upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The store holds this version and refuses to overwrite it
    #[error("cookbook version is frozen on the store: {message}")]
    Frozen { message: String },
    #[error("store rejected credentials (status {status})")]
    Unauthorized { status: u16 },
    #[error("unexpected status {status} from store: {body}")]
    Status { status: u16, body: String },
    #[error("invalid store URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to send request to store")]
    Transport(#[source] reqwest::Error),
}

/// One file of a cookbook, as sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookbookFile {
    /// Path relative to the cookbook root, `/`-separated
    pub path: String,
    /// Lowercase hex SHA-256 of the content
    pub checksum: String,
    pub size: u64,
    /// Base64 (standard alphabet) encoded content
    pub content: String,
}

/// Request body for uploading one cookbook version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookbookUpload {
    pub cookbook_name: String,
    pub version: String,
    pub metadata: serde_json::Value,
    #[serde(rename = "frozen?")]
    pub frozen: bool,
    pub files: Vec<CookbookFile>,
}

/// What the store reported back for a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status: u16,
    /// Frozen state according to the store, if it said so
    pub frozen: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "frozen?")]
    frozen: Option<bool>,
}

/// Cookbook store API client
#[derive(Debug, Clone)]
pub struct StoreClient {
    base_url: String,
    timeout: Duration,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl StoreClient {
    /// Create a new store client for the given base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            token: None,
            client: build_http(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = build_http(timeout);
        self
    }

    /// Send a bearer token with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// URL of one cookbook version on the store. Name and version are
    /// percent-encoded as single path segments.
    pub fn cookbook_url(&self, name: &str, version: &str) -> Result<Url, UploadError> {
        let invalid = |reason: String| UploadError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push("cookbooks")
            .push(name)
            .push(version);
        Ok(url)
    }

    /// Upload one cookbook version. `force` asks the store to overwrite a
    /// frozen version.
    pub fn upload(&self, upload: &CookbookUpload, force: bool) -> Result<UploadReceipt, UploadError> {
        let mut url = self.cookbook_url(&upload.cookbook_name, &upload.version)?;
        if force {
            url.query_pairs_mut().append_pair("force", "true");
        }

        let mut request = self.client.put(url).json(upload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(UploadError::Transport)?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().unwrap_or_default();
            let frozen = serde_json::from_str::<UploadResponse>(&body)
                .ok()
                .and_then(|r| r.frozen);
            return Ok(UploadReceipt {
                status: status.as_u16(),
                frozen,
            });
        }

        let body = response.text().unwrap_or_default();
        match status {
            reqwest::StatusCode::CONFLICT => Err(UploadError::Frozen {
                message: error_message(&body),
            }),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(UploadError::Unauthorized {
                    status: status.as_u16(),
                })
            }
            _ => Err(UploadError::Status {
                status: status.as_u16(),
                body: error_message(&body),
            }),
        }
    }

    /// Check that the store answers at all; returns the HTTP status.
    pub fn ping(&self) -> Result<u16> {
        let url = format!("{}/", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().context("failed to send request to store")?;
        Ok(response.status().as_u16())
    }
}

fn build_http(timeout: Duration) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}

/// Pull a human-readable message out of an error body.
///
/// Stores answer either `{"error": "..."}`, `{"error": ["..."]}` or plain text.
fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        match value.get("error") {
            Some(serde_json::Value::String(s)) => return s.clone(),
            Some(serde_json::Value::Array(items)) => {
                let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
                if !parts.is_empty() {
                    return parts.join("; ");
                }
            }
            _ => {}
        }
    }
    trimmed.to_string()
}
