use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use url::Url;

/// Environment variable holding a store token.
pub const TOKEN_ENV: &str = "PANTRY_STORE_TOKEN";

/// Environment variable overriding the pantry home directory (default `~/.pantry`).
pub const HOME_ENV: &str = "PANTRY_HOME";

/// Credentials file name inside the pantry home directory.
pub const CREDENTIALS_FILE: &str = "credentials.toml";

/// Resolve the token to send to the store at `store_url`.
///
/// Resolution order:
/// 1) `PANTRY_STORE_TOKEN`
/// 2) `token` from the config file
/// 3) `$PANTRY_HOME/credentials.toml`: `[stores."<host>"] token = "..."`, then a top-level `token`
///
/// Blank values are ignored. Returns `Ok(None)` if nothing is configured.
pub fn resolve_token(store_url: &str, config_token: Option<&str>) -> Result<Option<String>> {
    if let Ok(v) = env::var(TOKEN_ENV)
        && let Some(tok) = non_blank(&v)
    {
        return Ok(Some(tok));
    }

    if let Some(tok) = config_token.and_then(non_blank) {
        return Ok(Some(tok));
    }

    if let Some(home) = pantry_home_dir() {
        let path = home.join(CREDENTIALS_FILE);
        if path.exists() {
            return token_from_credentials_file(&path, &store_host(store_url));
        }
    }

    Ok(None)
}

fn pantry_home_dir() -> Option<PathBuf> {
    if let Ok(h) = env::var(HOME_ENV)
        && !h.trim().is_empty()
    {
        return Some(PathBuf::from(h));
    }
    dirs::home_dir().map(|h| h.join(".pantry"))
}

fn token_from_credentials_file(path: &Path, host: &str) -> Result<Option<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials file at {}", path.display()))?;

    let value: toml::Table = toml::from_str(&content).with_context(|| {
        format!("failed to parse credentials file as TOML: {}", path.display())
    })?;

    if let Some(tok) = value
        .get("stores")
        .and_then(|t| t.get(host))
        .and_then(|t| t.get("token"))
        .and_then(|v| v.as_str())
        .and_then(non_blank)
    {
        return Ok(Some(tok));
    }

    Ok(value
        .get("token")
        .and_then(|v| v.as_str())
        .and_then(non_blank))
}

/// Host (and port) part of a store URL: `https://store.example.com:8443/x` → `store.example.com:8443`.
///
/// A URL without a scheme is read as `https://`. Returns an empty string if
/// no host can be parsed.
pub fn store_host(url: &str) -> String {
    let with_host = |s: &str| Url::parse(s).ok().filter(Url::has_host);
    let Some(parsed) = with_host(url).or_else(|| with_host(&format!("https://{url}"))) else {
        return String::new();
    };
    match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

fn non_blank(v: &str) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}
