//! Credential files for the two remote services.
//!
//! Both are small JSON objects read once at startup. Any problem here is a
//! [`RelayError::Config`] and the relay does not start.

use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize};

use crate::error::{RelayError, Result};
use crate::overrides::OverrideEntry;

/// Activity service credentials (`trakt_info.json`).
#[derive(Clone, Deserialize)]
pub struct TraktConfig {
    pub user_id: String,
    pub client_id: String,
    /// Only needed for OAuth flows; public user queries authenticate with
    /// the client id alone.
    #[serde(default)]
    #[allow(dead_code)]
    pub client_secret: String,
    /// Extra id corrections on top of the built-in ones.
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,
}

/// Metadata service credentials (`tmdb_info.json`).
#[derive(Clone, Deserialize)]
pub struct TmdbConfig {
    pub api_key: String,
}

// Hand-written so secrets never end up in logs.
impl std::fmt::Debug for TraktConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraktConfig")
            .field("user_id", &self.user_id)
            .field("overrides", &self.overrides.len())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for TmdbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmdbConfig").finish_non_exhaustive()
    }
}

impl TraktConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: TraktConfig = read_json(path)?;
        require(path, "user_id", &cfg.user_id)?;
        require(path, "client_id", &cfg.client_id)?;
        Ok(cfg)
    }
}

impl TmdbConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: TmdbConfig = read_json(path)?;
        require(path, "api_key", &cfg.api_key)?;
        Ok(cfg)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| RelayError::Config(format!("invalid JSON in {}: {e}", path.display())))
}

fn require(path: &Path, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RelayError::Config(format!(
            "{} is missing '{field}'",
            path.display()
        )));
    }
    Ok(())
}
