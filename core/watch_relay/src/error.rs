//! Error types for the relay.

use thiserror::Error;

/// Everything the relay can fail with.
///
/// Only `Config` is fatal. Remote failures and misses are caught where the
/// call is made and turned into placeholder values.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Credentials file missing, unreadable or incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network, HTTP or auth failure talking to a remote service.
    #[error("{service} unavailable: {message}")]
    RemoteUnavailable {
        service: &'static str,
        message: String,
    },

    /// The remote answered but has no data for the id.
    #[error("no {what} for id {id}")]
    LookupMiss { what: &'static str, id: i64 },

    /// A "currently watching" record with both or neither of movie/episode.
    #[error("malformed activity: {0}")]
    MalformedActivity(String),

    /// A history/ratings record missing required fields.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

impl RelayError {
    pub fn remote(service: &'static str, err: impl std::fmt::Display) -> Self {
        RelayError::RemoteUnavailable {
            service,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
