//! Activity service client (what the user is watching and has watched).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::TraktConfig;
use crate::error::{RelayError, Result};
use crate::model::{
    ingest, Activity, RatedMovie, RawRating, RawWatchedMovie, RawWatchedShow, RawWatching,
    WatchedMovie, WatchedShow,
};

const API_BASE: &str = "https://api.trakt.tv";
const SERVICE: &str = "trakt";

/// Per-user activity queries. Records come back already validated; bad ones
/// are dropped at this boundary.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// `Ok(None)` when nothing is playing.
    async fn watching(&self) -> Result<Option<Activity>>;
    async fn watched_movies(&self) -> Result<Vec<WatchedMovie>>;
    async fn watched_shows(&self) -> Result<Vec<WatchedShow>>;
    async fn movie_ratings(&self) -> Result<Vec<RatedMovie>>;
}

pub struct TraktClient {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl TraktClient {
    pub fn new(config: &TraktConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("trakt-api-version", HeaderValue::from_static("2"));
        headers.insert(
            "trakt-api-key",
            HeaderValue::from_str(&config.client_id)
                .map_err(|e| RelayError::Config(format!("invalid client_id: {e}")))?,
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: API_BASE.to_string(),
            user_id: config.user_id.clone(),
        })
    }

    /// `Ok(None)` on 204 / empty body.
    async fn get_opt<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}/users/{}{}", self.base_url, self.user_id, path);
        let res = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::remote(SERVICE, e))?;
        let status = res.status();
        if !status.is_success() {
            return Err(RelayError::remote(SERVICE, format!("http_{}", status.as_u16())));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = res.bytes().await.map_err(|e| RelayError::remote(SERVICE, e))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| RelayError::remote(SERVICE, format!("bad response for {path}: {e}")))
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        Ok(self.get_opt(path).await?.unwrap_or_default())
    }
}

#[async_trait]
impl ActivitySource for TraktClient {
    async fn watching(&self) -> Result<Option<Activity>> {
        match self.get_opt::<RawWatching>("/watching").await? {
            Some(raw) => Activity::try_from(raw).map(Some),
            None => Ok(None),
        }
    }

    async fn watched_movies(&self) -> Result<Vec<WatchedMovie>> {
        let raw: Vec<RawWatchedMovie> = self.get_list("/watched/movies").await?;
        debug!(count = raw.len(), "fetched watched movies");
        Ok(ingest(raw, "watched movie"))
    }

    async fn watched_shows(&self) -> Result<Vec<WatchedShow>> {
        let raw: Vec<RawWatchedShow> = self.get_list("/watched/shows").await?;
        debug!(count = raw.len(), "fetched watched shows");
        Ok(ingest(raw, "watched show"))
    }

    async fn movie_ratings(&self) -> Result<Vec<RatedMovie>> {
        let raw: Vec<RawRating> = self.get_list("/ratings/movies").await?;
        Ok(ingest(raw, "movie rating"))
    }
}
