//! Metadata service: posters, genres, runtimes and release dates.
//!
//! Movies and shows have different endpoints and response shapes on the
//! remote side; [`MetadataLookup`] hides that behind one contract. Nothing is
//! cached here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use time::Date;
use tracing::{debug, info, warn};

use crate::config::TmdbConfig;
use crate::error::{RelayError, Result};
use crate::model::{LookupKey, MediaKind};

const API_BASE: &str = "https://api.themoviedb.org/3";
const FALLBACK_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/";
const POSTER_SIZE: &str = "w154";
const SERVICE: &str = "tmdb";

#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Poster URL. A positive `season` selects that season's poster for shows.
    async fn poster_for(&self, kind: MediaKind, id: i64, season: Option<u32>) -> Result<String>;

    /// Genre names in the order the remote returns them.
    async fn genres_for(&self, kind: MediaKind, id: i64) -> Result<Vec<String>>;

    /// Runtime in minutes. Missing runtimes are `Ok(0)`.
    async fn runtime_minutes_for(
        &self,
        kind: MediaKind,
        id: i64,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<u32>;

    async fn release_date_for(&self, kind: MediaKind, id: i64) -> Result<Date>;
}

// The helpers below turn every failure into a placeholder. They are what the
// rest of the relay calls; a failed enrichment must never abort a batch.

fn effective_id(key: LookupKey, what: &'static str) -> Option<i64> {
    if key.tmdb_id.is_none() {
        debug!(what, stable_id = key.stable_id, "no metadata id; using placeholder");
    }
    key.tmdb_id
}

pub async fn poster_or_empty(lookup: &dyn MetadataLookup, key: LookupKey, season: Option<u32>) -> String {
    let Some(id) = effective_id(key, "poster") else {
        return String::new();
    };
    match lookup.poster_for(key.kind, id, season).await {
        Ok(url) => url,
        Err(err) => {
            warn!(id, kind = ?key.kind, error = %err, "poster lookup failed");
            String::new()
        }
    }
}

pub async fn genres_or_empty(lookup: &dyn MetadataLookup, key: LookupKey) -> Vec<String> {
    let Some(id) = effective_id(key, "genres") else {
        return Vec::new();
    };
    match lookup.genres_for(key.kind, id).await {
        Ok(g) => g,
        Err(err) => {
            warn!(id, kind = ?key.kind, error = %err, "genre lookup failed");
            Vec::new()
        }
    }
}

pub async fn runtime_or_zero(
    lookup: &dyn MetadataLookup,
    key: LookupKey,
    season: Option<u32>,
    episode: Option<u32>,
) -> u32 {
    let Some(id) = effective_id(key, "runtime") else {
        return 0;
    };
    match lookup.runtime_minutes_for(key.kind, id, season, episode).await {
        Ok(m) => m,
        Err(err) => {
            warn!(id, kind = ?key.kind, ?season, ?episode, error = %err, "runtime lookup failed");
            0
        }
    }
}

pub async fn release_date_or_none(lookup: &dyn MetadataLookup, key: LookupKey) -> Option<Date> {
    let id = effective_id(key, "release date")?;
    match lookup.release_date_for(key.kind, id).await {
        Ok(d) => Some(d),
        Err(err) => {
            warn!(id, kind = ?key.kind, error = %err, "release date lookup failed");
            None
        }
    }
}

#[derive(Deserialize)]
struct ConfigurationResponse {
    images: ImagesConfiguration,
}

#[derive(Deserialize)]
struct ImagesConfiguration {
    #[serde(default)]
    secure_base_url: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    posters: Vec<ImageFile>,
}

#[derive(Deserialize)]
struct ImageFile {
    file_path: String,
}

#[derive(Deserialize)]
struct Genre {
    name: String,
}

#[derive(Deserialize)]
struct MovieDetails {
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    runtime: Option<u32>,
    #[serde(default)]
    release_date: Option<String>,
}

#[derive(Deserialize)]
struct ShowDetails {
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    episode_run_time: Vec<u32>,
    #[serde(default)]
    first_air_date: Option<String>,
}

#[derive(Deserialize)]
struct EpisodeDetails {
    #[serde(default)]
    runtime: Option<u32>,
}

pub struct TmdbClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    image_base: String,
}

impl TmdbClient {
    /// Builds the client and reads the image base URL from the remote
    /// configuration. A failed configuration fetch falls back to the public
    /// image host instead of failing startup.
    pub async fn connect(config: &TmdbConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to create HTTP client: {e}")))?;

        let mut client = TmdbClient {
            http,
            api_base: API_BASE.to_string(),
            api_key: config.api_key.clone(),
            image_base: FALLBACK_IMAGE_BASE.to_string(),
        };

        match client.get_json::<ConfigurationResponse>("/configuration", 0).await {
            Ok(cfg) => {
                if let Some(base) = cfg.images.secure_base_url.or(cfg.images.base_url) {
                    client.image_base = base;
                }
            }
            Err(err) => warn!(error = %err, "tmdb configuration unavailable; using default image host"),
        }
        info!(image_base = %client.image_base, "tmdb client ready");
        Ok(client)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, id: i64) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let res = self
            .http
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| RelayError::remote(SERVICE, e))?;
        let status = res.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RelayError::LookupMiss { what: "metadata", id });
        }
        if !status.is_success() {
            return Err(RelayError::remote(SERVICE, format!("http_{}", status.as_u16())));
        }
        res.json().await.map_err(|e| RelayError::remote(SERVICE, e))
    }

    async fn movie(&self, id: i64) -> Result<MovieDetails> {
        self.get_json(&format!("/movie/{id}"), id).await
    }

    async fn show(&self, id: i64) -> Result<ShowDetails> {
        self.get_json(&format!("/tv/{id}"), id).await
    }
}

#[async_trait]
impl MetadataLookup for TmdbClient {
    async fn poster_for(&self, kind: MediaKind, id: i64, season: Option<u32>) -> Result<String> {
        let path = match (kind, season) {
            (MediaKind::Movie, _) => format!("/movie/{id}/images"),
            (MediaKind::Show, Some(s)) if s > 0 => format!("/tv/{id}/season/{s}/images"),
            (MediaKind::Show, _) => format!("/tv/{id}/images"),
        };
        let images: ImagesResponse = self.get_json(&path, id).await?;
        let first = images
            .posters
            .first()
            .ok_or(RelayError::LookupMiss { what: "poster", id })?;
        Ok(poster_url(&self.image_base, &first.file_path))
    }

    async fn genres_for(&self, kind: MediaKind, id: i64) -> Result<Vec<String>> {
        let genres = match kind {
            MediaKind::Movie => self.movie(id).await?.genres,
            MediaKind::Show => self.show(id).await?.genres,
        };
        Ok(genres.into_iter().map(|g| g.name).collect())
    }

    async fn runtime_minutes_for(
        &self,
        kind: MediaKind,
        id: i64,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<u32> {
        match (kind, season, episode) {
            (MediaKind::Movie, _, _) => Ok(self.movie(id).await?.runtime.unwrap_or(0)),
            (MediaKind::Show, Some(s), Some(e)) => {
                let ep: EpisodeDetails = self
                    .get_json(&format!("/tv/{id}/season/{s}/episode/{e}"), id)
                    .await?;
                Ok(ep.runtime.unwrap_or(0))
            }
            (MediaKind::Show, _, _) => Ok(show_default_runtime(&self.show(id).await?.episode_run_time)),
        }
    }

    async fn release_date_for(&self, kind: MediaKind, id: i64) -> Result<Date> {
        let raw = match kind {
            MediaKind::Movie => self.movie(id).await?.release_date,
            MediaKind::Show => self.show(id).await?.first_air_date,
        };
        raw.as_deref()
            .and_then(parse_release_date)
            .ok_or(RelayError::LookupMiss { what: "release date", id })
    }
}

/// Public page for a title on the metadata service, or `""` without an id.
pub fn page_link(key: LookupKey, slug: &str) -> String {
    match key.tmdb_id {
        Some(id) if slug.is_empty() => {
            format!("https://www.themoviedb.org/{}/{id}", key.kind.path_segment())
        }
        Some(id) => format!(
            "https://www.themoviedb.org/{}/{id}-{slug}",
            key.kind.path_segment()
        ),
        None => String::new(),
    }
}

fn poster_url(image_base: &str, file_path: &str) -> String {
    format!("{image_base}{POSTER_SIZE}{file_path}")
}

/// Shows report a list of typical episode lengths; the first one is the
/// show's default runtime.
fn show_default_runtime(episode_run_time: &[u32]) -> u32 {
    episode_run_time.first().copied().unwrap_or(0)
}

/// `YYYY-MM-DD`; empty strings (unreleased titles) are `None`.
pub fn parse_release_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let format = time::format_description::parse("[year]-[month]-[day]").ok()?;
    Date::parse(raw, &format).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMetadata;

    #[test]
    fn poster_url_joins_base_size_and_path() {
        assert_eq!(
            poster_url("https://image.tmdb.org/t/p/", "/abc.jpg"),
            "https://image.tmdb.org/t/p/w154/abc.jpg"
        );
    }

    #[test]
    fn page_links_follow_the_effective_kind() {
        let key = LookupKey {
            stable_id: 1,
            tmdb_id: Some(272),
            kind: MediaKind::Movie,
        };
        assert_eq!(
            page_link(key, "batman-begins-2005"),
            "https://www.themoviedb.org/movie/272-batman-begins-2005"
        );
        let key = LookupKey {
            kind: MediaKind::Show,
            ..key
        };
        assert_eq!(page_link(key, ""), "https://www.themoviedb.org/tv/272");
        let key = LookupKey { tmdb_id: None, ..key };
        assert_eq!(page_link(key, "x"), "");
    }

    #[test]
    fn release_dates_parse_or_are_absent() {
        let d = parse_release_date("1999-03-31").unwrap();
        assert_eq!(d.year(), 1999);
        assert_eq!(d.month(), time::Month::March);
        assert_eq!(d.day(), 31);
        assert!(parse_release_date("").is_none());
        assert!(parse_release_date("soon").is_none());
    }

    #[test]
    fn show_runtime_defaults_to_first_listed_length() {
        assert_eq!(show_default_runtime(&[42, 60]), 42);
        assert_eq!(show_default_runtime(&[]), 0);
    }

    #[test]
    fn movie_details_tolerate_nulls() {
        let d: MovieDetails = serde_json::from_value(serde_json::json!({
            "genres": [{ "id": 18, "name": "Drama" }, { "id": 80, "name": "Crime" }],
            "runtime": null,
            "release_date": ""
        }))
        .unwrap();
        assert_eq!(d.genres.len(), 2);
        assert_eq!(d.genres[1].name, "Crime");
        assert!(d.runtime.is_none());
    }

    #[tokio::test]
    async fn placeholders_replace_failed_lookups() {
        let fake = FakeMetadata::default();
        let key = LookupKey {
            stable_id: 1,
            tmdb_id: Some(404),
            kind: MediaKind::Movie,
        };
        assert_eq!(poster_or_empty(&fake, key, None).await, "");
        assert!(genres_or_empty(&fake, key).await.is_empty());
        assert_eq!(runtime_or_zero(&fake, key, None, None).await, 0);
        assert!(release_date_or_none(&fake, key).await.is_none());
    }

    #[tokio::test]
    async fn keys_without_metadata_id_make_no_calls() {
        let fake = FakeMetadata::default();
        let key = LookupKey {
            stable_id: 1,
            tmdb_id: None,
            kind: MediaKind::Show,
        };
        assert_eq!(poster_or_empty(&fake, key, Some(1)).await, "");
        assert_eq!(runtime_or_zero(&fake, key, Some(1), Some(1)).await, 0);
        assert_eq!(fake.total_calls(), 0);
    }
}
