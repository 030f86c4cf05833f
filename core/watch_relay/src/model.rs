//! Remote payload shapes and the validated records the core works with.
//!
//! `Raw*` structs mirror the activity service's JSON loosely (every field
//! optional). The `TryFrom` impls are the ingestion boundary: anything that
//! gets past them has the ids and timestamps the core relies on.

use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use tracing::warn;

use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
}

impl MediaKind {
    /// Path segment used by the metadata service's public pages and API.
    pub fn path_segment(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "tv",
        }
    }
}

/// What the override table and metadata lookups are keyed on.
///
/// `stable_id` never changes; `tmdb_id` and `kind` may be replaced by an
/// override before any lookup happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub stable_id: i64,
    pub tmdb_id: Option<i64>,
    pub kind: MediaKind,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawIds {
    #[serde(default)]
    pub trakt: Option<i64>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub tmdb: Option<i64>,
}

/// A movie or show object as embedded in every activity-service response.
#[derive(Debug, Default, Deserialize)]
pub struct RawTitle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub ids: RawIds,
}

#[derive(Debug, Deserialize)]
pub struct RawWatchedMovie {
    #[serde(default)]
    pub last_watched_at: Option<String>,
    #[serde(default)]
    pub movie: Option<RawTitle>,
}

#[derive(Debug, Deserialize)]
pub struct RawWatchedShow {
    #[serde(default)]
    pub show: Option<RawTitle>,
    #[serde(default)]
    pub seasons: Vec<RawSeason>,
}

#[derive(Debug, Deserialize)]
pub struct RawSeason {
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub episodes: Vec<RawEpisodeWatch>,
}

#[derive(Debug, Deserialize)]
pub struct RawEpisodeWatch {
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub last_watched_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawRating {
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub movie: Option<RawTitle>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawEpisode {
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Body of the "currently watching" query.
#[derive(Debug, Default, Deserialize)]
pub struct RawWatching {
    #[serde(default)]
    pub movie: Option<RawTitle>,
    #[serde(default)]
    pub show: Option<RawTitle>,
    #[serde(default)]
    pub episode: Option<RawEpisode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub stable_id: i64,
    pub tmdb_id: Option<i64>,
    pub slug: String,
    pub title: String,
    pub year: Option<i32>,
}

impl Title {
    pub fn lookup_key(&self, kind: MediaKind) -> LookupKey {
        LookupKey {
            stable_id: self.stable_id,
            tmdb_id: self.tmdb_id,
            kind,
        }
    }

    /// `"Title (Year)"`, or just the title when the year is unknown.
    pub fn display(&self) -> String {
        match self.year {
            Some(y) => format!("{} ({})", self.title, y),
            None => self.title.clone(),
        }
    }
}

impl TryFrom<RawTitle> for Title {
    type Error = RelayError;

    fn try_from(raw: RawTitle) -> Result<Self, Self::Error> {
        let stable_id = raw
            .ids
            .trakt
            .ok_or_else(|| RelayError::MalformedRecord("missing ids.trakt".to_string()))?;
        let title = raw
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RelayError::MalformedRecord(format!("missing title for {stable_id}")))?;
        Ok(Title {
            stable_id,
            tmdb_id: raw.ids.tmdb,
            slug: raw.ids.slug.unwrap_or_default(),
            title,
            year: raw.year,
        })
    }
}

fn parse_ts(raw: Option<&str>, what: &str) -> Result<OffsetDateTime, RelayError> {
    let raw = raw.ok_or_else(|| RelayError::MalformedRecord(format!("missing {what}")))?;
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| RelayError::MalformedRecord(format!("bad {what} '{raw}': {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedMovie {
    pub movie: Title,
    pub last_watched_at: OffsetDateTime,
}

impl TryFrom<RawWatchedMovie> for WatchedMovie {
    type Error = RelayError;

    fn try_from(raw: RawWatchedMovie) -> Result<Self, Self::Error> {
        let last_watched_at = parse_ts(raw.last_watched_at.as_deref(), "last_watched_at")?;
        let movie: Title = raw
            .movie
            .ok_or_else(|| RelayError::MalformedRecord("watched entry without movie".to_string()))?
            .try_into()?;
        Ok(WatchedMovie {
            movie,
            last_watched_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEpisode {
    pub number: u32,
    pub last_watched_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedSeason {
    pub number: u32,
    pub episodes: Vec<WatchedEpisode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedShow {
    pub show: Title,
    pub seasons: Vec<WatchedSeason>,
}

impl TryFrom<RawWatchedShow> for WatchedShow {
    type Error = RelayError;

    fn try_from(raw: RawWatchedShow) -> Result<Self, Self::Error> {
        let show: Title = raw
            .show
            .ok_or_else(|| RelayError::MalformedRecord("watched entry without show".to_string()))?
            .try_into()?;
        // A bad season or episode is dropped on its own; the rest of the
        // show still counts.
        let mut seasons = Vec::with_capacity(raw.seasons.len());
        for s in raw.seasons {
            let Some(season_number) = s.number else {
                warn!(show = show.stable_id, "skipping season without number");
                continue;
            };
            let mut episodes = Vec::with_capacity(s.episodes.len());
            for e in s.episodes {
                let Some(number) = e.number else {
                    warn!(show = show.stable_id, season = season_number, "skipping episode without number");
                    continue;
                };
                match parse_ts(e.last_watched_at.as_deref(), "episode last_watched_at") {
                    Ok(last_watched_at) => episodes.push(WatchedEpisode {
                        number,
                        last_watched_at,
                    }),
                    Err(err) => warn!(
                        show = show.stable_id,
                        season = season_number,
                        episode = number,
                        error = %err,
                        "skipping episode"
                    ),
                }
            }
            seasons.push(WatchedSeason {
                number: season_number,
                episodes,
            });
        }
        Ok(WatchedShow { show, seasons })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatedMovie {
    pub stable_id: i64,
    pub rating: u8,
}

impl TryFrom<RawRating> for RatedMovie {
    type Error = RelayError;

    fn try_from(raw: RawRating) -> Result<Self, Self::Error> {
        let rating = raw
            .rating
            .filter(|r| (0..=10).contains(r))
            .ok_or_else(|| RelayError::MalformedRecord(format!("rating out of range: {:?}", raw.rating)))?;
        let stable_id = raw
            .movie
            .and_then(|m| m.ids.trakt)
            .ok_or_else(|| RelayError::MalformedRecord("rating without movie id".to_string()))?;
        Ok(RatedMovie {
            stable_id,
            rating: rating as u8,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeInfo {
    pub season: u32,
    pub number: u32,
    pub title: String,
}

/// Something being played right now: a movie, or one episode of a show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    Movie(Title),
    Episode { show: Title, episode: EpisodeInfo },
}

impl TryFrom<RawWatching> for Activity {
    type Error = RelayError;

    fn try_from(raw: RawWatching) -> Result<Self, Self::Error> {
        match (raw.movie, raw.show, raw.episode) {
            (Some(movie), None, None) => {
                let movie = Title::try_from(movie)
                    .map_err(|e| RelayError::MalformedActivity(e.to_string()))?;
                Ok(Activity::Movie(movie))
            }
            (None, Some(show), Some(episode)) => {
                let show = Title::try_from(show)
                    .map_err(|e| RelayError::MalformedActivity(e.to_string()))?;
                let (Some(season), Some(number)) = (episode.season, episode.number) else {
                    return Err(RelayError::MalformedActivity(
                        "episode without season/number".to_string(),
                    ));
                };
                Ok(Activity::Episode {
                    show,
                    episode: EpisodeInfo {
                        season,
                        number,
                        title: episode.title.unwrap_or_default(),
                    },
                })
            }
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(RelayError::MalformedActivity(
                "both movie and show/episode present".to_string(),
            )),
            (None, Some(_), None) => Err(RelayError::MalformedActivity(
                "show without episode".to_string(),
            )),
            (None, None, Some(_)) => Err(RelayError::MalformedActivity(
                "episode without show".to_string(),
            )),
            (None, None, None) => Err(RelayError::MalformedActivity(
                "neither movie nor show present".to_string(),
            )),
        }
    }
}

/// Validates a list of raw records, dropping (and logging) the bad ones.
pub fn ingest<R, T>(raw: Vec<R>, what: &'static str) -> Vec<T>
where
    T: TryFrom<R, Error = RelayError>,
{
    let mut out = Vec::with_capacity(raw.len());
    for r in raw {
        match T::try_from(r) {
            Ok(v) => out.push(v),
            Err(err) => warn!(what, error = %err, "skipping record"),
        }
    }
    out
}
