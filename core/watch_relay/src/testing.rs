//! In-memory stand-ins for the two remote services.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::{format_description::well_known::Rfc3339, Date, OffsetDateTime};

use crate::error::{RelayError, Result};
use crate::model::{
    Activity, MediaKind, RatedMovie, Title, WatchedEpisode, WatchedMovie, WatchedSeason,
    WatchedShow,
};
use crate::tmdb::MetadataLookup;
use crate::trakt::ActivitySource;

#[derive(Default)]
pub struct FakeMetadata {
    pub posters: HashMap<(MediaKind, i64, Option<u32>), String>,
    pub genres: HashMap<(MediaKind, i64), Vec<String>>,
    pub runtimes: HashMap<(MediaKind, i64, Option<u32>, Option<u32>), u32>,
    pub release_dates: HashMap<(MediaKind, i64), Date>,
    /// Ids for which every call fails as if the service were down.
    pub unavailable: Vec<i64>,
    calls: Mutex<Vec<String>>,
}

impl FakeMetadata {
    pub fn with_unavailable(mut self, id: i64) -> Self {
        self.unavailable.push(id);
        self
    }

    pub fn with_poster(mut self, kind: MediaKind, id: i64, season: Option<u32>, url: &str) -> Self {
        self.posters.insert((kind, id, season), url.to_string());
        self
    }

    pub fn with_runtime(
        mut self,
        kind: MediaKind,
        id: i64,
        season: Option<u32>,
        episode: Option<u32>,
        minutes: u32,
    ) -> Self {
        self.runtimes.insert((kind, id, season, episode), minutes);
        self
    }

    pub fn with_release(mut self, kind: MediaKind, id: i64, date: &str) -> Self {
        self.release_dates
            .insert((kind, id), crate::tmdb::parse_release_date(date).unwrap());
        self
    }

    pub fn with_genres(mut self, kind: MediaKind, id: i64, genres: &[&str]) -> Self {
        self.genres
            .insert((kind, id), genres.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn poster_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("poster")).count()
    }

    async fn record(&self, call: String, id: i64) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        // Give other tasks a chance to interleave, like a real remote call.
        tokio::task::yield_now().await;
        if self.unavailable.contains(&id) {
            return Err(RelayError::remote("fake", "down"));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataLookup for FakeMetadata {
    async fn poster_for(&self, kind: MediaKind, id: i64, season: Option<u32>) -> Result<String> {
        self.record(format!("poster {kind:?} {id} {season:?}"), id).await?;
        self.posters
            .get(&(kind, id, season))
            .cloned()
            .ok_or(RelayError::LookupMiss { what: "poster", id })
    }

    async fn genres_for(&self, kind: MediaKind, id: i64) -> Result<Vec<String>> {
        self.record(format!("genres {kind:?} {id}"), id).await?;
        self.genres
            .get(&(kind, id))
            .cloned()
            .ok_or(RelayError::LookupMiss { what: "genres", id })
    }

    async fn runtime_minutes_for(
        &self,
        kind: MediaKind,
        id: i64,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<u32> {
        self.record(format!("runtime {kind:?} {id} {season:?} {episode:?}"), id)
            .await?;
        Ok(self
            .runtimes
            .get(&(kind, id, season, episode))
            .copied()
            .unwrap_or(0))
    }

    async fn release_date_for(&self, kind: MediaKind, id: i64) -> Result<Date> {
        self.record(format!("release {kind:?} {id}"), id).await?;
        self.release_dates
            .get(&(kind, id))
            .copied()
            .ok_or(RelayError::LookupMiss { what: "release date", id })
    }
}

#[derive(Default)]
pub struct FakeActivity {
    pub watching: Mutex<Option<Activity>>,
    pub movies: Mutex<Vec<WatchedMovie>>,
    pub shows: Mutex<Vec<WatchedShow>>,
    pub ratings: Mutex<Vec<RatedMovie>>,
    pub down: bool,
}

impl FakeActivity {
    fn check(&self) -> Result<()> {
        if self.down {
            return Err(RelayError::remote("fake", "down"));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivitySource for FakeActivity {
    async fn watching(&self) -> Result<Option<Activity>> {
        self.check()?;
        Ok(self.watching.lock().unwrap().clone())
    }

    async fn watched_movies(&self) -> Result<Vec<WatchedMovie>> {
        self.check()?;
        Ok(self.movies.lock().unwrap().clone())
    }

    async fn watched_shows(&self) -> Result<Vec<WatchedShow>> {
        self.check()?;
        Ok(self.shows.lock().unwrap().clone())
    }

    async fn movie_ratings(&self) -> Result<Vec<RatedMovie>> {
        self.check()?;
        Ok(self.ratings.lock().unwrap().clone())
    }
}

pub fn ts(rfc3339: &str) -> OffsetDateTime {
    OffsetDateTime::parse(rfc3339, &Rfc3339).unwrap()
}

/// Titles get `tmdb_id = stable_id + 1000` so the two namespaces never line
/// up by accident.
pub fn title(stable_id: i64, name: &str, year: i32) -> Title {
    Title {
        stable_id,
        tmdb_id: Some(stable_id + 1000),
        slug: name.to_lowercase().replace(' ', "-"),
        title: name.to_string(),
        year: Some(year),
    }
}

pub fn watched(stable_id: i64, name: &str, at: &str) -> WatchedMovie {
    WatchedMovie {
        movie: title(stable_id, name, 2000),
        last_watched_at: ts(at),
    }
}

/// `episodes` is `(season, episode, last_watched_at)`.
pub fn watched_show(stable_id: i64, name: &str, episodes: &[(u32, u32, &str)]) -> WatchedShow {
    let mut seasons: Vec<WatchedSeason> = Vec::new();
    for &(season, number, at) in episodes {
        let ep = WatchedEpisode {
            number,
            last_watched_at: ts(at),
        };
        match seasons.iter_mut().find(|s| s.number == season) {
            Some(s) => s.episodes.push(ep),
            None => seasons.push(WatchedSeason {
                number: season,
                episodes: vec![ep],
            }),
        }
    }
    WatchedShow {
        show: title(stable_id, name, 2010),
        seasons,
    }
}
