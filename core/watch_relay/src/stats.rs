//! Year-to-date watch statistics for movies and shows.
//!
//! Unlike the history store this re-reads the full remote lists every time:
//! shows are not kept in the store, and rewatches only count through their
//! last-watched timestamps.

use serde::Serialize;
use time::{Date, OffsetDateTime, UtcOffset};
use tracing::{debug, warn};

use crate::model::{MediaKind, Title, WatchedMovie, WatchedShow};
use crate::overrides::OverrideTable;
use crate::tmdb::{release_date_or_none, runtime_or_zero, MetadataLookup};
use crate::trakt::ActivitySource;

const MINUTES_PER_DAY: u64 = 24 * 60;

/// The interval `(start, end)`: both bounds are excluded. `start` is the
/// first instant of the current calendar year, `end` is "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl StatsWindow {
    /// Year-to-date as seen from `tz_offset`.
    pub fn year_to_date(now: OffsetDateTime, tz_offset: UtcOffset) -> Self {
        let local = now.to_offset(tz_offset);
        let jan_1 = Date::from_ordinal_date(local.year(), 1).unwrap_or(local.date());
        let start = jan_1.midnight().assume_offset(tz_offset);
        StatsWindow { start, end: now }
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        ts > self.start && ts < self.end
    }
}

/// Earliest and latest release seen so far, with their display strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Extremes {
    oldest: Option<(Date, String)>,
    newest: Option<(Date, String)>,
}

impl Extremes {
    fn observe(&mut self, date: Date, title: &Title) {
        if self.oldest.as_ref().map_or(true, |(d, _)| date < *d) {
            self.oldest = Some((date, title.display()));
        }
        if self.newest.as_ref().map_or(true, |(d, _)| date > *d) {
            self.newest = Some((date, title.display()));
        }
    }

    fn oldest(&self) -> String {
        self.oldest.as_ref().map(|(_, s)| s.clone()).unwrap_or_default()
    }

    fn newest(&self) -> String {
        self.newest.as_ref().map(|(_, s)| s.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassTotals {
    pub count: u32,
    pub minutes: u64,
    extremes: Extremes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub movie_count: u32,
    pub movie_minutes: u64,
    pub movie_time: String,
    pub movie_oldest: String,
    pub movie_newest: String,
    pub show_count: u32,
    pub show_minutes: u64,
    pub show_time: String,
    pub show_oldest: String,
    pub show_newest: String,
}

impl StatsReport {
    /// A report from whichever halves are done; missing halves are zeroed.
    pub fn from_parts(movies: Option<&PassTotals>, shows: Option<&PassTotals>) -> Self {
        let m = movies.cloned().unwrap_or_default();
        let s = shows.cloned().unwrap_or_default();
        StatsReport {
            movie_count: m.count,
            movie_minutes: m.minutes,
            movie_time: format_duration(m.minutes),
            movie_oldest: m.extremes.oldest(),
            movie_newest: m.extremes.newest(),
            show_count: s.count,
            show_minutes: s.minutes,
            show_time: format_duration(s.minutes),
            show_oldest: s.extremes.oldest(),
            show_newest: s.extremes.newest(),
        }
    }
}

pub struct StatsAggregator<'a> {
    lookup: &'a dyn MetadataLookup,
    overrides: &'a OverrideTable,
}

impl<'a> StatsAggregator<'a> {
    pub fn new(lookup: &'a dyn MetadataLookup, overrides: &'a OverrideTable) -> Self {
        Self { lookup, overrides }
    }

    /// Runtime and release extremes of movies last watched inside `window`.
    pub async fn movie_pass(&self, movies: &[WatchedMovie], window: &StatsWindow) -> PassTotals {
        let mut totals = PassTotals::default();
        for w in movies.iter().filter(|w| window.contains(w.last_watched_at)) {
            let key = self.overrides.resolve(w.movie.lookup_key(MediaKind::Movie));
            totals.count += 1;
            totals.minutes += u64::from(runtime_or_zero(self.lookup, key, None, None).await);
            if let Some(date) = release_date_or_none(self.lookup, key).await {
                totals.extremes.observe(date, &w.movie);
            }
        }
        totals
    }

    /// Episodes last watched inside `window`, counted and timed one by one.
    /// Release extremes cover every watched show regardless of the window.
    pub async fn show_pass(&self, shows: &[WatchedShow], window: &StatsWindow) -> PassTotals {
        let mut totals = PassTotals::default();
        for show in shows {
            let key = self.overrides.resolve(show.show.lookup_key(MediaKind::Show));
            for season in &show.seasons {
                for ep in season.episodes.iter().filter(|e| window.contains(e.last_watched_at)) {
                    totals.count += 1;
                    totals.minutes += u64::from(
                        runtime_or_zero(self.lookup, key, Some(season.number), Some(ep.number)).await,
                    );
                }
            }
            if let Some(date) = release_date_or_none(self.lookup, key).await {
                totals.extremes.observe(date, &show.show);
            }
        }
        totals
    }

    async fn movies_from(&self, source: &dyn ActivitySource, window: &StatsWindow) -> PassTotals {
        match source.watched_movies().await {
            Ok(movies) => self.movie_pass(&movies, window).await,
            Err(err) => {
                warn!(error = %err, "movie stats skipped");
                PassTotals::default()
            }
        }
    }

    async fn shows_from(&self, source: &dyn ActivitySource, window: &StatsWindow) -> PassTotals {
        match source.watched_shows().await {
            Ok(shows) => self.show_pass(&shows, window).await,
            Err(err) => {
                warn!(error = %err, "show stats skipped");
                PassTotals::default()
            }
        }
    }

    /// Runs both passes concurrently. `on_update` gets a report each time a
    /// pass finishes; the first one carries defaults for the other half.
    pub async fn compute_progressive<F>(
        &self,
        source: &dyn ActivitySource,
        window: &StatsWindow,
        mut on_update: F,
    ) -> StatsReport
    where
        F: FnMut(&StatsReport),
    {
        let movies = self.movies_from(source, window);
        let shows = self.shows_from(source, window);
        tokio::pin!(movies, shows);

        let mut movie_totals: Option<PassTotals> = None;
        let mut show_totals: Option<PassTotals> = None;
        while movie_totals.is_none() || show_totals.is_none() {
            tokio::select! {
                m = &mut movies, if movie_totals.is_none() => {
                    debug!(count = m.count, "movie stats ready");
                    movie_totals = Some(m);
                }
                s = &mut shows, if show_totals.is_none() => {
                    debug!(count = s.count, "show stats ready");
                    show_totals = Some(s);
                }
            }
            on_update(&StatsReport::from_parts(movie_totals.as_ref(), show_totals.as_ref()));
        }
        StatsReport::from_parts(movie_totals.as_ref(), show_totals.as_ref())
    }

    pub async fn compute(&self, source: &dyn ActivitySource, window: &StatsWindow) -> StatsReport {
        self.compute_progressive(source, window, |_| {}).await
    }
}

/// `"{d} Days {h} Hours {m} Minutes"` with zero parts left out; `"0 Minutes"`
/// for zero.
pub fn format_duration(minutes: u64) -> String {
    if minutes == 0 {
        return "0 Minutes".to_string();
    }
    let days = minutes / MINUTES_PER_DAY;
    let hours = (minutes % MINUTES_PER_DAY) / 60;
    let mins = minutes % 60;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days} Days"));
    }
    if hours > 0 {
        parts.push(format!("{hours} Hours"));
    }
    if mins > 0 {
        parts.push(format!("{mins} Minutes"));
    }
    parts.join(" ").trim().to_string()
}
