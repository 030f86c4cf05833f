//! Deduplicated, poster-enriched watch history.
//!
//! Entries are keyed by the activity service's stable id. An entry is built
//! once, the first time its id shows up, and afterwards only its rating
//! changes. Merges are serialized so two overlapping polls cannot both decide
//! an id is new and fetch its poster twice.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::model::{MediaKind, RatedMovie, WatchedMovie};
use crate::overrides::OverrideTable;
use crate::tmdb::{page_link, poster_or_empty, MetadataLookup};

/// Number of rating buckets (0..=10).
pub const RATING_BUCKETS: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub stable_id: i64,
    pub title: String,
    /// Empty when no poster could be found.
    pub poster_url: String,
    pub source_link: String,
    pub rating: Option<u8>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<i64, Entry>,
    /// Most recently watched first, as of the last merge.
    order: Vec<i64>,
}

#[derive(Default)]
pub struct WatchHistoryStore {
    /// Held for the whole of a merge.
    merge_gate: Mutex<()>,
    inner: Mutex<Inner>,
}

impl WatchHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the full remote list into the store.
    ///
    /// `watched` must already be sorted most-recent-first. Known ids are
    /// skipped without any remote call; unknown ids get a poster lookup and
    /// a new entry. The store's order is then realigned with `watched`, so
    /// rewatches move to the front. Returns `true` iff an entry was added.
    pub async fn merge(
        &self,
        watched: &[WatchedMovie],
        lookup: &dyn MetadataLookup,
        overrides: &OverrideTable,
    ) -> bool {
        let _gate = self.merge_gate.lock().await;
        let mut added = 0usize;

        for w in watched {
            let stable_id = w.movie.stable_id;
            if self.inner.lock().await.entries.contains_key(&stable_id) {
                continue;
            }

            let key = overrides.resolve(w.movie.lookup_key(MediaKind::Movie));
            let poster_url = poster_or_empty(lookup, key, None).await;
            let entry = Entry {
                stable_id,
                title: w.movie.title.clone(),
                poster_url,
                source_link: page_link(key, &w.movie.slug),
                rating: None,
            };

            let mut inner = self.inner.lock().await;
            inner.entries.insert(stable_id, entry);
            inner.order.push(stable_id);
            added += 1;
            debug!(stable_id, title = %w.movie.title, "added history entry");
        }

        let mut inner = self.inner.lock().await;
        inner.order = recency_order(&inner.order, watched);
        if added > 0 {
            info!(added, total = inner.entries.len(), "watch history grew");
        }
        added > 0
    }

    /// Entries most-recent-first.
    pub async fn snapshot(&self) -> Vec<Entry> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Sets the rating of a known entry; unknown ids are ignored. Returns
    /// `true` if a stored rating actually changed.
    pub async fn apply_rating(&self, stable_id: i64, rating: u8) -> bool {
        match self.inner.lock().await.entries.get_mut(&stable_id) {
            Some(e) if e.rating != Some(rating) => {
                e.rating = Some(rating);
                true
            }
            _ => false,
        }
    }
}

/// Ids in `watched` order (first occurrence wins), followed by any ids the
/// remote no longer lists, in their previous order.
fn recency_order(previous: &[i64], watched: &[WatchedMovie]) -> Vec<i64> {
    let known: HashSet<i64> = previous.iter().copied().collect();
    let mut seen = HashSet::with_capacity(previous.len());
    let mut out = Vec::with_capacity(previous.len());
    for w in watched {
        let id = w.movie.stable_id;
        if known.contains(&id) && seen.insert(id) {
            out.push(id);
        }
    }
    for &id in previous {
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}

/// Count of rated movies per rating value; bucket `i` holds rating `i`.
pub fn rating_distribution(ratings: &[RatedMovie]) -> [u32; RATING_BUCKETS] {
    let mut buckets = [0u32; RATING_BUCKETS];
    for r in ratings {
        if let Some(b) = buckets.get_mut(r.rating as usize) {
            *b += 1;
        }
    }
    buckets
}
