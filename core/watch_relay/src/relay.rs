//! Ties the remote clients, the history store and the aggregators together
//! and decides what gets pushed to a listener, and when.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::history::{rating_distribution, Entry, WatchHistoryStore, RATING_BUCKETS};
use crate::now_playing::{self, NowPlayingView};
use crate::overrides::OverrideTable;
use crate::stats::{StatsAggregator, StatsReport, StatsWindow};
use crate::tmdb::MetadataLookup;
use crate::trakt::ActivitySource;

/// Messages pushed to a listener, serialized as `{"event": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Outbound {
    NowPlayingInfo(NowPlayingView),
    WatchHistory(Vec<Entry>),
    Ratings([u32; RATING_BUCKETS]),
    Stats(StatsReport),
}

/// Messages a listener may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Inbound {
    Ready,
}

/// When to push the history snapshot after a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    /// Always push (listener just became ready).
    Always,
    /// Push only if an entry was added or a rating changed.
    OnChange,
}

/// How long a history snapshot may wait for room in a listener's queue.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Sending half of a listener connection. Sends never fail loudly: once the
/// listener is gone messages are dropped.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::Sender<Outbound>,
    /// Set when a history snapshot could not be delivered; the next poll
    /// pushes one even if nothing changed.
    history_stale: Arc<AtomicBool>,
}

impl Emitter {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            tx,
            history_stale: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn emit(&self, msg: Outbound) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("listener gone; dropping message");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("listener not keeping up; dropping message");
            }
        }
    }

    /// Waits up to [`DELIVERY_TIMEOUT`] for queue space. Returns whether the
    /// message was queued.
    pub async fn deliver(&self, msg: Outbound) -> bool {
        match tokio::time::timeout(DELIVERY_TIMEOUT, self.tx.send(msg)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                debug!("listener gone; dropping message");
                false
            }
            Err(_) => {
                warn!("listener stalled; dropping message");
                false
            }
        }
    }

    fn mark_history_stale(&self) {
        self.history_stale.store(true, Ordering::Relaxed);
    }

    fn take_history_stale(&self) -> bool {
        self.history_stale.swap(false, Ordering::Relaxed)
    }

    /// Resolves once the listener side has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    pub now_playing_every: Duration,
    pub history_every: Duration,
    /// Where the stats year starts.
    pub tz_offset: UtcOffset,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            now_playing_every: Duration::from_secs(5),
            history_every: Duration::from_secs(5 * 60),
            tz_offset: UtcOffset::UTC,
        }
    }
}

pub struct Relay {
    activity: Arc<dyn ActivitySource>,
    metadata: Arc<dyn MetadataLookup>,
    overrides: OverrideTable,
    store: WatchHistoryStore,
    options: RelayOptions,
}

impl Relay {
    pub fn new(
        activity: Arc<dyn ActivitySource>,
        metadata: Arc<dyn MetadataLookup>,
        overrides: OverrideTable,
        options: RelayOptions,
    ) -> Self {
        Self {
            activity,
            metadata,
            overrides,
            store: WatchHistoryStore::new(),
            options,
        }
    }

    pub fn options(&self) -> RelayOptions {
        self.options
    }

    pub async fn history_len(&self) -> usize {
        self.store.len().await
    }

    pub async fn history_snapshot(&self) -> Vec<Entry> {
        self.store.snapshot().await
    }

    /// Fetches the watched-movies list and merges it, most recent first.
    /// Remote failures are logged and reported as "nothing changed".
    pub async fn sync_history(&self) -> bool {
        let mut movies = match self.activity.watched_movies().await {
            Ok(m) => m,
            Err(err) => {
                warn!(error = %err, "watch history unavailable");
                return false;
            }
        };
        movies.sort_by(|a, b| b.last_watched_at.cmp(&a.last_watched_at));
        self.store
            .merge(&movies, self.metadata.as_ref(), &self.overrides)
            .await
    }

    /// Applies the remote ratings to the store. Returns the bucket counts and
    /// whether any stored rating changed; `None` if the ratings were
    /// unavailable.
    pub async fn sync_ratings(&self) -> Option<([u32; RATING_BUCKETS], bool)> {
        let ratings = match self.activity.movie_ratings().await {
            Ok(r) => r,
            Err(err) => {
                warn!(error = %err, "ratings unavailable");
                return None;
            }
        };
        let mut changed = false;
        for r in &ratings {
            changed |= self.store.apply_rating(r.stable_id, r.rating).await;
        }
        Some((rating_distribution(&ratings), changed))
    }

    pub async fn push_now_playing(&self, out: &Emitter) {
        match self.activity.watching().await {
            Ok(activity) => {
                let view =
                    now_playing::resolve(activity.as_ref(), self.metadata.as_ref(), &self.overrides)
                        .await;
                out.emit(Outbound::NowPlayingInfo(view));
            }
            Err(err @ RelayError::MalformedActivity(_)) => {
                error!(error = %err, "rejecting now-playing record");
            }
            // Keep the listener's last view rather than flicker to "nothing".
            Err(err) => warn!(error = %err, "now playing unavailable"),
        }
    }

    /// History sync followed by ratings, then the pushes `policy` allows.
    /// Under `OnChange` the snapshot goes out when an entry was added, a
    /// rating changed, or the previous snapshot never reached the listener.
    pub async fn push_history(&self, out: &Emitter, policy: Emit) {
        let added = self.sync_history().await;
        let ratings = self.sync_ratings().await;
        let rated = ratings.map_or(false, |(_, changed)| changed);
        let stale = out.take_history_stale();

        if policy == Emit::Always || added || rated || stale {
            let snapshot = Outbound::WatchHistory(self.store.snapshot().await);
            if !out.deliver(snapshot).await {
                out.mark_history_stale();
            }
        } else {
            debug!("watch history unchanged; not pushing");
        }
        if let Some((buckets, _)) = ratings {
            out.emit(Outbound::Ratings(buckets));
        }
    }

    pub fn stats_window(&self) -> StatsWindow {
        StatsWindow::year_to_date(OffsetDateTime::now_utc(), self.options.tz_offset)
    }

    pub async fn compute_stats(&self) -> StatsReport {
        StatsAggregator::new(self.metadata.as_ref(), &self.overrides)
            .compute(self.activity.as_ref(), &self.stats_window())
            .await
    }

    /// Pushes a stats report each time the movie or show half completes.
    pub async fn push_stats(&self, out: &Emitter) {
        StatsAggregator::new(self.metadata.as_ref(), &self.overrides)
            .compute_progressive(self.activity.as_ref(), &self.stats_window(), |report| {
                out.emit(Outbound::Stats(report.clone()))
            })
            .await;
    }

    /// Everything a freshly ready listener needs.
    pub async fn full_cycle(&self, out: &Emitter) {
        info!("full cycle");
        tokio::join!(
            self.push_now_playing(out),
            self.push_history(out, Emit::Always),
            self.push_stats(out),
        );
    }

    /// Runs `poll` every `every` until the listener disconnects. A tick in
    /// progress is allowed to finish; its output is dropped if nobody is
    /// listening any more.
    pub async fn poll_until_closed(self: Arc<Self>, out: Emitter, every: Duration, poll: Poll) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the ready cycle covered it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = out.closed() => break,
            }
            match poll {
                Poll::NowPlaying => self.push_now_playing(&out).await,
                Poll::History => {
                    self.push_history(&out, Emit::OnChange).await;
                    self.push_stats(&out).await;
                }
            }
        }
        debug!(?poll, "poll stopped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    NowPlaying,
    History,
}
