//! Turns the "currently watching" record into what listeners display.

use serde::Serialize;

use crate::model::{Activity, MediaKind};
use crate::overrides::OverrideTable;
use crate::tmdb::{genres_or_empty, page_link, poster_or_empty, MetadataLookup};

const NOTHING_PLAYING: &str = "Nothing Currently Playing";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NowPlayingView {
    pub title: String,
    pub subtitle: String,
    pub poster: String,
    pub genres: Vec<String>,
    pub link: String,
}

impl NowPlayingView {
    pub fn nothing_playing() -> Self {
        NowPlayingView {
            title: NOTHING_PLAYING.to_string(),
            subtitle: String::new(),
            poster: String::new(),
            genres: Vec::new(),
            link: String::new(),
        }
    }
}

/// Builds the view. Poster and genres are fetched concurrently; `None`
/// makes no remote calls at all.
pub async fn resolve(
    activity: Option<&Activity>,
    lookup: &dyn MetadataLookup,
    overrides: &OverrideTable,
) -> NowPlayingView {
    match activity {
        None => NowPlayingView::nothing_playing(),
        Some(Activity::Movie(movie)) => {
            let key = overrides.resolve(movie.lookup_key(MediaKind::Movie));
            let (poster, genres) = tokio::join!(
                poster_or_empty(lookup, key, None),
                genres_or_empty(lookup, key)
            );
            NowPlayingView {
                title: movie.display(),
                subtitle: String::new(),
                poster,
                genres,
                link: page_link(key, &movie.slug),
            }
        }
        Some(Activity::Episode { show, episode }) => {
            let key = overrides.resolve(show.lookup_key(MediaKind::Show));
            let (poster, genres) = tokio::join!(
                poster_or_empty(lookup, key, Some(episode.season)),
                genres_or_empty(lookup, key)
            );
            NowPlayingView {
                title: show.display(),
                // "3x04 Title", or just "3x04" when the episode is untitled.
                subtitle: format!("{}x{:02} {}", episode.season, episode.number, episode.title)
                    .trim_end()
                    .to_string(),
                poster,
                genres,
                link: page_link(key, &show.slug),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EpisodeInfo, RawWatching};
    use crate::testing::{title, FakeMetadata};

    #[tokio::test]
    async fn nothing_playing_is_the_sentinel_and_calls_nothing() {
        let meta = FakeMetadata::default();
        let view = resolve(None, &meta, &OverrideTable::default()).await;
        assert_eq!(view.title, "Nothing Currently Playing");
        assert_eq!(view.subtitle, "");
        assert_eq!(view.poster, "");
        assert!(view.genres.is_empty());
        assert_eq!(view.link, "");
        assert_eq!(meta.total_calls(), 0);
    }

    #[tokio::test]
    async fn movie_branch_uses_movie_metadata() {
        let meta = FakeMetadata::default()
            .with_poster(MediaKind::Movie, 1001, None, "poster.jpg")
            .with_genres(MediaKind::Movie, 1001, &["Drama", "Action"]);
        let movie = Activity::Movie(title(1, "Heat", 1995));
        let view = resolve(Some(&movie), &meta, &OverrideTable::default()).await;
        assert_eq!(view.title, "Heat (1995)");
        assert_eq!(view.subtitle, "");
        assert_eq!(view.poster, "poster.jpg");
        assert_eq!(view.genres, vec!["Drama", "Action"]);
        assert_eq!(view.link, "https://www.themoviedb.org/movie/1001-heat");
    }

    #[tokio::test]
    async fn episode_branch_uses_season_poster_and_padded_number() {
        let meta = FakeMetadata::default()
            .with_poster(MediaKind::Show, 1002, Some(3), "s3.jpg")
            .with_genres(MediaKind::Show, 1002, &["Comedy"]);
        let activity = Activity::Episode {
            show: title(2, "Community", 2009),
            episode: EpisodeInfo {
                season: 3,
                number: 4,
                title: "Remedial Chaos Theory".to_string(),
            },
        };
        let view = resolve(Some(&activity), &meta, &OverrideTable::default()).await;
        assert_eq!(view.title, "Community (2009)");
        assert_eq!(view.subtitle, "3x04 Remedial Chaos Theory");
        assert_eq!(view.poster, "s3.jpg");
        assert_eq!(view.genres, vec!["Comedy"]);
        assert_eq!(view.link, "https://www.themoviedb.org/tv/1002-community");
    }

    #[tokio::test]
    async fn untitled_episode_subtitle_has_no_trailing_space() {
        let activity = Activity::Episode {
            show: title(2, "Community", 2009),
            episode: EpisodeInfo {
                season: 3,
                number: 4,
                title: String::new(),
            },
        };
        let view = resolve(Some(&activity), &FakeMetadata::default(), &OverrideTable::default()).await;
        assert_eq!(view.subtitle, "3x04");
    }

    #[tokio::test]
    async fn failed_enrichment_leaves_placeholders() {
        let meta = FakeMetadata::default().with_unavailable(1001);
        let movie = Activity::Movie(title(1, "Heat", 1995));
        let view = resolve(Some(&movie), &meta, &OverrideTable::default()).await;
        assert_eq!(view.title, "Heat (1995)");
        assert_eq!(view.poster, "");
        assert!(view.genres.is_empty());
        assert_eq!(meta.total_calls(), 2);
    }

    #[tokio::test]
    async fn movie_plus_show_is_rejected_not_resolved_as_movie() {
        let raw: RawWatching = serde_json::from_value(serde_json::json!({
            "movie": { "title": "Heat", "year": 1995, "ids": { "trakt": 1, "tmdb": 949 } },
            "show": { "title": "Community", "year": 2009, "ids": { "trakt": 2, "tmdb": 18347 } },
            "episode": { "season": 1, "number": 1, "title": "Pilot" }
        }))
        .unwrap();
        let err = Activity::try_from(raw).unwrap_err();
        assert!(matches!(err, crate::error::RelayError::MalformedActivity(_)));
    }
}
