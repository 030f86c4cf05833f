use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde::Serialize;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

mod config;
mod error;
mod history;
mod model;
mod now_playing;
mod overrides;
mod relay;
mod session;
mod stats;
#[cfg(test)]
mod testing;
mod tmdb;
mod trakt;

use config::{TmdbConfig, TraktConfig};
use overrides::OverrideTable;
use relay::{Relay, RelayOptions};
use tmdb::TmdbClient;
use trakt::TraktClient;

const DEFAULT_PORT: u16 = 3000;
const TZ_OFFSET_MINUTES_MIN: i32 = -14 * 60;
const TZ_OFFSET_MINUTES_MAX: i32 = 14 * 60;

#[derive(Parser, Debug)]
#[command(name = "watch_relay", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:3000
    /// - ip (implies port 3000), e.g. 127.0.0.1
    /// - localhost or localhost:port
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: String,

    /// Activity service credentials: {"user_id", "client_id", "client_secret"}.
    #[arg(long, default_value = "./trakt_info.json")]
    trakt_info: PathBuf,

    /// Metadata service credentials: {"api_key"}.
    #[arg(long, default_value = "./tmdb_info.json")]
    tmdb_info: PathBuf,

    /// How often a connected listener gets the now-playing view (seconds).
    #[arg(long, default_value_t = 5)]
    now_playing_seconds: u64,

    /// How often watch history, ratings and stats are refreshed (seconds).
    #[arg(long, default_value_t = 5 * 60)]
    history_seconds: u64,

    /// Timeout for every remote request (seconds).
    #[arg(long, default_value_t = 15)]
    request_timeout_seconds: u64,

    /// Local offset in minutes used to find the start of the stats year,
    /// e.g. 480 for UTC+8.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    tz_offset_minutes: i32,
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watch_relay=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let timeout = Duration::from_secs(args.request_timeout_seconds.max(1));

    let trakt_config = TraktConfig::load(&args.trakt_info)?;
    let tmdb_config = TmdbConfig::load(&args.tmdb_info)?;
    let overrides = OverrideTable::with_entries(trakt_config.overrides.iter().copied());
    info!(user = %trakt_config.user_id, overrides = overrides.len(), "credentials loaded");

    let activity = TraktClient::new(&trakt_config, timeout)?;
    let metadata = TmdbClient::connect(&tmdb_config, timeout).await?;

    let options = RelayOptions {
        now_playing_every: Duration::from_secs(args.now_playing_seconds.max(1)),
        history_every: Duration::from_secs(args.history_seconds.max(1)),
        tz_offset: tz_offset_from_minutes(normalize_tz_offset_minutes(args.tz_offset_minutes)),
    };
    let relay = Arc::new(Relay::new(
        Arc::new(activity),
        Arc::new(metadata),
        overrides,
        options,
    ));

    relay.sync_history().await;
    let entries = relay.history_len().await;
    if entries > 0 {
        info!(entries, "initial history sync done");
    } else {
        warn!("watch history is empty after initial sync; will retry on the next poll");
    }

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::OPTIONS]);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/history", get(get_history))
        .route("/stats", get(get_stats))
        .with_state(relay)
        .layer(cors);

    let addr = parse_listen(&args.listen)?;
    info!("Relay listening on http://{addr} (websocket at /ws)");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if let Some((host, port_str)) = input.rsplit_once(':') {
        if host == "localhost" {
            let port: u16 = port_str.parse().map_err(|_| {
                anyhow::anyhow!(
                    "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                    input,
                    DEFAULT_PORT
                )
            })?;
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port));
        }
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

fn normalize_tz_offset_minutes(v: i32) -> i32 {
    v.clamp(TZ_OFFSET_MINUTES_MIN, TZ_OFFSET_MINUTES_MAX)
}

fn tz_offset_from_minutes(minutes: i32) -> time::UtcOffset {
    time::UtcOffset::from_whole_seconds(minutes.saturating_mul(60))
        .unwrap_or(time::UtcOffset::UTC)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "watch_relay",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(relay): State<Arc<Relay>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::run(relay, socket, peer))
}

async fn get_history(State(relay): State<Arc<Relay>>) -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(relay.history_snapshot().await),
    })
}

async fn get_stats(State(relay): State<Arc<Relay>>) -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(relay.compute_stats().await),
    })
}
