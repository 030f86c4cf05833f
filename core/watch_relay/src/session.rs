//! One websocket listener: waits for "ready", then keeps it fed.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::relay::{Emitter, Inbound, Outbound, Poll, Relay};

const OUTBOUND_QUEUE: usize = 64;

pub async fn run(relay: Arc<Relay>, socket: WebSocket, peer: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE);
    let out = Emitter::new(tx);

    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(err) => {
                    warn!(error = %err, "failed to encode message");
                    continue;
                }
            };
            if let Err(err) = ws_sender.send(Message::Text(text)).await {
                debug!(%peer, error = %err, "write failed; listener gone");
                return;
            }
        }
    });

    info!(%peer, "listener connected");
    let mut polling = false;

    while let Some(result) = ws_receiver.next().await {
        let msg = match result {
            Ok(m) => m,
            Err(err) => {
                warn!(%peer, error = %err, "read error");
                break;
            }
        };
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => continue,
        };
        match serde_json::from_str::<Inbound>(&text) {
            Ok(Inbound::Ready) => {
                info!(%peer, "listener ready");
                let relay_for_cycle = relay.clone();
                let out_for_cycle = out.clone();
                tokio::spawn(async move { relay_for_cycle.full_cycle(&out_for_cycle).await });

                if !polling {
                    polling = true;
                    let opts = relay.options();
                    tokio::spawn(relay.clone().poll_until_closed(
                        out.clone(),
                        opts.now_playing_every,
                        Poll::NowPlaying,
                    ));
                    tokio::spawn(relay.clone().poll_until_closed(
                        out.clone(),
                        opts.history_every,
                        Poll::History,
                    ));
                }
            }
            Err(_) => debug!(%peer, raw = %text, "ignoring message"),
        }
    }

    // Dropping the receiver closes the channel, which stops the pollers.
    write_task.abort();
    let _ = write_task.await;
    info!(%peer, "listener disconnected");
}
