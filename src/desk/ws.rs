use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use brodesk_common::ChangeEvent;
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::api::SharedState;
use super::feed::{ChangeFeed, FeedItem, Subscription};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Frames pushed to browser clients. Both mean "refetch"; neither carries
/// ticket fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    Change(ChangeEvent),
    /// The connection fell behind and `missed` events were dropped.
    Resync { missed: u64 },
}

impl From<FeedItem> for WsMessage {
    fn from(item: FeedItem) -> Self {
        match item {
            FeedItem::Event(event) => Self::Change(event),
            FeedItem::Lagged(missed) => Self::Resync { missed },
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (sender, receiver) = socket.split();
    let subscription = state.feed.subscribe();
    debug!(subscribers = state.feed.subscriber_count(), "change feed client connected");
    run_socket_loop(sender, receiver, subscription).await;
    debug!("change feed client disconnected");
}

/// Forward feed items to the client, with ping/pong keepalive.
///
/// If no Pong arrives within [`PONG_TIMEOUT`] of a Ping, the connection is
/// treated as dead and the loop exits, releasing the subscription.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut subscription: Subscription,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick is immediate.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!("change feed client timed out");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            item = subscription.recv() => {
                let Some(item) = item else { break };
                let json = match serde_json::to_string(&WsMessage::from(item)) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize feed frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    subscription.unsubscribe();
    let _ = sender.send(Message::Close(None)).await;
}
