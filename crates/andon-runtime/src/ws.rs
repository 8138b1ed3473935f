//! WebSocket sessions.
//!
//! Each socket becomes one relay connection backed by a `ChannelTransport`.
//! A writer task drains the channel into the socket; the reader loop handles
//! client actions:
//!
//! ```json
//! {"action": "subscribe", "kind": "downtime", "params": ["L1", "press-4"]}
//! {"action": "unsubscribe", "kind": "line", "params": ["L1"]}
//! {"action": "ping"}
//! ```
//!
//! Replies (`subscribed`, `unsubscribed`, `pong`, `error`) use the same push
//! envelope as fan-out messages and share the outbound channel.

use crate::AppState;
use andon_relay::adapters::ChannelTransport;
use andon_relay::{ConnectionId, FanoutApi, OutboundMessage, RelayError, TopicKind, UserId};
use andon_telemetry::log_connection_event;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub user: Option<String>,
}

/// A message sent by a client over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    Subscribe(TopicRequest),
    Unsubscribe(TopicRequest),
    Ping,
}

#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    pub kind: String,
    #[serde(default)]
    pub params: Vec<String>,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = params
        .user
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());
    ws.on_upgrade(move |socket| handle_socket(state, socket, UserId::new(user)))
}

async fn handle_socket(state: AppState, socket: WebSocket, user: UserId) {
    let buffer = state.relay.config().connections.outbound_buffer;
    let (tx, rx) = mpsc::channel::<String>(buffer);
    let (mut sink, stream) = socket.split();

    let id = match state
        .relay
        .connect(Arc::new(ChannelTransport::new(tx.clone())), user.clone())
    {
        Ok(id) => id,
        Err(e) => {
            warn!(user = %user, error = %e, "Rejecting WebSocket connection");
            let frame = error_frame(&e);
            let _ = sink.send(Message::Text(frame)).await;
            let _ = sink.close().await;
            return;
        }
    };
    log_connection_event!(info, "ws", "WebSocket session opened", id, user = %user);

    run_session(state, id, stream, sink, tx, rx).await;
    log_connection_event!(info, "ws", "WebSocket session closed", id);
}

/// Drive one registered connection until the client leaves or the relay
/// drops it. Outbound frames from `rx` and server pings go to `sink`; an
/// evicted connection gets a close frame.
pub async fn run_session<St, Si>(
    state: AppState,
    id: ConnectionId,
    mut stream: St,
    sink: Si,
    tx: mpsc::Sender<String>,
    rx: mpsc::Receiver<String>,
) where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: std::fmt::Display + Send,
{
    let Some(mut closed) = state.relay.closed_signal(id) else {
        return;
    };
    let ping_every = state.relay.config().connections.ping_interval();
    let writer = tokio::spawn(write_frames(sink, rx, closed.clone(), ping_every));

    loop {
        tokio::select! {
            _ = relay_closed(&mut closed) => {
                debug!(connection_id = %id, "Connection dropped by relay");
                break;
            }
            next = stream.next() => {
                let Some(result) = next else { break };
                if !handle_incoming(&state, id, &tx, result).await {
                    break;
                }
            }
        }
    }

    state.relay.disconnect(id);
    drop(tx);
    if let Err(e) = writer.await {
        error!(connection_id = %id, error = %e, "WebSocket writer task failed");
    }
}

/// Returns false when the session should end.
async fn handle_incoming(
    state: &AppState,
    id: ConnectionId,
    tx: &mpsc::Sender<String>,
    result: Result<Message, axum::Error>,
) -> bool {
    match result {
        Ok(Message::Text(text)) => {
            // Inbound traffic keeps the connection healthy
            if state.relay.touch(id, text.len() as u64).is_err() {
                return false;
            }
            match handle_text(state, id, &text) {
                Some(reply) => tx.send(reply).await.is_ok(),
                None => true,
            }
        }
        Ok(Message::Binary(data)) => state.relay.touch(id, data.len() as u64).is_ok(),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => state.relay.touch(id, 0).is_ok(),
        Ok(Message::Close(_)) => {
            debug!(connection_id = %id, "WebSocket close received");
            false
        }
        Err(e) => {
            warn!(connection_id = %id, error = %e, "WebSocket error");
            false
        }
    }
}

async fn relay_closed(closed: &mut watch::Receiver<bool>) {
    // A dropped sender means the entry itself is gone
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn write_frames<Si>(
    mut sink: Si,
    mut rx: mpsc::Receiver<String>,
    mut closed: watch::Receiver<bool>,
    ping_every: Duration,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display + Send,
{
    let mut ping = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            _ = relay_closed(&mut closed) => {
                Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "connection closed by relay".into(),
                }))
            }
            frame = rx.recv() => match frame {
                Some(frame) => Message::Text(frame),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "WebSocket write failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Apply one client frame and build the reply, if any.
pub fn handle_text(state: &AppState, id: ConnectionId, text: &str) -> Option<String> {
    let action: ClientAction = match serde_json::from_str(text) {
        Ok(action) => action,
        Err(e) => {
            return Some(error_frame(&RelayError::Validation(format!(
                "unreadable client message: {e}"
            ))))
        }
    };

    let result = match action {
        ClientAction::Ping => return Some(envelope("pong", json!({}))),
        ClientAction::Subscribe(request) => apply(state, id, request, true),
        ClientAction::Unsubscribe(request) => apply(state, id, request, false),
    };

    Some(match result {
        Ok(frame) => frame,
        Err(e) => error_frame(&e),
    })
}

fn apply(
    state: &AppState,
    id: ConnectionId,
    request: TopicRequest,
    subscribe: bool,
) -> Result<String, RelayError> {
    let kind = request
        .kind
        .parse::<TopicKind>()
        .map_err(|e| RelayError::Validation(e.to_string()))?;

    let changed = if subscribe {
        state.relay.subscribe_parts(id, kind, &request.params)?
    } else {
        state.relay.unsubscribe_parts(id, kind, &request.params)?
    };

    let reply_type = if subscribe { "subscribed" } else { "unsubscribed" };
    Ok(envelope(
        reply_type,
        json!({
            "kind": kind,
            "params": request.params,
            "changed": changed,
        }),
    ))
}

fn envelope(event_type: &str, payload: serde_json::Value) -> String {
    let message = OutboundMessage::new(event_type, payload);
    serde_json::to_string(&message).unwrap_or_else(|_| {
        format!(r#"{{"type":"{event_type}","payload":{{}},"priority":3}}"#)
    })
}

fn error_frame(err: &RelayError) -> String {
    envelope("error", err.to_json())
}
