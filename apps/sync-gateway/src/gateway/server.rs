//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::time;

use crate::AppState;

use super::connection::{ConnectionHandle, ConnectionState, Outbound};
use super::lifecycle::{CloseReason, ConnectionLifecycle};
use super::router::route_frame;

/// Close codes sent by the gateway (4000-range for application-level).
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_IDLE_TIMEOUT: u16 = 4009;

/// How long the writer gets to flush queued frames after the read loop ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lower bound for the idle timer period; `time::interval` rejects zero.
const MIN_IDLE_TIMEOUT: Duration = Duration::from_millis(1);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(ws_upgrade))
        .route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();

    let (handle, outbound_rx) = ConnectionHandle::new(state.config.outbound_buffer);
    let lifecycle = ConnectionLifecycle::new(handle, state.registry.clone());
    let connection_id = lifecycle.handle().id().clone();

    state.connections.register(lifecycle.handle());
    tracing::info!(%connection_id, "new client connected");

    let writer_stopped = Arc::new(Notify::new());
    let mut writer = tokio::spawn(run_writer(ws_tx, outbound_rx, writer_stopped.clone()));

    let reason = run_reader(&state, &lifecycle, ws_rx, &writer_stopped).await;
    if reason == CloseReason::IdleTimeout {
        let _ = lifecycle.handle().enqueue(Outbound::Close {
            code: CLOSE_IDLE_TIMEOUT,
            reason: "Idle timeout",
        });
    }
    let removed = lifecycle.close(reason).unwrap_or(0);

    // Dropping the last handle lets the writer drain its queue and exit.
    drop(lifecycle);
    if time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
    state.connections.deregister(&connection_id);

    tracing::info!(%connection_id, %reason, removed, "client disconnected");
}

/// Read loop: route inbound frames, watch for idle timeout, and report why
/// the connection ended.
async fn run_reader(
    state: &AppState,
    lifecycle: &ConnectionLifecycle,
    mut ws_rx: SplitStream<WebSocket>,
    writer_stopped: &Notify,
) -> CloseReason {
    let conn = lifecycle.handle();
    let mut idle_timer = time::interval(state.config.idle_timeout.max(MIN_IDLE_TIMEOUT));
    idle_timer.tick().await; // First tick fires immediately; skip it.
    let mut saw_activity = false;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                saw_activity = true;
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        route_frame(&state.registry, conn, text.as_str().as_bytes());
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        route_frame(&state.registry, conn, &bytes);
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) => {
                        lifecycle.begin_closing();
                        return CloseReason::ClientClosed;
                    }
                    None => return CloseReason::ClientClosed,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %conn.id(), "ws read error");
                        return CloseReason::TransportError;
                    }
                }
            }

            _ = writer_stopped.notified() => {
                // A close frame queued at shutdown marks the handle closing first.
                return if lifecycle.state() == ConnectionState::Closing {
                    CloseReason::ServerShutdown
                } else {
                    CloseReason::WriterFailed
                };
            }

            _ = idle_timer.tick() => {
                if !saw_activity {
                    tracing::debug!(connection_id = %conn.id(), "idle timeout, closing connection");
                    return CloseReason::IdleTimeout;
                }
                saw_activity = false;
                // Ask the client for a pong so quiet subscribers stay alive.
                let _ = conn.enqueue(Outbound::Ping);
            }
        }
    }
}

/// Write loop: drain the connection's outbound queue into the socket.
/// Signals `writer_stopped` after a write error or a sent close frame.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    writer_stopped: Arc<Notify>,
) {
    while let Some(frame) = outbound_rx.recv().await {
        let closing = matches!(frame, Outbound::Close { .. });
        let msg = match frame {
            Outbound::Text(text) => Message::Text(text),
            Outbound::Ping => Message::Ping(Bytes::new()),
            Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
                code,
                reason: reason.to_string().into(),
            })),
        };
        if let Err(e) = ws_tx.send(msg).await {
            tracing::debug!(?e, "ws write error");
            writer_stopped.notify_one();
            return;
        }
        if closing {
            writer_stopped.notify_one();
            return;
        }
    }
    let _ = ws_tx.close().await;
}
