#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use sync_gateway::config::Config;
use sync_gateway::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Config for tests: no synthetic ticker, generous idle timeout.
pub fn test_config() -> Config {
    Config {
        ticker: None,
        idle_timeout: Duration::from_secs(30),
        ..Config::default()
    }
}

/// Build the full application router wired to fresh state.
pub fn test_app(config: Config) -> (Router, AppState) {
    let state = AppState::new(config);
    let app = sync_gateway::routes::router().with_state(state.clone());
    (app, state)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_ws_server(config: Config) -> (SocketAddr, AppState) {
    let (app, state) = test_app(config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Connect a WebSocket client to `path` (e.g. "/" or "/ws").
pub async fn connect(addr: SocketAddr, path: &str) -> WsClient {
    let url = format!("ws://{addr}{path}");
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws_stream
}

pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

pub async fn subscribe(ws: &mut WsClient, video_id: &str) {
    send_json(
        ws,
        serde_json::json!({ "type": "video:subscribe", "video_id": video_id }),
    )
    .await;
}

pub async fn unsubscribe(ws: &mut WsClient, video_id: &str) {
    send_json(
        ws,
        serde_json::json!({ "type": "video:unsubscribe", "video_id": video_id }),
    )
    .await;
}

/// Read the next JSON text frame, skipping pings and pongs.
pub async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");

        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("parse frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected text frame, got: {other:?}"),
        }
    }
}

/// Assert no text frame arrives within `window`.
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    let deadline = time::Instant::now() + window;
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_elapsed) => return,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(other) => panic!("Expected silence, got: {other:?}"),
        }
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        time::sleep(Duration::from_millis(10)).await;
    }
}
