//! The WebSocket boundary adapter: translates frames on the wire into
//! [`sig_core::events::InboundEvent`] calls against the
//! [`sig_core::state_machine::SignalingEngine`], and forwards whatever the
//! engine writes to an endpoint's outbound channel back out as JSON text
//! frames.
//!
//! One task pair per connection: a reader loop pumping inbound frames into
//! the engine, and a writer loop draining the per-endpoint `mpsc` channel
//! the multiplexer created at `connect()` time — a decode-then-dispatch
//! loop against a per-peer send queue, adapted from a shared datagram
//! socket to a single persistent WS stream per endpoint.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use uuid::Uuid;

use sig_core::abuse_guard::ConnectOutcome;
use sig_core::events::InboundEvent;

use crate::AppState;

/// Handle the HTTP→WebSocket upgrade. Connection-level abuse checks run
/// before the upgrade is accepted: a hard-blocked or soft-rejected IP never
/// gets a socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let ip = addr.ip();

    match state.abuse_guard.record_connection(ip).await {
        ConnectOutcome::Allowed => {}
        ConnectOutcome::RejectedBlocked { .. } | ConnectOutcome::RejectedSoft => {
            return StatusCode::TOO_MANY_REQUESTS.into_response();
        }
    }

    let check = state.engine.limiters().connection.check(ip);
    if !check.allowed {
        state.abuse_guard.record_suspicious(ip).await;
        state.abuse_guard.track_disconnect(ip).await;
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, ip, state))
}

async fn handle_socket(socket: WebSocket, ip: IpAddr, state: Arc<AppState>) {
    let endpoint_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    state.engine.multiplexer().connect(endpoint_id.clone(), ip, tx);

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                tracing::warn!("failed to serialize outbound event");
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };

        match message {
            Message::Text(text) => dispatch(&state, &endpoint_id, ip, &text).await,
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    writer.abort();
    state.engine.handle_disconnect(&endpoint_id).await;
}

async fn dispatch(state: &Arc<AppState>, endpoint_id: &str, ip: IpAddr, text: &str) {
    let event: InboundEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(%err, endpoint_id, "dropping malformed signaling frame");
            return;
        }
    };

    match event {
        InboundEvent::UploadInit {
            file_name,
            file_size,
            file_type,
            file_hash,
        } => {
            state
                .engine
                .upload_init(endpoint_id, ip, file_name, file_size.0, file_type, file_hash)
                .await;
        }
        InboundEvent::JoinRoom { file_id, code } => {
            state.engine.join_room(endpoint_id, ip, file_id, code).await;
        }
        InboundEvent::Signal { target, data, file_id } => {
            state.engine.signal(endpoint_id, ip, target, file_id, data).await;
        }
        InboundEvent::CancelTransfer { file_id, reason } => {
            state.engine.cancel_transfer(endpoint_id, file_id, reason).await;
        }
        InboundEvent::TransferComplete { file_id } => {
            state.engine.transfer_complete(endpoint_id, file_id).await;
        }
    }
}
