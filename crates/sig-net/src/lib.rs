//! # sig-net
//!
//! The HTTP and WebSocket boundary: the only crate in the workspace that
//! terminates a socket. Everything it does is translate wire frames into
//! calls against [`sig_core::state_machine::SignalingEngine`] and back —
//! no signaling logic lives here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod headers;
pub mod ice;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use sig_core::abuse_guard::AbuseGuard;
use sig_core::state_machine::SignalingEngine;
use sig_crypto::relay_credential::RelayCredentialMinter;

/// Shared application state handed to every route.
pub struct AppState {
    /// The signaling engine every event is dispatched through.
    pub engine: Arc<SignalingEngine>,
    /// The connection-level abuse guard, shared with the engine so the
    /// counters the boundary adapter updates on accept/reject are the same
    /// ones the engine consults for session-scoped violations.
    pub abuse_guard: Arc<AbuseGuard>,
    /// Mints short-lived TURN credentials for `/api/ice-servers`.
    pub relay_minter: Arc<RelayCredentialMinter>,
}

/// Build the full router: `/ws` for signaling, `/api/ice-servers` for relay
/// credential minting, with the security-header middleware applied to both.
/// CORS is deployment-specific (depends on the configured client origin) so
/// the caller supplies its own `tower_http::cors::CorsLayer`.
pub fn router(state: Arc<AppState>, cors: tower_http::cors::CorsLayer) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/ice-servers", get(ice::ice_servers_handler))
        .layer(axum::middleware::from_fn(headers::security_headers))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
