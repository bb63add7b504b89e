//! `GET /api/ice-servers` — mints a fresh short-lived relay credential and
//! returns the STUN/TURN server list a browser should use for this
//! negotiation.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use uuid::Uuid;

use sig_crypto::IceServer;

use crate::AppState;

/// Response body for `GET /api/ice-servers`: `{"iceServers": [...]}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IceServersResponse {
    /// The connectivity-establishment server list.
    #[serde(rename = "iceServers")]
    pub ice_servers: Vec<IceServer>,
}

/// Handle `GET /api/ice-servers`. Every call mints an independent
/// credential scoped to a random tag — callers are not expected to reuse
/// the response across sessions.
pub async fn ice_servers_handler(State(state): State<Arc<AppState>>) -> Json<IceServersResponse> {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let user_tag = Uuid::new_v4().to_string();
    Json(IceServersResponse {
        ice_servers: state.relay_minter.ice_servers(now, &user_tag),
    })
}
