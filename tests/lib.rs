//! Shared harness for driving the signaling server's real WebSocket and
//! HTTP surface in integration tests: an in-process axum server over an
//! in-memory repository, reachable through an ordinary WS/HTTP client,
//! spun up fresh on an ephemeral port for every test.

use std::net::SocketAddr;
use std::sync::Arc;

use sig_core::abuse_guard::AbuseGuard;
use sig_core::audit::AuditLog;
use sig_core::repository::MemorySessionRepository;
use sig_core::state_machine::SignalingEngine;
use sig_crypto::relay_credential::{RelayConfig, RelayCredentialMinter};
use sig_net::AppState;

/// A running test server and the base URLs to reach it on.
pub struct TestServer {
    /// `ws://127.0.0.1:<port>/ws`
    pub ws_url: String,
    /// `http://127.0.0.1:<port>`
    pub http_url: String,
    /// The shared application state, exposed so tests can poke the audit
    /// log or abuse guard directly for assertions the wire protocol
    /// doesn't surface.
    pub state: Arc<AppState>,
}

/// Spin up a full signaling server (real axum router, real WebSocket
/// upgrade, in-memory repository, no field encryption) bound to an
/// ephemeral localhost port.
pub async fn spawn_test_server() -> TestServer {
    let repository = Arc::new(MemorySessionRepository::new());
    let abuse_guard = Arc::new(AbuseGuard::new());
    let audit = Arc::new(AuditLog::new());
    let engine = Arc::new(SignalingEngine::new(repository, None, abuse_guard.clone(), audit));
    let relay_minter = Arc::new(RelayCredentialMinter::new(RelayConfig::default()));

    let state = Arc::new(AppState {
        engine,
        abuse_guard,
        relay_minter,
    });

    let cors = tower_http::cors::CorsLayer::permissive();
    let app = sig_net::router(state.clone(), cors).into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        ws_url: format!("ws://{addr}/ws"),
        http_url: format!("http://{addr}"),
        state,
    }
}
