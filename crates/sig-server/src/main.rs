//! Process wiring for the signaling server: reads configuration, connects
//! the repository, builds the signaling engine and the axum router, and
//! runs the graceful-shutdown sequence from the concurrency model (stop
//! accepting, close connections, drain the repository, exit within 10s).

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};

use config::Config;
use sig_core::abuse_guard::AbuseGuard;
use sig_core::audit::AuditLog;
use sig_core::state_machine::SignalingEngine;
use sig_core::sweeper::Sweeper;
use sig_crypto::field_encryption::FieldCipher;
use sig_crypto::relay_credential::{RelayConfig, RelayCredentialMinter};
use sig_net::AppState;
use sig_store::PgSessionRepository;

/// Grace period allotted to the shutdown sequence before a force-exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Signal relay — signaling and session-coordination server.
#[derive(Parser, Debug)]
#[command(name = "sig-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Override the bind port (defaults to `PORT`, then 4000).
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate()?;

    tracing::info!(port = config.port, production = config.is_production(), "starting signaling server");

    let repository = Arc::new(
        PgSessionRepository::connect(&config.database_url, 10)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to repository: {e}"))?,
    );

    let cipher = FieldCipher::resolve(config.metadata_encryption_key.as_deref(), config.is_production())
        .map_err(|e| anyhow::anyhow!("failed to resolve field encryption key: {e}"))?
        .map(Arc::new);

    let abuse_guard = Arc::new(AbuseGuard::new());
    let audit = Arc::new(AuditLog::new());

    let engine = Arc::new(SignalingEngine::new(repository.clone(), cipher, abuse_guard.clone(), audit.clone()));

    let relay_config = RelayConfig {
        turn_server: config.turn_server.clone(),
        turn_secret: config.turn_secret.clone(),
        turns_enabled: config.turns_enabled,
        ..RelayConfig::default()
    };
    let relay_minter = Arc::new(RelayCredentialMinter::new(relay_config));

    let state = Arc::new(AppState {
        engine: engine.clone(),
        abuse_guard: abuse_guard.clone(),
        relay_minter,
    });

    let cors = CorsLayer::new()
        .allow_origin(parse_origin(&config.client_url))
        .allow_methods([axum::http::Method::GET])
        .allow_headers(tower_http::cors::Any);

    let app = sig_net::router(state, cors).into_make_service_with_connect_info::<SocketAddr>();

    let limiters_sweep: Arc<dyn Fn() + Send + Sync> = {
        let engine = engine.clone();
        Arc::new(move || engine.limiters().sweep_all())
    };
    let sweeper = Sweeper::spawn(
        repository.clone(),
        engine.registry().clone(),
        engine.concurrency_cap().clone(),
        limiters_sweep,
        abuse_guard.clone(),
        audit.clone(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown();
    tracing::info!("signaling server stopped");
    Ok(())
}

/// Waits for `SIGTERM`/`SIGINT` (or `Ctrl+C` on platforms without Unix
/// signals), then returns to let axum start draining connections. A
/// watchdog forcibly exits the process if shutdown hasn't completed within
/// [`SHUTDOWN_GRACE`] — axum's own graceful shutdown only waits for
/// in-flight HTTP requests, not the long-lived WebSocket upgrades this
/// server mostly serves.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received, draining connections");
    tokio::spawn(async {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        tracing::warn!("graceful shutdown exceeded grace period, forcing exit");
        std::process::exit(1);
    });
}

/// Parse the configured client origin into a CORS `AllowOrigin`. Falls back
/// to rejecting all cross-origin requests if the configured value isn't a
/// well-formed origin, rather than accidentally defaulting to wildcard.
fn parse_origin(client_url: &str) -> AllowOrigin {
    match client_url.parse::<axum::http::HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!(client_url, "CLIENT_URL is not a valid origin header value, rejecting all cross-origin requests");
            AllowOrigin::list(Vec::new())
        }
    }
}
