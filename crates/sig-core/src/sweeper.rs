//! Periodic expiry and cleanup: the only component in this crate that owns
//! a background task.
//!
//! A `tokio::time::interval` loop that periodically retains only live
//! state and calls into the components that know how to prune themselves.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::abuse_guard::AbuseGuard;
use crate::audit::AuditLog;
use crate::concurrency_cap::ConcurrencyCap;
use crate::registry::SessionRegistry;
use crate::repository::{SessionRepository, SessionStatus};

/// Full sweep interval: session rows and registry entries older than
/// [`SESSION_MAX_AGE`] are purged once an hour.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Sessions (and their registry entries) older than this are reclaimed
/// regardless of status, so an abandoned upload doesn't linger forever.
pub const SESSION_MAX_AGE: chrono::Duration = chrono::Duration::hours(24);

/// Abuse-guard cleanup runs on its own, tighter cadence so expired blocks
/// lift promptly instead of waiting for the full hourly sweep.
pub const ABUSE_GUARD_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Owns the two background cleanup loops and their join handles so the
/// caller can abort them on shutdown.
pub struct Sweeper {
    full_sweep: JoinHandle<()>,
    abuse_guard_sweep: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn both cleanup loops. `session_max_age` in the registry purge and
    /// in the repository's `delete_older_than` cutoff is computed against
    /// wall-clock time each tick, so the clock used for `cutoff` must be the
    /// same one callers expect `Session::age` to be measured against
    /// (`chrono::Utc::now()`).
    pub fn spawn(
        repository: Arc<dyn SessionRepository>,
        registry: Arc<SessionRegistry>,
        concurrency_cap: Arc<ConcurrencyCap>,
        limiters_sweep: Arc<dyn Fn() + Send + Sync>,
        abuse_guard: Arc<AbuseGuard>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let full_sweep = tokio::spawn(full_sweep_loop(
            repository,
            registry,
            concurrency_cap,
            limiters_sweep,
            abuse_guard.clone(),
            audit.clone(),
        ));
        let abuse_guard_sweep = tokio::spawn(abuse_guard_loop(abuse_guard));

        Self {
            full_sweep,
            abuse_guard_sweep,
        }
    }

    /// Abort both background loops. Safe to call more than once.
    pub fn shutdown(&self) {
        self.full_sweep.abort();
        self.abuse_guard_sweep.abort();
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn full_sweep_loop(
    repository: Arc<dyn SessionRepository>,
    registry: Arc<SessionRegistry>,
    concurrency_cap: Arc<ConcurrencyCap>,
    limiters_sweep: Arc<dyn Fn() + Send + Sync>,
    abuse_guard: Arc<AbuseGuard>,
    audit: Arc<AuditLog>,
) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        run_full_sweep(
            &repository,
            &registry,
            &concurrency_cap,
            &limiters_sweep,
            &abuse_guard,
            &audit,
        )
        .await;
    }
}

async fn abuse_guard_loop(abuse_guard: Arc<AbuseGuard>) {
    let mut interval = tokio::time::interval(ABUSE_GUARD_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        abuse_guard.cleanup().await;
    }
}

/// Run one full sweep pass. Exposed standalone so tests can drive a sweep
/// deterministically instead of waiting on the hourly timer.
pub async fn run_full_sweep(
    repository: &Arc<dyn SessionRepository>,
    registry: &Arc<SessionRegistry>,
    concurrency_cap: &Arc<ConcurrencyCap>,
    limiters_sweep: &Arc<dyn Fn() + Send + Sync>,
    abuse_guard: &Arc<AbuseGuard>,
    audit: &Arc<AuditLog>,
) {
    let cutoff = chrono::Utc::now() - SESSION_MAX_AGE;
    match repository
        .delete_older_than(cutoff, Some(&[SessionStatus::Waiting, SessionStatus::Completed]))
        .await
    {
        Ok(deleted) if deleted > 0 => {
            tracing::info!(deleted, "sweeper: purged expired session rows");
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(%err, "sweeper: repository purge failed"),
    }

    // Registry entries age on the same 24h clock as the rows above; any
    // entry purged here is a session that will never reach
    // `transfer-complete`, so its sender's concurrency-cap slot is released
    // now rather than leaking for good.
    let purged_ips = registry.purge_older_than(
        SESSION_MAX_AGE
            .to_std()
            .unwrap_or(Duration::from_secs(24 * 60 * 60)),
    );
    for ip in purged_ips {
        concurrency_cap.decrement(ip);
    }

    limiters_sweep();
    abuse_guard.cleanup().await;
    audit.evict_expired();
}
