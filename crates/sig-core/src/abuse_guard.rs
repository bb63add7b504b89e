//! Per-IP abuse tracking: escalating auto-block plus a suspicious-event
//! counter.
//!
//! An `Arc<RwLock<HashMap<IpAddr, _>>>` tracker with a "threshold crossed
//! → status change → log" flow, tuned to an exact two-threshold model
//! (soft at 10, hard-block at 50, over a single 60s window). There is no
//! permanent ban, only a 15-minute block that resets on expiry.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Rolling window over which connection counts are tracked.
const WINDOW: Duration = Duration::from_secs(60);
/// Above this count in the window, individual connections are rejected.
const SOFT_THRESHOLD: u32 = 10;
/// Above this count in the window, the IP is blocked outright.
const HARD_THRESHOLD: u32 = 50;
/// Duration of a hard block.
const BLOCK_DURATION: Duration = Duration::from_secs(15 * 60);
/// Suspicious-event count at which an elevated alert is emitted.
const SUSPICIOUS_ALERT_THRESHOLD: u32 = 5;

#[derive(Debug, Clone)]
struct AbuseTrackerEntry {
    connection_count: u32,
    window_start: Instant,
    blocked: bool,
    block_expiry: Option<Instant>,
    suspicious_count: u32,
}

impl AbuseTrackerEntry {
    fn fresh(now: Instant) -> Self {
        Self {
            connection_count: 0,
            window_start: now,
            blocked: false,
            block_expiry: None,
            suspicious_count: 0,
        }
    }
}

/// Outcome of presenting a new connection attempt from a given IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Connection is allowed.
    Allowed,
    /// The IP is hard-blocked; this many minutes remain.
    RejectedBlocked {
        /// Minutes remaining until the block expires.
        remaining_minutes: u64,
    },
    /// The soft threshold was exceeded; this individual connection is
    /// rejected but the IP is not yet blocked.
    RejectedSoft,
}

/// Tracks per-IP connection pressure and suspicious-event counts.
#[derive(Default)]
pub struct AbuseGuard {
    trackers: Arc<RwLock<HashMap<IpAddr, AbuseTrackerEntry>>>,
}

impl AbuseGuard {
    /// Construct an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trackers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a new connection attempt from `ip` and decide whether it is
    /// allowed.
    pub async fn record_connection(&self, ip: IpAddr) -> ConnectOutcome {
        let now = Instant::now();
        let mut trackers = self.trackers.write().await;
        let entry = trackers.entry(ip).or_insert_with(|| AbuseTrackerEntry::fresh(now));

        if entry.blocked {
            match entry.block_expiry {
                Some(expiry) if now < expiry => {
                    let remaining_minutes =
                        expiry.saturating_duration_since(now).as_secs().div_ceil(60);
                    return ConnectOutcome::RejectedBlocked { remaining_minutes };
                }
                _ => {
                    *entry = AbuseTrackerEntry::fresh(now);
                }
            }
        }

        if now.duration_since(entry.window_start) > WINDOW {
            entry.window_start = now;
            entry.connection_count = 1;
        } else {
            entry.connection_count += 1;
        }

        if entry.connection_count > HARD_THRESHOLD {
            entry.blocked = true;
            entry.block_expiry = Some(now + BLOCK_DURATION);
            tracing::warn!(%ip, count = entry.connection_count, "ip auto-blocked: hard connection threshold exceeded");
            return ConnectOutcome::RejectedBlocked { remaining_minutes: 15 };
        }

        if entry.connection_count > SOFT_THRESHOLD {
            entry.suspicious_count += 1;
            tracing::warn!(%ip, count = entry.connection_count, "connection rejected: soft threshold exceeded");
            return ConnectOutcome::RejectedSoft;
        }

        ConnectOutcome::Allowed
    }

    /// Record the disconnect of a previously-counted connection. Decrements
    /// the rolling count only while the IP is not blocked, and never below
    /// zero.
    pub async fn track_disconnect(&self, ip: IpAddr) {
        let mut trackers = self.trackers.write().await;
        if let Some(entry) = trackers.get_mut(&ip) {
            if !entry.blocked && entry.connection_count > 0 {
                entry.connection_count -= 1;
            }
        }
    }

    /// Record a rule-violation event (invalid UUID, bad code, out-of-room
    /// signal, rate-limit breach) for `ip`. Returns true once the event
    /// count reaches the elevated-alert threshold.
    pub async fn record_suspicious(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut trackers = self.trackers.write().await;
        let entry = trackers.entry(ip).or_insert_with(|| AbuseTrackerEntry::fresh(now));
        entry.suspicious_count += 1;

        if entry.suspicious_count >= SUSPICIOUS_ALERT_THRESHOLD {
            tracing::warn!(%ip, count = entry.suspicious_count, "security event: elevated suspicious activity");
            true
        } else {
            false
        }
    }

    /// Reset expired blocks and drop trackers that are both idle (window
    /// elapsed, zero count) and unblocked. Intended to be called from the
    /// sweeper's fast (5-minute) timer.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut trackers = self.trackers.write().await;

        trackers.retain(|_, entry| {
            if entry.blocked {
                if let Some(expiry) = entry.block_expiry {
                    if now >= expiry {
                        *entry = AbuseTrackerEntry::fresh(now);
                    }
                }
            }

            let idle = !entry.blocked
                && entry.connection_count == 0
                && now.duration_since(entry.window_start) > WINDOW;
            !idle
        });
    }

    /// Current suspicious-event count for `ip`, for diagnostics and tests.
    pub async fn suspicious_count(&self, ip: IpAddr) -> u32 {
        self.trackers
            .read()
            .await
            .get(&ip)
            .map(|entry| entry.suspicious_count)
            .unwrap_or(0)
    }
}
