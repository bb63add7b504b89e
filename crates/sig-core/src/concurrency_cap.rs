//! Per-IP concurrency and hourly session ceilings.
//!
//! A `DashMap`-backed per-IP counter checked and incremented atomically at
//! session creation, decremented at session end, split into two
//! independent ceilings: a concurrency cap and an hourly creation cap.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Maximum concurrently active sessions per IP.
const MAX_ACTIVE: u32 = 10;
/// Maximum sessions created per IP per rolling hour.
const MAX_HOURLY: u32 = 20;
/// Length of the hourly rolling window.
const HOURLY_WINDOW: Duration = Duration::from_secs(60 * 60);

struct CapEntry {
    active: u32,
    hourly_count: u32,
    hourly_window_start: Instant,
}

/// Why a `check` call was rejected, machine-readable for the client-facing
/// `session-capped` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapRejection {
    /// The IP already has the maximum number of concurrently active
    /// sessions.
    ConcurrentLimit,
    /// The IP has created the maximum number of sessions this hour.
    HourlyLimit,
}

impl CapRejection {
    /// Machine-readable reason string.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            CapRejection::ConcurrentLimit => "concurrent-session-limit",
            CapRejection::HourlyLimit => "hourly-session-limit",
        }
    }
}

/// Tracks per-IP active session count and hourly creation count.
#[derive(Default)]
pub struct ConcurrencyCap {
    entries: DashMap<IpAddr, CapEntry>,
}

impl ConcurrencyCap {
    /// Construct an empty cap tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Check and, if allowed, reserve capacity for a new session from `ip`.
    /// Must be called at upload-init after the token-bucket limiter passes.
    pub fn check(&self, ip: IpAddr) -> Result<(), CapRejection> {
        let now = Instant::now();
        let mut entry = self.entries.entry(ip).or_insert_with(|| CapEntry {
            active: 0,
            hourly_count: 0,
            hourly_window_start: now,
        });

        if now.duration_since(entry.hourly_window_start) > HOURLY_WINDOW {
            entry.hourly_window_start = now;
            entry.hourly_count = 0;
        }

        if entry.active >= MAX_ACTIVE {
            return Err(CapRejection::ConcurrentLimit);
        }
        if entry.hourly_count >= MAX_HOURLY {
            return Err(CapRejection::HourlyLimit);
        }

        entry.active += 1;
        entry.hourly_count += 1;
        Ok(())
    }

    /// Release one unit of active capacity for `ip`, called on session
    /// completion or purge. Clamped at zero; the entry is dropped entirely
    /// once active capacity reaches zero and the hourly window has expired.
    pub fn decrement(&self, ip: IpAddr) {
        let now = Instant::now();
        let mut remove = false;

        if let Some(mut entry) = self.entries.get_mut(&ip) {
            if entry.active > 0 {
                entry.active -= 1;
            }
            remove = entry.active == 0 && now.duration_since(entry.hourly_window_start) > HOURLY_WINDOW;
        }

        if remove {
            self.entries.remove(&ip);
        }
    }

    /// Current active session count for `ip`, for diagnostics and tests.
    #[must_use]
    pub fn active_count(&self, ip: IpAddr) -> u32 {
        self.entries.get(&ip).map(|e| e.active).unwrap_or(0)
    }
}
