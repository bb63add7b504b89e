//! Generic windowed-counter rate limiting.
//!
//! A `DashMap`-backed lazy-refill-on-access bucket with a background
//! sweep, keyed by any `Eq + Hash + Clone` identifier instead of a fixed
//! address type, since this core needs three independently-keyed limiter
//! instances (by IP, by endpoint id).

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Outcome of a [`TokenBucketLimiter::check`] call.
#[derive(Debug, Clone, Copy)]
pub struct LimitCheck {
    /// Whether the operation is allowed.
    pub allowed: bool,
    /// Remaining allowance in the current window.
    pub remaining: u32,
    /// When the current window resets.
    pub reset_at: Instant,
}

impl LimitCheck {
    /// Seconds from `now` until this window resets, for a client-facing
    /// "retry after N seconds" message.
    #[must_use]
    pub fn wait_secs(&self, now: Instant) -> u64 {
        self.reset_at.saturating_duration_since(now).as_secs()
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// A windowed counter limiter keyed by an arbitrary identifier.
///
/// Semantics: on first access, or once `now > bucket.reset_at`, the bucket
/// is replaced with count=1, `reset_at = now + window`, and the call is
/// allowed. Otherwise the call is allowed (and the counter incremented) only
/// while `count < max_count`.
pub struct TokenBucketLimiter<K> {
    window: Duration,
    max_count: u32,
    buckets: DashMap<K, Bucket>,
}

impl<K> TokenBucketLimiter<K>
where
    K: Eq + Hash + Clone,
{
    /// Construct a limiter with the given window and maximum count.
    #[must_use]
    pub fn new(window: Duration, max_count: u32) -> Self {
        Self {
            window,
            max_count,
            buckets: DashMap::new(),
        }
    }

    /// Check (and, if allowed, consume one unit of) the bucket for `id`.
    pub fn check(&self, id: K) -> LimitCheck {
        let now = Instant::now();
        let mut entry = self.buckets.entry(id).or_insert_with(|| Bucket {
            count: 0,
            reset_at: now + self.window,
        });

        if now > entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + self.window;
            return LimitCheck {
                allowed: true,
                remaining: self.max_count.saturating_sub(1),
                reset_at: entry.reset_at,
            };
        }

        if entry.count < self.max_count {
            entry.count += 1;
            LimitCheck {
                allowed: true,
                remaining: self.max_count.saturating_sub(entry.count),
                reset_at: entry.reset_at,
            }
        } else {
            LimitCheck {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
            }
        }
    }

    /// Remove buckets whose window has already expired. Intended to be
    /// called from a background sweep every 60 seconds.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| bucket.reset_at > now);
    }

    /// Current number of tracked buckets, for diagnostics and tests.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// The three named limiter instances the signaling core requires, bundled
/// for convenient construction and injection.
pub struct SignalLimiters {
    /// Connections per IP: window 60s, max 10.
    pub connection: TokenBucketLimiter<std::net::IpAddr>,
    /// Upload-inits per endpoint: window 300s, max 5.
    pub upload_init: TokenBucketLimiter<String>,
    /// Join-room attempts per endpoint: window 60s, max 20.
    pub join_room: TokenBucketLimiter<String>,
}

impl Default for SignalLimiters {
    fn default() -> Self {
        Self {
            connection: TokenBucketLimiter::new(Duration::from_secs(60), 10),
            upload_init: TokenBucketLimiter::new(Duration::from_secs(300), 5),
            join_room: TokenBucketLimiter::new(Duration::from_secs(60), 20),
        }
    }
}

impl SignalLimiters {
    /// Run the periodic sweep across all three limiters.
    pub fn sweep_all(&self) {
        self.connection.sweep();
        self.upload_init.sweep();
        self.join_room.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn allows_up_to_max_then_blocks() {
        let limiter = TokenBucketLimiter::new(Duration::from_secs(60), 3);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
    }

    #[test]
    fn independent_keys_have_independent_buckets() {
        let limiter = TokenBucketLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
        assert!(!limiter.check("a").allowed);
    }

    #[test]
    fn sweep_removes_expired_buckets() {
        let limiter = TokenBucketLimiter::new(Duration::from_millis(1), 1);
        limiter.check("a");
        std::thread::sleep(Duration::from_millis(5));
        limiter.sweep();
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn connection_limiter_allows_ten_per_ip_per_minute() {
        let limiters = SignalLimiters::default();
        let ip: IpAddr = Ipv4Addr::new(127, 0, 0, 1).into();

        for _ in 0..10 {
            assert!(limiters.connection.check(ip).allowed);
        }
        assert!(!limiters.connection.check(ip).allowed);
    }

    #[test]
    fn upload_init_limiter_allows_five_per_endpoint() {
        let limiters = SignalLimiters::default();
        for _ in 0..5 {
            assert!(limiters.upload_init.check("e1".to_string()).allowed);
        }
        assert!(!limiters.upload_init.check("e1".to_string()).allowed);
    }
}
