//! Bounded in-memory audit log.
//!
//! An event ring plus per-key lookups, held as a fixed-capacity ring
//! (10,000 entries, oldest evicted first) with a 7-day retention window
//! enforced by the periodic sweep.
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Maximum number of entries retained; oldest are evicted first.
pub const CAPACITY: usize = 10_000;
/// Entries older than this are evicted by the periodic sweep.
pub const RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Routine lifecycle event.
    Info,
    /// Recoverable anomaly.
    Warn,
    /// Unexpected failure.
    Error,
    /// A deliberate rule violation or abuse signal.
    Security,
}

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// When the event occurred.
    pub timestamp: SystemTime,
    /// Severity.
    pub level: Level,
    /// Short machine-readable event name, e.g. `"off-room-signal"`.
    pub event: &'static str,
    /// Endpoint id involved, if any.
    pub endpoint_id: Option<String>,
    /// Session id involved, if any.
    pub session_id: Option<String>,
    /// Originating IP, if any.
    pub ip: Option<IpAddr>,
    /// Free-form detail, kept short and never containing payload bytes.
    pub details: Option<String>,
}

/// Fields for a new audit entry, grouped to keep `record`'s signature from
/// growing every time a new optional dimension is added.
#[derive(Debug, Clone, Default)]
pub struct EntryFields {
    /// Endpoint id involved, if any.
    pub endpoint_id: Option<String>,
    /// Session id involved, if any.
    pub session_id: Option<String>,
    /// Originating IP, if any.
    pub ip: Option<IpAddr>,
    /// Free-form detail.
    pub details: Option<String>,
}

/// A bounded ring buffer of audit entries.
pub struct AuditLog {
    entries: Mutex<VecDeque<Entry>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(CAPACITY)),
        }
    }
}

impl AuditLog {
    /// Construct an empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, evicting the oldest if at capacity.
    pub fn record(&self, level: Level, event: &'static str, fields: EntryFields) {
        let entry = Entry {
            timestamp: SystemTime::now(),
            level,
            event,
            endpoint_id: fields.endpoint_id,
            session_id: fields.session_id,
            ip: fields.ip,
            details: fields.details,
        };

        match level {
            Level::Info => tracing::info!(event, "audit"),
            Level::Warn => tracing::warn!(event, "audit"),
            Level::Error => tracing::error!(event, "audit"),
            Level::Security => tracing::warn!(event, security = true, "audit"),
        }

        let mut entries = self.entries.lock().expect("audit log mutex poisoned");
        if entries.len() >= CAPACITY {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// All entries mentioning `session_id`, oldest first.
    #[must_use]
    pub fn for_session(&self, session_id: &str) -> Vec<Entry> {
        self.entries
            .lock()
            .expect("audit log mutex poisoned")
            .iter()
            .filter(|e| e.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect()
    }

    /// All entries mentioning `ip`, oldest first.
    #[must_use]
    pub fn for_ip(&self, ip: IpAddr) -> Vec<Entry> {
        self.entries
            .lock()
            .expect("audit log mutex poisoned")
            .iter()
            .filter(|e| e.ip == Some(ip))
            .cloned()
            .collect()
    }

    /// The `n` most recent entries, newest last.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<Entry> {
        let entries = self.entries.lock().expect("audit log mutex poisoned");
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// The `n` most recent entries at or above `level`, newest last.
    #[must_use]
    pub fn recent_at_level(&self, n: usize, level: Level) -> Vec<Entry> {
        let entries = self.entries.lock().expect("audit log mutex poisoned");
        let matching: Vec<Entry> = entries
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(n);
        matching.into_iter().skip(skip).collect()
    }

    /// All `SECURITY`-level entries recorded at or after `since`, oldest
    /// first. The cross-correlation query for per-IP suspicious activity
    /// mentioned in the data model's relationships section.
    #[must_use]
    pub fn security_events_since(&self, since: SystemTime) -> Vec<Entry> {
        self.entries
            .lock()
            .expect("audit log mutex poisoned")
            .iter()
            .filter(|e| e.level == Level::Security && e.timestamp >= since)
            .cloned()
            .collect()
    }

    /// Evict entries older than [`RETENTION`]. Intended for the 60-minute
    /// sweep cycle.
    pub fn evict_expired(&self) {
        let cutoff = SystemTime::now() - RETENTION;
        let mut entries = self.entries.lock().expect("audit log mutex poisoned");
        entries.retain(|e| e.timestamp >= cutoff);
    }

    /// Current entry count, for diagnostics and tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("audit log mutex poisoned").len()
    }

    /// True if the log has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_query_by_session() {
        let log = AuditLog::new();
        log.record(
            Level::Security,
            "off-room-signal",
            EntryFields {
                session_id: Some("s1".into()),
                ..Default::default()
            },
        );
        log.record(Level::Info, "session-created", EntryFields::default());

        let matches = log.for_session("s1");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].event, "off-room-signal");
    }

    #[test]
    fn query_by_ip() {
        let log = AuditLog::new();
        let ip: IpAddr = std::net::Ipv4Addr::new(203, 0, 113, 9).into();
        log.record(
            Level::Warn,
            "rate-limited",
            EntryFields {
                ip: Some(ip),
                ..Default::default()
            },
        );

        assert_eq!(log.for_ip(ip).len(), 1);
        assert_eq!(log.for_ip(std::net::Ipv4Addr::new(1, 1, 1, 1).into()).len(), 0);
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let log = AuditLog::new();
        for i in 0..CAPACITY + 5 {
            log.record(
                Level::Info,
                "noop",
                EntryFields {
                    details: Some(i.to_string()),
                    ..Default::default()
                },
            );
        }
        assert_eq!(log.len(), CAPACITY);
        let oldest_remaining = log.recent(CAPACITY)[0].details.clone();
        assert_eq!(oldest_remaining, Some("5".to_string()));
    }

    #[test]
    fn recent_returns_newest_last() {
        let log = AuditLog::new();
        log.record(Level::Info, "first", EntryFields::default());
        log.record(Level::Info, "second", EntryFields::default());

        let recent = log.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event, "second");
    }

    #[test]
    fn recent_at_level_filters_out_other_levels() {
        let log = AuditLog::new();
        log.record(Level::Info, "session-created", EntryFields::default());
        log.record(Level::Security, "off-room-signal", EntryFields::default());
        log.record(Level::Info, "session-created", EntryFields::default());

        let security_only = log.recent_at_level(10, Level::Security);
        assert_eq!(security_only.len(), 1);
        assert_eq!(security_only[0].event, "off-room-signal");
    }

    #[test]
    fn security_events_since_excludes_earlier_entries() {
        let log = AuditLog::new();
        log.record(Level::Security, "off-room-signal", EntryFields::default());
        let cutoff = SystemTime::now();
        std::thread::sleep(Duration::from_millis(5));
        log.record(Level::Security, "ip-auto-blocked", EntryFields::default());

        let since_cutoff = log.security_events_since(cutoff);
        assert_eq!(since_cutoff.len(), 1);
        assert_eq!(since_cutoff[0].event, "ip-auto-blocked");
    }
}
