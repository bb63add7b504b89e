//! In-memory session registry: the authorization primitive for
//! sender-privileged actions and the home of each session's one-time code.
//!
//! A `DashMap` keyed by session id, with independent per-entry mutation.

use std::net::IpAddr;
use std::time::Instant;

use dashmap::DashMap;
use rand::thread_rng;

use crate::code::{self, CodeVerifyError};

/// A registry entry: who owns a session and its one-time code state.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Endpoint id of the session's sender.
    pub sender_endpoint: String,
    /// IP address the sender connected from, kept so the concurrency cap
    /// can be released by session id alone when the sender has already
    /// disconnected.
    pub sender_ip: IpAddr,
    /// The minted one-time code.
    pub code: String,
    /// Whether the code has been successfully used (monotonic false→true).
    pub used: bool,
    /// When this entry was created.
    pub created_at: Instant,
}

/// In-memory map from session id to registry entry.
#[derive(Default)]
pub struct SessionRegistry {
    entries: DashMap<String, RegistryEntry>,
}

impl SessionRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a new session, minting and returning its one-time code.
    pub fn register(&self, id: String, sender_endpoint: String, sender_ip: IpAddr) -> String {
        let mut rng = thread_rng();
        let code = code::mint_code(&mut rng);
        self.entries.insert(
            id,
            RegistryEntry {
                sender_endpoint,
                sender_ip,
                code: code.clone(),
                used: false,
                created_at: Instant::now(),
            },
        );
        code
    }

    /// The sender endpoint id for `id`, if registered.
    #[must_use]
    pub fn sender(&self, id: &str) -> Option<String> {
        self.entries.get(id).map(|entry| entry.sender_endpoint.clone())
    }

    /// The IP the sender connected from, if registered.
    #[must_use]
    pub fn sender_ip(&self, id: &str) -> Option<IpAddr> {
        self.entries.get(id).map(|entry| entry.sender_ip)
    }

    /// True if `endpoint` is the registered sender for `id`. The
    /// authorization primitive for sender-privileged actions (cancel).
    #[must_use]
    pub fn is_sender(&self, id: &str, endpoint: &str) -> bool {
        self.entries
            .get(id)
            .map(|entry| entry.sender_endpoint == endpoint)
            .unwrap_or(false)
    }

    /// Validate a presented code for `id`, flipping the `used` flag on
    /// success. Delegates the comparison to [`code::verify_code`].
    pub fn validate_code(&self, id: &str, input: &str) -> Result<(), CodeVerifyError> {
        let mut entry = self.entries.get_mut(id).ok_or(CodeVerifyError::Absent)?;
        code::verify_code(Some(&entry.code), entry.used, input)?;
        entry.used = true;
        Ok(())
    }

    /// Remove a session's registry entry.
    pub fn remove(&self, id: &str) {
        self.entries.remove(id);
    }

    /// All session ids where `endpoint` is the registered sender.
    #[must_use]
    pub fn for_endpoint(&self, endpoint: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.sender_endpoint == endpoint)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove every entry older than `max_age`, returning the sender IP of
    /// each purged entry so the caller can release its concurrency-cap
    /// reservation.
    pub fn purge_older_than(&self, max_age: std::time::Duration) -> Vec<IpAddr> {
        let now = Instant::now();
        let mut purged_ips = Vec::new();
        self.entries.retain(|_, entry| {
            let stale = now.duration_since(entry.created_at) > max_age;
            if stale {
                purged_ips.push(entry.sender_ip);
            }
            !stale
        });
        purged_ips
    }

    /// Current entry count, for diagnostics and tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip() -> IpAddr {
        Ipv4Addr::new(198, 51, 100, 1).into()
    }

    #[test]
    fn register_returns_six_char_code() {
        let registry = SessionRegistry::new();
        let code = registry.register("s1".to_string(), "e1".to_string(), ip());
        assert_eq!(code.len(), 6);
    }

    #[test]
    fn is_sender_true_only_for_registered_sender() {
        let registry = SessionRegistry::new();
        registry.register("s1".to_string(), "e1".to_string(), ip());
        assert!(registry.is_sender("s1", "e1"));
        assert!(!registry.is_sender("s1", "e2"));
    }

    #[test]
    fn sender_ip_is_recorded() {
        let registry = SessionRegistry::new();
        registry.register("s1".to_string(), "e1".to_string(), ip());
        assert_eq!(registry.sender_ip("s1"), Some(ip()));
        assert_eq!(registry.sender_ip("nope"), None);
    }

    #[test]
    fn validate_code_succeeds_once() {
        let registry = SessionRegistry::new();
        let code = registry.register("s1".to_string(), "e1".to_string(), ip());

        assert!(registry.validate_code("s1", &code).is_ok());
        assert_eq!(
            registry.validate_code("s1", &code),
            Err(CodeVerifyError::Used)
        );
    }

    #[test]
    fn validate_code_unknown_session_is_absent() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.validate_code("nope", "ABC234"),
            Err(CodeVerifyError::Absent)
        );
    }

    #[test]
    fn for_endpoint_finds_all_sessions_for_sender() {
        let registry = SessionRegistry::new();
        registry.register("s1".to_string(), "e1".to_string(), ip());
        registry.register("s2".to_string(), "e1".to_string(), ip());
        registry.register("s3".to_string(), "e2".to_string(), ip());

        let mut ids = registry.for_endpoint("e1");
        ids.sort();
        assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn purge_older_than_removes_stale_entries() {
        let registry = SessionRegistry::new();
        registry.register("s1".to_string(), "e1".to_string(), ip());
        let purged = registry.purge_older_than(std::time::Duration::from_secs(0));
        assert!(registry.is_empty());
        assert_eq!(purged, vec![ip()]);
    }
}
