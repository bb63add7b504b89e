//! Endpoint-to-room bookkeeping.
//!
//! Room membership is modeled as pure data here, with no calls back into the
//! signaling state machine — this is how the cyclic dependency between the
//! multiplexer and the state machine is broken: the state machine calls into
//! the multiplexer to resolve and mutate room membership, never the
//! reverse.

use std::collections::HashSet;
use std::net::IpAddr;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::events::OutboundEvent;

/// Sending half of an endpoint's outbound event channel.
pub type OutboundSender = mpsc::UnboundedSender<OutboundEvent>;

struct EndpointState {
    ip: IpAddr,
    sessions: HashSet<String>,
    sink: OutboundSender,
}

/// Maps each connected endpoint to the sessions (rooms) it has joined, and
/// provides the single send path used to deliver outbound events to it.
#[derive(Default)]
pub struct Multiplexer {
    endpoints: DashMap<String, EndpointState>,
    /// Reverse index: session id → member endpoint ids, bounded in
    /// practice to sender + one receiver.
    rooms: DashMap<String, HashSet<String>>,
}

impl Multiplexer {
    /// Construct an empty multiplexer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            endpoints: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Register a newly connected endpoint and its outbound sink.
    pub fn connect(&self, endpoint_id: String, ip: IpAddr, sink: OutboundSender) {
        self.endpoints.insert(
            endpoint_id,
            EndpointState {
                ip,
                sessions: HashSet::new(),
                sink,
            },
        );
    }

    /// Tear down an endpoint's state, returning its IP and the set of
    /// session ids it had joined (for the state machine to act on).
    pub fn disconnect(&self, endpoint_id: &str) -> Option<(IpAddr, Vec<String>)> {
        let (_, state) = self.endpoints.remove(endpoint_id)?;
        for session_id in &state.sessions {
            if let Some(mut members) = self.rooms.get_mut(session_id) {
                members.remove(endpoint_id);
            }
        }
        Some((state.ip, state.sessions.into_iter().collect()))
    }

    /// Join `endpoint_id` to `session_id`'s room.
    pub fn join(&self, endpoint_id: &str, session_id: &str) {
        if let Some(mut state) = self.endpoints.get_mut(endpoint_id) {
            state.sessions.insert(session_id.to_string());
        }
        self.rooms
            .entry(session_id.to_string())
            .or_default()
            .insert(endpoint_id.to_string());
    }

    /// True if `endpoint_id` is currently a member of `session_id`'s room.
    #[must_use]
    pub fn is_in_room(&self, endpoint_id: &str, session_id: &str) -> bool {
        self.rooms
            .get(session_id)
            .map(|members| members.contains(endpoint_id))
            .unwrap_or(false)
    }

    /// True if `endpoint_id` currently has an open connection.
    #[must_use]
    pub fn is_connected(&self, endpoint_id: &str) -> bool {
        self.endpoints.contains_key(endpoint_id)
    }

    /// All endpoint ids currently in `session_id`'s room.
    #[must_use]
    pub fn room_members(&self, session_id: &str) -> Vec<String> {
        self.rooms
            .get(session_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// IP address of `endpoint_id`, if connected.
    #[must_use]
    pub fn ip_of(&self, endpoint_id: &str) -> Option<IpAddr> {
        self.endpoints.get(endpoint_id).map(|state| state.ip)
    }

    /// Deliver `event` to `endpoint_id`. Returns `false` if the endpoint is
    /// not connected or its channel has already closed.
    pub fn send(&self, endpoint_id: &str, event: OutboundEvent) -> bool {
        match self.endpoints.get(endpoint_id) {
            Some(state) => state.sink.send(event).is_ok(),
            None => false,
        }
    }
}
