//! Opaque negotiation-payload relay.
//!
//! Room membership doubles as the relay authorization check — there is no
//! separate ACL to consult, so the check is a pair of O(1) membership
//! lookups against the [`Multiplexer`]. `data` is never inspected or
//! parsed; it passes through as an opaque [`serde_json::Value`].

use serde_json::Value;

use crate::events::OutboundEvent;
use crate::multiplexer::Multiplexer;

/// Why a relay attempt did not result in delivery. Every variant here is a
/// silent-drop case by design: none of them are surfaced to `from` as an
/// error, since doing so would let a scanner distinguish "wrong session",
/// "peer not in room", and "peer disconnected" from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Delivered to `to`.
    Delivered,
    /// `from` is not a member of `session_id`'s room.
    SenderNotInRoom,
    /// `to` is not a member of `session_id`'s room.
    TargetNotInRoom,
    /// `to` has no open connection.
    TargetDisconnected,
}

/// Relay an opaque negotiation payload from `from` to `to` within
/// `session_id`'s room. Never inspects `data`.
pub fn relay(
    mux: &Multiplexer,
    from: &str,
    to: &str,
    session_id: &str,
    data: Value,
) -> RelayOutcome {
    if !mux.is_in_room(from, session_id) {
        return RelayOutcome::SenderNotInRoom;
    }
    if !mux.is_in_room(to, session_id) {
        return RelayOutcome::TargetNotInRoom;
    }

    let delivered = mux.send(
        to,
        OutboundEvent::Signal {
            from: from.to_string(),
            data,
        },
    );

    if delivered {
        RelayOutcome::Delivered
    } else {
        RelayOutcome::TargetDisconnected
    }
}
