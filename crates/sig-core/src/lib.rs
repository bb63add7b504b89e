//! # sig-core
//!
//! The in-memory signaling state machine and abuse protections for the
//! signaling core. This crate has no concrete I/O: the session repository
//! is a trait ([`repository::SessionRepository`]), so `sig-core` depends on
//! storage shape, never on a Postgres connection pool.
//!
//! | Module | Component |
//! |---|---|
//! | [`validation`] | C — filename/size/MIME/identifier validation |
//! | [`rate_limit`] | D — windowed token-bucket limiter |
//! | [`abuse_guard`] | E — per-IP escalating auto-block |
//! | [`concurrency_cap`] | F — per-IP concurrency and hourly ceilings |
//! | [`code`] | G — one-time code minting and verification |
//! | [`registry`] | H — in-memory session → sender/code registry |
//! | [`repository`] | A (trait) — durable session metadata boundary |
//! | [`state_machine`] | J — per-session lifecycle FSM |
//! | [`multiplexer`] | K — endpoint-to-room bookkeeping |
//! | [`router`] | L — point-to-point opaque relay |
//! | [`sweeper`] | N — periodic expiry and cleanup |
//! | [`audit`] | O — bounded in-memory audit log |
//! | [`events`] | wire-level inbound/outbound event types |
//! | [`error`] | crate-local error hierarchy |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abuse_guard;
pub mod audit;
pub mod code;
pub mod concurrency_cap;
pub mod error;
pub mod events;
pub mod multiplexer;
pub mod rate_limit;
pub mod registry;
pub mod repository;
pub mod router;
pub mod state_machine;
pub mod sweeper;
pub mod validation;

pub use error::{RepoResult, RepositoryError, Result, SignalError};
pub use events::{FileSize, InboundEvent, OutboundEvent};
pub use multiplexer::Multiplexer;
pub use rate_limit::SignalLimiters;
pub use registry::SessionRegistry;
pub use repository::{MemorySessionRepository, Session, SessionRepository, SessionStatus};
pub use state_machine::SignalingEngine;
pub use sweeper::Sweeper;
