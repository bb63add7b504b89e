//! # sig-crypto
//!
//! Cryptographic primitives for the signaling core.
//!
//! This crate has no I/O of its own: it provides
//! - authenticated encryption of persisted metadata fields
//!   ([`field_encryption`]), and
//! - time-limited HMAC credential minting for the external TURN relay
//!   ([`relay_credential`]).
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | Metadata AEAD | XChaCha20-Poly1305 |
//! | Metadata KDF fallback | Argon2id |
//! | Relay credential | HMAC-SHA1 + base64 |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod field_encryption;
pub mod relay_credential;

pub use error::CryptoError;
pub use field_encryption::FieldCipher;
pub use relay_credential::{IceServer, RelayConfig, RelayCredentialMinter};
