//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Key derivation (Argon2id) failed.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// No usable encryption key source was configured and the deployment is
    /// marked production.
    #[error("no METADATA_ENCRYPTION_KEY configured in production")]
    MissingProductionKey,

    /// Random number generation failed.
    #[error("random number generation failed")]
    RandomFailed,

    /// Relay credential generation failed.
    #[error("relay credential generation failed: {0}")]
    CredentialGenerationFailed(String),
}

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, CryptoError>;
