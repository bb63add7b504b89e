//! Authenticated encryption for metadata fields (filename, MIME type).
//!
//! Ciphertext envelope is `nonce:tag:body`, each field hex-encoded and
//! joined by `:`. Decrypt failures and malformed envelopes never error —
//! callers always get a string back, preserving forward compatibility with
//! unencrypted legacy values written before encryption was turned on.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};

/// Size of the XChaCha20-Poly1305 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;
/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Fixed, deployment-wide salt used when the configured key material is
/// shorter than [`KEY_SIZE`] and must be stretched through Argon2id. Fixed
/// (not random) on purpose: the derived key must be stable across process
/// restarts without an external place to store a random salt.
const KDF_SALT: &[u8] = b"sig-relay-metadata-encryption-key-v1";

/// Authenticated encryption of metadata fields with a single process-wide key.
pub struct FieldCipher {
    cipher: XChaCha20Poly1305,
}

impl FieldCipher {
    /// Build a cipher directly from 32 raw key bytes.
    #[must_use]
    pub fn from_key(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.into()),
        }
    }

    /// Resolve a cipher from configured key material, following the
    /// priority order: a 64-hex-character value is parsed as 32 raw bytes;
    /// a shorter string is stretched through Argon2id with a fixed salt;
    /// absence of any configured value is a startup failure when
    /// `is_production` is set, and `Ok(None)` (pass-through mode) otherwise.
    pub fn resolve(configured: Option<&str>, is_production: bool) -> Result<Option<Self>> {
        let Some(raw) = configured.filter(|s| !s.is_empty()) else {
            if is_production {
                return Err(CryptoError::MissingProductionKey);
            }
            return Ok(None);
        };

        if raw.len() == KEY_SIZE * 2 {
            if let Ok(bytes) = hex::decode(raw) {
                if bytes.len() == KEY_SIZE {
                    let mut key = [0u8; KEY_SIZE];
                    key.copy_from_slice(&bytes);
                    let cipher = Self::from_key(&key);
                    key.zeroize();
                    return Ok(Some(cipher));
                }
            }
        }

        let mut derived = derive_key(raw.as_bytes())?;
        let cipher = Self::from_key(&derived);
        derived.zeroize();
        Ok(Some(cipher))
    }

    /// Encrypt `plaintext`, producing a `nonce:tag:body` hex envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes).map_err(|_| CryptoError::RandomFailed)?;
        let nonce = XNonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &[],
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        if sealed.len() < TAG_SIZE {
            return Err(CryptoError::EncryptionFailed);
        }
        let (body, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(body)
        ))
    }

    /// Decrypt an envelope. Per the forward-compatibility contract, this
    /// never returns an error: a value that isn't a well-formed envelope,
    /// or that fails authentication, comes back unchanged (and a warning
    /// is logged in the latter case).
    #[must_use]
    pub fn decrypt(&self, value: &str) -> String {
        let Some((nonce_bytes, tag_bytes, body)) = split_envelope(value) else {
            return value.to_string();
        };

        let nonce = XNonce::from_slice(&nonce_bytes);
        let mut sealed = Vec::with_capacity(body.len() + TAG_SIZE);
        sealed.extend_from_slice(&body);
        sealed.extend_from_slice(&tag_bytes);

        match self.cipher.decrypt(
            nonce,
            Payload {
                msg: &sealed,
                aad: &[],
            },
        ) {
            Ok(plaintext) => String::from_utf8(plaintext).unwrap_or_else(|_| value.to_string()),
            Err(_) => {
                tracing::warn!("field decryption failed, passing value through unchanged");
                value.to_string()
            }
        }
    }
}

/// Split a `nonce:tag:body` envelope into its raw byte components. Any value
/// that does not have exactly two `:` separators, or whose fields aren't
/// valid hex of the expected length, is not an envelope at all.
fn split_envelope(value: &str) -> Option<([u8; NONCE_SIZE], [u8; TAG_SIZE], Vec<u8>)> {
    let mut parts = value.split(':');
    let nonce_hex = parts.next()?;
    let tag_hex = parts.next()?;
    let body_hex = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let nonce_raw = hex::decode(nonce_hex).ok()?;
    let tag_raw = hex::decode(tag_hex).ok()?;
    let body_raw = hex::decode(body_hex).ok()?;

    if nonce_raw.len() != NONCE_SIZE || tag_raw.len() != TAG_SIZE {
        return None;
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&nonce_raw);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&tag_raw);

    Some((nonce, tag, body_raw))
}

/// Stretch configured key material shorter than [`KEY_SIZE`] into a 32-byte
/// key via Argon2id, using the fixed deployment-wide salt.
fn derive_key(passphrase: &[u8]) -> Result<[u8; KEY_SIZE]> {
    use argon2::{Algorithm, Argon2, Params, Version};

    let params = Params::new(65536, 4, 4, Some(KEY_SIZE))
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase, KDF_SALT, &mut key)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::from_key(&[0x42u8; KEY_SIZE])
    }

    #[test]
    fn roundtrip() {
        let c = cipher();
        let envelope = c.encrypt("photo.jpg").unwrap();
        assert_eq!(envelope.matches(':').count(), 2);
        assert_eq!(c.decrypt(&envelope), "photo.jpg");
    }

    #[test]
    fn decrypt_plaintext_without_two_colons_passes_through() {
        let c = cipher();
        assert_eq!(c.decrypt("plain-value"), "plain-value");
        assert_eq!(c.decrypt("one:colon"), "one:colon");
        assert_eq!(c.decrypt("a:b:c:d"), "a:b:c:d");
    }

    #[test]
    fn tampered_envelope_passes_through_unchanged() {
        let c = cipher();
        let mut envelope = c.encrypt("hello.txt").unwrap();
        // Flip a hex character in the body field.
        let last = envelope.pop().unwrap();
        let flipped = if last == '0' { '1' } else { '0' };
        envelope.push(flipped);

        assert_eq!(c.decrypt(&envelope), envelope);
    }

    #[test]
    fn different_nonces_each_call() {
        let c = cipher();
        let a = c.encrypt("same-plaintext").unwrap();
        let b = c.encrypt("same-plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_hex_key() {
        let hex_key = hex::encode([0x11u8; KEY_SIZE]);
        let cipher = FieldCipher::resolve(Some(&hex_key), false).unwrap().unwrap();
        let envelope = cipher.encrypt("x").unwrap();
        assert_eq!(cipher.decrypt(&envelope), "x");
    }

    #[test]
    fn resolve_short_passphrase_via_kdf() {
        let cipher = FieldCipher::resolve(Some("short-secret"), false)
            .unwrap()
            .unwrap();
        let envelope = cipher.encrypt("x").unwrap();
        assert_eq!(cipher.decrypt(&envelope), "x");
    }

    #[test]
    fn resolve_missing_key_fails_in_production() {
        let result = FieldCipher::resolve(None, true);
        assert!(result.is_err());
    }

    #[test]
    fn resolve_missing_key_ok_outside_production() {
        let result = FieldCipher::resolve(None, false).unwrap();
        assert!(result.is_none());
    }
}
