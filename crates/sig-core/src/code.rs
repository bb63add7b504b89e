//! One-time access code minting and verification.
//!
//! The alphabet excludes visually ambiguous characters (`I`, `O`, `0`, `1`)
//! for human transcription reliability. Implementers must use this exact
//! 32-symbol alphabet so codes stay interoperable across deployments; a
//! uniform `gen_range` draw over its 32 symbols is exact, no modulo bias.

use rand::Rng;

/// The 32-symbol code alphabet.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Number of characters in a minted code.
pub const CODE_LENGTH: usize = 6;

/// Mint a fresh 6-character one-time code, drawn uniformly from
/// [`CODE_ALPHABET`].
pub fn mint_code(rng: &mut impl Rng) -> String {
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Why a code verification attempt failed. Each variant maps to a distinct
/// client-facing reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeVerifyError {
    /// No code has been minted for this session.
    Absent,
    /// The code was already used successfully once.
    Used,
    /// The presented code does not match the stored one.
    Mismatch,
}

/// Verify a presented code against the stored one. The input is uppercased
/// before comparison; callers are responsible for flipping the `used` flag
/// to `true` on `Ok`, since that mutation belongs to the registry entry's
/// storage, not to this pure check.
pub fn verify_code(stored: Option<&str>, used: bool, input: &str) -> Result<(), CodeVerifyError> {
    let stored = stored.ok_or(CodeVerifyError::Absent)?;
    if used {
        return Err(CodeVerifyError::Used);
    }
    if stored != input.to_uppercase() {
        return Err(CodeVerifyError::Mismatch);
    }
    Ok(())
}
