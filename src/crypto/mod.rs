//! Cryptographic primitives: password hashing, signed session tokens,
//! TOTP, secure randomness and constant-time comparison.

pub mod password;
pub mod token;
pub mod totp;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use password::PasswordHasher;
pub use token::{Claims, TokenCodec, TokenError, TokenKind};

/// Scheme identifier every personal access token starts with.
pub const PAT_SCHEME: &str = "pat_";

/// Number of base62 characters following the scheme identifier.
pub const PAT_RANDOM_LEN: usize = 32;

/// Characters of the plaintext token kept for indexed lookup.
pub const PAT_LOOKUP_PREFIX_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("totp failure: {0}")]
    Totp(String),

    #[error("crypto task failed: {0}")]
    Task(String),
}

/// Random base62 string from the thread-local CSPRNG.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[must_use]
pub fn random_digits(len: usize) -> String {
    let mut rng = rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Generates a new PAT plaintext, `pat_` followed by 32 base62 characters.
#[must_use]
pub fn generate_pat() -> String {
    format!("{PAT_SCHEME}{}", random_alphanumeric(PAT_RANDOM_LEN))
}

/// Lookup prefix of a PAT plaintext, or `None` when the token is too short
/// to be one.
#[must_use]
pub fn pat_lookup_prefix(token: &str) -> Option<&str> {
    if token.len() != PAT_SCHEME.len() + PAT_RANDOM_LEN || !token.starts_with(PAT_SCHEME) {
        return None;
    }
    token.get(..PAT_LOOKUP_PREFIX_LEN)
}

/// SHA-256 hex digest used for high-entropy secrets (PATs, recovery codes).
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compares two byte strings without short-circuiting on the first
/// differing byte. Length is not secret.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_pat_shape() {
        let token = generate_pat();
        assert_eq!(token.len(), 36);
        assert!(token.starts_with("pat_"));
        assert!(token[4..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_pat());
    }

    #[test]
    fn test_pat_lookup_prefix() {
        let token = generate_pat();
        assert_eq!(pat_lookup_prefix(&token), Some(&token[..12]));
        assert_eq!(pat_lookup_prefix("pat_short"), None);
        assert_eq!(pat_lookup_prefix(&token.replacen("pat_", "tok_", 1)), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_random_digits() {
        let code = random_digits(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
