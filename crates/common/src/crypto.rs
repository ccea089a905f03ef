//! Random token generation and one-way token references.
//!
//! Raw bearer secrets (refresh tokens, verification tokens) never reach storage
//! or cache keys; callers persist `hash_token(raw)` instead.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Default token size in bytes (32 bytes = 256 bits of entropy)
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Hex length of a `hash_token` digest.
pub const TOKEN_HASH_LEN: usize = 64;

/// Fill a fresh buffer with OS entropy.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; len];
    OsRng.fill_bytes(&mut buffer);
    buffer
}

/// Generate a cryptographically secure random token, base64 URL-safe without padding.
pub fn generate_secure_token() -> String {
    generate_secure_token_with_size(DEFAULT_TOKEN_BYTES)
}

/// Generate a cryptographically secure random token from `bytes` bytes of entropy.
pub fn generate_secure_token_with_size(bytes: usize) -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(bytes))
}

/// Fixed-width, non-reversible reference to a token (hex SHA-256).
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation() {
        let token1 = generate_secure_token();
        let token2 = generate_secure_token();
        assert_ne!(token1, token2);

        // 32 bytes base64url without padding = 43 chars
        assert_eq!(token1.len(), 43);

        let small_token = generate_secure_token_with_size(16);
        let large_token = generate_secure_token_with_size(64);
        assert!(small_token.len() < token1.len());
        assert!(large_token.len() > token1.len());
        assert!(!token1.contains('=') && !token1.contains('+') && !token1.contains('/'));
    }

    #[test]
    fn random_bytes_has_requested_length() {
        assert_eq!(random_bytes(0).len(), 0);
        assert_eq!(random_bytes(48).len(), 48);
        assert_ne!(random_bytes(16), random_bytes(16));
    }

    #[test]
    fn hash_token_is_fixed_width_and_stable() {
        let short = hash_token("a");
        let long = hash_token(&"x".repeat(4096));
        assert_eq!(short.len(), TOKEN_HASH_LEN);
        assert_eq!(long.len(), TOKEN_HASH_LEN);
        assert_eq!(short, hash_token("a"));
        assert_ne!(short, hash_token("b"));
        // sha256("abc")
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
