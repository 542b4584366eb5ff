//! Password hashing and reset-token generation.
//!
//! Passwords are stored as `salt$digest` where both halves are hex and the
//! digest is SHA-256 over salt bytes followed by the password bytes. Reset
//! tokens are random URL-safe strings; only their SHA-256 hash is persisted,
//! so a leaked database cannot be replayed into a working reset link.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;
const RESET_TOKEN_LEN: usize = 32;

fn digest_hex(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    format!("{}${}", hex::encode(salt), digest_hex(&salt, password))
}

/// Check a password against a stored `salt$digest` string.
///
/// Returns false for malformed stored values rather than erroring; a
/// corrupt hash means the credential can never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    digest_hex(&salt, password) == digest
}

/// Generate a password-reset token.
///
/// Returns `(token, token_hash)`: the token goes out to the user (via the
/// mailer), the hash is what gets persisted.
pub fn generate_reset_token() -> (String, String) {
    let mut bytes = [0u8; RESET_TOKEN_LEN];
    OsRng.fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_reset_token(&token);
    (token, hash)
}

/// Hash a reset token for storage or lookup.
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let stored = hash_password("hunter2");
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn test_salts_differ_between_hashes() {
        let a = hash_password("same");
        let b = hash_password("same");
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn test_malformed_stored_hash_never_matches() {
        assert!(!verify_password("anything", "no-separator"));
        assert!(!verify_password("anything", "zz-not-hex$abcd"));
    }

    #[test]
    fn test_reset_token_hash_is_stable() {
        let (token, hash) = generate_reset_token();
        assert_eq!(hash_reset_token(&token), hash);
        assert_ne!(token, hash);
    }
}
