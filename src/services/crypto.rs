//! Credential and token cryptography.
//!
//! Password hashing uses PBKDF2-HMAC-SHA256 with a per-user salt;
//! verification re-derives and compares with a timing-safe equality
//! check. Token values are high-entropy random strings; derived key
//! material is zeroized after use.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::Sha256;
use zeroize::Zeroize;

const PBKDF2_ROUNDS: u32 = 20_000;
const DERIVED_KEY_LEN: usize = 32;
const SALT_LEN: usize = 8;
const TOKEN_LEN: usize = 32;

/// Characters used for generated temporary passwords.
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789+!@$%&*";

/// Stateless cryptography service.
#[derive(Clone, Default)]
pub struct Crypto;

impl Crypto {
    pub fn new() -> Self {
        Self
    }

    /// Fresh random salt for a new password.
    pub fn generate_salt(&self) -> Vec<u8> {
        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill(salt.as_mut_slice());
        salt
    }

    /// Derive the stored hash for a password.
    pub fn derive_password(&self, password: &[u8], salt: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; DERIVED_KEY_LEN];
        pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ROUNDS, &mut out);
        out
    }

    /// Re-derive and compare against the stored hash, timing-safe.
    pub fn verify_password(&self, password: &[u8], expected: &[u8], salt: &[u8]) -> bool {
        let mut derived = self.derive_password(password, salt);
        let matches = constant_time_eq(&derived, expected);
        derived.zeroize();
        matches
    }

    /// Random printable password for out-of-band delivery.
    pub fn temporary_password(&self, len: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| {
                let idx = rng.gen_range(0..PASSWORD_ALPHABET.len());
                PASSWORD_ALPHABET[idx] as char
            })
            .collect()
    }

    /// Opaque high-entropy bearer token value.
    pub fn generate_token(&self) -> String {
        let mut bytes = [0u8; TOKEN_LEN];
        rand::thread_rng().fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_then_verify() {
        let crypto = Crypto::new();
        let salt = crypto.generate_salt();
        let hash = crypto.derive_password(b"hunter22", &salt);

        assert_eq!(hash.len(), DERIVED_KEY_LEN);
        assert!(crypto.verify_password(b"hunter22", &hash, &salt));
        assert!(!crypto.verify_password(b"hunter23", &hash, &salt));
        assert!(!crypto.verify_password(b"", &hash, &salt));
    }

    #[test]
    fn test_salt_changes_hash() {
        let crypto = Crypto::new();
        let salt1 = crypto.generate_salt();
        let salt2 = crypto.generate_salt();
        assert_ne!(salt1, salt2);
        assert_ne!(
            crypto.derive_password(b"same", &salt1),
            crypto.derive_password(b"same", &salt2)
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let crypto = Crypto::new();
        let salt = vec![1u8; SALT_LEN];
        assert_eq!(
            crypto.derive_password(b"pw", &salt),
            crypto.derive_password(b"pw", &salt)
        );
    }

    #[test]
    fn test_temporary_password() {
        let crypto = Crypto::new();
        let pwd = crypto.temporary_password(10);
        assert_eq!(pwd.len(), 10);
        assert!(pwd.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        assert_ne!(pwd, crypto.temporary_password(10));
    }

    #[test]
    fn test_generate_token() {
        let crypto = Crypto::new();
        let token = crypto.generate_token();
        // 32 bytes base64url without padding.
        assert_eq!(token.len(), 43);
        assert_ne!(token, crypto.generate_token());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hello!"));
        assert!(constant_time_eq(b"", b""));
    }
}
