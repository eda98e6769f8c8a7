//! # Password Module
//!
//! PBKDF2-HMAC-SHA256 password hashing.
//!
//! Encoded form: `pbkdf2-sha256$<iterations>$<salt>$<hash>` with salt and hash
//! in unpadded standard base64. The iteration count travels with the hash, so
//! raising the default does not invalidate existing accounts.

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD as BASE64};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Lowest iteration count accepted from configuration.
pub const MIN_ITERATIONS: u32 = 1_000;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_SIZE: usize = 16;
const HASH_SIZE: usize = 32;

/// Hashes and verifies passwords.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    /// Create a hasher. Iteration counts below 1 are raised to 1.
    #[must_use]
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hash a password with a fresh random salt.
    #[must_use]
    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);

        let mut derived = [0u8; HASH_SIZE];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, self.iterations, &mut derived);

        format!(
            "{}${}${}${}",
            SCHEME,
            self.iterations,
            BASE64.encode(salt),
            BASE64.encode(derived)
        )
    }

    /// Check a password against an encoded hash.
    ///
    /// Malformed hashes never verify.
    #[must_use]
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let Some((iterations, salt, expected)) = parse(encoded) else {
            return false;
        };

        let mut derived = vec![0u8; expected.len()];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut derived);

        derived.as_slice().ct_eq(expected.as_slice()).into()
    }
}

fn parse(encoded: &str) -> Option<(u32, Vec<u8>, Vec<u8>)> {
    let mut parts = encoded.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let iterations: u32 = parts.next()?.parse().ok()?;
    let salt = BASE64.decode(parts.next()?).ok()?;
    let hash = BASE64.decode(parts.next()?).ok()?;
    if parts.next().is_some() || iterations == 0 || hash.is_empty() {
        return None;
    }
    Some((iterations, salt, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PasswordHasher {
        PasswordHasher::new(MIN_ITERATIONS)
    }

    #[test]
    fn hash_then_verify() {
        let hasher = fast();
        let encoded = hasher.hash("correct horse");
        assert!(encoded.starts_with("pbkdf2-sha256$1000$"));
        assert!(hasher.verify("correct horse", &encoded));
        assert!(!hasher.verify("wrong horse", &encoded));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = fast();
        assert_ne!(hasher.hash("same"), hasher.hash("same"));
    }

    #[test]
    fn verify_uses_embedded_iterations() {
        let encoded = PasswordHasher::new(1500).hash("secret-pass");
        assert!(fast().verify("secret-pass", &encoded));
    }

    #[test]
    fn malformed_hashes_do_not_verify() {
        let hasher = fast();
        for bad in [
            "",
            "plaintext",
            "bcrypt$10$abc$def",
            "pbkdf2-sha256$0$AAAA$AAAA",
            "pbkdf2-sha256$1000$!!!$AAAA",
            "pbkdf2-sha256$1000$AAAA$AAAA$extra",
        ] {
            assert!(!hasher.verify("anything", bad), "accepted {bad:?}");
        }
    }
}
