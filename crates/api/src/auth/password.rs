//! Password hashing
//!
//! Argon2id with per-hash salts. `verify` runs against a fixed dummy hash
//! when the account does not exist so the login path costs the same either
//! way.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use dukapo_shared::{AppError, AppResult};

/// Hash of the string "dummy-password"; verified against when the user
/// lookup misses, keeping timing independent of account existence.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$3Nz2kXpVH0QW8jYocvVQlw$N+TC2uzfYo0EXS7GyOXRZXMd2ncLXIsKCbqYRPaQHKA";

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Burn the same work as a real verification without a real hash.
pub fn verify_dummy(password: &str) {
    if let Ok(parsed) = PasswordHash::new(DUMMY_HASH) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("s3cret-pa55word").unwrap();
        assert!(verify_password("s3cret-pa55word", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn dummy_verify_does_not_panic() {
        verify_dummy("whatever");
    }
}
