//! Argon2id password hashing. Only PHC strings are ever stored.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored credential is malformed: {0}")]
    MalformedHash(String),
}

/// Well-formed hash under the default parameters that matches no password.
const DECOY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$WzWKkdYe228itgvTT36UeQ$J4tpLlyJHa6i7o/cDsF2nChEDp3G1kmTP74Fe/dATpI";

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    if password.is_empty() {
        return Err(PasswordError::Empty);
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| PasswordError::Hash(err.to_string()))
}

/// Verify a claimed password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch; malformed hashes are errors so a corrupted
/// credential never silently authenticates.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| PasswordError::MalformedHash(err.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(PasswordError::MalformedHash(err.to_string())),
    }
}

/// Spend the same Argon2 work as a real check when there is no stored hash,
/// so an unknown account fails no faster than a wrong password.
pub fn verify_decoy(password: &str) {
    let _ = verify_password(password, DECOY_HASH);
}
