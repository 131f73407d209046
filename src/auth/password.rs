//! Password hashing and credential validation for basic auth
//!
//! Hashes are scrypt PHC strings (`$scrypt$ln=15,r=8,p=1$<salt>$<hash>`), so a
//! stored value records its own salt and cost. Verification re-derives with
//! whatever parameters the stored value names.

use rand::Rng;
use scrypt::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use scrypt::{Params, Scrypt};
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 30;
const SALT_BYTES: usize = 16;
const HASH_LEN: usize = 32;

/// Verified against when a username has no stored hash, so a missing user
/// costs the same scrypt work as a wrong password. No password matches it.
pub const UNKNOWN_USER_HASH: &str =
    "$scrypt$ln=15,r=8,p=1$oU8xx3V8lJuu3qFwT3H5ZA$tb9zDpqu/2NVjLPwB554CVe+x6n4g75A6J5iDiCvpB0";

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid scrypt parameters: {0}")]
    Params(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("password hashing task failed: {0}")]
    Task(String),
}

/// scrypt cost parameters used when hashing new passwords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// log2 of the work factor N
    pub log_n: u8,
    /// block size
    pub r: u32,
    /// parallelism
    pub p: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        // N = 32768, r = 8, p = 1
        Self { log_n: 15, r: 8, p: 1 }
    }
}

impl HashCost {
    /// Hash a password with a fresh random salt
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let params = Params::new(self.log_n, self.r, self.p, HASH_LEN)
            .map_err(|e| PasswordError::Params(e.to_string()))?;

        let mut salt_bytes = [0u8; SALT_BYTES];
        rand::rng().fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;

        let hash = Scrypt
            .hash_password_customized(password.as_bytes(), None, None, params, &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Hash on the blocking pool; scrypt is deliberately slow
    pub async fn hash_blocking(self, password: String) -> Result<String, PasswordError> {
        tokio::task::spawn_blocking(move || self.hash(&password))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }
}

/// Check a password against a stored PHC string. A stored value that does
/// not parse never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Scrypt.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// `verify_password` on the blocking pool
pub async fn verify_password_blocking(
    password: String,
    stored: String,
) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))
}

/// Usernames match `[a-zA-Z][a-zA-Z0-9]{1,29}`
pub fn is_valid_username(username: &str) -> bool {
    let mut chars = username.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    (2..=MAX_USERNAME_LEN).contains(&username.len())
        && chars.all(|c| c.is_ascii_alphanumeric())
}
