//! Symmetric key material

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key is not valid base64url")]
    Encoding,

    #[error("key must be {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
}

/// A 256-bit secret key, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; KEY_LEN],
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Decode an unpadded base64url key
    pub fn from_base64url(encoded: &str) -> Result<Self, KeyError> {
        let mut decoded = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| KeyError::Encoding)?;

        let result = <[u8; KEY_LEN]>::try_from(decoded.as_slice())
            .map(Self::from_bytes)
            .map_err(|_| KeyError::Length {
                expected: KEY_LEN,
                got: decoded.len(),
            });
        decoded.zeroize();
        result
    }

    /// Fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill(&mut bytes);
        Self { bytes }
    }

    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64url_roundtrip() {
        let key = SecretKey::generate();
        let decoded = SecretKey::from_base64url(&key.to_base64url()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let short = URL_SAFE_NO_PAD.encode([7u8; 16]);
        assert_eq!(
            SecretKey::from_base64url(&short),
            Err(KeyError::Length { expected: 32, got: 16 })
        );
    }

    #[test]
    fn test_bad_encoding_rejected() {
        assert_eq!(SecretKey::from_base64url("not base64!"), Err(KeyError::Encoding));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SecretKey::from_bytes([0xab; KEY_LEN]);
        assert_eq!(format!("{:?}", key), "SecretKey([REDACTED])");
    }
}
