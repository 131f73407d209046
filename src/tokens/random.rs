//! Unguessable identifiers

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;

/// Default identifier size: 160 bits
pub const DEFAULT_ID_BYTES: usize = 20;

/// Random bytes from the thread-local CSPRNG, encoded as unpadded base64url
pub fn random_id(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(bytes.as_mut_slice());
    URL_SAFE_NO_PAD.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_length_and_alphabet() {
        let id = random_id(DEFAULT_ID_BYTES);
        // 20 bytes -> 27 base64 chars without padding
        assert_eq!(id.len(), 27);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!id.contains('.'));
    }

    #[test]
    fn test_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| random_id(DEFAULT_ID_BYTES)).collect();
        assert_eq!(ids.len(), 1000);
    }
}
