//! Hashing helpers.
//!
//! BLAKE3 for everything Shroud-internal (handle digests, proof MACs, key
//! derivation), SHA-256 for the structured authorization digest where
//! interoperability with existing wallet tooling matters.

use sha2::{Digest, Sha256};

/// SHA-256 as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over several slices without concatenating them first.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// BLAKE3 as a fixed-size array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Domain-separated BLAKE3 key derivation over several slices.
///
/// `context` must be a hardcoded, globally unique string.
pub fn derive_key(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Keyed BLAKE3 MAC.
pub fn keyed_mac(key: &[u8; 32], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_keyed(key);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn concat_matches_single_buffer() {
        assert_eq!(sha256_concat(&[b"ab", b"c"]), sha256(b"abc"));
    }

    #[test]
    fn derive_key_is_domain_separated() {
        let a = derive_key("shroud test context A", &[b"x"]);
        let b = derive_key("shroud test context B", &[b"x"]);
        assert_ne!(a, b);
        assert_eq!(a, derive_key("shroud test context A", &[b"x"]));
    }

    #[test]
    fn mac_depends_on_key() {
        assert_ne!(keyed_mac(&[1; 32], &[b"m"]), keyed_mac(&[2; 32], &[b"m"]));
        assert_ne!(blake3_hash(b"m"), keyed_mac(&[0; 32], &[b"m"]));
    }
}
