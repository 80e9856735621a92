//! Canonical serialization for deterministic hashing.
//!
//! The manifest written to `state.json` and its fingerprint come from the same
//! bytes, so two exports with equal fingerprints produced identical manifests.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable Vec order: Vectors serialize in index order
//! - No HashMap allowed: Use BTreeMap for maps in hashed data
//! - Stable float format: f32/f64 serialize consistently

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Compute the xxh64 hash of already-canonical bytes.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    xxh64(bytes, 0)
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<u64, serde_json::Error> {
    Ok(hash_bytes(&to_canonical_bytes(value)?))
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SceneManifest;

    #[derive(Serialize)]
    struct TestStruct {
        name: String,
        value: i32,
    }

    #[test]
    fn test_determinism() {
        let s = TestStruct {
            name: "test".to_string(),
            value: 42,
        };

        let h1 = canonical_hash(&s).unwrap();
        let h2 = canonical_hash(&s).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hex_matches_bytes_hash() {
        let manifest = SceneManifest::new();
        let bytes = to_canonical_bytes(&manifest).unwrap();
        assert_eq!(
            canonical_hash_hex(&manifest).unwrap(),
            format!("{:016x}", hash_bytes(&bytes))
        );
        assert_eq!(canonical_hash_hex(&manifest).unwrap().len(), 16);
    }
}
