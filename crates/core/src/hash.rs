//! Content digests for file fingerprints
//!
//! The algorithm is fixed at build time: SHA-256 by default, BLAKE3 when the
//! `blake3` feature is enabled. Every digest in a running system therefore
//! comes from the same function.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use thiserror::Error;

#[cfg(not(feature = "blake3"))]
use sha2::{Digest as _, Sha256};

/// Name of the digest algorithm compiled into this build
#[cfg(not(feature = "blake3"))]
pub const ALGORITHM: &str = "sha256";

/// Name of the digest algorithm compiled into this build
#[cfg(feature = "blake3")]
pub const ALGORITHM: &str = "blake3";

/// Length of a digest in bytes
pub const DIGEST_LEN: usize = 32;

/// A 256-bit content digest
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Digest([u8; DIGEST_LEN]);

/// Error parsing a hex-encoded digest
#[derive(Debug, Error, PartialEq)]
pub enum DigestParseError {
    #[error("invalid digest length: expected 64 hex characters, got {0}")]
    Length(usize),
    #[error("invalid hex in digest: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl Digest {
    /// Create a digest from raw bytes
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the digest as a byte slice
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64 character hex string
    pub fn from_hex(s: &str) -> Result<Self, DigestParseError> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(DigestParseError::Length(s.len()));
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash bytes
pub fn hash_bytes(data: &[u8]) -> Digest {
    let mut hasher = IncrementalHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Hash a file (streaming, 8KB reads)
///
/// Watched files belong to other writers and may shrink mid-read, so they
/// are never memory mapped: a truncated map faults the whole process.
pub fn hash_file(path: &Path) -> std::io::Result<Digest> {
    use std::fs::File;
    use std::io::{BufReader, Read};

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = IncrementalHasher::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Incremental hasher for building digests across multiple chunks
pub struct IncrementalHasher {
    #[cfg(not(feature = "blake3"))]
    inner: Sha256,
    #[cfg(feature = "blake3")]
    inner: blake3::Hasher,
}

impl IncrementalHasher {
    /// Create a new incremental hasher
    pub fn new() -> Self {
        Self {
            #[cfg(not(feature = "blake3"))]
            inner: Sha256::new(),
            #[cfg(feature = "blake3")]
            inner: blake3::Hasher::new(),
        }
    }

    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the digest
    #[cfg(not(feature = "blake3"))]
    pub fn finalize(self) -> Digest {
        let bytes: [u8; DIGEST_LEN] = self.inner.finalize().into();
        Digest::from_bytes(bytes)
    }

    /// Finalize and return the digest
    #[cfg(feature = "blake3")]
    pub fn finalize(self) -> Digest {
        Digest::from_bytes(*self.inner.finalize().as_bytes())
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_consistency() {
        let data = b"hello world";
        assert_eq!(hash_bytes(data), hash_bytes(data));
    }

    #[cfg(not(feature = "blake3"))]
    #[test]
    fn test_sha256_known_vectors() {
        assert_eq!(
            hash_bytes(b"hello").to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            hash_bytes(b"world").to_hex(),
            "486ea46224d1bb4fb680f34f7c9ad96a8f24ec88be73ea8e5a6c65260e9cb8a7"
        );
    }

    #[test]
    fn test_hex_roundtrip() {
        let digest = Digest::from_bytes([42; 32]);
        let decoded = Digest::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(digest, decoded);
    }

    #[test]
    fn test_hex_decoding_invalid_length() {
        assert_eq!(Digest::from_hex("abc"), Err(DigestParseError::Length(3)));
        assert!(Digest::from_hex("").is_err());
        assert!(Digest::from_hex(&"a".repeat(63)).is_err());
    }

    #[test]
    fn test_hex_decoding_invalid_chars() {
        assert!(matches!(
            Digest::from_hex(&"g".repeat(64)),
            Err(DigestParseError::Hex(_))
        ));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let digest = hash_bytes(b"hello");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn test_incremental_hasher() {
        let mut incremental = IncrementalHasher::new();
        incremental.update(b"hello ");
        incremental.update(b"world");
        assert_eq!(incremental.finalize(), hash_bytes(b"hello world"));
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        std::fs::write(&file_path, b"test file content").unwrap();

        assert_eq!(hash_file(&file_path).unwrap(), hash_bytes(b"test file content"));
    }

    #[test]
    fn test_hash_large_file_matches_bytes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("large.bin");

        let mut file = std::fs::File::create(&file_path).unwrap();
        let chunk = vec![0xAB; 1024 * 1024];
        for _ in 0..5 {
            file.write_all(&chunk).unwrap();
        }
        drop(file);

        assert_eq!(hash_file(&file_path).unwrap(), hash_bytes(&vec![0xAB; 5 * 1024 * 1024]));
    }

    #[test]
    fn test_different_data_different_hash() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }
}
