// src/hash.rs

//! File digests for change tracking and cache signatures
//!
//! Two algorithms cover the needs here:
//! - **SHA-256**: durable content identity recorded for every scanned
//!   mod file, stable across machines and runs
//! - **XXH128**: fast non-cryptographic digest for cache signatures,
//!   where speed matters and collisions only cost a recompute

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use xxhash_rust::xxh3::{Xxh3, xxh3_128};

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-256, for content identity that outlives a single run
    #[default]
    Sha256,
    /// XXH128, for throwaway signatures where speed wins
    Xxh128,
}

impl HashAlgorithm {
    /// Length of the hex rendering of a digest
    #[inline]
    pub const fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Xxh128 => 32,
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Xxh128 => "xxh128",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Incremental hasher over either algorithm
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Xxh128(Xxh3),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Xxh128 => HasherState::Xxh128(Xxh3::new()),
        };
        Self { algorithm, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(hasher) => hasher.update(data),
            HasherState::Xxh128(hasher) => hasher.update(data),
        }
    }

    /// Finalize and return the digest as lowercase hex.
    pub fn finalize(self) -> String {
        match self.state {
            HasherState::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            HasherState::Xxh128(hasher) => format!("{:032x}", hasher.digest128()),
        }
    }

    #[inline]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

/// Digest a byte slice.
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::Xxh128 => format!("{:032x}", xxh3_128(data)),
    }
}

/// Digest everything a reader yields.
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Digest a file without loading it whole into memory.
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    hash_reader(algorithm, &mut file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let digest = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");
        assert_eq!(
            digest,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(digest.len(), HashAlgorithm::Sha256.hex_len());
    }

    #[test]
    fn test_xxh128_length() {
        let digest = hash_bytes(HashAlgorithm::Xxh128, b"Hello, World!");
        assert_eq!(digest.len(), HashAlgorithm::Xxh128.hex_len());
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Xxh128] {
            let mut hasher = Hasher::new(algorithm);
            hasher.update(b"Hello, ");
            hasher.update(b"World!");
            assert_eq!(
                hasher.finalize(),
                hash_bytes(algorithm, b"Hello, World!"),
                "algorithm {}",
                algorithm
            );
        }
    }

    #[test]
    fn test_hash_reader_matches_bytes() {
        let data = vec![7u8; 40_000];
        let mut cursor = std::io::Cursor::new(&data);
        let streamed = hash_reader(HashAlgorithm::Sha256, &mut cursor).unwrap();
        assert_eq!(streamed, hash_bytes(HashAlgorithm::Sha256, &data));
    }

    #[test]
    fn test_hash_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"package bytes").unwrap();

        let digest = hash_file(HashAlgorithm::Sha256, file.path()).unwrap();
        assert_eq!(digest, hash_bytes(HashAlgorithm::Sha256, b"package bytes"));
    }

    #[test]
    fn test_hash_file_missing() {
        let result = hash_file(HashAlgorithm::Sha256, Path::new("/does/not/exist"));
        assert!(result.is_err());
    }
}
