//! Dataset Hashes
//!
//! Digest format checks for `file_hash` entries and byte verification for
//! files an external fetcher has already downloaded.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::common::{BlueprintError, BlueprintResult};

/// Supported digest algorithms, identified by hex digest length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 3] = [Self::Sha256, Self::Sha384, Self::Sha512];

    /// Length of the hex-encoded digest
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }

    pub fn from_hex_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.hex_len() == len)
    }

    /// Hex digest of an in-memory buffer
    pub fn digest_hex(&self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha384 => hex::encode(Sha384::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }

    /// Hex digest of a reader, consumed in chunks
    pub fn digest_reader<R: Read>(&self, reader: R) -> std::io::Result<String> {
        match self {
            Self::Sha256 => stream_digest::<Sha256, R>(reader),
            Self::Sha384 => stream_digest::<Sha384, R>(reader),
            Self::Sha512 => stream_digest::<Sha512, R>(reader),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        };
        f.write_str(name)
    }
}

fn stream_digest<D: Digest, R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Check a `file_hash` value and return it normalized to lowercase
///
/// This is a format check only: hex characters and an accepted digest length.
pub fn normalize_digest(
    raw: &str,
    accepted: &[HashAlgorithm],
    path: &str,
) -> BlueprintResult<(String, HashAlgorithm)> {
    if raw.is_empty() {
        return Err(BlueprintError::invalid_hash(path, "file_hash is empty"));
    }

    if let Some(bad) = raw.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(BlueprintError::invalid_hash(
            path,
            format!("{:?} contains non-hex character {:?}", raw, bad),
        ));
    }

    let algorithm = HashAlgorithm::from_hex_len(raw.len())
        .filter(|alg| accepted.contains(alg))
        .ok_or_else(|| {
            let expected: Vec<String> = accepted
                .iter()
                .map(|alg| format!("{} ({} chars)", alg, alg.hex_len()))
                .collect();
            BlueprintError::invalid_hash(
                path,
                format!(
                    "{:?} has length {}, expected one of: {}",
                    raw,
                    raw.len(),
                    expected.join(", ")
                ),
            )
        })?;

    Ok((raw.to_ascii_lowercase(), algorithm))
}

/// Compare bytes against an expected digest
pub fn verify_bytes(location: &str, expected: &str, bytes: &[u8]) -> BlueprintResult<()> {
    let algorithm = algorithm_for(location, expected)?;
    let actual = algorithm.digest_hex(bytes);
    compare(location, expected, actual)
}

/// Compare a local file against an expected digest
pub fn verify_file(location: &str, expected: &str, path: &Path) -> BlueprintResult<()> {
    let algorithm = algorithm_for(location, expected)?;
    let file = File::open(path).map_err(|e| BlueprintError::io(path, e))?;
    let actual = algorithm
        .digest_reader(BufReader::new(file))
        .map_err(|e| BlueprintError::io(path, e))?;
    compare(location, expected, actual)
}

fn algorithm_for(location: &str, expected: &str) -> BlueprintResult<HashAlgorithm> {
    HashAlgorithm::from_hex_len(expected.len()).ok_or_else(|| {
        BlueprintError::invalid_hash(
            location,
            format!("unsupported digest length {}", expected.len()),
        )
    })
}

fn compare(location: &str, expected: &str, actual: String) -> BlueprintResult<()> {
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(BlueprintError::HashMismatch {
            location: location.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}
