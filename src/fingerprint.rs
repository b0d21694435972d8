//! Content fingerprints: the sole key of the document cache.
//!
//! A fingerprint is the SHA-256 of a document's raw bytes. It never looks at
//! the file name or path, so the same PDF uploaded twice under different
//! names collapses to one cache entry and one set of work items.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Read size for [`fingerprint_file`].
const CHUNK_SIZE: usize = 64 * 1024;

/// Opaque, fixed-length identifier derived from a document's bytes.
///
/// Displays (and serialises) as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentFingerprint([u8; 32]);

impl DocumentFingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form, as used for blob file names and index keys.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(12);
        s
    }
}

impl fmt::Display for DocumentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DocumentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentFingerprint({})", self.short())
    }
}

/// Error returned when parsing a fingerprint from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fingerprint '{0}': expected 64 hex characters")]
pub struct ParseFingerprintError(String);

impl FromStr for DocumentFingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).map_err(|_| ParseFingerprintError(s.to_string()))?;
        Ok(Self(out))
    }
}

impl Serialize for DocumentFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DocumentFingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fingerprint an in-memory document.
pub fn fingerprint(bytes: &[u8]) -> DocumentFingerprint {
    DocumentFingerprint(Sha256::digest(bytes).into())
}

/// Fingerprint a file on disk, reading it in chunks.
///
/// Produces the same value as [`fingerprint`] over the file's full content.
pub fn fingerprint_file(path: &Path) -> std::io::Result<DocumentFingerprint> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(DocumentFingerprint(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn identical_bytes_identical_fingerprint() {
        let a = fingerprint(b"%PDF-1.7 hello");
        let b = fingerprint(b"%PDF-1.7 hello");
        assert_eq!(a, b);
    }

    #[test]
    fn single_bit_flip_changes_fingerprint() {
        let original = b"%PDF-1.7 hello".to_vec();
        let mut flipped = original.clone();
        flipped[9] ^= 0x01;
        assert_ne!(fingerprint(&original), fingerprint(&flipped));
    }

    #[test]
    fn known_sha256_vector() {
        // SHA-256("abc")
        assert_eq!(
            fingerprint(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hex_parse_and_serde() {
        let fp = fingerprint(b"document");
        let parsed: DocumentFingerprint = fp.to_hex().parse().unwrap();
        assert_eq!(parsed, fp);

        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
        let back: DocumentFingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);

        assert!("not-hex".parse::<DocumentFingerprint>().is_err());
        assert!("abcd".parse::<DocumentFingerprint>().is_err());
    }

    #[test]
    fn file_fingerprint_matches_in_memory() {
        // Larger than one chunk so the streaming path is exercised.
        let content: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&content).unwrap();
        tmp.flush().unwrap();

        let from_file = fingerprint_file(tmp.path()).unwrap();
        assert_eq!(from_file, fingerprint(&content));
    }

    #[test]
    fn short_form_is_prefix() {
        let fp = fingerprint(b"x");
        assert!(fp.to_hex().starts_with(&fp.short()));
        assert_eq!(fp.short().len(), 12);
    }
}
