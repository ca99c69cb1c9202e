//! # Flake Artifact
//!
//! A flake is the self-describing snapshot of one value: the exact type it
//! was taken from plus the (possibly compressed) provider payload.
//!
//! A flake is immutable once built. It can be stored, sent, and
//! reconstructed any number of times.
//!
//! ## Wire Format
//!
//! ```text
//! [type path length: u32 LE] [type path UTF-8] [payload length: u64 LE] [payload]
//! ```
//!
//! An empty type path encodes "no type" (the empty flake).

use crate::archive::{ArchiveReader, ArchiveWriter, FixedReader, FixedWriter};
use crate::types::{FlakesError, TypePath};
use serde::{Deserialize, Serialize};

/// Type descriptor + payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flake {
    /// Exact runtime type of the captured value. `None` for the empty flake.
    pub type_path: Option<TypePath>,
    /// Provider payload, compressed unless the producer bypassed compression.
    pub data: Vec<u8>,
}

impl Flake {
    #[must_use]
    pub fn new(type_path: TypePath, data: Vec<u8>) -> Self {
        Self {
            type_path: Some(type_path),
            data,
        }
    }

    /// Check if this is the empty flake (no type, no payload).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_path.is_none() && self.data.is_empty()
    }

    /// Serialize to the flake wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FlakesError> {
        let mut w = FixedWriter::new();
        w.write_str(self.type_path.as_ref().map(TypePath::as_str).unwrap_or_default())?;
        w.write_u64(self.data.len() as u64);
        w.write_raw(&self.data)?;
        Ok(w.into_bytes())
    }

    /// Parse the flake wire format. Trailing bytes are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FlakesError> {
        let mut r = FixedReader::new(bytes);
        let path = r.read_str()?;
        let len = usize::try_from(r.read_u64()?)
            .map_err(|_| FlakesError::SerializationError("payload length overflows usize".to_string()))?;
        let data = r.read_raw(len)?.to_vec();
        if r.remaining() != 0 {
            return Err(FlakesError::SerializationError(format!(
                "{} trailing bytes after flake",
                r.remaining()
            )));
        }
        Ok(Self {
            type_path: (!path.is_empty()).then(|| TypePath::new(path)),
            data,
        })
    }

    /// Compute a deterministic checksum of the wire bytes.
    ///
    /// Rotate-XOR over every byte, mixed with the length.
    ///
    /// # Security Note
    ///
    /// This is **NOT** a cryptographic hash. It detects accidental
    /// corruption only. Use `compute_blake3_hash` (feature `crypto-hash`)
    /// when tampering matters.
    #[must_use]
    pub fn checksum(bytes: &[u8]) -> u64 {
        let mut hash: u64 = (bytes.len() as u64).rotate_left(3);
        for (i, byte) in bytes.iter().enumerate() {
            hash ^= (*byte as u64).rotate_left(((i % 8) * 8) as u32);
            hash = hash.rotate_left(5);
        }
        hash
    }
}

/// Compute a BLAKE3 hash of arbitrary bytes.
///
/// # Requires
///
/// This function is only available with the `crypto-hash` feature enabled.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flake_is_empty() {
        let flake = Flake::default();
        assert!(flake.is_empty());
        let bytes = flake.to_bytes().expect("bytes");
        assert_eq!(Flake::from_bytes(&bytes).expect("parse"), flake);
    }

    #[test]
    fn wire_layout_is_stable() {
        let flake = Flake::new(TypePath::new("/S.T"), vec![9, 8]);
        let bytes = flake.to_bytes().expect("bytes");
        assert_eq!(
            bytes,
            vec![4, 0, 0, 0, b'/', b'S', b'.', b'T', 2, 0, 0, 0, 0, 0, 0, 0, 9, 8]
        );
    }

    #[test]
    fn truncated_and_padded_input_is_rejected() {
        let bytes = Flake::new(TypePath::new("/S.T"), vec![1, 2, 3]).to_bytes().expect("bytes");
        assert!(Flake::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut padded = bytes;
        padded.push(0);
        assert!(matches!(
            Flake::from_bytes(&padded),
            Err(FlakesError::SerializationError(_))
        ));
    }

    #[test]
    fn checksum_detects_single_byte_change() {
        let a = b"abcdef".to_vec();
        let mut b = a.clone();
        b[3] ^= 1;
        assert_ne!(Flake::checksum(&a), Flake::checksum(&b));
        assert_eq!(Flake::checksum(&a), Flake::checksum(&a.clone()));
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn blake3_hash_is_hex() {
        let hash = compute_blake3_hash(b"flake");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
