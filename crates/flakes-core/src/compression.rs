//! # Compression Layer
//!
//! Wraps raw provider payloads with a named compressor and level.
//!
//! ## Frame Layout
//!
//! ```text
//! [compressor id: u8] [raw length: u32 LE] [compressed body]
//! ```
//!
//! The frame names its own compressor, so `decompress` needs no options.
//! Level `None` is a bypass: the raw bytes are stored without a frame, and
//! the consumer must be told out of band to skip decompression.

use crate::primitives::MAX_DECOMPRESSED_SIZE;
use crate::types::FlakesError;
use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::str::FromStr;
use tracing::{debug, error};

/// Frame header size: id byte + raw length.
const FRAME_HEADER_LEN: usize = 5;

// =============================================================================
// COMPRESSOR & LEVEL
// =============================================================================

/// Compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compressor {
    /// Raw DEFLATE stream.
    Deflate,
    /// DEFLATE with zlib framing and checksum.
    #[default]
    Zlib,
    /// LZ4 block format. Ignores the level.
    Lz4,
}

impl Compressor {
    /// Byte stored in the frame header.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Deflate => 1,
            Self::Zlib => 2,
            Self::Lz4 => 3,
        }
    }

    pub fn from_id(id: u8) -> Result<Self, FlakesError> {
        match id {
            1 => Ok(Self::Deflate),
            2 => Ok(Self::Zlib),
            3 => Ok(Self::Lz4),
            other => Err(FlakesError::Decompression(format!("unknown compressor id {}", other))),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Deflate => "deflate",
            Self::Zlib => "zlib",
            Self::Lz4 => "lz4",
        }
    }
}

impl FromStr for Compressor {
    type Err = FlakesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deflate" => Ok(Self::Deflate),
            "zlib" => Ok(Self::Zlib),
            "lz4" => Ok(Self::Lz4),
            other => Err(FlakesError::Compression(format!("unknown compressor '{}'", other))),
        }
    }
}

/// Speed/size trade-off. `None` disables compression entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    None,
    Fastest,
    Fast,
    #[default]
    Normal,
    Optimal,
}

impl CompressionLevel {
    fn flate(self) -> Compression {
        match self {
            Self::None => Compression::none(),
            Self::Fastest => Compression::fast(),
            Self::Fast => Compression::new(3),
            Self::Normal => Compression::default(),
            Self::Optimal => Compression::best(),
        }
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

impl FromStr for CompressionLevel {
    type Err = FlakesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "fastest" => Ok(Self::Fastest),
            "fast" => Ok(Self::Fast),
            "normal" => Ok(Self::Normal),
            "optimal" => Ok(Self::Optimal),
            other => Err(FlakesError::Compression(format!("unknown compression level '{}'", other))),
        }
    }
}

/// Compressor plus level, as carried in read options and config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    pub compressor: Compressor,
    pub level: CompressionLevel,
}

impl CompressionOptions {
    /// Options that store payloads raw.
    #[must_use]
    pub const fn uncompressed() -> Self {
        Self {
            compressor: Compressor::Zlib,
            level: CompressionLevel::None,
        }
    }

    #[must_use]
    pub const fn is_bypass(&self) -> bool {
        self.level.is_none()
    }
}

// =============================================================================
// COMPRESS / DECOMPRESS
// =============================================================================

/// Compress `raw` into a frame. Level `None` returns `raw` unchanged.
pub fn compress(raw: &[u8], options: CompressionOptions) -> Result<Vec<u8>, FlakesError> {
    if options.is_bypass() {
        return Ok(raw.to_vec());
    }

    let raw_len = u32::try_from(raw.len()).map_err(|_| {
        error!(size = raw.len(), "payload too large to compress");
        FlakesError::Compression(format!("payload of {} bytes exceeds u32 length", raw.len()))
    })?;

    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + raw.len() / 2);
    out.push(options.compressor.id());
    out.extend_from_slice(&raw_len.to_le_bytes());

    let result = match options.compressor {
        Compressor::Deflate => {
            let mut encoder = DeflateEncoder::new(out, options.level.flate());
            encoder.write_all(raw).and_then(|()| encoder.finish())
        }
        Compressor::Zlib => {
            let mut encoder = ZlibEncoder::new(out, options.level.flate());
            encoder.write_all(raw).and_then(|()| encoder.finish())
        }
        Compressor::Lz4 => {
            out.extend_from_slice(&lz4_flex::block::compress(raw));
            Ok(out)
        }
    };

    let framed = result.map_err(|e| {
        error!(compressor = options.compressor.name(), "compression failed: {}", e);
        FlakesError::Compression(e.to_string())
    })?;
    debug!(
        compressor = options.compressor.name(),
        raw = raw.len(),
        compressed = framed.len(),
        "payload compressed"
    );
    Ok(framed)
}

/// Decompress a frame produced by `compress`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, FlakesError> {
    decompress_frame(data).inspect_err(|e| error!("decompression failed: {}", e))
}

fn decompress_frame(data: &[u8]) -> Result<Vec<u8>, FlakesError> {
    let (header, body) = data
        .split_at_checked(FRAME_HEADER_LEN)
        .ok_or_else(|| FlakesError::Decompression(format!("frame of {} bytes has no header", data.len())))?;
    let compressor = Compressor::from_id(header[0])?;
    let raw_len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if raw_len > MAX_DECOMPRESSED_SIZE {
        return Err(FlakesError::Decompression(format!(
            "declared size {} exceeds maximum {}",
            raw_len, MAX_DECOMPRESSED_SIZE
        )));
    }

    let raw = match compressor {
        Compressor::Deflate => read_bounded(DeflateDecoder::new(body), raw_len)?,
        Compressor::Zlib => read_bounded(ZlibDecoder::new(body), raw_len)?,
        Compressor::Lz4 => lz4_flex::block::decompress(body, raw_len)
            .map_err(|e| FlakesError::Decompression(format!("lz4: {}", e)))?,
    };

    if raw.len() != raw_len {
        return Err(FlakesError::Decompression(format!(
            "decoded {} bytes, frame declared {}",
            raw.len(),
            raw_len
        )));
    }
    Ok(raw)
}

/// Read at most one byte past `expected` so oversized streams are caught
/// without decoding them fully.
fn read_bounded<R: Read>(decoder: R, expected: usize) -> Result<Vec<u8>, FlakesError> {
    let mut raw = Vec::with_capacity(expected);
    decoder
        .take(expected as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(|e| FlakesError::Decompression(e.to_string()))?;
    Ok(raw)
}

// =============================================================================
// TESTS
// =============================================================================
