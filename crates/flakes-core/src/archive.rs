//! # Byte Archives
//!
//! Primitive encoders the binary walker writes through.
//!
//! Two layouts share one trait pair:
//! - `FixedWriter`/`FixedReader`: little-endian fixed-width integers,
//!   `u32` length prefixes (the `Binary` codec)
//! - `VarintWriter`/`VarintReader`: postcard varints for integers and
//!   lengths, which is smaller for typical game data (the `NetBinary` codec)
//!
//! Floats are always fixed-width IEEE 754 little-endian.

use crate::primitives::MAX_STRING_LENGTH;
use crate::types::FlakesError;

// =============================================================================
// TRAITS
// =============================================================================

/// Sink for primitive values.
pub trait ArchiveWriter {
    fn write_u8(&mut self, v: u8) -> Result<(), FlakesError>;
    fn write_i64(&mut self, v: i64) -> Result<(), FlakesError>;
    fn write_f32(&mut self, v: f32) -> Result<(), FlakesError>;
    fn write_f64(&mut self, v: f64) -> Result<(), FlakesError>;
    /// Length prefix for strings and arrays.
    fn write_len(&mut self, len: usize) -> Result<(), FlakesError>;
    /// Raw bytes with no prefix.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), FlakesError>;
    fn into_bytes(self) -> Vec<u8>;

    fn write_bool(&mut self, v: bool) -> Result<(), FlakesError> {
        self.write_u8(u8::from(v))
    }

    fn write_str(&mut self, s: &str) -> Result<(), FlakesError> {
        self.write_len(s.len())?;
        self.write_raw(s.as_bytes())
    }
}

/// Source of primitive values.
pub trait ArchiveReader {
    fn read_u8(&mut self) -> Result<u8, FlakesError>;
    fn read_i64(&mut self) -> Result<i64, FlakesError>;
    fn read_f32(&mut self) -> Result<f32, FlakesError>;
    fn read_f64(&mut self) -> Result<f64, FlakesError>;
    fn read_len(&mut self) -> Result<usize, FlakesError>;
    /// Next `n` bytes.
    fn read_raw(&mut self, n: usize) -> Result<&[u8], FlakesError>;
    /// Bytes left to read.
    fn remaining(&self) -> usize;

    fn read_bool(&mut self) -> Result<bool, FlakesError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(FlakesError::Format(format!("invalid bool byte {}", other))),
        }
    }

    fn read_str(&mut self) -> Result<String, FlakesError> {
        let len = self.read_len()?;
        if len > MAX_STRING_LENGTH {
            return Err(FlakesError::Format(format!(
                "string length {} exceeds maximum {}",
                len, MAX_STRING_LENGTH
            )));
        }
        let bytes = self.read_raw(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| FlakesError::Format(format!("invalid UTF-8: {}", e)))
    }
}

/// Shared cursor over a borrowed payload.
#[derive(Debug, Clone)]
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn rest(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FlakesError> {
        let rest = self.rest();
        let slice = rest.get(..n).ok_or(FlakesError::Truncated {
            needed: n,
            remaining: rest.len(),
        })?;
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], FlakesError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

// =============================================================================
// FIXED-WIDTH LAYOUT
// =============================================================================

/// Little-endian fixed-width writer.
#[derive(Debug, Clone, Default)]
pub struct FixedWriter {
    buf: Vec<u8>,
}

impl FixedWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
}

impl ArchiveWriter for FixedWriter {
    fn write_u8(&mut self, v: u8) -> Result<(), FlakesError> {
        self.buf.push(v);
        Ok(())
    }

    fn write_i64(&mut self, v: i64) -> Result<(), FlakesError> {
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn write_f32(&mut self, v: f32) -> Result<(), FlakesError> {
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn write_f64(&mut self, v: f64) -> Result<(), FlakesError> {
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn write_len(&mut self, len: usize) -> Result<(), FlakesError> {
        let len = u32::try_from(len).map_err(|_| {
            FlakesError::SerializationError(format!("length {} does not fit in u32", len))
        })?;
        self.write_u32(len);
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), FlakesError> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Little-endian fixed-width reader.
#[derive(Debug, Clone)]
pub struct FixedReader<'a> {
    cursor: Cursor<'a>,
}

impl<'a> FixedReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, FlakesError> {
        Ok(u32::from_le_bytes(self.cursor.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, FlakesError> {
        Ok(u64::from_le_bytes(self.cursor.take_array()?))
    }

    /// Everything not yet read, without consuming it.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        self.cursor.rest()
    }
}

impl ArchiveReader for FixedReader<'_> {
    fn read_u8(&mut self) -> Result<u8, FlakesError> {
        let [b] = self.cursor.take_array::<1>()?;
        Ok(b)
    }

    fn read_i64(&mut self) -> Result<i64, FlakesError> {
        Ok(i64::from_le_bytes(self.cursor.take_array()?))
    }

    fn read_f32(&mut self) -> Result<f32, FlakesError> {
        Ok(f32::from_le_bytes(self.cursor.take_array()?))
    }

    fn read_f64(&mut self) -> Result<f64, FlakesError> {
        Ok(f64::from_le_bytes(self.cursor.take_array()?))
    }

    fn read_len(&mut self) -> Result<usize, FlakesError> {
        Ok(self.read_u32()? as usize)
    }

    fn read_raw(&mut self, n: usize) -> Result<&[u8], FlakesError> {
        self.cursor.take(n)
    }

    fn remaining(&self) -> usize {
        self.cursor.rest().len()
    }
}

// =============================================================================
// VARINT LAYOUT
// =============================================================================

/// Postcard varint writer.
#[derive(Debug, Clone, Default)]
pub struct VarintWriter {
    buf: Vec<u8>,
}

impl VarintWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn put<T: serde::Serialize>(&mut self, v: &T) -> Result<(), FlakesError> {
        let buf = std::mem::take(&mut self.buf);
        self.buf = postcard::to_extend(v, buf)
            .map_err(|e| FlakesError::SerializationError(format!("varint: {}", e)))?;
        Ok(())
    }
}

impl ArchiveWriter for VarintWriter {
    fn write_u8(&mut self, v: u8) -> Result<(), FlakesError> {
        self.buf.push(v);
        Ok(())
    }

    fn write_i64(&mut self, v: i64) -> Result<(), FlakesError> {
        self.put(&v)
    }

    fn write_f32(&mut self, v: f32) -> Result<(), FlakesError> {
        self.put(&v)
    }

    fn write_f64(&mut self, v: f64) -> Result<(), FlakesError> {
        self.put(&v)
    }

    fn write_len(&mut self, len: usize) -> Result<(), FlakesError> {
        self.put(&(len as u64))
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), FlakesError> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Postcard varint reader.
#[derive(Debug, Clone)]
pub struct VarintReader<'a> {
    cursor: Cursor<'a>,
}

impl<'a> VarintReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    fn take<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, FlakesError> {
        let rest = self.cursor.rest();
        let (value, tail) = postcard::take_from_bytes::<T>(rest).map_err(|e| match e {
            postcard::Error::DeserializeUnexpectedEnd => FlakesError::Truncated {
                needed: 1,
                remaining: rest.len(),
            },
            other => FlakesError::Format(format!("varint: {}", other)),
        })?;
        self.cursor.pos += rest.len() - tail.len();
        Ok(value)
    }
}

impl ArchiveReader for VarintReader<'_> {
    fn read_u8(&mut self) -> Result<u8, FlakesError> {
        let [b] = self.cursor.take_array::<1>()?;
        Ok(b)
    }

    fn read_i64(&mut self) -> Result<i64, FlakesError> {
        self.take()
    }

    fn read_f32(&mut self) -> Result<f32, FlakesError> {
        self.take()
    }

    fn read_f64(&mut self) -> Result<f64, FlakesError> {
        self.take()
    }

    fn read_len(&mut self) -> Result<usize, FlakesError> {
        let len: u64 = self.take()?;
        usize::try_from(len).map_err(|_| FlakesError::Format(format!("length {} too large", len)))
    }

    fn read_raw(&mut self, n: usize) -> Result<&[u8], FlakesError> {
        self.cursor.take(n)
    }

    fn remaining(&self) -> usize {
        self.cursor.rest().len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
