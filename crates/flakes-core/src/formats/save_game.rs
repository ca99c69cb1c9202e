//! # Save-Game File
//!
//! A save-game is one flake plus the metadata needed to consume it: the
//! provider that produced the payload and whether the payload is compressed.
//!
//! ## Layout
//!
//! ```text
//! [header length: u32 LE] [SaveHeader (postcard)] [Flake wire bytes]
//! ```
//!
//! The header is validated before the body is parsed. The checksum covers
//! the flake wire bytes only.

use crate::flake::Flake;
use crate::interface::{self, Flakes, WriteOptions};
use crate::primitives::{self, DEFAULT_PROVIDER, MAX_SAVE_SIZE};
use crate::types::{FlakesError, ObjectId, TypePath};
use crate::value::StructValue;
use crate::world::ObjectStore;
use serde::{Deserialize, Serialize};

/// Length prefix size.
const HEADER_LEN_PREFIX: usize = 4;

// =============================================================================
// HEADER
// =============================================================================

/// Header preceding the flake in a save-game file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Provider that produced the payload.
    pub provider: String,

    /// Whether the payload is compressed.
    pub compressed: bool,

    /// Length of the flake wire bytes.
    pub body_len: u64,

    /// Rotate-XOR checksum of the flake wire bytes.
    pub checksum: u64,
}

impl SaveHeader {
    #[must_use]
    pub fn new(provider: &str, compressed: bool, body: &[u8]) -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
            provider: provider.to_string(),
            compressed,
            body_len: body.len() as u64,
            checksum: Flake::checksum(body),
        }
    }

    /// Validate the header.
    ///
    /// # Security Note
    ///
    /// Error messages are intentionally generic to avoid leaking format details.
    pub fn validate(&self) -> Result<(), FlakesError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(FlakesError::SerializationError("Invalid file format".to_string()));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(FlakesError::SerializationError("Unsupported file version".to_string()));
        }
        if self.provider.is_empty() {
            return Err(FlakesError::SerializationError("Missing provider name".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// SAVE GAME
// =============================================================================

/// A single saved value and how to read it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveGame {
    pub provider: String,
    pub compressed: bool,
    pub flake: Flake,
}

impl Default for SaveGame {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            compressed: true,
            flake: Flake::default(),
        }
    }
}

impl SaveGame {
    /// Capture an object with the facade's provider and options.
    pub fn set_object_to_save(
        &mut self,
        flakes: &Flakes,
        store: &dyn ObjectStore,
        object: ObjectId,
    ) -> Result<(), FlakesError> {
        self.flake = flakes.make_object(store, Some(object))?;
        self.provider = flakes.provider().to_string();
        self.compressed = !flakes.read_options().compression.is_bypass();
        Ok(())
    }

    /// Capture a struct value with the facade's provider and options.
    pub fn set_struct_to_save(
        &mut self,
        flakes: &Flakes,
        store: &dyn ObjectStore,
        value: &StructValue,
        owner: Option<ObjectId>,
    ) -> Result<(), FlakesError> {
        self.flake = flakes.make_struct(store, value, owner)?;
        self.provider = flakes.provider().to_string();
        self.compressed = !flakes.read_options().compression.is_bypass();
        Ok(())
    }

    /// Rebuild the saved object with its own type as the expectation.
    pub fn load_object(
        &self,
        flakes: &Flakes,
        store: &mut dyn ObjectStore,
        outer: Option<ObjectId>,
    ) -> Result<ObjectId, FlakesError> {
        let expected = self.flake.type_path.clone().ok_or(FlakesError::MissingType)?;
        self.load_object_checked(flakes, store, &expected, outer)
    }

    /// Rebuild the saved object, requiring it to be `expected` or derived from it.
    pub fn load_object_checked(
        &self,
        flakes: &Flakes,
        store: &mut dyn ObjectStore,
        expected: &TypePath,
        outer: Option<ObjectId>,
    ) -> Result<ObjectId, FlakesError> {
        interface::create_object(
            flakes.registry(),
            &self.provider,
            store,
            &self.flake,
            expected,
            outer,
            &self.write_options(flakes),
        )
    }

    /// Rebuild the saved struct value.
    pub fn load_struct(
        &self,
        flakes: &Flakes,
        store: &mut dyn ObjectStore,
        outer: Option<ObjectId>,
    ) -> Result<StructValue, FlakesError> {
        let expected = self.flake.type_path.clone().ok_or(FlakesError::MissingType)?;
        interface::create_struct(
            flakes.registry(),
            &self.provider,
            store,
            &self.flake,
            &expected,
            outer,
            &self.write_options(flakes),
        )
    }

    fn write_options(&self, flakes: &Flakes) -> WriteOptions {
        WriteOptions {
            skip_decompression: !self.compressed,
            ..*flakes.write_options()
        }
    }

    /// Serialize to the save-game file layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FlakesError> {
        let body = self.flake.to_bytes()?;
        let header = SaveHeader::new(&self.provider, self.compressed, &body);
        let header_bytes = postcard::to_allocvec(&header)
            .map_err(|e| FlakesError::SerializationError(format!("Header: {}", e)))?;

        // Combine: [header_len: u32] [header] [body]
        let mut result = Vec::with_capacity(HEADER_LEN_PREFIX + header_bytes.len() + body.len());
        result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        result.extend_from_slice(&header_bytes);
        result.extend_from_slice(&body);
        Ok(result)
    }

    /// Validate and split a save-game file into its header and flake bytes.
    pub fn read_header(data: &[u8]) -> Result<(SaveHeader, &[u8]), FlakesError> {
        if data.len() > MAX_SAVE_SIZE {
            return Err(FlakesError::SerializationError(format!(
                "Save size {} exceeds maximum {}",
                data.len(),
                MAX_SAVE_SIZE
            )));
        }
        let (prefix, rest) = data
            .split_first_chunk::<HEADER_LEN_PREFIX>()
            .ok_or_else(|| FlakesError::SerializationError("Data too short".to_string()))?;
        let header_len = u32::from_le_bytes(*prefix) as usize;
        let (header_bytes, body) = rest
            .split_at_checked(header_len)
            .ok_or_else(|| FlakesError::SerializationError("Data too short for header".to_string()))?;

        let header: SaveHeader = postcard::from_bytes(header_bytes)
            .map_err(|e| FlakesError::SerializationError(format!("Header: {}", e)))?;
        header.validate()?;

        if body.len() as u64 != header.body_len {
            return Err(FlakesError::SerializationError(format!(
                "Body length mismatch: header declares {}, found {}",
                header.body_len,
                body.len()
            )));
        }
        let computed = Flake::checksum(body);
        if computed != header.checksum {
            return Err(FlakesError::SerializationError(format!(
                "Checksum mismatch: expected {}, got {}",
                header.checksum, computed
            )));
        }
        Ok((header, body))
    }

    /// Parse a save-game file.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FlakesError> {
        let (header, body) = Self::read_header(data)?;
        Ok(Self {
            provider: header.provider,
            compressed: header.compressed,
            flake: Flake::from_bytes(body)?,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ReadOptions;
    use crate::reflect::{FieldType, TypeInfo, TypeRegistry};
    use crate::value::Value;
    use crate::world::World;
    use std::sync::Arc;

    const HERO: &str = "/Script/Test.Hero";
    const STATS: &str = "/Script/Test.Stats";

    fn world() -> World {
        let mut types = TypeRegistry::new();
        types.register(TypeInfo::class(HERO).field("Level", FieldType::Int)).expect("hero");
        types
            .register(TypeInfo::structure(STATS).field("Hp", FieldType::Float))
            .expect("stats");
        World::new(Arc::new(types))
    }

    #[test]
    fn header_validation() {
        let header = SaveHeader::new("Binary", true, b"body");
        assert!(header.validate().is_ok());

        let mut bad = header.clone();
        bad.magic = *b"XXXX";
        assert!(bad.validate().is_err());

        let mut bad = header;
        bad.version = 99;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn saved_object_loads_with_recorded_provider() {
        let mut world = world();
        let hero = world.new_object(&HERO.into(), world.transient_package()).expect("hero");
        world.set_field(hero, "Level", Value::Int(12)).expect("level");

        let writer = Flakes::default().with_provider("NetBinary");
        let mut save = SaveGame::default();
        save.set_object_to_save(&writer, &world, hero).expect("save");
        let bytes = save.to_bytes().expect("bytes");

        let parsed = SaveGame::from_bytes(&bytes).expect("parse");
        assert_eq!(parsed, save);
        assert_eq!(parsed.provider, "NetBinary");

        // The reader's default provider differs; the file's provider wins.
        let reader = Flakes::default();
        let copy = parsed.load_object(&reader, &mut world, None).expect("load");
        assert_ne!(copy, hero);
        assert_eq!(world.field(copy, "Level"), Some(&Value::Int(12)));
    }

    #[test]
    fn uncompressed_save_is_flagged() {
        let mut world = world();
        let flakes = Flakes::default().with_read_options(ReadOptions::uncompressed());
        let mut save = SaveGame::default();
        let stats = StructValue::new(STATS).with("Hp", Value::Float(77.5));
        save.set_struct_to_save(&flakes, &world, &stats, None).expect("save");
        assert!(!save.compressed);

        let parsed = SaveGame::from_bytes(&save.to_bytes().expect("bytes")).expect("parse");
        let loaded = parsed.load_struct(&Flakes::default(), &mut world, None).expect("load");
        assert_eq!(loaded, stats);
    }

    #[test]
    fn checked_load_rejects_unrelated_type() {
        let mut world = world();
        let hero = world.new_object(&HERO.into(), world.transient_package()).expect("hero");
        let flakes = Flakes::default();
        let mut save = SaveGame::default();
        save.set_object_to_save(&flakes, &world, hero).expect("save");

        let result = save.load_object_checked(&flakes, &mut world, &"/Script/Core.Package".into(), None);
        assert!(matches!(result, Err(FlakesError::TypeMismatch { .. })));
    }

    #[test]
    fn corrupted_body_fails_checksum() {
        let mut world = world();
        let hero = world.new_object(&HERO.into(), world.transient_package()).expect("hero");
        let mut save = SaveGame::default();
        save.set_object_to_save(&Flakes::default(), &world, hero).expect("save");
        let mut bytes = save.to_bytes().expect("bytes");

        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = SaveGame::from_bytes(&bytes).expect_err("checksum");
        assert!(err.to_string().contains("Checksum"));
    }

    #[test]
    fn short_input_is_rejected() {
        assert!(SaveGame::from_bytes(&[]).is_err());
        assert!(SaveGame::from_bytes(&[200, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn empty_save_has_no_type_to_load() {
        let mut world = world();
        let save = SaveGame::default();
        assert!(matches!(
            save.load_object(&Flakes::default(), &mut world, None),
            Err(FlakesError::MissingType)
        ));
    }
}
