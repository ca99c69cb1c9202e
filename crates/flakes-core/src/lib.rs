//! # flakes-core
//!
//! The graph serialization engine for Flakes.
//!
//! A live object graph (objects owning sub-objects in a tree, plus
//! non-owning cross references) is captured as a self-describing `Flake`:
//! the exact type of the root plus a codec payload. Reconstructing a flake
//! yields an independent, equivalent graph: owned sub-objects are copied,
//! external references point at the same objects as before.
//!
//! ## Layers
//!
//! - `reflect` / `world`: type descriptors and the in-memory object arena
//! - `ownership`: the per-pass owned/external classifier
//! - `walker`: binary and JSON graph walkers
//! - `provider`: named codecs (`Binary`, `NetBinary`, `Json`, `PrettyJson`)
//! - `compression` / `flake` / `interface`: the artifact envelope and
//!   reconstruction protocol
//! - `formats`: the save-game file
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network, no file I/O
//! - No global state: the provider registry and ownership stack are values
//! - Deterministic: stable field order on the wire, BTreeMap-backed arena

// =============================================================================
// MODULES
// =============================================================================

pub mod archive;
pub mod compare;
pub mod compression;
pub mod flake;
pub mod formats;
pub mod harness;
pub mod interface;
pub mod ownership;
pub mod primitives;
pub mod provider;
pub mod reflect;
pub mod types;
pub mod value;
pub mod walker;
pub mod world;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{FlakesError, ObjectId, ObjectPath, TypePath};
pub use value::{Color, FieldMap, StructValue, Value, Vector};

// =============================================================================
// RE-EXPORTS: Reflection & World
// =============================================================================

pub use ownership::{OwnershipPolicy, OwnershipTracker, RefMarker};
pub use reflect::{FieldDef, FieldType, ObjectHook, StructHook, TypeInfo, TypeKind, TypeRegistry};
pub use world::{ObjectRecord, ObjectStore, World};

// =============================================================================
// RE-EXPORTS: Providers & Envelope
// =============================================================================

pub use compression::{CompressionLevel, CompressionOptions, Compressor, compress, decompress};
#[cfg(feature = "crypto-hash")]
pub use flake::compute_blake3_hash;
pub use flake::Flake;
pub use interface::{
    Flakes, ReadOptions, WriteOptions, create_object, create_struct, make_object_flake,
    make_struct_flake, post_load_tree, verify_type, write_object, write_struct,
};
pub use provider::{
    BinaryProvider, JsonProvider, NetBinaryProvider, PrettyJsonProvider, ProviderRegistry,
    SerializationProvider,
};

// =============================================================================
// RE-EXPORTS: Formats & Verification
// =============================================================================

pub use compare::{Mismatch, compare_objects, compare_structs};
pub use formats::{SaveGame, SaveHeader};
pub use harness::{HarnessOptions, HarnessReport, RunMode};
