//! # Engine Primitives
//!
//! Fixed constants shared by the walkers, codecs and file formats.
//!
//! These values are part of the wire contract: changing any marker, key or
//! magic value breaks every artifact written before the change.

// =============================================================================
// FILE FORMAT
// =============================================================================

/// Magic bytes for the save-game file header.
///
/// - File Header = Magic Bytes ("FLKS") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"FLKS";

/// Current save-game format version.
///
/// Increment this when making breaking changes to the save layout.
pub const FORMAT_VERSION: u8 = 1;

/// Provider used when the caller does not name one.
pub const DEFAULT_PROVIDER: &str = "Binary";

// =============================================================================
// BUILT-IN TYPE PATHS
// =============================================================================

/// Root of every class hierarchy.
pub const OBJECT_CLASS: &str = "/Script/Core.Object";

/// Class of top-level containers (objects without an outer).
pub const PACKAGE_CLASS: &str = "/Script/Core.Package";

/// Class of live runtime scopes. Objects beneath one are transient.
pub const LIVE_SCOPE_CLASS: &str = "/Script/Core.World";

/// Name of the package that receives objects created without an explicit outer.
pub const TRANSIENT_PACKAGE: &str = "Transient";

// =============================================================================
// TEXT CODEC KEYS
// =============================================================================

/// Key carrying the concrete class of an owned sub-object in the text codec.
pub const CLASS_NAME_KEY: &str = "_ClassName";

/// Key carrying the concrete struct type of an instanced struct in the text codec.
pub const STRUCT_NAME_KEY: &str = "_StructName";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of any string read from a payload (16 MB).
///
/// Prevents a corrupt length prefix from triggering a huge allocation.
pub const MAX_STRING_LENGTH: usize = 16 * 1024 * 1024;

/// Maximum element count of a single array read from a payload.
pub const MAX_ARRAY_LENGTH: usize = 1_000_000;

/// Maximum nesting of owned sub-objects and structs during one pass.
///
/// A real ownership tree is far shallower; deeper input is rejected as corrupt.
pub const MAX_GRAPH_DEPTH: usize = 256;

/// Maximum size of a decompressed payload (256 MB).
pub const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

/// Maximum size of a save-game file accepted by `SaveGame::from_bytes` (512 MB).
pub const MAX_SAVE_SIZE: usize = 512 * 1024 * 1024;

// =============================================================================
// TESTS
// =============================================================================
