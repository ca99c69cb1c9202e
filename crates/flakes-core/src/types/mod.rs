//! # Core Type Definitions
//!
//! Identifiers and the error type shared by every module of the engine:
//! - Object handles and paths (`ObjectId`, `ObjectPath`)
//! - Type descriptors by name (`TypePath`)
//! - Error types (`FlakesError`)
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! and keep iteration order stable across runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// OBJECT IDENTIFIERS
// =============================================================================

/// Handle of a live object inside an object store.
///
/// Handles are never reused within a store, so a stale handle cannot alias
/// a newer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Dotted path of an object from its root package, e.g. `Transient.Sword_0`.
///
/// This is the soft reference form written for objects that are not owned
/// by the graph being serialized.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ObjectPath(pub String);

impl ObjectPath {
    /// Create a path from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the object names from the root down.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// TYPE IDENTIFIERS
// =============================================================================

/// Fully qualified name of a class or struct type, e.g. `/Script/Game.Sword`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TypePath(pub String);

impl TypePath {
    /// Create a type path from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the type path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the path is unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The short name after the last `.` or `/`, used to name new objects.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0
            .rsplit(['.', '/'])
            .find(|s| !s.is_empty())
            .unwrap_or("Object")
    }
}

impl fmt::Display for TypePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypePath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TypePath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&TypePath> for TypePath {
    fn from(p: &TypePath) -> Self {
        p.clone()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while building or consuming flakes.
///
/// - No silent failures
/// - Use `Result<T, FlakesError>` for fallible operations
/// - The engine never panics on bad input; every error is recoverable
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlakesError {
    /// No codec provider is registered under the requested name.
    #[error("Unknown serialization provider: {0}")]
    UnknownProvider(String),

    /// A type path could not be resolved against the type registry.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// The artifact's type is neither the expected type nor a subtype of it.
    #[error("Type mismatch: found {found}, expected {expected}")]
    TypeMismatch {
        /// Type declared by the data.
        found: String,
        /// Type required by the caller.
        expected: String,
    },

    /// A type was used in the wrong role (a struct where a class is required, etc.).
    #[error("Invalid type kind for {0}")]
    InvalidKind(String),

    /// A type path was registered twice.
    #[error("Type already registered: {0}")]
    DuplicateType(String),

    /// The flake carries no type descriptor.
    #[error("Flake has no type descriptor")]
    MissingType,

    /// The requested object does not exist in the store.
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// The payload ended before the walker finished reading.
    #[error("Payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the next read required.
        needed: usize,
        /// Bytes left in the payload.
        remaining: usize,
    },

    /// The payload is structurally invalid for the declared type.
    #[error("Invalid payload: {0}")]
    Format(String),

    /// Compressing a payload failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Decompressing a payload failed.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_strips_package() {
        assert_eq!(TypePath::new("/Script/Game.Sword").short_name(), "Sword");
        assert_eq!(TypePath::new("/Script/Core").short_name(), "Core");
        assert_eq!(TypePath::new("Plain").short_name(), "Plain");
    }

    #[test]
    fn short_name_of_empty_path_falls_back() {
        assert_eq!(TypePath::default().short_name(), "Object");
    }

    #[test]
    fn object_path_segments_skip_empty_parts() {
        let path = ObjectPath::new("Transient..Sword_0.");
        let segments: Vec<_> = path.segments().collect();
        assert_eq!(segments, vec!["Transient", "Sword_0"]);
    }

    #[test]
    fn type_mismatch_message_names_both_types() {
        let err = FlakesError::TypeMismatch {
            found: "A".to_string(),
            expected: "B".to_string(),
        };
        assert_eq!(err.to_string(), "Type mismatch: found A, expected B");
    }
}
