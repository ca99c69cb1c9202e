//! # Field Values
//!
//! Runtime values held in object and struct fields.
//!
//! A `Value` is always interpreted against the `FieldType` declared for its
//! field in the type registry; the walkers reject combinations that do not
//! match.

use crate::types::{ObjectId, ObjectPath, TypePath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Field name → value, iterated in name order.
///
/// Wire order comes from the type's declared field list, not from this map.
pub type FieldMap = BTreeMap<String, Value>;

// =============================================================================
// MATH VALUE TYPES
// =============================================================================

/// A 3-component double precision vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A linear RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

// =============================================================================
// STRUCT VALUE
// =============================================================================

/// An instance of a registered struct type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructValue {
    /// Exact struct type of this value.
    pub type_path: TypePath,
    /// Field values. Missing fields read as the type default.
    pub fields: FieldMap,
}

impl StructValue {
    /// Create an empty value of the given struct type.
    #[must_use]
    pub fn new(type_path: impl Into<TypePath>) -> Self {
        Self {
            type_path: type_path.into(),
            fields: FieldMap::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Get a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, name: &str, value: Value) -> Option<Value> {
        self.fields.insert(name.to_string(), value)
    }
}

// =============================================================================
// VALUE
// =============================================================================

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vector(Vector),
    Color(Color),
    Guid(Uuid),
    /// Struct stored inline; its type is fixed by the field declaration.
    Struct(StructValue),
    /// Polymorphic struct: any subtype of the declared base, or nothing.
    Instanced(Option<StructValue>),
    /// Hard reference to an object in the same store.
    Object(Option<ObjectId>),
    /// Soft reference by path; never followed by the walkers.
    SoftObject(Option<ObjectPath>),
    Array(Vec<Value>),
}

impl Value {
    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Vector(_) => "vector",
            Self::Color(_) => "color",
            Self::Guid(_) => "guid",
            Self::Struct(_) => "struct",
            Self::Instanced(_) => "instanced struct",
            Self::Object(_) => "object",
            Self::SoftObject(_) => "soft object",
            Self::Array(_) => "array",
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vector(&self) -> Option<Vector> {
        match self {
            Self::Vector(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Self::Struct(s) => Some(s),
            Self::Instanced(s) => s.as_ref(),
            _ => None,
        }
    }

    /// The referenced object, if this is a set object reference.
    #[must_use]
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => *id,
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Every object handle reachable through this value without crossing into
    /// another object, in field-name order.
    pub fn object_refs(&self, out: &mut Vec<ObjectId>) {
        match self {
            Self::Object(Some(id)) => out.push(*id),
            Self::Struct(s) | Self::Instanced(Some(s)) => {
                for value in s.fields.values() {
                    value.object_refs(out);
                }
            }
            Self::Array(items) => {
                for item in items {
                    item.object_refs(out);
                }
            }
            _ => {}
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
