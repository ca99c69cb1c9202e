//! Binary graph walker.
//!
//! Walks fields in declared order through an `ArchiveWriter`/`ArchiveReader`.
//! Payload layout per field type:
//!
//! ```text
//! bool                 u8 (0 | 1)
//! int                  archive i64
//! float                archive f64
//! string               len + UTF-8
//! vector               f64 x3
//! color                f32 x4
//! guid                 16 raw bytes
//! struct               fields of the declared struct, inline
//! instanced struct     u8 0 | u8 1 + type path + fields
//! object               marker [+ class path + fields | + object path]
//! soft object          string (empty = none)
//! array                len + elements
//! ```

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::ownership::{OwnershipPolicy, OwnershipTracker, RefMarker};
use crate::primitives::{MAX_ARRAY_LENGTH, MAX_GRAPH_DEPTH};
use crate::reflect::{FieldType, TypeKind, TypeRegistry};
use crate::types::{FlakesError, ObjectId, ObjectPath, TypePath};
use crate::value::{Color, FieldMap, StructValue, Value, Vector};
use crate::world::ObjectStore;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

// =============================================================================
// WRITER
// =============================================================================

/// Serializes a value and its owned sub-graph into an archive.
pub struct BinaryWriter<'s, A: ArchiveWriter> {
    store: &'s dyn ObjectStore,
    types: Arc<TypeRegistry>,
    tracker: OwnershipTracker,
    archive: A,
    depth: usize,
}

impl<'s, A: ArchiveWriter> BinaryWriter<'s, A> {
    /// Start a pass whose ownership stack is seeded with `owner`.
    pub fn new(
        store: &'s dyn ObjectStore,
        archive: A,
        owner: Option<ObjectId>,
        policy: OwnershipPolicy,
    ) -> Self {
        Self {
            types: store.types(),
            store,
            tracker: OwnershipTracker::new(owner, policy),
            archive,
            depth: 0,
        }
    }

    /// Write every field of `type_path`, taking values from `fields`.
    /// Missing entries are written as the field's default.
    pub fn write_fields(&mut self, type_path: &TypePath, fields: &FieldMap) -> Result<(), FlakesError> {
        self.depth += 1;
        if self.depth > MAX_GRAPH_DEPTH {
            return Err(FlakesError::Format(format!(
                "value nesting exceeds {} levels",
                MAX_GRAPH_DEPTH
            )));
        }

        let types = Arc::clone(&self.types);
        let info = types.resolve(type_path)?;
        for def in &info.fields {
            match fields.get(&def.name) {
                Some(value) => self.write_value(&def.ty, value).inspect_err(|_| {
                    debug!(type_path = %type_path, field = %def.name, "field write failed");
                })?,
                None => self.write_value(&def.ty, &def.ty.default_value(&types))?,
            }
        }

        self.depth -= 1;
        Ok(())
    }

    fn write_value(&mut self, ty: &FieldType, value: &Value) -> Result<(), FlakesError> {
        match (ty, value) {
            (FieldType::Bool, Value::Bool(b)) => self.archive.write_bool(*b),
            (FieldType::Int, Value::Int(i)) => self.archive.write_i64(*i),
            (FieldType::Float, Value::Float(f)) => self.archive.write_f64(*f),
            (FieldType::Str, Value::Str(s)) => self.archive.write_str(s),
            (FieldType::Vector, Value::Vector(v)) => {
                self.archive.write_f64(v.x)?;
                self.archive.write_f64(v.y)?;
                self.archive.write_f64(v.z)
            }
            (FieldType::Color, Value::Color(c)) => {
                self.archive.write_f32(c.r)?;
                self.archive.write_f32(c.g)?;
                self.archive.write_f32(c.b)?;
                self.archive.write_f32(c.a)
            }
            (FieldType::Guid, Value::Guid(g)) => self.archive.write_raw(g.as_bytes()),
            (FieldType::Struct(path), Value::Struct(s)) => self.write_fields(path, &s.fields),
            (FieldType::InstancedStruct(_), Value::Instanced(None)) => self.archive.write_u8(0),
            (FieldType::InstancedStruct(base), Value::Instanced(Some(s))) => {
                if !self.types.is_child_of(&s.type_path, base) {
                    return Err(FlakesError::TypeMismatch {
                        found: s.type_path.to_string(),
                        expected: base.to_string(),
                    });
                }
                self.archive.write_u8(1)?;
                self.archive.write_str(s.type_path.as_str())?;
                self.write_fields(&s.type_path, &s.fields)
            }
            (FieldType::Object(_), Value::Object(target)) => self.write_object_ref(*target),
            (FieldType::SoftObject, Value::SoftObject(path)) => self
                .archive
                .write_str(path.as_ref().map(ObjectPath::as_str).unwrap_or_default()),
            (FieldType::Array(inner), Value::Array(items)) => {
                self.archive.write_len(items.len())?;
                for item in items {
                    self.write_value(inner, item)?;
                }
                Ok(())
            }
            (ty, value) => Err(FlakesError::Format(format!(
                "field of type {:?} cannot hold a {}",
                ty,
                value.kind_name()
            ))),
        }
    }

    fn write_object_ref(&mut self, target: Option<ObjectId>) -> Result<(), FlakesError> {
        let Some(id) = target else {
            return self.archive.write_u8(RefMarker::NoReference as u8);
        };
        if !self.store.contains(id) {
            warn!(object = %id, "dangling object reference written as null");
            return self.archive.write_u8(RefMarker::NoReference as u8);
        }

        let store = self.store;
        let marker = self.tracker.classify(store, id);
        self.archive.write_u8(marker as u8)?;
        match marker {
            RefMarker::Owned => {
                let class = store.class_of(id)?;
                self.archive.write_str(class.as_str())?;
                self.tracker.enter(id)?;
                self.write_fields(&class, store.fields(id)?)?;
                self.tracker.leave();
                Ok(())
            }
            RefMarker::External => {
                let path = store.path_of(id)?;
                self.archive.write_str(path.as_str())
            }
            RefMarker::NoReference => Ok(()),
        }
    }

    /// Number of sub-objects inlined so far.
    pub fn owned_count(&self) -> usize {
        self.tracker.exported_count()
    }

    pub fn finish(self) -> Vec<u8> {
        self.archive.into_bytes()
    }
}

// =============================================================================
// READER
// =============================================================================

/// Populates values from an archive, constructing owned sub-objects.
pub struct BinaryReader<'s, R: ArchiveReader> {
    store: &'s mut dyn ObjectStore,
    types: Arc<TypeRegistry>,
    tracker: OwnershipTracker,
    archive: R,
    depth: usize,
}

impl<'s, R: ArchiveReader> BinaryReader<'s, R> {
    /// Start a pass; new sub-objects are parented to `owner` (or the
    /// transient package when there is none).
    pub fn new(store: &'s mut dyn ObjectStore, archive: R, owner: Option<ObjectId>) -> Self {
        Self {
            types: store.types(),
            store,
            tracker: OwnershipTracker::new(owner, OwnershipPolicy::default()),
            archive,
            depth: 0,
        }
    }

    /// Read every field of `type_path` into `fields`.
    pub fn read_fields(&mut self, type_path: &TypePath, fields: &mut FieldMap) -> Result<(), FlakesError> {
        self.depth += 1;
        if self.depth > MAX_GRAPH_DEPTH {
            return Err(FlakesError::Format(format!(
                "value nesting exceeds {} levels",
                MAX_GRAPH_DEPTH
            )));
        }

        let types = Arc::clone(&self.types);
        let info = types.resolve(type_path)?;
        for def in &info.fields {
            let value = self.read_value(&def.ty)?;
            fields.insert(def.name.clone(), value);
        }

        self.depth -= 1;
        Ok(())
    }

    fn read_value(&mut self, ty: &FieldType) -> Result<Value, FlakesError> {
        Ok(match ty {
            FieldType::Bool => Value::Bool(self.archive.read_bool()?),
            FieldType::Int => Value::Int(self.archive.read_i64()?),
            FieldType::Float => Value::Float(self.archive.read_f64()?),
            FieldType::Str => Value::Str(self.archive.read_str()?),
            FieldType::Vector => Value::Vector(Vector {
                x: self.archive.read_f64()?,
                y: self.archive.read_f64()?,
                z: self.archive.read_f64()?,
            }),
            FieldType::Color => Value::Color(Color {
                r: self.archive.read_f32()?,
                g: self.archive.read_f32()?,
                b: self.archive.read_f32()?,
                a: self.archive.read_f32()?,
            }),
            FieldType::Guid => {
                let bytes = self.archive.read_raw(16)?;
                Value::Guid(Uuid::from_slice(bytes).map_err(|e| FlakesError::Format(e.to_string()))?)
            }
            FieldType::Struct(path) => {
                let mut value = StructValue::new(path);
                self.read_fields(path, &mut value.fields)?;
                Value::Struct(value)
            }
            FieldType::InstancedStruct(base) => match self.archive.read_u8()? {
                0 => Value::Instanced(None),
                1 => {
                    let path = TypePath::new(self.archive.read_str()?);
                    self.types.resolve_kind(&path, TypeKind::Struct)?;
                    if !self.types.is_child_of(&path, base) {
                        return Err(FlakesError::TypeMismatch {
                            found: path.to_string(),
                            expected: base.to_string(),
                        });
                    }
                    let mut value = StructValue::new(&path);
                    self.read_fields(&path, &mut value.fields)?;
                    Value::Instanced(Some(value))
                }
                other => {
                    return Err(FlakesError::Format(format!(
                        "invalid instanced struct tag {}",
                        other
                    )));
                }
            },
            FieldType::Object(declared) => Value::Object(self.read_object_ref(declared)?),
            FieldType::SoftObject => {
                let path = self.archive.read_str()?;
                Value::SoftObject((!path.is_empty()).then(|| ObjectPath::new(path)))
            }
            FieldType::Array(inner) => {
                let len = self.archive.read_len()?;
                if len > MAX_ARRAY_LENGTH {
                    return Err(FlakesError::Format(format!(
                        "array length {} exceeds maximum {}",
                        len, MAX_ARRAY_LENGTH
                    )));
                }
                let mut items = Vec::with_capacity(len.min(self.archive.remaining()));
                for _ in 0..len {
                    items.push(self.read_value(inner)?);
                }
                Value::Array(items)
            }
        })
    }

    fn read_object_ref(&mut self, declared: &TypePath) -> Result<Option<ObjectId>, FlakesError> {
        match RefMarker::try_from(self.archive.read_u8()?)? {
            RefMarker::NoReference => Ok(None),
            RefMarker::Owned => {
                let class = TypePath::new(self.archive.read_str()?);
                if let Err(e) = self.types.resolve_kind(&class, TypeKind::Class) {
                    error!(class = %class, "cannot construct owned sub-object: {}", e);
                    return Err(e);
                }
                if !self.types.is_child_of(&class, declared) {
                    return Err(FlakesError::TypeMismatch {
                        found: class.to_string(),
                        expected: declared.to_string(),
                    });
                }

                let outer = self
                    .tracker
                    .current_owner()
                    .unwrap_or_else(|| self.store.transient_package());
                let id = self.store.new_object(&class, outer)?;
                self.tracker.enter(id)?;
                let mut fields = self.store.fields(id)?.clone();
                self.read_fields(&class, &mut fields)?;
                self.store.set_fields(id, fields)?;
                self.tracker.leave();
                Ok(Some(id))
            }
            RefMarker::External => {
                let path = ObjectPath::new(self.archive.read_str()?);
                let resolved = self.store.resolve_path(&path);
                if resolved.is_none() {
                    debug!(path = %path, "external reference did not resolve; leaving null");
                }
                Ok(resolved)
            }
        }
    }

    /// Fail unless the whole payload was consumed.
    pub fn finish(self) -> Result<(), FlakesError> {
        match self.archive.remaining() {
            0 => Ok(()),
            n => Err(FlakesError::Format(format!("{} trailing bytes after payload", n))),
        }
    }
}
