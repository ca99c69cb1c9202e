//! # Type Registry
//!
//! The reflection capability the walkers rely on: for every registered class
//! or struct, an ordered field list, an optional parent type and an optional
//! post-load hook.
//!
//! ## Field Order
//!
//! Registration flattens inheritance. A derived type's field list is its
//! parent's fields followed by its own, and the binary codecs write fields in
//! exactly this order.
//!
//! ## Registration Order
//!
//! Parents and inline struct field types must be registered before the types
//! that use them, and a path can be registered only once. Together these rule
//! out parent cycles and a struct that contains itself by value.
//! Object-reference fields and instanced-struct bases may name types that
//! are registered later.

use crate::primitives::{CLASS_NAME_KEY, LIVE_SCOPE_CLASS, OBJECT_CLASS, PACKAGE_CLASS, STRUCT_NAME_KEY};
use crate::types::{FlakesError, ObjectId, TypePath};
use crate::value::{Color, FieldMap, StructValue, Value, Vector};
use crate::world::ObjectStore;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Hook run on a freshly reconstructed object once its whole graph is populated.
pub type ObjectHook = fn(&mut dyn ObjectStore, ObjectId);

/// Hook run on a freshly reconstructed struct value.
pub type StructHook = fn(&mut StructValue);

// =============================================================================
// FIELD TYPES
// =============================================================================

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Str,
    Vector,
    Color,
    Guid,
    /// A struct stored inline, always of exactly this type.
    Struct(TypePath),
    /// A struct of this type or any subtype, or nothing.
    InstancedStruct(TypePath),
    /// A hard reference to an object of this class or a subclass.
    Object(TypePath),
    /// A path reference that is never followed.
    SoftObject,
    Array(Box<FieldType>),
}

impl FieldType {
    /// Shorthand for `FieldType::Struct`.
    #[must_use]
    pub fn structure(path: &str) -> Self {
        Self::Struct(TypePath::new(path))
    }

    /// Shorthand for `FieldType::Object`.
    #[must_use]
    pub fn object(class: &str) -> Self {
        Self::Object(TypePath::new(class))
    }

    /// Shorthand for `FieldType::Array`.
    #[must_use]
    pub fn array(inner: FieldType) -> Self {
        Self::Array(Box::new(inner))
    }

    /// The value a field of this type holds before anything is assigned.
    ///
    /// Unknown inline struct types default to an empty struct value.
    pub fn default_value(&self, types: &TypeRegistry) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Str => Value::Str(String::new()),
            Self::Vector => Value::Vector(Vector::default()),
            Self::Color => Value::Color(Color::default()),
            Self::Guid => Value::Guid(Uuid::nil()),
            Self::Struct(path) => Value::Struct(
                types
                    .default_struct(path)
                    .unwrap_or_else(|_| StructValue::new(path)),
            ),
            Self::InstancedStruct(_) => Value::Instanced(None),
            Self::Object(_) => Value::Object(None),
            Self::SoftObject => Value::SoftObject(None),
            Self::Array(_) => Value::Array(Vec::new()),
        }
    }
}

/// A named field of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
}

// =============================================================================
// TYPE DESCRIPTORS
// =============================================================================

/// Whether a type describes heap objects or inline values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Struct,
}

/// Descriptor of a registered type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub path: TypePath,
    pub kind: TypeKind,
    pub parent: Option<TypePath>,
    /// Flattened field list (inherited fields first) once registered.
    pub fields: Vec<FieldDef>,
    pub object_hook: Option<ObjectHook>,
    pub struct_hook: Option<StructHook>,
}

impl TypeInfo {
    /// Start describing a class. Classes derive from the root object class
    /// unless `parent` says otherwise.
    #[must_use]
    pub fn class(path: &str) -> Self {
        Self {
            path: TypePath::new(path),
            kind: TypeKind::Class,
            parent: (path != OBJECT_CLASS).then(|| TypePath::new(OBJECT_CLASS)),
            fields: Vec::new(),
            object_hook: None,
            struct_hook: None,
        }
    }

    /// Start describing a struct.
    #[must_use]
    pub fn structure(path: &str) -> Self {
        Self {
            path: TypePath::new(path),
            kind: TypeKind::Struct,
            parent: None,
            fields: Vec::new(),
            object_hook: None,
            struct_hook: None,
        }
    }

    #[must_use]
    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(TypePath::new(parent));
        self
    }

    #[must_use]
    pub fn field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty,
        });
        self
    }

    #[must_use]
    pub fn on_post_load(mut self, hook: ObjectHook) -> Self {
        self.object_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn on_struct_post_load(mut self, hook: StructHook) -> Self {
        self.struct_hook = Some(hook);
        self
    }

    /// Look up a field declaration by name.
    #[must_use]
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// =============================================================================
// TYPE REGISTRY
// =============================================================================

/// Name → descriptor map for every class and struct the engine can rebuild.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<TypePath, TypeInfo>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Create a registry holding only the built-in classes
    /// (object root, package, live scope).
    #[must_use]
    pub fn new() -> Self {
        let mut types = BTreeMap::new();
        for info in [
            TypeInfo::class(OBJECT_CLASS),
            TypeInfo::class(PACKAGE_CLASS),
            TypeInfo::class(LIVE_SCOPE_CLASS),
        ] {
            types.insert(info.path.clone(), info);
        }
        Self { types }
    }

    /// Register a new type.
    ///
    /// # Errors
    ///
    /// - `DuplicateType` if the path is already registered
    /// - `UnknownType` if the parent or an inline struct field type is not registered
    /// - `InvalidKind` if the parent has a different kind, or an inline field names a class
    /// - `Format` if a field name repeats one already declared (own or inherited)
    ///   or is one of the reserved JSON keys
    pub fn register(&mut self, mut info: TypeInfo) -> Result<(), FlakesError> {
        if self.types.contains_key(&info.path) {
            return Err(FlakesError::DuplicateType(info.path.to_string()));
        }

        let mut fields = match &info.parent {
            Some(parent) => {
                let parent_info = self.resolve(parent)?;
                if parent_info.kind != info.kind {
                    return Err(FlakesError::InvalidKind(parent.to_string()));
                }
                parent_info.fields.clone()
            }
            None => Vec::new(),
        };

        for def in &info.fields {
            self.check_inline(&def.ty)?;
            if def.name == CLASS_NAME_KEY || def.name == STRUCT_NAME_KEY {
                return Err(FlakesError::Format(format!(
                    "field name '{}' on {} is reserved",
                    def.name, info.path
                )));
            }
            if fields.iter().any(|f| f.name == def.name) {
                return Err(FlakesError::Format(format!(
                    "duplicate field '{}' on {}",
                    def.name, info.path
                )));
            }
            fields.push(def.clone());
        }

        info.fields = fields;
        tracing::trace!(type_path = %info.path, fields = info.fields.len(), "registered type");
        self.types.insert(info.path.clone(), info);
        Ok(())
    }

    fn check_inline(&self, ty: &FieldType) -> Result<(), FlakesError> {
        match ty {
            FieldType::Struct(path) => match self.resolve(path)?.kind {
                TypeKind::Struct => Ok(()),
                TypeKind::Class => Err(FlakesError::InvalidKind(path.to_string())),
            },
            FieldType::Array(inner) => self.check_inline(inner),
            _ => Ok(()),
        }
    }

    /// Get a descriptor if registered.
    #[must_use]
    pub fn get(&self, path: &TypePath) -> Option<&TypeInfo> {
        self.types.get(path)
    }

    /// Get a descriptor or fail with `UnknownType`.
    pub fn resolve(&self, path: &TypePath) -> Result<&TypeInfo, FlakesError> {
        self.types
            .get(path)
            .ok_or_else(|| FlakesError::UnknownType(path.to_string()))
    }

    /// Get a descriptor that must be of the given kind.
    pub fn resolve_kind(&self, path: &TypePath, kind: TypeKind) -> Result<&TypeInfo, FlakesError> {
        let info = self.resolve(path)?;
        if info.kind != kind {
            return Err(FlakesError::InvalidKind(path.to_string()));
        }
        Ok(info)
    }

    /// Check whether `child` is `ancestor` or derives from it.
    ///
    /// Unregistered types are never children of anything.
    #[must_use]
    pub fn is_child_of(&self, child: &TypePath, ancestor: &TypePath) -> bool {
        let mut current = self.types.get(child);
        while let Some(info) = current {
            if &info.path == ancestor {
                return true;
            }
            current = info.parent.as_ref().and_then(|p| self.types.get(p));
        }
        false
    }

    /// Default value of every field of a type.
    pub fn default_fields(&self, path: &TypePath) -> Result<FieldMap, FlakesError> {
        let info = self.resolve(path)?;
        Ok(info
            .fields
            .iter()
            .map(|def| (def.name.clone(), def.ty.default_value(self)))
            .collect())
    }

    /// A struct value of the given type with every field at its default.
    pub fn default_struct(&self, path: &TypePath) -> Result<StructValue, FlakesError> {
        self.resolve_kind(path, TypeKind::Struct)?;
        Ok(StructValue {
            type_path: path.clone(),
            fields: self.default_fields(path)?,
        })
    }

    /// Nearest object hook along the class chain.
    #[must_use]
    pub fn object_hook_for(&self, path: &TypePath) -> Option<ObjectHook> {
        let mut current = self.types.get(path);
        while let Some(info) = current {
            if info.object_hook.is_some() {
                return info.object_hook;
            }
            current = info.parent.as_ref().and_then(|p| self.types.get(p));
        }
        None
    }

    /// Nearest struct hook along the struct chain.
    #[must_use]
    pub fn struct_hook_for(&self, path: &TypePath) -> Option<StructHook> {
        let mut current = self.types.get(path);
        while let Some(info) = current {
            if info.struct_hook.is_some() {
                return info.struct_hook;
            }
            current = info.parent.as_ref().and_then(|p| self.types.get(p));
        }
        None
    }

    /// Number of registered types, built-ins included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All registered type paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &TypePath> {
        self.types.keys()
    }
}

// =============================================================================
// TESTS
// =============================================================================
