//! # Flake Interface
//!
//! Building flakes from live values and rebuilding values from flakes.
//!
//! ## Construction
//!
//! ```text
//! source ──provider.read──▶ raw ──compress──▶ Flake { type_path, data }
//! ```
//!
//! ## Reconstruction
//!
//! ```text
//! Flake ──verify type──▶ allocate ──decompress──▶ provider.write ──▶ post-load hooks
//! ```
//!
//! The type check runs before anything is allocated. If any later step fails
//! the freshly allocated root and every sub-object beneath it are destroyed,
//! so callers never see a half-populated instance.

use crate::compression::{self, CompressionOptions};
use crate::flake::Flake;
use crate::ownership::OwnershipPolicy;
use crate::primitives::DEFAULT_PROVIDER;
use crate::provider::{ProviderRegistry, SerializationProvider};
use crate::reflect::{TypeKind, TypeRegistry};
use crate::types::{FlakesError, ObjectId, TypePath};
use crate::value::StructValue;
use crate::world::ObjectStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

// =============================================================================
// OPTIONS
// =============================================================================

/// Options for building a flake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub compression: CompressionOptions,
    pub policy: OwnershipPolicy,
}

impl ReadOptions {
    /// Store the payload without compression.
    #[must_use]
    pub fn uncompressed() -> Self {
        Self {
            compression: CompressionOptions::uncompressed(),
            ..Self::default()
        }
    }
}

/// Options for consuming a flake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Run post-load hooks on the rebuilt root and its sub-objects.
    pub post_load: bool,
    /// The payload was stored raw; hand it to the provider as-is.
    pub skip_decompression: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            post_load: true,
            skip_decompression: false,
        }
    }
}

impl WriteOptions {
    /// Options matching a flake built with `ReadOptions`.
    #[must_use]
    pub fn matching(read: &ReadOptions) -> Self {
        Self {
            skip_decompression: read.compression.is_bypass(),
            ..Self::default()
        }
    }
}

// =============================================================================
// TYPE VERIFICATION
// =============================================================================

/// Check that a flake can be rebuilt as `expected`.
///
/// Returns the flake's own (possibly more derived) type on success.
pub fn verify_type(
    types: &TypeRegistry,
    flake: &Flake,
    expected: &TypePath,
) -> Result<TypePath, FlakesError> {
    if types.get(expected).is_none() {
        error!(expected = %expected, "expected type is not registered");
        return Err(FlakesError::UnknownType(expected.to_string()));
    }
    let Some(found) = &flake.type_path else {
        error!(expected = %expected, "flake has no type descriptor");
        return Err(FlakesError::MissingType);
    };
    if types.get(found).is_none() {
        error!(found = %found, "flake type is not registered");
        return Err(FlakesError::UnknownType(found.to_string()));
    }
    if !types.is_child_of(found, expected) {
        error!(found = %found, expected = %expected, "flake type is not a subtype of expected type");
        return Err(FlakesError::TypeMismatch {
            found: found.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(found.clone())
}

fn payload(flake: &Flake, options: &WriteOptions) -> Result<Vec<u8>, FlakesError> {
    if options.skip_decompression {
        Ok(flake.data.clone())
    } else {
        compression::decompress(&flake.data)
    }
}

// =============================================================================
// BUILDING FLAKES
// =============================================================================

/// Snapshot an object and its owned sub-graph.
///
/// A missing source yields the empty flake.
pub fn make_object_flake(
    registry: &ProviderRegistry,
    provider: &str,
    store: &dyn ObjectStore,
    object: Option<ObjectId>,
    options: &ReadOptions,
) -> Result<Flake, FlakesError> {
    let Some(object) = object.filter(|id| store.contains(*id)) else {
        debug!("no source object; producing empty flake");
        return Ok(Flake::default());
    };
    let codec = registry.resolve(provider)?;
    let raw = codec
        .read_object(store, object, options.policy)
        .inspect_err(|e| error!(provider, object = %object, "object serialization failed: {}", e))?;
    let data = compression::compress(&raw, options.compression)?;
    Ok(Flake::new(store.class_of(object)?, data))
}

/// Snapshot a struct value. References inside it are owned when their
/// outer is `owner`.
///
/// A value with no type yields the empty flake.
pub fn make_struct_flake(
    registry: &ProviderRegistry,
    provider: &str,
    store: &dyn ObjectStore,
    value: &StructValue,
    owner: Option<ObjectId>,
    options: &ReadOptions,
) -> Result<Flake, FlakesError> {
    if value.type_path.is_empty() {
        debug!("struct value has no type; producing empty flake");
        return Ok(Flake::default());
    }
    store.types().resolve_kind(&value.type_path, TypeKind::Struct)?;
    let codec = registry.resolve(provider)?;
    let raw = codec
        .read_struct(store, value, owner, options.policy)
        .inspect_err(|e| error!(provider, type_path = %value.type_path, "struct serialization failed: {}", e))?;
    let data = compression::compress(&raw, options.compression)?;
    Ok(Flake::new(value.type_path.clone(), data))
}

// =============================================================================
// CONSUMING FLAKES
// =============================================================================

/// Overwrite an existing object from a flake of exactly its class.
///
/// Owned sub-objects in the flake are created beneath `object`; existing
/// sub-objects are left in place.
pub fn write_object(
    registry: &ProviderRegistry,
    provider: &str,
    store: &mut dyn ObjectStore,
    flake: &Flake,
    object: ObjectId,
    options: &WriteOptions,
) -> Result<(), FlakesError> {
    let class = store.class_of(object)?;
    let found = verify_type(&store.types(), flake, &class)?;
    if found != class {
        error!(found = %found, class = %class, "flake type differs from target class");
        return Err(FlakesError::TypeMismatch {
            found: found.to_string(),
            expected: class.to_string(),
        });
    }
    let codec = registry.resolve(provider)?;
    let raw = payload(flake, options)?;
    codec
        .write_object(store, object, &raw)
        .inspect_err(|e| error!(provider, object = %object, "object deserialization failed: {}", e))?;
    if options.post_load {
        post_load_tree(store, object)?;
    }
    Ok(())
}

/// Overwrite a struct value from a flake of exactly its type.
///
/// A value with no type adopts the flake's type.
pub fn write_struct(
    registry: &ProviderRegistry,
    provider: &str,
    store: &mut dyn ObjectStore,
    flake: &Flake,
    value: &mut StructValue,
    owner: Option<ObjectId>,
    options: &WriteOptions,
) -> Result<(), FlakesError> {
    let types = store.types();
    if value.type_path.is_empty() {
        let found = flake.type_path.clone().ok_or(FlakesError::MissingType)?;
        *value = types.default_struct(&found)?;
    }
    let found = verify_type(&types, flake, &value.type_path)?;
    if found != value.type_path {
        return Err(FlakesError::TypeMismatch {
            found: found.to_string(),
            expected: value.type_path.to_string(),
        });
    }
    let codec = registry.resolve(provider)?;
    let raw = payload(flake, options)?;
    codec
        .write_struct(store, value, &raw, owner)
        .inspect_err(|e| error!(provider, type_path = %found, "struct deserialization failed: {}", e))?;
    if options.post_load
        && let Some(hook) = types.struct_hook_for(&found)
    {
        hook(value);
    }
    Ok(())
}

/// Rebuild a new object from a flake.
///
/// The flake's type must be `expected` or derive from it; the new object has
/// the flake's exact type. It is created under `outer` (default: the
/// transient package).
pub fn create_object(
    registry: &ProviderRegistry,
    provider: &str,
    store: &mut dyn ObjectStore,
    flake: &Flake,
    expected: &TypePath,
    outer: Option<ObjectId>,
    options: &WriteOptions,
) -> Result<ObjectId, FlakesError> {
    let types = store.types();
    let class = verify_type(&types, flake, expected)?;
    types.resolve_kind(&class, TypeKind::Class).inspect_err(|_| {
        error!(class = %class, "flake type is not a class");
    })?;
    let codec = registry.resolve(provider)?;

    let outer = outer.unwrap_or_else(|| store.transient_package());
    let object = store.new_object(&class, outer)?;
    if let Err(e) = populate(codec.as_ref(), store, flake, object, options) {
        error!(provider, class = %class, "reconstruction failed, discarding partial object: {}", e);
        if let Err(cleanup) = store.destroy_object(object) {
            warn!(object = %object, "failed to discard partial object: {}", cleanup);
        }
        return Err(e);
    }
    debug!(provider, class = %class, object = %object, "object reconstructed");
    Ok(object)
}

fn populate(
    codec: &dyn SerializationProvider,
    store: &mut dyn ObjectStore,
    flake: &Flake,
    object: ObjectId,
    options: &WriteOptions,
) -> Result<(), FlakesError> {
    let raw = payload(flake, options)?;
    codec.write_object(store, object, &raw)?;
    if options.post_load {
        post_load_tree(store, object)?;
    }
    Ok(())
}

/// Rebuild a new struct value from a flake.
///
/// Owned objects referenced from the struct are created under `outer`.
pub fn create_struct(
    registry: &ProviderRegistry,
    provider: &str,
    store: &mut dyn ObjectStore,
    flake: &Flake,
    expected: &TypePath,
    outer: Option<ObjectId>,
    options: &WriteOptions,
) -> Result<StructValue, FlakesError> {
    let types = store.types();
    let found = verify_type(&types, flake, expected)?;
    let mut value = types.default_struct(&found)?;
    write_struct(registry, provider, store, flake, &mut value, outer, options)?;
    Ok(value)
}

/// Run post-load hooks on `root`, then on every object beneath it.
///
/// The sub-object list is collected before any hook runs, so objects a hook
/// creates are not visited.
pub fn post_load_tree(store: &mut dyn ObjectStore, root: ObjectId) -> Result<(), FlakesError> {
    let types: Arc<TypeRegistry> = store.types();
    let subobjects = store.objects_within(root);
    for object in std::iter::once(root).chain(subobjects) {
        if !store.contains(object) {
            continue;
        }
        let class = store.class_of(object)?;
        if let Some(hook) = types.object_hook_for(&class) {
            hook(store, object);
        }
    }
    Ok(())
}

// =============================================================================
// FACADE
// =============================================================================

/// A provider registry bundled with default provider and options.
///
/// Every call has an explicit-provider form (`*_with`) and a default form.
#[derive(Debug, Clone)]
pub struct Flakes {
    registry: ProviderRegistry,
    provider: String,
    read: ReadOptions,
    write: WriteOptions,
}

impl Default for Flakes {
    fn default() -> Self {
        Self::new(ProviderRegistry::with_builtin())
    }
}

impl Flakes {
    #[must_use]
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            provider: DEFAULT_PROVIDER.to_string(),
            read: ReadOptions::default(),
            write: WriteOptions::default(),
        }
    }

    /// Set the default provider. Not checked until first use.
    #[must_use]
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    /// Set read options. Write options are updated so decompression is
    /// skipped exactly when compression is bypassed.
    #[must_use]
    pub fn with_read_options(mut self, read: ReadOptions) -> Self {
        self.read = read;
        self.write.skip_decompression = read.compression.is_bypass();
        self
    }

    #[must_use]
    pub fn with_post_load(mut self, post_load: bool) -> Self {
        self.write.post_load = post_load;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn read_options(&self) -> &ReadOptions {
        &self.read
    }

    #[must_use]
    pub fn write_options(&self) -> &WriteOptions {
        &self.write
    }

    pub fn make_object(&self, store: &dyn ObjectStore, object: Option<ObjectId>) -> Result<Flake, FlakesError> {
        self.make_object_with(&self.provider, store, object)
    }

    pub fn make_object_with(
        &self,
        provider: &str,
        store: &dyn ObjectStore,
        object: Option<ObjectId>,
    ) -> Result<Flake, FlakesError> {
        make_object_flake(&self.registry, provider, store, object, &self.read)
    }

    pub fn make_struct(
        &self,
        store: &dyn ObjectStore,
        value: &StructValue,
        owner: Option<ObjectId>,
    ) -> Result<Flake, FlakesError> {
        make_struct_flake(&self.registry, &self.provider, store, value, owner, &self.read)
    }

    pub fn create_object(
        &self,
        store: &mut dyn ObjectStore,
        flake: &Flake,
        expected: &TypePath,
        outer: Option<ObjectId>,
    ) -> Result<ObjectId, FlakesError> {
        self.create_object_with(&self.provider, store, flake, expected, outer)
    }

    pub fn create_object_with(
        &self,
        provider: &str,
        store: &mut dyn ObjectStore,
        flake: &Flake,
        expected: &TypePath,
        outer: Option<ObjectId>,
    ) -> Result<ObjectId, FlakesError> {
        create_object(&self.registry, provider, store, flake, expected, outer, &self.write)
    }

    pub fn create_struct(
        &self,
        store: &mut dyn ObjectStore,
        flake: &Flake,
        expected: &TypePath,
        outer: Option<ObjectId>,
    ) -> Result<StructValue, FlakesError> {
        create_struct(&self.registry, &self.provider, store, flake, expected, outer, &self.write)
    }

    pub fn write_object(
        &self,
        store: &mut dyn ObjectStore,
        flake: &Flake,
        object: ObjectId,
    ) -> Result<(), FlakesError> {
        write_object(&self.registry, &self.provider, store, flake, object, &self.write)
    }

    pub fn write_struct(
        &self,
        store: &mut dyn ObjectStore,
        flake: &Flake,
        value: &mut StructValue,
        owner: Option<ObjectId>,
    ) -> Result<(), FlakesError> {
        write_struct(&self.registry, &self.provider, store, flake, value, owner, &self.write)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{FieldType, TypeInfo};
    use crate::value::Value;
    use crate::world::World;

    const BASE: &str = "/Script/Test.Base";
    const DERIVED: &str = "/Script/Test.Derived";
    const OTHER: &str = "/Script/Test.Other";
    const POD: &str = "/Script/Test.Pod";

    fn mark_loaded(store: &mut dyn ObjectStore, id: ObjectId) {
        if let Ok(fields) = store.fields_mut(id) {
            fields.insert("Loaded".to_string(), Value::Bool(true));
        }
    }

    fn double_pod(value: &mut StructValue) {
        if let Some(Value::Int(n)) = value.fields.get_mut("N") {
            *n *= 2;
        }
    }

    fn world() -> World {
        let mut types = TypeRegistry::new();
        types
            .register(
                TypeInfo::class(BASE)
                    .field("Loaded", FieldType::Bool)
                    .field("Child", FieldType::object(BASE))
                    .on_post_load(mark_loaded),
            )
            .expect("base");
        types
            .register(TypeInfo::class(DERIVED).parent(BASE).field("Extra", FieldType::Int))
            .expect("derived");
        types.register(TypeInfo::class(OTHER)).expect("other");
        types
            .register(TypeInfo::structure(POD).field("N", FieldType::Int).on_struct_post_load(double_pod))
            .expect("pod");
        World::new(Arc::new(types))
    }

    #[test]
    fn missing_source_gives_empty_flake() {
        let world = world();
        let flakes = Flakes::default();
        let flake = flakes.make_object(&world, None).expect("empty");
        assert!(flake.is_empty());
        let flake = flakes.make_object(&world, Some(ObjectId(999))).expect("empty");
        assert!(flake.is_empty());
    }

    #[test]
    fn derived_flake_satisfies_base_expectation() {
        let mut world = world();
        let src = world.new_object(&DERIVED.into(), world.transient_package()).expect("src");
        world.set_field(src, "Extra", Value::Int(7)).expect("extra");

        let flakes = Flakes::default();
        let flake = flakes.make_object(&world, Some(src)).expect("flake");
        assert_eq!(flake.type_path, Some(TypePath::new(DERIVED)));

        let copy = flakes.create_object(&mut world, &flake, &BASE.into(), None).expect("copy");
        assert_eq!(world.class_of(copy).expect("class"), TypePath::new(DERIVED));
        assert_eq!(world.field(copy, "Extra"), Some(&Value::Int(7)));
    }

    #[test]
    fn mismatched_type_is_rejected_before_allocation() {
        let mut world = world();
        let src = world.new_object(&OTHER.into(), world.transient_package()).expect("src");
        let flakes = Flakes::default();
        let flake = flakes.make_object(&world, Some(src)).expect("flake");

        let before = world.object_count();
        let result = flakes.create_object(&mut world, &flake, &BASE.into(), None);
        assert!(matches!(result, Err(FlakesError::TypeMismatch { .. })));
        assert_eq!(world.object_count(), before);
    }

    #[test]
    fn unknown_expected_type_is_rejected() {
        let types = world().types();
        let flake = Flake::new(TypePath::new(BASE), Vec::new());
        assert!(matches!(
            verify_type(&types, &flake, &"/Script/Test.Nope".into()),
            Err(FlakesError::UnknownType(_))
        ));
        assert!(matches!(
            verify_type(&types, &Flake::default(), &BASE.into()),
            Err(FlakesError::MissingType)
        ));
    }

    #[test]
    fn unknown_provider_is_rejected_without_allocation() {
        let mut world = world();
        let src = world.new_object(&BASE.into(), world.transient_package()).expect("src");
        let flakes = Flakes::default();
        let flake = flakes.make_object(&world, Some(src)).expect("flake");

        let before = world.object_count();
        let result = flakes.create_object_with("Yaml", &mut world, &flake, &BASE.into(), None);
        assert!(matches!(result, Err(FlakesError::UnknownProvider(_))));
        assert_eq!(world.object_count(), before);
        assert!(matches!(
            flakes.make_object_with("Yaml", &world, Some(src)),
            Err(FlakesError::UnknownProvider(_))
        ));
    }

    #[test]
    fn corrupt_payload_leaves_no_partial_object() {
        let mut world = world();
        let src = world.new_object(&BASE.into(), world.transient_package()).expect("src");
        let flakes = Flakes::default();
        let mut flake = flakes.make_object(&world, Some(src)).expect("flake");
        flake.data.truncate(flake.data.len() / 2);

        let before = world.object_count();
        assert!(flakes.create_object(&mut world, &flake, &BASE.into(), None).is_err());
        assert_eq!(world.object_count(), before);
    }

    #[test]
    fn post_load_runs_on_root_and_children() {
        let mut world = world();
        let root = world.new_object(&BASE.into(), world.transient_package()).expect("root");
        let child = world.new_object(&BASE.into(), root).expect("child");
        world.set_field(root, "Child", Value::Object(Some(child))).expect("link");

        let flakes = Flakes::default();
        let flake = flakes.make_object(&world, Some(root)).expect("flake");
        let copy = flakes.create_object(&mut world, &flake, &BASE.into(), None).expect("copy");
        let copy_child = world.field(copy, "Child").and_then(Value::as_object).expect("child");

        assert_ne!(copy_child, child);
        assert_eq!(world.field(copy, "Loaded"), Some(&Value::Bool(true)));
        assert_eq!(world.field(copy_child, "Loaded"), Some(&Value::Bool(true)));
        assert_eq!(world.field(root, "Loaded"), Some(&Value::Bool(false)));
    }

    #[test]
    fn post_load_can_be_disabled() {
        let mut world = world();
        let root = world.new_object(&BASE.into(), world.transient_package()).expect("root");
        let flakes = Flakes::default().with_post_load(false);
        let flake = flakes.make_object(&world, Some(root)).expect("flake");
        let copy = flakes.create_object(&mut world, &flake, &BASE.into(), None).expect("copy");
        assert_eq!(world.field(copy, "Loaded"), Some(&Value::Bool(false)));
    }

    #[test]
    fn struct_round_trip_runs_struct_hook() {
        let mut world = world();
        let flakes = Flakes::default().with_read_options(ReadOptions::uncompressed());
        let pod = StructValue::new(POD).with("N", Value::Int(21));
        let flake = flakes.make_struct(&world, &pod, None).expect("flake");

        let copy = flakes.create_struct(&mut world, &flake, &POD.into(), None).expect("copy");
        assert_eq!(copy.get("N"), Some(&Value::Int(42)));
    }

    #[test]
    fn write_object_requires_exact_class() {
        let mut world = world();
        let src = world.new_object(&DERIVED.into(), world.transient_package()).expect("src");
        let base = world.new_object(&BASE.into(), world.transient_package()).expect("base");
        let flakes = Flakes::default();
        let flake = flakes.make_object(&world, Some(src)).expect("flake");
        assert!(matches!(
            flakes.write_object(&mut world, &flake, base),
            Err(FlakesError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn write_struct_adopts_flake_type_when_untyped() {
        let mut world = world();
        let flakes = Flakes::default().with_post_load(false);
        let pod = StructValue::new(POD).with("N", Value::Int(5));
        let flake = flakes.make_struct(&world, &pod, None).expect("flake");

        let mut target = StructValue::default();
        flakes.write_struct(&mut world, &flake, &mut target, None).expect("write");
        assert_eq!(target.type_path, TypePath::new(POD));
        assert_eq!(target.get("N"), Some(&Value::Int(5)));
    }
}
