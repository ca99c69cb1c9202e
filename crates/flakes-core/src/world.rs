//! # Object World
//!
//! The live object graph the engine serializes from and reconstructs into.
//!
//! `ObjectStore` is the seam: the walkers only ever talk to this trait, so a
//! host with its own object model plugs in by implementing it. `World` is the
//! in-memory implementation used by the CLI and the tests.
//!
//! ## Ownership
//!
//! Every object except a package has exactly one outer. The outer chain forms
//! a tree rooted at packages, and an object's path is the dotted chain of
//! names down that tree (`Transient.SimpleObject_3`).

use crate::primitives::{LIVE_SCOPE_CLASS, PACKAGE_CLASS, TRANSIENT_PACKAGE};
use crate::reflect::{TypeKind, TypeRegistry};
use crate::types::{FlakesError, ObjectId, ObjectPath, TypePath};
use crate::value::{FieldMap, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// OBJECT STORE TRAIT
// =============================================================================

/// Access to a live object graph.
///
/// Implementations must keep handles stable for the lifetime of an object
/// and never hand out a destroyed handle again.
pub trait ObjectStore {
    /// Shared type registry. Returned as an `Arc` so walkers can hold it
    /// while mutating the store.
    fn types(&self) -> Arc<TypeRegistry>;

    /// Check if an object exists.
    fn contains(&self, id: ObjectId) -> bool;

    /// Exact runtime class of an object.
    fn class_of(&self, id: ObjectId) -> Result<TypePath, FlakesError>;

    /// Owner of an object. `None` for packages.
    fn outer_of(&self, id: ObjectId) -> Result<Option<ObjectId>, FlakesError>;

    /// Name of an object, unique among its siblings.
    fn name_of(&self, id: ObjectId) -> Result<&str, FlakesError>;

    fn fields(&self, id: ObjectId) -> Result<&FieldMap, FlakesError>;

    fn fields_mut(&mut self, id: ObjectId) -> Result<&mut FieldMap, FlakesError>;

    /// Replace all field values of an object.
    fn set_fields(&mut self, id: ObjectId, fields: FieldMap) -> Result<(), FlakesError> {
        *self.fields_mut(id)? = fields;
        Ok(())
    }

    /// Allocate a new object of `class` under `outer`, fields at their defaults.
    fn new_object(&mut self, class: &TypePath, outer: ObjectId) -> Result<ObjectId, FlakesError>;

    /// Destroy an object and every object beneath it.
    fn destroy_object(&mut self, id: ObjectId) -> Result<(), FlakesError>;

    /// Dotted path from the root package.
    fn path_of(&self, id: ObjectId) -> Result<ObjectPath, FlakesError>;

    /// Find an object by path. `None` if nothing lives there.
    fn resolve_path(&self, path: &ObjectPath) -> Option<ObjectId>;

    /// Check whether an object lives beneath a live runtime scope.
    fn is_live_scoped(&self, id: ObjectId) -> bool;

    /// Every object beneath `id` (not including `id`), parents before children.
    fn objects_within(&self, id: ObjectId) -> Vec<ObjectId>;

    /// Package receiving objects created without an explicit outer.
    fn transient_package(&self) -> ObjectId;
}

// =============================================================================
// OBJECT RECORD
// =============================================================================

/// One object in a `World`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub class: TypePath,
    pub name: String,
    pub outer: Option<ObjectId>,
    pub fields: FieldMap,
    /// Objects beneath a live scope are transient runtime state.
    pub live_scope: bool,
}

// =============================================================================
// WORLD
// =============================================================================

/// In-memory object arena.
///
/// Uses BTreeMap throughout so iteration (and therefore `objects_within`)
/// is deterministic.
#[derive(Debug, Clone)]
pub struct World {
    types: Arc<TypeRegistry>,
    objects: BTreeMap<ObjectId, ObjectRecord>,
    children: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
    /// Per-class counters for generated names.
    name_counters: BTreeMap<String, u64>,
    next_id: u64,
    transient: ObjectId,
}

impl World {
    /// Create a world with an empty transient package.
    #[must_use]
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        let transient = ObjectId(1);
        let mut objects = BTreeMap::new();
        objects.insert(
            transient,
            ObjectRecord {
                class: TypePath::new(PACKAGE_CLASS),
                name: TRANSIENT_PACKAGE.to_string(),
                outer: None,
                fields: FieldMap::new(),
                live_scope: false,
            },
        );
        Self {
            types,
            objects,
            children: BTreeMap::new(),
            name_counters: BTreeMap::new(),
            next_id: 2,
            transient,
        }
    }

    /// Create a new top-level package.
    pub fn new_package(&mut self, name: &str) -> Result<ObjectId, FlakesError> {
        self.insert_record(TypePath::new(PACKAGE_CLASS), name.to_string(), None, false)
    }

    /// Create a live runtime scope beneath `outer`.
    ///
    /// Objects created under it report `is_live_scoped() == true`.
    pub fn new_live_scope(&mut self, outer: ObjectId) -> Result<ObjectId, FlakesError> {
        let class = TypePath::new(LIVE_SCOPE_CLASS);
        let name = self.generate_name(&class, Some(outer));
        self.insert_record(class, name, Some(outer), true)
    }

    /// Allocate an object with a caller-chosen name.
    pub fn new_named_object(
        &mut self,
        class: &TypePath,
        outer: ObjectId,
        name: &str,
    ) -> Result<ObjectId, FlakesError> {
        self.types.resolve_kind(class, TypeKind::Class)?;
        self.insert_record(class.clone(), name.to_string(), Some(outer), false)
    }

    /// Set a single field, checking that the class declares it.
    pub fn set_field(&mut self, id: ObjectId, name: &str, value: Value) -> Result<(), FlakesError> {
        let class = self.class_of(id)?;
        let info = self.types.resolve(&class)?;
        if info.field_def(name).is_none() {
            return Err(FlakesError::Format(format!("{} has no field '{}'", class, name)));
        }
        self.fields_mut(id)?.insert(name.to_string(), value);
        Ok(())
    }

    /// Get a single field value.
    #[must_use]
    pub fn field(&self, id: ObjectId, name: &str) -> Option<&Value> {
        self.objects.get(&id).and_then(|r| r.fields.get(name))
    }

    /// Get the record of an object.
    #[must_use]
    pub fn record(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.objects.get(&id)
    }

    /// Number of live objects, packages included.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Direct children of an object in handle order.
    #[must_use]
    pub fn children_of(&self, id: ObjectId) -> Vec<ObjectId> {
        self.children
            .get(&id)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Next free `Class_N` name under `outer`.
    fn generate_name(&mut self, class: &TypePath, outer: Option<ObjectId>) -> String {
        let short = class.short_name().to_string();
        loop {
            let counter = self.name_counters.entry(short.clone()).or_insert(0);
            let name = format!("{}_{}", short, counter);
            *counter = counter.saturating_add(1);
            if self.find_child(outer, &name).is_none() {
                return name;
            }
        }
    }

    fn find_child(&self, outer: Option<ObjectId>, name: &str) -> Option<ObjectId> {
        match outer {
            Some(parent) => self
                .children
                .get(&parent)?
                .iter()
                .copied()
                .find(|c| self.objects.get(c).is_some_and(|r| r.name == name)),
            None => self
                .objects
                .iter()
                .find(|(_, r)| r.outer.is_none() && r.name == name)
                .map(|(id, _)| *id),
        }
    }

    fn insert_record(
        &mut self,
        class: TypePath,
        name: String,
        outer: Option<ObjectId>,
        live_scope: bool,
    ) -> Result<ObjectId, FlakesError> {
        if let Some(parent) = outer
            && !self.objects.contains_key(&parent)
        {
            return Err(FlakesError::ObjectNotFound(parent));
        }
        if name.is_empty() || name.contains('.') {
            return Err(FlakesError::Format(format!("invalid object name '{}'", name)));
        }
        if self.find_child(outer, &name).is_some() {
            return Err(FlakesError::Format(format!("name '{}' already in use", name)));
        }

        let fields = self.types.default_fields(&class)?;
        let id = ObjectId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);

        self.objects.insert(
            id,
            ObjectRecord {
                class,
                name,
                outer,
                fields,
                live_scope,
            },
        );
        if let Some(parent) = outer {
            self.children.entry(parent).or_default().insert(id);
        }
        Ok(id)
    }

    fn record_or_err(&self, id: ObjectId) -> Result<&ObjectRecord, FlakesError> {
        self.objects.get(&id).ok_or(FlakesError::ObjectNotFound(id))
    }
}

impl ObjectStore for World {
    fn types(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.types)
    }

    fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    fn class_of(&self, id: ObjectId) -> Result<TypePath, FlakesError> {
        Ok(self.record_or_err(id)?.class.clone())
    }

    fn outer_of(&self, id: ObjectId) -> Result<Option<ObjectId>, FlakesError> {
        Ok(self.record_or_err(id)?.outer)
    }

    fn name_of(&self, id: ObjectId) -> Result<&str, FlakesError> {
        Ok(&self.record_or_err(id)?.name)
    }

    fn fields(&self, id: ObjectId) -> Result<&FieldMap, FlakesError> {
        Ok(&self.record_or_err(id)?.fields)
    }

    fn fields_mut(&mut self, id: ObjectId) -> Result<&mut FieldMap, FlakesError> {
        self.objects
            .get_mut(&id)
            .map(|r| &mut r.fields)
            .ok_or(FlakesError::ObjectNotFound(id))
    }

    fn new_object(&mut self, class: &TypePath, outer: ObjectId) -> Result<ObjectId, FlakesError> {
        self.types.resolve_kind(class, TypeKind::Class)?;
        let name = self.generate_name(class, Some(outer));
        self.insert_record(class.clone(), name, Some(outer), false)
    }

    fn destroy_object(&mut self, id: ObjectId) -> Result<(), FlakesError> {
        let record = self.record_or_err(id)?;
        if let Some(parent) = record.outer
            && let Some(siblings) = self.children.get_mut(&parent)
        {
            siblings.remove(&id);
        }
        let mut doomed = self.objects_within(id);
        doomed.push(id);
        for victim in doomed {
            self.objects.remove(&victim);
            self.children.remove(&victim);
        }
        if id == self.transient {
            tracing::warn!("transient package destroyed; recreating");
            let replacement = self.insert_record(
                TypePath::new(PACKAGE_CLASS),
                TRANSIENT_PACKAGE.to_string(),
                None,
                false,
            )?;
            self.transient = replacement;
        }
        Ok(())
    }

    fn path_of(&self, id: ObjectId) -> Result<ObjectPath, FlakesError> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let record = self.record_or_err(cur)?;
            names.push(record.name.as_str());
            current = record.outer;
        }
        names.reverse();
        Ok(ObjectPath::new(names.join(".")))
    }

    fn resolve_path(&self, path: &ObjectPath) -> Option<ObjectId> {
        let mut current: Option<ObjectId> = None;
        for segment in path.segments() {
            current = Some(self.find_child(current, segment)?);
        }
        current
    }

    fn is_live_scoped(&self, id: ObjectId) -> bool {
        let mut current = self.objects.get(&id).and_then(|r| r.outer);
        while let Some(cur) = current {
            match self.objects.get(&cur) {
                Some(record) if record.live_scope => return true,
                Some(record) => current = record.outer,
                None => return false,
            }
        }
        false
    }

    fn objects_within(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut out = Vec::new();
        let mut frontier = vec![id];
        while let Some(parent) = frontier.pop() {
            if let Some(kids) = self.children.get(&parent) {
                for kid in kids {
                    out.push(*kid);
                    frontier.push(*kid);
                }
            }
        }
        out
    }

    fn transient_package(&self) -> ObjectId {
        self.transient
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{FieldType, TypeInfo};

    const ITEM: &str = "/Script/Test.Item";

    fn world() -> World {
        let mut types = TypeRegistry::new();
        types
            .register(TypeInfo::class(ITEM).field("Count", FieldType::Int))
            .expect("item");
        World::new(Arc::new(types))
    }

    #[test]
    fn new_objects_get_unique_names_and_defaults() {
        let mut world = world();
        let outer = world.transient_package();
        let a = world.new_object(&ITEM.into(), outer).expect("a");
        let b = world.new_object(&ITEM.into(), outer).expect("b");

        assert_eq!(world.name_of(a).expect("name"), "Item_0");
        assert_eq!(world.name_of(b).expect("name"), "Item_1");
        assert_eq!(world.field(a, "Count"), Some(&Value::Int(0)));
    }

    #[test]
    fn path_round_trips_through_resolve() {
        let mut world = world();
        let outer = world.transient_package();
        let parent = world.new_object(&ITEM.into(), outer).expect("parent");
        let child = world.new_object(&ITEM.into(), parent).expect("child");

        let path = world.path_of(child).expect("path");
        assert_eq!(path.as_str(), "Transient.Item_0.Item_1");
        assert_eq!(world.resolve_path(&path), Some(child));
        assert_eq!(world.resolve_path(&ObjectPath::new("Transient.Nope")), None);
        assert_eq!(world.resolve_path(&ObjectPath::default()), None);
    }

    #[test]
    fn destroy_removes_descendants() {
        let mut world = world();
        let outer = world.transient_package();
        let parent = world.new_object(&ITEM.into(), outer).expect("parent");
        let child = world.new_object(&ITEM.into(), parent).expect("child");
        let grandchild = world.new_object(&ITEM.into(), child).expect("grandchild");

        assert_eq!(world.objects_within(parent), vec![child, grandchild]);
        world.destroy_object(parent).expect("destroy");

        assert!(!world.contains(parent));
        assert!(!world.contains(child));
        assert!(!world.contains(grandchild));
        assert!(world.children_of(outer).is_empty());
    }

    #[test]
    fn live_scope_marks_descendants() {
        let mut world = world();
        let level = world.new_package("Level").expect("package");
        let scope = world.new_live_scope(level).expect("scope");
        let actor = world.new_object(&ITEM.into(), scope).expect("actor");
        let part = world.new_object(&ITEM.into(), actor).expect("part");
        let loose = world.new_object(&ITEM.into(), level).expect("loose");

        assert!(world.is_live_scoped(actor));
        assert!(world.is_live_scoped(part));
        assert!(!world.is_live_scoped(loose));
        assert!(!world.is_live_scoped(scope));
    }

    #[test]
    fn set_field_rejects_undeclared_names() {
        let mut world = world();
        let outer = world.transient_package();
        let item = world.new_object(&ITEM.into(), outer).expect("item");

        world.set_field(item, "Count", Value::Int(5)).expect("set");
        assert_eq!(world.field(item, "Count"), Some(&Value::Int(5)));
        assert!(world.set_field(item, "Nope", Value::Int(1)).is_err());
    }

    #[test]
    fn structs_cannot_be_instantiated_as_objects() {
        let mut types = TypeRegistry::new();
        types
            .register(TypeInfo::structure("/Script/Test.Pod"))
            .expect("pod");
        let mut world = World::new(Arc::new(types));
        let outer = world.transient_package();
        let result = world.new_object(&"/Script/Test.Pod".into(), outer);
        assert!(matches!(result, Err(FlakesError::InvalidKind(_))));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut world = world();
        let outer = world.transient_package();
        world.new_named_object(&ITEM.into(), outer, "Sword").expect("first");
        assert!(world.new_named_object(&ITEM.into(), outer, "Sword").is_err());
        assert!(world.new_package(TRANSIENT_PACKAGE).is_err());
    }
}
