//! # Graph Walkers
//!
//! Field-by-field traversal of a value and its owned sub-graph.
//!
//! Both walkers share the ownership classifier in `crate::ownership`; they
//! differ only in how values land on the wire:
//! - `binary`: a flat byte stream through an archive (`Binary`, `NetBinary`)
//! - `json`: a `serde_json` tree (`Json`, `PrettyJson`)
//!
//! On write, an owned sub-object is inlined with its exact class; an external
//! one is written as its object path. On read, inlined sub-objects are
//! allocated under the current top of the ownership stack, and external paths
//! are resolved in the target store (null when nothing lives there).

pub mod binary;
pub mod json;

pub use binary::{BinaryReader, BinaryWriter};
pub use json::{JsonReader, JsonWriter};

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveWriter, FixedReader, FixedWriter};
    use crate::ownership::{OwnershipPolicy, RefMarker};
    use crate::reflect::{FieldType, TypeInfo, TypeRegistry};
    use crate::types::{FlakesError, TypePath};
    use crate::value::{StructValue, Value, Vector};
    use crate::world::{ObjectStore, World};
    use std::sync::Arc;

    const HOLDER: &str = "/Script/Test.Holder";
    const LINK: &str = "/Script/Test.Link";
    const POINT: &str = "/Script/Test.Point";

    fn types() -> Arc<TypeRegistry> {
        let mut types = TypeRegistry::new();
        types
            .register(TypeInfo::structure(POINT).field("X", FieldType::Int))
            .expect("point");
        types
            .register(
                TypeInfo::class(HOLDER)
                    .field("Flag", FieldType::Bool)
                    .field("Child", FieldType::object(HOLDER))
                    .field("Point", FieldType::structure(POINT)),
            )
            .expect("holder");
        types
            .register(TypeInfo::structure(LINK).field("Target", FieldType::object(HOLDER)))
            .expect("link");
        Arc::new(types)
    }

    #[test]
    fn binary_layout_of_flat_object() {
        let mut world = World::new(types());
        let root = world
            .new_object(&HOLDER.into(), world.transient_package())
            .expect("root");
        world.set_field(root, "Flag", Value::Bool(true)).expect("flag");

        let mut writer = BinaryWriter::new(&world, FixedWriter::new(), Some(root), OwnershipPolicy::StrictOuter);
        let fields = world.fields(root).expect("fields").clone();
        writer.write_fields(&HOLDER.into(), &fields).expect("write");
        let bytes = writer.finish();

        // Flag, null Child marker, Point.X as i64.
        assert_eq!(bytes, vec![1, RefMarker::NoReference as u8, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn self_reference_is_written_as_external_path() {
        let mut world = World::new(types());
        let root = world
            .new_object(&HOLDER.into(), world.transient_package())
            .expect("root");
        world.set_field(root, "Child", Value::Object(Some(root))).expect("child");

        let fields = world.fields(root).expect("fields").clone();
        let mut writer = JsonWriter::new(&world, Some(root), OwnershipPolicy::StrictOuter);
        let json = writer.write_fields(&HOLDER.into(), &fields).expect("write");
        assert_eq!(json.get("Child"), Some(&serde_json::json!("Transient.Holder_0")));
    }

    #[test]
    fn struct_owner_seeds_ownership_stack() {
        let mut world = World::new(types());
        let owner = world
            .new_object(&HOLDER.into(), world.transient_package())
            .expect("owner");
        let child = world.new_object(&HOLDER.into(), owner).expect("child");
        let link = StructValue::new(LINK).with("Target", Value::Object(Some(child)));

        let mut writer = BinaryWriter::new(&world, FixedWriter::new(), Some(owner), OwnershipPolicy::StrictOuter);
        writer.write_fields(&LINK.into(), &link.fields).expect("write");
        assert_eq!(writer.owned_count(), 1);
        let bytes = writer.finish();

        let mut target = World::new(types());
        let new_owner = target
            .new_object(&HOLDER.into(), target.transient_package())
            .expect("new owner");
        let mut copy = StructValue::new(LINK);
        let mut reader = BinaryReader::new(&mut target, FixedReader::new(&bytes), Some(new_owner));
        reader.read_fields(&LINK.into(), &mut copy.fields).expect("read");
        reader.finish().expect("finish");

        let rebuilt = copy.get("Target").and_then(Value::as_object).expect("rebuilt child");
        assert_eq!(target.outer_of(rebuilt).expect("outer"), Some(new_owner));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut world = World::new(types());
        let bytes = [0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xAA];
        let mut copy = StructValue::new(HOLDER);
        let mut reader = BinaryReader::new(&mut world, FixedReader::new(&bytes), None);
        reader.read_fields(&HOLDER.into(), &mut copy.fields).expect("read");
        assert!(matches!(reader.finish(), Err(FlakesError::Format(_))));
    }

    #[test]
    fn wrong_value_kind_is_rejected() {
        let world = World::new(types());
        let bad = StructValue::new(POINT).with("X", Value::Str("nope".into()));
        let mut writer = BinaryWriter::new(&world, FixedWriter::new(), None, OwnershipPolicy::StrictOuter);
        let result = writer.write_fields(&TypePath::new(POINT), &bad.fields);
        assert!(matches!(result, Err(FlakesError::Format(_))));
    }

    #[test]
    fn owned_class_outside_declared_hierarchy_is_rejected() {
        let mut types = TypeRegistry::new();
        types.register(TypeInfo::class("/Script/Test.Other")).expect("other");
        types
            .register(TypeInfo::class(HOLDER).field("Child", FieldType::object(HOLDER)))
            .expect("holder");
        let mut world = World::new(Arc::new(types));

        let mut w = FixedWriter::new();
        w.write_u8(RefMarker::Owned as u8).expect("marker");
        w.write_str("/Script/Test.Other").expect("class");
        let bytes = w.into_bytes();
        let mut copy = StructValue::new(HOLDER);
        let mut reader = BinaryReader::new(&mut world, FixedReader::new(&bytes), None);
        let result = reader.read_fields(&HOLDER.into(), &mut copy.fields);
        assert!(matches!(result, Err(FlakesError::TypeMismatch { .. })));
    }

    #[test]
    fn non_finite_floats_travel_as_json_tags() {
        const READING: &str = "/Script/Test.Reading";
        let mut types = TypeRegistry::new();
        types
            .register(
                TypeInfo::structure(READING)
                    .field("Up", FieldType::Float)
                    .field("Down", FieldType::Float)
                    .field("Odd", FieldType::Float)
                    .field("Zero", FieldType::Float)
                    .field("At", FieldType::Vector),
            )
            .expect("reading");
        let mut world = World::new(Arc::new(types));
        let reading = StructValue::new(READING)
            .with("Up", Value::Float(f64::INFINITY))
            .with("Down", Value::Float(f64::NEG_INFINITY))
            .with("Odd", Value::Float(f64::NAN))
            .with("Zero", Value::Float(-0.0))
            .with("At", Value::Vector(Vector::new(f64::NAN, f64::INFINITY, 1.5)));

        let mut writer = JsonWriter::new(&world, None, OwnershipPolicy::StrictOuter);
        let json = writer.write_fields(&READING.into(), &reading.fields).expect("write");
        assert_eq!(json.get("Up"), Some(&serde_json::json!("inf")));
        assert_eq!(json.get("Down"), Some(&serde_json::json!("-inf")));
        assert_eq!(json.get("Odd"), Some(&serde_json::json!("nan")));
        assert_eq!(json["At"]["y"], serde_json::json!("inf"));

        let mut copy = StructValue::new(READING);
        let mut reader = JsonReader::new(&mut world, None);
        reader.read_fields(&READING.into(), &json, &mut copy.fields).expect("read");

        assert_eq!(copy.get("Up"), Some(&Value::Float(f64::INFINITY)));
        assert_eq!(copy.get("Down"), Some(&Value::Float(f64::NEG_INFINITY)));
        assert!(matches!(copy.get("Odd"), Some(Value::Float(f)) if f.is_nan()));
        assert!(matches!(copy.get("Zero"), Some(Value::Float(f)) if *f == 0.0 && f.is_sign_negative()));
        let at = copy.get("At").and_then(Value::as_vector).expect("vector");
        assert!(at.x.is_nan());
        assert_eq!((at.y, at.z), (f64::INFINITY, 1.5));
    }

    #[test]
    fn unknown_float_tag_is_a_format_error() {
        let mut world = World::new(types());
        let mut copy = StructValue::new(HOLDER);
        let json = serde_json::json!({ "Flag": "inf" });
        let map = json.as_object().expect("object");
        let mut reader = JsonReader::new(&mut world, None);
        let result = reader.read_fields(&HOLDER.into(), map, &mut copy.fields);
        assert!(matches!(result, Err(FlakesError::Format(_))));
    }
}
