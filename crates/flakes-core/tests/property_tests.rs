//! # Property-Based Tests
//!
//! Round-trip identity, compression transparency and decoder robustness
//! over generated inputs.

#![allow(clippy::unwrap_used, clippy::panic)]

use flakes_core::{
    CompressionLevel, CompressionOptions, Compressor, FieldType, Flake, Flakes, ObjectStore,
    ProviderRegistry, SaveGame, TypeInfo, TypeRegistry, Value, Vector, World, compress,
    compare_objects, decompress,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::sync::Arc;

const ITEM: &str = "/Script/Prop.Item";

fn world() -> World {
    let mut types = TypeRegistry::new();
    types
        .register(
            TypeInfo::class(ITEM)
                .field("Count", FieldType::Int)
                .field("Weight", FieldType::Float)
                .field("Name", FieldType::Str)
                .field("Offset", FieldType::Vector)
                .field("Contents", FieldType::array(FieldType::object(ITEM))),
        )
        .expect("item");
    World::new(Arc::new(types))
}

/// Every float class, weighted so NaN, the infinities and signed zero turn up often.
fn any_float() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => prop::num::f64::ANY,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
        1 => Just(-0.0),
    ]
}

fn compressor() -> impl Strategy<Value = Compressor> {
    prop_oneof![Just(Compressor::Deflate), Just(Compressor::Zlib), Just(Compressor::Lz4)]
}

fn level() -> impl Strategy<Value = CompressionLevel> {
    prop_oneof![
        Just(CompressionLevel::Fastest),
        Just(CompressionLevel::Fast),
        Just(CompressionLevel::Normal),
        Just(CompressionLevel::Optimal),
    ]
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Plain field values, non-finite floats included, come back unchanged
    /// through every provider.
    #[test]
    fn plain_fields_round_trip(
        count in any::<i64>(),
        weight in any_float(),
        name in "\\PC{0,40}",
        offset in (any_float(), any_float(), any_float()),
    ) {
        let mut world = world();
        let item = world.new_object(&ITEM.into(), world.transient_package()).expect("item");
        world.set_field(item, "Count", Value::Int(count)).expect("count");
        world.set_field(item, "Weight", Value::Float(weight)).expect("weight");
        world.set_field(item, "Name", Value::Str(name)).expect("name");
        world
            .set_field(item, "Offset", Value::Vector(Vector::new(offset.0, offset.1, offset.2)))
            .expect("offset");

        for provider in ProviderRegistry::with_builtin().names() {
            let flakes = Flakes::default().with_provider(&provider);
            let flake = flakes.make_object(&world, Some(item)).expect("flake");
            let copy = flakes.create_object(&mut world, &flake, &ITEM.into(), None).expect("copy");
            let result = compare_objects(&world, item, copy);
            prop_assert!(result.is_ok(), "{}: {:?}", provider, result);
        }
    }

    /// A tree of owned items is duplicated node for node.
    #[test]
    fn owned_tree_is_duplicated(shape in vec(0usize..4, 1..6)) {
        let mut world = world();
        let root = world.new_object(&ITEM.into(), world.transient_package()).expect("root");
        let mut contents = Vec::new();
        for (i, grandchildren) in shape.iter().enumerate() {
            let child = world.new_object(&ITEM.into(), root).expect("child");
            world.set_field(child, "Count", Value::Int(i as i64)).expect("count");
            let nested = (0..*grandchildren)
                .map(|_| world.new_object(&ITEM.into(), child).map(|g| Value::Object(Some(g))))
                .collect::<Result<Vec<_>, _>>()
                .expect("grandchildren");
            world.set_field(child, "Contents", Value::Array(nested)).expect("nested");
            contents.push(Value::Object(Some(child)));
        }
        world.set_field(root, "Contents", Value::Array(contents)).expect("contents");

        let before = world.objects_within(root).len();
        let flakes = Flakes::default().with_provider("NetBinary");
        let flake = flakes.make_object(&world, Some(root)).expect("flake");
        let copy = flakes.create_object(&mut world, &flake, &ITEM.into(), None).expect("copy");

        prop_assert_eq!(world.objects_within(copy).len(), before);
        prop_assert!(compare_objects(&world, root, copy).is_ok());
    }

    /// Every compressor restores its input exactly.
    #[test]
    fn compression_is_transparent(
        data in vec(any::<u8>(), 0..4096),
        compressor in compressor(),
        level in level(),
    ) {
        let framed = compress(&data, CompressionOptions { compressor, level }).expect("compress");
        prop_assert_eq!(decompress(&framed).expect("decompress"), data);
    }

    /// Arbitrary bytes never panic the decoders.
    #[test]
    fn garbage_input_is_rejected_gracefully(data in vec(any::<u8>(), 0..256)) {
        let _ = decompress(&data);
        let _ = Flake::from_bytes(&data);
        let _ = SaveGame::from_bytes(&data);

        let mut world = world();
        for provider in ProviderRegistry::with_builtin().names() {
            let flake = Flake::new(ITEM.into(), data.clone());
            let flakes = Flakes::default()
                .with_provider(&provider)
                .with_read_options(flakes_core::ReadOptions::uncompressed());
            let before = world.object_count();
            if flakes.create_object(&mut world, &flake, &ITEM.into(), None).is_err() {
                prop_assert_eq!(world.object_count(), before);
            }
        }
    }
}
