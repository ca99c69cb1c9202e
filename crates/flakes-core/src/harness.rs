//! # Provider Round-Trip Harness
//!
//! Exercises every provider against a fixed set of samples, compressed and
//! raw, and reports which combinations reproduce their source exactly.
//!
//! Samples:
//! - `VectorSample`: a struct holding one vector
//! - `ColorSample`: a struct holding one color
//! - `CompoundStruct`: guid, tags, soft reference, instanced payload
//! - `SimpleObject`: a flat object of plain fields
//! - `ComplexObject`: an owned child, an array of owned children, an
//!   external reference and a nested compound struct

use crate::compare::{compare_objects, compare_structs};
use crate::compression::CompressionOptions;
use crate::interface::{self, ReadOptions, WriteOptions};
use crate::ownership::OwnershipPolicy;
use crate::primitives::MAX_ARRAY_LENGTH;
use crate::provider::ProviderRegistry;
use crate::reflect::{FieldType, TypeInfo, TypeRegistry};
use crate::types::{FlakesError, ObjectId, TypePath};
use crate::value::{Color, StructValue, Value, Vector};
use crate::world::{ObjectStore, World};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const VECTOR_SAMPLE: &str = "/Script/FlakesTest.VectorSample";
pub const COLOR_SAMPLE: &str = "/Script/FlakesTest.ColorSample";
pub const PAYLOAD_BASE: &str = "/Script/FlakesTest.PayloadBase";
pub const DAMAGE_PAYLOAD: &str = "/Script/FlakesTest.DamagePayload";
pub const COMPOUND_STRUCT: &str = "/Script/FlakesTest.CompoundStruct";
pub const SIMPLE_OBJECT: &str = "/Script/FlakesTest.SimpleObject";
pub const COMPLEX_OBJECT: &str = "/Script/FlakesTest.ComplexObject";

/// Owned children in the default complex sample.
pub const DEFAULT_CHILDREN: usize = 10;

// =============================================================================
// SAMPLE TYPES
// =============================================================================

/// Register every sample type.
pub fn register_sample_types(types: &mut TypeRegistry) -> Result<(), FlakesError> {
    types.register(TypeInfo::structure(VECTOR_SAMPLE).field("Value", FieldType::Vector))?;
    types.register(TypeInfo::structure(COLOR_SAMPLE).field("Value", FieldType::Color))?;
    types.register(TypeInfo::structure(PAYLOAD_BASE).field("Weight", FieldType::Float))?;
    types.register(
        TypeInfo::structure(DAMAGE_PAYLOAD)
            .parent(PAYLOAD_BASE)
            .field("Amount", FieldType::Int),
    )?;
    types.register(
        TypeInfo::structure(COMPOUND_STRUCT)
            .field("Id", FieldType::Guid)
            .field("Tags", FieldType::array(FieldType::Str))
            .field("Target", FieldType::SoftObject)
            .field("Payload", FieldType::InstancedStruct(TypePath::new(PAYLOAD_BASE))),
    )?;
    types.register(
        TypeInfo::class(SIMPLE_OBJECT)
            .field("Alive", FieldType::Bool)
            .field("Health", FieldType::Int)
            .field("Speed", FieldType::Float)
            .field("Label", FieldType::Str)
            .field("Position", FieldType::Vector)
            .field("Tint", FieldType::Color),
    )?;
    types.register(
        TypeInfo::class(COMPLEX_OBJECT)
            .parent(SIMPLE_OBJECT)
            .field("Child", FieldType::object(SIMPLE_OBJECT))
            .field("Children", FieldType::array(FieldType::object(SIMPLE_OBJECT)))
            .field("Friend", FieldType::object(SIMPLE_OBJECT))
            .field("Details", FieldType::structure(COMPOUND_STRUCT)),
    )
}

/// A registry holding only the built-in and sample types.
pub fn sample_types() -> Result<Arc<TypeRegistry>, FlakesError> {
    let mut types = TypeRegistry::new();
    register_sample_types(&mut types)?;
    Ok(Arc::new(types))
}

// =============================================================================
// SAMPLE VALUES
// =============================================================================

/// Handles and values of one sample set, all living in one world.
#[derive(Debug, Clone)]
pub struct Samples {
    pub vector: StructValue,
    pub color: StructValue,
    pub compound: StructValue,
    pub simple: ObjectId,
    pub complex: ObjectId,
}

fn fill_simple(world: &mut World, id: ObjectId, seed: i64) -> Result<(), FlakesError> {
    let f = seed as f64;
    world.set_field(id, "Alive", Value::Bool(seed % 2 == 0))?;
    world.set_field(id, "Health", Value::Int(100 - seed))?;
    world.set_field(id, "Speed", Value::Float(1.5 + f * 0.25))?;
    world.set_field(id, "Label", Value::Str(format!("unit-{}", seed)))?;
    world.set_field(id, "Position", Value::Vector(Vector::new(f, -f, f * 0.5)))?;
    world.set_field(id, "Tint", Value::Color(Color::new(0.25, 0.5, 0.75, 1.0)))
}

/// Build the sample set in `world`, whose registry must hold the sample types.
pub fn build_samples(world: &mut World, children: usize) -> Result<Samples, FlakesError> {
    if children > MAX_ARRAY_LENGTH {
        return Err(FlakesError::Format(format!(
            "{} children exceed the array limit of {}",
            children, MAX_ARRAY_LENGTH
        )));
    }
    let outer = world.transient_package();

    let simple = world.new_object(&SIMPLE_OBJECT.into(), outer)?;
    fill_simple(world, simple, 7)?;

    let compound = StructValue::new(COMPOUND_STRUCT)
        .with("Id", Value::Guid(Uuid::new_v4()))
        .with(
            "Tags",
            Value::Array(vec![Value::Str("fire".into()), Value::Str("melee".into())]),
        )
        .with("Target", Value::SoftObject(Some(world.path_of(simple)?)))
        .with(
            "Payload",
            Value::Instanced(Some(
                StructValue::new(DAMAGE_PAYLOAD)
                    .with("Weight", Value::Float(0.125))
                    .with("Amount", Value::Int(42)),
            )),
        );

    let complex = world.new_object(&COMPLEX_OBJECT.into(), outer)?;
    fill_simple(world, complex, 1)?;
    let child = world.new_object(&SIMPLE_OBJECT.into(), complex)?;
    fill_simple(world, child, 2)?;
    let mut list = Vec::with_capacity(children);
    for i in 0..children {
        let element = world.new_object(&SIMPLE_OBJECT.into(), complex)?;
        fill_simple(world, element, 10 + i as i64)?;
        list.push(Value::Object(Some(element)));
    }
    world.set_field(complex, "Child", Value::Object(Some(child)))?;
    world.set_field(complex, "Children", Value::Array(list))?;
    world.set_field(complex, "Friend", Value::Object(Some(simple)))?;
    world.set_field(complex, "Details", Value::Struct(compound.clone()))?;

    Ok(Samples {
        vector: StructValue::new(VECTOR_SAMPLE).with("Value", Value::Vector(Vector::new(1.0, -2.5, 1e-3))),
        color: StructValue::new(COLOR_SAMPLE).with("Value", Value::Color(Color::new(0.1, 0.2, 0.3, 0.4))),
        compound,
        simple,
        complex,
    })
}

// =============================================================================
// RUNNING
// =============================================================================

/// Whether a case stores its payload compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Compressed,
    Raw,
}

impl RunMode {
    pub const ALL: [Self; 2] = [Self::Compressed, Self::Raw];

    fn read_options(self, compression: CompressionOptions, policy: OwnershipPolicy) -> ReadOptions {
        ReadOptions {
            compression: match self {
                Self::Compressed => compression,
                Self::Raw => CompressionOptions::uncompressed(),
            },
            policy,
        }
    }
}

/// Outcome of one provider × mode × sample case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    pub provider: String,
    pub mode: RunMode,
    pub sample: String,
    pub passed: bool,
    /// Flake payload size; 0 when the flake could not be built.
    pub payload_bytes: usize,
    pub error: Option<String>,
}

/// All case outcomes of one harness run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessReport {
    pub cases: Vec<CaseResult>,
}

impl HarnessReport {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }
}

/// Harness settings.
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Providers to run; empty means every registered provider.
    pub providers: Vec<String>,
    pub modes: Vec<RunMode>,
    pub compression: CompressionOptions,
    pub policy: OwnershipPolicy,
    pub children: usize,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            modes: RunMode::ALL.to_vec(),
            compression: CompressionOptions::default(),
            policy: OwnershipPolicy::default(),
            children: DEFAULT_CHILDREN,
        }
    }
}

/// Run every selected provider over every sample.
///
/// Case failures are recorded in the report; only setup failures (sample
/// types or values that cannot be built) return an error.
pub fn run(registry: &ProviderRegistry, options: &HarnessOptions) -> Result<HarnessReport, FlakesError> {
    let mut world = World::new(sample_types()?);
    let samples = build_samples(&mut world, options.children)?;
    let providers = if options.providers.is_empty() {
        registry.names()
    } else {
        options.providers.clone()
    };

    let mut report = HarnessReport::default();
    for provider in &providers {
        for &mode in &options.modes {
            let read = mode.read_options(options.compression, options.policy);
            let case = Case {
                registry,
                provider,
                read,
                write: WriteOptions::matching(&read),
            };
            for (sample, value) in [
                ("VectorSample", &samples.vector),
                ("ColorSample", &samples.color),
                ("CompoundStruct", &samples.compound),
            ] {
                report.cases.push(case.record(mode, sample, case.struct_round_trip(&mut world, value)));
            }
            for (sample, object) in [("SimpleObject", samples.simple), ("ComplexObject", samples.complex)] {
                report.cases.push(case.record(mode, sample, case.object_round_trip(&mut world, object)));
            }
        }
    }
    info!(
        providers = providers.len(),
        passed = report.passed(),
        failed = report.failed(),
        "harness finished"
    );
    Ok(report)
}

struct Case<'a> {
    registry: &'a ProviderRegistry,
    provider: &'a str,
    read: ReadOptions,
    write: WriteOptions,
}

impl Case<'_> {
    fn struct_round_trip(&self, world: &mut World, value: &StructValue) -> Result<usize, String> {
        let flake = interface::make_struct_flake(self.registry, self.provider, world, value, None, &self.read)
            .map_err(|e| e.to_string())?;
        let copy = interface::create_struct(
            self.registry,
            self.provider,
            world,
            &flake,
            &value.type_path,
            None,
            &self.write,
        )
        .map_err(|e| e.to_string())?;
        compare_structs(&*world, value, &copy, (None, None)).map_err(|e| e.to_string())?;
        Ok(flake.data.len())
    }

    fn object_round_trip(&self, world: &mut World, object: ObjectId) -> Result<usize, String> {
        let flake = interface::make_object_flake(self.registry, self.provider, world, Some(object), &self.read)
            .map_err(|e| e.to_string())?;
        let class = world.class_of(object).map_err(|e| e.to_string())?;
        let copy = interface::create_object(self.registry, self.provider, world, &flake, &class, None, &self.write)
            .map_err(|e| e.to_string())?;
        let compared = compare_objects(&*world, object, copy).map_err(|e| e.to_string());
        if let Err(e) = world.destroy_object(copy) {
            warn!(object = %copy, "failed to discard round-trip copy: {}", e);
        }
        compared.map(|()| flake.data.len())
    }

    fn record(&self, mode: RunMode, sample: &str, outcome: Result<usize, String>) -> CaseResult {
        if let Err(e) = &outcome {
            warn!(provider = self.provider, ?mode, sample, "round trip failed: {}", e);
        }
        CaseResult {
            provider: self.provider.to_string(),
            mode,
            sample: sample.to_string(),
            passed: outcome.is_ok(),
            payload_bytes: outcome.as_ref().copied().unwrap_or_default(),
            error: outcome.err(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_have_owned_children() {
        let mut world = World::new(sample_types().expect("types"));
        let samples = build_samples(&mut world, 3).expect("samples");
        assert_eq!(world.children_of(samples.complex).len(), 4);
        assert_eq!(world.outer_of(samples.simple).expect("outer"), Some(world.transient_package()));
    }

    #[test]
    fn oversized_child_count_is_rejected_before_building() {
        let mut world = World::new(sample_types().expect("types"));
        let before = world.object_count();
        let result = build_samples(&mut world, MAX_ARRAY_LENGTH + 1);
        assert!(matches!(result, Err(FlakesError::Format(_))));
        assert_eq!(world.object_count(), before);
    }

    #[test]
    fn every_builtin_provider_passes() {
        let report = run(&ProviderRegistry::with_builtin(), &HarnessOptions::default()).expect("run");
        // 4 providers × 2 modes × 5 samples.
        assert_eq!(report.cases.len(), 40);
        let failures: Vec<_> = report.cases.iter().filter(|c| !c.passed).collect();
        assert!(failures.is_empty(), "failures: {:?}", failures);
    }

    #[test]
    fn unknown_provider_is_reported_not_raised() {
        let options = HarnessOptions {
            providers: vec!["Yaml".to_string()],
            modes: vec![RunMode::Raw],
            ..HarnessOptions::default()
        };
        let report = run(&ProviderRegistry::with_builtin(), &options).expect("run");
        assert_eq!(report.failed(), 5);
        assert!(!report.all_passed());
        assert!(report.cases[0].error.as_deref().unwrap_or_default().contains("Yaml"));
    }

    #[test]
    fn compressed_payloads_are_smaller_for_large_graphs() {
        let options = HarnessOptions {
            providers: vec!["PrettyJson".to_string()],
            children: 50,
            ..HarnessOptions::default()
        };
        let report = run(&ProviderRegistry::with_builtin(), &options).expect("run");
        let size = |mode| {
            report
                .cases
                .iter()
                .find(|c| c.mode == mode && c.sample == "ComplexObject")
                .map(|c| c.payload_bytes)
                .expect("case")
        };
        assert!(size(RunMode::Compressed) < size(RunMode::Raw));
    }
}
