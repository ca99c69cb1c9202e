//! Text-tree graph walker.
//!
//! Renders a value as a `serde_json::Value` tree and reads it back.
//!
//! - owned sub-object: `{"_ClassName": "/Script/...", ...fields}`
//! - external object: `"Package.Object"` path string
//! - instanced struct: `{"_StructName": "/Script/...", ...fields}`
//! - null reference or empty instanced struct: `null`
//! - NaN and infinite floats: `"nan"`, `"inf"`, `"-inf"`
//!
//! Reading is lenient about shape: missing keys keep their current value and
//! unknown keys are ignored. A key holding the wrong JSON kind is an error.

use crate::ownership::{OwnershipPolicy, OwnershipTracker, RefMarker};
use crate::primitives::{CLASS_NAME_KEY, MAX_GRAPH_DEPTH, STRUCT_NAME_KEY};
use crate::reflect::{FieldType, TypeKind, TypeRegistry};
use crate::types::{FlakesError, ObjectId, ObjectPath, TypePath};
use crate::value::{Color, FieldMap, Value, Vector};
use crate::world::ObjectStore;
use serde_json::{Map, Number, Value as Json};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

fn mismatch(ty: &FieldType, found: &Json) -> FlakesError {
    let kind = match found {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    };
    FlakesError::Format(format!("expected {:?}, found JSON {}", ty, kind))
}

// JSON numbers cannot hold these, so they travel as tagged strings.
const POS_INF_TAG: &str = "inf";
const NEG_INF_TAG: &str = "-inf";
const NAN_TAG: &str = "nan";

fn float_to_json(f: f64) -> Json {
    match Number::from_f64(f) {
        Some(n) => Json::Number(n),
        None if f.is_nan() => Json::String(NAN_TAG.to_string()),
        None if f > 0.0 => Json::String(POS_INF_TAG.to_string()),
        None => Json::String(NEG_INF_TAG.to_string()),
    }
}

fn float_from_json(json: &Json) -> Option<f64> {
    match json {
        Json::String(tag) => match tag.as_str() {
            POS_INF_TAG => Some(f64::INFINITY),
            NEG_INF_TAG => Some(f64::NEG_INFINITY),
            NAN_TAG => Some(f64::NAN),
            _ => None,
        },
        other => other.as_f64(),
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Renders a value and its owned sub-graph as a JSON tree.
pub struct JsonWriter<'s> {
    store: &'s dyn ObjectStore,
    types: Arc<TypeRegistry>,
    tracker: OwnershipTracker,
    depth: usize,
}

impl<'s> JsonWriter<'s> {
    pub fn new(store: &'s dyn ObjectStore, owner: Option<ObjectId>, policy: OwnershipPolicy) -> Self {
        Self {
            types: store.types(),
            store,
            tracker: OwnershipTracker::new(owner, policy),
            depth: 0,
        }
    }

    /// Render every field of `type_path` as a JSON object, in declared order.
    pub fn write_fields(
        &mut self,
        type_path: &TypePath,
        fields: &FieldMap,
    ) -> Result<Map<String, Json>, FlakesError> {
        let mut out = Map::new();
        self.write_fields_into(type_path, fields, &mut out)?;
        Ok(out)
    }

    fn write_fields_into(
        &mut self,
        type_path: &TypePath,
        fields: &FieldMap,
        out: &mut Map<String, Json>,
    ) -> Result<(), FlakesError> {
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
            let json = match fields.get(&def.name) {
                Some(value) => self.write_value(&def.ty, value)?,
                None => self.write_value(&def.ty, &def.ty.default_value(&types))?,
            };
            out.insert(def.name.clone(), json);
        }

        self.depth -= 1;
        Ok(())
    }

    fn write_value(&mut self, ty: &FieldType, value: &Value) -> Result<Json, FlakesError> {
        Ok(match (ty, value) {
            (FieldType::Bool, Value::Bool(b)) => Json::Bool(*b),
            (FieldType::Int, Value::Int(i)) => Json::from(*i),
            (FieldType::Float, Value::Float(f)) => float_to_json(*f),
            (FieldType::Str, Value::Str(s)) => Json::String(s.clone()),
            (FieldType::Vector, Value::Vector(v)) => {
                let mut map = Map::new();
                map.insert("x".into(), float_to_json(v.x));
                map.insert("y".into(), float_to_json(v.y));
                map.insert("z".into(), float_to_json(v.z));
                Json::Object(map)
            }
            (FieldType::Color, Value::Color(c)) => {
                let mut map = Map::new();
                map.insert("r".into(), float_to_json(f64::from(c.r)));
                map.insert("g".into(), float_to_json(f64::from(c.g)));
                map.insert("b".into(), float_to_json(f64::from(c.b)));
                map.insert("a".into(), float_to_json(f64::from(c.a)));
                Json::Object(map)
            }
            (FieldType::Guid, Value::Guid(g)) => Json::String(g.hyphenated().to_string()),
            (FieldType::Struct(path), Value::Struct(s)) => {
                Json::Object(self.write_fields(path, &s.fields)?)
            }
            (FieldType::InstancedStruct(_), Value::Instanced(None)) => Json::Null,
            (FieldType::InstancedStruct(base), Value::Instanced(Some(s))) => {
                if !self.types.is_child_of(&s.type_path, base) {
                    return Err(FlakesError::TypeMismatch {
                        found: s.type_path.to_string(),
                        expected: base.to_string(),
                    });
                }
                let mut map = Map::new();
                map.insert(STRUCT_NAME_KEY.into(), Json::String(s.type_path.to_string()));
                self.write_fields_into(&s.type_path, &s.fields, &mut map)?;
                Json::Object(map)
            }
            (FieldType::Object(_), Value::Object(target)) => self.write_object_ref(*target)?,
            (FieldType::SoftObject, Value::SoftObject(path)) => path
                .as_ref()
                .map(|p| Json::String(p.to_string()))
                .unwrap_or(Json::Null),
            (FieldType::Array(inner), Value::Array(items)) => Json::Array(
                items
                    .iter()
                    .map(|item| self.write_value(inner, item))
                    .collect::<Result<_, _>>()?,
            ),
            (ty, value) => {
                return Err(FlakesError::Format(format!(
                    "field of type {:?} cannot hold a {}",
                    ty,
                    value.kind_name()
                )));
            }
        })
    }

    fn write_object_ref(&mut self, target: Option<ObjectId>) -> Result<Json, FlakesError> {
        let Some(id) = target else {
            return Ok(Json::Null);
        };
        if !self.store.contains(id) {
            warn!(object = %id, "dangling object reference written as null");
            return Ok(Json::Null);
        }

        let store = self.store;
        match self.tracker.classify(store, id) {
            RefMarker::Owned => {
                let class = store.class_of(id)?;
                let mut map = Map::new();
                map.insert(CLASS_NAME_KEY.into(), Json::String(class.to_string()));
                self.tracker.enter(id)?;
                self.write_fields_into(&class, store.fields(id)?, &mut map)?;
                self.tracker.leave();
                Ok(Json::Object(map))
            }
            RefMarker::External => Ok(Json::String(store.path_of(id)?.to_string())),
            RefMarker::NoReference => Ok(Json::Null),
        }
    }
}

// =============================================================================
// READER
// =============================================================================

/// Applies a JSON tree to values, constructing owned sub-objects.
pub struct JsonReader<'s> {
    store: &'s mut dyn ObjectStore,
    types: Arc<TypeRegistry>,
    tracker: OwnershipTracker,
    depth: usize,
}

impl<'s> JsonReader<'s> {
    pub fn new(store: &'s mut dyn ObjectStore, owner: Option<ObjectId>) -> Self {
        Self {
            types: store.types(),
            store,
            tracker: OwnershipTracker::new(owner, OwnershipPolicy::default()),
            depth: 0,
        }
    }

    /// Merge the keys of `map` into `fields` according to `type_path`.
    pub fn read_fields(
        &mut self,
        type_path: &TypePath,
        map: &Map<String, Json>,
        fields: &mut FieldMap,
    ) -> Result<(), FlakesError> {
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
            let Some(json) = map.get(&def.name) else {
                continue;
            };
            let current = fields.remove(&def.name);
            let value = self.read_value(&def.ty, json, current).inspect_err(|_| {
                debug!(type_path = %type_path, field = %def.name, "field read failed");
            })?;
            fields.insert(def.name.clone(), value);
        }

        self.depth -= 1;
        Ok(())
    }

    fn read_float(ty: &FieldType, json: &Json) -> Result<f64, FlakesError> {
        float_from_json(json).ok_or_else(|| mismatch(ty, json))
    }

    fn read_components<const N: usize>(
        ty: &FieldType,
        json: &Json,
        keys: [&str; N],
        mut current: [f64; N],
    ) -> Result<[f64; N], FlakesError> {
        let map = json.as_object().ok_or_else(|| mismatch(ty, json))?;
        for (slot, key) in current.iter_mut().zip(keys) {
            if let Some(component) = map.get(key) {
                *slot = Self::read_float(ty, component)?;
            }
        }
        Ok(current)
    }

    fn read_value(
        &mut self,
        ty: &FieldType,
        json: &Json,
        current: Option<Value>,
    ) -> Result<Value, FlakesError> {
        Ok(match ty {
            FieldType::Bool => Value::Bool(json.as_bool().ok_or_else(|| mismatch(ty, json))?),
            FieldType::Int => Value::Int(json.as_i64().ok_or_else(|| mismatch(ty, json))?),
            FieldType::Float => Value::Float(Self::read_float(ty, json)?),
            FieldType::Str => Value::Str(json.as_str().ok_or_else(|| mismatch(ty, json))?.to_string()),
            FieldType::Vector => {
                let base = current.and_then(|v| v.as_vector()).unwrap_or_default();
                let [x, y, z] = Self::read_components(ty, json, ["x", "y", "z"], [base.x, base.y, base.z])?;
                Value::Vector(Vector { x, y, z })
            }
            FieldType::Color => {
                let base = match current {
                    Some(Value::Color(c)) => c,
                    _ => Color::default(),
                };
                let [r, g, b, a] = Self::read_components(
                    ty,
                    json,
                    ["r", "g", "b", "a"],
                    [f64::from(base.r), f64::from(base.g), f64::from(base.b), f64::from(base.a)],
                )?;
                Value::Color(Color {
                    r: r as f32,
                    g: g as f32,
                    b: b as f32,
                    a: a as f32,
                })
            }
            FieldType::Guid => {
                let text = json.as_str().ok_or_else(|| mismatch(ty, json))?;
                Value::Guid(Uuid::parse_str(text).map_err(|e| FlakesError::Format(e.to_string()))?)
            }
            FieldType::Struct(path) => {
                let map = json.as_object().ok_or_else(|| mismatch(ty, json))?;
                let mut value = match current {
                    Some(Value::Struct(s)) if &s.type_path == path => s,
                    _ => self.types.default_struct(path)?,
                };
                self.read_fields(path, map, &mut value.fields)?;
                Value::Struct(value)
            }
            FieldType::InstancedStruct(base) => match json {
                Json::Null => Value::Instanced(None),
                Json::Object(map) => {
                    let name = map
                        .get(STRUCT_NAME_KEY)
                        .and_then(Json::as_str)
                        .ok_or_else(|| FlakesError::Format(format!("instanced struct without {}", STRUCT_NAME_KEY)))?;
                    let path = TypePath::new(name);
                    self.types.resolve_kind(&path, TypeKind::Struct)?;
                    if !self.types.is_child_of(&path, base) {
                        return Err(FlakesError::TypeMismatch {
                            found: path.to_string(),
                            expected: base.to_string(),
                        });
                    }
                    let mut value = self.types.default_struct(&path)?;
                    self.read_fields(&path, map, &mut value.fields)?;
                    Value::Instanced(Some(value))
                }
                other => return Err(mismatch(ty, other)),
            },
            FieldType::Object(declared) => Value::Object(self.read_object_ref(ty, declared, json)?),
            FieldType::SoftObject => match json {
                Json::Null => Value::SoftObject(None),
                Json::String(s) if s.is_empty() => Value::SoftObject(None),
                Json::String(s) => Value::SoftObject(Some(ObjectPath::new(s.clone()))),
                other => return Err(mismatch(ty, other)),
            },
            FieldType::Array(inner) => {
                let items = json.as_array().ok_or_else(|| mismatch(ty, json))?;
                Value::Array(
                    items
                        .iter()
                        .map(|item| self.read_value(inner, item, None))
                        .collect::<Result<_, _>>()?,
                )
            }
        })
    }

    fn read_object_ref(
        &mut self,
        ty: &FieldType,
        declared: &TypePath,
        json: &Json,
    ) -> Result<Option<ObjectId>, FlakesError> {
        match json {
            Json::Null => Ok(None),
            Json::String(path) => {
                let path = ObjectPath::new(path.clone());
                let resolved = self.store.resolve_path(&path);
                if resolved.is_none() {
                    debug!(path = %path, "external reference did not resolve; leaving null");
                }
                Ok(resolved)
            }
            Json::Object(map) => {
                let class = map
                    .get(CLASS_NAME_KEY)
                    .and_then(Json::as_str)
                    .map(TypePath::new)
                    .ok_or_else(|| FlakesError::Format(format!("owned object without {}", CLASS_NAME_KEY)))?;
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
                self.read_fields(&class, map, &mut fields)?;
                self.store.set_fields(id, fields)?;
                self.tracker.leave();
                Ok(Some(id))
            }
            other => Err(mismatch(ty, other)),
        }
    }
}
