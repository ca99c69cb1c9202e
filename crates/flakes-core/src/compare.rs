//! # Graph Comparison
//!
//! Deep structural equality between an original value and its reconstruction.
//!
//! Plain values must be equal. A reference the original owns must point to
//! a different object owned by the copy, and the two sub-objects are
//! compared recursively. Any other reference must point to the very same
//! object (or both be null).

use crate::types::{FlakesError, ObjectId};
use crate::value::{StructValue, Value};
use crate::world::ObjectStore;
use thiserror::Error;

/// First difference found, located by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {detail}")]
pub struct Mismatch {
    pub path: String,
    pub detail: String,
}

impl Mismatch {
    fn new(path: &str, detail: impl Into<String>) -> Self {
        Self {
            path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
            detail: detail.into(),
        }
    }
}

impl From<FlakesError> for Mismatch {
    fn from(e: FlakesError) -> Self {
        Self::new("", e.to_string())
    }
}

/// Compare an object graph against its copy in the same store.
pub fn compare_objects(store: &dyn ObjectStore, original: ObjectId, copy: ObjectId) -> Result<(), Mismatch> {
    Comparer { store }.objects("", original, copy)
}

/// Compare a struct value against its copy. `owners` are the objects that
/// own references inside each value, if any.
pub fn compare_structs(
    store: &dyn ObjectStore,
    original: &StructValue,
    copy: &StructValue,
    owners: (Option<ObjectId>, Option<ObjectId>),
) -> Result<(), Mismatch> {
    Comparer { store }.structs("", original, copy, owners)
}

struct Comparer<'s> {
    store: &'s dyn ObjectStore,
}

impl Comparer<'_> {
    fn objects(&self, path: &str, a: ObjectId, b: ObjectId) -> Result<(), Mismatch> {
        let class_a = self.store.class_of(a)?;
        let class_b = self.store.class_of(b)?;
        if class_a != class_b {
            return Err(Mismatch::new(path, format!("class {} != {}", class_a, class_b)));
        }
        let fields_a = self.store.fields(a)?;
        let fields_b = self.store.fields(b)?;
        for (name, value_a) in fields_a {
            let field_path = join(path, name);
            let value_b = fields_b
                .get(name)
                .ok_or_else(|| Mismatch::new(&field_path, "missing in copy"))?;
            self.values(&field_path, value_a, value_b, (Some(a), Some(b)))?;
        }
        if fields_b.len() != fields_a.len() {
            return Err(Mismatch::new(path, "copy has extra fields"));
        }
        Ok(())
    }

    fn structs(
        &self,
        path: &str,
        a: &StructValue,
        b: &StructValue,
        owners: (Option<ObjectId>, Option<ObjectId>),
    ) -> Result<(), Mismatch> {
        if a.type_path != b.type_path {
            return Err(Mismatch::new(path, format!("struct {} != {}", a.type_path, b.type_path)));
        }
        for (name, value_a) in &a.fields {
            let field_path = join(path, name);
            let value_b = b
                .get(name)
                .ok_or_else(|| Mismatch::new(&field_path, "missing in copy"))?;
            self.values(&field_path, value_a, value_b, owners)?;
        }
        if b.fields.len() != a.fields.len() {
            return Err(Mismatch::new(path, "copy has extra fields"));
        }
        Ok(())
    }

    fn values(
        &self,
        path: &str,
        a: &Value,
        b: &Value,
        owners: (Option<ObjectId>, Option<ObjectId>),
    ) -> Result<(), Mismatch> {
        match (a, b) {
            (Value::Object(ra), Value::Object(rb)) => self.references(path, *ra, *rb, owners),
            (Value::Struct(sa), Value::Struct(sb)) => self.structs(path, sa, sb, owners),
            (Value::Instanced(sa), Value::Instanced(sb)) => match (sa, sb) {
                (None, None) => Ok(()),
                (Some(sa), Some(sb)) => self.structs(path, sa, sb, owners),
                _ => Err(Mismatch::new(path, "instanced struct presence differs")),
            },
            (Value::Array(ea), Value::Array(eb)) => {
                if ea.len() != eb.len() {
                    return Err(Mismatch::new(path, format!("length {} != {}", ea.len(), eb.len())));
                }
                for (i, (x, y)) in ea.iter().zip(eb).enumerate() {
                    self.values(&format!("{}[{}]", path, i), x, y, owners)?;
                }
                Ok(())
            }
            (Value::Float(x), Value::Float(y)) => floats(path, &[(*x, *y)]),
            (Value::Vector(x), Value::Vector(y)) => floats(path, &[(x.x, y.x), (x.y, y.y), (x.z, y.z)]),
            (Value::Color(x), Value::Color(y)) => floats(
                path,
                &[(x.r, y.r), (x.g, y.g), (x.b, y.b), (x.a, y.a)].map(|(p, q)| (f64::from(p), f64::from(q))),
            ),
            _ if a == b => Ok(()),
            _ => Err(Mismatch::new(path, format!("{:?} != {:?}", a, b))),
        }
    }

    fn references(
        &self,
        path: &str,
        a: Option<ObjectId>,
        b: Option<ObjectId>,
        (owner_a, owner_b): (Option<ObjectId>, Option<ObjectId>),
    ) -> Result<(), Mismatch> {
        let Some(a) = a else {
            return match b {
                None => Ok(()),
                Some(b) => Err(Mismatch::new(path, format!("null != {}", b))),
            };
        };
        let owned = owner_a.is_some() && self.store.outer_of(a).ok().flatten() == owner_a;
        if !owned {
            return if b == Some(a) {
                Ok(())
            } else {
                Err(Mismatch::new(path, format!("external reference {} not preserved", a)))
            };
        }

        let Some(b) = b else {
            return Err(Mismatch::new(path, "owned object missing in copy"));
        };
        if a == b {
            return Err(Mismatch::new(path, "owned object shared instead of copied"));
        }
        if owner_b.is_some() && self.store.outer_of(b).ok().flatten() != owner_b {
            return Err(Mismatch::new(path, "copied object has the wrong outer"));
        }
        self.objects(path, a, b)
    }
}

/// NaN matches NaN, and zero keeps its sign.
fn same_float(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || (a == b && a.is_sign_negative() == b.is_sign_negative())
}

fn floats(path: &str, pairs: &[(f64, f64)]) -> Result<(), Mismatch> {
    match pairs.iter().find(|(a, b)| !same_float(*a, *b)) {
        Some((a, b)) => Err(Mismatch::new(path, format!("{:?} != {:?}", a, b))),
        None => Ok(()),
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

// =============================================================================
// TESTS
// =============================================================================
