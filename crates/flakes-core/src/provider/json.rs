//! JSON providers: `Json` (compact) and `PrettyJson` (indented).
//!
//! The root of every payload is a JSON object keyed by field name. Owned
//! sub-objects nest as objects carrying `_ClassName`; external references are
//! path strings.

use super::SerializationProvider;
use crate::ownership::OwnershipPolicy;
use crate::types::{FlakesError, ObjectId};
use crate::value::StructValue;
use crate::walker::{JsonReader, JsonWriter};
use crate::world::ObjectStore;
use serde_json::{Map, Value as Json};

fn encode(map: Map<String, Json>, pretty: bool) -> Result<Vec<u8>, FlakesError> {
    let root = Json::Object(map);
    let bytes = if pretty {
        serde_json::to_vec_pretty(&root)
    } else {
        serde_json::to_vec(&root)
    };
    bytes.map_err(|e| FlakesError::SerializationError(format!("JSON: {}", e)))
}

fn decode(data: &[u8]) -> Result<Map<String, Json>, FlakesError> {
    match serde_json::from_slice::<Json>(data) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(_) => Err(FlakesError::Format("JSON payload root is not an object".to_string())),
        Err(e) => Err(FlakesError::Format(format!("JSON: {}", e))),
    }
}

fn read_object_json(
    store: &dyn ObjectStore,
    object: ObjectId,
    policy: OwnershipPolicy,
    pretty: bool,
) -> Result<Vec<u8>, FlakesError> {
    let class = store.class_of(object)?;
    let mut writer = JsonWriter::new(store, Some(object), policy);
    let map = writer.write_fields(&class, store.fields(object)?)?;
    encode(map, pretty)
}

fn read_struct_json(
    store: &dyn ObjectStore,
    value: &StructValue,
    owner: Option<ObjectId>,
    policy: OwnershipPolicy,
    pretty: bool,
) -> Result<Vec<u8>, FlakesError> {
    let mut writer = JsonWriter::new(store, owner, policy);
    let map = writer.write_fields(&value.type_path, &value.fields)?;
    encode(map, pretty)
}

fn write_object_json(
    store: &mut dyn ObjectStore,
    object: ObjectId,
    data: &[u8],
) -> Result<(), FlakesError> {
    let map = decode(data)?;
    let class = store.class_of(object)?;
    let mut fields = store.fields(object)?.clone();
    JsonReader::new(store, Some(object)).read_fields(&class, &map, &mut fields)?;
    store.set_fields(object, fields)
}

fn write_struct_json(
    store: &mut dyn ObjectStore,
    value: &mut StructValue,
    data: &[u8],
    owner: Option<ObjectId>,
) -> Result<(), FlakesError> {
    let map = decode(data)?;
    let type_path = value.type_path.clone();
    JsonReader::new(store, owner).read_fields(&type_path, &map, &mut value.fields)
}

// =============================================================================
// JSON
// =============================================================================

/// Compact JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProvider;

impl SerializationProvider for JsonProvider {
    fn name(&self) -> &str {
        "Json"
    }

    fn read_object(
        &self,
        store: &dyn ObjectStore,
        object: ObjectId,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError> {
        read_object_json(store, object, policy, false)
    }

    fn read_struct(
        &self,
        store: &dyn ObjectStore,
        value: &StructValue,
        owner: Option<ObjectId>,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError> {
        read_struct_json(store, value, owner, policy, false)
    }

    fn write_object(
        &self,
        store: &mut dyn ObjectStore,
        object: ObjectId,
        data: &[u8],
    ) -> Result<(), FlakesError> {
        write_object_json(store, object, data)
    }

    fn write_struct(
        &self,
        store: &mut dyn ObjectStore,
        value: &mut StructValue,
        data: &[u8],
        owner: Option<ObjectId>,
    ) -> Result<(), FlakesError> {
        write_struct_json(store, value, data, owner)
    }
}

// =============================================================================
// PRETTY JSON
// =============================================================================

/// Indented JSON codec for human inspection. Reads anything `Json` reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrettyJsonProvider;

impl SerializationProvider for PrettyJsonProvider {
    fn name(&self) -> &str {
        "PrettyJson"
    }

    fn read_object(
        &self,
        store: &dyn ObjectStore,
        object: ObjectId,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError> {
        read_object_json(store, object, policy, true)
    }

    fn read_struct(
        &self,
        store: &dyn ObjectStore,
        value: &StructValue,
        owner: Option<ObjectId>,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError> {
        read_struct_json(store, value, owner, policy, true)
    }

    fn write_object(
        &self,
        store: &mut dyn ObjectStore,
        object: ObjectId,
        data: &[u8],
    ) -> Result<(), FlakesError> {
        write_object_json(store, object, data)
    }

    fn write_struct(
        &self,
        store: &mut dyn ObjectStore,
        value: &mut StructValue,
        data: &[u8],
        owner: Option<ObjectId>,
    ) -> Result<(), FlakesError> {
        write_struct_json(store, value, data, owner)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_object_root_is_rejected() {
        assert!(matches!(decode(b"[1,2]"), Err(FlakesError::Format(_))));
        assert!(matches!(decode(b"not json"), Err(FlakesError::Format(_))));
        assert!(decode(b"{}").expect("empty object").is_empty());
    }

    #[test]
    fn pretty_output_is_indented() {
        let mut map = Map::new();
        map.insert("A".to_string(), Json::from(1));
        let compact = encode(map.clone(), false).expect("compact");
        let pretty = encode(map, true).expect("pretty");
        assert_eq!(compact, b"{\"A\":1}");
        assert!(pretty.contains(&b'\n'));
    }
}
