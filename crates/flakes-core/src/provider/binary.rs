//! Binary providers: `Binary` (fixed-width) and `NetBinary` (varint).
//!
//! Both run the same binary walker and differ only in the archive they
//! write through.

use super::SerializationProvider;
use crate::archive::{ArchiveReader, ArchiveWriter, FixedReader, FixedWriter, VarintReader, VarintWriter};
use crate::ownership::OwnershipPolicy;
use crate::types::{FlakesError, ObjectId};
use crate::value::StructValue;
use crate::walker::{BinaryReader, BinaryWriter};
use crate::world::ObjectStore;

fn read_object_with<A: ArchiveWriter>(
    archive: A,
    store: &dyn ObjectStore,
    object: ObjectId,
    policy: OwnershipPolicy,
) -> Result<Vec<u8>, FlakesError> {
    let class = store.class_of(object)?;
    let mut writer = BinaryWriter::new(store, archive, Some(object), policy);
    writer.write_fields(&class, store.fields(object)?)?;
    tracing::trace!(object = %object, owned = writer.owned_count(), "object serialized");
    Ok(writer.finish())
}

fn read_struct_with<A: ArchiveWriter>(
    archive: A,
    store: &dyn ObjectStore,
    value: &StructValue,
    owner: Option<ObjectId>,
    policy: OwnershipPolicy,
) -> Result<Vec<u8>, FlakesError> {
    let mut writer = BinaryWriter::new(store, archive, owner, policy);
    writer.write_fields(&value.type_path, &value.fields)?;
    Ok(writer.finish())
}

fn write_object_with<R: ArchiveReader>(
    archive: R,
    store: &mut dyn ObjectStore,
    object: ObjectId,
) -> Result<(), FlakesError> {
    let class = store.class_of(object)?;
    let mut fields = store.fields(object)?.clone();
    let mut reader = BinaryReader::new(store, archive, Some(object));
    reader.read_fields(&class, &mut fields)?;
    reader.finish()?;
    store.set_fields(object, fields)
}

fn write_struct_with<R: ArchiveReader>(
    archive: R,
    store: &mut dyn ObjectStore,
    value: &mut StructValue,
    owner: Option<ObjectId>,
) -> Result<(), FlakesError> {
    let type_path = value.type_path.clone();
    let mut reader = BinaryReader::new(store, archive, owner);
    reader.read_fields(&type_path, &mut value.fields)?;
    reader.finish()
}

// =============================================================================
// BINARY
// =============================================================================

/// Compact fixed-width binary codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryProvider;

impl SerializationProvider for BinaryProvider {
    fn name(&self) -> &str {
        "Binary"
    }

    fn read_object(
        &self,
        store: &dyn ObjectStore,
        object: ObjectId,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError> {
        read_object_with(FixedWriter::new(), store, object, policy)
    }

    fn read_struct(
        &self,
        store: &dyn ObjectStore,
        value: &StructValue,
        owner: Option<ObjectId>,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError> {
        read_struct_with(FixedWriter::new(), store, value, owner, policy)
    }

    fn write_object(
        &self,
        store: &mut dyn ObjectStore,
        object: ObjectId,
        data: &[u8],
    ) -> Result<(), FlakesError> {
        write_object_with(FixedReader::new(data), store, object)
    }

    fn write_struct(
        &self,
        store: &mut dyn ObjectStore,
        value: &mut StructValue,
        data: &[u8],
        owner: Option<ObjectId>,
    ) -> Result<(), FlakesError> {
        write_struct_with(FixedReader::new(data), store, value, owner)
    }
}

// =============================================================================
// NET BINARY
// =============================================================================

/// Binary codec with varint integers and lengths, tuned for transmission.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetBinaryProvider;

impl SerializationProvider for NetBinaryProvider {
    fn name(&self) -> &str {
        "NetBinary"
    }

    fn read_object(
        &self,
        store: &dyn ObjectStore,
        object: ObjectId,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError> {
        read_object_with(VarintWriter::new(), store, object, policy)
    }

    fn read_struct(
        &self,
        store: &dyn ObjectStore,
        value: &StructValue,
        owner: Option<ObjectId>,
        policy: OwnershipPolicy,
    ) -> Result<Vec<u8>, FlakesError> {
        read_struct_with(VarintWriter::new(), store, value, owner, policy)
    }

    fn write_object(
        &self,
        store: &mut dyn ObjectStore,
        object: ObjectId,
        data: &[u8],
    ) -> Result<(), FlakesError> {
        write_object_with(VarintReader::new(data), store, object)
    }

    fn write_struct(
        &self,
        store: &mut dyn ObjectStore,
        value: &mut StructValue,
        data: &[u8],
        owner: Option<ObjectId>,
    ) -> Result<(), FlakesError> {
        write_struct_with(VarintReader::new(data), store, value, owner)
    }
}
