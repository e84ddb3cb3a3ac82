//! Table-driven binary serialization.
//!
//! Entities convert themselves to and from [`Record`]s, ordered bags of named
//! [`Value`]s. A [`TypeRegistry`] maps each [`TypeKind`] to its wire layout: the
//! field order, the field encodings and an optional [`CustomLayout`] hook.
//! [`Serializer`] walks records breadth-first and emits the container
//! sections plus a [`RelocationTable`]; [`Deserializer`] follows the patched
//! absolute pointers back.

mod reader;
mod registry;
mod relocation;
mod writer;

pub use reader::{BinaryReader, Deserializer};
pub use registry::{field, CustomLayout, FieldDef, FieldType, Layout, TypeDef, TypeKind, TypeRegistry};
pub use relocation::{RelocationEntry, RelocationKind, RelocationTable, Section};
pub use writer::{SerializedSections, Serializer, RAW_DATA_ALIGNMENT};

use h3d_common::Matrix3x4;

use crate::format::{FormatError, InternalError};

/// Words of a GPU command stream. `raw_refs` lists word indices whose value
/// is an offset into the raw data section and must be relocated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBlob {
    pub words: Vec<u32>,
    pub raw_refs: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    I16(i16),
    U32(u32),
    F32(f32),
    Vector3([f32; 3]),
    Matrix3x4(Matrix3x4),
    String(Option<String>),
    List(Vec<Record>),
    U16Array(Vec<u16>),
    Indices(Vec<u16>),
    Bytes(Vec<u8>),
    Commands(CommandBlob),
    F32List(Vec<f32>),
    /// Only carried by transient fields.
    Faces(Vec<Vec<u8>>),
}

/// Field values of one entity, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: TypeKind,
    fields: Vec<(&'static str, Value)>,
}

macro_rules! take_as {
    ($(#[$meta:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $name(&mut self, field: &'static str) -> Result<$ty, InternalError> {
            match self.take(field)? {
                Value::$variant(value) => Ok(value),
                _ => Err(InternalError::FieldTypeMismatch {
                    kind: self.kind,
                    field,
                }),
            }
        }
    };
}

impl Record {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    /// Builder form of [`Record::set`].
    pub fn with(mut self, field: &'static str, value: Value) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &'static str, value: Value) {
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    pub fn take(&mut self, field: &'static str) -> Result<Value, InternalError> {
        let index = self
            .fields
            .iter()
            .position(|(name, _)| *name == field)
            .ok_or(InternalError::MissingField {
                kind: self.kind,
                field,
            })?;
        Ok(self.fields.remove(index).1)
    }

    take_as!(take_u8, U8, u8);
    take_as!(take_u16, U16, u16);
    take_as!(take_i16, I16, i16);
    take_as!(take_u32, U32, u32);
    take_as!(take_f32, F32, f32);
    take_as!(take_vector3, Vector3, [f32; 3]);
    take_as!(take_matrix, Matrix3x4, Matrix3x4);
    take_as!(take_string, String, Option<String>);
    take_as!(take_list, List, Vec<Record>);
    take_as!(take_u16_array, U16Array, Vec<u16>);
    take_as!(take_indices, Indices, Vec<u16>);
    take_as!(take_bytes, Bytes, Vec<u8>);
    take_as!(take_commands, Commands, CommandBlob);
    take_as!(take_f32_list, F32List, Vec<f32>);
    take_as!(take_faces, Faces, Vec<Vec<u8>>);

    /// Name field, empty when null.
    pub fn take_name(&mut self, field: &'static str) -> Result<String, InternalError> {
        Ok(self.take_string(field)?.unwrap_or_default())
    }
}

/// An entity with a registered wire layout.
pub trait Reflect: Sized {
    const KIND: TypeKind;

    /// Wire layout of this entity.
    fn type_def() -> TypeDef;

    fn to_record(&self) -> Result<Record, FormatError>;

    fn from_record(record: Record) -> Result<Self, FormatError>;
}

pub fn list_value<T: Reflect>(items: &[T]) -> Result<Value, FormatError> {
    let records = items
        .iter()
        .map(Reflect::to_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::List(records))
}

pub fn list_items<T: Reflect>(records: Vec<Record>) -> Result<Vec<T>, FormatError> {
    records.into_iter().map(T::from_record).collect()
}

/// Optional string value; empty names are written as null.
pub fn name_value(name: &str) -> Value {
    if name.is_empty() {
        Value::String(None)
    } else {
        Value::String(Some(name.to_string()))
    }
}
