use std::collections::HashMap;

use super::{BinaryReader, Record, Serializer};
use crate::format::{FormatError, InternalError};
use crate::lut::{Lut, LutSampler};
use crate::mesh::{Mesh, SubMesh};
use crate::model::{Bone, Model};
use crate::pica::Attribute;
use crate::scene::Scene;
use crate::serialization::Reflect;
use crate::texture::Texture;
use crate::material::Material;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Contents,
    Model,
    Bone,
    Mesh,
    SubMesh,
    Attribute,
    Material,
    Texture,
    Lut,
    LutSampler,
}

/// Wire encoding of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    U16,
    I16,
    U32,
    F32,
    Vector3,
    Matrix3x4,
    /// Pointer to a NUL-terminated string; null when absent.
    String,
    /// Pointer and count of an array of records.
    List(TypeKind),
    /// Fixed number of inline u16 values, zero padded.
    U16Array(usize),
    /// Pointer and count of a 16-bit index buffer in raw data.
    Indices,
    /// Pointer and length of a vertex buffer in raw data.
    Bytes,
    /// Pointer and word count of a command stream.
    Commands,
    /// Pointer and count of floats in contents.
    F32List,
    /// Zero bytes on write, skipped on read.
    Padding(usize),
    /// Not part of the linear layout.
    Transient,
}

impl FieldType {
    /// Bytes the field occupies inside its record.
    pub fn inline_size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::F32 | Self::String => 4,
            Self::Vector3 => 12,
            Self::Matrix3x4 => 48,
            Self::List(_) | Self::Indices | Self::Bytes | Self::Commands | Self::F32List => 8,
            Self::U16Array(count) => count * 2,
            Self::Padding(count) => *count,
            Self::Transient => 0,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            Self::String
                | Self::List(_)
                | Self::Indices
                | Self::Bytes
                | Self::Commands
                | Self::F32List
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
}

pub fn field(name: &'static str, ty: FieldType) -> FieldDef {
    FieldDef { name, ty }
}

/// Per-type serialization hook for entities that do not map linearly to
/// their fields.
pub trait CustomLayout {
    /// Runs before the default layout is written at `offset`. Returning
    /// `true` means the hook wrote the whole record and the default layout is
    /// skipped.
    fn serialize(
        &self,
        record: &mut Record,
        serializer: &mut Serializer<'_>,
        offset: usize,
    ) -> Result<bool, FormatError>;

    /// Runs after the default fields were read; fills derived fields.
    fn deserialize(&self, record: &mut Record, reader: &mut BinaryReader<'_>)
        -> Result<(), FormatError>;
}

pub enum Layout {
    Default,
    Custom(Box<dyn CustomLayout>),
}

pub struct TypeDef {
    pub kind: TypeKind,
    pub fields: Vec<FieldDef>,
    pub layout: Layout,
    size: usize,
}

impl TypeDef {
    pub fn new(kind: TypeKind, fields: Vec<FieldDef>) -> Self {
        let mut size = 0;
        for field in &fields {
            debug_assert!(
                !field.ty.is_pointer() || size % 4 == 0,
                "{kind:?}.{} is not word aligned",
                field.name
            );
            size += field.ty.inline_size();
        }
        debug_assert!(size % 4 == 0, "{kind:?} size {size} is not word aligned");

        Self {
            kind,
            fields,
            layout: Layout::Default,
            size,
        }
    }

    pub fn with_layout(mut self, layout: impl CustomLayout + 'static) -> Self {
        self.layout = Layout::Custom(Box::new(layout));
        self
    }

    /// Inline size of one record.
    pub fn size(&self) -> usize {
        self.size
    }
}

#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<TypeKind, TypeDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every container entity.
    pub fn h3d() -> Self {
        let mut registry = Self::new();
        registry.register_type::<Scene>();
        registry.register_type::<Model>();
        registry.register_type::<Bone>();
        registry.register_type::<Mesh>();
        registry.register_type::<SubMesh>();
        registry.register_type::<Attribute>();
        registry.register_type::<Material>();
        registry.register_type::<Texture>();
        registry.register_type::<Lut>();
        registry.register_type::<LutSampler>();
        registry
    }

    pub fn register(&mut self, def: TypeDef) {
        self.types.insert(def.kind, def);
    }

    pub fn register_type<T: Reflect>(&mut self) {
        self.register(T::type_def());
    }

    pub fn get(&self, kind: TypeKind) -> Result<&TypeDef, InternalError> {
        self.types
            .get(&kind)
            .ok_or(InternalError::UnregisteredType(kind))
    }
}
