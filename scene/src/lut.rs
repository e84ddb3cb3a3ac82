use bitflags::bitflags;

use crate::format::FormatError;
use crate::serialization::{
    field, list_items, list_value, name_value, FieldType, Record, Reflect, TypeDef, TypeKind,
    Value,
};

/// Entries in one lookup table sampler.
pub const LUT_SIZE: usize = 256;

/// Names the converter binds materials to.
pub const CEL_SHADING_TABLE: &str = "SpecTable";
pub const CEL_SHADING_SAMPLER: &str = "SpecSampler";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LutSamplerFlags: u8 {
        /// Input is `|x|` instead of `x` in -1..1.
        const IS_ABSOLUTE = 1 << 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LutSampler {
    pub name: String,
    pub flags: LutSamplerFlags,
    pub table: Vec<f32>,
}

/// A named set of fragment lighting lookup tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Lut {
    pub name: String,
    pub samplers: Vec<LutSampler>,
}

impl Lut {
    /// Two-band step table used for toon specular highlights.
    pub fn cel_shading() -> Self {
        let table = (0..LUT_SIZE)
            .map(|i| if i < LUT_SIZE / 2 { 0.0 } else { 1.0 })
            .collect();

        Self {
            name: CEL_SHADING_TABLE.to_string(),
            samplers: vec![LutSampler {
                name: CEL_SHADING_SAMPLER.to_string(),
                flags: LutSamplerFlags::IS_ABSOLUTE,
                table,
            }],
        }
    }

    pub fn sampler(&self, name: &str) -> Option<&LutSampler> {
        self.samplers.iter().find(|s| s.name == name)
    }
}

impl Reflect for LutSampler {
    const KIND: TypeKind = TypeKind::LutSampler;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("flags", FieldType::U8),
                field("_pad", FieldType::Padding(3)),
                field("name", FieldType::String),
                field("table", FieldType::F32List),
            ],
        )
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        Ok(Record::new(Self::KIND)
            .with("flags", Value::U8(self.flags.bits()))
            .with("name", name_value(&self.name))
            .with("table", Value::F32List(self.table.clone())))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        Ok(Self {
            flags: LutSamplerFlags::from_bits_retain(record.take_u8("flags")?),
            name: record.take_name("name")?,
            table: record.take_f32_list("table")?,
        })
    }
}

impl Reflect for Lut {
    const KIND: TypeKind = TypeKind::Lut;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("name", FieldType::String),
                field("samplers", FieldType::List(TypeKind::LutSampler)),
            ],
        )
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        Ok(Record::new(Self::KIND)
            .with("name", name_value(&self.name))
            .with("samplers", list_value(&self.samplers)?))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        Ok(Self {
            name: record.take_name("name")?,
            samplers: list_items(record.take_list("samplers")?)?,
        })
    }
}
