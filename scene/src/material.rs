use std::sync::OnceLock;

use bitflags::bitflags;

use crate::format::FormatError;
use crate::serialization::{field, name_value, FieldType, Record, Reflect, TypeDef, TypeKind, Value};

/// Shader bound to materials created by the converter.
pub const DEFAULT_SHADER_REFERENCE: &str = "0@DefaultShader";

bitflags! {
    /// Fixed-function features enabled by a material.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u32 {
        const FRAGMENT_LIGHTING = 1 << 0;
        const VERTEX_LIGHTING = 1 << 1;
        const HEMISPHERE_LIGHTING = 1 << 2;
        const FOG = 1 << 3;
        /// Specular distribution 0 is sampled from a lookup table.
        const LUT_DIST0 = 1 << 4;
    }
}

/// 8-bit RGBA color, stored packed as `r | g << 8 | b << 16 | a << 24`.
pub type Rgba = [u8; 4];

/// Material state. Textures, LUTs and shaders are referenced by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub flags: MaterialFlags,
    pub texture0_name: String,
    pub texture1_name: String,
    pub texture2_name: String,
    pub shader_reference: String,
    pub model_reference: String,
    pub lut_dist0_table_name: String,
    pub lut_dist0_sampler_name: String,
    pub emission_color: Rgba,
    pub ambient_color: Rgba,
    pub diffuse_color: Rgba,
    pub specular0_color: Rgba,
    pub specular1_color: Rgba,
}

/// Shared read-only template every new material starts from.
pub fn default_material() -> &'static Material {
    static TEMPLATE: OnceLock<Material> = OnceLock::new();
    TEMPLATE.get_or_init(|| Material {
        name: String::new(),
        flags: MaterialFlags::FRAGMENT_LIGHTING,
        texture0_name: String::new(),
        texture1_name: String::new(),
        texture2_name: String::new(),
        shader_reference: DEFAULT_SHADER_REFERENCE.to_string(),
        model_reference: String::new(),
        lut_dist0_table_name: String::new(),
        lut_dist0_sampler_name: String::new(),
        emission_color: [0, 0, 0, 255],
        ambient_color: [255, 255, 255, 255],
        diffuse_color: [255, 255, 255, 255],
        specular0_color: [255, 255, 255, 255],
        specular1_color: [0, 0, 0, 255],
    })
}

impl Default for Material {
    fn default() -> Self {
        default_material().clone()
    }
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Binds specular distribution 0 to `sampler` of `table`.
    pub fn with_lut_dist0(mut self, table: impl Into<String>, sampler: impl Into<String>) -> Self {
        self.lut_dist0_table_name = table.into();
        self.lut_dist0_sampler_name = sampler.into();
        self.flags |= MaterialFlags::LUT_DIST0;
        self
    }

    /// Texture names of units 0, 1 and 2, skipping empty slots.
    pub fn texture_names(&self) -> impl Iterator<Item = &str> {
        [&self.texture0_name, &self.texture1_name, &self.texture2_name]
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(String::as_str)
    }
}

fn pack_color(color: Rgba) -> Value {
    Value::U32(u32::from_le_bytes(color))
}

fn unpack_color(record: &mut Record, field: &'static str) -> Result<Rgba, FormatError> {
    Ok(record.take_u32(field)?.to_le_bytes())
}

impl Reflect for Material {
    const KIND: TypeKind = TypeKind::Material;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("name", FieldType::String),
                field("texture0_name", FieldType::String),
                field("texture1_name", FieldType::String),
                field("texture2_name", FieldType::String),
                field("shader_reference", FieldType::String),
                field("model_reference", FieldType::String),
                field("lut_dist0_table_name", FieldType::String),
                field("lut_dist0_sampler_name", FieldType::String),
                field("flags", FieldType::U32),
                field("emission_color", FieldType::U32),
                field("ambient_color", FieldType::U32),
                field("diffuse_color", FieldType::U32),
                field("specular0_color", FieldType::U32),
                field("specular1_color", FieldType::U32),
            ],
        )
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        Ok(Record::new(Self::KIND)
            .with("name", name_value(&self.name))
            .with("texture0_name", name_value(&self.texture0_name))
            .with("texture1_name", name_value(&self.texture1_name))
            .with("texture2_name", name_value(&self.texture2_name))
            .with("shader_reference", name_value(&self.shader_reference))
            .with("model_reference", name_value(&self.model_reference))
            .with("lut_dist0_table_name", name_value(&self.lut_dist0_table_name))
            .with("lut_dist0_sampler_name", name_value(&self.lut_dist0_sampler_name))
            .with("flags", Value::U32(self.flags.bits()))
            .with("emission_color", pack_color(self.emission_color))
            .with("ambient_color", pack_color(self.ambient_color))
            .with("diffuse_color", pack_color(self.diffuse_color))
            .with("specular0_color", pack_color(self.specular0_color))
            .with("specular1_color", pack_color(self.specular1_color)))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        Ok(Self {
            name: record.take_name("name")?,
            texture0_name: record.take_name("texture0_name")?,
            texture1_name: record.take_name("texture1_name")?,
            texture2_name: record.take_name("texture2_name")?,
            shader_reference: record.take_name("shader_reference")?,
            model_reference: record.take_name("model_reference")?,
            lut_dist0_table_name: record.take_name("lut_dist0_table_name")?,
            lut_dist0_sampler_name: record.take_name("lut_dist0_sampler_name")?,
            flags: MaterialFlags::from_bits_retain(record.take_u32("flags")?),
            emission_color: unpack_color(&mut record, "emission_color")?,
            ambient_color: unpack_color(&mut record, "ambient_color")?,
            diffuse_color: unpack_color(&mut record, "diffuse_color")?,
            specular0_color: unpack_color(&mut record, "specular0_color")?,
            specular1_color: unpack_color(&mut record, "specular1_color")?,
        })
    }
}
