use crate::format::FormatError;
use crate::lut::Lut;
use crate::material::Material;
use crate::model::Model;
use crate::serialization::{
    field, list_items, list_value, FieldType, Record, Reflect, TypeDef, TypeKind,
};
use crate::texture::Texture;

/// Root of a container: ordered entity collections.
///
/// Entities refer to one another by name or index only; nothing here owns an
/// entity outside its own list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub models: Vec<Model>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub luts: Vec<Lut>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors every model material into the scene-level list. Materials
    /// already present by name are kept as they are.
    pub fn copy_materials(&mut self) {
        for model in &self.models {
            for material in &model.materials {
                if self.material(&material.name).is_none() {
                    self.materials.push(material.clone());
                }
            }
        }
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn texture(&self, name: &str) -> Option<&Texture> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn lut(&self, name: &str) -> Option<&Lut> {
        self.luts.iter().find(|l| l.name == name)
    }

    /// Adds `texture` unless one with the same name exists. Returns whether
    /// it was added.
    pub fn add_texture(&mut self, texture: Texture) -> bool {
        if self.texture(&texture.name).is_some() {
            return false;
        }
        self.textures.push(texture);
        true
    }

    pub fn add_lut(&mut self, lut: Lut) -> bool {
        if self.lut(&lut.name).is_some() {
            return false;
        }
        self.luts.push(lut);
        true
    }
}

impl Reflect for Scene {
    const KIND: TypeKind = TypeKind::Contents;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("models", FieldType::List(TypeKind::Model)),
                field("materials", FieldType::List(TypeKind::Material)),
                field("textures", FieldType::List(TypeKind::Texture)),
                field("luts", FieldType::List(TypeKind::Lut)),
            ],
        )
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        Ok(Record::new(Self::KIND)
            .with("models", list_value(&self.models)?)
            .with("materials", list_value(&self.materials)?)
            .with("textures", list_value(&self.textures)?)
            .with("luts", list_value(&self.luts)?))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        Ok(Self {
            models: list_items(record.take_list("models")?)?,
            materials: list_items(record.take_list("materials")?)?,
            textures: list_items(record.take_list("textures")?)?,
            luts: list_items(record.take_list("luts")?)?,
        })
    }
}
