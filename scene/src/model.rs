use bitflags::bitflags;
use cgmath::{Matrix4, SquareMatrix, Vector3};

use h3d_common::{bone_local_transform, matrix_to_3x4, Matrix3x4};

use crate::format::FormatError;
use crate::material::Material;
use crate::mesh::Mesh;
use crate::serialization::{
    field, list_items, list_value, name_value, FieldType, Record, Reflect, TypeDef, TypeKind,
    Value,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModelFlags: u8 {
        const HAS_SKELETON = 1 << 0;
        const IS_BILLBOARD = 1 << 1;
    }
}

impl Default for ModelFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// How the runtime composes bone scale with parent scale.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoneScaling {
    #[default]
    Standard = 0,
    Maya = 1,
    Softimage = 2,
}

impl TryFrom<u8> for BoneScaling {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BoneScaling::Standard),
            1 => Ok(BoneScaling::Maya),
            2 => Ok(BoneScaling::Softimage),
            _ => Err(FormatError::InvalidValue {
                what: "bone scaling",
                value: value as u32,
            }),
        }
    }
}

/// A skeleton joint. Bones live in a flat list; `parent_index` refers into
/// that list, with -1 for roots.
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent_index: i16,
    pub translation: Vector3<f32>,
    /// Euler angles in radians, applied X, then Y, then Z.
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
    /// Inverse of the bind pose world transform.
    pub inverse_transform: Matrix3x4,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent_index: i16) -> Self {
        Self {
            name: name.into(),
            parent_index,
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: Vector3::new(0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
            inverse_transform: matrix_to_3x4(&Matrix4::identity()),
        }
    }

    pub fn local_transform(&self) -> Matrix4<f32> {
        bone_local_transform(self.translation, self.rotation, self.scale)
    }

    /// Parent position in a skeleton of `bone_count` bones. Negative or out
    /// of range indices mean the bone is a root.
    pub fn parent(&self, bone_count: usize) -> Option<usize> {
        usize::try_from(self.parent_index)
            .ok()
            .filter(|&index| index < bone_count)
    }
}

/// World and inverse-world transforms of a skeleton, indexed like the bones.
///
/// This is a snapshot: editing bones afterwards does not update it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneTransforms {
    world: Vec<Matrix4<f32>>,
    inverse: Vec<Matrix4<f32>>,
}

impl BoneTransforms {
    pub fn world(&self, index: usize) -> Option<&Matrix4<f32>> {
        self.world.get(index)
    }

    pub fn inverse(&self, index: usize) -> Option<&Matrix4<f32>> {
        self.inverse.get(index)
    }

    pub fn len(&self) -> usize {
        self.world.len()
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty()
    }
}

/// Computes each bone's world transform by walking its parent chain.
///
/// The walk stops after `bones.len()` steps so a malformed parent cycle cannot
/// loop forever.
pub fn compute_world_transforms(bones: &[Bone]) -> BoneTransforms {
    let mut world = Vec::with_capacity(bones.len());
    let mut inverse = Vec::with_capacity(bones.len());

    for (index, bone) in bones.iter().enumerate() {
        let mut transform = bone.local_transform();
        let mut parent = bone.parent(bones.len());
        let mut steps = 0;

        while let Some(p) = parent {
            if steps == bones.len() {
                log::warn!("Bone {} ({}) has a cyclic parent chain", index, bone.name);
                break;
            }
            transform = bones[p].local_transform() * transform;
            parent = bones[p].parent(bones.len());
            steps += 1;
        }

        let inverted = transform.invert().unwrap_or_else(|| {
            log::warn!("Bone {} ({}) has a singular transform", index, bone.name);
            Matrix4::identity()
        });
        world.push(transform);
        inverse.push(inverted);
    }

    BoneTransforms { world, inverse }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub name: String,
    pub flags: ModelFlags,
    pub bone_scaling: BoneScaling,
    pub skeleton: Vec<Bone>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn world_transforms(&self) -> BoneTransforms {
        compute_world_transforms(&self.skeleton)
    }

    /// Stores the inverse bind pose of every bone from the current skeleton.
    pub fn update_inverse_transforms(&mut self) {
        let transforms = self.world_transforms();
        for (index, bone) in self.skeleton.iter_mut().enumerate() {
            if let Some(inverse) = transforms.inverse(index) {
                bone.inverse_transform = matrix_to_3x4(inverse);
            }
        }
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.skeleton.iter().position(|bone| bone.name == name)
    }
}

// ============================================================================
// Wire layout
// ============================================================================

impl Reflect for Bone {
    const KIND: TypeKind = TypeKind::Bone;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("parent_index", FieldType::I16),
                field("_pad", FieldType::Padding(2)),
                field("name", FieldType::String),
                field("scale", FieldType::Vector3),
                field("rotation", FieldType::Vector3),
                field("translation", FieldType::Vector3),
                field("inverse_transform", FieldType::Matrix3x4),
            ],
        )
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        Ok(Record::new(Self::KIND)
            .with("parent_index", Value::I16(self.parent_index))
            .with("name", name_value(&self.name))
            .with("scale", Value::Vector3(self.scale.into()))
            .with("rotation", Value::Vector3(self.rotation.into()))
            .with("translation", Value::Vector3(self.translation.into()))
            .with("inverse_transform", Value::Matrix3x4(self.inverse_transform)))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        Ok(Self {
            parent_index: record.take_i16("parent_index")?,
            name: record.take_name("name")?,
            scale: record.take_vector3("scale")?.into(),
            rotation: record.take_vector3("rotation")?.into(),
            translation: record.take_vector3("translation")?.into(),
            inverse_transform: record.take_matrix("inverse_transform")?,
        })
    }
}

impl Reflect for Model {
    const KIND: TypeKind = TypeKind::Model;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("flags", FieldType::U8),
                field("bone_scaling", FieldType::U8),
                field("_pad", FieldType::Padding(2)),
                field("name", FieldType::String),
                field("materials", FieldType::List(TypeKind::Material)),
                field("meshes", FieldType::List(TypeKind::Mesh)),
                field("skeleton", FieldType::List(TypeKind::Bone)),
            ],
        )
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        Ok(Record::new(Self::KIND)
            .with("flags", Value::U8(self.flags.bits()))
            .with("bone_scaling", Value::U8(self.bone_scaling as u8))
            .with("name", name_value(&self.name))
            .with("materials", list_value(&self.materials)?)
            .with("meshes", list_value(&self.meshes)?)
            .with("skeleton", list_value(&self.skeleton)?))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        Ok(Self {
            flags: ModelFlags::from_bits_retain(record.take_u8("flags")?),
            bone_scaling: BoneScaling::try_from(record.take_u8("bone_scaling")?)?,
            name: record.take_name("name")?,
            materials: list_items(record.take_list("materials")?)?,
            meshes: list_items(record.take_list("meshes")?)?,
            skeleton: list_items(record.take_list("skeleton")?)?,
        })
    }
}
