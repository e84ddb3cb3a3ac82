use cgmath::Vector3;

use crate::format::FormatError;
use crate::pica::{
    decode_vertices, encode_vertices, vertex_stride, Attribute, AttributeFormat, AttributeName,
};
use crate::serialization::{
    field, list_items, list_value, FieldType, Record, Reflect, TypeDef, TypeKind, Value,
};

/// Maximum number of bones one sub-mesh can reference in a draw call.
pub const MAX_SUBMESH_BONES: usize = 20;

/// Skinning mode of a mesh or sub-mesh.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Skinning {
    #[default]
    None = 0,
    /// Each vertex follows exactly one bone.
    Rigid = 1,
    /// Vertices blend up to four bones.
    Smooth = 2,
}

impl TryFrom<u8> for Skinning {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Skinning::None),
            1 => Ok(Skinning::Rigid),
            2 => Ok(Skinning::Smooth),
            _ => Err(FormatError::InvalidValue {
                what: "skinning mode",
                value: value as u32,
            }),
        }
    }
}

/// A skinned vertex.
///
/// Bone indices are global skeleton indices in interchange data and local
/// sub-mesh indices once partitioned. Unused influence slots have weight 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
    pub bone_indices: [u16; 4],
    pub weights: [f32; 4],
}

impl Vertex {
    pub fn position(&self) -> Vector3<f32> {
        self.position.into()
    }

    pub fn normal(&self) -> Vector3<f32> {
        self.normal.into()
    }

    /// Influences with a non-zero weight, in slot order.
    pub fn influences(&self) -> impl Iterator<Item = (u16, f32)> + '_ {
        self.bone_indices
            .iter()
            .zip(self.weights)
            .filter(|(_, weight)| *weight != 0.0)
            .map(|(index, weight)| (*index, weight))
    }
}

/// Bit-exact identity of a [`Vertex`], usable as a hash key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexKey([u32; 14]);

impl From<&Vertex> for VertexKey {
    fn from(v: &Vertex) -> Self {
        let mut key = [0u32; 14];
        let floats = v
            .position
            .iter()
            .chain(&v.normal)
            .chain(&v.texcoord)
            .chain(&v.weights);
        for (slot, value) in key.iter_mut().zip(floats) {
            *slot = value.to_bits();
        }
        key[12] = v.bone_indices[0] as u32 | (v.bone_indices[1] as u32) << 16;
        key[13] = v.bone_indices[2] as u32 | (v.bone_indices[3] as u32) << 16;
        VertexKey(key)
    }
}

/// A draw-call sized slice of a mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubMesh {
    pub skinning: Skinning,
    /// Maps local bone indices stored in vertices to skeleton indices.
    pub bone_indices: Vec<u16>,
    /// Triangle list into the owning mesh's vertex buffer.
    pub indices: Vec<u16>,
}

impl SubMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Skeleton index of a local bone index.
    pub fn global_bone(&self, local: u16) -> Option<u16> {
        self.bone_indices.get(local as usize).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub material_index: u16,
    pub skinning: Skinning,
    pub mesh_center: Vector3<f32>,
    pub attributes: Vec<Attribute>,
    pub vertices: Vec<Vertex>,
    pub submeshes: Vec<SubMesh>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, attributes: Vec<Attribute>, submeshes: Vec<SubMesh>) -> Self {
        Self {
            material_index: 0,
            skinning: Skinning::None,
            mesh_center: Vector3::new(0.0, 0.0, 0.0),
            attributes,
            vertices,
            submeshes,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(SubMesh::triangle_count).sum()
    }

    pub fn vertex_stride(&self) -> usize {
        vertex_stride(&self.attributes)
    }

    /// Fails if a sub-mesh indexes past the vertex buffer.
    pub fn validate_indices(&self) -> Result<(), FormatError> {
        let len = self.vertices.len();
        for submesh in &self.submeshes {
            if let Some(&index) = submesh.indices.iter().find(|&&i| i as usize >= len) {
                return Err(FormatError::IndexOutOfRange {
                    index: index as usize,
                    len,
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Wire layout
// ============================================================================

impl Reflect for Attribute {
    const KIND: TypeKind = TypeKind::Attribute;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("name", FieldType::U8),
                field("format", FieldType::U8),
                field("elements", FieldType::U8),
                field("_pad", FieldType::Padding(1)),
                field("scale", FieldType::F32),
            ],
        )
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        Ok(Record::new(Self::KIND)
            .with("name", Value::U8(self.name as u8))
            .with("format", Value::U8(self.format as u8))
            .with("elements", Value::U8(self.elements))
            .with("scale", Value::F32(self.scale)))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        let name = record.take_u8("name")?;
        let format = record.take_u8("format")?;
        let name = AttributeName::try_from(name).map_err(|v| FormatError::InvalidValue {
            what: "attribute name",
            value: v as u32,
        })?;
        let format = AttributeFormat::try_from(format).map_err(|v| FormatError::InvalidValue {
            what: "attribute format",
            value: v as u32,
        })?;
        Ok(Attribute::new(
            name,
            format,
            record.take_u8("elements")?,
            record.take_f32("scale")?,
        ))
    }
}

impl Reflect for SubMesh {
    const KIND: TypeKind = TypeKind::SubMesh;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("skinning", FieldType::U8),
                field("_pad", FieldType::Padding(1)),
                field("bone_indices_count", FieldType::U16),
                field("bone_indices", FieldType::U16Array(MAX_SUBMESH_BONES)),
                field("indices", FieldType::Indices),
            ],
        )
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        if self.bone_indices.len() > MAX_SUBMESH_BONES {
            return Err(FormatError::TooManyBones {
                count: self.bone_indices.len(),
                limit: MAX_SUBMESH_BONES,
            });
        }

        Ok(Record::new(Self::KIND)
            .with("skinning", Value::U8(self.skinning as u8))
            .with("bone_indices_count", Value::U16(self.bone_indices.len() as u16))
            .with("bone_indices", Value::U16Array(self.bone_indices.clone()))
            .with("indices", Value::Indices(self.indices.clone())))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        let skinning = Skinning::try_from(record.take_u8("skinning")?)?;
        let count = record.take_u16("bone_indices_count")? as usize;
        if count > MAX_SUBMESH_BONES {
            return Err(FormatError::TooManyBones {
                count,
                limit: MAX_SUBMESH_BONES,
            });
        }
        let mut bone_indices = record.take_u16_array("bone_indices")?;
        bone_indices.truncate(count);

        Ok(Self {
            skinning,
            bone_indices,
            indices: record.take_indices("indices")?,
        })
    }
}

impl Reflect for Mesh {
    const KIND: TypeKind = TypeKind::Mesh;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("material_index", FieldType::U16),
                field("skinning", FieldType::U8),
                field("_pad0", FieldType::Padding(1)),
                field("mesh_center", FieldType::Vector3),
                field("attributes", FieldType::List(TypeKind::Attribute)),
                field("vertex_stride", FieldType::U16),
                field("_pad1", FieldType::Padding(2)),
                field("vertex_buffer", FieldType::Bytes),
                field("submeshes", FieldType::List(TypeKind::SubMesh)),
            ],
        )
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        self.validate_indices()?;

        Ok(Record::new(Self::KIND)
            .with("material_index", Value::U16(self.material_index))
            .with("skinning", Value::U8(self.skinning as u8))
            .with("mesh_center", Value::Vector3(self.mesh_center.into()))
            .with("attributes", list_value(&self.attributes)?)
            .with("vertex_stride", Value::U16(self.vertex_stride() as u16))
            .with(
                "vertex_buffer",
                Value::Bytes(encode_vertices(&self.vertices, &self.attributes)),
            )
            .with("submeshes", list_value(&self.submeshes)?))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        let material_index = record.take_u16("material_index")?;
        let skinning = Skinning::try_from(record.take_u8("skinning")?)?;
        let mesh_center = record.take_vector3("mesh_center")?.into();
        let attributes: Vec<Attribute> = list_items(record.take_list("attributes")?)?;

        let stride = record.take_u16("vertex_stride")?;
        if stride as usize != vertex_stride(&attributes) {
            return Err(FormatError::InvalidValue {
                what: "vertex stride",
                value: stride as u32,
            });
        }
        let vertices = decode_vertices(&record.take_bytes("vertex_buffer")?, &attributes);

        let mesh = Self {
            material_index,
            skinning,
            mesh_center,
            attributes,
            vertices,
            submeshes: list_items(record.take_list("submeshes")?)?,
        };
        mesh.validate_indices()?;
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_key_distinguishes_bits() {
        let a = Vertex {
            position: [0.0, 1.0, 2.0],
            ..Vertex::default()
        };
        let mut b = a;
        assert_eq!(VertexKey::from(&a), VertexKey::from(&b));

        b.bone_indices[3] = 1;
        assert_ne!(VertexKey::from(&a), VertexKey::from(&b));

        let mut c = a;
        c.weights[0] = -0.0;
        assert_ne!(VertexKey::from(&a), VertexKey::from(&c));
    }

    #[test]
    fn test_influences_skip_zero_weights() {
        let vertex = Vertex {
            bone_indices: [4, 7, 9, 0],
            weights: [0.25, 0.0, 0.75, 0.0],
            ..Vertex::default()
        };
        let influences: Vec<_> = vertex.influences().collect();
        assert_eq!(influences, vec![(4, 0.25), (9, 0.75)]);
    }

    #[test]
    fn test_submesh_bone_limit_enforced() {
        let submesh = SubMesh {
            skinning: Skinning::Smooth,
            bone_indices: (0..21).collect(),
            indices: vec![],
        };
        assert!(matches!(
            submesh.to_record(),
            Err(FormatError::TooManyBones { count: 21, limit: 20 })
        ));
    }

    #[test]
    fn test_mesh_index_validation() {
        let mesh = Mesh::new(
            vec![Vertex::default(); 2],
            vec![],
            vec![SubMesh {
                indices: vec![0, 1, 2],
                ..SubMesh::default()
            }],
        );
        assert!(matches!(
            mesh.validate_indices(),
            Err(FormatError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }
}
