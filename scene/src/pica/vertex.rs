//! Vertex attribute packing.
//!
//! A mesh's vertex buffer is interleaved according to its attribute list:
//! each attribute contributes `elements` values of `format`, stored divided by
//! `scale`.

use crate::mesh::Vertex;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeName {
    Position = 0,
    Normal = 1,
    Tangent = 2,
    Color = 3,
    TexCoord0 = 4,
    TexCoord1 = 5,
    TexCoord2 = 6,
    BoneIndex = 7,
    BoneWeight = 8,
}

impl TryFrom<u8> for AttributeName {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            0 => Self::Position,
            1 => Self::Normal,
            2 => Self::Tangent,
            3 => Self::Color,
            4 => Self::TexCoord0,
            5 => Self::TexCoord1,
            6 => Self::TexCoord2,
            7 => Self::BoneIndex,
            8 => Self::BoneWeight,
            other => return Err(other),
        })
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    Byte = 0,
    Ubyte = 1,
    Short = 2,
    Float = 3,
}

impl AttributeFormat {
    pub fn size(self) -> usize {
        match self {
            Self::Byte | Self::Ubyte => 1,
            Self::Short => 2,
            Self::Float => 4,
        }
    }
}

impl TryFrom<u8> for AttributeFormat {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            0 => Self::Byte,
            1 => Self::Ubyte,
            2 => Self::Short,
            3 => Self::Float,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attribute {
    pub name: AttributeName,
    pub format: AttributeFormat,
    pub elements: u8,
    pub scale: f32,
}

impl Attribute {
    pub fn new(name: AttributeName, format: AttributeFormat, elements: u8, scale: f32) -> Self {
        Self {
            name,
            format,
            elements: elements.clamp(1, 4),
            scale,
        }
    }

    pub fn size(&self) -> usize {
        self.format.size() * self.elements as usize
    }
}

/// Step of the byte-encoded bone weights.
pub const WEIGHT_SCALE: f32 = 0.01;

/// Snaps a weight to the value it decodes to after a byte encode. Weights
/// that round to zero come back as zero.
pub fn quantize_weight(weight: f32) -> f32 {
    let raw = (weight / WEIGHT_SCALE).round() as u8 as f32;
    raw / WEIGHT_SCALE.recip()
}

/// Layout used for skinned meshes built from interchange data: float
/// position, normal and UV, byte bone indices, byte weights in percent.
pub fn skinned_attributes() -> Vec<Attribute> {
    vec![
        Attribute::new(AttributeName::Position, AttributeFormat::Float, 3, 1.0),
        Attribute::new(AttributeName::Normal, AttributeFormat::Float, 3, 1.0),
        Attribute::new(AttributeName::TexCoord0, AttributeFormat::Float, 2, 1.0),
        Attribute::new(AttributeName::BoneIndex, AttributeFormat::Ubyte, 4, 1.0),
        Attribute::new(AttributeName::BoneWeight, AttributeFormat::Ubyte, 4, WEIGHT_SCALE),
    ]
}

pub fn vertex_stride(attributes: &[Attribute]) -> usize {
    attributes.iter().map(Attribute::size).sum()
}

pub fn encode_vertices(vertices: &[Vertex], attributes: &[Attribute]) -> Vec<u8> {
    let mut output = Vec::with_capacity(vertices.len() * vertex_stride(attributes));
    for vertex in vertices {
        for attribute in attributes {
            let values = read_components(vertex, attribute.name);
            for value in &values[..attribute.elements as usize] {
                write_component(&mut output, attribute, *value);
            }
        }
    }
    output
}

/// Decodes as many whole vertices as `bytes` holds.
pub fn decode_vertices(bytes: &[u8], attributes: &[Attribute]) -> Vec<Vertex> {
    let stride = vertex_stride(attributes);
    if stride == 0 {
        return Vec::new();
    }

    bytes
        .chunks_exact(stride)
        .map(|chunk| {
            let mut vertex = Vertex::default();
            let mut offset = 0;
            for attribute in attributes {
                let mut values = [0.0f32; 4];
                for value in values.iter_mut().take(attribute.elements as usize) {
                    *value = read_component(&chunk[offset..], attribute);
                    offset += attribute.format.size();
                }
                write_components(&mut vertex, attribute.name, values);
            }
            vertex
        })
        .collect()
}

fn read_components(vertex: &Vertex, name: AttributeName) -> [f32; 4] {
    match name {
        AttributeName::Position => {
            let [x, y, z] = vertex.position;
            [x, y, z, 0.0]
        }
        AttributeName::Normal => {
            let [x, y, z] = vertex.normal;
            [x, y, z, 0.0]
        }
        AttributeName::TexCoord0 => {
            let [u, v] = vertex.texcoord;
            [u, v, 0.0, 0.0]
        }
        AttributeName::BoneIndex => vertex.bone_indices.map(f32::from),
        AttributeName::BoneWeight => vertex.weights,
        AttributeName::Color => [1.0; 4],
        AttributeName::Tangent | AttributeName::TexCoord1 | AttributeName::TexCoord2 => [0.0; 4],
    }
}

fn write_components(vertex: &mut Vertex, name: AttributeName, values: [f32; 4]) {
    let [a, b, c, _] = values;
    match name {
        AttributeName::Position => vertex.position = [a, b, c],
        AttributeName::Normal => vertex.normal = [a, b, c],
        AttributeName::TexCoord0 => vertex.texcoord = [a, b],
        AttributeName::BoneIndex => vertex.bone_indices = values.map(|v| v.round() as u16),
        AttributeName::BoneWeight => vertex.weights = values,
        _ => {}
    }
}

fn write_component(output: &mut Vec<u8>, attribute: &Attribute, value: f32) {
    let scaled = if attribute.scale == 1.0 {
        value
    } else {
        value / attribute.scale
    };
    match attribute.format {
        AttributeFormat::Byte => output.push(scaled.round() as i8 as u8),
        AttributeFormat::Ubyte => output.push(scaled.round() as u8),
        AttributeFormat::Short => output.extend_from_slice(&(scaled.round() as i16).to_le_bytes()),
        AttributeFormat::Float => output.extend_from_slice(&scaled.to_le_bytes()),
    }
}

fn read_component(bytes: &[u8], attribute: &Attribute) -> f32 {
    let raw = match attribute.format {
        AttributeFormat::Byte => bytes[0] as i8 as f32,
        AttributeFormat::Ubyte => bytes[0] as f32,
        AttributeFormat::Short => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
        AttributeFormat::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    };
    if attribute.scale == 1.0 {
        raw
    } else {
        // Dividing by the reciprocal keeps percentage weights exact.
        raw / attribute.scale.recip()
    }
}
