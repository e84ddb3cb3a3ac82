pub use h3d_common as common;

pub mod format;
pub mod import_export;
pub mod lut;
pub mod material;
pub mod mesh;
pub mod model;
pub mod pica;
pub mod scene;
pub mod serialization;
pub mod texture;

pub use format::{parse_h3d, FormatError, InternalError, ParsedContainer};
pub use lut::{Lut, LutSampler, LutSamplerFlags};
pub use material::{default_material, Material, MaterialFlags};
pub use mesh::{Mesh, Skinning, SubMesh, Vertex};
pub use model::{compute_world_transforms, Bone, BoneScaling, BoneTransforms, Model, ModelFlags};
pub use scene::Scene;
pub use texture::Texture;

#[cfg(test)]
mod scene_tests;
