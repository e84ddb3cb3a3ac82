//! Conversion between scenes and interchange formats.

pub mod mesh_util;
pub mod smd;

pub use mesh_util::{partition_mesh, PartitionError, PartitionedMesh, DEFAULT_BONE_LIMIT};
pub use smd::{ConvertOptions, Smd, SmdBone, SmdError, SmdExportOptions, SmdMesh, SmdNode};
