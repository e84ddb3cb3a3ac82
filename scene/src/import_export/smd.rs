//! StudioMdl (SMD) ASCII interchange.
//!
//! Reads and writes the `nodes`, `skeleton` and `triangles` sections of the
//! text format, and converts between it and [`Scene`]s. Only the bind pose
//! (`time 0`) is carried; animation frames are ignored.
//!
//! ```text
//! version 1
//! nodes
//! 0 "root" -1
//! end
//! skeleton
//! time 0
//! 0 0 0 0 0 0 0
//! end
//! triangles
//! body.png
//! 0  px py pz  nx ny nz  u v  2  0 0.5  1 0.5
//! ...
//! end
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use cgmath::Vector3;
use thiserror::Error;

use h3d_common::{transform_normal, transform_point};

use super::mesh_util::{partition_mesh, PartitionError, DEFAULT_BONE_LIMIT};
use crate::format::FormatError;
use crate::lut::{Lut, CEL_SHADING_SAMPLER, CEL_SHADING_TABLE};
use crate::material::Material;
use crate::mesh::{Mesh, Skinning, Vertex};
use crate::model::{Bone, BoneScaling, Model, ModelFlags};
use crate::pica::{skinned_attributes, PicaCodec, TextureFormat};
use crate::scene::Scene;
use crate::texture::Texture;

/// Influences a vertex can carry on the GPU.
const MAX_INFLUENCES: usize = 4;

#[derive(Debug, Error)]
pub enum SmdError {
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Skeleton references node {index} but only {count} nodes exist")]
    InvalidNodeIndex { index: usize, count: usize },

    #[error("Node {node} has parent {parent}, outside the 16-bit bone range")]
    InvalidParent { node: String, parent: i32 },

    #[error("Scene has no model at index {0}")]
    MissingModel(usize),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Options for building a scene from SMD data.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub model_name: String,
    /// Bones per sub-mesh. Must be at least 12.
    pub bone_limit: usize,
    /// Directory searched for `<material name>` image files.
    pub texture_search_path: Option<PathBuf>,
    pub texture_format: TextureFormat,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            model_name: "Model".to_string(),
            bone_limit: DEFAULT_BONE_LIMIT,
            texture_search_path: None,
            texture_format: TextureFormat::Rgba8,
        }
    }
}

/// Options for extracting SMD data from a scene.
#[derive(Debug, Clone, Default)]
pub struct SmdExportOptions {
    pub model_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmdNode {
    pub index: i32,
    pub name: String,
    pub parent_index: i32,
}

/// Bind pose of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct SmdBone {
    pub node_index: usize,
    pub translation: Vector3<f32>,
    pub rotation: Vector3<f32>,
}

/// Consecutive triangles sharing a material. Vertices carry global bone
/// indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SmdMesh {
    pub material_name: String,
    pub vertices: Vec<Vertex>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Smd {
    pub nodes: Vec<SmdNode>,
    pub skeleton: Vec<SmdBone>,
    pub meshes: Vec<SmdMesh>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Nodes,
    Skeleton,
    Triangles,
}

fn parse_error(line: usize, message: impl Into<String>) -> SmdError {
    SmdError::Parse {
        line,
        message: message.into(),
    }
}

fn column<T: FromStr>(params: &[&str], index: usize, line: usize) -> Result<T, SmdError> {
    let token = params
        .get(index)
        .ok_or_else(|| parse_error(line, format!("missing column {index}")))?;
    token
        .parse()
        .map_err(|_| parse_error(line, format!("invalid value {token:?} in column {index}")))
}

fn vector(params: &[&str], first: usize, line: usize) -> Result<Vector3<f32>, SmdError> {
    Ok(Vector3::new(
        column(params, first, line)?,
        column(params, first + 1, line)?,
        column(params, first + 2, line)?,
    ))
}

fn parse_node(text: &str, params: &[&str], line: usize) -> Result<SmdNode, SmdError> {
    let index = column(params, 0, line)?;
    let (name, rest) = match (text.find('"'), text.rfind('"')) {
        (Some(open), Some(close)) if close > open => (&text[open + 1..close], &text[close + 1..]),
        _ => {
            let name = params.get(1).copied().unwrap_or_default();
            (name, params.get(2).copied().unwrap_or_default())
        }
    };
    let parent_index = rest
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| parse_error(line, "missing parent index"))?;

    Ok(SmdNode {
        index,
        name: name.to_string(),
        parent_index,
    })
}

fn parse_vertex(params: &[&str], line: usize) -> Result<Vertex, SmdError> {
    let parent_bone: u16 = column(params, 0, line)?;
    let mut vertex = Vertex {
        position: vector(params, 1, line)?.into(),
        normal: vector(params, 4, line)?.into(),
        texcoord: [column(params, 7, line)?, column(params, 8, line)?],
        ..Vertex::default()
    };

    if params.len() > 9 {
        let count: usize = column(params, 9, line)?;
        if count > MAX_INFLUENCES {
            log::debug!("Line {line}: clamping {count} influences to {MAX_INFLUENCES}");
        }
        for slot in 0..count.min(MAX_INFLUENCES) {
            vertex.bone_indices[slot] = column(params, 10 + slot * 2, line)?;
            vertex.weights[slot] = column(params, 11 + slot * 2, line)?;
        }
    } else {
        vertex.bone_indices[0] = parent_bone;
        vertex.weights[0] = 1.0;
    }
    Ok(vertex)
}

impl Smd {
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, SmdError> {
        let mut smd = Smd::default();
        let mut section = Section::None;
        let mut frame = 0i32;
        let mut triangle_line = 0usize;

        for (number, text) in reader.lines().enumerate() {
            let text = text?;
            let line = number + 1;
            let params: Vec<&str> = text.split_whitespace().collect();
            let Some(&keyword) = params.first() else {
                continue;
            };

            match keyword {
                "version" => {}
                "nodes" => section = Section::Nodes,
                "skeleton" => section = Section::Skeleton,
                "time" => frame = column(&params, 1, line)?,
                "triangles" => {
                    section = Section::Triangles;
                    triangle_line = 0;
                }
                "end" => {
                    if section == Section::Triangles && triangle_line % 4 != 0 {
                        log::warn!("Line {line}: triangle list ends with an incomplete triangle");
                    }
                    section = Section::None;
                }
                _ => match section {
                    Section::None => {
                        return Err(parse_error(line, format!("unexpected {keyword:?}")));
                    }
                    Section::Nodes => smd.nodes.push(parse_node(&text, &params, line)?),
                    Section::Skeleton if frame != 0 => {}
                    Section::Skeleton => smd.skeleton.push(SmdBone {
                        node_index: column(&params, 0, line)?,
                        translation: vector(&params, 1, line)?,
                        rotation: vector(&params, 4, line)?,
                    }),
                    Section::Triangles => {
                        if triangle_line % 4 == 0 {
                            let material = text.trim();
                            if smd.meshes.last().map(|m| m.material_name.as_str()) != Some(material)
                            {
                                smd.meshes.push(SmdMesh {
                                    material_name: material.to_string(),
                                    vertices: Vec::new(),
                                });
                            }
                        } else if let Some(mesh) = smd.meshes.last_mut() {
                            mesh.vertices.push(parse_vertex(&params, line)?);
                        }
                        triangle_line += 1;
                    }
                },
            }
        }

        log::debug!(
            "Parsed SMD: {} nodes, {} bones, {} meshes, {} triangles",
            smd.nodes.len(),
            smd.skeleton.len(),
            smd.meshes.len(),
            smd.triangle_count()
        );
        Ok(smd)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SmdError> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len() / 3).sum()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), SmdError> {
        writeln!(writer, "version 1")?;

        writeln!(writer, "nodes")?;
        for node in &self.nodes {
            writeln!(writer, "{} \"{}\" {}", node.index, node.name, node.parent_index)?;
        }
        writeln!(writer, "end")?;

        writeln!(writer, "skeleton")?;
        writeln!(writer, "time 0")?;
        for bone in &self.skeleton {
            let t = bone.translation;
            let r = bone.rotation;
            writeln!(
                writer,
                "{} {} {} {} {} {} {}",
                bone.node_index, t.x, t.y, t.z, r.x, r.y, r.z
            )?;
        }
        writeln!(writer, "end")?;

        writeln!(writer, "triangles")?;
        for mesh in &self.meshes {
            for triangle in mesh.vertices.chunks_exact(3) {
                writeln!(writer, "{}", mesh.material_name)?;
                for vertex in triangle {
                    writeln!(writer, "{}", vertex_line(vertex))?;
                }
            }
        }
        writeln!(writer, "end")?;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SmdError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Extracts the bind pose and triangles of one model.
    ///
    /// Sub-meshes that are not smoothly skinned have the world transform of
    /// their bone baked into positions and normals, and are written as rigid
    /// single-bone vertices.
    pub fn from_scene(scene: &Scene, options: &SmdExportOptions) -> Result<Self, SmdError> {
        let model = scene
            .models
            .get(options.model_index)
            .ok_or(SmdError::MissingModel(options.model_index))?;

        let mut smd = Smd::default();
        for (index, bone) in model.skeleton.iter().enumerate() {
            smd.nodes.push(SmdNode {
                index: index as i32,
                name: bone.name.clone(),
                parent_index: bone.parent_index as i32,
            });
            smd.skeleton.push(SmdBone {
                node_index: index,
                translation: bone.translation,
                rotation: bone.rotation,
            });
        }

        let transforms = model.world_transforms();
        for mesh in &model.meshes {
            let material_name = match model.materials.get(mesh.material_index as usize) {
                Some(material) if !material.texture0_name.is_empty() => {
                    material.texture0_name.clone()
                }
                Some(material) => material.name.clone(),
                None => format!("material{}", mesh.material_index),
            };

            let mut vertices = Vec::with_capacity(mesh.triangle_count() * 3);
            for submesh in &mesh.submeshes {
                for &index in &submesh.indices {
                    let mut vertex = *mesh.vertices.get(index as usize).ok_or(
                        FormatError::IndexOutOfRange {
                            index: index as usize,
                            len: mesh.vertices.len(),
                        },
                    )?;
                    let rigid_bone = submesh.global_bone(vertex.bone_indices[0]);

                    for slot in 0..MAX_INFLUENCES {
                        if vertex.weights[slot] != 0.0 {
                            let local = vertex.bone_indices[slot];
                            vertex.bone_indices[slot] = submesh.global_bone(local).ok_or(
                                FormatError::IndexOutOfRange {
                                    index: local as usize,
                                    len: submesh.bone_indices.len(),
                                },
                            )?;
                        }
                    }

                    if submesh.skinning != Skinning::Smooth {
                        let attachment = rigid_bone
                            .and_then(|bone| transforms.world(bone as usize).map(|w| (bone, w)));
                        if let Some((bone, world)) = attachment {
                            vertex.position = transform_point(world, vertex.position()).into();
                            vertex.normal = transform_normal(world, vertex.normal()).into();
                            vertex.bone_indices = [bone, 0, 0, 0];
                            vertex.weights = [1.0, 0.0, 0.0, 0.0];
                        }
                    }
                    vertices.push(vertex);
                }
            }

            smd.meshes.push(SmdMesh {
                material_name,
                vertices,
            });
        }
        Ok(smd)
    }

    /// Builds a single-model scene.
    ///
    /// Each mesh is partitioned to the bone limit and gets its own material
    /// bound to the default shader and the cel shading LUT. When a search path
    /// is set, `<path>/<material name>` is imported as a texture if it exists;
    /// a missing file is skipped.
    ///
    /// Bone transforms are computed in index order, so parents must precede
    /// their children.
    pub fn to_scene(&self, options: &ConvertOptions) -> Result<Scene, SmdError> {
        let mut scene = Scene::new();
        let mut model = Model::new(options.model_name.clone());
        model.bone_scaling = BoneScaling::Maya;
        if !self.skeleton.is_empty() {
            model.flags |= ModelFlags::HAS_SKELETON;
        }

        for (index, smd_mesh) in self.meshes.iter().enumerate() {
            let partitioned = partition_mesh(&smd_mesh.vertices, options.bone_limit)?;
            let center = partitioned.center();

            let mut mesh = Mesh::new(
                partitioned.vertices,
                skinned_attributes(),
                partitioned.submeshes,
            );
            mesh.skinning = Skinning::Smooth;
            mesh.mesh_center = center;
            mesh.material_index = index as u16;
            model.meshes.push(mesh);

            let stem = Path::new(&smd_mesh.material_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| smd_mesh.material_name.clone());

            let mut material = Material::new(format!("Mat{index:05}_{stem}"))
                .with_lut_dist0(CEL_SHADING_TABLE, CEL_SHADING_SAMPLER);
            material.texture0_name = stem.clone();
            material.model_reference = format!("{}@{}", material.name, model.name);
            model.materials.push(material);

            if let Some(dir) = &options.texture_search_path {
                if scene.texture(&stem).is_none() {
                    let path = dir.join(&smd_mesh.material_name);
                    if path.is_file() {
                        let texture =
                            Texture::from_image_file(&path, options.texture_format, &PicaCodec)?;
                        scene.add_texture(texture);
                    } else {
                        log::debug!("Texture {} not found, skipping", path.display());
                    }
                }
            }
        }

        scene.add_lut(Lut::cel_shading());

        for smd_bone in &self.skeleton {
            let node = self
                .nodes
                .get(smd_bone.node_index)
                .ok_or(SmdError::InvalidNodeIndex {
                    index: smd_bone.node_index,
                    count: self.nodes.len(),
                })?;
            let parent = i16::try_from(node.parent_index).map_err(|_| SmdError::InvalidParent {
                node: node.name.clone(),
                parent: node.parent_index,
            })?;
            let mut bone = Bone::new(node.name.clone(), parent);
            bone.translation = smd_bone.translation;
            bone.rotation = smd_bone.rotation;
            model.skeleton.push(bone);
        }
        model.update_inverse_transforms();

        scene.models.push(model);
        scene.copy_materials();
        Ok(scene)
    }
}

impl FromStr for Smd {
    type Err = SmdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.as_bytes())
    }
}

/// Only slots with a non-zero weight are written.
fn vertex_line(vertex: &Vertex) -> String {
    let [px, py, pz] = vertex.position;
    let [nx, ny, nz] = vertex.normal;
    let [u, v] = vertex.texcoord;

    let influences: Vec<(u16, f32)> = vertex.influences().collect();
    let mut line = format!(
        "0 {px} {py} {pz} {nx} {ny} {nz} {u} {v} {}",
        influences.len()
    );
    for (bone, weight) in influences {
        line.push_str(&format!(" {bone} {weight}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::SubMesh;
    use cgmath::InnerSpace;
    use h3d_common::EPSILON;

    const SAMPLE: &str = "version 1
nodes
0 \"root\" -1
1 \"arm bone\" 0
end
skeleton
time 0
0 0 0 0 0 0 0
1 1 2 3 0 0 0
time 1
0 9 9 9 0 0 0
end
triangles
skin.png
0 0 0 0 0 0 1 0 0 1 0 1
0 1 0 0 0 0 1 1 0 2 0 0.5 1 0.5
0 0 1 0 0 0 1 0 1 1 1 1
skin.png
0 1 1 0 0 0 1 1 1 1 1 1
0 1 0 0 0 0 1 1 0 2 0 0.5 1 0.5
0 0 1 0 0 0 1 0 1 1 1 1
cloth
1 5 5 5 0 1 0 0 0
1 6 5 5 0 1 0 1 0
1 5 6 5 0 1 0 0 1 5 0 0.2 1 0.2 0 0.2 1 0.2 0 0.2
end
";

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("h3d_smd_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_sections() {
        let smd: Smd = SAMPLE.parse().unwrap();
        assert_eq!(smd.nodes.len(), 2);
        assert_eq!(smd.nodes[1].name, "arm bone");
        assert_eq!(smd.nodes[1].parent_index, 0);
        // Frame 1 is not part of the bind pose.
        assert_eq!(smd.skeleton.len(), 2);
        assert_eq!(smd.skeleton[1].translation, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(smd.triangle_count(), 3);
    }

    #[test]
    fn test_same_material_triangles_share_mesh() {
        let smd: Smd = SAMPLE.parse().unwrap();
        let materials: Vec<_> = smd.meshes.iter().map(|m| m.material_name.as_str()).collect();
        assert_eq!(materials, vec!["skin.png", "cloth"]);
        assert_eq!(smd.meshes[0].vertices.len(), 6);
    }

    #[test]
    fn test_vertex_without_links_is_rigid_to_parent() {
        let smd: Smd = SAMPLE.parse().unwrap();
        let vertex = smd.meshes[1].vertices[0];
        assert_eq!(vertex.bone_indices[0], 1);
        assert_eq!(vertex.weights, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_influences_clamped_to_four() {
        let smd: Smd = SAMPLE.parse().unwrap();
        let vertex = smd.meshes[1].vertices[2];
        assert_eq!(vertex.bone_indices, [0, 1, 0, 1]);
        assert_eq!(vertex.weights, [0.2; 4]);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let text = "triangles\nskin\n0 1 2\n";
        match text.parse::<Smd>() {
            Err(SmdError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_write_then_parse() {
        let smd: Smd = SAMPLE.parse().unwrap();
        let mut bytes = Vec::new();
        smd.write(&mut bytes).unwrap();

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("1 \"arm bone\" 0"));
        assert!(text.contains("0 1 0 0 0 0 1 1 0 2 0 0.5 1 0.5"));
        assert_eq!(text.parse::<Smd>().unwrap(), smd);
    }

    #[test]
    fn test_to_scene_builds_materials_and_skeleton() {
        let dir = temp_dir("no_textures");
        let smd: Smd = SAMPLE.parse().unwrap();
        let options = ConvertOptions {
            texture_search_path: Some(dir.clone()),
            ..ConvertOptions::default()
        };
        let scene = smd.to_scene(&options).unwrap();

        // Missing texture files are skipped, not errors.
        assert!(scene.textures.is_empty());
        assert!(scene.lut(CEL_SHADING_TABLE).is_some());

        let model = &scene.models[0];
        assert_eq!(model.name, "Model");
        assert!(model.flags.contains(ModelFlags::HAS_SKELETON));
        assert_eq!(model.bone_scaling, BoneScaling::Maya);
        assert_eq!(model.skeleton[1].scale, Vector3::new(1.0, 1.0, 1.0));

        let material = &model.materials[0];
        assert_eq!(material.name, "Mat00000_skin");
        assert_eq!(material.texture0_name, "skin");
        assert_eq!(material.model_reference, "Mat00000_skin@Model");
        assert_eq!(material.lut_dist0_sampler_name, CEL_SHADING_SAMPLER);
        assert_eq!(model.materials[1].name, "Mat00001_cloth");
        assert_eq!(scene.materials.len(), 2);

        let mesh = &model.meshes[1];
        assert_eq!(mesh.material_index, 1);
        assert_eq!(mesh.skinning, Skinning::Smooth);
        assert!((mesh.mesh_center.x - 5.5).abs() < EPSILON);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_to_scene_imports_texture_once() {
        let dir = temp_dir("textures");
        let rgba = vec![200u8; 8 * 8 * 4];
        let image = image::RgbaImage::from_raw(8, 8, rgba).unwrap();
        image.save(dir.join("skin.png")).unwrap();

        let vertex = "0 0 0 0 0 0 1 0 0\n".repeat(3);
        let text = format!("triangles\nskin.png\n{vertex}cloth\n{vertex}skin.png\n{vertex}end\n");
        let smd: Smd = text.parse().unwrap();
        assert_eq!(smd.meshes.len(), 3);
        let options = ConvertOptions {
            texture_search_path: Some(dir.clone()),
            ..ConvertOptions::default()
        };
        let scene = smd.to_scene(&options).unwrap();
        assert_eq!(scene.textures.len(), 1);
        assert_eq!(scene.textures[0].name, "skin");
        assert_eq!((scene.textures[0].width, scene.textures[0].height), (8, 8));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_from_scene_restores_global_bones() {
        let smd: Smd = SAMPLE.parse().unwrap();
        let scene = smd.to_scene(&ConvertOptions::default()).unwrap();
        let exported = Smd::from_scene(&scene, &SmdExportOptions::default()).unwrap();

        assert_eq!(exported.nodes, smd.nodes);
        assert_eq!(exported.meshes[0].material_name, "skin");
        assert_eq!(exported.meshes[0].vertices, smd.meshes[0].vertices);

        assert_eq!(exported.skeleton.len(), smd.skeleton.len());
        for (out, original) in exported.skeleton.iter().zip(&smd.skeleton) {
            assert_eq!(out.node_index, original.node_index);
            assert!((out.translation - original.translation).magnitude() < EPSILON);
            assert!((out.rotation - original.rotation).magnitude() < EPSILON);
        }

        let triangles = |smd: &Smd| -> Vec<usize> {
            smd.meshes.iter().map(|m| m.vertices.len() / 3).collect()
        };
        assert_eq!(triangles(&exported), triangles(&smd));
    }

    #[test]
    fn test_from_scene_rejects_unknown_local_bone() {
        let mut model = Model::new("Model");
        model.skeleton.push(Bone::new("root", -1));
        let vertex = Vertex {
            bone_indices: [3, 0, 0, 0],
            weights: [1.0, 0.0, 0.0, 0.0],
            ..Vertex::default()
        };
        let submesh = SubMesh {
            skinning: Skinning::Smooth,
            bone_indices: vec![0],
            indices: vec![0, 0, 0],
        };
        model.meshes.push(Mesh::new(vec![vertex], skinned_attributes(), vec![submesh]));

        let mut scene = Scene::new();
        scene.models.push(model);
        assert!(matches!(
            Smd::from_scene(&scene, &SmdExportOptions::default()),
            Err(SmdError::Format(FormatError::IndexOutOfRange { index: 3, len: 1 }))
        ));
    }

    #[test]
    fn test_vertex_line_skips_empty_slots() {
        let vertex = Vertex {
            bone_indices: [4, 9, 7, 0],
            weights: [0.6, 0.0, 0.4, 0.0],
            ..Vertex::default()
        };
        assert!(vertex_line(&vertex).ends_with(" 2 4 0.6 7 0.4"));
    }

    #[test]
    fn test_parent_outside_bone_range() {
        let text = "nodes\n0 \"root\" 40000\nend\nskeleton\ntime 0\n0 0 0 0 0 0 0\nend\n";
        let smd: Smd = text.parse().unwrap();
        assert!(matches!(
            smd.to_scene(&ConvertOptions::default()),
            Err(SmdError::InvalidParent { parent: 40000, .. })
        ));
    }

    #[test]
    fn test_from_scene_bakes_rigid_submeshes() {
        let mut model = Model::new("Model");
        let mut bone = Bone::new("root", -1);
        bone.translation = Vector3::new(0.0, 10.0, 0.0);
        model.skeleton.push(bone);

        let vertex = Vertex {
            position: [1.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            ..Vertex::default()
        };
        let submesh = SubMesh {
            skinning: Skinning::Rigid,
            bone_indices: vec![0],
            indices: vec![0, 0, 0],
        };
        model.meshes.push(Mesh::new(vec![vertex], skinned_attributes(), vec![submesh]));
        model.materials.push(Material::new("plain"));

        let mut scene = Scene::new();
        scene.models.push(model);
        let smd = Smd::from_scene(&scene, &SmdExportOptions::default()).unwrap();

        let baked = smd.meshes[0].vertices[0];
        assert_eq!(smd.meshes[0].material_name, "plain");
        assert!((baked.position[1] - 10.0).abs() < EPSILON);
        assert!((baked.normal[2] - 1.0).abs() < EPSILON);
        assert_eq!(baked.weights[0], 1.0);
    }

    #[test]
    fn test_from_scene_missing_model() {
        let result = Smd::from_scene(&Scene::new(), &SmdExportOptions { model_index: 2 });
        assert!(matches!(result, Err(SmdError::MissingModel(2))));
    }

    #[test]
    fn test_unknown_node_index() {
        let text = "nodes\n0 \"root\" -1\nend\nskeleton\ntime 0\n3 0 0 0 0 0 0\nend\n";
        let smd: Smd = text.parse().unwrap();
        assert!(matches!(
            smd.to_scene(&ConvertOptions::default()),
            Err(SmdError::InvalidNodeIndex { index: 3, count: 1 })
        ));
    }
}
