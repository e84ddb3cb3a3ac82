//! Bone-limited mesh partitioning.
//!
//! The GPU can only address a fixed number of bone matrices per draw call, so
//! a skinned triangle soup is split into sub-meshes whose local bone tables
//! stay within that limit. All sub-meshes share one deduplicated vertex
//! buffer.

use std::collections::{HashMap, VecDeque};

use cgmath::{EuclideanSpace, Point3, Vector3};
use thiserror::Error;

use h3d_common::Aabb;

use crate::mesh::{Skinning, SubMesh, Vertex, VertexKey, MAX_SUBMESH_BONES};
use crate::pica::quantize_weight;

/// Bone limit of the target hardware.
pub const DEFAULT_BONE_LIMIT: usize = MAX_SUBMESH_BONES;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    /// A pass committed nothing: some triangle needs more bones than the
    /// limit allows. A triangle uses at most 12 bones, so this only happens
    /// with a limit below 12.
    #[error("Triangle needs {bones} bones but the sub-mesh limit is {limit}")]
    NoProgress { bones: usize, limit: usize },

    #[error("Mesh has {0} unique vertices, more than 16-bit indices can address")]
    TooManyVertices(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedMesh {
    /// Deduplicated vertices with sub-mesh local bone indices.
    pub vertices: Vec<Vertex>,
    pub submeshes: Vec<SubMesh>,
    /// Bounds of the emitted vertices; `None` when there are none.
    pub bounds: Option<Aabb>,
}

impl PartitionedMesh {
    pub fn center(&self) -> Vector3<f32> {
        self.bounds
            .map(|b| b.center().to_vec())
            .unwrap_or_else(|| Vector3::new(0.0, 0.0, 0.0))
    }
}

/// Snaps weights to their stored precision. A slot whose weight rounds to
/// zero is emptied so it claims no bone.
fn quantize(mut vertex: Vertex) -> Vertex {
    for slot in 0..4 {
        vertex.weights[slot] = quantize_weight(vertex.weights[slot]);
        if vertex.weights[slot] == 0.0 {
            vertex.bone_indices[slot] = 0;
        }
    }
    vertex
}

/// Global bones referenced by a triangle that `table` does not hold yet,
/// in first-seen order.
fn new_bones(triangle: &[Vertex; 3], table: &[u16]) -> Vec<u16> {
    let mut bones = Vec::new();
    for vertex in triangle {
        for (bone, _) in vertex.influences() {
            if !table.contains(&bone) && !bones.contains(&bone) {
                bones.push(bone);
            }
        }
    }
    bones
}

/// Splits `vertices` (a triangle list with global bone indices) into
/// sub-meshes of at most `bone_limit` bones each.
///
/// Triangles are taken greedily in queue order. A triangle that would push
/// the current sub-mesh over the limit goes back to the end of the queue and
/// the pass moves on. Each pass looks at the triangles queued when it started
/// and closes one sub-mesh. Deferred triangles therefore land after the ones
/// committed before them.
///
/// Weights are snapped to the stored byte precision first, so emitted vertices
/// equal what a container decodes.
///
/// `bone_limit` must be at least 12. A trailing partial triangle is dropped.
pub fn partition_mesh(
    vertices: &[Vertex],
    bone_limit: usize,
) -> Result<PartitionedMesh, PartitionError> {
    let mut queue: VecDeque<[Vertex; 3]> = vertices
        .chunks_exact(3)
        .map(|t| [quantize(t[0]), quantize(t[1]), quantize(t[2])])
        .collect();

    let mut output: Vec<Vertex> = Vec::new();
    let mut lookup: HashMap<VertexKey, u16> = HashMap::new();
    let mut bounds: Option<Aabb> = None;
    let mut submeshes = Vec::new();

    while !queue.is_empty() {
        let mut table: Vec<u16> = Vec::new();
        let mut indices: Vec<u16> = Vec::new();
        let mut smallest_rejected = usize::MAX;

        for _ in 0..queue.len() {
            let Some(mut triangle) = queue.pop_front() else {
                break;
            };

            let fresh = new_bones(&triangle, &table);
            if table.len() + fresh.len() > bone_limit {
                smallest_rejected = smallest_rejected.min(fresh.len());
                queue.push_back(triangle);
                continue;
            }

            for vertex in &mut triangle {
                for slot in 0..4 {
                    if vertex.weights[slot] == 0.0 {
                        vertex.bone_indices[slot] = 0;
                        continue;
                    }
                    let global = vertex.bone_indices[slot];
                    let local = match table.iter().position(|&b| b == global) {
                        Some(local) => local,
                        None => {
                            table.push(global);
                            table.len() - 1
                        }
                    };
                    vertex.bone_indices[slot] = local as u16;
                }

                let key = VertexKey::from(&*vertex);
                let index = match lookup.get(&key) {
                    Some(&index) => index,
                    None => {
                        if output.len() > u16::MAX as usize {
                            return Err(PartitionError::TooManyVertices(output.len() + 1));
                        }
                        let index = output.len() as u16;
                        let position = Point3::from(vertex.position);
                        match bounds.as_mut() {
                            Some(b) => b.extend(position),
                            None => bounds = Some(Aabb::from_point(position)),
                        }
                        output.push(*vertex);
                        lookup.insert(key, index);
                        index
                    }
                };
                indices.push(index);
            }
        }

        if indices.is_empty() {
            return Err(PartitionError::NoProgress {
                bones: smallest_rejected,
                limit: bone_limit,
            });
        }

        log::debug!(
            "Sub-mesh {}: {} triangles, {} bones, {} deferred",
            submeshes.len(),
            indices.len() / 3,
            table.len(),
            queue.len()
        );
        submeshes.push(SubMesh {
            skinning: Skinning::Smooth,
            bone_indices: table,
            indices,
        });
    }

    Ok(PartitionedMesh {
        vertices: output,
        submeshes,
        bounds,
    })
}
