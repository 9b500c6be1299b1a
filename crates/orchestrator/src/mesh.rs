//! Mesh preprocessing: vertex welding, degenerate triangle removal and the
//! local-to-world transform applied before the mesh reaches the solver.

use glam::Vec3;
use sph_kernel::Triangle;
use thiserror::Error;

/// Errors raised by [`weld`] on malformed index buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    /// An index points past the end of the vertex buffer.
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        /// Offending index
        index: u32,
        /// Length of the vertex buffer
        vertex_count: usize,
    },
    /// The index buffer length is not a multiple of three.
    #[error("index buffer of length {len} ends with a partial triangle")]
    PartialTriangle {
        /// Length of the index buffer
        len: usize,
    },
}

/// Deduplicated vertices plus triangle indices into them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedMesh {
    /// Unique vertex positions
    pub vertices: Vec<Vec3>,
    /// Three indices per triangle
    pub indices: Vec<u32>,
}

/// Merge vertices closer than `tolerance` and drop triangles that collapse.
///
/// Each input vertex maps to the first kept vertex within `tolerance`, or is
/// kept itself. Triangles whose remapped corners repeat an index, or whose area
/// is negligible, are discarded. Matching is a linear scan over kept vertices.
pub fn weld(vertices: &[Vec3], indices: &[u32], tolerance: f32) -> Result<IndexedMesh, MeshError> {
    if indices.len() % 3 != 0 {
        return Err(MeshError::PartialTriangle { len: indices.len() });
    }
    if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
        return Err(MeshError::IndexOutOfRange {
            index,
            vertex_count: vertices.len(),
        });
    }

    let tolerance_sq = tolerance * tolerance;
    let mut kept: Vec<Vec3> = Vec::new();
    let remap: Vec<u32> = vertices
        .iter()
        .map(|&v| {
            match kept.iter().position(|&k| k.distance_squared(v) < tolerance_sq) {
                Some(existing) => existing as u32,
                None => {
                    kept.push(v);
                    (kept.len() - 1) as u32
                }
            }
        })
        .collect();

    let mut welded = Vec::with_capacity(indices.len());
    let mut dropped = 0usize;
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [remap[tri[0] as usize], remap[tri[1] as usize], remap[tri[2] as usize]];
        let collapsed = a == b || b == c || a == c;
        if collapsed
            || Triangle::new(kept[a as usize], kept[b as usize], kept[c as usize]).is_degenerate()
        {
            dropped += 1;
            continue;
        }
        welded.extend_from_slice(&[a, b, c]);
    }

    tracing::info!(
        "Welded mesh: {} -> {} vertices, {} triangles kept, {} dropped",
        vertices.len(),
        kept.len(),
        welded.len() / 3,
        dropped
    );

    Ok(IndexedMesh {
        vertices: kept,
        indices: welded,
    })
}

impl IndexedMesh {
    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Scale every vertex about the origin, then translate it.
    pub fn transformed(mut self, scale: f32, translation: Vec3) -> Self {
        for v in &mut self.vertices {
            *v = *v * scale + translation;
        }
        self
    }

    /// Triangles in world space, ready for the solver.
    pub fn triangles(&self) -> Vec<Triangle> {
        self.indices
            .chunks_exact(3)
            .map(|t| {
                Triangle::new(
                    self.vertices[t[0] as usize],
                    self.vertices[t[1] as usize],
                    self.vertices[t[2] as usize],
                )
            })
            .collect()
    }
}
