//! STL geometry loading

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use glam::Vec3;
use thiserror::Error;

/// Triangle structure from nom_stl
pub use nom_stl::Triangle as StlTriangle;

/// Errors raised while reading an STL file.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The file could not be opened.
    #[error("failed to open STL file {}: {source}", path.display())]
    Io {
        /// Path that was opened
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The file is neither valid ASCII nor binary STL.
    #[error("failed to parse STL file {}: {message}", path.display())]
    Parse {
        /// Path that was parsed
        path: PathBuf,
        /// Parser diagnostic
        message: String,
    },
}

/// Load an STL file and return its triangles
pub fn load_stl(path: impl AsRef<Path>) -> Result<Vec<StlTriangle>, GeometryError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| GeometryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = BufReader::new(file);

    let mesh = nom_stl::parse_stl(&mut reader).map_err(|e| GeometryError::Parse {
        path: path.to_path_buf(),
        message: format!("{:?}", e),
    })?;

    Ok(mesh.triangles().to_vec())
}

/// Flatten STL triangles into a vertex list and a triangle index list.
///
/// STL stores every triangle's corners separately, so each triangle gets three
/// fresh vertices; shared corners are merged later by [`crate::mesh::weld`].
pub fn triangle_soup(triangles: &[StlTriangle]) -> (Vec<Vec3>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(triangles.len() * 3);
    let mut indices = Vec::with_capacity(triangles.len() * 3);

    for triangle in triangles {
        for corner in triangle.vertices() {
            indices.push(vertices.len() as u32);
            vertices.push(Vec3::from_array(corner));
        }
    }

    (vertices, indices)
}

/// Load an STL file as an unwelded vertex/index soup.
pub fn load_triangle_soup(path: impl AsRef<Path>) -> Result<(Vec<Vec3>, Vec<u32>), GeometryError> {
    let path = path.as_ref();
    let triangles = load_stl(path)?;
    tracing::info!("Loaded {} triangles from {}", triangles.len(), path.display());
    Ok(triangle_soup(&triangles))
}

/// Encode triangles as a binary STL file.
#[cfg(test)]
pub(crate) fn binary_stl(triangles: &[[[f32; 3]; 3]]) -> Vec<u8> {
    let mut bytes = vec![0u8; 80];
    bytes.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
    for tri in triangles {
        // Normal is recomputed by consumers; write zeros.
        bytes.extend_from_slice(&[0u8; 12]);
        for corner in tri {
            for c in corner {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&0u16.to_le_bytes());
    }
    bytes
}
