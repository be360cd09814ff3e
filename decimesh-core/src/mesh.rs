//! Mesh data structures and functionality

use crate::point::*;
use serde::{Deserialize, Serialize};

/// Primitive topology of an index buffer.
///
/// The simplification algorithms only operate on triangle lists; other
/// topologies are carried through so callers can tag meshes built for
/// wireframe or point rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveTopology {
    TriangleList,
    LineList,
    PointList,
}

impl Default for PrimitiveTopology {
    fn default() -> Self {
        PrimitiveTopology::TriangleList
    }
}

/// A triangle mesh with per-vertex attributes.
///
/// Positions are mandatory; normals, colors and texture coordinates are
/// optional and, when present, run parallel to `positions`. The `Option`
/// fields double as the attribute catalog: consumers query presence instead
/// of probing accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub topology: PrimitiveTopology,
    pub positions: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            positions: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
            uvs: None,
        }
    }

    /// Create a mesh from vertex positions and faces
    pub fn from_vertices_and_faces(positions: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            positions,
            faces,
            normals: None,
            colors: None,
            uvs: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, position: Point3f) -> usize {
        let index = self.positions.len();
        self.positions.push(position);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Set vertex normals; ignored if the length does not match the vertex count
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.positions.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors (RGBA); ignored if the length does not match the vertex count
    pub fn set_colors(&mut self, colors: Vec<[f32; 4]>) {
        if colors.len() == self.positions.len() {
            self.colors = Some(colors);
        }
    }

    /// Set texture coordinates; ignored if the length does not match the vertex count
    pub fn set_uvs(&mut self, uvs: Vec<[f32; 2]>) {
        if uvs.len() == self.positions.len() {
            self.uvs = Some(uvs);
        }
    }

    /// Calculate face normals
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.positions[face[0]];
                let v1 = self.positions[face[1]];
                let v2 = self.positions[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1.cross(&edge2).normalize()
            })
            .collect()
    }

    /// Axis-aligned bounding box of the vertex positions
    pub fn bounding_box(&self) -> (Point3f, Point3f) {
        if self.positions.is_empty() {
            return (Point3f::origin(), Point3f::origin());
        }

        let mut min = self.positions[0];
        let mut max = self.positions[0];

        for p in &self.positions {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);

            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        (min, max)
    }

    /// Drop every vertex not referenced by any face, remapping face indices.
    ///
    /// Returns the number of vertices removed. Attribute arrays are compacted
    /// in lockstep with the positions.
    pub fn remove_unreferenced_vertices(&mut self) -> usize {
        let mut used = vec![false; self.positions.len()];
        for face in &self.faces {
            for &v in face {
                if v < used.len() {
                    used[v] = true;
                }
            }
        }

        let unused = used.iter().filter(|&&u| !u).count();
        if unused == 0 {
            return 0;
        }

        let mut remap = vec![usize::MAX; self.positions.len()];
        let mut next = 0usize;
        for (i, &keep) in used.iter().enumerate() {
            if keep {
                remap[i] = next;
                next += 1;
            }
        }

        fn filter_parallel<T>(keep: &[bool], items: &mut Vec<T>) {
            let mut idx = 0usize;
            items.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }

        filter_parallel(&used, &mut self.positions);
        if let Some(normals) = self.normals.as_mut() {
            filter_parallel(&used, normals);
        }
        if let Some(colors) = self.colors.as_mut() {
            filter_parallel(&used, colors);
        }
        if let Some(uvs) = self.uvs.as_mut() {
            filter_parallel(&used, uvs);
        }

        for face in self.faces.iter_mut() {
            for v in face.iter_mut() {
                *v = remap[*v];
            }
        }

        unused
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.positions.clear();
        self.faces.clear();
        self.normals = None;
        self.colors = None;
        self.uvs = None;
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_two_triangles() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(1.5, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        )
    }

    #[test]
    fn test_counts_and_empty() {
        let mesh = make_two_triangles();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        assert!(!mesh.is_empty());
        assert!(TriangleMesh::new().is_empty());
    }

    #[test]
    fn test_set_attributes_length_checked() {
        let mut mesh = make_two_triangles();
        mesh.set_normals(vec![Vector3f::new(0.0, 0.0, 1.0); 4]);
        assert!(mesh.normals.is_some());

        mesh.set_colors(vec![[1.0, 0.0, 0.0, 1.0]; 3]); // wrong length
        assert!(mesh.colors.is_none());

        mesh.set_uvs(vec![[0.0, 0.0]; 4]);
        assert!(mesh.uvs.is_some());
    }

    #[test]
    fn test_face_normals() {
        let mesh = make_two_triangles();
        let normals = mesh.calculate_face_normals();
        assert_eq!(normals.len(), 2);
        for n in normals {
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_bounding_box() {
        let mesh = make_two_triangles();
        let (min, max) = mesh.bounding_box();
        assert_relative_eq!(min.x, 0.0);
        assert_relative_eq!(max.x, 1.5);
        assert_relative_eq!(max.y, 1.0);
    }

    #[test]
    fn test_remove_unreferenced_vertices() {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(9.0, 9.0, 9.0), // unreferenced
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
            ],
            vec![[0, 2, 3]],
        );
        mesh.set_uvs(vec![[0.0, 0.0], [0.9, 0.9], [1.0, 0.0], [0.5, 1.0]]);

        let dropped = mesh.remove_unreferenced_vertices();
        assert_eq!(dropped, 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.uvs.as_ref().unwrap().len(), 3);

        // Second pass is a no-op
        assert_eq!(mesh.remove_unreferenced_vertices(), 0);
    }
}
