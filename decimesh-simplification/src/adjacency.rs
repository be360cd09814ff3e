//! Vertex adjacency, boundary detection and the optional spatial merge index
//!
//! A single pass over the index buffer yields per-vertex incident-face lists
//! and neighbor sets. Edges referenced by exactly one triangle are boundary
//! edges; each contributes a penalty quadric to both endpoints. When a merge
//! distance threshold is configured, a uniform hash grid over the weighted
//! positions links spatially close vertices that share no edge, enabling
//! merges across disconnected islands and near-duplicate seams.

use std::collections::{HashMap, HashSet};

use decimesh_core::Vector3d;
use tracing::debug;

use crate::attributes::{AttrVec, AttributeLayout};
use crate::quadric::Quadric;

/// Per-vertex connectivity derived from the index buffer.
pub struct Adjacency {
    /// Face indices referencing each vertex, de-duplicated.
    pub incident_faces: Vec<Vec<usize>>,
    /// Vertices sharing at least one triangle edge (plus spatial links).
    pub neighbors: Vec<HashSet<usize>>,
    /// Singly-referenced edges as `(vertex, vertex, owning face)`.
    pub boundary_edges: Vec<(usize, usize, usize)>,
}

impl Adjacency {
    pub fn build(faces: &[[usize; 3]], face_alive: &[bool], vertex_count: usize) -> Self {
        let mut incident_faces = vec![Vec::new(); vertex_count];
        let mut neighbors: Vec<HashSet<usize>> = vec![HashSet::new(); vertex_count];
        let mut edge_refs: HashMap<(usize, usize), (usize, usize)> = HashMap::new();

        for (fi, face) in faces.iter().enumerate() {
            if !face_alive[fi] {
                continue;
            }
            for k in 0..3 {
                let a = face[k];
                let b = face[(k + 1) % 3];
                incident_faces[a].push(fi);
                neighbors[a].insert(b);
                neighbors[b].insert(a);

                let key = if a < b { (a, b) } else { (b, a) };
                let entry = edge_refs.entry(key).or_insert((0, fi));
                entry.0 += 1;
            }
        }

        let boundary_edges: Vec<(usize, usize, usize)> = edge_refs
            .into_iter()
            .filter(|&(_, (count, _))| count == 1)
            .map(|((a, b), (_, fi))| (a, b, fi))
            .collect();

        debug!(
            boundary_edges = boundary_edges.len(),
            "adjacency built"
        );

        Self {
            incident_faces,
            neighbors,
            boundary_edges,
        }
    }
}

/// Unit face normal from the position block of the attribute vectors.
/// `replace` substitutes a vertex's position, used by the flip guard to
/// evaluate post-merge normals. `None` when the triangle is degenerate.
pub(crate) fn face_normal(
    face: &[usize; 3],
    vectors: &[AttrVec],
    position_offset: usize,
    replace: Option<(usize, &AttrVec)>,
) -> Option<Vector3d> {
    let pos = |v: usize| -> Vector3d {
        let src = match replace {
            Some((moved, new_pos)) if moved == v => new_pos,
            _ => &vectors[v],
        };
        Vector3d::new(
            src[position_offset],
            src[position_offset + 1],
            src[position_offset + 2],
        )
    };

    let p0 = pos(face[0]);
    let e1 = pos(face[1]) - p0;
    let e2 = pos(face[2]) - p0;
    let n = e1.cross(&e2);
    let len = n.norm();
    if len < 1e-12 {
        return None;
    }
    Some(n / len)
}

/// Accumulate a penalty quadric onto both endpoints of every boundary edge.
///
/// The quadric is built through the edge and the point one face-normal away
/// from it, then restricted to the position block: moving a boundary vertex
/// off its incident surface's silhouette plane becomes expensive.
pub fn add_boundary_quadrics(
    adj: &Adjacency,
    faces: &[[usize; 3]],
    vectors: &[AttrVec],
    layout: &AttributeLayout,
    boundary_weight: f64,
    quadrics: &mut [Quadric],
) -> usize {
    let Some(po) = layout.position else {
        return 0;
    };

    let mut added = 0usize;
    for &(va, vb, fi) in &adj.boundary_edges {
        let Some(n) = face_normal(&faces[fi], vectors, po, None) else {
            continue;
        };

        let p = vectors[va];
        let q = vectors[vb];
        let mut r = p;
        r[po] += n.x;
        r[po + 1] += n.y;
        r[po + 2] += n.z;

        let mut quad = Quadric::from_triangle(&p, &q, &r);
        quad.restrict_to_position();
        quad.scale(boundary_weight);

        quadrics[va].add(&quad);
        quadrics[vb].add(&quad);
        added += 1;
    }

    added
}

/// Uniform hash grid over the position block of the attribute vectors,
/// bucketed at the merge distance. Cell addressing is relative to the mesh
/// bounding-box minimum.
pub struct SpatialGrid {
    cell: f64,
    origin: [f64; 3],
    buckets: HashMap<(i64, i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    pub fn build(
        vectors: &[AttrVec],
        position_offset: usize,
        cell: f64,
        origin: [f64; 3],
    ) -> Self {
        let mut grid = Self {
            cell,
            origin,
            buckets: HashMap::new(),
        };
        for (vi, v) in vectors.iter().enumerate() {
            let key = grid.key([
                v[position_offset],
                v[position_offset + 1],
                v[position_offset + 2],
            ]);
            grid.buckets.entry(key).or_default().push(vi);
        }
        grid
    }

    fn key(&self, p: [f64; 3]) -> (i64, i64, i64) {
        (
            ((p[0] - self.origin[0]) / self.cell).floor() as i64,
            ((p[1] - self.origin[1]) / self.cell).floor() as i64,
            ((p[2] - self.origin[2]) / self.cell).floor() as i64,
        )
    }
}

/// Link every vertex to the spatially close vertices it shares no edge with.
/// Vertices with no incident faces are never linked: they have nothing to
/// collapse and must not become merge candidates. Returns the number of
/// links added.
pub fn add_spatial_neighbors(
    neighbors: &mut [HashSet<usize>],
    incident_faces: &[Vec<usize>],
    vectors: &[AttrVec],
    layout: &AttributeLayout,
    radius: f64,
    origin: [f64; 3],
) -> usize {
    let Some(po) = layout.position else {
        return 0;
    };

    let grid = SpatialGrid::build(vectors, po, radius.max(1e-9), origin);
    let r2 = radius * radius;
    let mut added = 0usize;

    for (vi, v) in vectors.iter().enumerate() {
        if incident_faces[vi].is_empty() {
            continue;
        }
        let p = [v[po], v[po + 1], v[po + 2]];
        let center = grid.key(p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = (center.0 + dx, center.1 + dy, center.2 + dz);
                    let Some(bucket) = grid.buckets.get(&key) else {
                        continue;
                    };
                    for &vj in bucket {
                        if vj <= vi
                            || incident_faces[vj].is_empty()
                            || neighbors[vi].contains(&vj)
                        {
                            continue;
                        }
                        let w = &vectors[vj];
                        let ddx = w[po] - p[0];
                        let ddy = w[po + 1] - p[1];
                        let ddz = w[po + 2] - p[2];
                        if ddx * ddx + ddy * ddy + ddz * ddz <= r2 {
                            neighbors[vi].insert(vj);
                            neighbors[vj].insert(vi);
                            added += 1;
                        }
                    }
                }
            }
        }
    }

    if added > 0 {
        debug!(links = added, "spatial merge links added");
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{vectorize, AttributeWeights};
    use decimesh_core::{Point3f, TriangleMesh};

    fn make_quad() -> TriangleMesh {
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
    fn test_adjacency_neighbors_and_faces() {
        let mesh = make_quad();
        let alive = vec![true; 2];
        let adj = Adjacency::build(&mesh.faces, &alive, 4);

        assert_eq!(adj.incident_faces[0], vec![0]);
        assert_eq!(adj.incident_faces[1].len(), 2);
        assert_eq!(adj.neighbors[1].len(), 3);
        assert_eq!(adj.neighbors[0].len(), 2);
    }

    #[test]
    fn test_boundary_edges_of_open_quad() {
        let mesh = make_quad();
        let alive = vec![true; 2];
        let adj = Adjacency::build(&mesh.faces, &alive, 4);

        // The shared diagonal (1, 2) is interior; the other four are boundary.
        assert_eq!(adj.boundary_edges.len(), 4);
        assert!(adj
            .boundary_edges
            .iter()
            .all(|&(a, b, _)| !(a.min(b) == 1 && a.max(b) == 2)));
    }

    #[test]
    fn test_dead_faces_ignored() {
        let mesh = make_quad();
        let alive = vec![true, false];
        let adj = Adjacency::build(&mesh.faces, &alive, 4);

        assert!(adj.incident_faces[3].is_empty());
        assert!(adj.neighbors[3].is_empty());
        assert_eq!(adj.boundary_edges.len(), 3);
    }

    #[test]
    fn test_boundary_quadrics_penalize_leaving_the_edge() {
        let mesh = make_quad();
        let weights = AttributeWeights::default();
        let (layout, vectors) = vectorize(&mesh, &weights);
        let alive = vec![true; 2];
        let adj = Adjacency::build(&mesh.faces, &alive, 4);

        let mut quadrics = vec![Quadric::zeros(layout.dim); 4];
        let added = add_boundary_quadrics(&adj, &mesh.faces, &vectors, &layout, 1.0, &mut quadrics);
        assert_eq!(added, 4);

        // Vertex 0 sits on boundary edges (0,1) and (0,2). Staying put is
        // free; sliding along an incident boundary edge stays cheap, while
        // moving perpendicular to one inside the surface plane costs.
        assert!(quadrics[0].eval(&vectors[0]).abs() < 1e-9);
        let mut off = vectors[0];
        off[1] += 1.0;
        assert!(quadrics[0].eval(&off) > 0.1);
    }

    #[test]
    fn test_spatial_links_join_islands() {
        // Two separate triangles, 0.05 apart along x.
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(1.05, 0.0, 0.0),
                Point3f::new(2.05, 0.0, 0.0),
                Point3f::new(1.55, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        );
        let weights = AttributeWeights::default();
        let (layout, vectors) = vectorize(&mesh, &weights);
        let alive = vec![true; 2];
        let mut adj = Adjacency::build(&mesh.faces, &alive, 6);

        assert!(!adj.neighbors[1].contains(&3));
        let added = add_spatial_neighbors(
            &mut adj.neighbors,
            &adj.incident_faces,
            &vectors,
            &layout,
            0.1,
            [0.0, 0.0, 0.0],
        );
        assert_eq!(added, 1);
        assert!(adj.neighbors[1].contains(&3));
        assert!(adj.neighbors[3].contains(&1));
    }

    #[test]
    fn test_unused_vertices_get_no_spatial_links() {
        // Vertex 3 sits within the radius of vertex 1 but belongs to no face.
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(1.05, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        let weights = AttributeWeights::default();
        let (layout, vectors) = vectorize(&mesh, &weights);
        let alive = vec![true];
        let mut adj = Adjacency::build(&mesh.faces, &alive, 4);

        let added = add_spatial_neighbors(
            &mut adj.neighbors,
            &adj.incident_faces,
            &vectors,
            &layout,
            0.1,
            [0.0, 0.0, 0.0],
        );
        assert_eq!(added, 0);
        assert!(adj.neighbors[3].is_empty());
        assert!(!adj.neighbors[1].contains(&3));
    }
}
