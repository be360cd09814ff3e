//! Attribute vectorization
//!
//! Builds the per-vertex generalized attribute vector: the concatenation of
//! weighted position, normal, color and texture-coordinate values. The
//! vector's dimensionality is decided once per run from the caller's weights
//! and the mesh's attribute catalog; a zero weight or a missing attribute
//! excludes that attribute entirely.

use decimesh_core::{Point3f, TriangleMesh, Vector3f};
use tracing::debug;

/// Maximum total dimension of the generalized attribute space
/// (3 position + 3 normal + 4 color + 2 texcoord).
pub const MAX_DIM: usize = 12;

/// Per-attribute weights controlling each attribute's contribution to the
/// merge cost. A weight of zero disables the attribute. Immutable for the
/// duration of a simplification run.
#[derive(Debug, Clone, Copy)]
pub struct AttributeWeights {
    pub position: f64,
    pub normal: f64,
    pub color: f64,
    pub texcoord: f64,
    /// Strength of the boundary-edge penalty quadrics; zero disables them.
    pub boundary: f64,
}

impl Default for AttributeWeights {
    fn default() -> Self {
        Self {
            position: 1.0,
            normal: 0.0,
            color: 0.0,
            texcoord: 0.0,
            boundary: 0.0,
        }
    }
}

/// A dense vector of runtime dimension backed by fixed inline storage.
///
/// Avoids a heap allocation per vertex; only the first `dim` entries are
/// meaningful.
#[derive(Debug, Clone, Copy)]
pub struct AttrVec {
    data: [f64; MAX_DIM],
    dim: usize,
}

impl AttrVec {
    pub fn zeros(dim: usize) -> Self {
        Self {
            data: [0.0; MAX_DIM],
            dim,
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn dot(&self, other: &Self) -> f64 {
        let mut acc = 0.0;
        for i in 0..self.dim {
            acc += self.data[i] * other.data[i];
        }
        acc
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn sub(&self, other: &Self) -> Self {
        let mut out = Self::zeros(self.dim);
        for i in 0..self.dim {
            out.data[i] = self.data[i] - other.data[i];
        }
        out
    }

    /// `self += other * s`
    pub fn add_scaled(&mut self, other: &Self, s: f64) {
        for i in 0..self.dim {
            self.data[i] += other.data[i] * s;
        }
    }

    /// Unit vector in the same direction, or the zero vector when the norm
    /// is too small to normalize. The zero result makes degenerate triangle
    /// frames contribute nothing along the failed axis.
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        let mut out = Self::zeros(self.dim);
        if n > 1e-12 {
            let inv = 1.0 / n;
            for i in 0..self.dim {
                out.data[i] = self.data[i] * inv;
            }
        }
        out
    }

    pub fn midpoint(a: &Self, b: &Self) -> Self {
        let mut out = Self::zeros(a.dim);
        for i in 0..a.dim {
            out.data[i] = (a.data[i] + b.data[i]) * 0.5;
        }
        out
    }
}

impl std::ops::Index<usize> for AttrVec {
    type Output = f64;

    #[inline]
    fn index(&self, i: usize) -> &f64 {
        &self.data[i]
    }
}

impl std::ops::IndexMut<usize> for AttrVec {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.data[i]
    }
}

/// Offsets of each enabled attribute inside the vector, in the fixed order
/// position, normal, color, texcoord. `dim` is the total active length.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeLayout {
    pub dim: usize,
    pub position: Option<usize>,
    pub normal: Option<usize>,
    pub color: Option<usize>,
    pub texcoord: Option<usize>,
}

impl AttributeLayout {
    /// Descale the position block back into mesh units.
    pub fn position_of(&self, weights: &AttributeWeights, v: &AttrVec) -> Option<Point3f> {
        self.position.map(|o| {
            let inv = 1.0 / weights.position;
            Point3f::new(
                (v[o] * inv) as f32,
                (v[o + 1] * inv) as f32,
                (v[o + 2] * inv) as f32,
            )
        })
    }

    pub fn normal_of(&self, weights: &AttributeWeights, v: &AttrVec) -> Option<Vector3f> {
        self.normal.map(|o| {
            let inv = 1.0 / weights.normal;
            Vector3f::new(
                (v[o] * inv) as f32,
                (v[o + 1] * inv) as f32,
                (v[o + 2] * inv) as f32,
            )
        })
    }

    pub fn color_of(&self, weights: &AttributeWeights, v: &AttrVec) -> Option<[f32; 4]> {
        self.color.map(|o| {
            let inv = 1.0 / weights.color;
            [
                (v[o] * inv) as f32,
                (v[o + 1] * inv) as f32,
                (v[o + 2] * inv) as f32,
                (v[o + 3] * inv) as f32,
            ]
        })
    }

    pub fn texcoord_of(&self, weights: &AttributeWeights, v: &AttrVec) -> Option<[f32; 2]> {
        self.texcoord
            .map(|o| [(v[o] / weights.texcoord) as f32, (v[o + 1] / weights.texcoord) as f32])
    }
}

/// Assemble the attribute layout and one weighted vector per vertex.
///
/// An attribute participates only when its weight is positive and the mesh
/// carries it; the run proceeds with whatever dimensionality remains. A
/// resulting `dim` of zero means no attribute contributed and the caller
/// must treat the whole simplification as a no-op.
pub fn vectorize(mesh: &TriangleMesh, weights: &AttributeWeights) -> (AttributeLayout, Vec<AttrVec>) {
    let mut layout = AttributeLayout::default();
    let mut dim = 0usize;

    if weights.position > 0.0 {
        layout.position = Some(dim);
        dim += 3;
    }
    if weights.normal > 0.0 && mesh.normals.is_some() {
        layout.normal = Some(dim);
        dim += 3;
    }
    if weights.color > 0.0 && mesh.colors.is_some() {
        layout.color = Some(dim);
        dim += 4;
    }
    if weights.texcoord > 0.0 && mesh.uvs.is_some() {
        layout.texcoord = Some(dim);
        dim += 2;
    }
    layout.dim = dim;

    let mut vectors = Vec::with_capacity(mesh.positions.len());
    for i in 0..mesh.positions.len() {
        let mut v = AttrVec::zeros(dim);
        if let Some(o) = layout.position {
            let p = mesh.positions[i];
            v[o] = p.x as f64 * weights.position;
            v[o + 1] = p.y as f64 * weights.position;
            v[o + 2] = p.z as f64 * weights.position;
        }
        if let (Some(o), Some(normals)) = (layout.normal, mesh.normals.as_ref()) {
            let n = normals[i];
            v[o] = n.x as f64 * weights.normal;
            v[o + 1] = n.y as f64 * weights.normal;
            v[o + 2] = n.z as f64 * weights.normal;
        }
        if let (Some(o), Some(colors)) = (layout.color, mesh.colors.as_ref()) {
            for (k, &c) in colors[i].iter().enumerate() {
                v[o + k] = c as f64 * weights.color;
            }
        }
        if let (Some(o), Some(uvs)) = (layout.texcoord, mesh.uvs.as_ref()) {
            for (k, &t) in uvs[i].iter().enumerate() {
                v[o + k] = t as f64 * weights.texcoord;
            }
        }
        vectors.push(v);
    }

    debug!(dim, "attribute space assembled");
    (layout, vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_mesh() -> TriangleMesh {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(1.0, 2.0, 3.0),
                Point3f::new(4.0, 5.0, 6.0),
                Point3f::new(7.0, 8.0, 9.0),
            ],
            vec![[0, 1, 2]],
        );
        mesh.set_normals(vec![Vector3f::new(0.0, 0.0, 1.0); 3]);
        mesh.set_uvs(vec![[0.25, 0.75]; 3]);
        mesh
    }

    #[test]
    fn test_layout_skips_zero_weight() {
        let mesh = make_mesh();
        let weights = AttributeWeights {
            position: 2.0,
            normal: 0.0,
            color: 1.0, // mesh has no colors
            texcoord: 1.0,
            boundary: 0.0,
        };
        let (layout, vectors) = vectorize(&mesh, &weights);

        assert_eq!(layout.dim, 5); // 3 position + 2 texcoord
        assert_eq!(layout.position, Some(0));
        assert!(layout.normal.is_none());
        assert!(layout.color.is_none());
        assert_eq!(layout.texcoord, Some(3));

        assert_relative_eq!(vectors[0][0], 2.0); // x * 2
        assert_relative_eq!(vectors[0][3], 0.25);
        assert_relative_eq!(vectors[0][4], 0.75);
    }

    #[test]
    fn test_zero_dimension_when_nothing_usable() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![Point3f::origin(); 3],
            vec![[0, 1, 2]],
        );
        let weights = AttributeWeights {
            position: 0.0,
            normal: 1.0, // absent
            color: 0.0,
            texcoord: 0.0,
            boundary: 0.0,
        };
        let (layout, _) = vectorize(&mesh, &weights);
        assert_eq!(layout.dim, 0);
    }

    #[test]
    fn test_descale_round_trip() {
        let mesh = make_mesh();
        let weights = AttributeWeights {
            position: 3.0,
            normal: 0.5,
            color: 0.0,
            texcoord: 2.0,
            boundary: 0.0,
        };
        let (layout, vectors) = vectorize(&mesh, &weights);

        let p = layout.position_of(&weights, &vectors[1]).unwrap();
        assert_relative_eq!(p.x, 4.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 6.0, epsilon = 1e-6);

        let n = layout.normal_of(&weights, &vectors[1]).unwrap();
        assert_relative_eq!(n.z, 1.0, epsilon = 1e-6);

        let uv = layout.texcoord_of(&weights, &vectors[2]).unwrap();
        assert_relative_eq!(uv[0], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_attr_vec_normalize_degenerate() {
        let v = AttrVec::zeros(4);
        let unit = v.normalized();
        assert_relative_eq!(unit.norm(), 0.0);

        let mut w = AttrVec::zeros(4);
        w[0] = 3.0;
        w[1] = 4.0;
        assert_relative_eq!(w.normalized().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_attr_vec_ops() {
        let mut a = AttrVec::zeros(3);
        a[0] = 1.0;
        a[1] = 2.0;
        let mut b = AttrVec::zeros(3);
        b[0] = 3.0;
        b[2] = 1.0;

        assert_relative_eq!(a.dot(&b), 3.0);
        let d = b.sub(&a);
        assert_relative_eq!(d[0], 2.0);
        assert_relative_eq!(d[1], -2.0);

        let m = AttrVec::midpoint(&a, &b);
        assert_relative_eq!(m[0], 2.0);

        b.add_scaled(&a, 2.0);
        assert_relative_eq!(b[1], 4.0);
    }
}
