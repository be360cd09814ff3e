//! Generalized quadric error algebra
//!
//! A quadric represents the cost function `Q(v) = v^T A v + 2 b^T v + c`
//! over the run's attribute space. `A` is symmetric and stored as its upper
//! triangle only. Quadrics are additive: merging two vertices' histories is
//! a componentwise sum.

use crate::attributes::{AttrVec, MAX_DIM};

/// Packed length of the upper triangle of a `MAX_DIM x MAX_DIM` matrix.
const TRI_LEN: usize = MAX_DIM * (MAX_DIM + 1) / 2;

/// Pivot magnitude below which the system matrix is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// Quadratic cost function over the generalized attribute space.
#[derive(Debug, Clone, Copy)]
pub struct Quadric {
    /// Upper triangle of `A`, packed row-major for the active dimension.
    upper: [f64; TRI_LEN],
    b: [f64; MAX_DIM],
    c: f64,
    dim: usize,
}

impl Quadric {
    pub fn zeros(dim: usize) -> Self {
        Self {
            upper: [0.0; TRI_LEN],
            b: [0.0; MAX_DIM],
            c: 0.0,
            dim,
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Packed index of entry `(i, j)` with `i <= j`.
    #[inline]
    fn tri_index(&self, i: usize, j: usize) -> usize {
        i * (2 * self.dim - i + 1) / 2 + (j - i)
    }

    /// Symmetric lookup of `A[i][j]`.
    #[inline]
    fn at(&self, i: usize, j: usize) -> f64 {
        if i <= j {
            self.upper[self.tri_index(i, j)]
        } else {
            self.upper[self.tri_index(j, i)]
        }
    }

    /// Squared-distance quadric to the "plane" through three points of the
    /// attribute space, built from the orthonormal 2-frame spanning it:
    /// `e1 = normalize(q - p)`, `e2` the Gram-Schmidt remainder of `r - p`.
    /// When the triangle is degenerate the failed axis normalizes to the
    /// zero vector and simply contributes nothing.
    pub fn from_triangle(p: &AttrVec, q: &AttrVec, r: &AttrVec) -> Self {
        let dim = p.dim();
        let e1 = q.sub(p).normalized();
        let mut rp = r.sub(p);
        let rp_e1 = rp.dot(&e1);
        rp.add_scaled(&e1, -rp_e1);
        let e2 = rp.normalized();

        let mut out = Self::zeros(dim);

        // A = I - e1 e1^T - e2 e2^T
        let mut k = 0usize;
        for i in 0..dim {
            for j in i..dim {
                let ident = if i == j { 1.0 } else { 0.0 };
                out.upper[k] = ident - e1[i] * e1[j] - e2[i] * e2[j];
                k += 1;
            }
        }

        let p_e1 = p.dot(&e1);
        let p_e2 = p.dot(&e2);

        // b = (p.e1) e1 + (p.e2) e2 - p
        for i in 0..dim {
            out.b[i] = p_e1 * e1[i] + p_e2 * e2[i] - p[i];
        }

        // c = p.p - (p.e1)^2 - (p.e2)^2
        out.c = p.dot(p) - p_e1 * p_e1 - p_e2 * p_e2;

        out
    }

    /// Restrict the quadric to the position block by zeroing the matrix
    /// diagonal above the first three dimensions. Used for boundary-edge
    /// quadrics so they only penalize positional movement.
    pub fn restrict_to_position(&mut self) {
        for i in 3..self.dim {
            let k = self.tri_index(i, i);
            self.upper[k] = 0.0;
        }
    }

    /// Scale every component by `s`.
    pub fn scale(&mut self, s: f64) {
        for v in self.upper.iter_mut() {
            *v *= s;
        }
        for v in self.b.iter_mut() {
            *v *= s;
        }
        self.c *= s;
    }

    /// Componentwise accumulation: `self += other`.
    pub fn add(&mut self, other: &Quadric) {
        for (a, b) in self.upper.iter_mut().zip(other.upper.iter()) {
            *a += *b;
        }
        for (a, b) in self.b.iter_mut().zip(other.b.iter()) {
            *a += *b;
        }
        self.c += other.c;
    }

    /// Evaluate `v^T A v + 2 b^T v + c` directly from the packed storage.
    pub fn eval(&self, v: &AttrVec) -> f64 {
        let mut acc = self.c;
        for i in 0..self.dim {
            acc += 2.0 * self.b[i] * v[i];
            acc += self.at(i, i) * v[i] * v[i];
            for j in (i + 1)..self.dim {
                acc += 2.0 * self.at(i, j) * v[i] * v[j];
            }
        }
        acc
    }

    /// Solve `A v = -b` for the stationary point of the quadratic form via
    /// Gauss-Jordan elimination with partial pivoting over a stack buffer.
    /// Returns `None` when the matrix is singular or ill-conditioned.
    pub fn solve_optimal(&self) -> Option<AttrVec> {
        let d = self.dim;
        let mut m = [[0.0f64; MAX_DIM]; MAX_DIM];
        let mut rhs = [0.0f64; MAX_DIM];

        for i in 0..d {
            for j in 0..d {
                m[i][j] = self.at(i, j);
            }
            rhs[i] = -self.b[i];
        }

        for col in 0..d {
            let mut pivot = col;
            for row in (col + 1)..d {
                if m[row][col].abs() > m[pivot][col].abs() {
                    pivot = row;
                }
            }
            if m[pivot][col].abs() < SINGULAR_EPS {
                return None;
            }
            m.swap(col, pivot);
            rhs.swap(col, pivot);

            let inv = 1.0 / m[col][col];
            for j in col..d {
                m[col][j] *= inv;
            }
            rhs[col] *= inv;

            for row in 0..d {
                if row == col {
                    continue;
                }
                let f = m[row][col];
                if f == 0.0 {
                    continue;
                }
                for j in col..d {
                    m[row][j] -= f * m[col][j];
                }
                rhs[row] -= f * rhs[col];
            }
        }

        let mut out = AttrVec::zeros(d);
        for i in 0..d {
            if !rhs[i].is_finite() {
                return None;
            }
            out[i] = rhs[i];
        }
        Some(out)
    }
}

/// Optimal merged position and cost for a combined quadric.
///
/// Prefers the closed-form stationary point when requested and solvable;
/// otherwise evaluates the quadric at both endpoints and their midpoint and
/// keeps the cheapest, which is always finite even on locally planar or
/// degenerate surfaces.
pub fn optimal_merge(
    q: &Quadric,
    va: &AttrVec,
    vb: &AttrVec,
    use_optimal: bool,
) -> (AttrVec, f64) {
    if use_optimal {
        if let Some(v) = q.solve_optimal() {
            return (v, q.eval(&v));
        }
    }

    let mut best = (*va, q.eval(va));
    let cost_b = q.eval(vb);
    if cost_b < best.1 {
        best = (*vb, cost_b);
    }
    let mid = AttrVec::midpoint(va, vb);
    let cost_mid = q.eval(&mid);
    if cost_mid < best.1 {
        best = (mid, cost_mid);
    }
    best
}
