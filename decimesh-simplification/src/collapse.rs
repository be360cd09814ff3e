//! Greedy edge-collapse simplification
//!
//! The engine repeatedly pops the cheapest merge candidate, optionally vets
//! it against a normal-flip guard, merges the pair, and incrementally
//! updates quadrics, adjacency and the candidate heap. A final reassembly
//! pass compacts surviving vertices and faces into a fresh mesh.
//!
//! Known limitation: a pair vetoed by the flip guard stays vetoed for the
//! rest of the run even though later merges keep reshaping its
//! neighborhood, so the veto can be based on a stale assessment. This keeps
//! the heap bookkeeping simple at the cost of occasionally under-simplifying.

use std::collections::HashSet;

use decimesh_core::{Error, PrimitiveTopology, Result, TriangleMesh};
use tracing::{debug, warn};

use crate::adjacency::{self, Adjacency};
use crate::attributes::{vectorize, AttrVec, AttributeLayout, AttributeWeights};
use crate::candidates::{CandidateHeap, CandidatePriority, BLOCKED_COST};
use crate::quadric::{optimal_merge, Quadric};

/// Invocation parameters for a simplification run.
#[derive(Debug, Clone)]
pub struct SimplifyOptions {
    /// Stop once the live triangle count reaches this value.
    pub target_triangle_count: usize,
    /// Maximum distance at which vertices sharing no edge may still merge.
    /// Zero disables the spatial index entirely.
    pub merge_distance_threshold: f64,
    /// Solve for the quadric-optimal merged position; when false the
    /// cheaper endpoint/midpoint fallback is always used.
    pub use_optimal_positioning: bool,
    /// Cosine-of-angle threshold for the normal-flip guard, in `[-1, 1]`.
    /// `-1` disables the guard.
    pub max_normal_rotation: f64,
    pub weights: AttributeWeights,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            target_triangle_count: 0,
            merge_distance_threshold: 0.0,
            use_optimal_positioning: true,
            max_normal_rotation: -1.0,
            weights: AttributeWeights::default(),
        }
    }
}

/// Why the collapse loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The target triangle count was reached.
    Converged,
    /// The heap ran out of candidates before reaching the target.
    Exhausted,
    /// Every remaining candidate is permanently vetoed by the flip guard.
    Blocked,
    /// A precondition failed; the input mesh was returned unchanged.
    Skipped,
}

/// Result of a simplification run.
#[derive(Debug, Clone)]
pub struct SimplifyResult {
    /// The simplified mesh (or a clone of the input on a skipped run).
    pub mesh: TriangleMesh,
    pub termination: Termination,
    pub original_triangles: usize,
    pub final_triangles: usize,
    /// Number of vertex-pair merges performed.
    pub collapses_performed: usize,
    /// Number of candidates permanently vetoed by the flip guard.
    pub collapses_vetoed: usize,
}

/// Simplify `mesh` down to the configured triangle count.
///
/// Expected precondition failures (non-triangle topology, target already
/// met, no usable attributes) return the input unchanged with
/// [`Termination::Skipped`] and a logged warning; only a corrupt index
/// buffer produces an `Err`.
pub fn simplify_mesh(mesh: &TriangleMesh, options: &SimplifyOptions) -> Result<SimplifyResult> {
    for face in &mesh.faces {
        for &v in face {
            if v >= mesh.positions.len() {
                return Err(Error::InvalidData(format!(
                    "face index {} out of bounds for {} vertices",
                    v,
                    mesh.positions.len()
                )));
            }
        }
    }

    let face_alive: Vec<bool> = mesh
        .faces
        .iter()
        .map(|f| f[0] != f[1] && f[1] != f[2] && f[0] != f[2])
        .collect();
    let live = face_alive.iter().filter(|&&a| a).count();
    let original_triangles = live;

    if mesh.topology != PrimitiveTopology::TriangleList {
        warn!(topology = ?mesh.topology, "only triangle lists can be simplified");
        return Ok(skipped(mesh, original_triangles));
    }

    if live <= options.target_triangle_count {
        warn!(
            live,
            target = options.target_triangle_count,
            "mesh is already at or below the target triangle count"
        );
        return Ok(skipped(mesh, original_triangles));
    }

    let (layout, vectors) = vectorize(mesh, &options.weights);
    if layout.dim == 0 {
        warn!("no attribute contributed to the merge space");
        return Ok(skipped(mesh, original_triangles));
    }

    // Per-vertex quadrics accumulated from every live triangle.
    let mut quadrics = vec![Quadric::zeros(layout.dim); mesh.positions.len()];
    for (fi, face) in mesh.faces.iter().enumerate() {
        if !face_alive[fi] {
            continue;
        }
        let q = Quadric::from_triangle(&vectors[face[0]], &vectors[face[1]], &vectors[face[2]]);
        for &v in face {
            quadrics[v].add(&q);
        }
    }

    let mut adj = Adjacency::build(&mesh.faces, &face_alive, mesh.positions.len());

    if options.weights.boundary > 0.0 && layout.position.is_some() {
        let added = adjacency::add_boundary_quadrics(
            &adj,
            &mesh.faces,
            &vectors,
            &layout,
            options.weights.boundary,
            &mut quadrics,
        );
        debug!(added, "boundary quadrics accumulated");
    }

    if options.merge_distance_threshold > 0.0 && layout.position.is_some() {
        // Positions in the merge space carry the position weight, so the
        // caller's threshold (mesh units) scales the same way.
        let radius = options.merge_distance_threshold * options.weights.position;
        let (bb_min, _) = mesh.bounding_box();
        let origin = [
            bb_min.x as f64 * options.weights.position,
            bb_min.y as f64 * options.weights.position,
            bb_min.z as f64 * options.weights.position,
        ];
        adjacency::add_spatial_neighbors(
            &mut adj.neighbors,
            &adj.incident_faces,
            &vectors,
            &layout,
            radius,
            origin,
        );
    }

    let mut state = CollapseState {
        faces: mesh.faces.clone(),
        face_alive,
        live,
        vectors,
        quadrics,
        incident_faces: adj.incident_faces,
        neighbors: adj.neighbors,
        heap: CandidateHeap::new(mesh.positions.len()),
        alive: vec![true; mesh.positions.len()],
        layout,
        use_optimal: options.use_optimal_positioning,
    };

    // Seed one candidate per unique unordered neighbor pair. Vertices with
    // no incident faces never enter the heap.
    for i in 0..mesh.positions.len() {
        if state.incident_faces[i].is_empty() {
            continue;
        }
        let partners: Vec<usize> = state.neighbors[i].iter().copied().filter(|&j| j > i).collect();
        for j in partners {
            let mut q = state.quadrics[i];
            q.add(&state.quadrics[j]);
            let (position, cost) =
                optimal_merge(&q, &state.vectors[i], &state.vectors[j], state.use_optimal);
            state.heap.insert(i, j, CandidatePriority { cost, position });
        }
    }

    let guard_enabled = options.max_normal_rotation > -1.0 && state.layout.position.is_some();
    let mut performed = 0usize;
    let mut vetoed = 0usize;

    let termination = loop {
        if state.live <= options.target_triangle_count {
            break Termination::Converged;
        }

        let Some((a, b, priority)) = state.heap.pop() else {
            warn!(
                live = state.live,
                target = options.target_triangle_count,
                "candidate heap exhausted before reaching the target"
            );
            break Termination::Exhausted;
        };

        if priority.cost.is_infinite() {
            warn!(
                live = state.live,
                "every remaining candidate is vetoed by the flip guard"
            );
            break Termination::Blocked;
        }

        if !state.alive[a] || !state.alive[b] {
            continue;
        }

        if guard_enabled && state.causes_flip(a, b, &priority.position, options.max_normal_rotation)
        {
            // Permanent veto: the entry stays in the heap at the sentinel
            // cost and is never popped again.
            state.heap.insert(
                a,
                b,
                CandidatePriority {
                    cost: BLOCKED_COST,
                    position: priority.position,
                },
            );
            vetoed += 1;
            continue;
        }

        state.merge(a, b, priority.position);
        performed += 1;
    };

    let out = reassemble(mesh, &state, &options.weights);
    debug!(
        original = original_triangles,
        remaining = state.live,
        performed,
        vetoed,
        "simplification finished"
    );

    Ok(SimplifyResult {
        mesh: out,
        termination,
        original_triangles,
        final_triangles: state.live,
        collapses_performed: performed,
        collapses_vetoed: vetoed,
    })
}

fn skipped(mesh: &TriangleMesh, original_triangles: usize) -> SimplifyResult {
    SimplifyResult {
        mesh: mesh.clone(),
        termination: Termination::Skipped,
        original_triangles,
        final_triangles: original_triangles,
        collapses_performed: 0,
        collapses_vetoed: 0,
    }
}

/// Mutable working state of one simplification run.
struct CollapseState {
    faces: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    live: usize,
    vectors: Vec<AttrVec>,
    quadrics: Vec<Quadric>,
    incident_faces: Vec<Vec<usize>>,
    neighbors: Vec<HashSet<usize>>,
    heap: CandidateHeap,
    alive: Vec<bool>,
    layout: AttributeLayout,
    use_optimal: bool,
}

impl CollapseState {
    /// Would merging `a` and `b` at `position` flip or degenerate the normal
    /// of any triangle surviving the merge?
    fn causes_flip(&self, a: usize, b: usize, position: &AttrVec, cos_threshold: f64) -> bool {
        self.flips_incident(a, b, position, cos_threshold)
            || self.flips_incident(b, a, position, cos_threshold)
    }

    fn flips_incident(
        &self,
        moved: usize,
        other: usize,
        position: &AttrVec,
        cos_threshold: f64,
    ) -> bool {
        let Some(po) = self.layout.position else {
            return false;
        };
        for &fi in &self.incident_faces[moved] {
            if !self.face_alive[fi] {
                continue;
            }
            let face = self.faces[fi];
            if face.contains(&other) {
                continue; // deleted by the merge, not a survivor
            }
            let before = adjacency::face_normal(&face, &self.vectors, po, None);
            let after =
                adjacency::face_normal(&face, &self.vectors, po, Some((moved, position)));
            match (before, after) {
                (Some(n0), Some(n1)) => {
                    if n0.dot(&n1) < cos_threshold {
                        return true;
                    }
                }
                // A degenerate normal on either side counts as a flip.
                _ => return true,
            }
        }
        false
    }

    /// Merge `b` into `a` at the given position, updating faces, adjacency,
    /// quadrics and the heap incrementally.
    fn merge(&mut self, a: usize, b: usize, position: AttrVec) {
        let b_faces = std::mem::take(&mut self.incident_faces[b]);
        for fi in b_faces {
            if !self.face_alive[fi] {
                continue;
            }
            if self.faces[fi].contains(&a) {
                // Both remaining corners collapse onto the same vertex.
                self.face_alive[fi] = false;
                self.live -= 1;
                for k in 0..3 {
                    let v = self.faces[fi][k];
                    if v != b {
                        self.incident_faces[v].retain(|&f| f != fi);
                    }
                }
            } else {
                for v in self.faces[fi].iter_mut() {
                    if *v == b {
                        *v = a;
                    }
                }
                self.incident_faces[a].push(fi);
            }
        }

        self.vectors[a] = position;
        let qb = self.quadrics[b];
        self.quadrics[a].add(&qb);

        let b_neighbors = std::mem::take(&mut self.neighbors[b]);
        self.neighbors[a].remove(&b);
        for &p in &b_neighbors {
            if p == a {
                continue;
            }
            self.neighbors[p].remove(&b);
            self.neighbors[p].insert(a);
            self.neighbors[a].insert(p);
        }

        self.heap.rewrite_vertex(b, a);

        // The merged vertex's quadric changed, so every surviving entry
        // touching it is stale. Vetoed entries keep their sentinel.
        for p in self.heap.partners(a) {
            if self.heap.cost(a, p).is_some_and(f64::is_infinite) {
                continue;
            }
            let mut q = self.quadrics[a];
            q.add(&self.quadrics[p]);
            let (pos, cost) =
                optimal_merge(&q, &self.vectors[a], &self.vectors[p], self.use_optimal);
            self.heap.update(a, p, CandidatePriority { cost, position: pos });
        }

        self.alive[b] = false;
    }
}

/// Write surviving vertices and faces back into a compacted mesh,
/// descaling attribute vectors and copying through attributes that did not
/// participate in the merge space.
fn reassemble(src: &TriangleMesh, state: &CollapseState, weights: &AttributeWeights) -> TriangleMesh {
    let layout = &state.layout;
    let mut remap = vec![usize::MAX; src.positions.len()];

    let mut positions = Vec::new();
    let mut normals = src.normals.as_ref().map(|_| Vec::new());
    let mut colors = src.colors.as_ref().map(|_| Vec::new());
    let mut uvs = src.uvs.as_ref().map(|_| Vec::new());

    for v in 0..src.positions.len() {
        if !state.alive[v] || state.incident_faces[v].is_empty() {
            continue;
        }
        remap[v] = positions.len();
        let vec = &state.vectors[v];

        positions.push(layout.position_of(weights, vec).unwrap_or(src.positions[v]));
        if let (Some(out), Some(original)) = (normals.as_mut(), src.normals.as_ref()) {
            out.push(layout.normal_of(weights, vec).unwrap_or(original[v]));
        }
        if let (Some(out), Some(original)) = (colors.as_mut(), src.colors.as_ref()) {
            out.push(layout.color_of(weights, vec).unwrap_or(original[v]));
        }
        if let (Some(out), Some(original)) = (uvs.as_mut(), src.uvs.as_ref()) {
            out.push(layout.texcoord_of(weights, vec).unwrap_or(original[v]));
        }
    }

    let mut faces = Vec::new();
    for (fi, face) in state.faces.iter().enumerate() {
        if !state.face_alive[fi] {
            continue;
        }
        let i = remap[face[0]];
        let j = remap[face[1]];
        let k = remap[face[2]];
        if i == usize::MAX || j == usize::MAX || k == usize::MAX {
            continue;
        }
        if i != j && j != k && i != k {
            faces.push([i, j, k]);
        }
    }

    let mut out = TriangleMesh::from_vertices_and_faces(positions, faces);
    if let Some(n) = normals {
        out.set_normals(n);
    }
    if let Some(c) = colors {
        out.set_colors(c);
    }
    if let Some(t) = uvs {
        out.set_uvs(t);
    }

    let dropped = out.remove_unreferenced_vertices();
    if dropped > 0 {
        debug!(dropped, "dropped unreferenced vertices after reassembly");
    }
    out
}
