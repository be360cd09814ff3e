//! Attribute-aware mesh simplification
//!
//! This crate reduces the triangle count of a mesh by iterative vertex-pair
//! merging, driven by quadric error metrics generalized to a per-vertex
//! attribute space (position, normal, color, texture coordinates):
//! - Weighted attribute vectorization with runtime dimensionality
//! - Generalized plane quadrics with upper-triangle storage
//! - A mutable priority queue of merge candidates
//! - Boundary preservation and normal-flip avoidance heuristics

pub mod adjacency;
pub mod attributes;
pub mod candidates;
pub mod collapse;
pub mod quadric;

pub use attributes::{AttributeWeights, MAX_DIM};
pub use collapse::{simplify_mesh, SimplifyOptions, SimplifyResult, Termination};
pub use quadric::Quadric;
