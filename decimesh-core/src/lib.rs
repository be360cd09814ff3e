//! Core data structures for decimesh
//!
//! This crate provides the triangle mesh container consumed and produced by
//! the simplification algorithms, along with point/vector aliases and the
//! crate-wide error type.

pub mod error;
pub mod mesh;
pub mod point;

pub use error::*;
pub use mesh::*;
pub use point::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
