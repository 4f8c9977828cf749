//! Symmetry operations in reciprocal space and symmetry orbits of k-points.

pub mod kpoint_orbit;
pub mod symmetry_operation;
