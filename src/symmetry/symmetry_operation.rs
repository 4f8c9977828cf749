//! Point-group operations acting on fractional k-vectors.

use std::fmt;

use anyhow::{self, ensure};
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::lattice::wrap_fractional;

#[cfg(test)]
#[path = "symmetry_operation_tests.rs"]
mod symmetry_operation_tests;

/// A structure for managing a point-group operation expressed in fractional reciprocal
/// coordinates.
///
/// The operation acts on a fractional k-vector $`\mathbf{k}`$ (treated as a row vector) by
/// right-multiplication, $`\mathbf{k} \mapsto \mathbf{k}\mathbf{R}`$. Symmetry operations are
/// supplied externally (*e.g.* from a space-group library) and sets of them are assumed, not
/// verified, to be closed under composition.
///
/// The matrix is serialised as a list of three rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct KSymmetryOperation {
    /// The matrix $`\mathbf{R}`$.
    matrix: Matrix3<f64>,
}

impl KSymmetryOperation {
    /// Constructs a symmetry operation from its matrix.
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    /// Constructs a symmetry operation from its rows.
    ///
    /// # Errors
    ///
    /// Errors if `rows` does not have the shape $`3 \times 3`$.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, anyhow::Error> {
        ensure!(
            rows.len() == 3 && rows.iter().all(|row| row.len() == 3),
            "A symmetry operation must be a 3 × 3 matrix."
        );
        Ok(Self::new(Matrix3::from_fn(|i, j| rows[i][j])))
    }

    /// Returns the identity operation.
    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    /// Returns the spatial inversion operation.
    pub fn inversion() -> Self {
        Self::new(-Matrix3::identity())
    }

    /// Returns the matrix $`\mathbf{R}`$ of this operation.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Determines if this operation is the identity.
    pub fn is_identity(&self) -> bool {
        self.matrix == Matrix3::identity()
    }

    /// Composes this operation with another one such that `self.compose(other)` applied to
    /// $`\mathbf{k}`$ gives $`(\mathbf{k}\mathbf{R}_{\mathrm{self}})\mathbf{R}_{\mathrm{other}}`$.
    pub fn compose(&self, other: &Self) -> Self {
        Self::new(self.matrix * other.matrix)
    }

    /// Applies this operation to a fractional k-vector and wraps the image into
    /// $`[-0.5, 0.5)`$.
    pub fn rotate(&self, k: &Vector3<f64>) -> Vector3<f64> {
        // k R for a row vector k is R^T k for a column vector k.
        wrap_fractional(&(self.matrix.transpose() * k))
    }
}

impl TryFrom<Vec<Vec<f64>>> for KSymmetryOperation {
    type Error = anyhow::Error;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(&rows)
    }
}

impl From<KSymmetryOperation> for Vec<Vec<f64>> {
    fn from(op: KSymmetryOperation) -> Self {
        op.matrix
            .row_iter()
            .map(|row| row.iter().copied().collect_vec())
            .collect_vec()
    }
}

impl fmt::Display for KSymmetryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.matrix
                .row_iter()
                .map(|row| row.iter().map(|x| format!("{x:+.0}")).join(" "))
                .join("; ")
        )
    }
}
