//! Supercell/primitive-cell lattice relations and k-point folding.
//!
//! The transformation matrix $`\mathbf{M}`$ relates the real-space lattice vectors of the
//! supercell ($`\mathbf{A}`$, rows) to those of the primitive cell ($`\mathbf{a}`$, rows) via
//! ```math
//!     \mathbf{A} = \mathbf{M} \mathbf{a},
//! ```
//! whereas in reciprocal space $`\mathbf{b} = \mathbf{M}^{\mathsf{T}} \mathbf{B}`$. A primitive
//! k-vector $`\mathbf{k}`$ in fractional coordinates of $`\mathbf{b}`$ therefore has fractional
//! coordinates $`\mathbf{k}\mathbf{M}^{\mathsf{T}}`$ in the supercell reciprocal basis.

use std::fmt;

use anyhow::{self, ensure, format_err};
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};


/// Returns the integer nearest to `x`, with halves rounded upwards, so that
/// $`x - [x] \in [-0.5, 0.5)`$.
pub fn nearest_integer(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Wraps every component of a fractional vector into $`[-0.5, 0.5)`$.
pub fn wrap_fractional(v: &Vector3<f64>) -> Vector3<f64> {
    v.map(|x| x - nearest_integer(x))
}

// ==================
// Struct definitions
// ==================

/// Structure holding the non-singular $`3 \times 3`$ transformation matrix $`\mathbf{M}`$
/// between the supercell and the primitive cell, $`\mathbf{A} = \mathbf{M}\mathbf{a}`$.
///
/// The matrix is serialised as a list of three rows and is validated on deserialisation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct TransformationMatrix {
    /// The matrix $`\mathbf{M}`$.
    matrix: Matrix3<f64>,

    /// The inverse $`\mathbf{M}^{-1}`$.
    inverse: Matrix3<f64>,
}

impl TransformationMatrix {
    /// Constructs a transformation matrix from a nalgebra matrix.
    ///
    /// # Errors
    ///
    /// Errors if the matrix contains non-finite elements or is singular.
    pub fn new(matrix: Matrix3<f64>) -> Result<Self, anyhow::Error> {
        ensure!(
            matrix.iter().all(|x| x.is_finite()),
            "The transformation matrix contains non-finite elements."
        );
        ensure!(
            matrix.determinant().abs() > f64::EPSILON,
            "The transformation matrix is singular (determinant {:.3e}).",
            matrix.determinant()
        );
        let inverse = matrix
            .try_inverse()
            .ok_or_else(|| format_err!("Unable to invert the transformation matrix."))?;
        Ok(Self { matrix, inverse })
    }

    /// Constructs a transformation matrix from its rows.
    ///
    /// # Errors
    ///
    /// Errors if `rows` does not have the shape $`3 \times 3`$ or if the matrix is singular.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, anyhow::Error> {
        ensure!(
            rows.len() == 3 && rows.iter().all(|row| row.len() == 3),
            "The shape of the transformation matrix must be (3, 3), but ({}) was given.",
            std::iter::once(rows.len().to_string())
                .chain(rows.iter().map(|row| row.len().to_string()).unique())
                .join(", ")
        );
        Self::new(Matrix3::from_fn(|i, j| rows[i][j]))
    }

    /// Constructs a diagonal transformation matrix, which corresponds to a simple
    /// $`n_1 \times n_2 \times n_3`$ supercell.
    pub fn diagonal(n1: f64, n2: f64, n3: f64) -> Result<Self, anyhow::Error> {
        Self::new(Matrix3::from_diagonal(&Vector3::new(n1, n2, n3)))
    }

    /// Returns the matrix $`\mathbf{M}`$.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Returns the inverse matrix $`\mathbf{M}^{-1}`$.
    pub fn inverse(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    /// Returns the number of primitive cells contained in the supercell, $`|\det\mathbf{M}|`$.
    pub fn volume_ratio(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    /// Converts fractional primitive reciprocal coordinates into fractional supercell reciprocal
    /// coordinates, $`\mathbf{k}\mathbf{M}^{\mathsf{T}}`$.
    pub fn to_supercell_reciprocal(&self, k: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * k
    }

    /// Converts fractional supercell reciprocal coordinates into fractional primitive reciprocal
    /// coordinates, $`\mathbf{K}(\mathbf{M}^{-1})^{\mathsf{T}}`$.
    pub fn to_primitive_reciprocal(&self, kk: &Vector3<f64>) -> Vector3<f64> {
        self.inverse * kk
    }
}

impl TryFrom<Vec<Vec<f64>>> for TransformationMatrix {
    type Error = anyhow::Error;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(&rows)
    }
}

impl From<TransformationMatrix> for Vec<Vec<f64>> {
    fn from(tmat: TransformationMatrix) -> Self {
        tmat.matrix
            .row_iter()
            .map(|row| row.iter().copied().collect_vec())
            .collect_vec()
    }
}

impl fmt::Display for TransformationMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.matrix.row_iter() {
            writeln!(
                f,
                "  [{}]",
                row.iter().map(|x| format!("{x:+8.4}")).join(", ")
            )?;
        }
        Ok(())
    }
}

// =========
// Functions
// =========

/// Folds a primitive-cell k-vector onto the supercell Brillouin zone.
///
/// The supercell K-vector $`\mathbf{K}`$ and the unfolding vector $`\mathbf{G}`$ (a reciprocal
/// lattice vector of the supercell) satisfy
/// ```math
///     \mathbf{k}\mathbf{M}^{\mathsf{T}} = \mathbf{K} + \mathbf{G},
/// ```
/// with every component of $`\mathbf{K}`$ in $`[-0.5, 0.5)`$.
///
/// # Arguments
///
/// * `k` - The primitive k-vector in fractional coordinates.
/// * `tmat` - The supercell/primitive-cell transformation matrix.
///
/// # Returns
///
/// The pair $`(\mathbf{K}, \mathbf{G})`$, both in fractional supercell reciprocal coordinates.
pub fn fold_kpoint(k: &Vector3<f64>, tmat: &TransformationMatrix) -> (Vector3<f64>, Vector3<i64>) {
    let kc = tmat.to_supercell_reciprocal(k);
    let g = kc.map(nearest_integer);
    (kc - g, g.map(|x| x as i64))
}

/// Serialisation of $`3 \times 3`$ matrices as lists of three rows, for use with
/// `#[serde(with = "crate::lattice::matrix3_rows")]`.
pub mod matrix3_rows {
    use itertools::Itertools;
    use nalgebra::Matrix3;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(matrix: &Matrix3<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        matrix
            .row_iter()
            .map(|row| row.iter().copied().collect_vec())
            .collect_vec()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Matrix3<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        if rows.len() != 3 || rows.iter().any(|row| row.len() != 3) {
            return Err(D::Error::custom("expected a 3 × 3 matrix given as three rows"));
        }
        Ok(Matrix3::from_fn(|i, j| rows[i][j]))
    }
}

/// Returns the reciprocal lattice (rows, without the factor of $`2\pi`$) of a real-space
/// lattice given by rows.
///
/// # Errors
///
/// Errors if the lattice is singular.
pub fn reciprocal_lattice(lattice: &Matrix3<f64>) -> Result<Matrix3<f64>, anyhow::Error> {
    lattice
        .try_inverse()
        .map(|inv| inv.transpose())
        .ok_or_else(|| format_err!("The real-space lattice is singular."))
}
