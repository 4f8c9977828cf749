//! Approximate equality of fractional k-vectors.
//!
//! Every "are these two k-points the same" question in qunfold (symmetry-image matching,
//! supercell K-point deduplication, and K-point lookup in wavefunction files) is answered by a
//! [`KPointComparator`], so that one threshold governs all of them.

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::lattice::nearest_integer;

#[cfg(test)]
#[path = "kpoint_comparator_tests.rs"]
mod kpoint_comparator_tests;

fn default_threshold() -> f64 {
    1e-6
}

/// Structure deciding whether two fractional k-vectors describe the same point of reciprocal
/// space.
///
/// Two k-vectors $`\mathbf{k}_1`$ and $`\mathbf{k}_2`$ are equivalent when their difference lies
/// within [`Self::threshold`] of a reciprocal lattice vector in every component, *i.e.*
/// $`|\Delta_i - [\Delta_i]| < \epsilon`$ for $`i = 1, 2, 3`$ where
/// $`\boldsymbol{\Delta} = \mathbf{k}_1 - \mathbf{k}_2`$ and $`[\cdot]`$ denotes the nearest
/// integer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "KPointComparatorData")]
pub struct KPointComparator {
    /// The absolute component-wise threshold.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

/// Unvalidated mirror of [`KPointComparator`] used for deserialisation.
#[derive(Deserialize)]
struct KPointComparatorData {
    #[serde(default = "default_threshold")]
    threshold: f64,
}

impl TryFrom<KPointComparatorData> for KPointComparator {
    type Error = anyhow::Error;

    fn try_from(data: KPointComparatorData) -> Result<Self, Self::Error> {
        Self::new(data.threshold)
    }
}

impl KPointComparator {
    /// Constructs a comparator with a given threshold.
    ///
    /// # Errors
    ///
    /// Errors if the threshold is not strictly positive and finite.
    pub fn new(threshold: f64) -> Result<Self, anyhow::Error> {
        anyhow::ensure!(
            threshold.is_finite() && threshold > 0.0,
            "The k-point comparison threshold must be positive and finite, but `{threshold}` was given."
        );
        Ok(Self { threshold })
    }

    /// Returns the reciprocal lattice vector $`\mathbf{n}`$ such that
    /// $`\mathbf{k}_1 \approx \mathbf{k}_2 + \mathbf{n}`$, or `None` if the two k-vectors are not
    /// equivalent.
    pub fn lattice_offset(&self, k1: &Vector3<f64>, k2: &Vector3<f64>) -> Option<Vector3<i64>> {
        let diff = k1 - k2;
        let offset = diff.map(nearest_integer);
        if (diff - offset).iter().all(|d| d.abs() < self.threshold) {
            Some(offset.map(|x| x as i64))
        } else {
            None
        }
    }

    /// Determines if two k-vectors are equivalent modulo a reciprocal lattice vector.
    pub fn equivalent(&self, k1: &Vector3<f64>, k2: &Vector3<f64>) -> bool {
        self.lattice_offset(k1, k2).is_some()
    }

    /// Returns the index of the first k-vector in `kpoints` equivalent to `k`, if any.
    pub fn position(&self, kpoints: &[Vector3<f64>], k: &Vector3<f64>) -> Option<usize> {
        kpoints.iter().position(|k_| self.equivalent(k_, k))
    }
}

impl Default for KPointComparator {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

impl fmt::Display for KPointComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k-point threshold {:.3e} (modulo reciprocal lattice)", self.threshold)
    }
}
