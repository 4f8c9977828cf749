//! Expansion of primitive k-points into orbits of symmetry-distinct images.
//!
//! When a supercell breaks some of the symmetry of the primitive cell, primitive k-points that
//! were equivalent under the primitive point group are no longer guaranteed to be equivalent in
//! the supercell. The spectral weight at a primitive k-point must therefore be sampled at every
//! image that remains distinct under the supercell point group, each carrying the statistical
//! weight of the primitive images it absorbs.

use std::fmt;

use anyhow::{self, ensure, format_err};
use nalgebra::Vector3;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::auxiliary::kpoint_comparator::KPointComparator;
use crate::io::format::format_kvector;
use crate::symmetry::symmetry_operation::KSymmetryOperation;

#[cfg(test)]
#[path = "kpoint_orbit_tests.rs"]
mod kpoint_orbit_tests;

/// Structure containing the symmetry-distinct images of one primitive k-point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KPointOrbit {
    /// The primitive k-point that has been expanded.
    pub kpoint: Vector3<f64>,

    /// The number of distinct images of [`Self::kpoint`] under the primitive point group.
    pub n_primitive_images: usize,

    /// The images of [`Self::kpoint`] that remain distinct under the supercell point group. The
    /// first member is always [`Self::kpoint`] itself.
    pub members: Vec<Vector3<f64>>,

    /// The number of primitive images absorbed into each member. These sum to
    /// [`Self::n_primitive_images`].
    pub raw_weights: Vec<usize>,

    /// The normalised weights of the members, summing to unity.
    pub weights: Vec<f64>,
}

impl KPointOrbit {
    /// Returns the number of members in this orbit.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if this orbit contains no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns an iterator over the members and their normalised weights.
    pub fn iter(&self) -> impl Iterator<Item = (&Vector3<f64>, f64)> {
        self.members.iter().zip(self.weights.iter().copied())
    }
}

impl fmt::Display for KPointOrbit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "k = {} ({} primitive image{}, {} distinct in supercell)",
            format_kvector(&self.kpoint),
            self.n_primitive_images,
            if self.n_primitive_images == 1 { "" } else { "s" },
            self.members.len()
        )?;
        for ((member, raw), weight) in self
            .members
            .iter()
            .zip(self.raw_weights.iter())
            .zip(self.weights.iter())
        {
            writeln!(
                f,
                "  {} × {raw:>3} → {weight:.6}",
                format_kvector(member)
            )?;
        }
        Ok(())
    }
}

/// Expands a primitive k-point into the images that are distinct under the supercell symmetry.
///
/// The procedure is as follows:
///
/// 1. All images of `k` under `primitive_ops` are collected, seeded with `k` itself, keeping
///    only those not already present according to `comparator`. Each candidate receives an
///    initial weight of one.
/// 2. For every candidate with a non-zero weight, every operation in `supercell_ops` is applied.
///    An image matching a *different* candidate with a non-zero weight causes that candidate's
///    weight to be absorbed into the current one and zeroed. Candidates are never removed, so
///    indices remain stable during the scan.
/// 3. Candidates with non-zero weights are retained and their weights normalised.
///
/// # Arguments
///
/// * `k` - The primitive k-point in fractional coordinates.
/// * `primitive_ops` - The point-group operations of the primitive cell.
/// * `supercell_ops` - The point-group operations of the supercell.
/// * `comparator` - The comparator deciding k-point equivalence.
///
/// # Returns
///
/// The orbit of `k`.
///
/// # Errors
///
/// Errors if the retained raw weights do not sum to the number of primitive images, which
/// signals inconsistent symmetry-operation input.
pub fn expand_kpoint_by_symmetry(
    k: &Vector3<f64>,
    primitive_ops: &[KSymmetryOperation],
    supercell_ops: &[KSymmetryOperation],
    comparator: &KPointComparator,
) -> Result<KPointOrbit, anyhow::Error> {
    // Distinct images under the primitive point group
    let mut candidates = vec![*k];
    for op in primitive_ops.iter() {
        let k_equiv = op.rotate(k);
        if comparator.position(&candidates, &k_equiv).is_none() {
            candidates.push(k_equiv);
        }
    }
    let n_primitive_images = candidates.len();

    // Merge images that become equivalent again under the supercell point group
    let mut raw_weights = vec![1usize; n_primitive_images];
    for i in 0..n_primitive_images {
        if raw_weights[i] == 0 {
            continue;
        }
        for op in supercell_ops.iter() {
            let k_equiv = op.rotate(&candidates[i]);
            for j in 0..n_primitive_images {
                if i == j || raw_weights[j] == 0 {
                    continue;
                }
                if comparator.equivalent(&k_equiv, &candidates[j]) {
                    raw_weights[i] += raw_weights[j];
                    raw_weights[j] = 0;
                }
            }
        }
    }

    let (members, raw_weights): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .zip(raw_weights)
        .filter(|(_, w)| *w != 0)
        .unzip();
    let total = raw_weights.iter().sum::<usize>();
    ensure!(
        total == n_primitive_images,
        "Symmetry orbit weights of k = {} sum to {total}, but {n_primitive_images} distinct primitive images were found.",
        format_kvector(k)
    );
    let total_f64 = total
        .to_f64()
        .ok_or_else(|| format_err!("Unable to convert `{total}` to `f64`."))?;
    let weights = raw_weights
        .iter()
        .map(|w| {
            w.to_f64()
                .map(|w| w / total_f64)
                .ok_or_else(|| format_err!("Unable to convert `{w}` to `f64`."))
        })
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!(
        "k = {}: {} primitive images reduced to {} supercell-distinct images.",
        format_kvector(k),
        n_primitive_images,
        members.len()
    );

    Ok(KPointOrbit {
        kpoint: *k,
        n_primitive_images,
        members,
        raw_weights,
        weights,
    })
}
