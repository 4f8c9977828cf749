//! Management of the primitive k-points to unfold and the supercell K-points they require.

use std::fmt;

use anyhow::{self, ensure, format_err};
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::auxiliary::kpoint_comparator::KPointComparator;
use crate::io::format::{format_kvector, write_subtitle};
use crate::lattice::{fold_kpoint, TransformationMatrix};
use crate::symmetry::kpoint_orbit::{expand_kpoint_by_symmetry, KPointOrbit};
use crate::symmetry::symmetry_operation::KSymmetryOperation;

pub mod kpath;


// ==================
// Struct definitions
// ==================

/// Structure managing a set of primitive k-points to be unfolded, their symmetry orbits, and the
/// reduced set of supercell K-points onto which the orbit members fold.
///
/// The set is constructed once, at which point every requested primitive k-point is expanded by
/// symmetry. [`Self::generate_sc_kpoints`] then populates the reduced supercell K-point list and
/// the nested map into it. After that, the set is only read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnfoldKSet {
    /// The supercell/primitive-cell transformation matrix.
    transformation_matrix: TransformationMatrix,

    /// The primitive real-space lattice vectors as rows.
    primitive_lattice: Matrix3<f64>,

    /// The requested primitive k-points in fractional coordinates.
    kpoints: Vec<Vector3<f64>>,

    /// The point-group operations of the primitive cell.
    primitive_operations: Vec<KSymmetryOperation>,

    /// The point-group operations of the supercell.
    supercell_operations: Vec<KSymmetryOperation>,

    /// The comparator used for all k-point equivalence decisions.
    comparator: KPointComparator,

    /// The symmetry orbits, one for each requested primitive k-point, in the same order as
    /// [`Self::kpoints`].
    orbits: Vec<KPointOrbit>,

    /// The reduced supercell K-points that must be computed.
    reduced_sckpts: Option<Vec<Vector3<f64>>>,

    /// For each requested primitive k-point and each member of its orbit, the index into
    /// [`Self::reduced_sckpts`] of the supercell K-point the member folds onto.
    reduced_sckpts_map: Option<Vec<Vec<usize>>>,
}

impl UnfoldKSet {
    /// Constructs a k-point set and expands every requested primitive k-point by symmetry.
    ///
    /// # Arguments
    ///
    /// * `transformation_matrix` - The supercell/primitive-cell transformation matrix.
    /// * `kpoints` - The primitive k-points to be unfolded, in fractional coordinates.
    /// * `primitive_lattice` - The primitive real-space lattice vectors as rows.
    /// * `primitive_operations` - The point-group operations of the primitive cell. If empty,
    /// only the identity is assumed.
    /// * `supercell_operations` - The point-group operations of the supercell. If empty, only the
    /// identity is assumed.
    /// * `comparator` - The comparator for k-point equivalence.
    ///
    /// # Errors
    ///
    /// Errors if no k-points are given or if any orbit fails its weight-conservation check.
    pub fn new(
        transformation_matrix: TransformationMatrix,
        kpoints: Vec<Vector3<f64>>,
        primitive_lattice: Matrix3<f64>,
        primitive_operations: Vec<KSymmetryOperation>,
        supercell_operations: Vec<KSymmetryOperation>,
        comparator: KPointComparator,
    ) -> Result<Self, anyhow::Error> {
        ensure!(!kpoints.is_empty(), "No primitive k-points to unfold.");
        let primitive_operations = if primitive_operations.is_empty() {
            vec![KSymmetryOperation::identity()]
        } else {
            primitive_operations
        };
        let supercell_operations = if supercell_operations.is_empty() {
            vec![KSymmetryOperation::identity()]
        } else {
            supercell_operations
        };
        let orbits = kpoints
            .iter()
            .map(|k| {
                expand_kpoint_by_symmetry(
                    k,
                    &primitive_operations,
                    &supercell_operations,
                    &comparator,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            transformation_matrix,
            primitive_lattice,
            kpoints,
            primitive_operations,
            supercell_operations,
            comparator,
            orbits,
            reduced_sckpts: None,
            reduced_sckpts_map: None,
        })
    }

    /// Folds every orbit member onto the supercell Brillouin zone and deduplicates the resulting
    /// K-points.
    ///
    /// Any previously generated reduced list is discarded and rebuilt, so calling this more than
    /// once yields the same result.
    ///
    /// # Returns
    ///
    /// The reduced supercell K-points and, for every requested primitive k-point, the indices
    /// into them of the K-points its orbit members fold onto.
    pub fn generate_sc_kpoints(&mut self) -> (&[Vector3<f64>], &[Vec<usize>]) {
        let folded = self
            .orbits
            .iter()
            .flat_map(|orbit| {
                orbit
                    .members
                    .iter()
                    .map(|k| fold_kpoint(k, &self.transformation_matrix).0)
            })
            .collect_vec();
        let (reduced, inverse) = deduplicate_kpoints(&folded, &self.comparator);

        let mut inverse_iter = inverse.into_iter();
        let map = self
            .orbits
            .iter()
            .map(|orbit| inverse_iter.by_ref().take(orbit.len()).collect_vec())
            .collect_vec();
        log::debug!(
            "{} folded K-points reduced to {} distinct supercell K-points.",
            folded.len(),
            reduced.len()
        );

        let reduced_sckpts = self.reduced_sckpts.insert(reduced);
        let reduced_sckpts_map = self.reduced_sckpts_map.insert(map);
        (reduced_sckpts.as_slice(), reduced_sckpts_map.as_slice())
    }

    /// Returns the transformation matrix.
    pub fn transformation_matrix(&self) -> &TransformationMatrix {
        &self.transformation_matrix
    }

    /// Returns the primitive real-space lattice vectors as rows.
    pub fn primitive_lattice(&self) -> &Matrix3<f64> {
        &self.primitive_lattice
    }

    /// Returns the requested primitive k-points.
    pub fn kpoints(&self) -> &[Vector3<f64>] {
        &self.kpoints
    }

    /// Returns the comparator used for k-point equivalence.
    pub fn comparator(&self) -> &KPointComparator {
        &self.comparator
    }

    /// Returns the symmetry orbits, one for each requested primitive k-point.
    pub fn orbits(&self) -> &[KPointOrbit] {
        &self.orbits
    }

    /// Returns the reduced supercell K-points.
    ///
    /// # Errors
    ///
    /// Errors if [`Self::generate_sc_kpoints`] has not been called.
    pub fn reduced_sckpts(&self) -> Result<&[Vector3<f64>], anyhow::Error> {
        self.reduced_sckpts
            .as_deref()
            .ok_or_else(|| format_err!("Supercell K-points have not been generated."))
    }

    /// Returns the nested map from orbit members to reduced supercell K-points.
    ///
    /// # Errors
    ///
    /// Errors if [`Self::generate_sc_kpoints`] has not been called.
    pub fn reduced_sckpts_map(&self) -> Result<&[Vec<usize>], anyhow::Error> {
        self.reduced_sckpts_map
            .as_deref()
            .ok_or_else(|| format_err!("Supercell K-points have not been generated."))
    }

    /// The number of primitive point-group operations.
    pub fn n_symm_orig(&self) -> usize {
        self.primitive_operations.len()
    }

    /// The number of supercell point-group operations.
    pub fn n_symm_expand(&self) -> usize {
        self.supercell_operations.len()
    }

    /// The number of requested primitive k-points.
    pub fn n_kpts_orig(&self) -> usize {
        self.kpoints.len()
    }

    /// The total number of orbit members over all requested primitive k-points.
    pub fn n_kpts_expand(&self) -> usize {
        self.orbits.iter().map(KPointOrbit::len).sum()
    }
}

impl fmt::Display for UnfoldKSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "UnfoldKSet with {}/{} kpoints based on {}/{} symm ops",
            self.n_kpts_expand(),
            self.n_kpts_orig(),
            self.n_symm_expand(),
            self.n_symm_orig()
        )?;
        writeln!(f)?;
        write_subtitle(f, "Transformation matrix")?;
        write!(f, "{}", self.transformation_matrix)?;
        writeln!(f)?;
        write_subtitle(f, "Symmetry orbits")?;
        for (i, orbit) in self.orbits.iter().enumerate() {
            write!(f, "{i:>4}: {orbit}")?;
        }
        if let Some(reduced) = self.reduced_sckpts.as_ref() {
            writeln!(f)?;
            write_subtitle(f, "Reduced supercell K-points")?;
            for (i, kk) in reduced.iter().enumerate() {
                writeln!(f, "{i:>4}: {}", format_kvector(kk))?;
            }
        }
        Ok(())
    }
}

// =========
// Functions
// =========

/// Deduplicates a list of k-points.
///
/// The first occurrence of every equivalence class (according to `comparator`) is kept as its
/// representative, and the representatives retain the order of their first occurrences.
///
/// # Returns
///
/// The representatives and, for every input k-point, the index of its representative.
pub fn deduplicate_kpoints(
    kpoints: &[Vector3<f64>],
    comparator: &KPointComparator,
) -> (Vec<Vector3<f64>>, Vec<usize>) {
    let mut representatives: Vec<Vector3<f64>> = Vec::new();
    let inverse = kpoints
        .iter()
        .map(|k| {
            comparator
                .position(&representatives, k)
                .unwrap_or_else(|| {
                    representatives.push(*k);
                    representatives.len() - 1
                })
        })
        .collect_vec();
    (representatives, inverse)
}
