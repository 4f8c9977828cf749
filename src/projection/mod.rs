//! Projection of supercell Bloch states onto primitive-cell Bloch states.
//!
//! For a primitive k-vector $`\mathbf{k}`$ folding onto the supercell K-vector $`\mathbf{K}`$
//! with $`\mathbf{k}\mathbf{M}^{\mathsf{T}} = \mathbf{K} + \mathbf{G}_0`$, the spectral weight of
//! the supercell band $`m`$ is
//! ```math
//!     P_{\mathbf{K}m}(\mathbf{k})
//!     = \sum_{\mathbf{g}} \left| C_{\mathbf{K}m}(\mathbf{g} + \mathbf{G}_0) \right|^2,
//! ```
//! where $`\mathbf{g}`$ runs over the supercell G-vectors that are also reciprocal lattice
//! vectors of the primitive cell.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{self, ensure, format_err, Context};
use itertools::Itertools;
use nalgebra::Vector3;
use ndarray::{Array2, Array3};
use num_complex::Complex64;
use num_traits::Zero;

use crate::auxiliary::kpoint_comparator::KPointComparator;
use crate::io::format::format_kvector;
use crate::lattice::{fold_kpoint, nearest_integer, TransformationMatrix};
use crate::wavefunction::WavefunctionReader;

#[cfg(test)]
#[path = "projection_tests.rs"]
mod projection_tests;

// ==================
// Struct definitions
// ==================

/// Structure holding the G-vectors at one supercell K-point.
#[derive(Clone, Debug)]
pub struct KPointGVectors {
    /// All G-vectors spanned by the decoded coefficients.
    pub all: Vec<Vector3<i64>>,

    /// The subset of [`Self::all`] that are also primitive reciprocal lattice vectors.
    pub overlap: Vec<Vector3<i64>>,
}

/// Structure computing spectral weights from the wavefunction data of a supercell calculation.
///
/// The G-vector sets of every K-point are computed once and shared between all bands and all
/// primitive k-points folding onto that K-point.
pub struct Projector<'a, W>
where
    W: WavefunctionReader,
{
    /// The source of the supercell wavefunction data.
    reader: &'a W,

    /// The supercell/primitive-cell transformation matrix.
    transformation_matrix: &'a TransformationMatrix,

    /// The comparator for locating K-points in the wavefunction data.
    comparator: KPointComparator,

    /// The tolerance for deciding whether $`\mathbf{M}^{-1}\mathbf{G}`$ is an integer vector.
    gvector_threshold: f64,

    /// The G-vector sets computed so far, keyed by K-point index.
    gvector_cache: Mutex<HashMap<usize, Arc<KPointGVectors>>>,
}

impl<'a, W> Projector<'a, W>
where
    W: WavefunctionReader,
{
    /// Constructs a projector.
    ///
    /// # Errors
    ///
    /// Errors if the G-vector threshold is not strictly positive.
    pub fn new(
        reader: &'a W,
        transformation_matrix: &'a TransformationMatrix,
        comparator: KPointComparator,
        gvector_threshold: f64,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            gvector_threshold > 0.0,
            "The G-vector threshold must be positive, but `{gvector_threshold}` was given."
        );
        Ok(Self {
            reader,
            transformation_matrix,
            comparator,
            gvector_threshold,
            gvector_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the wavefunction reader.
    pub fn reader(&self) -> &W {
        self.reader
    }

    /// Locates a supercell K-vector in the wavefunction data.
    ///
    /// # Returns
    ///
    /// The index of the matching K-point and the reciprocal lattice vector $`\mathbf{s}`$ such
    /// that the stored K-vector equals `kk` $`+ \mathbf{s}`$.
    ///
    /// # Errors
    ///
    /// Errors if no stored K-vector is equivalent to `kk`.
    pub fn find_kpoint_index(
        &self,
        kk: &Vector3<f64>,
    ) -> Result<(usize, Vector3<i64>), anyhow::Error> {
        self.reader
            .kvectors()
            .iter()
            .enumerate()
            .find_map(|(ikpt, kk_file)| {
                self.comparator
                    .lattice_offset(kk_file, kk)
                    .map(|offset| (ikpt, offset))
            })
            .ok_or_else(|| {
                format_err!(
                    "Cannot find the supercell K-point {} in the wavefunction data.",
                    format_kvector(kk)
                )
            })
    }

    /// Returns the G-vectors at a K-point, together with those carrying weight for primitive
    /// Bloch states.
    pub fn overlap_gvectors(&self, ikpt: usize) -> Result<Arc<KPointGVectors>, anyhow::Error> {
        if let Some(gvecs) = self
            .gvector_cache
            .lock()
            .map_err(|_| format_err!("The G-vector cache is poisoned."))?
            .get(&ikpt)
        {
            return Ok(Arc::clone(gvecs));
        }

        let stored = self.reader.gvectors(ikpt)?;
        let all = self.reader.storage().expand_gvectors(&stored)?;
        let inv = self.transformation_matrix.inverse();
        let overlap = all
            .iter()
            .filter(|g| {
                let gp = inv * g.map(|x| x as f64);
                gp.iter()
                    .all(|x| (x - nearest_integer(*x)).abs() < self.gvector_threshold)
            })
            .copied()
            .collect_vec();
        log::debug!(
            "K-point #{ikpt}: {} of {} G-vectors are primitive reciprocal lattice vectors.",
            overlap.len(),
            all.len()
        );
        let gvecs = Arc::new(KPointGVectors { all, overlap });
        self.gvector_cache
            .lock()
            .map_err(|_| format_err!("The G-vector cache is poisoned."))?
            .insert(ikpt, Arc::clone(&gvecs));
        Ok(gvecs)
    }

    /// Computes the energies and spectral weights of all supercell bands at the K-point onto
    /// which a primitive k-vector folds.
    ///
    /// # Arguments
    ///
    /// * `k0` - The primitive k-vector in fractional coordinates.
    /// * `ispin` - The spin channel.
    ///
    /// # Returns
    ///
    /// An array of shape $`(n_{\mathrm{bands}}, 2)`$ whose columns are the band energies and the
    /// spectral weights.
    ///
    /// # Errors
    ///
    /// Errors if the folded K-vector is absent from the wavefunction data, or if the wavefunction
    /// data are inconsistent.
    pub fn spectral_weight_k(
        &self,
        k0: &Vector3<f64>,
        ispin: usize,
    ) -> Result<Array2<f64>, anyhow::Error> {
        let (kk0, gg0) = fold_kpoint(k0, self.transformation_matrix);
        let (ikpt, offset) = self
            .find_kpoint_index(&kk0)
            .with_context(|| format!("Unable to unfold k = {}", format_kvector(k0)))?;
        let gg0 = gg0 - offset;
        let gvecs = self.overlap_gvectors(ikpt)?;

        let grid = self.reader.fft_grid();
        let all_indices = gvecs
            .all
            .iter()
            .map(|g| grid_index(g, grid))
            .collect::<Result<Vec<_>, _>>()?;
        let target_indices = gvecs
            .overlap
            .iter()
            .map(|g| grid_index(&(g + gg0), grid))
            .collect::<Result<Vec<_>, _>>()?;

        let storage = self.reader.storage();
        let nbands = self.reader.n_bands();
        let mut coeff_grid = Array3::<Complex64>::zeros((grid[0], grid[1], grid[2]));
        let mut ew = Array2::<f64>::zeros((nbands, 2));
        for iband in 0..nbands {
            let raw = self.reader.band_coefficients(ispin, ikpt, iband)?;
            let weight = storage
                .decode(&raw)?
                .iter()
                .map(|component| {
                    ensure!(
                        component.len() == all_indices.len(),
                        "Band {iband} at K-point #{ikpt} has {} coefficients per component, but {} G-vectors.",
                        component.len(),
                        all_indices.len()
                    );
                    for (idx, c) in all_indices.iter().zip(component.iter()) {
                        coeff_grid[*idx] = *c;
                    }
                    Ok(target_indices
                        .iter()
                        .map(|idx| coeff_grid[*idx].norm_sqr())
                        .sum::<f64>())
                })
                .sum::<Result<f64, anyhow::Error>>()?;
            ew[(iband, 0)] = self.reader.band_energy(ispin, ikpt, iband)?;
            ew[(iband, 1)] = weight;
            all_indices
                .iter()
                .for_each(|idx| coeff_grid[*idx] = Complex64::zero());
        }
        Ok(ew)
    }

    /// Returns, for every primitive k-vector, the index of the supercell K-point in the
    /// wavefunction data onto which it folds.
    ///
    /// # Errors
    ///
    /// Errors if any folded K-vector is absent from the wavefunction data.
    pub fn k_to_supercell_kpoint_indices(
        &self,
        kpoints: &[Vector3<f64>],
    ) -> Result<Vec<usize>, anyhow::Error> {
        kpoints
            .iter()
            .map(|k| {
                let (kk, _) = fold_kpoint(k, self.transformation_matrix);
                self.find_kpoint_index(&kk).map(|(ikpt, _)| ikpt)
            })
            .collect()
    }
}

// =========
// Functions
// =========

/// Maps a G-vector onto its position in an FFT grid, with components taken modulo the grid
/// dimensions.
fn grid_index(g: &Vector3<i64>, grid: [usize; 3]) -> Result<(usize, usize, usize), anyhow::Error> {
    let wrap = |x: i64, n: usize| -> Result<usize, anyhow::Error> {
        ensure!(n > 0, "The FFT grid dimensions must be positive, but {grid:?} was given.");
        let n = i64::try_from(n).map_err(|_| format_err!("Unable to convert `{n}` to `i64`."))?;
        let i = x.rem_euclid(n);
        usize::try_from(i).map_err(|_| format_err!("Unable to convert `{i}` to `usize`."))
    };
    Ok((wrap(g[0], grid[0])?, wrap(g[1], grid[1])?, wrap(g[2], grid[2])?))
}
