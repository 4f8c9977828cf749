//! Access to plane-wave wavefunction data of a supercell calculation.
//!
//! The parsing of binary wavefunction files is left to implementors of [`WavefunctionReader`].
//! This module defines the interface the unfolding engine consumes, together with the storage
//! conventions under which plane-wave coefficients can be stored.

use std::fmt;

use anyhow::{self, ensure};
use nalgebra::Vector3;
use ndarray::{s, Array1};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

pub mod in_memory;


// =================
// Trait definitions
// =================

/// Trait for sources of plane-wave wavefunction data of a supercell calculation.
///
/// All indices are zero-based. K-vectors and G-vectors are in fractional coordinates of the
/// supercell reciprocal lattice.
pub trait WavefunctionReader: Sync {
    /// The number of spin channels (one for spin-restricted and non-collinear calculations, two
    /// for spin-polarised calculations).
    fn n_spins(&self) -> usize;

    /// The number of K-points.
    fn n_kpoints(&self) -> usize;

    /// The number of bands at every K-point.
    fn n_bands(&self) -> usize;

    /// The K-vectors at which the wavefunctions have been computed.
    fn kvectors(&self) -> &[Vector3<f64>];

    /// The dimensions of the FFT grid. Every G-vector fits into this grid when its components are
    /// taken modulo the grid dimensions.
    fn fft_grid(&self) -> [usize; 3];

    /// The convention under which plane-wave coefficients are stored.
    fn storage(&self) -> CoefficientStorage;

    /// The G-vectors of the plane waves stored at a K-point, in the order of the stored
    /// coefficients. For [`CoefficientStorage::GammaHalf`], only the stored half is returned.
    fn gvectors(&self, ikpt: usize) -> Result<Vec<Vector3<i64>>, anyhow::Error>;

    /// The eigenvalue (in eV) of a band.
    fn band_energy(&self, ispin: usize, ikpt: usize, iband: usize) -> Result<f64, anyhow::Error>;

    /// The normalised stored plane-wave coefficients of a band.
    fn band_coefficients(
        &self,
        ispin: usize,
        ikpt: usize,
        iband: usize,
    ) -> Result<Array1<Complex64>, anyhow::Error>;
}

// ================
// Enum definitions
// ================

/// An enumerated type for the conventions under which plane-wave coefficients can be stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CoefficientStorage {
    /// Variant for complex coefficients, one per stored G-vector.
    #[default]
    Standard,

    /// Variant for two-component spinor coefficients, where the coefficients of the two spinor
    /// components are stored one after the other, each over the stored G-vectors.
    SpinOrbit,

    /// Variant for real wavefunctions at the Γ point, where only the coefficients of a half
    /// sphere of G-vectors are stored, starting with $`\mathbf{G} = \mathbf{0}`$. The
    /// coefficients of $`-\mathbf{G}`$ are the complex conjugates of those of $`\mathbf{G}`$,
    /// and the stored coefficients of non-zero G-vectors carry an extra factor of $`\sqrt{2}`$.
    GammaHalf,
}

impl CoefficientStorage {
    /// Returns the full set of G-vectors spanned by the decoded coefficients.
    ///
    /// # Errors
    ///
    /// Errors if the storage is [`Self::GammaHalf`] and the first stored G-vector is not zero.
    pub fn expand_gvectors(
        &self,
        stored: &[Vector3<i64>],
    ) -> Result<Vec<Vector3<i64>>, anyhow::Error> {
        match self {
            Self::Standard | Self::SpinOrbit => Ok(stored.to_vec()),
            Self::GammaHalf => {
                ensure!(
                    stored.first() == Some(&Vector3::zeros()),
                    "Half-sphere storage requires the first stored G-vector to be zero."
                );
                Ok(stored
                    .iter()
                    .copied()
                    .chain(stored.iter().skip(1).map(|g| -g))
                    .collect())
            }
        }
    }

    /// Decodes stored coefficients into one coefficient vector per spinor component, each
    /// ordered as the G-vectors returned by [`Self::expand_gvectors`].
    ///
    /// # Errors
    ///
    /// Errors if the number of stored coefficients is incompatible with the storage.
    pub fn decode(&self, raw: &Array1<Complex64>) -> Result<Vec<Array1<Complex64>>, anyhow::Error> {
        match self {
            Self::Standard => Ok(vec![raw.clone()]),
            Self::SpinOrbit => {
                ensure!(
                    raw.len() % 2 == 0,
                    "Spinor coefficients must have an even length, but {} coefficients were found.",
                    raw.len()
                );
                let nplw = raw.len() / 2;
                Ok(vec![
                    raw.slice(s![..nplw]).to_owned(),
                    raw.slice(s![nplw..]).to_owned(),
                ])
            }
            Self::GammaHalf => {
                ensure!(!raw.is_empty(), "No coefficients to decode.");
                let sqrt2 = 2.0f64.sqrt();
                let full = std::iter::once(raw[0])
                    .chain(raw.iter().skip(1).map(|c| c / sqrt2))
                    .chain(raw.iter().skip(1).map(|c| c.conj() / sqrt2))
                    .collect::<Array1<_>>();
                Ok(vec![full])
            }
        }
    }
}

impl fmt::Display for CoefficientStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::SpinOrbit => write!(f, "spin-orbit (two-component spinors)"),
            Self::GammaHalf => write!(f, "Γ-only half sphere"),
        }
    }
}
