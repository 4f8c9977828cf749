//! In-memory plane-wave wavefunction data.

use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use nalgebra::Vector3;
use ndarray::{Array1, Array2, Array3};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::wavefunction::{CoefficientStorage, WavefunctionReader};

#[cfg(test)]
#[path = "in_memory_tests.rs"]
mod in_memory_tests;

/// A structure holding the plane-wave wavefunction data of a supercell calculation in memory.
///
/// This is useful for data that have already been extracted from a binary wavefunction file,
/// and can be persisted as a [`crate::io::QunfoldFileType::Wfn`] file.
///
/// Deserialisation goes through [`InMemoryWavefunctionBuilder`], so data read from a file are
/// subject to the same consistency checks as data constructed in code.
#[derive(Builder, Clone, Debug, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
#[serde(try_from = "InMemoryWavefunctionData")]
pub struct InMemoryWavefunction {
    /// The K-vectors in fractional supercell reciprocal coordinates.
    #[builder(setter(custom))]
    kvectors: Vec<Vector3<f64>>,

    /// The dimensions of the FFT grid.
    fft_grid: [usize; 3],

    /// The coefficient storage convention.
    #[builder(default = "CoefficientStorage::Standard")]
    storage: CoefficientStorage,

    /// The stored G-vectors at each K-point.
    gvectors: Vec<Vec<Vector3<i64>>>,

    /// The band energies with axes (spin, K-point, band).
    energies: Array3<f64>,

    /// The stored coefficients, indexed by spin then K-point, each with axes (band, coefficient).
    coefficients: Vec<Vec<Array2<Complex64>>>,
}

/// Unvalidated mirror of [`InMemoryWavefunction`] used for deserialisation.
#[derive(Deserialize)]
struct InMemoryWavefunctionData {
    kvectors: Vec<Vector3<f64>>,
    fft_grid: [usize; 3],
    storage: CoefficientStorage,
    gvectors: Vec<Vec<Vector3<i64>>>,
    energies: Array3<f64>,
    coefficients: Vec<Vec<Array2<Complex64>>>,
}

impl TryFrom<InMemoryWavefunctionData> for InMemoryWavefunction {
    type Error = anyhow::Error;

    fn try_from(data: InMemoryWavefunctionData) -> Result<Self, Self::Error> {
        InMemoryWavefunction::builder()
            .kvectors(&data.kvectors)
            .fft_grid(data.fft_grid)
            .storage(data.storage)
            .gvectors(data.gvectors)
            .energies(data.energies)
            .coefficients(data.coefficients)
            .build()
            .map_err(|err| format_err!("Inconsistent wavefunction data: {err}"))
    }
}

impl InMemoryWavefunctionBuilder {
    pub fn kvectors(&mut self, kvectors: &[Vector3<f64>]) -> &mut Self {
        self.kvectors = Some(kvectors.to_vec());
        self
    }

    fn validate(&self) -> Result<(), String> {
        let kvectors = self
            .kvectors
            .as_ref()
            .ok_or("No K-vectors found.".to_string())?;
        let nkpts = kvectors.len();
        let fft_grid = self.fft_grid.ok_or("No FFT grid found.".to_string())?;
        let storage = self.storage.unwrap_or_default();
        let gvectors = self
            .gvectors
            .as_ref()
            .ok_or("No G-vectors found.".to_string())?;
        let energies = self
            .energies
            .as_ref()
            .ok_or("No band energies found.".to_string())?;
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or("No coefficients found.".to_string())?;

        if fft_grid.iter().any(|n| *n == 0) {
            return Err("The FFT grid dimensions must be positive.".to_string());
        }
        if gvectors.len() != nkpts {
            return Err(format!(
                "G-vectors are given for {} K-points, but there are {nkpts} K-points.",
                gvectors.len()
            ));
        }
        let (nspins, nkpts_e, nbands) = energies.dim();
        if nkpts_e != nkpts || nspins == 0 {
            return Err(format!(
                "Band energies of shape ({nspins}, {nkpts_e}, {nbands}) are inconsistent with {nkpts} K-points."
            ));
        }
        if coefficients.len() != nspins || coefficients.iter().any(|c| c.len() != nkpts) {
            return Err(
                "The coefficients must be given for every spin channel and every K-point."
                    .to_string(),
            );
        }
        let ncomps = if storage == CoefficientStorage::SpinOrbit {
            2
        } else {
            1
        };
        let shapes_ok = coefficients.iter().all(|cs| {
            cs.iter()
                .zip(gvectors.iter())
                .all(|(c, gs)| c.dim() == (nbands, ncomps * gs.len()))
        });
        if !shapes_ok {
            return Err(
                "The coefficient arrays are inconsistent with the band count or the stored G-vectors."
                    .to_string(),
            );
        }
        if storage == CoefficientStorage::GammaHalf
            && gvectors.iter().any(|gs| gs.first() != Some(&Vector3::zeros()))
        {
            return Err("Half-sphere storage requires the first G-vector to be zero.".to_string());
        }
        Ok(())
    }
}

impl InMemoryWavefunction {
    /// Returns a builder to construct a new [`InMemoryWavefunction`].
    pub fn builder() -> InMemoryWavefunctionBuilder {
        InMemoryWavefunctionBuilder::default()
    }

    fn check_indices(&self, ispin: usize, ikpt: usize, iband: usize) -> Result<(), anyhow::Error> {
        let (nspins, nkpts, nbands) = self.energies.dim();
        ensure!(ispin < nspins, "Spin index {ispin} out of range ({nspins} spins).");
        ensure!(ikpt < nkpts, "K-point index {ikpt} out of range ({nkpts} K-points).");
        ensure!(iband < nbands, "Band index {iband} out of range ({nbands} bands).");
        Ok(())
    }
}

impl WavefunctionReader for InMemoryWavefunction {
    fn n_spins(&self) -> usize {
        self.energies.dim().0
    }

    fn n_kpoints(&self) -> usize {
        self.kvectors.len()
    }

    fn n_bands(&self) -> usize {
        self.energies.dim().2
    }

    fn kvectors(&self) -> &[Vector3<f64>] {
        &self.kvectors
    }

    fn fft_grid(&self) -> [usize; 3] {
        self.fft_grid
    }

    fn storage(&self) -> CoefficientStorage {
        self.storage
    }

    fn gvectors(&self, ikpt: usize) -> Result<Vec<Vector3<i64>>, anyhow::Error> {
        self.gvectors
            .get(ikpt)
            .cloned()
            .ok_or_else(|| format_err!("K-point index {ikpt} out of range."))
    }

    fn band_energy(&self, ispin: usize, ikpt: usize, iband: usize) -> Result<f64, anyhow::Error> {
        self.check_indices(ispin, ikpt, iband)?;
        Ok(self.energies[(ispin, ikpt, iband)])
    }

    fn band_coefficients(
        &self,
        ispin: usize,
        ikpt: usize,
        iband: usize,
    ) -> Result<Array1<Complex64>, anyhow::Error> {
        self.check_indices(ispin, ikpt, iband)?;
        let coeffs = self
            .coefficients
            .get(ispin)
            .and_then(|cs| cs.get(ikpt))
            .ok_or_else(|| {
                format_err!("No coefficients stored for K-point {ikpt} (spin {ispin}).")
            })?
            .row(iband);
        let norm = coeffs.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
        ensure!(
            norm > 0.0,
            "Band {iband} at K-point {ikpt} (spin {ispin}) has vanishing coefficients."
        );
        Ok(coeffs.mapv(|c| c / norm))
    }
}

impl fmt::Display for InMemoryWavefunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Wavefunction data")?;
        writeln!(f, "  Spin channels: {}", self.n_spins())?;
        writeln!(f, "  K-points: {}", self.n_kpoints())?;
        writeln!(f, "  Bands: {}", self.n_bands())?;
        writeln!(
            f,
            "  FFT grid: {} × {} × {}",
            self.fft_grid[0], self.fft_grid[1], self.fft_grid[2]
        )?;
        writeln!(f, "  Coefficient storage: {}", self.storage)?;
        Ok(())
    }
}
