//! Broadening of discrete spectral weights into a continuous spectral function.

use std::f64::consts::PI;
use std::fmt;

use anyhow::{self, ensure, format_err};
use itertools::Itertools;
use ndarray::{s, Array1, Array3, Array4, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};


/// The number of broadening widths by which the energy grid extends beyond the band energies.
const ENERGY_GRID_MARGIN: f64 = 5.0;

// ================
// Enum definitions
// ================

/// An enumerated type for the kernels used to broaden discrete spectral weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Smearing {
    /// Variant for the Lorentzian kernel
    /// $`L(x) = \frac{\sigma/\pi}{(x - x_0)^2 + \sigma^2}`$, where $`\sigma`$ is the half width at
    /// half maximum.
    #[default]
    Lorentzian,

    /// Variant for the Gaussian kernel
    /// $`G(x) = \frac{1}{\sqrt{2\pi}\sigma} \exp\left(-\frac{(x - x_0)^2}{2\sigma^2}\right)`$.
    Gaussian,
}

impl Smearing {
    /// Evaluates the normalised kernel centred at `x0` with width `sigma` at `x`.
    pub fn evaluate(&self, x: f64, x0: f64, sigma: f64) -> f64 {
        let dx = x - x0;
        match self {
            Self::Lorentzian => sigma / PI / (dx * dx + sigma * sigma),
            Self::Gaussian => {
                (-dx * dx / (2.0 * sigma * sigma)).exp() / ((2.0 * PI).sqrt() * sigma)
            }
        }
    }
}

impl fmt::Display for Smearing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lorentzian => write!(f, "Lorentzian"),
            Self::Gaussian => write!(f, "Gaussian"),
        }
    }
}

// =========
// Functions
// =========

/// Constructs a uniform energy grid spanning the band energies with a margin of five widths on
/// either side.
///
/// # Arguments
///
/// * `energies` - The band energies.
/// * `sigma` - The broadening width.
/// * `n_energy_bins` - The number of grid points.
///
/// # Errors
///
/// Errors if there are no energies, if any energy is not finite, if `sigma` is not positive, or
/// if fewer than two grid points are requested.
pub fn energy_grid<'a, I>(
    energies: I,
    sigma: f64,
    n_energy_bins: usize,
) -> Result<Array1<f64>, anyhow::Error>
where
    I: IntoIterator<Item = &'a f64>,
{
    ensure!(
        sigma > 0.0 && sigma.is_finite(),
        "The broadening width must be positive, but `{sigma}` was given."
    );
    ensure!(
        n_energy_bins >= 2,
        "At least two energy grid points are required, but {n_energy_bins} was given."
    );
    let (emin, emax) = energies
        .into_iter()
        .copied()
        .minmax_by(|a, b| a.total_cmp(b))
        .into_option()
        .ok_or_else(|| format_err!("No band energies found to build an energy grid."))?;
    ensure!(
        emin.is_finite() && emax.is_finite(),
        "Non-finite band energies found."
    );
    Ok(Array1::linspace(
        emin - ENERGY_GRID_MARGIN * sigma,
        emax + ENERGY_GRID_MARGIN * sigma,
        n_energy_bins,
    ))
}

/// Broadens the spectral weights of one spin channel and one k-point onto an energy grid.
///
/// # Arguments
///
/// * `energy_weights` - An array of shape $`(n_{\mathrm{bands}}, 2)`$ holding band energies and
/// spectral weights.
/// * `egrid` - The energy grid.
/// * `sigma` - The broadening width.
/// * `smearing` - The broadening kernel.
pub fn broaden(
    energy_weights: &ArrayView2<f64>,
    egrid: &Array1<f64>,
    sigma: f64,
    smearing: Smearing,
) -> Array1<f64> {
    egrid.map(|e| {
        energy_weights
            .outer_iter()
            .map(|ew| ew[1] * smearing.evaluate(*e, ew[0], sigma))
            .sum::<f64>()
    })
}

/// Builds the spectral function from spectral weights.
///
/// # Arguments
///
/// * `spectral_weights` - The spectral weights with axes (spin, k-point, band, {energy, weight}).
/// * `sigma` - The broadening width.
/// * `n_energy_bins` - The number of energy grid points.
/// * `smearing` - The broadening kernel.
///
/// # Returns
///
/// The energy grid, and the spectral function with axes (spin, energy, k-point).
///
/// # Errors
///
/// Errors if the spectral weights do not have a trailing axis of length two, or if the energy
/// grid cannot be constructed.
pub fn build_spectral_function(
    spectral_weights: &Array4<f64>,
    sigma: f64,
    n_energy_bins: usize,
    smearing: Smearing,
) -> Result<(Array1<f64>, Array3<f64>), anyhow::Error> {
    let (nspins, nkpts, _, nfields) = spectral_weights.dim();
    ensure!(
        nfields == 2,
        "Spectral weights must hold energy-weight pairs, but {nfields} fields per band were found."
    );
    let egrid = energy_grid(
        spectral_weights.slice(s![.., .., .., 0]).iter(),
        sigma,
        n_energy_bins,
    )?;

    let mut sf = Array3::<f64>::zeros((nspins, n_energy_bins, nkpts));
    for (ispin, sw_spin) in spectral_weights.outer_iter().enumerate() {
        let columns = sw_spin
            .outer_iter()
            .into_par_iter()
            .map(|ew| broaden(&ew, &egrid, sigma, smearing))
            .collect::<Vec<_>>();
        let mut sf_spin = sf.index_axis_mut(Axis(0), ispin);
        for (ikpt, column) in columns.into_iter().enumerate() {
            sf_spin.column_mut(ikpt).assign(&column);
        }
    }
    log::debug!(
        "Spectral function built on {n_energy_bins} energies between {:.4} and {:.4} eV.",
        egrid[0],
        egrid[n_energy_bins - 1]
    );
    Ok((egrid, sf))
}
