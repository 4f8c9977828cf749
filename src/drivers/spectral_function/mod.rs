//! Driver for broadening spectral weights into an effective band structure.

use std::fmt;
use std::path::PathBuf;

use anyhow::{self, format_err};
use derive_builder::Builder;
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};

use crate::drivers::spectral_weight::SpectralWeights;
use crate::drivers::UnfoldDriver;
use crate::io::format::{log_subtitle, log_title, nice_bool, qunfold_output, QunfoldOutput};
use crate::io::table::write_spectral_function_table;
use crate::io::{write_qunfold_binary, QunfoldFileType};
use crate::spectral::{build_spectral_function, Smearing};


// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

fn default_n_energy_bins() -> usize {
    4000
}
fn default_sigma() -> f64 {
    0.02
}

/// Structure containing control parameters for spectral function construction.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct SpectralFunctionParams {
    /// The number of points in the energy grid.
    #[builder(default = "default_n_energy_bins()")]
    #[serde(default = "default_n_energy_bins")]
    pub n_energy_bins: usize,

    /// The broadening width in eV.
    #[builder(default = "default_sigma()")]
    #[serde(default = "default_sigma")]
    pub sigma: f64,

    /// The broadening kernel.
    #[builder(default)]
    #[serde(default)]
    pub smearing: Smearing,

    /// Optional name for saving the spectral function and its energy grid as binary files of
    /// types [`QunfoldFileType::Sf`] and [`QunfoldFileType::Egrid`]. If `None`, they will not be
    /// saved.
    #[builder(default = "None")]
    #[serde(default)]
    pub result_save_name: Option<PathBuf>,

    /// Optional path for exporting the spectral function as a plain-text table.
    #[builder(default = "None")]
    #[serde(default)]
    pub table_save_name: Option<PathBuf>,
}

impl SpectralFunctionParams {
    /// Returns a builder to construct a [`SpectralFunctionParams`] structure.
    pub fn builder() -> SpectralFunctionParamsBuilder {
        SpectralFunctionParamsBuilder::default()
    }
}

impl Default for SpectralFunctionParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `SpectralFunctionParams`.")
    }
}

impl fmt::Display for SpectralFunctionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of energy grid points: {}", self.n_energy_bins)?;
        writeln!(f, "Broadening kernel: {}", self.smearing)?;
        writeln!(f, "Broadening width: {:.4} eV", self.sigma)?;
        writeln!(
            f,
            "Save spectral function to file: {}",
            if let Some(name) = self.result_save_name.as_ref() {
                let mut path = name.clone();
                path.set_extension(QunfoldFileType::Sf.ext());
                path.display().to_string()
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(
            f,
            "Export spectral function table: {}",
            if let Some(path) = self.table_save_name.as_ref() {
                path.display().to_string()
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// -----------------
// Spectral function
// -----------------

/// Structure holding a spectral function on a uniform energy grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectralFunction {
    /// The energy grid in eV.
    pub energies: Array1<f64>,

    /// The spectral intensities with axes (spin, energy, k-point).
    pub intensities: Array3<f64>,
}

impl fmt::Display for SpectralFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (nspins, nenergies, nkpts) = self.intensities.dim();
        writeln!(
            f,
            "Spectral function on {nenergies} energies at {nkpts} k-point(s) for {nspins} spin channel(s)"
        )?;
        if let (Some(emin), Some(emax)) = (self.energies.first(), self.energies.last()) {
            writeln!(f, "Energy range: [{emin:.4}, {emax:.4}] eV")?;
        }
        let imax = self.intensities.iter().copied().fold(0.0, f64::max);
        writeln!(f, "Maximum intensity: {imax:.6}")?;
        Ok(())
    }
}

// ------
// Result
// ------

/// Structure to contain spectral function results.
#[derive(Clone, Builder, Debug)]
pub struct SpectralFunctionResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: SpectralFunctionParams,

    /// The spectral function.
    pub spectral_function: SpectralFunction,
}

impl SpectralFunctionResult {
    fn builder() -> SpectralFunctionResultBuilder {
        SpectralFunctionResultBuilder::default()
    }
}

impl fmt::Display for SpectralFunctionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spectral_function)
    }
}

// ------
// Driver
// ------

/// Driver for spectral function construction.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SpectralFunctionDriver<'a> {
    /// The control parameters for spectral function construction.
    parameters: &'a SpectralFunctionParams,

    /// The spectral weights to be broadened.
    #[builder(default = "None")]
    spectral_weights: Option<&'a SpectralWeights>,

    /// Optional path distances of the k-points, used as the abscissa of exported tables. If
    /// `None`, k-point indices are used instead.
    #[builder(default = "None")]
    kdistances: Option<&'a [f64]>,

    /// The result of the spectral function construction.
    #[builder(setter(skip), default = "None")]
    result: Option<SpectralFunctionResult>,
}

impl<'a> SpectralFunctionDriverBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or("No spectral function parameters found.".to_string())?;
        let spectral_weights = self
            .spectral_weights
            .flatten()
            .ok_or("Spectral weights must be calculated first.".to_string())?;
        if !(params.sigma.is_finite() && params.sigma > 0.0) {
            return Err(format!(
                "The broadening width must be positive, but `{}` was given.",
                params.sigma
            ));
        }
        if params.n_energy_bins < 2 {
            return Err(format!(
                "At least two energy grid points are required, but {} was given.",
                params.n_energy_bins
            ));
        }
        if let Some(kdistances) = self.kdistances.flatten() {
            if kdistances.len() != spectral_weights.n_kpoints() {
                return Err(format!(
                    "{} k-point distances were given for {} k-points.",
                    kdistances.len(),
                    spectral_weights.n_kpoints()
                ));
            }
        }
        Ok(())
    }
}

impl<'a> SpectralFunctionDriver<'a> {
    /// Returns a builder to construct a [`SpectralFunctionDriver`] structure.
    pub fn builder() -> SpectralFunctionDriverBuilder<'a> {
        SpectralFunctionDriverBuilder::default()
    }

    /// Executes the spectral function construction.
    fn compute_spectral_function(&mut self) -> Result<(), anyhow::Error> {
        log_title("Spectral Function");
        qunfold_output!("");
        let params = self.parameters;
        params.log_output_display();

        let spectral_weights = self
            .spectral_weights
            .ok_or_else(|| format_err!("Spectral weights must be calculated first."))?;
        let (energies, intensities) = build_spectral_function(
            &spectral_weights.weights,
            params.sigma,
            params.n_energy_bins,
            params.smearing,
        )?;
        let result = SpectralFunctionResult::builder()
            .parameters(params.clone())
            .spectral_function(SpectralFunction {
                energies,
                intensities,
            })
            .build()
            .map_err(|err| format_err!(err))?;

        log_subtitle("Effective band structure");
        qunfold_output!("");
        result.log_output_display();
        qunfold_output!("");

        if let Some(name) = params.result_save_name.as_ref() {
            write_qunfold_binary(
                name,
                QunfoldFileType::Sf,
                &result.spectral_function.intensities,
            )?;
            write_qunfold_binary(
                name,
                QunfoldFileType::Egrid,
                &result.spectral_function.energies,
            )?;
            qunfold_output!(
                "Spectral function saved as {} with its energy grid in {}.",
                name.with_extension(QunfoldFileType::Sf.ext()).display(),
                name.with_extension(QunfoldFileType::Egrid.ext()).display()
            );
            qunfold_output!("");
        }
        if let Some(path) = params.table_save_name.as_ref() {
            write_spectral_function_table(path, &result.spectral_function, self.kdistances)?;
            qunfold_output!("Spectral function table written to {}.", path.display());
            qunfold_output!("");
        }

        self.result = Some(result);
        Ok(())
    }
}

impl<'a> UnfoldDriver for SpectralFunctionDriver<'a> {
    type Params = SpectralFunctionParams;

    type Outcome = SpectralFunctionResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No spectral function results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.compute_spectral_function()
    }
}
