//! Driver for computing the spectral weights of supercell Bloch states at primitive k-points.

use std::fmt;
use std::path::PathBuf;

use anyhow::{self, bail, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use nalgebra::Vector3;
use ndarray::{s, Array2, Array4, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::auxiliary::kpoint_comparator::KPointComparator;
use crate::drivers::UnfoldDriver;
use crate::io::format::{
    format_kvector, log_subtitle, log_title, nice_bool, qunfold_output, qunfold_warn,
    QunfoldOutput,
};
use crate::io::{write_qunfold_binary, QunfoldFileType};
use crate::kpoints::UnfoldKSet;
use crate::lattice::TransformationMatrix;
use crate::projection::Projector;
use crate::wavefunction::WavefunctionReader;

#[cfg(test)]
#[path = "spectral_weight_tests.rs"]
mod spectral_weight_tests;

/// The amount by which a single spectral weight may exceed unity before a warning is issued.
const WEIGHT_OVERSHOOT_TOLERANCE: f64 = 1e-6;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

fn default_kpoint_threshold() -> f64 {
    1e-6
}
fn default_gvector_threshold() -> f64 {
    1e-5
}

/// Structure containing control parameters for spectral weight calculations.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct SpectralWeightParams {
    /// The supercell/primitive-cell transformation matrix, given as rows.
    pub transformation_matrix: TransformationMatrix,

    /// The threshold for locating folded K-points in the wavefunction data.
    #[builder(default = "default_kpoint_threshold()")]
    #[serde(default = "default_kpoint_threshold")]
    pub kpoint_threshold: f64,

    /// The threshold for deciding whether a supercell G-vector is also a primitive reciprocal
    /// lattice vector.
    #[builder(default = "default_gvector_threshold()")]
    #[serde(default = "default_gvector_threshold")]
    pub gvector_threshold: f64,

    /// Optional name for saving the spectral weights as a binary file of type
    /// [`QunfoldFileType::Sw`]. If `None`, the weights will not be saved.
    #[builder(default = "None")]
    #[serde(default)]
    pub result_save_name: Option<PathBuf>,
}

impl SpectralWeightParams {
    /// Returns a builder to construct a [`SpectralWeightParams`] structure.
    pub fn builder() -> SpectralWeightParamsBuilder {
        SpectralWeightParamsBuilder::default()
    }
}

impl fmt::Display for SpectralWeightParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transformation matrix (supercell = M × primitive):")?;
        write!(f, "{}", self.transformation_matrix)?;
        writeln!(f, "K-point threshold: {:.3e}", self.kpoint_threshold)?;
        writeln!(f, "G-vector threshold: {:.3e}", self.gvector_threshold)?;
        writeln!(
            f,
            "Save spectral weights to file: {}",
            if let Some(name) = self.result_save_name.as_ref() {
                let mut path = name.clone();
                path.set_extension(QunfoldFileType::Sw.ext());
                path.display().to_string()
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// ----------------
// Spectral weights
// ----------------

/// Structure holding the energies and spectral weights of the supercell bands at a list of
/// primitive k-points.
///
/// For k-points expanded by symmetry, the rows of every k-point hold the bands of each orbit
/// member in turn, with the weights scaled by the member weights. K-points with fewer rows than
/// the largest orbit are padded with zero-weight entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectralWeights {
    /// The primitive k-points in fractional coordinates.
    pub kpoints: Vec<Vector3<f64>>,

    /// The energies and spectral weights with axes (spin, k-point, band, {energy, weight}).
    pub weights: Array4<f64>,
}

impl SpectralWeights {
    /// Returns the number of spin channels.
    pub fn n_spins(&self) -> usize {
        self.weights.len_of(Axis(0))
    }

    /// Returns the number of primitive k-points.
    pub fn n_kpoints(&self) -> usize {
        self.weights.len_of(Axis(1))
    }

    /// Returns the total spectral weight at every (spin, k-point) pair.
    pub fn total_weights(&self) -> Array2<f64> {
        self.weights
            .slice(s![.., .., .., 1])
            .sum_axis(Axis(2))
    }
}

impl fmt::Display for SpectralWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (nspins, nkpts, nrows, _) = self.weights.dim();
        writeln!(
            f,
            "Spectral weights at {nkpts} k-point(s) for {nspins} spin channel(s) with {nrows} band entries each"
        )?;
        let totals = self.total_weights();
        for (ikpt, k) in self.kpoints.iter().enumerate() {
            writeln!(
                f,
                "  {:>5}  {}  Σw = {}",
                ikpt + 1,
                format_kvector(k),
                (0..nspins)
                    .map(|ispin| format!("{:.6}", totals[(ispin, ikpt)]))
                    .join(" / ")
            )?;
        }
        Ok(())
    }
}

// ------
// Result
// ------

/// Structure to contain spectral weight calculation results.
#[derive(Clone, Builder, Debug)]
pub struct SpectralWeightResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: SpectralWeightParams,

    /// The computed spectral weights.
    pub spectral_weights: SpectralWeights,
}

impl SpectralWeightResult {
    fn builder() -> SpectralWeightResultBuilder {
        SpectralWeightResultBuilder::default()
    }
}

impl fmt::Display for SpectralWeightResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spectral_weights)
    }
}

// ------
// Driver
// ------

/// Driver for spectral weight calculations.
///
/// The primitive k-points are given either directly as a list, or as a k-point set whose
/// symmetry orbits are unfolded member by member.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SpectralWeightDriver<'a, W>
where
    W: WavefunctionReader,
{
    /// The control parameters for spectral weight calculations.
    parameters: &'a SpectralWeightParams,

    /// The supercell wavefunction data.
    wavefunction: &'a W,

    /// An explicit list of primitive k-points to be unfolded.
    #[builder(default = "None")]
    kpoints: Option<&'a [Vector3<f64>]>,

    /// A k-point set whose orbits are to be unfolded.
    #[builder(default = "None")]
    kset: Option<&'a UnfoldKSet>,

    /// The result of the spectral weight calculation.
    #[builder(setter(skip), default = "None")]
    result: Option<SpectralWeightResult>,
}

impl<'a, W> SpectralWeightDriverBuilder<'a, W>
where
    W: WavefunctionReader,
{
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or("No spectral weight parameters found.".to_string())?;
        if self.wavefunction.is_none() {
            return Err("No wavefunction data found.".to_string());
        }
        if !(params.kpoint_threshold.is_finite() && params.kpoint_threshold > 0.0) {
            return Err(format!(
                "The k-point threshold must be positive, but `{:.3e}` was given.",
                params.kpoint_threshold
            ));
        }
        if !(params.gvector_threshold.is_finite() && params.gvector_threshold > 0.0) {
            return Err(format!(
                "The G-vector threshold must be positive, but `{:.3e}` was given.",
                params.gvector_threshold
            ));
        }
        match (self.kpoints.flatten(), self.kset.flatten()) {
            (Some(kpoints), None) => {
                if kpoints.is_empty() {
                    Err("No primitive k-points to unfold.".to_string())
                } else {
                    Ok(())
                }
            }
            (None, Some(kset)) => {
                if kset.transformation_matrix() != &params.transformation_matrix {
                    Err(
                        "The k-point set was generated with a different transformation matrix."
                            .to_string(),
                    )
                } else {
                    Ok(())
                }
            }
            (None, None) => Err("No primitive k-points or k-point set found.".to_string()),
            (Some(_), Some(_)) => Err(
                "Only one of a list of primitive k-points and a k-point set may be given."
                    .to_string(),
            ),
        }
    }
}

impl<'a, W> SpectralWeightDriver<'a, W>
where
    W: WavefunctionReader,
{
    /// Returns a builder to construct a [`SpectralWeightDriver`] structure.
    pub fn builder() -> SpectralWeightDriverBuilder<'a, W>
    where
        W: Clone,
    {
        SpectralWeightDriverBuilder::default()
    }

    /// Returns, for every primitive k-point to be unfolded, the k-vectors to be sampled and their
    /// weights.
    fn samples(&self) -> Result<(Vec<Vector3<f64>>, Vec<Vec<(Vector3<f64>, f64)>>), anyhow::Error> {
        match (self.kpoints, self.kset) {
            (Some(kpoints), None) => Ok((
                kpoints.to_vec(),
                kpoints.iter().map(|k| vec![(*k, 1.0)]).collect(),
            )),
            (None, Some(kset)) => Ok((
                kset.kpoints().to_vec(),
                kset.orbits()
                    .iter()
                    .map(|orbit| orbit.iter().map(|(k, w)| (*k, w)).collect())
                    .collect(),
            )),
            _ => bail!("Exactly one source of primitive k-points must be specified."),
        }
    }

    /// Executes the spectral weight calculation.
    fn compute_spectral_weights(&mut self) -> Result<(), anyhow::Error> {
        log_title("Spectral Weights");
        qunfold_output!("");
        let params = self.parameters;
        params.log_output_display();

        let reader = self.wavefunction;
        log_subtitle("Supercell wavefunction data");
        qunfold_output!("");
        qunfold_output!("Spin channels: {}", reader.n_spins());
        qunfold_output!("K-points: {}", reader.n_kpoints());
        qunfold_output!("Bands: {}", reader.n_bands());
        qunfold_output!("Coefficient storage: {}", reader.storage());
        qunfold_output!("");

        let comparator = KPointComparator::new(params.kpoint_threshold)?;
        let projector = Projector::new(
            reader,
            &params.transformation_matrix,
            comparator,
            params.gvector_threshold,
        )?;
        let (kpoints, samples) = self.samples()?;

        let nspins = reader.n_spins();
        let nbands = reader.n_bands();
        let nkpts = kpoints.len();
        let nrows = samples.iter().map(Vec::len).max().unwrap_or(1) * nbands;
        let mut sw = Array4::<f64>::zeros((nspins, nkpts, nrows, 2));

        log_subtitle("Unfolding");
        qunfold_output!("");
        for ispin in 0..nspins {
            if nspins > 1 {
                qunfold_output!("Spin channel {}:", ispin + 1);
            }
            let blocks = samples
                .par_iter()
                .enumerate()
                .map(|(ikpt, members)| -> Result<Array2<f64>, anyhow::Error> {
                    qunfold_output!(
                        "Processing k-point {:>5}/{nkpts}: {}",
                        ikpt + 1,
                        format_kvector(&kpoints[ikpt])
                    );
                    let mut block = Array2::<f64>::zeros((nrows, 2));
                    for (imember, (k, w)) in members.iter().enumerate() {
                        let ew = projector.spectral_weight_k(k, ispin)?;
                        if let Some(wmax) = ew
                            .column(1)
                            .iter()
                            .copied()
                            .reduce(f64::max)
                            .filter(|wmax| *wmax > 1.0 + WEIGHT_OVERSHOOT_TOLERANCE)
                        {
                            qunfold_warn!(
                                "Spectral weight {wmax:.6} exceeds unity at k = {}.",
                                format_kvector(k)
                            );
                        }
                        let mut rows =
                            block.slice_mut(s![imember * nbands..(imember + 1) * nbands, ..]);
                        rows.column_mut(0).assign(&ew.column(0));
                        rows.column_mut(1).assign(&ew.column(1).mapv(|x| x * w));
                    }
                    let nfilled = members.len() * nbands;
                    for irow in nfilled..nrows {
                        block[(irow, 0)] = block[(irow % nfilled, 0)];
                    }
                    Ok(block)
                })
                .collect::<Result<Vec<_>, _>>()?;
            for (ikpt, block) in blocks.into_iter().enumerate() {
                sw.slice_mut(s![ispin, ikpt, .., ..]).assign(&block);
            }
            if nspins > 1 {
                qunfold_output!("");
            }
        }
        qunfold_output!("");

        let spectral_weights = SpectralWeights {
            kpoints,
            weights: sw,
        };
        let result = SpectralWeightResult::builder()
            .parameters(params.clone())
            .spectral_weights(spectral_weights)
            .build()
            .map_err(|err| format_err!(err))?;
        result.log_output_display();
        qunfold_output!("");

        if let Some(name) = params.result_save_name.as_ref() {
            write_qunfold_binary(name, QunfoldFileType::Sw, &result.spectral_weights)?;
            qunfold_output!(
                "Spectral weights saved as {}.",
                name.with_extension(QunfoldFileType::Sw.ext()).display()
            );
            qunfold_output!("");
        }

        self.result = Some(result);
        Ok(())
    }
}

impl<'a, W> UnfoldDriver for SpectralWeightDriver<'a, W>
where
    W: WavefunctionReader,
{
    type Params = SpectralWeightParams;

    type Outcome = SpectralWeightResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No spectral weight results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.compute_spectral_weights()
    }
}
