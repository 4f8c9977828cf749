//! YAML input files specifying qunfold calculations.

use std::path::PathBuf;

use anyhow::{self, bail, format_err, Context};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::drivers::kpoint_generation::{KPointGenerationDriver, KPointGenerationParams};
use crate::drivers::spectral_function::{SpectralFunctionDriver, SpectralFunctionParams};
use crate::drivers::spectral_weight::{SpectralWeightDriver, SpectralWeightParams, SpectralWeights};
use crate::drivers::UnfoldDriver;
use crate::interfaces::InputHandle;
use crate::io::format::{log_macsec_begin, log_macsec_end, qunfold_output, qunfold_warn};
use crate::io::{read_qunfold_binary, QunfoldFileType};
use crate::kpoints::kpath::kpath_distances;
use crate::kpoints::UnfoldKSet;
use crate::wavefunction::in_memory::InMemoryWavefunction;


// ================
// Enum definitions
// ================

/// An enumerated type representing possible input kinds for supercell K-point generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum KPointGenerationInputKind {
    /// Variant indicating that the parameters for the K-point generation driver will be
    /// specified.
    Parameters(KPointGenerationParams),

    /// Variant indicating that the k-point set will be read in from a [`QunfoldFileType::KSet`]
    /// binary file. The associated path gives the name of the file without its `.qunfold.kset`
    /// extension.
    FromFile(PathBuf),
}

impl Default for KPointGenerationInputKind {
    fn default() -> Self {
        KPointGenerationInputKind::Parameters(KPointGenerationParams::default())
    }
}

/// An enumerated type representing the possible sources of the primitive k-points at which
/// spectral weights are computed.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub enum UnfoldingKPointsSource {
    /// Variant indicating that the k-point set from the `kpoint_generation` section is used.
    #[default]
    FromKPointGeneration,

    /// Variant indicating that the k-point set will be read in from a [`QunfoldFileType::KSet`]
    /// binary file. The associated path gives the name of the file without its `.qunfold.kset`
    /// extension.
    FromFile(PathBuf),

    /// Variant indicating an explicit list of primitive k-points, which are not expanded by
    /// symmetry.
    List(Vec<Vector3<f64>>),
}

/// An enumerated type representing possible input kinds for spectral weight calculations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SpectralWeightInputKind {
    /// Variant indicating that the parameters for the spectral weight driver will be specified.
    Parameters(SpectralWeightParams),

    /// Variant indicating that the spectral weights will be read in from a
    /// [`QunfoldFileType::Sw`] binary file. The associated path gives the name of the file
    /// without its `.qunfold.sw` extension.
    FromFile(PathBuf),
}

// ==================
// Struct definitions
// ==================

/// A structure containing the specification for unfolding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnfoldingInput {
    /// The name of a [`QunfoldFileType::Wfn`] binary file containing the supercell wavefunction
    /// data, without its `.qunfold.wfn` extension. This is only required if spectral weights are
    /// to be computed.
    #[serde(default)]
    pub wavefunction: Option<PathBuf>,

    /// The source of the primitive k-points.
    #[serde(default)]
    pub kpoints: UnfoldingKPointsSource,

    /// Specification for the spectral weights.
    pub spectral_weight: SpectralWeightInputKind,

    /// Specification for the spectral function. If `None`, no spectral function will be
    /// constructed.
    #[serde(default)]
    pub spectral_function: Option<SpectralFunctionParams>,
}

impl UnfoldingInput {
    /// Resolves the k-point set to be unfolded, if any.
    fn resolve_kset(&self, generated: Option<&UnfoldKSet>) -> Result<Option<UnfoldKSet>, anyhow::Error> {
        match &self.kpoints {
            UnfoldingKPointsSource::FromKPointGeneration => generated
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    format_err!(
                        "No k-point set is available from the `kpoint_generation` section."
                    )
                }),
            UnfoldingKPointsSource::FromFile(name) => {
                qunfold_output!("Reading k-point set from {}...", name.display());
                read_qunfold_binary::<UnfoldKSet, _>(name, QunfoldFileType::KSet)
                    .with_context(|| {
                        format!("Unable to read the k-point set from {}", name.display())
                    })
                    .map(Some)
            }
            UnfoldingKPointsSource::List(_) => Ok(None),
        }
    }

    /// Computes or reads in the spectral weights.
    fn spectral_weights(&self, kset: Option<&UnfoldKSet>) -> Result<SpectralWeights, anyhow::Error> {
        match &self.spectral_weight {
            SpectralWeightInputKind::Parameters(params) => {
                let wfn_name = self.wavefunction.as_ref().ok_or_else(|| {
                    format_err!("No wavefunction file specified for spectral weight calculations.")
                })?;
                let wfn: InMemoryWavefunction =
                    read_qunfold_binary(wfn_name, QunfoldFileType::Wfn).with_context(|| {
                        format!(
                            "Unable to read the wavefunction data from {}",
                            wfn_name.display()
                        )
                    })?;
                let mut builder = SpectralWeightDriver::builder();
                builder.parameters(params).wavefunction(&wfn);
                match (&self.kpoints, kset) {
                    (UnfoldingKPointsSource::List(kpoints), _) => {
                        builder.kpoints(Some(kpoints.as_slice()));
                    }
                    (_, Some(kset)) => {
                        builder.kset(Some(kset));
                    }
                    (_, None) => bail!("No primitive k-points to unfold."),
                }
                let mut driver = builder
                    .build()
                    .with_context(|| "Unable to construct a spectral weight driver")?;
                driver.run()?;
                Ok(driver.result()?.spectral_weights.clone())
            }
            SpectralWeightInputKind::FromFile(name) => {
                qunfold_output!("Reading spectral weights from {}...", name.display());
                qunfold_output!("");
                read_qunfold_binary(name, QunfoldFileType::Sw).with_context(|| {
                    format!("Unable to read the spectral weights from {}", name.display())
                })
            }
        }
    }
}

impl InputHandle for UnfoldingInput {
    fn handle(&self) -> Result<(), anyhow::Error> {
        self.handle_with_kset(None)
    }
}

impl UnfoldingInput {
    /// Handles the unfolding section, given a k-point set that may have been generated by an
    /// earlier section.
    fn handle_with_kset(&self, generated: Option<&UnfoldKSet>) -> Result<(), anyhow::Error> {
        let kset = self.resolve_kset(generated)?;
        let spectral_weights = self.spectral_weights(kset.as_ref())?;

        if let Some(sf_params) = self.spectral_function.as_ref() {
            let kdistances = match kset.as_ref() {
                Some(kset) if kpoints_match(kset, &spectral_weights.kpoints) => Some(
                    kpath_distances(kset.kpoints(), kset.primitive_lattice())?,
                ),
                Some(_) => {
                    qunfold_warn!(
                        "The k-point set does not match the k-points of the spectral weights. K-point indices will be used in place of path distances."
                    );
                    None
                }
                None => None,
            };
            let mut driver = SpectralFunctionDriver::builder()
                .parameters(sf_params)
                .spectral_weights(Some(&spectral_weights))
                .kdistances(kdistances.as_deref())
                .build()
                .with_context(|| "Unable to construct a spectral function driver")?;
            driver.run()?;
        }
        Ok(())
    }
}

/// Determines if the spectral weights were computed at exactly the primitive k-points of a k-point
/// set, in the same order.
fn kpoints_match(kset: &UnfoldKSet, kpoints: &[Vector3<f64>]) -> bool {
    kset.kpoints().len() == kpoints.len()
        && kset
            .kpoints()
            .iter()
            .zip(kpoints.iter())
            .all(|(k1, k2)| kset.comparator().equivalent(k1, k2))
}

/// A structure containing qunfold input parameters which can be serialised into and deserialised
/// from a YAML input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Input {
    /// Specification for supercell K-point generation. If `None`, no K-point generation will be
    /// performed. If not `None`, then this either specifies the parameters for K-point generation,
    /// or the name of a [`QunfoldFileType::KSet`] binary file containing a generated k-point set.
    ///
    /// If not specified, this will be taken to be `None`.
    #[serde(default)]
    pub kpoint_generation: Option<KPointGenerationInputKind>,

    /// Specification for unfolding. If `None`, no unfolding will be performed.
    ///
    /// If not specified, this will be taken to be `None`.
    #[serde(default)]
    pub unfolding: Option<UnfoldingInput>,
}

impl Default for Input {
    fn default() -> Self {
        Input {
            kpoint_generation: Some(KPointGenerationInputKind::default()),
            unfolding: None,
        }
    }
}

impl InputHandle for Input {
    fn handle(&self) -> Result<(), anyhow::Error> {
        let kset = match &self.kpoint_generation {
            Some(KPointGenerationInputKind::Parameters(params)) => {
                let mut driver = KPointGenerationDriver::builder()
                    .parameters(params)
                    .build()
                    .with_context(|| "Unable to construct a k-point generation driver")?;
                driver.run()?;
                Some(driver.result()?.kset.clone())
            }
            Some(KPointGenerationInputKind::FromFile(name)) => {
                qunfold_output!("Reading k-point set from {}...", name.display());
                qunfold_output!("");
                Some(
                    read_qunfold_binary::<UnfoldKSet, _>(name, QunfoldFileType::KSet)
                        .with_context(|| {
                            format!("Unable to read the k-point set from {}", name.display())
                        })?,
                )
            }
            None => None,
        };

        if let Some(unfolding) = self.unfolding.as_ref() {
            log_macsec_begin("Unfolding");
            qunfold_output!("");
            unfolding.handle_with_kset(kset.as_ref())?;
            log_macsec_end("Unfolding");
            qunfold_output!("");
        } else if kset.is_none() {
            qunfold_output!("Nothing to do.");
        }
        Ok(())
    }
}
