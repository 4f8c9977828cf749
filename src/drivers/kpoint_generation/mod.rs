//! Driver for generating the supercell K-points required to unfold a set of primitive k-points.

use std::fmt;
use std::path::PathBuf;

use anyhow::{self, format_err, Context};
use derive_builder::Builder;
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::auxiliary::kpoint_comparator::KPointComparator;
use crate::drivers::UnfoldDriver;
use crate::io::format::{
    format_kvector, log_subtitle, log_title, nice_bool, qunfold_output, QunfoldOutput,
};
use crate::io::{write_qunfold_binary, QunfoldFileType};
use crate::kpoints::kpath::{make_kpath, read_vasp_kpoints, write_vasp_kpoints};
use crate::kpoints::UnfoldKSet;
use crate::lattice::TransformationMatrix;
use crate::symmetry::symmetry_operation::KSymmetryOperation;


// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

fn default_n_segments() -> usize {
    40
}
fn default_kpoint_threshold() -> f64 {
    1e-6
}
fn default_primitive_lattice() -> Matrix3<f64> {
    Matrix3::identity()
}
fn default_symmetry_operations() -> Vec<KSymmetryOperation> {
    vec![KSymmetryOperation::identity()]
}

/// An enumerated type for the ways in which the primitive k-points to be unfolded can be
/// specified.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PrimitiveKPoints {
    /// Variant for a path through the primitive Brillouin zone given by its vertices, with a number
    /// of interpolated points per segment.
    Path {
        /// The vertices of the path in fractional coordinates.
        vertices: Vec<Vector3<f64>>,

        /// The number of points per segment.
        #[serde(default = "default_n_segments")]
        n_segments: usize,
    },

    /// Variant for an explicit list of k-points in fractional coordinates.
    List(Vec<Vector3<f64>>),

    /// Variant for k-points read from a VASP `KPOINTS` file listing them explicitly.
    FromKpointsFile(PathBuf),
}

impl PrimitiveKPoints {
    /// Resolves the specification into a list of fractional k-points.
    pub fn resolve(&self) -> Result<Vec<Vector3<f64>>, anyhow::Error> {
        match self {
            Self::Path {
                vertices,
                n_segments,
            } => make_kpath(vertices, *n_segments),
            Self::List(kpoints) => Ok(kpoints.clone()),
            Self::FromKpointsFile(path) => read_vasp_kpoints(path),
        }
    }
}

impl Default for PrimitiveKPoints {
    fn default() -> Self {
        Self::Path {
            vertices: vec![Vector3::zeros(), Vector3::new(0.5, 0.0, 0.0)],
            n_segments: default_n_segments(),
        }
    }
}

impl fmt::Display for PrimitiveKPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path {
                vertices,
                n_segments,
            } => {
                writeln!(f, "Path with {n_segments} point(s) per segment through:")?;
                for vertex in vertices.iter() {
                    writeln!(f, "  {}", format_kvector(vertex))?;
                }
                Ok(())
            }
            Self::List(kpoints) => writeln!(f, "Explicit list of {} k-point(s)", kpoints.len()),
            Self::FromKpointsFile(path) => {
                writeln!(f, "k-points read from {}", path.display())
            }
        }
    }
}

/// Structure containing control parameters for supercell K-point generation.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct KPointGenerationParams {
    /// The supercell/primitive-cell transformation matrix $`\mathbf{M}`$, given as rows, such that
    /// $`\mathbf{A} = \mathbf{M}\mathbf{a}`$.
    pub transformation_matrix: TransformationMatrix,

    /// The primitive real-space lattice vectors as rows. These are only used to compute path
    /// distances for plotting.
    #[builder(default = "default_primitive_lattice()")]
    #[serde(
        default = "default_primitive_lattice",
        with = "crate::lattice::matrix3_rows"
    )]
    pub primitive_lattice: Matrix3<f64>,

    /// The primitive k-points to be unfolded.
    #[builder(default)]
    #[serde(default)]
    pub kpoints: PrimitiveKPoints,

    /// The point-group operations of the primitive cell acting on fractional k-vectors.
    #[builder(default = "default_symmetry_operations()")]
    #[serde(default = "default_symmetry_operations")]
    pub primitive_symmetry_operations: Vec<KSymmetryOperation>,

    /// The point-group operations of the supercell acting on fractional k-vectors.
    #[builder(default = "default_symmetry_operations()")]
    #[serde(default = "default_symmetry_operations")]
    pub supercell_symmetry_operations: Vec<KSymmetryOperation>,

    /// The threshold for k-point equivalence.
    #[builder(default = "default_kpoint_threshold()")]
    #[serde(default = "default_kpoint_threshold")]
    pub kpoint_threshold: f64,

    /// Optional path for writing the reduced supercell K-points as a VASP `KPOINTS` file.
    #[builder(default = "None")]
    #[serde(default)]
    pub kpoints_file: Option<PathBuf>,

    /// Optional name for saving the k-point set as a binary file of type
    /// [`QunfoldFileType::KSet`]. If `None`, the set will not be saved.
    #[builder(default = "None")]
    #[serde(default)]
    pub result_save_name: Option<PathBuf>,
}

impl KPointGenerationParams {
    /// Returns a builder to construct a [`KPointGenerationParams`] structure.
    pub fn builder() -> KPointGenerationParamsBuilder {
        KPointGenerationParamsBuilder::default()
    }
}

impl Default for KPointGenerationParams {
    fn default() -> Self {
        Self::builder()
            .transformation_matrix(
                TransformationMatrix::new(Matrix3::identity())
                    .expect("Unable to construct an identity transformation matrix."),
            )
            .build()
            .expect("Unable to construct a default `KPointGenerationParams`.")
    }
}

impl fmt::Display for KPointGenerationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transformation matrix (supercell = M × primitive):")?;
        write!(f, "{}", self.transformation_matrix)?;
        writeln!(
            f,
            "Primitive/supercell volume ratio: {:.3}",
            self.transformation_matrix.volume_ratio()
        )?;
        writeln!(f)?;
        write!(f, "{}", self.kpoints)?;
        writeln!(f)?;
        writeln!(
            f,
            "Primitive symmetry operations: {}",
            self.primitive_symmetry_operations.len()
        )?;
        writeln!(
            f,
            "Supercell symmetry operations: {}",
            self.supercell_symmetry_operations.len()
        )?;
        writeln!(f, "K-point threshold: {:.3e}", self.kpoint_threshold)?;
        writeln!(
            f,
            "Write supercell K-points to KPOINTS file: {}",
            if let Some(path) = self.kpoints_file.as_ref() {
                path.display().to_string()
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(
            f,
            "Save k-point set to file: {}",
            if let Some(name) = self.result_save_name.as_ref() {
                let mut path = name.clone();
                path.set_extension(QunfoldFileType::KSet.ext());
                path.display().to_string()
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// Structure to contain supercell K-point generation results.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct KPointGenerationResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: KPointGenerationParams,

    /// The k-point set with its supercell K-points generated.
    pub kset: UnfoldKSet,
}

impl KPointGenerationResult {
    fn builder() -> KPointGenerationResultBuilder {
        KPointGenerationResultBuilder::default()
    }
}

impl fmt::Display for KPointGenerationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kset)
    }
}

// ------
// Driver
// ------

/// Driver for supercell K-point generation.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct KPointGenerationDriver<'a> {
    /// The control parameters for supercell K-point generation.
    parameters: &'a KPointGenerationParams,

    /// The result of the K-point generation.
    #[builder(setter(skip), default = "None")]
    result: Option<KPointGenerationResult>,
}

impl<'a> KPointGenerationDriverBuilder<'a> {
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or("No k-point generation parameters found.".to_string())?;
        if !(params.kpoint_threshold.is_finite() && params.kpoint_threshold > 0.0) {
            return Err(format!(
                "The k-point threshold must be positive, but `{:.3e}` was given.",
                params.kpoint_threshold
            ));
        }
        if let PrimitiveKPoints::Path { n_segments: 0, .. } = params.kpoints {
            return Err("The number of points per path segment must be positive.".to_string());
        }
        Ok(())
    }
}

impl<'a> KPointGenerationDriver<'a> {
    /// Returns a builder to construct a [`KPointGenerationDriver`] structure.
    pub fn builder() -> KPointGenerationDriverBuilder<'a> {
        KPointGenerationDriverBuilder::default()
    }

    /// Executes supercell K-point generation.
    fn generate_kpoints(&mut self) -> Result<(), anyhow::Error> {
        log_title("Supercell K-Point Generation");
        qunfold_output!("");
        let params = self.parameters;
        params.log_output_display();

        let kpoints = params
            .kpoints
            .resolve()
            .with_context(|| "Unable to resolve the primitive k-points to be unfolded")?;
        let comparator = KPointComparator::new(params.kpoint_threshold)?;
        let mut kset = UnfoldKSet::new(
            params.transformation_matrix.clone(),
            kpoints,
            params.primitive_lattice,
            params.primitive_symmetry_operations.clone(),
            params.supercell_symmetry_operations.clone(),
            comparator,
        )?;
        let (reduced, _) = kset.generate_sc_kpoints();
        let n_reduced = reduced.len();

        log_subtitle("Supercell K-points");
        qunfold_output!("");
        qunfold_output!(
            "{} primitive k-point(s) expanded by symmetry into {} k-point(s).",
            kset.n_kpts_orig(),
            kset.n_kpts_expand()
        );
        qunfold_output!(
            "{} distinct supercell K-point(s) must be computed.",
            n_reduced
        );
        qunfold_output!("");

        let result = KPointGenerationResult::builder()
            .parameters(params.clone())
            .kset(kset)
            .build()
            .map_err(|err| format_err!(err))?;
        result.log_output_display();
        qunfold_output!("");

        if let Some(path) = params.kpoints_file.as_ref() {
            write_vasp_kpoints(path, result.kset.reduced_sckpts()?)?;
            qunfold_output!("Supercell K-points written to {}.", path.display());
            qunfold_output!("");
        }
        if let Some(name) = params.result_save_name.as_ref() {
            write_qunfold_binary(name, QunfoldFileType::KSet, &result.kset)?;
            qunfold_output!(
                "K-point set saved as {}.",
                name.with_extension(QunfoldFileType::KSet.ext()).display()
            );
            qunfold_output!("");
        }
        log::debug!(
            "Supercell K-points: {}",
            result
                .kset
                .reduced_sckpts()?
                .iter()
                .map(format_kvector)
                .join(", ")
        );

        self.result = Some(result);
        Ok(())
    }
}

impl<'a> UnfoldDriver for KPointGenerationDriver<'a> {
    type Params = KPointGenerationParams;

    type Outcome = KPointGenerationResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No k-point generation results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.generate_kpoints()
    }
}
