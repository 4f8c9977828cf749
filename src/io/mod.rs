//! Persistence of intermediate unfolding results and configuration files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{self, format_err};
use bincode;
use serde::{de::DeserializeOwned, Serialize};
use serde_yaml;

pub(crate) mod format;
pub mod table;


/// An enumerated type for `qunfold` file types.
pub enum QunfoldFileType {
    /// Variant for binary files containing a primitive/supercell k-point set.
    KSet,

    /// Variant for binary files containing spectral weights.
    Sw,

    /// Variant for binary files containing spectral functions.
    Sf,

    /// Variant for binary files containing the energy grid of a spectral function.
    Egrid,

    /// Variant for binary files containing in-memory wavefunction data.
    Wfn,
}

impl QunfoldFileType {
    /// Returns the extension of the file type.
    pub fn ext(&self) -> String {
        match self {
            QunfoldFileType::KSet => "qunfold.kset".to_string(),
            QunfoldFileType::Sw => "qunfold.sw".to_string(),
            QunfoldFileType::Sf => "qunfold.sf".to_string(),
            QunfoldFileType::Egrid => "qunfold.egrid".to_string(),
            QunfoldFileType::Wfn => "qunfold.wfn".to_string(),
        }
    }
}

/// Reads a `qunfold` binary file and deserialises it into an appropriate structure.
///
/// # Arguments
///
/// * `name` - The name of the file to be read in (without `qunfold`-specific extensions).
/// * `file_type` - The type of the `qunfold` file to be read in.
///
/// # Returns
///
/// A `Result` containing the structure deserialised from the read-in file.
pub fn read_qunfold_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: QunfoldFileType,
) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension(file_type.ext());
    let mut reader = BufReader::new(File::open(path).map_err(|err| format_err!(err))?);
    bincode::deserialize_from(&mut reader).map_err(|err| format_err!(err))
}

/// Serialises a structure and writes into a `qunfold` binary file.
///
/// # Arguments
///
/// * `name` - The name of the file to be written (without `qunfold`-specific extensions).
/// * `file_type` - The type of the `qunfold` file to be written.
///
/// # Returns
///
/// A `Result` indicating if the serialisation and writing processes have been successful.
pub fn write_qunfold_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: QunfoldFileType,
    value: &T,
) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension(file_type.ext());
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, value).map_err(|err| format_err!(err))
}

/// Reads a `qunfold` configuration YAML file and deserialises it into an appropriate structure.
///
/// # Arguments
///
/// * `name` - The name of the file to be read in (with its `.yml` or `.yaml` extension).
///
/// # Returns
///
/// A `Result` containing the structure deserialised from the read-in file.
pub fn read_qunfold_yaml<T, P: AsRef<Path>>(name: P) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let mut reader = BufReader::new(File::open(name).map_err(|err| format_err!(err))?);
    serde_yaml::from_reader(&mut reader).map_err(|err| format_err!(err))
}

/// Serialises a structure and writes into a `qunfold` configuration YAML file.
///
/// # Arguments
///
/// * `name` - The name of the YAML file to be written (without extensions). The resulting file
/// will have the `.yml` extension.
///
/// # Returns
///
/// A `Result` indicating if the serialisation and writing processes have been successful.
pub fn write_qunfold_yaml<T, P: AsRef<Path>>(name: P, value: &T) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension("yml");
    let mut writer = BufWriter::new(File::create(path)?);
    serde_yaml::to_writer(&mut writer, value).map_err(|err| format_err!(err))
}
