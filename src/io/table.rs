//! Plain-text export of spectral functions for external plotting.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{self, ensure};

use crate::drivers::spectral_function::SpectralFunction;

/// Writes a spectral function as whitespace-separated columns `x energy intensity`.
///
/// Each spin channel forms its own block headed by a comment line, and the rows of each k-point
/// are separated by a blank line so that the table can be read directly as a surface grid.
///
/// # Arguments
///
/// * `path` - The path of the file to be written.
/// * `spectral_function` - The spectral function to be exported.
/// * `kdistances` - Optional path distances of the k-points, used for the `x` column. If `None`,
/// k-point indices are used instead.
///
/// # Errors
///
/// Errors if the number of distances does not match the number of k-points, or if the file cannot
/// be written.
pub fn write_spectral_function_table<P: AsRef<Path>>(
    path: P,
    spectral_function: &SpectralFunction,
    kdistances: Option<&[f64]>,
) -> Result<(), anyhow::Error> {
    let (nspins, nenergies, nkpts) = spectral_function.intensities.dim();
    ensure!(
        spectral_function.energies.len() == nenergies,
        "The energy grid has {} points, but the spectral function has {nenergies}.",
        spectral_function.energies.len()
    );
    let xs = match kdistances {
        Some(kdistances) => {
            ensure!(
                kdistances.len() == nkpts,
                "{} k-point distances were given for {nkpts} k-points.",
                kdistances.len()
            );
            kdistances.to_vec()
        }
        None => (0..nkpts).map(|ikpt| ikpt as f64).collect(),
    };

    let mut writer = BufWriter::new(File::create(path)?);
    for ispin in 0..nspins {
        writeln!(writer, "# Spin channel {}", ispin + 1)?;
        writeln!(writer, "# {:>14} {:>14} {:>16}", "x", "energy", "intensity")?;
        for (ikpt, x) in xs.iter().enumerate() {
            for (ienergy, energy) in spectral_function.energies.iter().enumerate() {
                writeln!(
                    writer,
                    "  {x:>14.8} {energy:>14.8} {:>16.8e}",
                    spectral_function.intensities[(ispin, ienergy, ikpt)]
                )?;
            }
            writeln!(writer)?;
        }
    }
    writer.flush()?;
    Ok(())
}
