//! k-point paths and plain-text k-point lists in the VASP `KPOINTS` format.

use std::fs;
use std::path::Path;

use anyhow::{self, bail, ensure, format_err, Context};
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use num_traits::ToPrimitive;

use crate::lattice::reciprocal_lattice;

#[cfg(test)]
#[path = "kpath_tests.rs"]
mod kpath_tests;

const KPOINTS_HEADER: &str = "kpoints generated by qunfold";

/// Interpolates linearly between consecutive vertices of a k-point path.
///
/// Every segment contributes `n_segments` points, starting at its first vertex and excluding its
/// last, and the final vertex of the path is appended at the end. A path with $`m`$ vertices
/// therefore yields $`(m - 1) n + 1`$ k-points.
///
/// # Errors
///
/// Errors if fewer than two vertices are given or if `n_segments` is zero.
pub fn make_kpath(
    vertices: &[Vector3<f64>],
    n_segments: usize,
) -> Result<Vec<Vector3<f64>>, anyhow::Error> {
    ensure!(
        vertices.len() >= 2,
        "A k-point path requires at least two vertices, but {} were given.",
        vertices.len()
    );
    ensure!(n_segments > 0, "The number of points per path segment must be positive.");
    let nseg_f64 = n_segments
        .to_f64()
        .ok_or_else(|| format_err!("Unable to convert `{n_segments}` to `f64`."))?;
    let mut kpath = Vec::with_capacity((vertices.len() - 1) * n_segments + 1);
    for (start, end) in vertices.iter().tuple_windows() {
        let step = (end - start) / nseg_f64;
        for i in 0..n_segments {
            let i_f64 = i
                .to_f64()
                .ok_or_else(|| format_err!("Unable to convert `{i}` to `f64`."))?;
            kpath.push(start + step * i_f64);
        }
    }
    if let Some(last) = vertices.last() {
        kpath.push(*last);
    }
    Ok(kpath)
}

/// Returns the cumulative path length along a list of k-points, starting from zero at the first
/// k-point.
///
/// The fractional k-points are converted into Cartesian coordinates using the reciprocal lattice
/// of `primitive_lattice` without the factor of $`2\pi`$, and the distances are in the inverse of
/// the unit of the lattice.
///
/// # Errors
///
/// Errors if the primitive lattice is singular.
pub fn kpath_distances(
    kpoints: &[Vector3<f64>],
    primitive_lattice: &Matrix3<f64>,
) -> Result<Vec<f64>, anyhow::Error> {
    let recip = reciprocal_lattice(primitive_lattice)?;
    let cartesian = kpoints.iter().map(|k| recip.transpose() * k).collect_vec();
    let distances = std::iter::once(0.0)
        .chain(
            cartesian
                .iter()
                .tuple_windows()
                .map(|(k1, k2)| (k2 - k1).norm())
                .scan(0.0, |acc, d| {
                    *acc += d;
                    Some(*acc)
                }),
        )
        .take(kpoints.len())
        .collect_vec();
    Ok(distances)
}

/// Formats a list of fractional k-points in the explicit reciprocal VASP `KPOINTS` format, each
/// with unit weight.
pub fn format_vasp_kpoints(kpoints: &[Vector3<f64>]) -> String {
    [
        KPOINTS_HEADER.to_string(),
        kpoints.len().to_string(),
        "Rec".to_string(),
    ]
    .into_iter()
    .chain(
        kpoints
            .iter()
            .map(|k| format!("  {:12.8} {:12.8} {:12.8} 1.0", k[0], k[1], k[2])),
    )
    .map(|line| line + "\n")
    .collect()
}

/// Writes a list of fractional k-points into a VASP `KPOINTS` file.
pub fn write_vasp_kpoints<P: AsRef<Path>>(
    path: P,
    kpoints: &[Vector3<f64>],
) -> Result<(), anyhow::Error> {
    fs::write(path.as_ref(), format_vasp_kpoints(kpoints)).with_context(|| {
        format!(
            "Unable to write k-points to `{}`",
            path.as_ref().display()
        )
    })
}

/// Parses the contents of a VASP `KPOINTS` file listing k-points explicitly in fractional
/// reciprocal coordinates. Weights, if present, are ignored.
///
/// # Errors
///
/// Errors if the contents are not an explicit reciprocal k-point list, or if fewer k-points than
/// declared are found.
pub fn parse_vasp_kpoints(contents: &str) -> Result<Vec<Vector3<f64>>, anyhow::Error> {
    let mut lines = contents.lines();
    lines
        .next()
        .ok_or_else(|| format_err!("The k-point list is empty."))?;
    let nkpts = lines
        .next()
        .ok_or_else(|| format_err!("The number of k-points is missing."))?
        .trim()
        .parse::<usize>()
        .with_context(|| "Unable to parse the number of k-points")?;
    ensure!(
        nkpts > 0,
        "Only explicit k-point lists are supported, but an automatic or line-mode list was found."
    );
    let mode = lines
        .next()
        .ok_or_else(|| format_err!("The coordinate mode line is missing."))?
        .trim();
    if !mode.to_lowercase().starts_with('r') {
        bail!("Only fractional reciprocal k-points are supported, but mode `{mode}` was found.");
    }
    let kpoints = lines
        .filter(|line| !line.trim().is_empty())
        .take(nkpts)
        .map(|line| {
            let coords = line
                .split_whitespace()
                .take(3)
                .map(|x| x.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Unable to parse k-point line `{line}`"))?;
            ensure!(coords.len() == 3, "Too few coordinates in k-point line `{line}`.");
            Ok(Vector3::new(coords[0], coords[1], coords[2]))
        })
        .collect::<Result<Vec<_>, anyhow::Error>>()?;
    ensure!(
        kpoints.len() == nkpts,
        "{nkpts} k-points declared, but only {} found.",
        kpoints.len()
    );
    Ok(kpoints)
}

/// Reads fractional k-points from a VASP `KPOINTS` file.
pub fn read_vasp_kpoints<P: AsRef<Path>>(path: P) -> Result<Vec<Vector3<f64>>, anyhow::Error> {
    let contents = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Unable to read k-points from `{}`", path.as_ref().display()))?;
    parse_vasp_kpoints(&contents)
}
