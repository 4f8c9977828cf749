use std::sync::Arc;

use approx::assert_abs_diff_eq;
use itertools::iproduct;
use nalgebra::Vector3;
use ndarray::{Array2, Array3};
use num_complex::Complex64;

use crate::auxiliary::kpoint_comparator::KPointComparator;
use crate::lattice::TransformationMatrix;
use crate::projection::Projector;
use crate::wavefunction::in_memory::InMemoryWavefunction;
use crate::wavefunction::CoefficientStorage;

fn cube_gvectors(n: i64) -> Vec<Vector3<i64>> {
    iproduct!(-n..=n, -n..=n, -n..=n)
        .map(|(i, j, k)| Vector3::new(i, j, k))
        .collect()
}

/// Builds a coefficient row over `gs` from a sparse list of (G, coefficient) pairs.
fn sparse_row(gs: &[Vector3<i64>], entries: &[(Vector3<i64>, Complex64)]) -> Vec<Complex64> {
    gs.iter()
        .map(|g| {
            entries
                .iter()
                .filter(|(g_, _)| g_ == g)
                .map(|(_, c)| *c)
                .sum()
        })
        .collect()
}

fn rows_to_array(rows: &[Vec<Complex64>]) -> Array2<Complex64> {
    Array2::from_shape_fn((rows.len(), rows[0].len()), |(i, j)| rows[i][j])
}

fn one() -> Complex64 {
    Complex64::new(1.0, 0.0)
}

/// Γ-only supercell doubled along a, with three bands: a plane wave at G = (1, 0, 0), a plane wave
/// at G = 0, and an equal mixture of G = (2, 0, 0) and G = (0, 1, 0).
fn gamma_fixture() -> InMemoryWavefunction {
    let gs = cube_gvectors(2);
    let r2 = 2.0f64.sqrt();
    let rows = vec![
        sparse_row(&gs, &[(Vector3::new(1, 0, 0), one())]),
        sparse_row(&gs, &[(Vector3::new(0, 0, 0), one())]),
        sparse_row(
            &gs,
            &[
                (Vector3::new(2, 0, 0), one() / r2),
                (Vector3::new(0, 1, 0), one() / r2),
            ],
        ),
    ];
    InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([8, 8, 8])
        .gvectors(vec![gs])
        .energies(Array3::from_shape_vec((1, 1, 3), vec![-1.0, 0.0, 1.0]).unwrap())
        .coefficients(vec![vec![rows_to_array(&rows)]])
        .build()
        .unwrap()
}

#[test]
fn test_projection_gamma_fixture() {
    let wfn = gamma_fixture();
    let tmat = TransformationMatrix::diagonal(2.0, 1.0, 1.0).unwrap();
    let projector = Projector::new(&wfn, &tmat, KPointComparator::default(), 1e-5).unwrap();

    let gvecs = projector.overlap_gvectors(0).unwrap();
    assert_eq!(gvecs.all.len(), 125);
    assert_eq!(gvecs.overlap.len(), 75);
    assert!(gvecs.overlap.iter().all(|g| g[0] % 2 == 0));
    assert!(Arc::ptr_eq(&gvecs, &projector.overlap_gvectors(0).unwrap()));

    let ew = projector
        .spectral_weight_k(&Vector3::new(0.5, 0.0, 0.0), 0)
        .unwrap();
    assert_eq!(ew.dim(), (3, 2));
    assert_eq!(ew.column(0).to_vec(), vec![-1.0, 0.0, 1.0]);
    assert_abs_diff_eq!(ew[(0, 1)], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ew[(1, 1)], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ew[(2, 1)], 0.0, epsilon = 1e-12);

    let ew = projector.spectral_weight_k(&Vector3::zeros(), 0).unwrap();
    assert_abs_diff_eq!(ew[(0, 1)], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ew[(1, 1)], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ew[(2, 1)], 1.0, epsilon = 1e-12);

    // -X folds onto Γ with G0 = (-1, 0, 0).
    let ew = projector
        .spectral_weight_k(&Vector3::new(-0.5, 0.0, 0.0), 0)
        .unwrap();
    assert_abs_diff_eq!(ew[(0, 1)], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ew[(1, 1)], 0.0, epsilon = 1e-12);

    assert!(ew.column(1).iter().all(|w| *w >= 0.0 && *w <= 1.0 + 1e-12));
}

#[test]
fn test_projection_missing_kpoint() {
    let wfn = gamma_fixture();
    let tmat = TransformationMatrix::diagonal(2.0, 1.0, 1.0).unwrap();
    let projector = Projector::new(&wfn, &tmat, KPointComparator::default(), 1e-5).unwrap();

    // (0.25, 0, 0) folds onto (-0.5, 0, 0), which has not been computed.
    let err = projector
        .spectral_weight_k(&Vector3::new(0.25, 0.0, 0.0), 0)
        .unwrap_err();
    assert!(format!("{err:#}").contains("Cannot find the supercell K-point"));
    assert!(projector.find_kpoint_index(&Vector3::new(0.1, 0.0, 0.0)).is_err());
    assert!(Projector::new(&wfn, &tmat, KPointComparator::default(), 0.0).is_err());
}

#[test]
fn test_projection_lattice_offset_of_stored_kpoint() {
    // The zone-boundary K-point is stored as (0.5, 0, 0) rather than (-0.5, 0, 0).
    let gs = cube_gvectors(1);
    let rows = vec![
        sparse_row(&gs, &[(Vector3::new(0, 0, 0), one())]),
        sparse_row(&gs, &[(Vector3::new(-1, 0, 0), one())]),
    ];
    let wfn = InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros(), Vector3::new(0.5, 0.0, 0.0)])
        .fft_grid([4, 4, 4])
        .gvectors(vec![gs.clone(), gs])
        .energies(Array3::zeros((1, 2, 2)))
        .coefficients(vec![vec![rows_to_array(&rows), rows_to_array(&rows)]])
        .build()
        .unwrap();
    let tmat = TransformationMatrix::diagonal(2.0, 1.0, 1.0).unwrap();
    let projector = Projector::new(&wfn, &tmat, KPointComparator::default(), 1e-5).unwrap();

    let (ikpt, offset) = projector
        .find_kpoint_index(&Vector3::new(-0.5, 0.0, 0.0))
        .unwrap();
    assert_eq!(ikpt, 1);
    assert_eq!(offset, Vector3::new(1, 0, 0));

    let ew = projector
        .spectral_weight_k(&Vector3::new(0.25, 0.0, 0.0), 0)
        .unwrap();
    assert_abs_diff_eq!(ew[(0, 1)], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ew[(1, 1)], 0.0, epsilon = 1e-12);

    let ew = projector
        .spectral_weight_k(&Vector3::new(-0.25, 0.0, 0.0), 0)
        .unwrap();
    assert_abs_diff_eq!(ew[(0, 1)], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ew[(1, 1)], 1.0, epsilon = 1e-12);

    let indices = projector
        .k_to_supercell_kpoint_indices(&[
            Vector3::zeros(),
            Vector3::new(0.25, 0.0, 0.0),
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(-0.25, 0.0, 0.0),
        ])
        .unwrap();
    assert_eq!(indices, vec![0, 1, 0, 1]);
}

#[test]
fn test_projection_gamma_half_storage() {
    let gs = vec![Vector3::new(0, 0, 0), Vector3::new(1, 0, 0)];
    let wfn = InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 4, 4])
        .storage(CoefficientStorage::GammaHalf)
        .gvectors(vec![gs])
        .energies(Array3::zeros((1, 1, 1)))
        .coefficients(vec![vec![rows_to_array(&[vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(2.0, 0.0),
        ]])]])
        .build()
        .unwrap();
    let tmat = TransformationMatrix::diagonal(2.0, 1.0, 1.0).unwrap();
    let projector = Projector::new(&wfn, &tmat, KPointComparator::default(), 1e-5).unwrap();

    let gvecs = projector.overlap_gvectors(0).unwrap();
    assert_eq!(gvecs.all.len(), 3);
    assert_eq!(gvecs.overlap, vec![Vector3::new(0, 0, 0)]);

    // The real plane wave cos(G·r) with G = (1, 0, 0) is shared equally between ±X.
    for kx in [0.5, -0.5] {
        let ew = projector
            .spectral_weight_k(&Vector3::new(kx, 0.0, 0.0), 0)
            .unwrap();
        assert_abs_diff_eq!(ew[(0, 1)], 0.5, epsilon = 1e-12);
    }
    let ew = projector.spectral_weight_k(&Vector3::zeros(), 0).unwrap();
    assert_abs_diff_eq!(ew[(0, 1)], 0.0, epsilon = 1e-12);
}

#[test]
fn test_projection_spin_orbit_storage() {
    let gs = vec![Vector3::new(0, 0, 0), Vector3::new(1, 0, 0)];
    let wfn = InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 4, 4])
        .storage(CoefficientStorage::SpinOrbit)
        .gvectors(vec![gs])
        .energies(Array3::zeros((1, 1, 2)))
        .coefficients(vec![vec![rows_to_array(&[
            vec![
                Complex64::new(0.0, 0.0),
                Complex64::new(1.0, 0.0),
                Complex64::new(0.0, 0.0),
                Complex64::new(0.0, 1.0),
            ],
            vec![
                Complex64::new(1.0, 0.0),
                Complex64::new(0.0, 0.0),
                Complex64::new(0.0, 0.0),
                Complex64::new(1.0, 0.0),
            ],
        ])]])
        .build()
        .unwrap();
    let tmat = TransformationMatrix::diagonal(2.0, 1.0, 1.0).unwrap();
    let projector = Projector::new(&wfn, &tmat, KPointComparator::default(), 1e-5).unwrap();

    let ew = projector
        .spectral_weight_k(&Vector3::new(0.5, 0.0, 0.0), 0)
        .unwrap();
    // Both spinor components sit at G = (1, 0, 0) in the first band.
    assert_abs_diff_eq!(ew[(0, 1)], 1.0, epsilon = 1e-12);
    // The second band is split between Γ (up) and X (down).
    assert_abs_diff_eq!(ew[(1, 1)], 0.5, epsilon = 1e-12);

    let ew = projector.spectral_weight_k(&Vector3::zeros(), 0).unwrap();
    assert_abs_diff_eq!(ew[(0, 1)], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ew[(1, 1)], 0.5, epsilon = 1e-12);
}

#[test]
fn test_projection_spin_polarised() {
    let gs = vec![Vector3::new(0, 0, 0), Vector3::new(1, 0, 0)];
    let up = rows_to_array(&[vec![one(), Complex64::new(0.0, 0.0)]]);
    let down = rows_to_array(&[vec![Complex64::new(0.0, 0.0), one()]]);
    let wfn = InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 4, 4])
        .gvectors(vec![gs])
        .energies(Array3::from_shape_vec((2, 1, 1), vec![-2.0, -1.5]).unwrap())
        .coefficients(vec![vec![up], vec![down]])
        .build()
        .unwrap();
    let tmat = TransformationMatrix::diagonal(2.0, 1.0, 1.0).unwrap();
    let projector = Projector::new(&wfn, &tmat, KPointComparator::default(), 1e-5).unwrap();

    let k = Vector3::new(0.5, 0.0, 0.0);
    let ew_up = projector.spectral_weight_k(&k, 0).unwrap();
    let ew_down = projector.spectral_weight_k(&k, 1).unwrap();
    assert_eq!(ew_up[(0, 0)], -2.0);
    assert_eq!(ew_down[(0, 0)], -1.5);
    assert_abs_diff_eq!(ew_up[(0, 1)], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ew_down[(0, 1)], 1.0, epsilon = 1e-12);
    assert!(projector.spectral_weight_k(&k, 2).is_err());
}

#[test]
fn test_projection_grid_index() {
    assert_eq!(
        super::grid_index(&Vector3::new(-1, 2, -5), [4, 3, 5]).unwrap(),
        (3, 2, 0)
    );
    assert!(super::grid_index(&Vector3::new(1, 0, 0), [0, 4, 4]).is_err());
}
