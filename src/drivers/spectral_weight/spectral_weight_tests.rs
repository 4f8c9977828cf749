use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use itertools::iproduct;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3};
use num_complex::Complex64;

use crate::auxiliary::kpoint_comparator::KPointComparator;
use crate::drivers::spectral_weight::{SpectralWeightDriver, SpectralWeightParams, SpectralWeights};
use crate::drivers::UnfoldDriver;
use crate::io::{read_qunfold_binary, QunfoldFileType};
use crate::kpoints::UnfoldKSet;
use crate::lattice::TransformationMatrix;
use crate::symmetry::symmetry_operation::KSymmetryOperation;
use crate::wavefunction::in_memory::InMemoryWavefunction;

/// Γ-only 2 × 2 × 1 supercell with three plane-wave bands at G = (1, 0, 0), (0, -1, 0) and 0.
fn square_fixture() -> InMemoryWavefunction {
    let gs = iproduct!(-1i64..=1, -1i64..=1, -1i64..=1)
        .map(|(i, j, k)| Vector3::new(i, j, k))
        .collect::<Vec<_>>();
    let occupied = [
        Vector3::new(1, 0, 0),
        Vector3::new(0, -1, 0),
        Vector3::new(0, 0, 0),
    ];
    let coefficients = Array2::from_shape_fn((3, gs.len()), |(iband, ig)| {
        if gs[ig] == occupied[iband] {
            Complex64::new(1.0, 0.0)
        } else {
            Complex64::new(0.0, 0.0)
        }
    });
    InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 4, 4])
        .gvectors(vec![gs])
        .energies(Array3::from_shape_vec((1, 1, 3), vec![-1.0, 0.5, 2.0]).unwrap())
        .coefficients(vec![vec![coefficients]])
        .build()
        .unwrap()
}

fn swap_xy() -> KSymmetryOperation {
    KSymmetryOperation::new(Matrix3::new(0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0))
}

fn square_params() -> SpectralWeightParams {
    SpectralWeightParams::builder()
        .transformation_matrix(TransformationMatrix::diagonal(2.0, 2.0, 1.0).unwrap())
        .build()
        .unwrap()
}

#[test]
fn test_drivers_spectral_weight_kpoint_list() {
    let wfn = square_fixture();
    let params = square_params();
    let kpoints = vec![Vector3::new(0.5, 0.0, 0.0), Vector3::zeros()];
    let mut driver = SpectralWeightDriver::builder()
        .parameters(&params)
        .wavefunction(&wfn)
        .kpoints(Some(kpoints.as_slice()))
        .build()
        .unwrap();
    assert!(driver.result().is_err());
    driver.run().unwrap();

    let sw = &driver.result().unwrap().spectral_weights;
    assert_eq!(sw.weights.dim(), (1, 2, 3, 2));
    assert_eq!(sw.n_spins(), 1);
    assert_eq!(sw.n_kpoints(), 2);
    assert_eq!(sw.kpoints, kpoints);

    let expected = [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
    for ikpt in 0..2 {
        for iband in 0..3 {
            assert_abs_diff_eq!(
                sw.weights[(0, ikpt, iband, 1)],
                expected[ikpt][iband],
                epsilon = 1e-12
            );
        }
        assert_eq!(sw.weights[(0, ikpt, 0, 0)], -1.0);
        assert_eq!(sw.weights[(0, ikpt, 2, 0)], 2.0);
    }
    assert!(sw.weights.iter().all(|x| x.is_finite()));
}

#[test]
fn test_drivers_spectral_weight_kset_orbits() {
    let wfn = square_fixture();
    let params = square_params();
    let mut kset = UnfoldKSet::new(
        params.transformation_matrix.clone(),
        vec![Vector3::new(0.5, 0.0, 0.0), Vector3::zeros()],
        Matrix3::identity(),
        vec![KSymmetryOperation::identity(), swap_xy()],
        vec![KSymmetryOperation::identity()],
        KPointComparator::default(),
    )
    .unwrap();
    kset.generate_sc_kpoints();
    assert_eq!(kset.orbits()[0].len(), 2);
    assert_eq!(kset.orbits()[1].len(), 1);

    let mut driver = SpectralWeightDriver::builder()
        .parameters(&params)
        .wavefunction(&wfn)
        .kset(Some(&kset))
        .build()
        .unwrap();
    driver.run().unwrap();
    let sw = &driver.result().unwrap().spectral_weights;

    // Two orbit members with three bands each.
    assert_eq!(sw.weights.dim(), (1, 2, 6, 2));

    // X and Y each carry half of the orbit weight.
    let weights_x = sw.weights.slice(ndarray::s![0, 0, .., 1]).to_vec();
    for (w, e) in weights_x.iter().zip([0.5, 0.0, 0.0, 0.0, 0.5, 0.0]) {
        assert_abs_diff_eq!(*w, e, epsilon = 1e-12);
    }
    let energies_x = sw.weights.slice(ndarray::s![0, 0, .., 0]).to_vec();
    assert_eq!(energies_x, vec![-1.0, 0.5, 2.0, -1.0, 0.5, 2.0]);

    // Γ has a single member, padded with zero-weight copies of its bands.
    let weights_g = sw.weights.slice(ndarray::s![0, 1, .., 1]).to_vec();
    for (w, e) in weights_g.iter().zip([0.0, 0.0, 1.0, 0.0, 0.0, 0.0]) {
        assert_abs_diff_eq!(*w, e, epsilon = 1e-12);
    }
    let energies_g = sw.weights.slice(ndarray::s![0, 1, .., 0]).to_vec();
    assert_eq!(energies_g, vec![-1.0, 0.5, 2.0, -1.0, 0.5, 2.0]);

    let totals = sw.total_weights();
    assert_abs_diff_eq!(totals[(0, 0)], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(totals[(0, 1)], 1.0, epsilon = 1e-12);
}

#[test]
fn test_drivers_spectral_weight_missing_kpoint() {
    let wfn = square_fixture();
    let params = square_params();
    // (0.25, 0, 0) folds onto (-0.5, 0, 0), which is not in the wavefunction data.
    let kpoints = vec![Vector3::new(0.25, 0.0, 0.0)];
    let mut driver = SpectralWeightDriver::builder()
        .parameters(&params)
        .wavefunction(&wfn)
        .kpoints(Some(kpoints.as_slice()))
        .build()
        .unwrap();
    let err = driver.run().unwrap_err();
    assert!(format!("{err:#}").contains("Cannot find the supercell K-point"));
    assert!(driver.result().is_err());
}

#[test]
fn test_drivers_spectral_weight_invalid_sources() {
    let wfn = square_fixture();
    let params = square_params();
    let kpoints = vec![Vector3::zeros()];
    let kset = UnfoldKSet::new(
        TransformationMatrix::diagonal(3.0, 1.0, 1.0).unwrap(),
        kpoints.clone(),
        Matrix3::identity(),
        vec![],
        vec![],
        KPointComparator::default(),
    )
    .unwrap();

    assert!(SpectralWeightDriver::builder()
        .parameters(&params)
        .wavefunction(&wfn)
        .build()
        .is_err());
    assert!(SpectralWeightDriver::builder()
        .parameters(&params)
        .wavefunction(&wfn)
        .kpoints(Some(kpoints.as_slice()))
        .kset(Some(&kset))
        .build()
        .is_err());
    // The k-point set was built for a different supercell.
    assert!(SpectralWeightDriver::builder()
        .parameters(&params)
        .wavefunction(&wfn)
        .kset(Some(&kset))
        .build()
        .is_err());
    assert!(SpectralWeightDriver::builder()
        .parameters(&params)
        .wavefunction(&wfn)
        .kpoints(Some(&[][..]))
        .build()
        .is_err());

    let mut bad_params = square_params();
    bad_params.gvector_threshold = -1.0;
    assert!(SpectralWeightDriver::builder()
        .parameters(&bad_params)
        .wavefunction(&wfn)
        .kpoints(Some(kpoints.as_slice()))
        .build()
        .is_err());
}

#[test]
fn test_drivers_spectral_weight_save() {
    let wfn = square_fixture();
    let save_name: PathBuf = std::env::temp_dir().join(format!(
        "qunfold_spectral_weight_{}",
        std::process::id()
    ));
    let params = SpectralWeightParams::builder()
        .transformation_matrix(TransformationMatrix::diagonal(2.0, 2.0, 1.0).unwrap())
        .result_save_name(Some(save_name.clone()))
        .build()
        .unwrap();
    let kpoints = vec![Vector3::new(0.0, -0.5, 0.0)];
    let mut driver = SpectralWeightDriver::builder()
        .parameters(&params)
        .wavefunction(&wfn)
        .kpoints(Some(kpoints.as_slice()))
        .build()
        .unwrap();
    driver.run().unwrap();

    let restored: SpectralWeights = read_qunfold_binary(&save_name, QunfoldFileType::Sw).unwrap();
    assert_eq!(restored.weights, driver.result().unwrap().spectral_weights.weights);
    assert_abs_diff_eq!(restored.weights[(0, 0, 1, 1)], 1.0, epsilon = 1e-12);
    std::fs::remove_file(save_name.with_extension(QunfoldFileType::Sw.ext())).unwrap();
}
