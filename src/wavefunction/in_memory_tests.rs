use approx::assert_abs_diff_eq;
use nalgebra::Vector3;
use ndarray::{array, Array2, Array3};
use num_complex::Complex64;

use crate::io::{read_qunfold_binary, write_qunfold_binary, QunfoldFileType};
use crate::wavefunction::in_memory::InMemoryWavefunction;
use crate::wavefunction::{CoefficientStorage, WavefunctionReader};

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

fn two_band_wavefunction() -> InMemoryWavefunction {
    InMemoryWavefunction::builder()
        .kvectors(&[Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.25, 0.0, 0.0)])
        .fft_grid([4, 4, 4])
        .gvectors(vec![
            vec![Vector3::new(0, 0, 0), Vector3::new(1, 0, 0)],
            vec![Vector3::new(0, 0, 0), Vector3::new(-1, 0, 0)],
        ])
        .energies(array![[[-1.0, 2.0], [-0.5, 2.5]]])
        .coefficients(vec![vec![
            array![[c(3.0, 0.0), c(0.0, 4.0)], [c(1.0, 0.0), c(0.0, 0.0)]],
            array![[c(0.0, 2.0), c(0.0, 0.0)], [c(0.0, 0.0), c(1.0, 1.0)]],
        ]])
        .build()
        .unwrap()
}

#[test]
fn test_in_memory_wavefunction_reader() {
    let wfn = two_band_wavefunction();
    assert_eq!(wfn.n_spins(), 1);
    assert_eq!(wfn.n_kpoints(), 2);
    assert_eq!(wfn.n_bands(), 2);
    assert_eq!(wfn.fft_grid(), [4, 4, 4]);
    assert_eq!(wfn.storage(), CoefficientStorage::Standard);
    assert_eq!(wfn.kvectors()[1], Vector3::new(0.25, 0.0, 0.0));
    assert_eq!(wfn.gvectors(1).unwrap()[1], Vector3::new(-1, 0, 0));
    assert!(wfn.gvectors(2).is_err());

    assert_eq!(wfn.band_energy(0, 1, 1).unwrap(), 2.5);
    assert!(wfn.band_energy(1, 0, 0).is_err());
    assert!(wfn.band_energy(0, 0, 2).is_err());

    let coeffs = wfn.band_coefficients(0, 0, 0).unwrap();
    assert_abs_diff_eq!(coeffs[0].re, 0.6, epsilon = 1e-14);
    assert_abs_diff_eq!(coeffs[1].im, 0.8, epsilon = 1e-14);
    let coeffs = wfn.band_coefficients(0, 1, 1).unwrap();
    assert_abs_diff_eq!(
        coeffs.iter().map(|x| x.norm_sqr()).sum::<f64>(),
        1.0,
        epsilon = 1e-14
    );
}

#[test]
fn test_in_memory_wavefunction_validation() {
    // Coefficient length does not match the number of G-vectors.
    assert!(InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 4, 4])
        .gvectors(vec![vec![Vector3::new(0, 0, 0)]])
        .energies(Array3::zeros((1, 1, 1)))
        .coefficients(vec![vec![Array2::zeros((1, 2))]])
        .build()
        .is_err());

    // Spinor coefficients must span both components.
    assert!(InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 4, 4])
        .storage(CoefficientStorage::SpinOrbit)
        .gvectors(vec![vec![Vector3::new(0, 0, 0)]])
        .energies(Array3::zeros((1, 1, 1)))
        .coefficients(vec![vec![Array2::zeros((1, 1))]])
        .build()
        .is_err());
    assert!(InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 4, 4])
        .storage(CoefficientStorage::SpinOrbit)
        .gvectors(vec![vec![Vector3::new(0, 0, 0)]])
        .energies(Array3::zeros((1, 1, 1)))
        .coefficients(vec![vec![Array2::zeros((1, 2))]])
        .build()
        .is_ok());

    // Half-sphere storage must start at G = 0.
    assert!(InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 4, 4])
        .storage(CoefficientStorage::GammaHalf)
        .gvectors(vec![vec![Vector3::new(1, 0, 0)]])
        .energies(Array3::zeros((1, 1, 1)))
        .coefficients(vec![vec![Array2::zeros((1, 1))]])
        .build()
        .is_err());

    // Zero-sized FFT grid.
    assert!(InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 0, 4])
        .gvectors(vec![vec![Vector3::new(0, 0, 0)]])
        .energies(Array3::zeros((1, 1, 1)))
        .coefficients(vec![vec![Array2::zeros((1, 1))]])
        .build()
        .is_err());
}

#[test]
fn test_in_memory_wavefunction_vanishing_band() {
    let wfn = InMemoryWavefunction::builder()
        .kvectors(&[Vector3::zeros()])
        .fft_grid([4, 4, 4])
        .gvectors(vec![vec![Vector3::new(0, 0, 0)]])
        .energies(Array3::zeros((1, 1, 1)))
        .coefficients(vec![vec![Array2::zeros((1, 1))]])
        .build()
        .unwrap();
    assert!(wfn.band_coefficients(0, 0, 0).is_err());
}

#[test]
fn test_in_memory_wavefunction_binary_round_trip() {
    let wfn = two_band_wavefunction();
    let name = std::env::temp_dir().join(format!("qunfold_wfn_{}", std::process::id()));
    write_qunfold_binary(&name, QunfoldFileType::Wfn, &wfn).unwrap();
    let wfn_read: InMemoryWavefunction =
        read_qunfold_binary(&name, QunfoldFileType::Wfn).unwrap();
    let mut path = name.clone();
    path.set_extension(QunfoldFileType::Wfn.ext());
    std::fs::remove_file(path).unwrap();
    assert_eq!(wfn_read.n_kpoints(), 2);
    assert_eq!(wfn_read.band_energy(0, 0, 1).unwrap(), 2.0);
    assert_eq!(
        wfn_read.band_coefficients(0, 1, 0).unwrap(),
        wfn.band_coefficients(0, 1, 0).unwrap()
    );
}

#[test]
fn test_in_memory_wavefunction_binary_rejects_inconsistent_data() {
    let name = std::env::temp_dir().join(format!("qunfold_wfn_bad_{}", std::process::id()));
    let path = name.with_extension(QunfoldFileType::Wfn.ext());

    // Coefficients missing for every spin channel.
    let mut wfn = two_band_wavefunction();
    wfn.coefficients = vec![];
    write_qunfold_binary(&name, QunfoldFileType::Wfn, &wfn).unwrap();
    let err = read_qunfold_binary::<InMemoryWavefunction, _>(&name, QunfoldFileType::Wfn)
        .unwrap_err();
    assert!(format!("{err:#}").contains("Inconsistent wavefunction data"));

    // Zero-sized FFT grid.
    let mut wfn = two_band_wavefunction();
    wfn.fft_grid = [0, 4, 4];
    write_qunfold_binary(&name, QunfoldFileType::Wfn, &wfn).unwrap();
    assert!(read_qunfold_binary::<InMemoryWavefunction, _>(&name, QunfoldFileType::Wfn).is_err());

    std::fs::remove_file(path).unwrap();
}
