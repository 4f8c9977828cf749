//! # qunfold: Effective band structures from supercell calculations
//!
//! qunfold recovers the effective band structure of a primitive crystal cell from a plane-wave
//! electronic-structure calculation performed on a supercell, which is the standard route to
//! band structures of disordered, defected, or doped crystals. Its capabilities include:
//! - symmetry-aware expansion of the primitive k-points to be unfolded, accounting for the
//!   symmetry lost in the supercell,
//! - reduction of the expanded k-points onto the minimal set of supercell K-points that must be
//!   computed,
//! - projection of supercell Bloch states onto primitive Bloch states to obtain spectral weights,
//!   with support for spin-polarised, spin-orbit, and Γ-only (half-sphere) coefficient storage,
//!   and
//! - broadening of the spectral weights into a spectral function with Lorentzian or Gaussian
//!   kernels.
//!
//! ## Examples and usage
//!
//! For most items (structs, enums, functions, and traits), their usages are illustrated in test
//! functions. The `qunfold` binary reads a YAML input file, whose structure is described by
//! [`interfaces::input::Input`].
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod auxiliary;
pub mod drivers;
pub mod interfaces;
pub mod io;
pub mod kpoints;
pub mod lattice;
pub mod projection;
pub mod spectral;
pub mod symmetry;
pub mod wavefunction;
