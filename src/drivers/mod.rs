//! Drivers to carry out qunfold functionalities.

use anyhow;

pub mod kpoint_generation;
pub mod spectral_function;
pub mod spectral_weight;

// =================
// Trait definitions
// =================

/// Trait defining behaviours of `qunfold` drivers.
pub trait UnfoldDriver {
    /// The type of the parameter structure controlling the driver.
    type Params;

    /// The type of the successful outcome when executing the driver.
    type Outcome;

    /// Executes the driver and stores the result internally.
    fn run(&mut self) -> Result<(), anyhow::Error>;

    /// Returns the result of the driver execution.
    fn result(&self) -> Result<&Self::Outcome, anyhow::Error>;
}
