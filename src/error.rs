//! Error types for the Lagrangian solver.
//!
//! Every fallible operation returns `SimResult<T>`.

use thiserror::Error;

/// Unified error type for setup, rate evaluation and time stepping.
#[derive(Debug, Error)]
pub enum SimError {
    /// Mesh data is malformed or inconsistent (e.g. an element is inverted at setup).
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Material table does not match the mesh or holds out-of-range values.
    #[error("Invalid material parameter: {0}")]
    InvalidMaterial(String),

    /// Configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Enumerated option with a code this build does not know.
    #[error("Unknown {option}: {value}")]
    UnknownOption { option: &'static str, value: String },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Repeated step halving pushed dt under the absolute floor.
    #[error("The time step crashed at step {step} (t = {time:.6e}, dt = {dt:.3e})")]
    StepCollapse { step: usize, time: f64, dt: f64 },

    /// A solver invariant was violated (e.g. state layout mismatch).
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl SimError {
    pub fn unknown(option: &'static str, value: impl ToString) -> Self {
        SimError::UnknownOption {
            option,
            value: value.to_string(),
        }
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
