//! Time stepping for the explicit Lagrangian solver
//!
//! This module provides the explicit ODE integrators, the halve/grow step
//! controller and the adaptive driver that rolls back rejected steps.

pub mod ode;
pub mod adaptive;
pub mod driver;

// Re-export commonly used items
pub use ode::{OdeScheme, TimeIntegrator};
pub use adaptive::{StepController, StepDecision, DT_FLOOR};
pub use driver::{
    AdaptiveDriver, Checkpoint, CheckpointEntry, DriverSettings, MemoryCheckpoint, NoCheckpoint, RunSummary,
    StepOutcome, StepRecord,
};
