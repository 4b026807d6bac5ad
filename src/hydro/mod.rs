//! Explicit Lagrangian hydrodynamics: state vector, material-point cache,
//! quadrature kernel, force operator and the rate evaluator tying them together

pub mod state;
pub mod qdata;
pub mod kernel;
pub mod force;
pub mod operator;

pub use state::{GlobalState, StateLayout};
pub use qdata::QuadratureData;
pub use kernel::{local_stable_dt, smooth_step_01, KernelReport, KernelSettings, QuadratureKernel};
pub use force::ForceOperator;
pub use operator::{LagrangianOperator, OperatorSettings};
