pub mod solver;
pub mod iterative;
pub mod preconditioner;

pub use solver::{LinearOperator, SolverStats, SolverUtils};
pub use iterative::ConjugateGradient;
pub use preconditioner::{Preconditioner, JacobiPreconditioner, IdentityPreconditioner};
