pub mod basis;
pub mod quadrature;
pub mod dof;
pub mod assembly;

pub use basis::{LagrangeBasis, ReferenceElement};
pub use quadrature::{GaussQuadrature, KernelDispatch, QuadratureOrder};
pub use dof::DofManager;
pub use assembly::{Assembler, ElementMassArena};
