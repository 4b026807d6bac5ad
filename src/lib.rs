pub mod error;
pub mod mesh;
pub mod mesh_generator;
pub mod fem;
pub mod linalg;
pub mod mechanics;
pub mod hydro;
pub mod config;
pub mod ic;     // Initial conditions
pub mod bc;     // Boundary conditions
pub mod remesh;
pub mod setup;
pub mod utils;
pub mod timestepping;

pub use error::{SimError, SimResult};
pub use mesh::{Mesh, PlasticityState, MeshQuality, assess_mesh_quality, smooth_laplacian, build_node_neighbors};
pub use mesh_generator::MeshGenerator;
pub use fem::{GaussQuadrature, KernelDispatch, QuadratureOrder, LagrangeBasis, ReferenceElement, DofManager, Assembler, ElementMassArena};
pub use linalg::{ConjugateGradient, LinearOperator, SolverStats};
pub use mechanics::{MaterialTable, MaterialZoneParameters, GammaLawEos, StrainDisplacement, BodyForce, PlasticityModel, IdentityPlasticity, MohrCoulomb, apply_return_mapping};
pub use hydro::{GlobalState, StateLayout, QuadratureData, QuadratureKernel, KernelSettings, ForceOperator, LagrangianOperator, OperatorSettings};
pub use config::SimulationConfig;
pub use remesh::{Remesher, RemeshedFields, NoRemesh, SmoothingRemesher};
pub use setup::build_simulation;
pub use timestepping::{OdeScheme, TimeIntegrator, StepController, StepDecision, AdaptiveDriver, DriverSettings, StepOutcome, StepRecord, RunSummary, Checkpoint, NoCheckpoint, MemoryCheckpoint};
pub use utils::units;
