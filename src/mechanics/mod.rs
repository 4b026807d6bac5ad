/// Constitutive side of the solver
///
/// This module provides implementations for:
/// - Material zone parameters and the gamma-law equation of state
/// - Velocity-gradient decomposition and packed symmetric tensors
/// - Gravity body force
/// - Mohr-Coulomb return mapping behind the `PlasticityModel` trait

pub mod material;
pub mod strain;
pub mod body_force;
pub mod plasticity;

pub use material::{EosState, GammaLawEos, MaterialTable, MaterialZoneParameters, INVISCID_PLASTIC_VISCOSITY};
pub use strain::StrainDisplacement;
pub use body_force::BodyForce;
pub use plasticity::{apply_return_mapping, IdentityPlasticity, MohrCoulomb, PlasticCorrection, PlasticityModel};
