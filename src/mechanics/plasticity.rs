/// Plastic correction of the elastic stress predictor
///
/// The correction runs once per trial step, after the explicit integrator
/// has produced the elastic predictor, and operates on the per-cell stress
/// carried in the state (tension positive).
use nalgebra::{DMatrix, SymmetricEigen};

use super::material::{MaterialTable, MaterialZoneParameters};
use super::strain::{pack_symmetric, stress_components, unpack_symmetric};
use crate::mesh::{Mesh, PlasticityState};

/// Result of projecting one trial stress
#[derive(Debug, Clone)]
pub struct PlasticCorrection {
    /// Corrected stress (dim × dim, symmetric)
    pub stress: DMatrix<f64>,
    /// Accumulated plastic strain after the correction
    pub plastic_strain: f64,
}

impl PlasticCorrection {
    fn unchanged(stress: &DMatrix<f64>, plastic_strain: f64) -> Self {
        Self {
            stress: stress.clone(),
            plastic_strain,
        }
    }
}

/// Yield-surface projection used between accepted steps
pub trait PlasticityModel: Send + Sync {
    fn correct(
        &self,
        zone: &MaterialZoneParameters,
        trial: &DMatrix<f64>,
        plastic_strain: f64,
        dt: f64,
    ) -> PlasticCorrection;

    fn name(&self) -> &'static str;
}

/// Returns the predictor untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPlasticity;

impl PlasticityModel for IdentityPlasticity {
    fn correct(
        &self,
        _zone: &MaterialZoneParameters,
        trial: &DMatrix<f64>,
        plastic_strain: f64,
        _dt: f64,
    ) -> PlasticCorrection {
        PlasticCorrection::unchanged(trial, plastic_strain)
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Mohr-Coulomb yield criterion with a tension cutoff
///
/// **Yield functions** (principal stresses σ1 ≤ ... ≤ σ3, tension positive):
/// ```text
/// fs = σ1 - σ3 Nφ + 2c √Nφ        shear,   Nφ = (1 + sin φ)/(1 - sin φ)
/// ft = σ3 - σt                    tension, σt = min(T, c / tan φ)
/// ```
/// The stress is admissible when fs > 0 and ft < 0. Otherwise the principal
/// stresses are returned to the shear surface (non-associated, dilation ψ)
/// or to the tension cutoff, whichever corner region the predictor lies in.
/// The principal directions are kept.
///
/// Cohesion, friction and dilation soften linearly with accumulated plastic
/// strain (`MaterialZoneParameters::softened_properties`).
///
/// **Viscoplastic regularisation** (Duvaut-Lions): with relaxation time η,
/// ```text
/// σ = (σ_trial + (dt/η) σ_proj) / (1 + dt/η)
/// ```
///
/// # References
/// - Choi et al. (2013), "DynEarthSol3D"
/// - Duvaut & Lions (1972), "Les inéquations en mécanique et en physique"
#[derive(Debug, Clone, Copy, Default)]
pub struct MohrCoulomb {
    pub viscoplastic: bool,
}

impl MohrCoulomb {
    pub fn new(viscoplastic: bool) -> Self {
        Self { viscoplastic }
    }

    /// Project sorted principal stresses; returns the plastic strain increment
    ///
    /// `p` is ascending (most compressive first), length 2 or 3.
    pub fn project_principal(zone: &MaterialZoneParameters, p: &mut [f64], plastic_strain: f64) -> f64 {
        let n = p.len();
        let last = n - 1;
        let (cohesion, phi, psi) = zone.softened_properties(plastic_strain);

        let sphi = phi.sin();
        let spsi = psi.sin();
        let anphi = (1.0 + sphi) / (1.0 - sphi);
        let anpsi = (1.0 + spsi) / (1.0 - spsi);
        let amc = 2.0 * cohesion * anphi.sqrt();

        let ten_max = if phi == 0.0 {
            zone.tension_cutoff
        } else {
            zone.tension_cutoff.min(cohesion / phi.tan())
        };

        let fs = p[0] - p[last] * anphi + amc;
        let ft = p[last] - ten_max;
        if fs > 0.0 && ft < 0.0 {
            return 0.0;
        }

        let a1 = zone.lambda + 2.0 * zone.mu;
        let a2 = zone.lambda;

        // Bisector between the shear and tension corners
        let pa = (1.0 + anphi * anphi).sqrt() + anphi;
        let ps = ten_max * anphi - amc;
        let h = p[last] - ten_max + pa * (p[0] - ps);

        if h < 0.0 {
            let alam = fs / (a1 - a2 * anpsi + a1 * anphi * anpsi - a2 * anphi);
            p[0] -= alam * (a1 - a2 * anpsi);
            if n == 3 {
                p[1] -= alam * (a2 - a2 * anpsi);
            }
            p[last] -= alam * (a2 - a1 * anpsi);

            if n == 3 {
                alam.abs() * ((7.0 + 4.0 * anpsi + 7.0 * anpsi * anpsi) / 18.0).sqrt()
            } else {
                0.5 * (alam + alam * anpsi).abs()
            }
        } else {
            let alam = ft / a1;
            p[0] -= alam * a2;
            if n == 3 {
                p[1] -= alam * a2;
            }
            p[last] -= alam * a1;

            if n == 3 {
                alam.abs() * (7.0_f64 / 18.0).sqrt()
            } else {
                0.5 * alam.abs()
            }
        }
    }
}

impl PlasticityModel for MohrCoulomb {
    fn correct(
        &self,
        zone: &MaterialZoneParameters,
        trial: &DMatrix<f64>,
        plastic_strain: f64,
        dt: f64,
    ) -> PlasticCorrection {
        let dim = trial.nrows();
        let eigen = SymmetricEigen::new(trial.clone());

        let mut order: Vec<usize> = (0..dim).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        let mut p: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i]).collect();

        let depls = Self::project_principal(zone, &mut p, plastic_strain);
        if depls == 0.0 {
            return PlasticCorrection::unchanged(trial, plastic_strain);
        }

        let mut projected = DMatrix::zeros(dim, dim);
        for (k, &i) in order.iter().enumerate() {
            let v = eigen.eigenvectors.column(i);
            projected += v * v.transpose() * p[k];
        }

        if self.viscoplastic {
            let ratio = dt / zone.plastic_viscosity;
            let blend = ratio / (1.0 + ratio);
            PlasticCorrection {
                stress: (trial + &projected * ratio) / (1.0 + ratio),
                plastic_strain: plastic_strain + depls * blend,
            }
        } else {
            PlasticCorrection {
                stress: projected,
                plastic_strain: plastic_strain + depls,
            }
        }
    }

    fn name(&self) -> &'static str {
        if self.viscoplastic {
            "mohr-coulomb (viscoplastic)"
        } else {
            "mohr-coulomb"
        }
    }
}

/// Apply a plasticity model at every thermodynamic dof of the stress block
///
/// `stress` is the component-major stress block of the state
/// (`component * num_dofs + cell * dofs_per_cell + j`). Returns the number of
/// dofs that yielded.
pub fn apply_return_mapping(
    model: &dyn PlasticityModel,
    mesh: &Mesh,
    materials: &MaterialTable,
    stress: &mut [f64],
    plastic: &mut PlasticityState,
    dt: f64,
) -> usize {
    let dim = mesh.dim;
    let ns = stress_components(dim);
    let ndofs = stress.len() / ns;
    let per_cell = ndofs / mesh.num_cells().max(1);
    let mut packed = vec![0.0; ns];
    let mut yielded = 0;

    for (e, cell) in mesh.connectivity.cells.iter().enumerate() {
        let zone = materials.zone(cell.attribute);
        for dof in e * per_cell..(e + 1) * per_cell {
            for (k, value) in packed.iter_mut().enumerate() {
                *value = stress[k * ndofs + dof];
            }
            let trial = unpack_symmetric(dim, &packed);
            let pls = plastic.get(dof);

            let corrected = model.correct(zone, &trial, pls, dt);
            if corrected.plastic_strain > pls {
                yielded += 1;
            }
            plastic.set(dof, corrected.plastic_strain);

            pack_symmetric(&corrected.stress, &mut packed);
            for (k, &value) in packed.iter().enumerate() {
                stress[k * ndofs + dof] = value;
            }
        }
    }
    yielded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_generator::MeshGenerator;
    use approx::assert_relative_eq;

    fn zone() -> MaterialZoneParameters {
        let mut z = MaterialZoneParameters::elastic(2700.0, 3e10, 3e10);
        z.cohesion0 = 10e6;
        z.cohesion1 = 10e6;
        z.friction_angle0 = 30.0_f64.to_radians();
        z.friction_angle1 = 30.0_f64.to_radians();
        z.tension_cutoff = 5e6;
        z
    }

    fn shear_yield(zone: &MaterialZoneParameters, p: &[f64]) -> f64 {
        let s = zone.friction_angle0.sin();
        let anphi = (1.0 + s) / (1.0 - s);
        p[0] - p[p.len() - 1] * anphi + 2.0 * zone.cohesion0 * anphi.sqrt()
    }

    #[test]
    fn test_elastic_state_untouched() {
        let z = zone();
        let trial = DMatrix::from_row_slice(2, 2, &[-50e6, 1e6, 1e6, -45e6]);
        let out = MohrCoulomb::new(false).correct(&z, &trial, 0.0, 1.0);
        assert_eq!(out.stress, trial);
        assert_eq!(out.plastic_strain, 0.0);
    }

    #[test]
    fn test_shear_return_lands_on_surface() {
        let z = zone();
        // Strong uniaxial compression
        let mut p = vec![-300e6, -10e6, -5e6];
        assert!(shear_yield(&z, &p) < 0.0);

        let depls = MohrCoulomb::project_principal(&z, &mut p, 0.0);
        assert!(depls > 0.0);
        assert_relative_eq!(shear_yield(&z, &p), 0.0, epsilon = 1.0);
    }

    #[test]
    fn test_tension_cutoff() {
        let z = zone();
        let mut p = vec![0.0, 20e6];
        let depls = MohrCoulomb::project_principal(&z, &mut p, 0.0);
        assert!(depls > 0.0);
        assert_relative_eq!(p[1], 5e6, max_relative = 1e-12);
    }

    #[test]
    fn test_principal_directions_kept() {
        let z = zone();
        let trial = DMatrix::from_row_slice(2, 2, &[-200e6, 30e6, 30e6, -20e6]);
        let out = MohrCoulomb::new(false).correct(&z, &trial, 0.0, 1.0);
        assert!(out.plastic_strain > 0.0);

        // Corrected stress commutes with the trial stress
        let commutator = &out.stress * &trial - &trial * &out.stress;
        assert!(commutator.norm() < 1e-6 * trial.norm() * trial.norm());
        assert_relative_eq!(out.stress[(0, 1)], out.stress[(1, 0)], max_relative = 1e-12);
    }

    #[test]
    fn test_viscoplastic_blend() {
        let mut z = zone();
        z.plastic_viscosity = 2.0;
        let trial = DMatrix::from_row_slice(2, 2, &[-200e6, 0.0, 0.0, -20e6]);

        let rate_independent = MohrCoulomb::new(false).correct(&z, &trial, 0.0, 2.0);
        let regularised = MohrCoulomb::new(true).correct(&z, &trial, 0.0, 2.0);

        // dt/η = 1: halfway between predictor and projection
        let expected = (&trial + &rate_independent.stress) * 0.5;
        assert_relative_eq!((regularised.stress - expected).norm(), 0.0, epsilon = 1.0);
        assert_relative_eq!(regularised.plastic_strain, 0.5 * rate_independent.plastic_strain);
    }

    #[test]
    fn test_apply_identity_over_mesh() {
        let mesh = MeshGenerator::generate_rectangle(2, 1, 2.0, 1.0).unwrap();
        let materials = MaterialTable::uniform(zone()).unwrap();
        let mut stress = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let before = stress.clone();
        let mut plastic = PlasticityState::new(2);

        let yielded = apply_return_mapping(&IdentityPlasticity, &mesh, &materials, &mut stress, &mut plastic, 1.0);
        assert_eq!(yielded, 0);
        assert_eq!(stress, before);
    }

    #[test]
    fn test_apply_mohr_coulomb_over_mesh() {
        let mesh = MeshGenerator::generate_rectangle(2, 1, 2.0, 1.0).unwrap();
        let materials = MaterialTable::uniform(zone()).unwrap();
        // Cell 0 overstressed in compression, cell 1 elastic; layout [xx.., xy.., yy..]
        let mut stress = vec![-300e6, -40e6, 0.0, 0.0, -5e6, -40e6];
        let mut plastic = PlasticityState::new(2);

        let yielded =
            apply_return_mapping(&MohrCoulomb::new(false), &mesh, &materials, &mut stress, &mut plastic, 1.0);
        assert_eq!(yielded, 1);
        assert!(plastic.get(0) > 0.0);
        assert_eq!(plastic.get(1), 0.0);
        assert!(stress[0] > -300e6);
        assert_eq!(stress[1], -40e6);
    }

    #[test]
    fn test_apply_per_thermo_dof() {
        // One cell with two dofs; only the first is overstressed
        let mesh = MeshGenerator::generate_rectangle(1, 1, 1.0, 1.0).unwrap();
        let materials = MaterialTable::uniform(zone()).unwrap();
        let mut stress = vec![-300e6, -40e6, 0.0, 0.0, -5e6, -40e6];
        let mut plastic = PlasticityState::new(2);

        let yielded =
            apply_return_mapping(&MohrCoulomb::new(false), &mesh, &materials, &mut stress, &mut plastic, 1.0);
        assert_eq!(yielded, 1);
        assert!(plastic.get(0) > 0.0);
        assert_eq!(plastic.get(1), 0.0);
        assert_eq!(stress[5], -40e6);
    }
}
