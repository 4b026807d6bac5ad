/// Body force contributions to the momentum right-hand side
///
/// Gravity acts along the negative last coordinate axis (y in 2-D, z in 3-D).
use sprs::CsMat;

use crate::linalg::LinearOperator;

/// Body force vector computations
pub struct BodyForce;

impl BodyForce {
    /// Consistent gravity load of the vertical component block
    ///
    /// f = Mv · (-g·1), i.e. f_i = -g Σ_e Σ_q ρ0 detJ0 w φ_i. Since the mass
    /// matrix is fixed between remeshes, the load is computed once and added
    /// to the vertical right-hand side of every velocity solve.
    ///
    /// # Arguments
    /// * `velocity_mass` - Scalar velocity mass matrix (n × n)
    /// * `gravity` - Gravitational acceleration magnitude (m/s²)
    pub fn gravity_load(velocity_mass: &CsMat<f64>, gravity: f64) -> Vec<f64> {
        let n = LinearOperator::cols(velocity_mass);
        LinearOperator::apply(velocity_mass, &vec![-gravity; n])
    }

    /// Component that gravity acts on
    #[inline]
    pub fn vertical_component(dim: usize) -> usize {
        dim - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    #[test]
    fn test_gravity_load_total_equals_weight() {
        let mut t = TriMat::new((2, 2));
        t.add_triplet(0, 0, 2.0);
        t.add_triplet(0, 1, 1.0);
        t.add_triplet(1, 0, 1.0);
        t.add_triplet(1, 1, 2.0);
        let m = t.to_csr();

        let f = BodyForce::gravity_load(&m, 10.0);
        // Total mass 6 kg
        assert_relative_eq!(f.iter().sum::<f64>(), -60.0);
        assert_relative_eq!(f[0], -30.0);
    }

    #[test]
    fn test_vertical_component() {
        assert_eq!(BodyForce::vertical_component(2), 1);
        assert_eq!(BodyForce::vertical_component(3), 2);
    }
}
