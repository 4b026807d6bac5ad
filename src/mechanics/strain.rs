/// Kinematic tensor helpers: velocity-gradient decomposition and the packed
/// storage of symmetric stress tensors
///
/// Packed symmetric storage keeps the upper triangle row by row:
/// ```text
/// 2-D: [xx, xy, yy]
/// 3-D: [xx, xy, xz, yy, yz, zz]
/// ```
use nalgebra::{DMatrix, SMatrix, SVector};

/// Number of independent components of a symmetric dim × dim tensor
#[inline]
pub fn stress_components(dim: usize) -> usize {
    3 * (dim - 1)
}

/// Packed index of entry (r, c) of a symmetric tensor
#[inline]
pub fn sym_index(dim: usize, r: usize, c: usize) -> usize {
    let (r, c) = if r <= c { (r, c) } else { (c, r) };
    r * dim - r * r.saturating_sub(1) / 2 + (c - r)
}

/// Expand packed components into a full symmetric matrix
pub fn unpack_symmetric(dim: usize, packed: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(dim, dim, |r, c| packed[sym_index(dim, r, c)])
}

/// Store the upper triangle of `m` into `packed`
pub fn pack_symmetric(m: &DMatrix<f64>, packed: &mut [f64]) {
    let dim = m.nrows();
    for r in 0..dim {
        for c in r..dim {
            packed[sym_index(dim, r, c)] = m[(r, c)];
        }
    }
}

/// Full symmetric D × D matrix from packed components
pub fn symmetric_from_packed<const D: usize>(packed: &[f64]) -> SMatrix<f64, D, D> {
    SMatrix::from_fn(|r, c| packed[sym_index(D, r, c)])
}

/// Dense ops on the 2 × 2 and 3 × 3 point tensors
///
/// nalgebra only provides determinant, inverse and eigen solvers for
/// dimensions it can prove square at the type level; the kernel is generic
/// over `D`, so it reaches them through this trait.
pub trait SmallTensor<const D: usize> {
    fn det(&self) -> f64;
    fn checked_inverse(&self) -> Option<SMatrix<f64, D, D>>;
    fn min_singular_value(&self) -> f64;
    /// Smallest eigenvalue of the symmetric part and its eigenvector
    fn min_eigenpair(&self) -> (f64, SVector<f64, D>);
}

macro_rules! impl_small_tensor {
    ($d:literal) => {
        impl SmallTensor<$d> for SMatrix<f64, $d, $d> {
            #[inline]
            fn det(&self) -> f64 {
                self.determinant()
            }

            #[inline]
            fn checked_inverse(&self) -> Option<SMatrix<f64, $d, $d>> {
                (*self).try_inverse()
            }

            #[inline]
            fn min_singular_value(&self) -> f64 {
                self.singular_values().min()
            }

            fn min_eigenpair(&self) -> (f64, SVector<f64, $d>) {
                let eigen = (*self).symmetric_eigen();
                let lead = eigen.eigenvalues.imin();
                (eigen.eigenvalues[lead], eigen.eigenvectors.column(lead).into_owned())
            }
        }
    };
}

impl_small_tensor!(2);
impl_small_tensor!(3);

/// Velocity gradient L = ∂v/∂x split into strain rate D = ½(L + Lᵀ) and spin W = ½(L − Lᵀ)
pub struct StrainDisplacement;

impl StrainDisplacement {
    /// Σ_a u_a ⊗ ∇̂φ_a for nodal vectors `nodal(c, a)` and reference gradients (nd × D)
    ///
    /// With node coordinates this is the cell Jacobian; with nodal velocities
    /// it is the velocity gradient with respect to reference coordinates.
    pub fn reference_gradient<const D: usize>(
        dshape: &DMatrix<f64>,
        nodal: impl Fn(usize, usize) -> f64,
    ) -> SMatrix<f64, D, D> {
        let mut g = SMatrix::<f64, D, D>::zeros();
        for a in 0..dshape.nrows() {
            for c in 0..D {
                let u = nodal(c, a);
                for k in 0..D {
                    g[(c, k)] += u * dshape[(a, k)];
                }
            }
        }
        g
    }

    /// Physical velocity gradient from the reference one and the inverse Jacobian
    #[inline]
    pub fn velocity_gradient<const D: usize>(
        grad_ref: &SMatrix<f64, D, D>,
        jinv: &SMatrix<f64, D, D>,
    ) -> SMatrix<f64, D, D> {
        grad_ref * jinv
    }

    pub fn decompose<const D: usize>(grad_v: &SMatrix<f64, D, D>) -> (SMatrix<f64, D, D>, SMatrix<f64, D, D>) {
        let t = grad_v.transpose();
        ((grad_v + t) * 0.5, (grad_v - t) * 0.5)
    }

    /// Deviatoric part of a square tensor
    pub fn deviator<const D: usize>(m: &SMatrix<f64, D, D>) -> SMatrix<f64, D, D> {
        m - SMatrix::<f64, D, D>::identity() * (m.trace() / D as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_packed_indices() {
        assert_eq!(stress_components(2), 3);
        assert_eq!(stress_components(3), 6);

        let idx2: Vec<usize> = [(0, 0), (0, 1), (1, 1)].iter().map(|&(r, c)| sym_index(2, r, c)).collect();
        assert_eq!(idx2, vec![0, 1, 2]);

        let idx3: Vec<usize> = [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)]
            .iter()
            .map(|&(r, c)| sym_index(3, r, c))
            .collect();
        assert_eq!(idx3, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(sym_index(3, 2, 1), 4);
    }

    #[test]
    fn test_pack_unpack() {
        let packed = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = unpack_symmetric(3, &packed);
        assert_eq!(m[(1, 0)], 2.0);
        assert_eq!(m[(2, 1)], 5.0);
        let mut out = [0.0; 6];
        pack_symmetric(&m, &mut out);
        assert_eq!(out, packed);
    }

    #[test]
    fn test_rigid_rotation_has_no_strain_rate() {
        // v = ω × x in 2-D: L = [[0, -ω], [ω, 0]]
        let grad = SMatrix::<f64, 2, 2>::new(0.0, -0.3, 0.3, 0.0);
        let (d, w) = StrainDisplacement::decompose(&grad);
        assert_relative_eq!(d.norm(), 0.0);
        assert_relative_eq!(w[(1, 0)], 0.3);
    }

    #[test]
    fn test_velocity_gradient_of_uniform_stretch() {
        // Unit square, v_x = x: nodes 1 and 3 move with speed 1
        let velocities = [[0.0, 1.0, 0.0, 1.0], [0.0; 4]];
        let dshape = crate::fem::LagrangeBasis::new(2, 1).shape_derivatives(&[0.5, 0.5, 0.0]);
        let grad_ref = StrainDisplacement::reference_gradient::<2>(&dshape, |c, a| velocities[c][a]);
        let grad = StrainDisplacement::velocity_gradient(&grad_ref, &SMatrix::identity());
        assert_relative_eq!(grad[(0, 0)], 1.0, epsilon = 1e-14);
        assert_relative_eq!(grad[(1, 1)], 0.0, epsilon = 1e-14);

        let dev = StrainDisplacement::deviator(&grad);
        assert_relative_eq!(dev.trace(), 0.0, epsilon = 1e-14);
        assert_relative_eq!(dev[(0, 0)], 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_deviator_3d() {
        let m = SMatrix::<f64, 3, 3>::from_diagonal(&SVector::<f64, 3>::new(3.0, 0.0, 0.0));
        let dev = StrainDisplacement::deviator(&m);
        assert_relative_eq!(dev[(0, 0)], 2.0, epsilon = 1e-14);
        assert_relative_eq!(dev[(1, 1)], -1.0, epsilon = 1e-14);
        assert_relative_eq!(dev[(2, 2)], -1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_small_tensor_ops() {
        let a = SMatrix::<f64, 2, 2>::new(2.0, 1.0, 1.0, 2.0);
        assert_relative_eq!(a.det(), 3.0, epsilon = 1e-14);
        let inv = a.checked_inverse().unwrap();
        assert_relative_eq!((a * inv - SMatrix::<f64, 2, 2>::identity()).norm(), 0.0, epsilon = 1e-14);
        assert_relative_eq!(a.min_singular_value(), 1.0, epsilon = 1e-12);

        let (lambda, v) = a.min_eigenpair();
        assert_relative_eq!(lambda, 1.0, epsilon = 1e-12);
        assert_relative_eq!(v[0].abs(), v[1].abs(), epsilon = 1e-12);
        assert!(v[0] * v[1] < 0.0);

        let b = SMatrix::<f64, 3, 3>::from_diagonal(&SVector::<f64, 3>::new(4.0, -2.0, 1.0));
        let (lambda, v) = b.min_eigenpair();
        assert_relative_eq!(lambda, -2.0, epsilon = 1e-12);
        assert_relative_eq!(v[1].abs(), 1.0, epsilon = 1e-12);
        assert!(SMatrix::<f64, 3, 3>::zeros().checked_inverse().is_none());

        let packed = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let s = symmetric_from_packed::<3>(&packed);
        assert_eq!(s[(2, 1)], 5.0);
        assert_eq!(s[(1, 2)], 5.0);
    }
}
