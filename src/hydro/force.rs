//! Matrix-free force operator F: thermodynamic space → kinematic space
//!
//! F_(c·n + a), (e, j) = Σ_q ψ_j(q) (stress_jinv_t_q · ∇̂φ_a)_c for the nodes a
//! and thermodynamic dofs j of cell e. The momentum right-hand side is -F·1
//! and the energy right-hand side is Fᵀ·v, so the work exchanged between the
//! two cancels exactly.

use nalgebra::DMatrix;
use rayon::prelude::*;

use super::qdata::QuadratureData;
use crate::fem::ReferenceElement;
use crate::linalg::LinearOperator;
use crate::mesh::Mesh;

pub struct ForceOperator<'a> {
    mesh: &'a Mesh,
    reference: &'a ReferenceElement,
    qdata: &'a QuadratureData,
}

impl<'a> ForceOperator<'a> {
    pub fn new(mesh: &'a Mesh, reference: &'a ReferenceElement, qdata: &'a QuadratureData) -> Self {
        Self {
            mesh,
            reference,
            qdata,
        }
    }

    /// dim × nd block of point q in cell e: stress_jinv_t_q · ∇̂φᵀ
    fn point_block(&self, e: usize, q: usize) -> DMatrix<f64> {
        &self.qdata.stress_jinv_t[self.qdata.index(e, q)] * self.reference.dshape[q].transpose()
    }

    /// Thermodynamic field of cell `e` evaluated at point `q`
    fn interpolate(&self, x: &[f64], e: usize, q: usize) -> f64 {
        let nde = self.reference.thermo_dofs();
        self.reference.thermo_shape[q]
            .iter()
            .zip(&x[e * nde..(e + 1) * nde])
            .map(|(psi, xj)| psi * xj)
            .sum()
    }

    /// out = Fᵀ · v (one entry per thermodynamic dof)
    pub fn mult_transpose(&self, v: &[f64]) -> Vec<f64> {
        let n = self.mesh.num_nodes();
        let dim = self.mesh.dim;
        let nq = self.qdata.num_points;
        let nde = self.reference.thermo_dofs();
        let per_cell: Vec<Vec<f64>> = self
            .mesh
            .connectivity
            .cells
            .par_iter()
            .enumerate()
            .map(|(e, cell)| {
                let mut out = vec![0.0; nde];
                for q in 0..nq {
                    let block = self.point_block(e, q);
                    let mut work = 0.0;
                    for (a, &node) in cell.nodes.iter().enumerate() {
                        for c in 0..dim {
                            work += block[(c, a)] * v[c * n + node];
                        }
                    }
                    for (o, psi) in out.iter_mut().zip(&self.reference.thermo_shape[q]) {
                        *o += psi * work;
                    }
                }
                out
            })
            .collect();
        per_cell.concat()
    }
}

impl LinearOperator for ForceOperator<'_> {
    /// out = F · x (one entry of x per thermodynamic dof)
    fn apply(&self, x: &[f64]) -> Vec<f64> {
        let n = self.mesh.num_nodes();
        let dim = self.mesh.dim;
        let nq = self.qdata.num_points;
        let blocks: Vec<DMatrix<f64>> = (0..self.mesh.num_cells())
            .into_par_iter()
            .map(|e| {
                let mut block = DMatrix::zeros(dim, self.reference.nodes_per_cell());
                for q in 0..nq {
                    block += self.point_block(e, q) * self.interpolate(x, e, q);
                }
                block
            })
            .collect();

        let mut out = vec![0.0; dim * n];
        // Scatter in cell order
        for (block, cell) in blocks.iter().zip(&self.mesh.connectivity.cells) {
            for (a, &node) in cell.nodes.iter().enumerate() {
                for c in 0..dim {
                    out[c * n + node] += block[(c, a)];
                }
            }
        }
        out
    }

    fn rows(&self) -> usize {
        self.mesh.dim * self.mesh.num_nodes()
    }

    fn cols(&self) -> usize {
        self.mesh.num_cells() * self.reference.thermo_dofs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::{KernelDispatch, QuadratureOrder};
    use crate::mechanics::{MaterialTable, MaterialZoneParameters};
    use crate::mesh_generator::MeshGenerator;
    use approx::assert_relative_eq;

    fn uniform_stress_qdata(mesh: &Mesh, reference: &ReferenceElement, sxx: f64) -> QuadratureData {
        let materials = MaterialTable::uniform(MaterialZoneParameters::elastic(1.0, 1.0, 1.0)).unwrap();
        let mut qdata = QuadratureData::setup(mesh, reference, &materials, 1, None).unwrap();
        // Axis-aligned unit cells: J = I
        for (i, m) in qdata.stress_jinv_t.iter_mut().enumerate() {
            let q = i % reference.num_points();
            m[(0, 0)] = sxx * reference.quadrature.weights[q];
        }
        qdata
    }

    #[test]
    fn test_uniform_stress_has_no_interior_force() {
        let mesh = MeshGenerator::generate_rectangle(2, 2, 2.0, 2.0).unwrap();
        let reference = ReferenceElement::new(KernelDispatch::Plane(QuadratureOrder::Two)).unwrap();
        let qdata = uniform_stress_qdata(&mesh, &reference, -1.0);
        let force = ForceOperator::new(&mesh, &reference, &qdata);

        let f = force.apply(&vec![1.0; mesh.num_cells()]);
        // Center node (4) is balanced
        assert_relative_eq!(f[4], 0.0, epsilon = 1e-14);
        // Net force vanishes
        assert_relative_eq!(f[..9].iter().sum::<f64>(), 0.0, epsilon = 1e-14);
        // Right edge carries σ_xx · length
        let right: f64 = [2, 5, 8].iter().map(|&i| f[i]).sum();
        assert_relative_eq!(right, -2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_transpose_consistency() {
        let mesh = MeshGenerator::generate_rectangle(3, 2, 3.0, 2.0).unwrap();
        let reference = ReferenceElement::new(KernelDispatch::Plane(QuadratureOrder::Two)).unwrap();
        let qdata = uniform_stress_qdata(&mesh, &reference, 2.5);
        let force = ForceOperator::new(&mesh, &reference, &qdata);

        let x: Vec<f64> = (0..mesh.num_cells()).map(|e| 1.0 + e as f64).collect();
        let v: Vec<f64> = (0..force.rows()).map(|i| (i as f64 * 0.7).sin()).collect();

        let fx = force.apply(&x);
        let ftv = force.mult_transpose(&v);
        let lhs: f64 = fx.iter().zip(&v).map(|(a, b)| a * b).sum();
        let rhs: f64 = ftv.iter().zip(&x).map(|(a, b)| a * b).sum();
        assert_relative_eq!(lhs, rhs, epsilon = 1e-12);
    }

    #[test]
    fn test_transpose_consistency_high_order() {
        let mesh = MeshGenerator::generate_rectangle_with_order(2, 2, 2.0, 2.0, 2).unwrap();
        let reference =
            ReferenceElement::with_orders(KernelDispatch::Plane(QuadratureOrder::Three), 2, 1).unwrap();
        let mut qdata = uniform_stress_qdata(&mesh, &reference, 1.5);
        for (i, m) in qdata.stress_jinv_t.iter_mut().enumerate() {
            m[(1, 0)] = 0.1 * i as f64;
            m[(1, 1)] = -0.3;
        }
        let force = ForceOperator::new(&mesh, &reference, &qdata);
        assert_eq!(force.cols(), 4 * 4);

        let x: Vec<f64> = (0..force.cols()).map(|i| (i as f64 * 0.3).cos()).collect();
        let v: Vec<f64> = (0..force.rows()).map(|i| (i as f64 * 0.7).sin()).collect();
        let lhs: f64 = force.apply(&x).iter().zip(&v).map(|(a, b)| a * b).sum();
        let rhs: f64 = force.mult_transpose(&v).iter().zip(&x).map(|(a, b)| a * b).sum();
        assert_relative_eq!(lhs, rhs, epsilon = 1e-11);
    }

    #[test]
    fn test_bilinear_ones_match_constant() {
        // ψ sums to one, so F·1 does not depend on the thermodynamic order
        let mesh = MeshGenerator::generate_rectangle(2, 2, 2.0, 2.0).unwrap();
        let dispatch = KernelDispatch::Plane(QuadratureOrder::Two);
        let constant = ReferenceElement::new(dispatch).unwrap();
        let bilinear = ReferenceElement::with_orders(dispatch, 1, 1).unwrap();
        let qdata = uniform_stress_qdata(&mesh, &constant, -1.0);

        let f0 = ForceOperator::new(&mesh, &constant, &qdata).apply(&vec![1.0; 4]);
        let f1 = ForceOperator::new(&mesh, &bilinear, &qdata).apply(&vec![1.0; 16]);
        for (a, b) in f0.iter().zip(&f1) {
            assert_relative_eq!(a, b, epsilon = 1e-14);
        }
    }
}
