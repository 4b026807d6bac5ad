use nalgebra::DMatrix;

use super::quadrature::{GaussQuadrature, KernelDispatch};
use crate::error::{SimError, SimResult};
use crate::mesh::Mesh;

/// Tensor-product Lagrange basis of order `p` on the reference cell [0,1]^dim
///
/// The 1-D nodes are equispaced and closed, t_k = k / p (a single node at
/// 1/2 for p = 0). Node numbering is lexicographic with x running fastest:
///   node a has 1-D indices (a mod (p+1), (a / (p+1)) mod (p+1), a / (p+1)²)
/// For p = 1 in 2-D this is 0 (0,0), 1 (1,0), 2 (0,1), 3 (1,1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LagrangeBasis {
    pub dim: usize,
    pub order: usize,
}

impl LagrangeBasis {
    pub fn new(dim: usize, order: usize) -> Self {
        Self { dim, order }
    }

    /// Nodes per direction
    #[inline]
    pub fn nodes_1d(&self) -> usize {
        self.order + 1
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes_1d().pow(self.dim as u32)
    }

    fn node_coordinate(&self, k: usize) -> f64 {
        if self.order == 0 {
            0.5
        } else {
            k as f64 / self.order as f64
        }
    }

    /// 1-D indices of node `a`
    fn multi_index(&self, a: usize) -> [usize; 3] {
        let m = self.nodes_1d();
        let mut idx = [0; 3];
        let mut rest = a;
        for slot in idx.iter_mut().take(self.dim) {
            *slot = rest % m;
            rest /= m;
        }
        idx
    }

    /// Reference coordinates of node `a`
    pub fn node_point(&self, a: usize) -> [f64; 3] {
        let idx = self.multi_index(a);
        let mut xi = [0.0; 3];
        for k in 0..self.dim {
            xi[k] = self.node_coordinate(idx[k]);
        }
        xi
    }

    /// Nodes sitting on the corners of the reference cell
    pub fn corner_nodes(&self) -> Vec<usize> {
        let m = self.nodes_1d();
        (0..1usize << self.dim)
            .map(|corner| {
                (0..self.dim)
                    .map(|k| ((corner >> k) & 1) * self.order * m.pow(k as u32))
                    .sum()
            })
            .collect()
    }

    /// 1-D Lagrange polynomial `k` at `x`
    fn value_1d(&self, k: usize, x: f64) -> f64 {
        let tk = self.node_coordinate(k);
        (0..self.nodes_1d())
            .filter(|&m| m != k)
            .map(|m| {
                let tm = self.node_coordinate(m);
                (x - tm) / (tk - tm)
            })
            .product()
    }

    /// Derivative of the 1-D Lagrange polynomial `k` at `x`
    fn derivative_1d(&self, k: usize, x: f64) -> f64 {
        let tk = self.node_coordinate(k);
        let n = self.nodes_1d();
        let mut sum = 0.0;
        for j in (0..n).filter(|&j| j != k) {
            let tj = self.node_coordinate(j);
            let mut term = 1.0 / (tk - tj);
            for m in (0..n).filter(|&m| m != k && m != j) {
                let tm = self.node_coordinate(m);
                term *= (x - tm) / (tk - tm);
            }
            sum += term;
        }
        sum
    }

    /// Evaluate all shape functions at reference point `xi`
    pub fn shape_functions(&self, xi: &[f64; 3]) -> Vec<f64> {
        (0..self.num_nodes())
            .map(|a| {
                let idx = self.multi_index(a);
                (0..self.dim).map(|k| self.value_1d(idx[k], xi[k])).product()
            })
            .collect()
    }

    /// Reference gradients, one row per node: `dshape[(a, k)] = ∂φ_a/∂ξ_k`
    pub fn shape_derivatives(&self, xi: &[f64; 3]) -> DMatrix<f64> {
        DMatrix::from_fn(self.num_nodes(), self.dim, |a, k| {
            let idx = self.multi_index(a);
            (0..self.dim)
                .map(|m| {
                    if m == k {
                        self.derivative_1d(idx[m], xi[m])
                    } else {
                        self.value_1d(idx[m], xi[m])
                    }
                })
                .product()
        })
    }
}

/// Reference cell with its quadrature rule and tabulated basis data
///
/// Built once at setup from the resolved [`KernelDispatch`]; every kernel and
/// assembler reads shape values and gradients from here instead of
/// re-evaluating the basis. The kinematic space is continuous Q_p, the
/// thermodynamic space (energy, stress, plastic strain) discontinuous Q_r.
#[derive(Debug, Clone)]
pub struct ReferenceElement {
    pub dim: usize,
    pub dispatch: KernelDispatch,
    pub quadrature: GaussQuadrature,
    pub kinematic: LagrangeBasis,
    pub thermodynamic: LagrangeBasis,
    /// `shape[q][a]` = φ_a at quadrature point q
    pub shape: Vec<Vec<f64>>,
    /// `dshape[q]` = nd × dim matrix of reference gradients at point q
    pub dshape: Vec<DMatrix<f64>>,
    /// `thermo_shape[q][j]` = ψ_j at quadrature point q
    pub thermo_shape: Vec<Vec<f64>>,
}

impl ReferenceElement {
    /// Q1 kinematics with piecewise-constant thermodynamics
    pub fn new(dispatch: KernelDispatch) -> SimResult<Self> {
        Self::with_orders(dispatch, 1, 0)
    }

    pub fn with_orders(dispatch: KernelDispatch, kinematic_order: usize, thermo_order: usize) -> SimResult<Self> {
        if kinematic_order == 0 {
            return Err(SimError::unknown("kinematic order", kinematic_order));
        }
        let dim = dispatch.dim();
        let quadrature = dispatch.quadrature()?;
        let kinematic = LagrangeBasis::new(dim, kinematic_order);
        let thermodynamic = LagrangeBasis::new(dim, thermo_order);
        if thermodynamic.num_nodes() > quadrature.num_points() {
            return Err(SimError::InvalidConfig(format!(
                "{} points per cell cannot resolve {} thermodynamic dofs",
                quadrature.num_points(),
                thermodynamic.num_nodes()
            )));
        }

        let shape = quadrature.points.iter().map(|xi| kinematic.shape_functions(xi)).collect();
        let dshape = quadrature.points.iter().map(|xi| kinematic.shape_derivatives(xi)).collect();
        let thermo_shape = quadrature
            .points
            .iter()
            .map(|xi| thermodynamic.shape_functions(xi))
            .collect();
        Ok(Self {
            dim,
            dispatch,
            quadrature,
            kinematic,
            thermodynamic,
            shape,
            dshape,
            thermo_shape,
        })
    }

    pub fn num_points(&self) -> usize {
        self.quadrature.num_points()
    }

    pub fn nodes_per_cell(&self) -> usize {
        self.kinematic.num_nodes()
    }

    /// Thermodynamic dofs per cell
    pub fn thermo_dofs(&self) -> usize {
        self.thermodynamic.num_nodes()
    }

    /// dim × nd matrix of the cell's current node coordinates
    pub fn cell_coords(&self, mesh: &Mesh, cell_id: usize) -> DMatrix<f64> {
        let nodes = &mesh.connectivity.cells[cell_id].nodes;
        DMatrix::from_fn(self.dim, nodes.len(), |i, a| mesh.coord(nodes[a], i))
    }

    /// J = Σ_a x_a ⊗ ∇ξ φ_a at quadrature point `q`
    pub fn jacobian(&self, coords: &DMatrix<f64>, q: usize) -> DMatrix<f64> {
        coords * &self.dshape[q]
    }

    /// Physical image of reference point `xi` under the cell map
    pub fn map_point(&self, coords: &DMatrix<f64>, xi: &[f64; 3]) -> [f64; 3] {
        let phi = self.kinematic.shape_functions(xi);
        let mut x = [0.0; 3];
        for (i, xi_out) in x.iter_mut().enumerate().take(self.dim) {
            *xi_out = phi.iter().enumerate().map(|(a, p)| p * coords[(i, a)]).sum();
        }
        x
    }

    /// Physical locations of the thermodynamic dofs of a cell
    pub fn thermo_dof_points(&self, mesh: &Mesh, cell_id: usize) -> Vec<[f64; 3]> {
        let coords = self.cell_coords(mesh, cell_id);
        (0..self.thermo_dofs())
            .map(|j| self.map_point(&coords, &self.thermodynamic.node_point(j)))
            .collect()
    }

    /// Cell volume Σ_q detJ w
    pub fn cell_volume(&self, mesh: &Mesh, cell_id: usize) -> f64 {
        let coords = self.cell_coords(mesh, cell_id);
        (0..self.num_points())
            .map(|q| self.jacobian(&coords, q).determinant() * self.quadrature.weights[q])
            .sum()
    }
}
