use nalgebra::DMatrix;
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use super::basis::ReferenceElement;
use crate::error::{SimError, SimResult};
use crate::mesh::Mesh;

/// Global matrix assembler for the mass systems of the explicit scheme
pub struct Assembler;

impl Assembler {
    /// Assemble the scalar velocity mass matrix (parallel, using Rayon)
    ///
    /// M_ij = Σ_e Σ_q ρ0 detJ0 w φ_i φ_j
    ///
    /// The same matrix serves every velocity component since the space is
    /// ordered by component blocks.
    ///
    /// # Arguments
    /// * `mesh` - The mesh
    /// * `reference` - Tabulated reference element
    /// * `rho0_detj0_w` - Reference density-weighted volume per (cell, point), `cell * nq + q`
    ///
    /// # Returns
    /// num_nodes × num_nodes matrix in CSR format
    pub fn assemble_velocity_mass(
        mesh: &Mesh,
        reference: &ReferenceElement,
        rho0_detj0_w: &[f64],
    ) -> CsMat<f64> {
        let n = mesh.num_nodes();
        let nq = reference.num_points();
        let nd = reference.nodes_per_cell();

        // Parallel assembly: each cell produces its own triplet list
        let local_triplets: Vec<Vec<(usize, usize, f64)>> = mesh
            .connectivity
            .cells
            .par_iter()
            .enumerate()
            .map(|(e, cell)| {
                let mut m_elem = DMatrix::<f64>::zeros(nd, nd);
                for q in 0..nq {
                    let weight = rho0_detj0_w[e * nq + q];
                    let phi = &reference.shape[q];
                    for i in 0..nd {
                        for j in 0..nd {
                            m_elem[(i, j)] += weight * phi[i] * phi[j];
                        }
                    }
                }

                let mut elem_triplets = Vec::with_capacity(nd * nd);
                for i in 0..nd {
                    for j in 0..nd {
                        elem_triplets.push((cell.nodes[i], cell.nodes[j], m_elem[(i, j)]));
                    }
                }
                elem_triplets
            })
            .collect();

        // Merge in cell order so the summation order never depends on scheduling
        let mut triplets = TriMat::new((n, n));
        for elem_triplets in local_triplets {
            for (i, j, val) in elem_triplets {
                triplets.add_triplet(i, j, val);
            }
        }

        triplets.to_csr()
    }

    /// Copy of `mass` with the rows and columns of `fixed` replaced by identity
    ///
    /// Used with a right-hand side that is zero on the fixed DOFs, so the
    /// solution vanishes there (prescribed velocities have zero acceleration).
    pub fn constrain(mass: &CsMat<f64>, fixed: &[usize]) -> CsMat<f64> {
        let n = mass.rows();
        let mut is_fixed = vec![false; n];
        for &dof in fixed {
            is_fixed[dof] = true;
        }

        let mut tri = TriMat::new((n, n));
        for (row_idx, row) in mass.outer_iterator().enumerate() {
            if is_fixed[row_idx] {
                tri.add_triplet(row_idx, row_idx, 1.0);
            } else {
                for (col_idx, &val) in row.iter() {
                    if !is_fixed[col_idx] {
                        tri.add_triplet(row_idx, col_idx, val);
                    }
                }
            }
        }
        tri.to_csr()
    }
}

/// Per-cell dense mass matrices of the discontinuous thermodynamic space and
/// their inverses, indexed by cell id
///
/// M_e[i][j] = Σ_q ρ0 detJ0 w ψ_i ψ_j. The blocks never couple cells, so the
/// energy and stress updates are local solves. Rebuilt whenever the mesh is
/// replaced.
#[derive(Debug, Clone)]
pub struct ElementMassArena {
    mass: Vec<DMatrix<f64>>,
    inverse: Vec<DMatrix<f64>>,
}

impl ElementMassArena {
    pub fn build(reference: &ReferenceElement, rho0_detj0_w: &[f64]) -> SimResult<Self> {
        let nq = reference.num_points();
        let nde = reference.thermo_dofs();
        let num_cells = if nq == 0 { 0 } else { rho0_detj0_w.len() / nq };

        let blocks: Vec<SimResult<(DMatrix<f64>, DMatrix<f64>)>> = (0..num_cells)
            .into_par_iter()
            .map(|e| {
                let mut block = DMatrix::<f64>::zeros(nde, nde);
                for q in 0..nq {
                    let weight = rho0_detj0_w[e * nq + q];
                    let psi = &reference.thermo_shape[q];
                    for i in 0..nde {
                        for j in 0..nde {
                            block[(i, j)] += weight * psi[i] * psi[j];
                        }
                    }
                }
                let inv = block.clone().try_inverse().ok_or_else(|| {
                    SimError::InvalidMesh(format!(
                        "cell {e} has a singular mass block (mass = {})",
                        block.sum()
                    ))
                })?;
                Ok((block, inv))
            })
            .collect();

        let mut mass = Vec::with_capacity(num_cells);
        let mut inverse = Vec::with_capacity(num_cells);
        for block in blocks {
            let (m, inv) = block?;
            mass.push(m);
            inverse.push(inv);
        }
        Ok(Self { mass, inverse })
    }

    /// Arena with no cells
    pub fn empty() -> Self {
        Self {
            mass: Vec::new(),
            inverse: Vec::new(),
        }
    }

    pub fn num_cells(&self) -> usize {
        self.mass.len()
    }

    pub fn mass(&self, cell_id: usize) -> &DMatrix<f64> {
        &self.mass[cell_id]
    }

    pub fn inverse(&self, cell_id: usize) -> &DMatrix<f64> {
        &self.inverse[cell_id]
    }

    /// Total mass carried by the cell
    pub fn cell_mass(&self, cell_id: usize) -> f64 {
        self.mass[cell_id].sum()
    }

    /// 1ᵀ M_e u for the cell's dof values `u`
    pub fn integrate(&self, cell_id: usize, values: &[f64]) -> f64 {
        let m = &self.mass[cell_id];
        (0..m.nrows())
            .map(|i| (0..m.ncols()).map(|j| m[(i, j)] * values[j]).sum::<f64>())
            .sum()
    }

    /// Solve M_e u = rhs, writing u into `out`
    pub fn solve_into(&self, cell_id: usize, rhs: &[f64], out: &mut [f64]) {
        let inv = &self.inverse[cell_id];
        for (i, o) in out.iter_mut().enumerate() {
            *o = (0..inv.ncols()).map(|j| inv[(i, j)] * rhs[j]).sum();
        }
    }
}
