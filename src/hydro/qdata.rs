//! Material-point cache: one record per (cell, quadrature point)
//!
//! The reference subset (`jac0inv`, `rho0_detj0_w`, `h0`) is computed when the
//! operator is built or rebuilt after a remesh and is never touched by the
//! kernel. The flux subset is overwritten on every kernel refresh.

use nalgebra::DMatrix;

use crate::error::{SimError, SimResult};
use crate::fem::ReferenceElement;
use crate::mechanics::MaterialTable;
use crate::mesh::Mesh;

#[derive(Debug, Clone)]
pub struct QuadratureData {
    pub dim: usize,
    pub num_cells: usize,
    /// Quadrature points per cell
    pub num_points: usize,
    /// Inverse of the reference-configuration Jacobian, index `cell * nq + q`
    pub jac0inv: Vec<DMatrix<f64>>,
    /// ρ0 · detJ0 · w, fixed for the lifetime of the mesh
    pub rho0_detj0_w: Vec<f64>,
    /// Initial length scale (V / Ne)^(1/dim) / order
    pub h0: f64,
    /// (s - pI + ν D) J⁻ᵀ · w · detJ, consumed by force assembly
    pub stress_jinv_t: Vec<DMatrix<f64>>,
    /// Deviatoric stress rate · ρ · w · detJ, consumed by the stress projection
    pub stress_rate_flux: Vec<DMatrix<f64>>,
    /// Running minimum of the stable step over all points
    pub dt_est: f64,
    /// Smallest length scale seen by the last refresh
    pub h_min: f64,
}

impl QuadratureData {
    /// Tabulate the reference geometry of `mesh` in its current configuration
    ///
    /// `cell_mass` optionally prescribes the mass of every cell (used after a
    /// remesh so mass is conserved); otherwise ρ0 of the cell's material is used.
    pub fn setup(
        mesh: &Mesh,
        reference: &ReferenceElement,
        materials: &MaterialTable,
        kinematic_order: usize,
        cell_mass: Option<&[f64]>,
    ) -> SimResult<Self> {
        let dim = mesh.dim;
        let nq = reference.num_points();
        let ne = mesh.num_cells();
        if ne == 0 {
            return Err(SimError::InvalidMesh("mesh has no cells".into()));
        }
        if let Some(m) = cell_mass {
            if m.len() != ne {
                return Err(SimError::InvariantViolation(format!(
                    "{} cell masses for {ne} cells",
                    m.len()
                )));
            }
        }

        let mut jac0inv = Vec::with_capacity(ne * nq);
        let mut rho0_detj0_w = Vec::with_capacity(ne * nq);
        let mut total_volume = 0.0;

        for (e, cell) in mesh.connectivity.cells.iter().enumerate() {
            let coords = reference.cell_coords(mesh, e);
            let mut dets = Vec::with_capacity(nq);
            for q in 0..nq {
                let j = reference.jacobian(&coords, q);
                let det = j.determinant();
                if det <= 0.0 {
                    return Err(SimError::InvalidMesh(format!(
                        "cell {e} has a non-positive Jacobian determinant ({det:.3e}) at point {q}"
                    )));
                }
                let inv = j.try_inverse().ok_or_else(|| {
                    SimError::InvalidMesh(format!("cell {e} has a singular Jacobian at point {q}"))
                })?;
                jac0inv.push(inv);
                dets.push(det);
            }

            let volume: f64 = dets
                .iter()
                .zip(&reference.quadrature.weights)
                .map(|(d, w)| d * w)
                .sum();
            total_volume += volume;

            let rho0 = match cell_mass {
                Some(m) => m[e] / volume,
                None => materials.zone(cell.attribute).rho,
            };
            for (q, det) in dets.iter().enumerate() {
                rho0_detj0_w.push(rho0 * det * reference.quadrature.weights[q]);
            }
        }

        let h0 = (total_volume / ne as f64).powf(1.0 / dim as f64) / kinematic_order as f64;

        Ok(Self {
            dim,
            num_cells: ne,
            num_points: nq,
            jac0inv,
            rho0_detj0_w,
            h0,
            stress_jinv_t: vec![DMatrix::zeros(dim, dim); ne * nq],
            stress_rate_flux: vec![DMatrix::zeros(dim, dim); ne * nq],
            dt_est: f64::INFINITY,
            h_min: f64::INFINITY,
        })
    }

    #[inline]
    pub fn index(&self, cell: usize, q: usize) -> usize {
        cell * self.num_points + q
    }

    /// Mass of each cell, Σ_q ρ0 detJ0 w
    pub fn cell_masses(&self) -> Vec<f64> {
        self.rho0_detj0_w
            .chunks(self.num_points)
            .map(|c| c.iter().sum())
            .collect()
    }

    pub fn total_mass(&self) -> f64 {
        self.rho0_detj0_w.iter().sum()
    }
}
