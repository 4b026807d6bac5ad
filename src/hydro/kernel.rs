//! Quadrature-point material update
//!
//! For every (cell, point) the kernel evaluates the current Jacobian, the
//! velocity gradient, the gamma-law EOS, the artificial viscosity and the
//! deviatoric stress rate, then writes the two flux tensors into the cache
//! and folds the local stable step into the running minimum.
//!
//! Cells are processed in batches of `KernelDispatch::batch_size()`; a batch
//! evaluates its EOS in one call and is the unit of parallel work. A batch
//! containing an inverted point writes zero fluxes and forces the global
//! estimate to zero, which guarantees the step is rejected.

use nalgebra::{DMatrix, SMatrix};
use rayon::prelude::*;

use super::qdata::QuadratureData;
use super::state::GlobalState;
use crate::fem::{KernelDispatch, ReferenceElement};
use crate::mechanics::strain::{symmetric_from_packed, SmallTensor, StrainDisplacement};
use crate::mechanics::{EosState, GammaLawEos, MaterialTable, MaterialZoneParameters};
use crate::mesh::Mesh;

/// Half-width of the smoothstep window that switches the linear viscosity on
const COMPRESSION_EPS: f64 = 1e-12;

/// Kernel switches fixed for the run
#[derive(Debug, Clone, Copy)]
pub struct KernelSettings {
    pub cfl: f64,
    pub use_viscosity: bool,
    pub use_vorticity: bool,
    /// Add the Jaumann spin terms W s - s W to the stress rate
    pub corotational: bool,
    /// Polynomial order of the kinematic space
    pub kinematic_order: usize,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            cfl: 0.5,
            use_viscosity: true,
            use_vorticity: false,
            corotational: false,
            kinematic_order: 1,
        }
    }
}

/// Summary of one kernel refresh
#[derive(Debug, Clone, Copy)]
pub struct KernelReport {
    /// Minimum stable step of this refresh (0 when a cell is inverted)
    pub dt_min: f64,
    pub h_min: f64,
    pub min_det_j: f64,
    pub inverted_batches: usize,
}

/// Cubic smoothstep of (x + eps) / (2 eps), clamped to [0, 1]
#[inline]
pub fn smooth_step_01(x: f64, eps: f64) -> f64 {
    let y = (x + eps) / (2.0 * eps);
    if y < 0.0 {
        0.0
    } else if y > 1.0 {
        1.0
    } else {
        (3.0 - 2.0 * y) * y * y
    }
}

/// Local stable step: cfl / (cs / h + 2.5 ν / (ρ h²))
///
/// Infinite when both terms vanish.
#[inline]
pub fn local_stable_dt(cfl: f64, sound_speed: f64, viscosity: f64, rho: f64, h_min: f64) -> f64 {
    let mut inv_dt = sound_speed / h_min;
    if viscosity > 0.0 && rho > 0.0 {
        inv_dt += 2.5 * viscosity / (rho * h_min * h_min);
    }
    if inv_dt > 0.0 {
        cfl / inv_dt
    } else {
        f64::INFINITY
    }
}

/// Geometry and kinematics of one point, gathered before the EOS call
struct PointKinematics<const D: usize> {
    jac: SMatrix<f64, D, D>,
    jinv: SMatrix<f64, D, D>,
    det_j: f64,
    rho: f64,
    grad_v: SMatrix<f64, D, D>,
}

#[inline]
fn to_fixed<const D: usize>(m: &DMatrix<f64>) -> SMatrix<f64, D, D> {
    SMatrix::from_fn(|r, c| m[(r, c)])
}

#[inline]
fn store_fixed<const D: usize>(out: &mut DMatrix<f64>, m: &SMatrix<f64, D, D>) {
    for r in 0..D {
        for c in 0..D {
            out[(r, c)] = m[(r, c)];
        }
    }
}

pub struct QuadratureKernel {
    pub settings: KernelSettings,
}

impl QuadratureKernel {
    pub fn new(settings: KernelSettings) -> Self {
        Self { settings }
    }

    /// Refresh the flux subset of `qdata` for `state`
    ///
    /// The mesh must already be bound to the position block of `state`.
    pub fn update(
        &self,
        qdata: &mut QuadratureData,
        mesh: &Mesh,
        reference: &ReferenceElement,
        materials: &MaterialTable,
        state: &GlobalState,
    ) -> KernelReport {
        let nq = qdata.num_points;
        let bs = reference.dispatch.batch_size();
        let settings = self.settings;

        let QuadratureData {
            jac0inv,
            rho0_detj0_w,
            h0,
            stress_jinv_t,
            stress_rate_flux,
            ..
        } = qdata;
        let jac0inv: &[DMatrix<f64>] = jac0inv;
        let rho0_detj0_w: &[f64] = rho0_detj0_w;
        let h0 = *h0;

        let identity = KernelReport {
            dt_min: f64::INFINITY,
            h_min: f64::INFINITY,
            min_det_j: f64::INFINITY,
            inverted_batches: 0,
        };

        let report = stress_jinv_t
            .par_chunks_mut(bs * nq)
            .zip(stress_rate_flux.par_chunks_mut(bs * nq))
            .enumerate()
            .map(|(b, (sj_out, sr_out))| {
                let batch = BatchInput {
                    mesh,
                    reference,
                    materials,
                    state,
                    jac0inv,
                    rho0_detj0_w,
                    h0,
                    settings,
                    first_cell: b * bs,
                    num_cells: sj_out.len() / nq,
                };
                match reference.dispatch {
                    KernelDispatch::Plane(_) => batch.run::<2>(sj_out, sr_out),
                    KernelDispatch::Solid(_) => batch.run::<3>(sj_out, sr_out),
                }
            })
            .reduce(
                || identity,
                |a, b| KernelReport {
                    dt_min: a.dt_min.min(b.dt_min),
                    h_min: a.h_min.min(b.h_min),
                    min_det_j: a.min_det_j.min(b.min_det_j),
                    inverted_batches: a.inverted_batches + b.inverted_batches,
                },
            );

        if report.inverted_batches > 0 {
            qdata.dt_est = 0.0;
        } else {
            qdata.dt_est = qdata.dt_est.min(report.dt_min);
        }
        qdata.h_min = report.h_min;
        report
    }
}

struct BatchInput<'a> {
    mesh: &'a Mesh,
    reference: &'a ReferenceElement,
    materials: &'a MaterialTable,
    state: &'a GlobalState,
    jac0inv: &'a [DMatrix<f64>],
    rho0_detj0_w: &'a [f64],
    h0: f64,
    settings: KernelSettings,
    first_cell: usize,
    num_cells: usize,
}

impl BatchInput<'_> {
    fn run<const D: usize>(&self, sj_out: &mut [DMatrix<f64>], sr_out: &mut [DMatrix<f64>]) -> KernelReport
    where
        SMatrix<f64, D, D>: SmallTensor<D>,
    {
        let nq = self.reference.num_points();
        let nde = self.reference.thermo_dofs();
        let n_nodes = self.mesh.num_nodes();
        let n_thermo = self.state.layout().num_thermo();
        let velocity = self.state.velocity();
        let energy = self.state.energy();
        let stress = self.state.stress();
        let weights = &self.reference.quadrature.weights;

        // Pass 1: geometry and kinematics
        let mut points: Vec<Option<PointKinematics<D>>> = Vec::with_capacity(self.num_cells * nq);
        let mut min_det_j = f64::INFINITY;

        for local in 0..self.num_cells {
            let e = self.first_cell + local;
            let nodes = &self.mesh.connectivity.cells[e].nodes;

            for q in 0..nq {
                let dshape = &self.reference.dshape[q];
                let jac = StrainDisplacement::reference_gradient::<D>(dshape, |c, a| self.mesh.coord(nodes[a], c));
                let det_j = jac.det();
                min_det_j = min_det_j.min(det_j);
                let point = if det_j > 0.0 {
                    jac.checked_inverse().map(|jinv| {
                        let grad_ref = StrainDisplacement::reference_gradient::<D>(dshape, |c, a| {
                            velocity[c * n_nodes + nodes[a]]
                        });
                        let rho = self.rho0_detj0_w[e * nq + q] / (det_j * weights[q]);
                        PointKinematics {
                            jac,
                            jinv,
                            det_j,
                            rho,
                            grad_v: StrainDisplacement::velocity_gradient(&grad_ref, &jinv),
                        }
                    })
                } else {
                    None
                };
                points.push(point);
            }
        }

        if min_det_j <= 0.0 || points.iter().any(Option::is_none) {
            for m in sj_out.iter_mut().chain(sr_out.iter_mut()) {
                m.fill(0.0);
            }
            return KernelReport {
                dt_min: 0.0,
                h_min: f64::INFINITY,
                min_det_j,
                inverted_batches: 1,
            };
        }
        let points: Vec<PointKinematics<D>> = points.into_iter().flatten().collect();

        // Thermodynamic fields at the points
        let interpolate = |e: usize, q: usize, field: &[f64]| -> f64 {
            self.reference.thermo_shape[q]
                .iter()
                .zip(&field[e * nde..(e + 1) * nde])
                .map(|(psi, x)| psi * x)
                .sum()
        };

        // Batched material evaluation
        let zones: Vec<&MaterialZoneParameters> = (0..self.num_cells * nq)
            .map(|i| {
                let e = self.first_cell + i / nq;
                self.materials.zone(self.mesh.connectivity.cells[e].attribute)
            })
            .collect();
        let rho: Vec<f64> = points.iter().map(|p| p.rho).collect();
        let e_pts: Vec<f64> = (0..self.num_cells * nq)
            .map(|i| interpolate(self.first_cell + i / nq, i % nq, energy))
            .collect();
        let mut eos = vec![
            EosState {
                pressure: 0.0,
                sound_speed: 0.0
            };
            points.len()
        ];
        GammaLawEos::evaluate_batch(&zones, &rho, &e_pts, &mut eos);

        // Pass 2: stress, viscosity, stable step, fluxes
        let mut dt_min = f64::INFINITY;
        let mut h_min_batch = f64::INFINITY;
        let mut packed = vec![0.0; 3 * (D - 1)];
        let identity = SMatrix::<f64, D, D>::identity();

        for local in 0..self.num_cells {
            let e = self.first_cell + local;
            for q in 0..nq {
                for (k, value) in packed.iter_mut().enumerate() {
                    *value = interpolate(e, q, &stress[k * n_thermo..(k + 1) * n_thermo]);
                }
                let s = symmetric_from_packed::<D>(&packed);

                let i = local * nq + q;
                let p = &points[i];
                let zone = zones[i];
                let EosState { pressure, sound_speed } = eos[i];

                let (sym, skew) = StrainDisplacement::decompose(&p.grad_v);
                let mut sigma = s - identity * pressure;

                let h_min = p.jac.min_singular_value() / self.settings.kinematic_order as f64;
                h_min_batch = h_min_batch.min(h_min);

                let mut visc = 0.0;
                if self.settings.use_viscosity {
                    visc = self.viscosity(p, &sym, sound_speed, &to_fixed::<D>(&self.jac0inv[e * nq + q]));
                    sigma += sym * visc;
                }

                dt_min = dt_min.min(local_stable_dt(self.settings.cfl, sound_speed, visc, p.rho, h_min));

                let mut tau = StrainDisplacement::deviator(&sym) * (2.0 * zone.mu);
                if self.settings.corotational {
                    tau += skew * s - s * skew;
                }

                let w_det = weights[q] * p.det_j;
                store_fixed(&mut sj_out[i], &(sigma * p.jinv.transpose() * w_det));
                store_fixed(&mut sr_out[i], &(tau * (p.rho * w_det)));
            }
        }

        KernelReport {
            dt_min,
            h_min: h_min_batch,
            min_det_j,
            inverted_batches: 0,
        }
    }

    /// Artificial bulk viscosity coefficient at one point
    fn viscosity<const D: usize>(
        &self,
        p: &PointKinematics<D>,
        sym: &SMatrix<f64, D, D>,
        sound_speed: f64,
        jac0inv: &SMatrix<f64, D, D>,
    ) -> f64
    where
        SMatrix<f64, D, D>: SmallTensor<D>,
    {
        let (mu, compr_dir) = sym.min_eigenpair();
        let dir_norm = compr_dir.norm();
        if dir_norm == 0.0 {
            return 0.0;
        }

        // Reference-to-current map applied to the compression direction
        let ph_dir = p.jac * jac0inv * compr_dir;
        let h = self.h0 * ph_dir.norm() / dir_norm;

        let vorticity_coeff = if self.settings.use_vorticity {
            let grad_norm = p.grad_v.norm();
            if grad_norm > 0.0 {
                p.grad_v.trace().abs() / grad_norm
            } else {
                1.0
            }
        } else {
            1.0
        };

        let mut coeff = 2.0 * p.rho * h * h * mu.abs();
        coeff += 0.5
            * p.rho
            * h
            * sound_speed
            * vorticity_coeff
            * (1.0 - smooth_step_01(mu - 2.0 * COMPRESSION_EPS, COMPRESSION_EPS));
        coeff
    }
}
