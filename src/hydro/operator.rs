//! Rate evaluator of the explicit Lagrangian scheme
//!
//! `mult` maps a trial state S = (x, v, e, s, x0) to its time derivative
//! (v, dv, de, ds, 0). The three sub-solves share the material-point cache;
//! a private freshness flag guarantees at most one kernel refresh per trial
//! state and is cleared whenever a new state is submitted or the driver
//! rolls back.

use sprs::CsMat;
use tracing::{debug, warn};

use super::force::ForceOperator;
use super::kernel::{KernelReport, KernelSettings, QuadratureKernel};
use super::qdata::QuadratureData;
use super::state::{GlobalState, StateLayout};
use crate::error::{SimError, SimResult};
use crate::fem::{Assembler, DofManager, ElementMassArena, KernelDispatch, ReferenceElement};
use crate::linalg::{ConjugateGradient, JacobiPreconditioner, LinearOperator, SolverUtils};
use crate::mechanics::strain::{stress_components, sym_index};
use crate::mechanics::{BodyForce, MaterialTable};
use crate::mesh::Mesh;

/// Solver switches of the rate evaluator
#[derive(Debug, Clone, Copy)]
pub struct OperatorSettings {
    pub kernel: KernelSettings,
    /// Polynomial order of the discontinuous energy/stress space
    pub thermo_order: usize,
    pub cg_tol: f64,
    pub cg_max_iter: usize,
    /// Velocity-direction damping factor, `None` when off
    pub damping: Option<f64>,
    /// Gravitational acceleration applied as a body force, `None` when off
    pub gravity: Option<f64>,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            kernel: KernelSettings::default(),
            thermo_order: 0,
            cg_tol: 1e-10,
            cg_max_iter: 300,
            damping: None,
            gravity: None,
        }
    }
}

#[inline]
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub struct LagrangianOperator {
    mesh: Mesh,
    reference: ReferenceElement,
    dofs: DofManager,
    materials: MaterialTable,
    settings: OperatorSettings,
    kernel: QuadratureKernel,
    layout: StateLayout,
    qdata: QuadratureData,
    velocity_mass: CsMat<f64>,
    /// Per component: mass matrix with the fixed rows/columns replaced by identity
    component_mass: Vec<CsMat<f64>>,
    component_precond: Vec<JacobiPreconditioner>,
    component_fixed: Vec<Vec<usize>>,
    gravity_load: Vec<f64>,
    arena: ElementMassArena,
    cg: ConjugateGradient,
    qdata_is_current: bool,
    last_report: Option<KernelReport>,
}

impl LagrangianOperator {
    /// Build the operator on `mesh` in its current (reference) configuration
    ///
    /// Fails when a cell is inverted, when the material table does not cover
    /// the mesh ids, or when the dispatch or kinematic order does not match
    /// the mesh.
    pub fn new(
        mesh: Mesh,
        dofs: DofManager,
        materials: MaterialTable,
        dispatch: KernelDispatch,
        settings: OperatorSettings,
    ) -> SimResult<Self> {
        let dim = mesh.dim;
        if dispatch.dim() != dim {
            return Err(SimError::InvalidConfig(format!(
                "kernel dispatch is {}-D but the mesh is {dim}-D",
                dispatch.dim()
            )));
        }
        if dofs.dim() != dim || dofs.num_nodes() != mesh.num_nodes() {
            return Err(SimError::InvariantViolation(
                "DOF manager does not match the mesh".into(),
            ));
        }
        if settings.kernel.kinematic_order != mesh.order {
            return Err(SimError::InvalidConfig(format!(
                "kinematic order {} does not match the order-{} mesh",
                settings.kernel.kinematic_order, mesh.order
            )));
        }
        materials.covers(&mesh.connectivity.material_ids())?;

        let reference = ReferenceElement::with_orders(dispatch, mesh.order, settings.thermo_order)?;
        let qdata = QuadratureData::setup(&mesh, &reference, &materials, settings.kernel.kinematic_order, None)?;
        let layout = StateLayout::with_thermo_dofs(dim, mesh.num_nodes(), mesh.num_cells(), reference.thermo_dofs());
        let component_fixed = (0..dim).map(|c| dofs.component_dirichlet_nodes(c)).collect();

        let mut op = Self {
            kernel: QuadratureKernel::new(settings.kernel),
            cg: ConjugateGradient::new()
                .with_tolerance(settings.cg_tol)
                .with_max_iterations(settings.cg_max_iter),
            mesh,
            reference,
            dofs,
            materials,
            settings,
            layout,
            qdata,
            velocity_mass: CsMat::zero((0, 0)),
            component_mass: Vec::new(),
            component_precond: Vec::new(),
            component_fixed,
            gravity_load: Vec::new(),
            arena: ElementMassArena::empty(),
            qdata_is_current: false,
            last_report: None,
        };
        op.build_mass_systems()?;
        debug!(
            "Operator ready: {} nodes, {} cells, {} points/cell, h0 = {:.3e}",
            op.mesh.num_nodes(),
            op.mesh.num_cells(),
            op.qdata.num_points,
            op.qdata.h0
        );
        Ok(op)
    }

    /// Velocity mass, its constrained copies and the element mass arena
    fn build_mass_systems(&mut self) -> SimResult<()> {
        let mv = Assembler::assemble_velocity_mass(&self.mesh, &self.reference, &self.qdata.rho0_detj0_w);
        self.component_mass = self
            .component_fixed
            .iter()
            .map(|fixed| Assembler::constrain(&mv, fixed))
            .collect();
        self.component_precond = self.component_mass.iter().map(JacobiPreconditioner::new).collect();
        self.gravity_load = match self.settings.gravity {
            Some(g) => BodyForce::gravity_load(&mv, g),
            None => Vec::new(),
        };
        self.velocity_mass = mv;
        self.arena = ElementMassArena::build(&self.reference, &self.qdata.rho0_detj0_w)?;
        Ok(())
    }

    fn check_layout(&self, state: &GlobalState) -> SimResult<()> {
        if state.layout() != self.layout {
            return Err(SimError::InvariantViolation(format!(
                "state layout {:?} does not match the operator layout {:?}",
                state.layout(),
                self.layout
            )));
        }
        Ok(())
    }

    /// State with the current node coordinates in the position and x0 blocks
    /// and every other field zero
    pub fn new_state(&self) -> GlobalState {
        let mut state = GlobalState::zeros(self.layout);
        let x = self.mesh.positions();
        state.position_mut().copy_from_slice(&x);
        state.initial_position_mut().copy_from_slice(&x);
        state
    }

    /// Make the mesh nodes equal the position block of `state`
    pub fn bind_mesh_nodes(&mut self, state: &GlobalState) -> SimResult<()> {
        self.check_layout(state)?;
        self.mesh.bind_nodes(state.position())
    }

    /// Refresh the material-point cache unless it already reflects `state`
    pub fn update_quadrature_data(&mut self, state: &GlobalState) -> SimResult<()> {
        if self.qdata_is_current {
            return Ok(());
        }
        self.bind_mesh_nodes(state)?;
        let report = self
            .kernel
            .update(&mut self.qdata, &self.mesh, &self.reference, &self.materials, state);
        if report.inverted_batches > 0 {
            debug!(
                "{} batch(es) with inverted cells (min detJ = {:.3e}); stable step forced to zero",
                report.inverted_batches, report.min_det_j
            );
        }
        self.last_report = Some(report);
        self.qdata_is_current = true;
        Ok(())
    }

    /// Full time derivative of `state`
    pub fn mult(&mut self, state: &GlobalState, rate: &mut GlobalState) -> SimResult<()> {
        self.check_layout(rate)?;
        self.qdata_is_current = false;
        self.bind_mesh_nodes(state)?;

        rate.position_mut().copy_from_slice(state.velocity());
        self.solve_velocity(state, rate)?;
        self.solve_energy(state, state.velocity(), rate)?;
        self.solve_stress(state, rate)?;
        rate.initial_position_mut().fill(0.0);

        self.qdata_is_current = false;
        Ok(())
    }

    /// Acceleration: M dv = -F·1 (+ damping, + gravity), fixed DOFs held at zero
    pub fn solve_velocity(&mut self, state: &GlobalState, rate: &mut GlobalState) -> SimResult<()> {
        self.check_layout(rate)?;
        self.update_quadrature_data(state)?;

        let n = self.layout.num_nodes;
        let force = ForceOperator::new(&self.mesh, &self.reference, &self.qdata);
        let mut rhs = force.apply(&vec![1.0; self.layout.num_thermo()]);
        rhs.iter_mut().for_each(|r| *r = -*r);

        if let Some(factor) = self.settings.damping {
            for (r, &v) in rhs.iter_mut().zip(state.velocity()) {
                *r -= factor * sign(v) * r.abs();
            }
        }
        if !self.gravity_load.is_empty() {
            let c = BodyForce::vertical_component(self.layout.dim);
            for (r, g) in rhs[c * n..(c + 1) * n].iter_mut().zip(&self.gravity_load) {
                *r += g;
            }
        }

        let dv = rate.velocity_mut();
        for c in 0..self.layout.dim {
            let mut b = rhs[c * n..(c + 1) * n].to_vec();
            for &node in &self.component_fixed[c] {
                b[node] = 0.0;
            }
            let x = &mut dv[c * n..(c + 1) * n];
            x.fill(0.0);
            let stats = self.cg.solve(&self.component_mass[c], &b, x, &self.component_precond[c]);
            if !stats.converged {
                warn!(
                    "velocity solve (component {c}) stopped after {} iterations, relative residual {:.3e}",
                    stats.iterations, stats.relative_residual
                );
            }
        }
        Ok(())
    }

    /// Energy rate: M_e de = Fᵀ·v with the supplied velocity
    pub fn solve_energy(&mut self, state: &GlobalState, velocity: &[f64], rate: &mut GlobalState) -> SimResult<()> {
        self.check_layout(rate)?;
        if velocity.len() != self.layout.kinematic_len() {
            return Err(SimError::InvariantViolation(format!(
                "velocity has {} entries, expected {}",
                velocity.len(),
                self.layout.kinematic_len()
            )));
        }
        self.update_quadrature_data(state)?;

        let force = ForceOperator::new(&self.mesh, &self.reference, &self.qdata);
        let e_rhs = force.mult_transpose(velocity);
        let nde = self.layout.thermo_dofs;
        for (e, (de, rhs)) in rate
            .energy_mut()
            .chunks_mut(nde)
            .zip(e_rhs.chunks(nde))
            .enumerate()
        {
            self.arena.solve_into(e, rhs, de);
        }
        Ok(())
    }

    /// Stress rate: per-cell projection of the deviatoric rate flux
    ///
    /// Component (r, c) of cell e solves M_e ds = Σ_q ψ(q) flux_q[r][c].
    pub fn solve_stress(&mut self, state: &GlobalState, rate: &mut GlobalState) -> SimResult<()> {
        self.check_layout(rate)?;
        self.update_quadrature_data(state)?;

        let dim = self.layout.dim;
        let nt = self.layout.num_thermo();
        let nde = self.layout.thermo_dofs;
        let nq = self.qdata.num_points;
        let ds = rate.stress_mut();
        let mut rhs = vec![0.0; nde];
        for e in 0..self.layout.num_cells {
            let fluxes = &self.qdata.stress_rate_flux[e * nq..(e + 1) * nq];
            for r in 0..dim {
                for c in r..dim {
                    rhs.fill(0.0);
                    for (flux, psi) in fluxes.iter().zip(&self.reference.thermo_shape) {
                        for (b, p) in rhs.iter_mut().zip(psi) {
                            *b += p * flux[(r, c)];
                        }
                    }
                    let start = sym_index(dim, r, c) * nt + e * nde;
                    self.arena.solve_into(e, &rhs, &mut ds[start..start + nde]);
                }
            }
        }
        debug_assert_eq!(ds.len(), stress_components(dim) * nt);
        Ok(())
    }

    /// Global minimum stable step seen since the last reset, including `state`
    pub fn stable_step_estimate(&mut self, state: &GlobalState) -> SimResult<f64> {
        self.bind_mesh_nodes(state)?;
        self.update_quadrature_data(state)?;
        Ok(self.qdata.dt_est)
    }

    pub fn reset_step_estimate(&mut self) {
        self.qdata.dt_est = f64::INFINITY;
    }

    pub fn reset_quadrature_data(&mut self) {
        self.qdata_is_current = false;
    }

    pub fn is_quadrature_data_current(&self) -> bool {
        self.qdata_is_current
    }

    /// ½ Σ_c v_cᵀ Mv v_c
    pub fn kinetic_energy(&self, state: &GlobalState) -> f64 {
        let n = self.layout.num_nodes;
        let v = state.velocity();
        (0..self.layout.dim)
            .map(|c| {
                let vc = &v[c * n..(c + 1) * n];
                0.5 * SolverUtils::dot(vc, &self.velocity_mass.apply(vc))
            })
            .sum()
    }

    /// Σ_e 1ᵀ M_e e_e
    pub fn internal_energy(&self, state: &GlobalState) -> f64 {
        state
            .energy()
            .chunks(self.layout.thermo_dofs)
            .enumerate()
            .map(|(e, energy)| self.arena.integrate(e, energy))
            .sum()
    }

    pub fn total_energy(&self, state: &GlobalState) -> f64 {
        self.kinetic_energy(state) + self.internal_energy(state)
    }

    /// Re-tabulate the reference geometry after the mesh nodes were moved
    ///
    /// The mesh is bound to the position block of `state`, which becomes the
    /// new reference configuration; cell masses are kept, so the reference
    /// densities change with the cell volumes.
    pub fn rebuild_after_remesh(&mut self, state: &GlobalState) -> SimResult<()> {
        let masses = self.qdata.cell_masses();
        self.bind_mesh_nodes(state)?;
        self.qdata = QuadratureData::setup(
            &self.mesh,
            &self.reference,
            &self.materials,
            self.settings.kernel.kinematic_order,
            Some(&masses),
        )?;
        self.build_mass_systems()?;
        self.qdata_is_current = false;
        Ok(())
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn reference(&self) -> &ReferenceElement {
        &self.reference
    }

    pub fn dofs(&self) -> &DofManager {
        &self.dofs
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn layout(&self) -> StateLayout {
        self.layout
    }

    pub fn settings(&self) -> &OperatorSettings {
        &self.settings
    }

    pub fn quadrature_data(&self) -> &QuadratureData {
        &self.qdata
    }

    pub fn velocity_mass(&self) -> &CsMat<f64> {
        &self.velocity_mass
    }

    pub fn dispatch(&self) -> KernelDispatch {
        self.reference.dispatch
    }

    /// Report of the most recent kernel refresh
    pub fn last_kernel_report(&self) -> Option<KernelReport> {
        self.last_report
    }
}
