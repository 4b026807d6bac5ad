//! Adaptive step driver with rollback
//!
//! Each attempt snapshots the accepted state, integrates one trial step,
//! applies the plasticity correction and then compares the stable-step
//! estimate gathered during the attempt with the dt taken. A rejected attempt
//! restores the snapshot bit for bit, invalidates the material-point cache and
//! retries the same step index with half the dt. Only an accepted step may
//! remesh; the next dt is then also bounded by the estimate on the new mesh.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, error, info};

use super::adaptive::{StepController, StepDecision};
use super::ode::TimeIntegrator;
use crate::error::{SimError, SimResult};
use crate::hydro::{GlobalState, LagrangianOperator};
use crate::mechanics::{apply_return_mapping, PlasticityModel};
use crate::mesh::PlasticityState;
use crate::remesh::{NoRemesh, Remesher};
use crate::utils::units::seconds_to_years;

/// Run-level controls of the time loop
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub t_final: f64,
    /// Stop after this many accepted steps
    pub max_steps: Option<usize>,
    /// Fallback first dt when the initial estimate is unbounded
    pub init_dt: f64,
    /// Overrides the initial estimate entirely
    pub initial_dt: Option<f64>,
    /// Log a progress line every `vis_steps` accepted steps
    pub vis_steps: usize,
    /// Remesh every this many accepted steps (`None` disables remeshing)
    pub remesh_steps: Option<usize>,
    /// Also remesh when dt / dt_first drops below this ratio (0 disables)
    pub time_reduction: f64,
    pub report_in_years: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            t_final: 1.0,
            max_steps: None,
            init_dt: 1.0,
            initial_dt: None,
            vis_steps: 1,
            remesh_steps: None,
            time_reduction: 0.0,
            report_in_years: false,
        }
    }
}

/// Diagnostics of one accepted step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub estimate: f64,
    /// Euclidean norm of the specific internal energy block
    pub energy_norm: f64,
    pub max_speed: f64,
    pub h_min: f64,
}

/// Result of one call to `AdaptiveDriver::attempt_step`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Accepted {
        dt: f64,
        estimate: f64,
        next_dt: f64,
        remeshed: bool,
    },
    Rejected {
        dt: f64,
        estimate: f64,
        next_dt: f64,
    },
}

impl StepOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepOutcome::Accepted { .. })
    }
}

/// What a finished run hands back to the caller
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub steps: usize,
    pub rejected: usize,
    pub remeshes: usize,
    pub final_time: f64,
    pub accepted_dts: Vec<f64>,
    pub records: Vec<StepRecord>,
    pub initial_kinetic_energy: f64,
    pub initial_internal_energy: f64,
    pub kinetic_energy: f64,
    pub internal_energy: f64,
}

impl RunSummary {
    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.internal_energy
    }

    pub fn initial_total_energy(&self) -> f64 {
        self.initial_kinetic_energy + self.initial_internal_energy
    }
}

/// Sink for restart data
pub trait Checkpoint {
    fn save(&mut self, step: usize, time: f64, state: &GlobalState, plastic: &PlasticityState) -> SimResult<()>;

    /// Push any pending data to its destination
    fn flush(&mut self) -> SimResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCheckpoint;

impl Checkpoint for NoCheckpoint {
    fn save(&mut self, _step: usize, _time: f64, _state: &GlobalState, _plastic: &PlasticityState) -> SimResult<()> {
        Ok(())
    }

    fn flush(&mut self) -> SimResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointEntry {
    pub step: usize,
    pub time: f64,
    pub state: GlobalState,
    pub plastic: PlasticityState,
}

/// Keeps checkpoints in memory; `save` stages, `flush` commits
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpoint {
    pending: Vec<CheckpointEntry>,
    pub flushed: Vec<CheckpointEntry>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Checkpoint for MemoryCheckpoint {
    fn save(&mut self, step: usize, time: f64, state: &GlobalState, plastic: &PlasticityState) -> SimResult<()> {
        self.pending.push(CheckpointEntry {
            step,
            time,
            state: state.clone(),
            plastic: plastic.clone(),
        });
        Ok(())
    }

    fn flush(&mut self) -> SimResult<()> {
        self.flushed.append(&mut self.pending);
        Ok(())
    }
}

/// Lets the caller keep a handle on a checkpoint owned by the driver
impl<C: Checkpoint> Checkpoint for Rc<RefCell<C>> {
    fn save(&mut self, step: usize, time: f64, state: &GlobalState, plastic: &PlasticityState) -> SimResult<()> {
        self.borrow_mut().save(step, time, state, plastic)
    }

    fn flush(&mut self) -> SimResult<()> {
        self.borrow_mut().flush()
    }
}

pub struct AdaptiveDriver {
    op: LagrangianOperator,
    integrator: TimeIntegrator,
    plasticity: Option<Box<dyn PlasticityModel>>,
    remesher: Box<dyn Remesher>,
    checkpoint: Box<dyn Checkpoint>,
    controller: StepController,
    settings: DriverSettings,

    state: GlobalState,
    plastic: PlasticityState,
    snapshot: GlobalState,
    snapshot_plastic: PlasticityState,

    time: f64,
    dt: f64,
    /// First dt of the run, or of the mesh since the last remesh
    dt_reference: f64,
    step: usize,
    rejected: usize,
    remeshes: usize,
    finished: bool,

    records: Vec<StepRecord>,
    initial_energies: (f64, f64),
}

impl AdaptiveDriver {
    /// Set up the loop at t = 0; the first dt comes from the stable estimate
    /// of `state` unless `settings.initial_dt` is given
    pub fn new(
        mut op: LagrangianOperator,
        state: GlobalState,
        plastic: PlasticityState,
        integrator: TimeIntegrator,
        settings: DriverSettings,
    ) -> SimResult<Self> {
        if plastic.num_dofs() != state.layout().num_thermo() {
            return Err(SimError::InvariantViolation(format!(
                "plastic strain has {} dofs, state has {}",
                plastic.num_dofs(),
                state.layout().num_thermo()
            )));
        }
        if !(settings.t_final > 0.0) {
            return Err(SimError::InvalidConfig(format!("final time must be positive, got {}", settings.t_final)));
        }

        let controller = StepController::default();
        op.reset_step_estimate();
        op.reset_quadrature_data();
        let estimate = op.stable_step_estimate(&state)?;
        let dt = match settings.initial_dt {
            Some(dt) => dt,
            None => controller.initial_dt(estimate, settings.init_dt),
        };
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(SimError::InvalidConfig(format!("initial dt must be positive and finite, got {dt}")));
        }
        info!("Initial dt = {:.6e} (stable estimate {:.6e})", dt, estimate);

        let initial_energies = (op.kinetic_energy(&state), op.internal_energy(&state));
        Ok(Self {
            integrator,
            plasticity: None,
            remesher: Box::new(NoRemesh),
            checkpoint: Box::new(NoCheckpoint),
            controller,
            settings,
            snapshot: state.clone(),
            snapshot_plastic: plastic.clone(),
            state,
            plastic,
            time: 0.0,
            dt,
            dt_reference: dt,
            step: 0,
            rejected: 0,
            remeshes: 0,
            finished: false,
            records: Vec::new(),
            initial_energies,
            op,
        })
    }

    pub fn with_plasticity(mut self, model: Box<dyn PlasticityModel>) -> Self {
        self.plasticity = Some(model);
        self
    }

    pub fn with_remesher(mut self, remesher: Box<dyn Remesher>) -> Self {
        self.remesher = remesher;
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Box<dyn Checkpoint>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn with_controller(mut self, controller: StepController) -> Self {
        self.controller = controller;
        self
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn plastic(&self) -> &PlasticityState {
        &self.plastic
    }

    pub fn operator(&self) -> &LagrangianOperator {
        &self.op
    }

    pub fn operator_mut(&mut self) -> &mut LagrangianOperator {
        &mut self.op
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// dt of the next attempt (before clipping to the final time)
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn set_dt(&mut self, dt: f64) {
        self.dt = dt;
    }

    /// Accepted steps so far
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn take_snapshot(&mut self) {
        self.snapshot.copy_from(&self.state);
        self.snapshot_plastic.clone_from(&self.plastic);
    }

    fn restore_snapshot(&mut self) -> SimResult<()> {
        self.state.copy_from(&self.snapshot);
        self.plastic.clone_from(&self.snapshot_plastic);
        self.op.reset_quadrature_data();
        self.op.bind_mesh_nodes(&self.state)
    }

    fn remesh_due(&self, dt: f64) -> bool {
        let Some(every) = self.settings.remesh_steps else {
            return false;
        };
        let by_count = every > 0 && (self.step + 1) % every == 0;
        let by_reduction = self.settings.time_reduction > 0.0 && dt / self.dt_reference < self.settings.time_reduction;
        by_count || by_reduction
    }

    fn maybe_remesh(&mut self, dt: f64) -> SimResult<bool> {
        if !self.remesh_due(dt) {
            return Ok(false);
        }
        let fields = self
            .remesher
            .remesh(self.op.mesh(), self.op.dofs(), &self.state, &self.plastic)?;
        let Some(fields) = fields else {
            return Ok(false);
        };
        self.state.position_mut().copy_from_slice(&fields.positions);
        self.op.rebuild_after_remesh(&self.state)?;
        self.remeshes += 1;
        debug!(
            "Remeshed ({}) at step {}: min scaled Jacobian {:.3} -> {:.3}",
            self.remesher.name(),
            self.step + 1,
            fields.quality_before.min_scaled_jacobian,
            fields.quality_after.min_scaled_jacobian
        );
        Ok(true)
    }

    /// One trial step: either accepted (time advances) or rolled back
    pub fn attempt_step(&mut self) -> SimResult<StepOutcome> {
        if self.finished {
            return Err(SimError::InvariantViolation("the run has already finished".into()));
        }

        let last = self.time + self.dt >= self.settings.t_final;
        let dt = if last { self.settings.t_final - self.time } else { self.dt };

        self.take_snapshot();
        self.op.reset_step_estimate();

        let mut t = self.time;
        self.integrator.step(&mut self.op, &mut self.state, &mut t, dt)?;

        if let Some(model) = self.plasticity.as_deref() {
            let yielded = apply_return_mapping(
                model,
                self.op.mesh(),
                self.op.materials(),
                self.state.stress_mut(),
                &mut self.plastic,
                dt,
            );
            if yielded > 0 {
                debug!("{} cell(s) yielded ({})", yielded, model.name());
            }
            self.op.reset_quadrature_data();
        }

        let estimate = self.op.stable_step_estimate(&self.state)?;
        let decision = self.controller.assess(dt, estimate);
        if let StepDecision::Reject { next_dt } = decision {
            self.rejected += 1;
            if self.controller.has_collapsed(next_dt) {
                self.restore_snapshot()?;
                error!(
                    "The time step crashed at step {} (t = {:.6e}, dt = {:.3e})",
                    self.step + 1,
                    self.time,
                    next_dt
                );
                self.checkpoint.save(self.step, self.time, &self.state, &self.plastic)?;
                self.checkpoint.flush()?;
                return Err(SimError::StepCollapse {
                    step: self.step + 1,
                    time: self.time,
                    dt: next_dt,
                });
            }
            self.restore_snapshot()?;
            self.dt = next_dt;
            debug!(
                "Repeating step {} with dt = {:.6e} (estimate {:.6e} < {:.6e})",
                self.step + 1,
                next_dt,
                estimate,
                dt
            );
            return Ok(StepOutcome::Rejected { dt, estimate, next_dt });
        }

        let mut next_dt = decision.next_dt();
        let remeshed = self.maybe_remesh(dt)?;
        if remeshed {
            self.op.reset_step_estimate();
            let fresh = self.op.stable_step_estimate(&self.state)?;
            next_dt = next_dt.min(fresh);
            self.dt_reference = next_dt;
        }
        self.step += 1;
        self.time = if last { self.settings.t_final } else { t };
        if !last {
            self.dt = next_dt;
        }

        let record = StepRecord {
            step: self.step,
            time: self.time,
            dt,
            estimate,
            energy_norm: self.state.block_norm(self.state.layout().energy()),
            max_speed: self.state.max_speed(),
            h_min: self.op.quadrature_data().h_min,
        };
        self.records.push(record);

        let max_reached = self.settings.max_steps.is_some_and(|m| self.step >= m);
        self.finished = last || max_reached;
        if self.finished || self.step % self.settings.vis_steps.max(1) == 0 {
            self.log_record(&record);
        }

        Ok(StepOutcome::Accepted {
            dt,
            estimate,
            next_dt,
            remeshed,
        })
    }

    fn log_record(&self, record: &StepRecord) {
        if self.settings.report_in_years {
            info!(
                "step {:5}, t = {:.4e} yr, dt = {:.6e} yr, |e| = {:.10e}, max|v| = {:.3e}",
                record.step,
                seconds_to_years(record.time),
                seconds_to_years(record.dt),
                record.energy_norm,
                record.max_speed
            );
        } else {
            info!(
                "step {:5}, t = {:.4e}, dt = {:.6e}, |e| = {:.10e}, max|v| = {:.3e}",
                record.step, record.time, record.dt, record.energy_norm, record.max_speed
            );
        }
    }

    /// Step until the final time or the step limit
    pub fn run(&mut self) -> SimResult<RunSummary> {
        while !self.finished {
            self.attempt_step()?;
        }
        let summary = self.summary();
        info!(
            "Finished: {} steps ({} rejected), t = {:.6e}, energy {:.10e} -> {:.10e}",
            summary.steps,
            summary.rejected,
            summary.final_time,
            summary.initial_total_energy(),
            summary.total_energy()
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            steps: self.step,
            rejected: self.rejected,
            remeshes: self.remeshes,
            final_time: self.time,
            accepted_dts: self.records.iter().map(|r| r.dt).collect(),
            records: self.records.clone(),
            initial_kinetic_energy: self.initial_energies.0,
            initial_internal_energy: self.initial_energies.1,
            kinetic_energy: self.op.kinetic_energy(&self.state),
            internal_energy: self.op.internal_energy(&self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::{DofManager, KernelDispatch, QuadratureOrder};
    use crate::hydro::{KernelSettings, OperatorSettings};
    use crate::mechanics::{MaterialTable, MaterialZoneParameters};
    use crate::mesh_generator::MeshGenerator;
    use crate::remesh::SmoothingRemesher;
    use crate::timestepping::OdeScheme;
    use approx::assert_relative_eq;

    fn driver(settings: DriverSettings) -> AdaptiveDriver {
        let mesh = MeshGenerator::generate_rectangle(2, 2, 2.0, 2.0).unwrap();
        let dofs = DofManager::new(mesh.num_nodes(), 2);
        let materials = MaterialTable::uniform(MaterialZoneParameters::elastic(1.0, 1.0, 1.0)).unwrap();
        let op_settings = OperatorSettings {
            kernel: KernelSettings {
                use_viscosity: false,
                ..KernelSettings::default()
            },
            ..OperatorSettings::default()
        };
        let op = LagrangianOperator::new(mesh, dofs, materials, KernelDispatch::Plane(QuadratureOrder::Two), op_settings)
            .unwrap();
        let mut state = op.new_state();
        let n = op.layout().num_nodes;
        for node in 0..n {
            state.velocity_mut()[node] = 0.01 * state.position()[n + node];
        }
        let plastic = PlasticityState::new(op.layout().num_thermo());
        let integrator = TimeIntegrator::new(OdeScheme::Rk2Average, op.layout());
        AdaptiveDriver::new(op, state, plastic, integrator, settings).unwrap()
    }

    #[test]
    fn test_final_step_lands_on_final_time() {
        let mut d = driver(DriverSettings {
            t_final: 0.35,
            ..DriverSettings::default()
        });
        let summary = d.run().unwrap();
        assert_eq!(summary.final_time, 0.35);
        assert!(d.is_finished());
        let sum: f64 = summary.accepted_dts.iter().sum();
        assert_relative_eq!(sum, 0.35, epsilon = 1e-12);
    }

    #[test]
    fn test_rejection_restores_snapshot() {
        let mut d = driver(DriverSettings {
            t_final: 10.0,
            ..DriverSettings::default()
        });
        let before = d.state().clone();
        d.set_dt(5.0);
        let outcome = d.attempt_step().unwrap();
        assert!(!outcome.is_accepted());
        assert_eq!(d.state(), &before);
        assert_eq!(d.time(), 0.0);
        assert_eq!(d.step(), 0);
        assert_eq!(d.dt(), 2.5);
        assert!(!d.operator().is_quadrature_data_current());
    }

    #[test]
    fn test_due_remesh_does_not_rescue_oversized_step() {
        let mut d = driver(DriverSettings {
            t_final: 10.0,
            remesh_steps: Some(1),
            ..DriverSettings::default()
        })
        .with_remesher(Box::new(SmoothingRemesher::new(5, 0.5)));
        let before = d.state().clone();
        let estimate = d.dt();
        d.set_dt(3.0 * estimate);

        let outcome = d.attempt_step().unwrap();
        assert!(matches!(outcome, StepOutcome::Rejected { .. }));
        assert_eq!(d.state(), &before);
        assert_eq!(d.summary().remeshes, 0);
        assert_eq!(d.step(), 0);
    }

    #[test]
    fn test_remeshed_steps_stay_below_estimate() {
        let mut d = driver(DriverSettings {
            t_final: 10.0,
            max_steps: Some(6),
            remesh_steps: Some(1),
            ..DriverSettings::default()
        })
        .with_remesher(Box::new(SmoothingRemesher::new(5, 0.5)));
        d.set_dt(2.0 * d.dt());
        let summary = d.run().unwrap();

        assert_eq!(summary.steps, 6);
        assert!(summary.rejected >= 1);
        assert!(summary.remeshes > 0);
        for record in &summary.records {
            assert!(record.estimate >= record.dt, "{record:?}");
        }
        // The dt handed to the next attempt never exceeds the final mesh's estimate
        assert!(d.operator().is_quadrature_data_current());
        assert!(d.dt() <= d.operator().quadrature_data().dt_est);
    }

    #[test]
    fn test_max_steps_counts_accepted_only() {
        let mut d = driver(DriverSettings {
            t_final: 100.0,
            max_steps: Some(3),
            ..DriverSettings::default()
        });
        d.set_dt(10.0);
        let summary = d.run().unwrap();
        assert_eq!(summary.steps, 3);
        assert!(summary.rejected >= 1);
        assert_eq!(summary.records.len(), 3);
    }

    #[test]
    fn test_collapse_flushes_checkpoint() {
        let d = driver(DriverSettings {
            t_final: 10.0,
            ..DriverSettings::default()
        })
        .with_controller(StepController {
            dt_floor: 1.0,
            ..StepController::default()
        });
        let checkpoint = Rc::new(RefCell::new(MemoryCheckpoint::new()));
        let mut d = d.with_checkpoint(Box::new(Rc::clone(&checkpoint)));
        let before = d.state().clone();
        d.set_dt(1.5);
        let err = d.attempt_step().unwrap_err();
        assert!(matches!(err, SimError::StepCollapse { step: 1, .. }));

        let checkpoint = checkpoint.borrow();
        assert_eq!(checkpoint.pending(), 0);
        assert_eq!(checkpoint.flushed.len(), 1);
        assert_eq!(checkpoint.flushed[0].state, before);
    }

    #[test]
    fn test_memory_checkpoint_stages_until_flush() {
        let d = driver(DriverSettings::default());
        let mut cp = MemoryCheckpoint::new();
        cp.save(0, 0.0, d.state(), d.plastic()).unwrap();
        assert_eq!(cp.pending(), 1);
        assert!(cp.flushed.is_empty());
        cp.flush().unwrap();
        assert_eq!(cp.pending(), 0);
        assert_eq!(cp.flushed[0].state, *d.state());
    }
}
