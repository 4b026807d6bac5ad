//! Explicit ODE integrators over the full state vector
//!
//! The Runge-Kutta schemes only see `LagrangianOperator::mult`. The
//! RK2-average scheme drives the sub-solves itself: the energy equation is
//! advanced with the midpoint-averaged velocity, which makes the exchange
//! between kinetic and internal energy exact up to the mass-solve tolerance.

use crate::error::{SimError, SimResult};
use crate::hydro::{GlobalState, LagrangianOperator, StateLayout};

/// Integrator selected by `solver.ode_solver_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdeScheme {
    ForwardEuler,
    Rk2Midpoint,
    Rk3Ssp,
    Rk4,
    Rk2Average,
}

impl OdeScheme {
    pub fn from_code(code: u32) -> SimResult<Self> {
        match code {
            1 => Ok(Self::ForwardEuler),
            2 => Ok(Self::Rk2Midpoint),
            3 => Ok(Self::Rk3Ssp),
            4 => Ok(Self::Rk4),
            7 => Ok(Self::Rk2Average),
            other => Err(SimError::unknown("ODE solver", other)),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::ForwardEuler => 1,
            Self::Rk2Midpoint => 2,
            Self::Rk3Ssp => 3,
            Self::Rk4 => 4,
            Self::Rk2Average => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ForwardEuler => "Forward Euler",
            Self::Rk2Midpoint => "RK2 midpoint",
            Self::Rk3Ssp => "RK3 SSP",
            Self::Rk4 => "RK4",
            Self::Rk2Average => "RK2 average",
        }
    }
}

/// Stage storage plus the scheme; owned by the driver
pub struct TimeIntegrator {
    scheme: OdeScheme,
    base: GlobalState,
    stage: GlobalState,
    rate: GlobalState,
    accum: GlobalState,
    averaged_velocity: Vec<f64>,
}

impl TimeIntegrator {
    pub fn new(scheme: OdeScheme, layout: StateLayout) -> Self {
        Self {
            scheme,
            base: GlobalState::zeros(layout),
            stage: GlobalState::zeros(layout),
            rate: GlobalState::zeros(layout),
            accum: GlobalState::zeros(layout),
            averaged_velocity: vec![0.0; layout.kinematic_len()],
        }
    }

    pub fn scheme(&self) -> OdeScheme {
        self.scheme
    }

    /// Resize the stage buffers when the layout changed
    fn prepare(&mut self, layout: StateLayout) {
        if self.base.layout() != layout {
            *self = Self::new(self.scheme, layout);
        }
    }

    /// Advance `state` from `t` to `t + dt`
    pub fn step(
        &mut self,
        op: &mut LagrangianOperator,
        state: &mut GlobalState,
        t: &mut f64,
        dt: f64,
    ) -> SimResult<()> {
        self.prepare(state.layout());
        match self.scheme {
            OdeScheme::ForwardEuler => {
                op.mult(state, &mut self.rate)?;
                state.axpy(dt, &self.rate);
            }
            OdeScheme::Rk2Midpoint => {
                self.base.copy_from(state);
                op.mult(&self.base, &mut self.rate)?;
                self.stage.assign_axpy(&self.base, 0.5 * dt, &self.rate);
                op.mult(&self.stage, &mut self.rate)?;
                state.assign_axpy(&self.base, dt, &self.rate);
            }
            OdeScheme::Rk3Ssp => {
                // Shu-Osher form
                op.mult(state, &mut self.rate)?;
                self.stage.assign_axpy(state, dt, &self.rate);

                op.mult(&self.stage, &mut self.rate)?;
                self.stage.axpy(dt, &self.rate);
                self.stage.blend(0.25, 0.75, state);

                op.mult(&self.stage, &mut self.rate)?;
                self.stage.axpy(dt, &self.rate);
                state.blend(1.0 / 3.0, 2.0 / 3.0, &self.stage);
            }
            OdeScheme::Rk4 => {
                self.base.copy_from(state);
                op.mult(&self.base, &mut self.rate)?;
                self.accum.copy_from(&self.rate);

                self.stage.assign_axpy(&self.base, 0.5 * dt, &self.rate);
                op.mult(&self.stage, &mut self.rate)?;
                self.accum.axpy(2.0, &self.rate);

                self.stage.assign_axpy(&self.base, 0.5 * dt, &self.rate);
                op.mult(&self.stage, &mut self.rate)?;
                self.accum.axpy(2.0, &self.rate);

                self.stage.assign_axpy(&self.base, dt, &self.rate);
                op.mult(&self.stage, &mut self.rate)?;
                self.accum.axpy(1.0, &self.rate);

                state.assign_axpy(&self.base, dt / 6.0, &self.accum);
            }
            OdeScheme::Rk2Average => self.rk2_average(op, state, dt)?,
        }
        *t += dt;
        Ok(())
    }

    /// Predictor to t + dt/2, corrector to t + dt; both stages use
    /// V = v0 + dt/2 · dv evaluated at the current stage
    fn rk2_average(&mut self, op: &mut LagrangianOperator, state: &mut GlobalState, dt: f64) -> SimResult<()> {
        self.base.copy_from(state);
        for stage_dt in [0.5 * dt, dt] {
            op.reset_quadrature_data();
            op.bind_mesh_nodes(state)?;
            op.solve_velocity(state, &mut self.rate)?;

            for ((va, v0), dv) in self
                .averaged_velocity
                .iter_mut()
                .zip(self.base.velocity())
                .zip(self.rate.velocity())
            {
                *va = v0 + 0.5 * dt * dv;
            }
            op.solve_energy(state, &self.averaged_velocity, &mut self.rate)?;
            op.solve_stress(state, &mut self.rate)?;
            self.rate.position_mut().copy_from_slice(&self.averaged_velocity);
            self.rate.initial_position_mut().fill(0.0);

            state.assign_axpy(&self.base, stage_dt, &self.rate);
        }
        op.reset_quadrature_data();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::{DofManager, KernelDispatch, QuadratureOrder};
    use crate::hydro::{KernelSettings, OperatorSettings};
    use crate::mechanics::{MaterialTable, MaterialZoneParameters};
    use crate::mesh_generator::MeshGenerator;
    use approx::assert_relative_eq;

    fn operator() -> LagrangianOperator {
        let mesh = MeshGenerator::generate_rectangle(2, 2, 2.0, 2.0).unwrap();
        let dofs = DofManager::new(mesh.num_nodes(), 2);
        let materials = MaterialTable::uniform(MaterialZoneParameters::elastic(1.0, 1.0, 1.0)).unwrap();
        let settings = OperatorSettings {
            kernel: KernelSettings {
                use_viscosity: false,
                ..KernelSettings::default()
            },
            cg_tol: 1e-12,
            ..OperatorSettings::default()
        };
        LagrangianOperator::new(mesh, dofs, materials, KernelDispatch::Plane(QuadratureOrder::Two), settings)
            .unwrap()
    }

    #[test]
    fn test_codes() {
        for code in [1, 2, 3, 4, 7] {
            assert_eq!(OdeScheme::from_code(code).unwrap().code(), code);
        }
        for code in [0, 5, 6, 8] {
            assert!(matches!(OdeScheme::from_code(code), Err(SimError::UnknownOption { .. })));
        }
    }

    #[test]
    fn test_translation_is_exact_for_every_scheme() {
        for code in [1, 2, 3, 4, 7] {
            let mut op = operator();
            let mut state = op.new_state();
            let n = op.layout().num_nodes;
            state.velocity_mut()[..n].fill(0.5);
            let x_before = state.position().to_vec();

            let mut integrator = TimeIntegrator::new(OdeScheme::from_code(code).unwrap(), op.layout());
            let mut t = 1.0;
            integrator.step(&mut op, &mut state, &mut t, 0.2).unwrap();

            assert_relative_eq!(t, 1.2);
            for node in 0..n {
                assert_relative_eq!(state.position()[node], x_before[node] + 0.1, epsilon = 1e-12);
                assert_relative_eq!(state.position()[n + node], x_before[n + node], epsilon = 1e-12);
            }
            assert!(state.energy().iter().all(|e| e.abs() < 1e-12));
            assert!(!op.is_quadrature_data_current());
        }
    }

    #[test]
    fn test_rk2_average_conserves_energy() {
        let mut op = operator();
        let mut state = op.new_state();
        let n = op.layout().num_nodes;
        // Stretch the mesh about its center so the cells do work
        for node in 0..n {
            state.velocity_mut()[node] = 0.01 * (state.position()[node] - 1.0);
            state.velocity_mut()[n + node] = -0.02 * (state.position()[n + node] - 1.0);
        }
        state.energy_mut().fill(0.5);
        let before = op.total_energy(&state);

        let mut integrator = TimeIntegrator::new(OdeScheme::Rk2Average, op.layout());
        let mut t = 0.0;
        for _ in 0..5 {
            integrator.step(&mut op, &mut state, &mut t, 0.05).unwrap();
        }
        assert_relative_eq!(op.total_energy(&state), before, epsilon = 1e-10);
    }
}
