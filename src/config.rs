//! Configuration management for explicit Lagrangian simulations
//!
//! Reads TOML configuration files into typed sections. Every field carries a
//! serde default so partial files are valid; `validate` performs the checks
//! that do not need the mesh, and the material table repeats the per-material
//! checks once the mesh ids are known.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::bc::BoundaryCode;
use crate::error::{SimError, SimResult};
use crate::fem::KernelDispatch;
use crate::timestepping::OdeScheme;
use crate::utils::{years_to_seconds, VelocityUnit};

/// Final time used when the run is bounded by a step count only
pub const UNBOUNDED_FINAL_TIME: f64 = 1.0e38;

/// Main simulation configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub sim: SimConfig,
    pub mesh: MeshConfig,
    pub solver: SolverConfig,
    pub control: ControlConfig,
    pub bc: BcConfig,
    pub mat: MatConfig,
    pub remesh: RemeshConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimConfig {
    /// Spatial dimension (2 or 3)
    pub dim: usize,
    /// Final time (seconds, or years when `year` is set)
    pub t_final: f64,
    /// Stop after this many accepted steps (lifts the final time)
    pub max_tsteps: Option<usize>,
    /// `t_final` is given in years
    pub year: bool,
    /// Log/checkpoint every N accepted steps
    pub vis_steps: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dim: 2,
            t_final: 1.0,
            max_tsteps: None,
            year: false,
            vis_steps: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MeshConfig {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Domain length in x (m)
    pub lx: f64,
    /// Domain length in y (m)
    pub ly: f64,
    /// Domain length in z (m), 3-D only
    pub lz: f64,
    /// Gauss points per direction (2, 3 or 4)
    pub quad_points: usize,
    /// Kinematic polynomial order (continuous Q_p)
    pub order_v: usize,
    /// Thermodynamic polynomial order (discontinuous Q_r)
    pub order_e: usize,
    /// Vertical coordinates of material interfaces, ascending
    pub layer_interfaces: Vec<f64>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            nx: 20,
            ny: 4,
            nz: 1,
            lx: 100.0e3,
            ly: 10.0e3,
            lz: 10.0e3,
            quad_points: 4,
            order_v: 2,
            order_e: 1,
            layer_interfaces: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SolverConfig {
    /// 1 ForwardEuler, 2 RK2, 3 RK3-SSP, 4 RK4, 7 RK2-average
    pub ode_solver_type: u32,
    pub cfl: f64,
    pub cg_tol: f64,
    pub cg_max_iter: usize,
    /// Artificial viscosity on/off
    pub impose_visc: bool,
    /// Scale the linear viscosity term by |div v| / |grad v|
    pub use_vorticity: bool,
    /// Jaumann spin terms in the stress rate (experimental)
    pub corotational: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            ode_solver_type: 7,
            cfl: 0.5,
            cg_tol: 1.0e-10,
            cg_max_iter: 300,
            impose_visc: true,
            use_vorticity: false,
            corotational: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// dt used when the initial stable estimate is unbounded (s)
    pub init_dt: f64,
    /// Gravitational acceleration (m/s²), acting along -last axis
    pub gravity: f64,
    /// Height of the free surface for the lithostatic column (m)
    pub thickness: f64,
    /// Start from a lithostatic stress state
    pub lithostatic: bool,
    /// Apply gravity as a body force in the momentum balance
    pub body_force: bool,
    /// Velocity-direction damping of the nodal force
    pub dyn_damping: bool,
    pub dyn_factor: f64,
    /// Uniform initial specific internal energy (J/kg)
    pub initial_energy: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            init_dt: 1.0,
            gravity: 10.0,
            thickness: 10.0e3,
            lithostatic: true,
            body_force: true,
            dyn_damping: true,
            dyn_factor: 0.8,
            initial_energy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BcConfig {
    /// "cm/yr", "mm/yr", "m/yr" or "m/s"
    pub bc_unit: String,
    /// One code per boundary attribute (0 = free); empty leaves every boundary free
    pub bc_ids: Vec<u32>,
    pub bc_vxs: Vec<f64>,
    pub bc_vys: Vec<f64>,
    pub bc_vzs: Vec<f64>,
}

impl Default for BcConfig {
    fn default() -> Self {
        Self {
            bc_unit: "cm/yr".to_string(),
            bc_ids: Vec::new(),
            bc_vxs: Vec::new(),
            bc_vys: Vec::new(),
            bc_vzs: Vec::new(),
        }
    }
}

/// Per-material parameter lists, indexed by material id - 1
///
/// A single-entry list applies to every material.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatConfig {
    pub plastic: bool,
    pub viscoplastic: bool,
    pub rho: Vec<f64>,
    pub lambda: Vec<f64>,
    pub mu: Vec<f64>,
    pub gamma: Vec<f64>,
    pub tension_cutoff: Vec<f64>,
    pub cohesion0: Vec<f64>,
    pub cohesion1: Vec<f64>,
    /// Degrees
    pub friction_angle0: Vec<f64>,
    pub friction_angle1: Vec<f64>,
    pub dilation_angle0: Vec<f64>,
    pub dilation_angle1: Vec<f64>,
    pub pls0: Vec<f64>,
    pub pls1: Vec<f64>,
    /// Pa·s
    pub plastic_viscosity: Vec<f64>,
    pub weak_rad: f64,
    pub weak_x: f64,
    pub weak_y: f64,
    pub weak_z: f64,
    pub ini_pls: f64,
}

impl Default for MatConfig {
    fn default() -> Self {
        Self {
            plastic: true,
            viscoplastic: false,
            rho: vec![2700.0],
            lambda: vec![3.0e10],
            mu: vec![3.0e10],
            gamma: vec![1.4],
            tension_cutoff: vec![0.0],
            cohesion0: vec![44.0e6],
            cohesion1: vec![44.0e6],
            friction_angle0: vec![30.0],
            friction_angle1: vec![30.0],
            dilation_angle0: vec![0.0],
            dilation_angle1: vec![0.0],
            pls0: vec![0.0],
            pls1: vec![0.5],
            plastic_viscosity: vec![1.0],
            weak_rad: 1.0e3,
            weak_x: 50.0e3,
            weak_y: 2.0e3,
            weak_z: 0.0,
            ini_pls: 0.5,
        }
    }
}

impl MatConfig {
    /// Every per-material list with its key, for validation and lookup
    pub fn lists(&self) -> [(&'static str, &[f64]); 14] {
        [
            ("rho", self.rho.as_slice()),
            ("lambda", self.lambda.as_slice()),
            ("mu", self.mu.as_slice()),
            ("gamma", self.gamma.as_slice()),
            ("tension_cutoff", self.tension_cutoff.as_slice()),
            ("cohesion0", self.cohesion0.as_slice()),
            ("cohesion1", self.cohesion1.as_slice()),
            ("friction_angle0", self.friction_angle0.as_slice()),
            ("friction_angle1", self.friction_angle1.as_slice()),
            ("dilation_angle0", self.dilation_angle0.as_slice()),
            ("dilation_angle1", self.dilation_angle1.as_slice()),
            ("pls0", self.pls0.as_slice()),
            ("pls1", self.pls1.as_slice()),
            ("plastic_viscosity", self.plastic_viscosity.as_slice()),
        ]
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemeshConfig {
    pub enabled: bool,
    /// Remesh every N accepted steps
    pub remesh_steps: usize,
    /// Also remesh when dt falls below this fraction of the first dt
    pub time_reduction: f64,
    pub smoothing_iterations: usize,
    pub smoothing_alpha: f64,
}

impl Default for RemeshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remesh_steps: 50000,
            time_reduction: 0.0,
            smoothing_iterations: 5,
            smoothing_alpha: 0.5,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> SimResult<Self> {
        toml::from_str(contents).map_err(|e| SimError::Parse(e.to_string()))
    }

    /// Checks that do not depend on the generated mesh
    pub fn validate(&self) -> SimResult<()> {
        let dim = self.sim.dim;
        KernelDispatch::resolve(dim, self.mesh.quad_points)?;
        OdeScheme::from_code(self.solver.ode_solver_type)?;
        VelocityUnit::parse(&self.bc.bc_unit)?;
        for &code in &self.bc.bc_ids {
            BoundaryCode::from_code(dim, code)?;
        }
        if self.mesh.order_v == 0 {
            return Err(SimError::unknown("kinematic order", self.mesh.order_v));
        }
        let m = &self.mesh;
        if m.quad_points < m.order_v + 1 || m.quad_points < m.order_e + 1 {
            return Err(SimError::InvalidConfig(format!(
                "mesh.quad_points = {} is too few for order_v = {} and order_e = {}",
                m.quad_points, m.order_v, m.order_e
            )));
        }

        let positive = [
            ("sim.t_final", self.sim.t_final),
            ("solver.cfl", self.solver.cfl),
            ("solver.cg_tol", self.solver.cg_tol),
            ("control.init_dt", self.control.init_dt),
            ("mesh.lx", self.mesh.lx),
            ("mesh.ly", self.mesh.ly),
        ];
        for (key, value) in positive {
            if !(value > 0.0) {
                return Err(SimError::InvalidConfig(format!("{key} must be positive, got {value}")));
            }
        }
        if dim == 3 && !(self.mesh.lz > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "mesh.lz must be positive, got {}",
                self.mesh.lz
            )));
        }
        if self.solver.cfl > 1.0 {
            return Err(SimError::InvalidConfig(format!(
                "solver.cfl must not exceed 1, got {}",
                self.solver.cfl
            )));
        }
        if self.sim.vis_steps == 0 {
            return Err(SimError::InvalidConfig("sim.vis_steps must be at least 1".into()));
        }
        if self.remesh.enabled && self.remesh.remesh_steps == 0 {
            return Err(SimError::InvalidConfig("remesh.remesh_steps must be at least 1".into()));
        }

        let n_bc = self.bc.bc_ids.len();
        for (key, list) in [("bc_vxs", &self.bc.bc_vxs), ("bc_vys", &self.bc.bc_vys), ("bc_vzs", &self.bc.bc_vzs)] {
            if !list.is_empty() && list.len() != n_bc {
                return Err(SimError::InvalidConfig(format!(
                    "bc.{key} has {} entries but bc.bc_ids has {n_bc}",
                    list.len()
                )));
            }
        }

        for (key, list) in self.mat.lists() {
            if list.is_empty() {
                return Err(SimError::InvalidMaterial(format!("mat.{key} is empty")));
            }
        }
        Ok(())
    }

    /// End time of the run in seconds
    pub fn final_time(&self) -> f64 {
        if self.sim.max_tsteps.is_some() {
            UNBOUNDED_FINAL_TIME
        } else if self.sim.year {
            years_to_seconds(self.sim.t_final)
        } else {
            self.sim.t_final
        }
    }

    /// Log a configuration summary
    pub fn print_summary(&self) {
        let m = &self.mesh;
        info!("═══════════════════════════════════════════════════════════════");
        info!("  Simulation Configuration");
        info!("═══════════════════════════════════════════════════════════════");
        if self.sim.dim == 2 {
            info!("Domain: {:.1} × {:.1} km, {} × {} cells", m.lx / 1e3, m.ly / 1e3, m.nx, m.ny);
        } else {
            info!(
                "Domain: {:.1} × {:.1} × {:.1} km, {} × {} × {} cells",
                m.lx / 1e3, m.ly / 1e3, m.lz / 1e3, m.nx, m.ny, m.nz
            );
        }
        info!(
            "  Q{}-Q{} elements, {} Gauss points per direction",
            m.order_v, m.order_e, m.quad_points
        );
        match self.sim.max_tsteps {
            Some(n) => info!("Run: {} steps", n),
            None if self.sim.year => info!("Run: {:.3e} yr", self.sim.t_final),
            None => info!("Run: {:.3e} s", self.sim.t_final),
        }
        info!(
            "Solver: ode={} cfl={} cg_tol={:.1e} visc={} corotational={}",
            self.solver.ode_solver_type,
            self.solver.cfl,
            self.solver.cg_tol,
            self.solver.impose_visc,
            self.solver.corotational
        );
        info!(
            "Boundary codes: {:?} ({})",
            self.bc.bc_ids, self.bc.bc_unit
        );
        info!(
            "Materials: rho={:?} plastic={} viscoplastic={}",
            self.mat.rho, self.mat.plastic, self.mat.viscoplastic
        );
        if self.remesh.enabled {
            info!(
                "Remesh: every {} steps, time reduction {}",
                self.remesh.remesh_steps, self.remesh.time_reduction
            );
        }
        info!("═══════════════════════════════════════════════════════════════");
    }
}
