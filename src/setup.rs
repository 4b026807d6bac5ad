//! Assemble a ready-to-run simulation from a validated configuration

use tracing::info;

use crate::bc::{print_bc_summary, setup_boundary_conditions};
use crate::config::SimulationConfig;
use crate::error::SimResult;
use crate::fem::{DofManager, KernelDispatch};
use crate::hydro::{KernelSettings, LagrangianOperator, OperatorSettings};
use crate::ic::initialize_state;
use crate::mechanics::{MaterialTable, MohrCoulomb};
use crate::mesh::{assess_mesh_quality, Mesh};
use crate::mesh_generator::MeshGenerator;
use crate::remesh::SmoothingRemesher;
use crate::timestepping::{AdaptiveDriver, DriverSettings, OdeScheme, TimeIntegrator};

/// Structured box of order-`order_v` cells with layered material ids
pub fn build_mesh(config: &SimulationConfig) -> SimResult<Mesh> {
    let m = &config.mesh;
    let mut mesh = match config.sim.dim {
        3 => MeshGenerator::generate_box_with_order(m.nx, m.ny, m.nz, m.lx, m.ly, m.lz, m.order_v)?,
        _ => MeshGenerator::generate_rectangle_with_order(m.nx, m.ny, m.lx, m.ly, m.order_v)?,
    };
    MeshGenerator::assign_layers(&mut mesh, &m.layer_interfaces)?;
    Ok(mesh)
}

pub fn operator_settings(config: &SimulationConfig) -> OperatorSettings {
    let s = &config.solver;
    let c = &config.control;
    OperatorSettings {
        kernel: KernelSettings {
            cfl: s.cfl,
            use_viscosity: s.impose_visc,
            use_vorticity: s.use_vorticity,
            corotational: s.corotational,
            kinematic_order: config.mesh.order_v,
        },
        thermo_order: config.mesh.order_e,
        cg_tol: s.cg_tol,
        cg_max_iter: s.cg_max_iter,
        damping: c.dyn_damping.then_some(c.dyn_factor),
        gravity: (c.body_force && c.gravity != 0.0).then_some(c.gravity),
    }
}

pub fn driver_settings(config: &SimulationConfig) -> DriverSettings {
    DriverSettings {
        t_final: config.final_time(),
        max_steps: config.sim.max_tsteps,
        init_dt: config.control.init_dt,
        initial_dt: None,
        vis_steps: config.sim.vis_steps,
        remesh_steps: config.remesh.enabled.then_some(config.remesh.remesh_steps),
        time_reduction: config.remesh.time_reduction,
        report_in_years: config.sim.year,
    }
}

/// Validate `config`, build mesh, materials, boundary conditions, operator
/// and initial state, and wire them into a driver
pub fn build_simulation(config: &SimulationConfig) -> SimResult<AdaptiveDriver> {
    config.validate()?;
    let dim = config.sim.dim;
    let dispatch = KernelDispatch::resolve(dim, config.mesh.quad_points)?;
    let scheme = OdeScheme::from_code(config.solver.ode_solver_type)?;

    let mesh = build_mesh(config)?;
    let quality = assess_mesh_quality(&mesh);
    info!("Mesh: {} nodes, {} cells; {}", mesh.num_nodes(), mesh.num_cells(), quality.report());

    let materials = MaterialTable::from_config(&config.mat, &mesh.connectivity.material_ids())?;
    info!("Materials: {} zone(s)", materials.num_materials());

    let mut dofs = DofManager::new(mesh.num_nodes(), dim);
    setup_boundary_conditions(&config.bc, &mesh, &mut dofs)?;
    print_bc_summary(&config.bc, dim);
    info!(
        "Velocity DOFs: {} free, {} prescribed",
        dofs.num_free_dofs(),
        dofs.num_constrained_dofs()
    );

    let op = LagrangianOperator::new(mesh, dofs, materials, dispatch, operator_settings(config))?;
    let (state, plastic) = initialize_state(&op, config);
    let integrator = TimeIntegrator::new(scheme, op.layout());
    info!("Time integrator: {}", scheme.name());

    let mut driver = AdaptiveDriver::new(op, state, plastic, integrator, driver_settings(config))?;
    if config.mat.plastic {
        driver = driver.with_plasticity(Box::new(MohrCoulomb::new(config.mat.viscoplastic)));
    }
    if config.remesh.enabled {
        driver = driver.with_remesher(Box::new(SmoothingRemesher::new(
            config.remesh.smoothing_iterations,
            config.remesh.smoothing_alpha,
        )));
    }
    Ok(driver)
}
