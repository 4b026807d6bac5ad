#![allow(dead_code)]

use geo_lagrangian::{
    AdaptiveDriver, DofManager, DriverSettings, GlobalState, KernelDispatch, KernelSettings, LagrangianOperator,
    MaterialTable, MaterialZoneParameters, Mesh, MeshGenerator, OdeScheme, OperatorSettings, PlasticityState,
    QuadratureOrder, TimeIntegrator,
};

fn inviscid() -> OperatorSettings {
    OperatorSettings {
        kernel: KernelSettings {
            use_viscosity: false,
            ..KernelSettings::default()
        },
        cg_tol: 1e-12,
        ..OperatorSettings::default()
    }
}

/// Unconstrained operator with unit material constants
pub fn operator_on(mesh: Mesh, dispatch: KernelDispatch, settings: OperatorSettings) -> LagrangianOperator {
    let dofs = DofManager::new(mesh.num_nodes(), mesh.dim);
    let materials = MaterialTable::uniform(MaterialZoneParameters::elastic(1.0, 1.0, 1.0)).unwrap();
    LagrangianOperator::new(mesh, dofs, materials, dispatch, settings).unwrap()
}

/// Inviscid operator on an nx × ny grid of unit cells with no constraints
pub fn free_operator(nx: usize, ny: usize) -> LagrangianOperator {
    let mesh = MeshGenerator::generate_rectangle(nx, ny, nx as f64, ny as f64).unwrap();
    operator_on(mesh, KernelDispatch::Plane(QuadratureOrder::Two), inviscid())
}

/// Inviscid Q2 kinematics with discontinuous Q1 energy and stress
pub fn quadratic_operator(nx: usize, ny: usize) -> LagrangianOperator {
    let mesh = MeshGenerator::generate_rectangle_with_order(nx, ny, nx as f64, ny as f64, 2).unwrap();
    let mut settings = inviscid();
    settings.kernel.kinematic_order = 2;
    settings.thermo_order = 1;
    operator_on(mesh, KernelDispatch::Plane(QuadratureOrder::Three), settings)
}

/// nx × 1 × 1 hexahedra of unit size with the given kernel switches
pub fn box_operator(nx: usize, kernel: KernelSettings) -> LagrangianOperator {
    let mesh = MeshGenerator::generate_box(nx, 1, 1, nx as f64, 1.0, 1.0).unwrap();
    let settings = OperatorSettings {
        kernel,
        cg_tol: 1e-12,
        ..OperatorSettings::default()
    };
    operator_on(mesh, KernelDispatch::Solid(QuadratureOrder::Two), settings)
}

/// Smooth shearing/rotating velocity with some internal energy
pub fn moving_state(op: &LagrangianOperator) -> GlobalState {
    let mut state = op.new_state();
    let n = op.layout().num_nodes;
    for node in 0..n {
        let x = state.position()[node];
        let y = state.position()[n + node];
        state.velocity_mut()[node] = 0.02 * y;
        state.velocity_mut()[n + node] = -0.01 * x + 0.005 * x * y;
        if op.layout().dim == 3 {
            let z = state.position()[2 * n + node];
            state.velocity_mut()[2 * n + node] = 0.01 * y - 0.015 * x * z;
        }
    }
    state.energy_mut().fill(1.0);
    state
}

/// RK2-average driver for `op` started from `moving_state`
pub fn driver_with(op: LagrangianOperator, settings: DriverSettings) -> AdaptiveDriver {
    let state = moving_state(&op);
    let plastic = PlasticityState::new(op.layout().num_thermo());
    let integrator = TimeIntegrator::new(OdeScheme::Rk2Average, op.layout());
    AdaptiveDriver::new(op, state, plastic, integrator, settings).unwrap()
}

pub fn driver_for(op: LagrangianOperator, t_final: f64) -> AdaptiveDriver {
    driver_with(
        op,
        DriverSettings {
            t_final,
            ..DriverSettings::default()
        },
    )
}

pub fn rk2_average_driver(nx: usize, ny: usize, t_final: f64) -> AdaptiveDriver {
    driver_for(free_operator(nx, ny), t_final)
}
