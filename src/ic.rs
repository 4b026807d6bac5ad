//! Initial Conditions Module
//!
//! This module fills the state vector before the first step:
//! - Node positions and the frozen initial positions
//! - Prescribed boundary velocities
//! - Uniform specific internal energy
//! - Lithostatic initial stress
//! - Weak-zone seeding of the accumulated plastic strain

use crate::config::SimulationConfig;
use crate::fem::{DofManager, ReferenceElement};
use crate::hydro::{GlobalState, LagrangianOperator};
use crate::mechanics::strain::{stress_components, sym_index};
use crate::mechanics::MaterialTable;
use crate::mesh::{Mesh, PlasticityState};

/// Lithostatic stress at the thermodynamic dofs
///
/// Every diagonal component is -|thickness - y| ρ g, with y the vertical
/// (last) coordinate of the dof's physical location and ρ the density of the
/// cell's material. Off-diagonal components are left untouched.
///
/// # Arguments
/// * `mesh` - Computational mesh
/// * `reference` - Reference element locating the dofs inside each cell
/// * `materials` - Zone table supplying ρ
/// * `gravity` - Gravitational acceleration (m/s²)
/// * `thickness` - Vertical coordinate of the free surface (m)
/// * `stress` - Packed stress block, component-major (modified in place)
pub fn initialize_lithostatic_stress(
    mesh: &Mesh,
    reference: &ReferenceElement,
    materials: &MaterialTable,
    gravity: f64,
    thickness: f64,
    stress: &mut [f64],
) {
    let dim = mesh.dim;
    let nde = reference.thermo_dofs();
    let ndofs = mesh.num_cells() * nde;
    debug_assert_eq!(stress.len(), stress_components(dim) * ndofs);

    for (e, cell) in mesh.connectivity.cells.iter().enumerate() {
        let rho = materials.zone(cell.attribute).rho;
        for (j, point) in reference.thermo_dof_points(mesh, e).iter().enumerate() {
            let sigma = -(thickness - point[dim - 1]).abs() * rho * gravity;
            for d in 0..dim {
                stress[sym_index(dim, d, d) * ndofs + e * nde + j] = sigma;
            }
        }
    }
}

/// Seed `ini_pls` into every thermodynamic dof lying within `radius` of `center`
///
/// Only the first `dim` coordinates of `center` are used.
///
/// # Returns
/// Number of seeded dofs
pub fn seed_weak_zone(
    mesh: &Mesh,
    reference: &ReferenceElement,
    center: [f64; 3],
    radius: f64,
    ini_pls: f64,
    plastic: &mut PlasticityState,
) -> usize {
    if radius <= 0.0 {
        return 0;
    }
    let nde = reference.thermo_dofs();
    let mut seeded = 0;
    for e in 0..mesh.num_cells() {
        for (j, point) in reference.thermo_dof_points(mesh, e).iter().enumerate() {
            let dist2: f64 = (0..mesh.dim).map(|d| (point[d] - center[d]).powi(2)).sum();
            if dist2 <= radius * radius {
                plastic.set(e * nde + j, ini_pls);
                seeded += 1;
            }
        }
    }
    seeded
}

/// Copy the prescribed velocities of the DOF manager into the velocity block
pub fn impose_boundary_velocities(dofs: &DofManager, velocity: &mut [f64]) {
    for (dof, value) in dofs.dirichlet() {
        velocity[dof] = value;
    }
}

/// State and plastic strain at t = 0 for the operator's mesh
pub fn initialize_state(op: &LagrangianOperator, config: &SimulationConfig) -> (GlobalState, PlasticityState) {
    let mesh = op.mesh();
    let mut state = op.new_state();
    let mut plastic = PlasticityState::new(op.layout().num_thermo());

    impose_boundary_velocities(op.dofs(), state.velocity_mut());
    state.energy_mut().fill(config.control.initial_energy);

    if config.control.lithostatic {
        initialize_lithostatic_stress(
            mesh,
            op.reference(),
            op.materials(),
            config.control.gravity,
            config.control.thickness,
            state.stress_mut(),
        );
    }

    let mat = &config.mat;
    seed_weak_zone(
        mesh,
        op.reference(),
        [mat.weak_x, mat.weak_y, mat.weak_z],
        mat.weak_rad,
        mat.ini_pls,
        &mut plastic,
    );

    (state, plastic)
}
