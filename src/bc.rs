//! Boundary Condition Module
//!
//! Maps the per-attribute codes of the `[bc]` section onto constrained
//! velocity components. A constrained component keeps its prescribed velocity
//! for the whole run: the velocity sub-solve forces its acceleration to zero.

use tracing::info;

use crate::config::BcConfig;
use crate::error::{SimError, SimResult};
use crate::fem::DofManager;
use crate::mesh::Mesh;
use crate::utils::VelocityUnit;

/// Which velocity components a boundary code constrains
///
/// | code | 2-D  | 3-D  |
/// |------|------|------|
/// | 0    | free | free |
/// | 1    | x    | x    |
/// | 2    | y    | y    |
/// | 3    | x, y | z    |
/// | 4    |      | all  |
/// | 5    |      | x, y |
/// | 6    |      | x, z |
/// | 7    |      | y, z |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryCode {
    Free,
    X,
    Y,
    Z,
    All,
    XY,
    XZ,
    YZ,
}

impl BoundaryCode {
    pub fn from_code(dim: usize, code: u32) -> SimResult<Self> {
        match (dim, code) {
            (_, 0) => Ok(BoundaryCode::Free),
            (_, 1) => Ok(BoundaryCode::X),
            (_, 2) => Ok(BoundaryCode::Y),
            (2, 3) => Ok(BoundaryCode::All),
            (3, 3) => Ok(BoundaryCode::Z),
            (3, 4) => Ok(BoundaryCode::All),
            (3, 5) => Ok(BoundaryCode::XY),
            (3, 6) => Ok(BoundaryCode::XZ),
            (3, 7) => Ok(BoundaryCode::YZ),
            _ => Err(SimError::unknown("boundary code", format!("{code} (dim = {dim})"))),
        }
    }

    /// Constrained component indices, ascending
    pub fn components(self, dim: usize) -> Vec<usize> {
        match self {
            BoundaryCode::Free => vec![],
            BoundaryCode::X => vec![0],
            BoundaryCode::Y => vec![1],
            BoundaryCode::Z => vec![2],
            BoundaryCode::All => (0..dim).collect(),
            BoundaryCode::XY => vec![0, 1],
            BoundaryCode::XZ => vec![0, 2],
            BoundaryCode::YZ => vec![1, 2],
        }
    }
}

/// Constrain the velocity DOFs of every coded boundary
///
/// `bc_ids[i]` applies to boundary attribute `i + 1`, with velocity
/// `(bc_vxs[i], bc_vys[i], bc_vzs[i])` converted from `bc_unit` to m/s.
/// Nodes shared by two boundaries take the value of the higher attribute.
/// An empty `bc_ids` leaves every boundary free.
pub fn setup_boundary_conditions(bc: &BcConfig, mesh: &Mesh, dof_mgr: &mut DofManager) -> SimResult<()> {
    if bc.bc_ids.is_empty() {
        return Ok(());
    }

    let max_attr = mesh.connectivity.max_boundary_attribute();
    if bc.bc_ids.len() != max_attr {
        return Err(SimError::InvalidConfig(format!(
            "bc.bc_ids has {} entries but the mesh has {} boundary attributes",
            bc.bc_ids.len(),
            max_attr
        )));
    }

    let scale = VelocityUnit::parse(&bc.bc_unit)?.to_si();
    let dim = mesh.dim;

    for (i, &code) in bc.bc_ids.iter().enumerate() {
        let code = BoundaryCode::from_code(dim, code)?;
        let Some(nodes) = mesh.connectivity.boundary_nodes.get(&(i + 1)) else {
            continue;
        };
        let velocity = [
            component_value(&bc.bc_vxs, i),
            component_value(&bc.bc_vys, i),
            component_value(&bc.bc_vzs, i),
        ];
        for comp in code.components(dim) {
            apply_velocity_bc(dof_mgr, nodes, comp, velocity[comp] * scale);
        }
    }
    Ok(())
}

fn component_value(list: &[f64], i: usize) -> f64 {
    list.get(i).copied().unwrap_or(0.0)
}

/// Apply velocity boundary condition to a set of nodes
fn apply_velocity_bc(dof_mgr: &mut DofManager, nodes: &[usize], component: usize, value: f64) {
    for &node_id in nodes {
        dof_mgr.set_dirichlet_component(node_id, component, value);
    }
}

/// Log the boundary assignment
pub fn print_bc_summary(bc: &BcConfig, dim: usize) {
    info!("Boundary conditions ({}):", bc.bc_unit);
    for (i, &code) in bc.bc_ids.iter().enumerate() {
        match BoundaryCode::from_code(dim, code) {
            Ok(BoundaryCode::Free) => info!("  attribute {}: free", i + 1),
            Ok(c) => info!(
                "  attribute {}: {:?} fixed, v = ({}, {}, {})",
                i + 1,
                c,
                component_value(&bc.bc_vxs, i),
                component_value(&bc.bc_vys, i),
                component_value(&bc.bc_vzs, i)
            ),
            Err(e) => info!("  attribute {}: {}", i + 1, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_generator::MeshGenerator;
    use approx::assert_relative_eq;

    #[test]
    fn test_code_tables() {
        assert_eq!(BoundaryCode::from_code(2, 3).unwrap().components(2), vec![0, 1]);
        assert_eq!(BoundaryCode::from_code(3, 3).unwrap().components(3), vec![2]);
        assert_eq!(BoundaryCode::from_code(3, 4).unwrap().components(3), vec![0, 1, 2]);
        assert_eq!(BoundaryCode::from_code(3, 6).unwrap().components(3), vec![0, 2]);
        assert_eq!(BoundaryCode::from_code(3, 7).unwrap().components(3), vec![1, 2]);
        assert!(BoundaryCode::from_code(2, 4).is_err());
        assert!(BoundaryCode::from_code(3, 8).is_err());
    }

    #[test]
    fn test_extension_setup() {
        // bottom y-fixed, right pulled, top free, left pulled
        let mesh = MeshGenerator::generate_rectangle(4, 2, 4.0, 2.0).unwrap();
        let bc = BcConfig {
            bc_unit: "m/s".into(),
            bc_ids: vec![2, 1, 0, 1],
            bc_vxs: vec![0.0, 1.0, 0.0, -1.0],
            bc_vys: vec![0.0; 4],
            bc_vzs: vec![],
        };
        let mut dof_mgr = DofManager::new(mesh.num_nodes(), 2);
        setup_boundary_conditions(&bc, &mesh, &mut dof_mgr).unwrap();

        // 3 right + 3 left x-constraints, 5 bottom y-constraints
        assert_eq!(dof_mgr.component_dirichlet_nodes(0).len(), 6);
        assert_eq!(dof_mgr.component_dirichlet_nodes(1).len(), 5);

        let right = &mesh.connectivity.boundary_nodes[&2];
        for &node in right {
            assert_relative_eq!(dof_mgr.get_dirichlet_value(dof_mgr.velocity_dof(node, 0)), 1.0);
        }
    }

    #[test]
    fn test_unit_conversion() {
        let mesh = MeshGenerator::generate_rectangle(1, 1, 1.0, 1.0).unwrap();
        let bc = BcConfig {
            bc_unit: "cm/yr".into(),
            bc_ids: vec![0, 1, 0, 0],
            bc_vxs: vec![0.0, 1.0, 0.0, 0.0],
            ..BcConfig::default()
        };
        let mut dof_mgr = DofManager::new(mesh.num_nodes(), 2);
        setup_boundary_conditions(&bc, &mesh, &mut dof_mgr).unwrap();
        let dof = dof_mgr.velocity_dof(1, 0);
        assert_relative_eq!(
            dof_mgr.get_dirichlet_value(dof),
            crate::utils::cm_per_year_to_m_per_s(1.0)
        );
    }

    #[test]
    fn test_attribute_count_mismatch() {
        let mesh = MeshGenerator::generate_rectangle(1, 1, 1.0, 1.0).unwrap();
        let bc = BcConfig {
            bc_ids: vec![1, 1],
            ..BcConfig::default()
        };
        let mut dof_mgr = DofManager::new(mesh.num_nodes(), 2);
        assert!(matches!(
            setup_boundary_conditions(&bc, &mesh, &mut dof_mgr),
            Err(SimError::InvalidConfig(_))
        ));
    }
}
