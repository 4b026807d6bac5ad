//! Remeshing between accepted steps
//!
//! A remesher looks at the current configuration and may return new node
//! positions. Topology is preserved, so velocity, energy, stress and plastic
//! strain stay attached to the same node/cell indices; the operator then
//! rebuilds its reference geometry on the new positions.

use tracing::{debug, warn};

use crate::error::SimResult;
use crate::fem::DofManager;
use crate::hydro::GlobalState;
use crate::mesh::{assess_mesh_quality, build_node_neighbors, smooth_laplacian, Mesh, MeshQuality, PlasticityState};

/// Output of a successful remesh
#[derive(Debug, Clone)]
pub struct RemeshedFields {
    /// New node coordinates, component blocks
    pub positions: Vec<f64>,
    pub quality_before: MeshQuality,
    pub quality_after: MeshQuality,
}

pub trait Remesher {
    /// `Ok(None)` leaves the mesh untouched
    fn remesh(
        &mut self,
        mesh: &Mesh,
        dofs: &DofManager,
        state: &GlobalState,
        plastic: &PlasticityState,
    ) -> SimResult<Option<RemeshedFields>>;

    fn name(&self) -> &'static str;
}

/// Never changes the mesh
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemesh;

impl Remesher for NoRemesh {
    fn remesh(
        &mut self,
        _mesh: &Mesh,
        _dofs: &DofManager,
        _state: &GlobalState,
        _plastic: &PlasticityState,
    ) -> SimResult<Option<RemeshedFields>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Laplacian smoothing of the interior nodes
///
/// Boundary-attribute nodes and every node carrying a prescribed velocity
/// stay in place, so the domain outline and the kinematic constraints are
/// unchanged. A smoothing pass that inverts or collapses a cell is discarded.
#[derive(Debug, Clone, Copy)]
pub struct SmoothingRemesher {
    pub iterations: usize,
    pub alpha: f64,
}

impl SmoothingRemesher {
    pub fn new(iterations: usize, alpha: f64) -> Self {
        Self { iterations, alpha }
    }
}

impl Remesher for SmoothingRemesher {
    fn remesh(
        &mut self,
        mesh: &Mesh,
        dofs: &DofManager,
        state: &GlobalState,
        _plastic: &PlasticityState,
    ) -> SimResult<Option<RemeshedFields>> {
        let mut work = mesh.clone();
        work.bind_nodes(state.position())?;
        let quality_before = assess_mesh_quality(&work);

        let mut fixed = work.connectivity.all_boundary_nodes();
        let n = work.num_nodes();
        fixed.extend(dofs.dirichlet().map(|(dof, _)| dof % n));

        let neighbors = build_node_neighbors(&work);
        smooth_laplacian(&mut work.geometry, &neighbors, &fixed, self.iterations, self.alpha);
        let quality_after = assess_mesh_quality(&work);

        if !quality_after.is_acceptable() {
            warn!("Smoothing left a degenerate mesh ({}); keeping the current one", quality_after.report());
            return Ok(None);
        }
        debug!(
            "Smoothed mesh: min scaled Jacobian {:.3} -> {:.3}",
            quality_before.min_scaled_jacobian, quality_after.min_scaled_jacobian
        );
        Ok(Some(RemeshedFields {
            positions: work.positions(),
            quality_before,
            quality_after,
        }))
    }

    fn name(&self) -> &'static str {
        "laplacian smoothing"
    }
}
