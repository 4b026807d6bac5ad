//! Mesh quality assessment and Laplacian smoothing
//!
//! Long Lagrangian runs distort the mesh until the stable step collapses;
//! the smoothing remesher uses these tools between accepted steps.

use std::collections::BTreeSet;

use nalgebra::{DMatrix, Point3};
use rayon::prelude::*;

use crate::fem::basis::LagrangeBasis;
use crate::mesh::geometry::Geometry;
use crate::mesh::Mesh;

/// Mesh quality statistics
#[derive(Debug, Clone)]
pub struct MeshQuality {
    /// Minimum scaled Jacobian over all cell corners (1 for a rectangle/box)
    pub min_scaled_jacobian: f64,
    /// Average of the per-cell minimum scaled Jacobian
    pub avg_scaled_jacobian: f64,
    /// Cells with a non-positive corner determinant
    pub num_inverted: usize,
    /// Cells whose minimum scaled Jacobian is below 0.1
    pub num_degenerate: usize,
    pub total_elements: usize,
}

impl MeshQuality {
    /// Check if mesh is acceptable for simulation
    pub fn is_acceptable(&self) -> bool {
        self.num_inverted == 0 && self.min_scaled_jacobian > 0.01
    }

    /// Human-readable quality report
    pub fn report(&self) -> String {
        format!(
            "Mesh Quality: min_SJ={:.3}, avg_SJ={:.3}, inverted={}/{}, degenerate={}/{}",
            self.min_scaled_jacobian,
            self.avg_scaled_jacobian,
            self.num_inverted,
            self.total_elements,
            self.num_degenerate,
            self.total_elements
        )
    }
}

/// Scaled Jacobian of a cell at each of its corners
///
/// det(J) divided by the product of the Jacobian column lengths, so the value
/// lies in [-1, 1] independently of the cell size. Non-positive values mean
/// the cell is inverted at that corner.
pub fn cell_corner_scaled_jacobians(mesh: &Mesh, cell_id: usize) -> Vec<f64> {
    let dim = mesh.dim;
    let basis = LagrangeBasis::new(dim, mesh.order);
    let nodes = &mesh.connectivity.cells[cell_id].nodes;
    let coords = DMatrix::from_fn(dim, nodes.len(), |i, a| mesh.coord(nodes[a], i));

    basis
        .corner_nodes()
        .into_iter()
        .map(|corner| {
            let j = &coords * basis.shape_derivatives(&basis.node_point(corner));
            let scale: f64 = j.column_iter().map(|c| c.norm()).product();
            if scale > 0.0 {
                j.determinant() / scale
            } else {
                0.0
            }
        })
        .collect()
}

/// Assess mesh quality from the corner Jacobians of every cell
pub fn assess_mesh_quality(mesh: &Mesh) -> MeshQuality {
    let per_cell: Vec<f64> = (0..mesh.num_cells())
        .into_par_iter()
        .map(|e| {
            cell_corner_scaled_jacobians(mesh, e)
                .into_iter()
                .fold(f64::INFINITY, f64::min)
        })
        .collect();

    let total_elements = per_cell.len();
    let mut min_scaled_jacobian = f64::INFINITY;
    let mut sum = 0.0;
    let mut num_inverted = 0;
    let mut num_degenerate = 0;

    for &sj in &per_cell {
        if sj <= 0.0 {
            num_inverted += 1;
        } else if sj < 0.1 {
            num_degenerate += 1;
        }
        min_scaled_jacobian = min_scaled_jacobian.min(sj);
        sum += sj;
    }

    MeshQuality {
        min_scaled_jacobian,
        avg_scaled_jacobian: if total_elements > 0 {
            sum / total_elements as f64
        } else {
            0.0
        },
        num_inverted,
        num_degenerate,
        total_elements,
    }
}

/// Build node-to-node connectivity graph (neighbors)
///
/// Neighbors are nodes that share a cell. Ordered sets keep the smoothing
/// sums reproducible.
pub fn build_node_neighbors(mesh: &Mesh) -> Vec<BTreeSet<usize>> {
    let mut neighbors = vec![BTreeSet::new(); mesh.num_nodes()];
    for cell in &mesh.connectivity.cells {
        for &a in &cell.nodes {
            for &b in &cell.nodes {
                if a != b {
                    neighbors[a].insert(b);
                }
            }
        }
    }
    neighbors
}

/// Laplacian mesh smoothing for interior nodes
///
/// Moves each free node toward the average position of its neighbors.
///
/// # Arguments
/// * `geometry` - Mesh geometry to smooth (modified in place)
/// * `neighbors` - Node connectivity graph (from `build_node_neighbors`)
/// * `fixed_nodes` - Nodes that must not move (domain boundary)
/// * `iterations` - Number of smoothing iterations
/// * `alpha` - Relaxation parameter (1.0 = full Laplacian)
///
/// # Algorithm
/// For each iteration (Jacobi-style, all nodes from the previous positions):
///     new_pos = (1-α)·old_pos + α·average(neighbor_positions)
pub fn smooth_laplacian(
    geometry: &mut Geometry,
    neighbors: &[BTreeSet<usize>],
    fixed_nodes: &BTreeSet<usize>,
    iterations: usize,
    alpha: f64,
) {
    for _ in 0..iterations {
        let mut new_positions = geometry.nodes.clone();

        for (node_id, node_neighbors) in neighbors.iter().enumerate() {
            if fixed_nodes.contains(&node_id) || node_neighbors.is_empty() {
                continue;
            }

            let mut avg = Point3::origin();
            for &neighbor_id in node_neighbors {
                avg.coords += geometry.nodes[neighbor_id].coords;
            }
            avg.coords /= node_neighbors.len() as f64;

            let old = geometry.nodes[node_id];
            new_positions[node_id] = Point3::from(old.coords * (1.0 - alpha) + avg.coords * alpha);
        }

        geometry.nodes = new_positions;
    }
}
