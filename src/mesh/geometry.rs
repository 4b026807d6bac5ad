use nalgebra::Point3;
use super::topology::Connectivity;
use crate::error::{SimError, SimResult};

/// Node coordinates of the mesh
///
/// 2-D meshes keep z = 0.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub nodes: Vec<Point3<f64>>,
}

impl Geometry {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn add_node(&mut self, x: f64, y: f64, z: f64) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Point3::new(x, y, z));
        idx
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Complete mesh: spatial dimension, node coordinates and cell topology
///
/// Cells carry `(order + 1)^dim` nodes in lexicographic order.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub dim: usize,
    pub order: usize,
    pub geometry: Geometry,
    pub connectivity: Connectivity,
}

impl Mesh {
    pub fn new(dim: usize) -> Self {
        Self::with_order(dim, 1)
    }

    pub fn with_order(dim: usize, order: usize) -> Self {
        Self {
            dim,
            order,
            geometry: Geometry::new(),
            connectivity: Connectivity::new(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.geometry.num_nodes()
    }

    pub fn num_cells(&self) -> usize {
        self.connectivity.num_cells()
    }

    /// Coordinate `comp` of node `node`
    #[inline]
    pub fn coord(&self, node: usize, comp: usize) -> f64 {
        self.geometry.nodes[node][comp]
    }

    /// Bind the node coordinates to a position block laid out by component
    /// (`comp * num_nodes + node`).
    ///
    /// This is the only place node coordinates change during a run; the rate
    /// evaluator calls it at the top of every evaluation.
    pub fn bind_nodes(&mut self, positions: &[f64]) -> SimResult<()> {
        let n = self.num_nodes();
        if positions.len() != self.dim * n {
            return Err(SimError::InvariantViolation(format!(
                "position block has {} entries, mesh needs {}",
                positions.len(),
                self.dim * n
            )));
        }
        for (node, p) in self.geometry.nodes.iter_mut().enumerate() {
            for comp in 0..self.dim {
                p[comp] = positions[comp * n + node];
            }
        }
        Ok(())
    }

    /// Node coordinates flattened by component blocks, the inverse of `bind_nodes`
    pub fn positions(&self) -> Vec<f64> {
        let n = self.num_nodes();
        let mut out = vec![0.0; self.dim * n];
        for (node, p) in self.geometry.nodes.iter().enumerate() {
            for comp in 0..self.dim {
                out[comp * n + node] = p[comp];
            }
        }
        out
    }

    /// Arithmetic mean of the cell's node coordinates
    pub fn cell_centroid(&self, cell_id: usize) -> Point3<f64> {
        let cell = &self.connectivity.cells[cell_id];
        let mut c = Point3::origin();
        for &node in &cell.nodes {
            c.coords += self.geometry.nodes[node].coords;
        }
        c.coords /= cell.nodes.len() as f64;
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::topology::Cell;

    fn unit_square() -> Mesh {
        let mut mesh = Mesh::new(2);
        mesh.geometry.add_node(0.0, 0.0, 0.0);
        mesh.geometry.add_node(1.0, 0.0, 0.0);
        mesh.geometry.add_node(0.0, 1.0, 0.0);
        mesh.geometry.add_node(1.0, 1.0, 0.0);
        mesh.connectivity.add_cell(Cell::new(vec![0, 1, 2, 3], 1));
        mesh
    }

    #[test]
    fn test_bind_nodes_uses_component_blocks() {
        let mut mesh = unit_square();
        let x = vec![0.0, 2.0, 0.0, 2.0, 0.0, 0.0, 3.0, 3.0];
        mesh.bind_nodes(&x).unwrap();

        assert_eq!(mesh.coord(3, 0), 2.0);
        assert_eq!(mesh.coord(3, 1), 3.0);
        assert_eq!(mesh.positions(), x);
    }

    #[test]
    fn test_bind_nodes_rejects_wrong_length() {
        let mut mesh = unit_square();
        assert!(mesh.bind_nodes(&[0.0; 6]).is_err());
    }

    #[test]
    fn test_cell_centroid() {
        let mesh = unit_square();
        let c = mesh.cell_centroid(0);
        assert!((c.x - 0.5).abs() < 1e-14);
        assert!((c.y - 0.5).abs() < 1e-14);
    }
}
