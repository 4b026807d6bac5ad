use crate::error::{SimError, SimResult};
use crate::mesh::{Cell, Mesh};

/// Structured box meshes of quadrilaterals and hexahedra
///
/// Order-`p` meshes place `p + 1` equispaced nodes along every cell edge; the
/// nodes form one global lattice, numbered with x running fastest.
pub struct MeshGenerator;

impl MeshGenerator {
    /// Generate an `nx × ny` grid of bilinear quadrilaterals on [0,lx] × [0,ly]
    ///
    /// Boundary attributes: 1 bottom (y = 0), 2 right (x = lx), 3 top (y = ly), 4 left (x = 0).
    /// Every cell gets material id 1.
    ///
    /// # Example
    /// ```
    /// use geo_lagrangian::MeshGenerator;
    /// let mesh = MeshGenerator::generate_rectangle(4, 2, 100e3, 10e3).unwrap();
    /// assert_eq!(mesh.num_cells(), 8);
    /// assert_eq!(mesh.num_nodes(), 15);
    /// ```
    pub fn generate_rectangle(nx: usize, ny: usize, lx: f64, ly: f64) -> SimResult<Mesh> {
        Self::generate_rectangle_with_order(nx, ny, lx, ly, 1)
    }

    /// Rectangle with order-`order` cells
    pub fn generate_rectangle_with_order(
        nx: usize,
        ny: usize,
        lx: f64,
        ly: f64,
        order: usize,
    ) -> SimResult<Mesh> {
        if nx == 0 || ny == 0 || lx <= 0.0 || ly <= 0.0 || order == 0 {
            return Err(SimError::InvalidMesh(format!(
                "rectangle needs positive divisions, lengths and order (nx={nx}, ny={ny}, lx={lx}, ly={ly}, order={order})"
            )));
        }
        let mut mesh = Mesh::with_order(2, order);
        let (mx, my) = (order * nx, order * ny);
        let dx = lx / mx as f64;
        let dy = ly / my as f64;
        let node_id = |ix: usize, iy: usize| iy * (mx + 1) + ix;

        for iy in 0..=my {
            for ix in 0..=mx {
                mesh.geometry.add_node(ix as f64 * dx, iy as f64 * dy, 0.0);
            }
        }

        for iy in 0..ny {
            for ix in 0..nx {
                let mut nodes = Vec::with_capacity((order + 1) * (order + 1));
                for ky in 0..=order {
                    for kx in 0..=order {
                        nodes.push(node_id(order * ix + kx, order * iy + ky));
                    }
                }
                mesh.connectivity.add_cell(Cell::new(nodes, 1));
            }
        }

        let conn = &mut mesh.connectivity;
        conn.add_boundary_nodes(1, (0..=mx).map(|ix| node_id(ix, 0)));
        conn.add_boundary_nodes(2, (0..=my).map(|iy| node_id(mx, iy)));
        conn.add_boundary_nodes(3, (0..=mx).map(|ix| node_id(ix, my)));
        conn.add_boundary_nodes(4, (0..=my).map(|iy| node_id(0, iy)));

        Ok(mesh)
    }

    /// Generate an `nx × ny × nz` grid of trilinear hexahedra on [0,lx] × [0,ly] × [0,lz]
    ///
    /// Boundary attributes: 1 bottom (z = 0), 2 front (y = 0), 3 right (x = lx),
    /// 4 back (y = ly), 5 left (x = 0), 6 top (z = lz).
    pub fn generate_box(
        nx: usize,
        ny: usize,
        nz: usize,
        lx: f64,
        ly: f64,
        lz: f64,
    ) -> SimResult<Mesh> {
        Self::generate_box_with_order(nx, ny, nz, lx, ly, lz, 1)
    }

    /// Box with order-`order` cells
    #[allow(clippy::too_many_arguments)]
    pub fn generate_box_with_order(
        nx: usize,
        ny: usize,
        nz: usize,
        lx: f64,
        ly: f64,
        lz: f64,
        order: usize,
    ) -> SimResult<Mesh> {
        if nx == 0 || ny == 0 || nz == 0 || lx <= 0.0 || ly <= 0.0 || lz <= 0.0 || order == 0 {
            return Err(SimError::InvalidMesh(format!(
                "box needs positive divisions, lengths and order ({nx}x{ny}x{nz}, {lx}x{ly}x{lz}, order {order})"
            )));
        }
        let mut mesh = Mesh::with_order(3, order);
        let (mx, my, mz) = (order * nx, order * ny, order * nz);
        let (dx, dy, dz) = (lx / mx as f64, ly / my as f64, lz / mz as f64);
        let node_id = |ix: usize, iy: usize, iz: usize| (iz * (my + 1) + iy) * (mx + 1) + ix;

        for iz in 0..=mz {
            for iy in 0..=my {
                for ix in 0..=mx {
                    mesh.geometry
                        .add_node(ix as f64 * dx, iy as f64 * dy, iz as f64 * dz);
                }
            }
        }

        for iz in 0..nz {
            for iy in 0..ny {
                for ix in 0..nx {
                    let mut nodes = Vec::with_capacity((order + 1).pow(3));
                    for kz in 0..=order {
                        for ky in 0..=order {
                            for kx in 0..=order {
                                nodes.push(node_id(order * ix + kx, order * iy + ky, order * iz + kz));
                            }
                        }
                    }
                    mesh.connectivity.add_cell(Cell::new(nodes, 1));
                }
            }
        }

        let face = |fixed: &dyn Fn(usize, usize, usize) -> bool| {
            let mut ids = Vec::new();
            for iz in 0..=mz {
                for iy in 0..=my {
                    for ix in 0..=mx {
                        if fixed(ix, iy, iz) {
                            ids.push(node_id(ix, iy, iz));
                        }
                    }
                }
            }
            ids
        };
        let bottom = face(&|_, _, iz| iz == 0);
        let front = face(&|_, iy, _| iy == 0);
        let right = face(&|ix, _, _| ix == mx);
        let back = face(&|_, iy, _| iy == my);
        let left = face(&|ix, _, _| ix == 0);
        let top = face(&|_, _, iz| iz == mz);

        let conn = &mut mesh.connectivity;
        conn.add_boundary_nodes(1, bottom);
        conn.add_boundary_nodes(2, front);
        conn.add_boundary_nodes(3, right);
        conn.add_boundary_nodes(4, back);
        conn.add_boundary_nodes(5, left);
        conn.add_boundary_nodes(6, top);

        Ok(mesh)
    }

    /// Assign material ids from horizontal interfaces
    ///
    /// A cell gets id `1 + k` where `k` is the number of interfaces lying below
    /// its centroid (vertical = last coordinate). Interfaces must be ascending.
    pub fn assign_layers(mesh: &mut Mesh, interfaces: &[f64]) -> SimResult<()> {
        if interfaces.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SimError::InvalidConfig(
                "mesh.layer_interfaces must be strictly ascending".to_string(),
            ));
        }
        let vertical = mesh.dim - 1;
        let ids: Vec<usize> = (0..mesh.num_cells())
            .map(|c| {
                let z = mesh.cell_centroid(c)[vertical];
                1 + interfaces.iter().filter(|&&level| level < z).count()
            })
            .collect();
        for (cell, id) in mesh.connectivity.cells.iter_mut().zip(ids) {
            cell.attribute = id;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_counts_and_boundaries() {
        let mesh = MeshGenerator::generate_rectangle(3, 2, 3.0, 2.0).unwrap();
        assert_eq!(mesh.num_nodes(), 12);
        assert_eq!(mesh.num_cells(), 6);

        let conn = &mesh.connectivity;
        assert_eq!(conn.boundary_nodes[&1].len(), 4); // bottom
        assert_eq!(conn.boundary_nodes[&2].len(), 3); // right
        assert_eq!(conn.max_boundary_attribute(), 4);

        // Lexicographic node order inside a cell
        let cell = &conn.cells[0];
        assert_eq!(cell.nodes, vec![0, 1, 4, 5]);
        assert_eq!(mesh.coord(5, 0), 1.0);
        assert_eq!(mesh.coord(5, 1), 1.0);
    }

    #[test]
    fn test_box_counts_and_boundaries() {
        let mesh = MeshGenerator::generate_box(2, 2, 1, 2.0, 2.0, 1.0).unwrap();
        assert_eq!(mesh.num_nodes(), 18);
        assert_eq!(mesh.num_cells(), 4);
        assert_eq!(mesh.connectivity.cells[0].num_nodes(), 8);
        assert_eq!(mesh.connectivity.boundary_nodes[&1].len(), 9);
        assert_eq!(mesh.connectivity.boundary_nodes[&6].len(), 9);
        assert_eq!(mesh.connectivity.max_boundary_attribute(), 6);
    }

    #[test]
    fn test_quadratic_rectangle() {
        let mesh = MeshGenerator::generate_rectangle_with_order(2, 1, 2.0, 1.0, 2).unwrap();
        assert_eq!(mesh.order, 2);
        assert_eq!(mesh.num_nodes(), 5 * 3);
        assert_eq!(mesh.num_cells(), 2);

        // Second cell starts two lattice columns to the right
        let cell = &mesh.connectivity.cells[1];
        assert_eq!(cell.nodes, vec![2, 3, 4, 7, 8, 9, 12, 13, 14]);
        assert_eq!(mesh.coord(8, 0), 1.5);
        assert_eq!(mesh.coord(8, 1), 0.5);

        // Mid-edge nodes belong to the boundary sets
        let conn = &mesh.connectivity;
        assert_eq!(conn.boundary_nodes[&1].len(), 5);
        assert_eq!(conn.boundary_nodes[&2].len(), 3);
        assert!(conn.boundary_nodes[&2].contains(&9));
    }

    #[test]
    fn test_quadratic_box() {
        let mesh = MeshGenerator::generate_box_with_order(1, 1, 2, 1.0, 1.0, 2.0, 2).unwrap();
        assert_eq!(mesh.num_nodes(), 3 * 3 * 5);
        assert_eq!(mesh.connectivity.cells[0].num_nodes(), 27);
        assert_eq!(mesh.connectivity.boundary_nodes[&1].len(), 9);
        assert_eq!(mesh.connectivity.boundary_nodes[&3].len(), 15);
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        assert!(MeshGenerator::generate_rectangle_with_order(1, 1, 1.0, 1.0, 0).is_err());
        assert!(MeshGenerator::generate_rectangle(0, 2, 1.0, 1.0).is_err());
        assert!(MeshGenerator::generate_box(1, 1, 1, 1.0, -1.0, 1.0).is_err());
    }

    #[test]
    fn test_assign_layers() {
        let mut mesh = MeshGenerator::generate_rectangle(1, 4, 1.0, 4.0).unwrap();
        MeshGenerator::assign_layers(&mut mesh, &[1.0, 3.0]).unwrap();
        let ids: Vec<usize> = mesh.connectivity.cells.iter().map(|c| c.attribute).collect();
        assert_eq!(ids, vec![1, 2, 2, 3]);
        assert_eq!(mesh.connectivity.material_ids(), vec![1, 2, 3]);

        assert!(MeshGenerator::assign_layers(&mut mesh, &[2.0, 1.0]).is_err());
    }
}
