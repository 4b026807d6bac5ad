use std::collections::{BTreeMap, BTreeSet};

/// A tensor-product Q1 cell: 4-node quadrilateral (2-D) or 8-node hexahedron (3-D)
///
/// Node numbering is lexicographic on the reference cell [0,1]^dim with x
/// running fastest:
///   2-D: 0 (0,0), 1 (1,0), 2 (0,1), 3 (1,1)
///   3-D: the 2-D ordering at z = 0, then again at z = 1 (nodes 4..7)
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Global node indices (4 or 8)
    pub nodes: Vec<usize>,
    /// Material id (1-based, as in the material lists of the configuration)
    pub attribute: usize,
}

impl Cell {
    pub fn new(nodes: Vec<usize>, attribute: usize) -> Self {
        Self { nodes, attribute }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Cell connectivity plus boundary node sets keyed by boundary attribute
#[derive(Debug, Clone, Default)]
pub struct Connectivity {
    pub cells: Vec<Cell>,
    /// Boundary attribute (1-based) -> sorted node ids on that boundary
    pub boundary_nodes: BTreeMap<usize, Vec<usize>>,
}

impl Connectivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cell(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Register nodes on a boundary attribute (duplicates are merged)
    pub fn add_boundary_nodes(&mut self, attribute: usize, nodes: impl IntoIterator<Item = usize>) {
        let entry = self.boundary_nodes.entry(attribute).or_default();
        let mut merged: BTreeSet<usize> = entry.iter().copied().collect();
        merged.extend(nodes);
        *entry = merged.into_iter().collect();
    }

    /// Largest boundary attribute present (0 when the mesh has none)
    pub fn max_boundary_attribute(&self) -> usize {
        self.boundary_nodes.keys().next_back().copied().unwrap_or(0)
    }

    /// Distinct material ids, sorted
    pub fn material_ids(&self) -> Vec<usize> {
        let ids: BTreeSet<usize> = self.cells.iter().map(|c| c.attribute).collect();
        ids.into_iter().collect()
    }

    /// Union of all boundary nodes
    pub fn all_boundary_nodes(&self) -> BTreeSet<usize> {
        self.boundary_nodes.values().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_nodes_are_merged_and_sorted() {
        let mut conn = Connectivity::new();
        conn.add_boundary_nodes(2, vec![5, 1, 3]);
        conn.add_boundary_nodes(2, vec![3, 0]);
        conn.add_boundary_nodes(4, vec![7]);

        assert_eq!(conn.boundary_nodes[&2], vec![0, 1, 3, 5]);
        assert_eq!(conn.max_boundary_attribute(), 4);
        assert_eq!(conn.all_boundary_nodes().len(), 5);
    }

    #[test]
    fn test_material_ids_distinct() {
        let mut conn = Connectivity::new();
        conn.add_cell(Cell::new(vec![0, 1, 2, 3], 2));
        conn.add_cell(Cell::new(vec![1, 4, 3, 5], 1));
        conn.add_cell(Cell::new(vec![4, 6, 5, 7], 2));
        assert_eq!(conn.material_ids(), vec![1, 2]);
    }
}
