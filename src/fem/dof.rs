use std::collections::BTreeSet;

/// Degree of Freedom (DOF) manager for the kinematic (position/velocity) space
///
/// Continuous Q1 with ordering by component blocks: the DOF of `node` in
/// component `comp` is `comp * num_nodes + node`. Dirichlet (fixed-velocity)
/// DOFs are tracked here and eliminated from every velocity mass solve.
#[derive(Debug, Clone)]
pub struct DofManager {
    /// Number of nodes in the mesh
    num_nodes: usize,

    /// Spatial dimension (velocity components per node)
    dim: usize,

    /// DOFs with Dirichlet boundary conditions (ordered for reproducible iteration)
    dirichlet_dofs: BTreeSet<usize>,

    /// Values for Dirichlet DOFs
    dirichlet_values: Vec<f64>,
}

impl DofManager {
    pub fn new(num_nodes: usize, dim: usize) -> Self {
        Self {
            num_nodes,
            dim,
            dirichlet_dofs: BTreeSet::new(),
            dirichlet_values: vec![0.0; num_nodes * dim],
        }
    }

    /// Global index of the `component` DOF of `node_id`
    #[inline]
    pub fn velocity_dof(&self, node_id: usize, component: usize) -> usize {
        debug_assert!(node_id < self.num_nodes);
        debug_assert!(component < self.dim);
        component * self.num_nodes + node_id
    }

    /// Apply Dirichlet boundary condition to a DOF
    ///
    /// # Arguments
    /// * `dof` - Global DOF index
    /// * `value` - Prescribed velocity
    pub fn set_dirichlet(&mut self, dof: usize, value: f64) {
        debug_assert!(dof < self.total_dofs(), "DOF index out of bounds");

        self.dirichlet_dofs.insert(dof);
        self.dirichlet_values[dof] = value;
    }

    /// Fix one velocity component of a node
    pub fn set_dirichlet_component(&mut self, node_id: usize, component: usize, value: f64) {
        let dof = self.velocity_dof(node_id, component);
        self.set_dirichlet(dof, value);
    }

    pub fn is_dirichlet(&self, dof: usize) -> bool {
        self.dirichlet_dofs.contains(&dof)
    }

    pub fn get_dirichlet_value(&self, dof: usize) -> f64 {
        self.dirichlet_values[dof]
    }

    /// Iterate over `(dof, value)` of every constrained DOF
    pub fn dirichlet(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.dirichlet_dofs
            .iter()
            .map(move |&dof| (dof, self.dirichlet_values[dof]))
    }

    /// Constrained node ids of one velocity component (local to that component block)
    pub fn component_dirichlet_nodes(&self, component: usize) -> Vec<usize> {
        let lo = component * self.num_nodes;
        let hi = lo + self.num_nodes;
        self.dirichlet_dofs
            .range(lo..hi)
            .map(|&dof| dof - lo)
            .collect()
    }

    /// Forget all constraints
    pub fn clear_dirichlet(&mut self) {
        self.dirichlet_dofs.clear();
        self.dirichlet_values.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn total_dofs(&self) -> usize {
        self.num_nodes * self.dim
    }

    /// Number of DOFs not constrained by a Dirichlet BC
    pub fn num_free_dofs(&self) -> usize {
        self.total_dofs() - self.dirichlet_dofs.len()
    }

    pub fn num_constrained_dofs(&self) -> usize {
        self.dirichlet_dofs.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}
