/// Accumulated plastic strain per thermodynamic dof
///
/// Lives outside the global state block because it is advanced by the
/// return map rather than by the rate evaluator, but the driver snapshots
/// and restores it together with the state on a rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlasticityState {
    /// Accumulated plastic strain (scalar magnitude), indexed like the energy block
    pub accumulated_strain: Vec<f64>,
}

impl PlasticityState {
    pub fn new(n_dofs: usize) -> Self {
        Self {
            accumulated_strain: vec![0.0; n_dofs],
        }
    }

    pub fn get(&self, dof: usize) -> f64 {
        self.accumulated_strain[dof]
    }

    pub fn set(&mut self, dof: usize, strain: f64) {
        self.accumulated_strain[dof] = strain;
    }

    pub fn add(&mut self, dof: usize, increment: f64) {
        self.accumulated_strain[dof] += increment;
    }

    pub fn num_dofs(&self) -> usize {
        self.accumulated_strain.len()
    }

    /// Largest accumulated strain
    pub fn max(&self) -> f64 {
        self.accumulated_strain.iter().copied().fold(0.0, f64::max)
    }
}
