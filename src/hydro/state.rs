//! The single block of unknowns advanced by the explicit integrators
//!
//! Block order: position (dim·n), velocity (dim·n), specific internal energy
//! (one per thermodynamic dof), stress (packed symmetric components,
//! component-major) and the frozen initial position (dim·n). Kinematic blocks
//! are ordered by component: entry `comp * n + node`. Thermodynamic dofs are
//! numbered cell by cell, `cell * thermo_dofs + j`.

use std::ops::Range;

use crate::error::{SimError, SimResult};
use crate::mechanics::strain::stress_components;

/// Sizes and offsets of the state blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    pub dim: usize,
    pub num_nodes: usize,
    pub num_cells: usize,
    /// Thermodynamic dofs per cell
    pub thermo_dofs: usize,
}

impl StateLayout {
    /// Layout with one thermodynamic value per cell
    pub fn new(dim: usize, num_nodes: usize, num_cells: usize) -> Self {
        Self::with_thermo_dofs(dim, num_nodes, num_cells, 1)
    }

    pub fn with_thermo_dofs(dim: usize, num_nodes: usize, num_cells: usize, thermo_dofs: usize) -> Self {
        Self {
            dim,
            num_nodes,
            num_cells,
            thermo_dofs,
        }
    }

    /// Independent stress components per thermodynamic dof
    pub fn stress_components(&self) -> usize {
        stress_components(self.dim)
    }

    /// Length of the energy block and of each stress component
    pub fn num_thermo(&self) -> usize {
        self.num_cells * self.thermo_dofs
    }

    pub fn kinematic_len(&self) -> usize {
        self.dim * self.num_nodes
    }

    pub fn position(&self) -> Range<usize> {
        0..self.kinematic_len()
    }

    pub fn velocity(&self) -> Range<usize> {
        let start = self.kinematic_len();
        start..start + self.kinematic_len()
    }

    pub fn energy(&self) -> Range<usize> {
        let start = 2 * self.kinematic_len();
        start..start + self.num_thermo()
    }

    pub fn stress(&self) -> Range<usize> {
        let start = self.energy().end;
        start..start + self.stress_components() * self.num_thermo()
    }

    pub fn initial_position(&self) -> Range<usize> {
        let start = self.stress().end;
        start..start + self.kinematic_len()
    }

    pub fn total_len(&self) -> usize {
        self.initial_position().end
    }
}

/// State vector (or its time derivative) with typed block access
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalState {
    layout: StateLayout,
    data: Vec<f64>,
}

impl GlobalState {
    pub fn zeros(layout: StateLayout) -> Self {
        Self {
            layout,
            data: vec![0.0; layout.total_len()],
        }
    }

    pub fn from_vec(layout: StateLayout, data: Vec<f64>) -> SimResult<Self> {
        if data.len() != layout.total_len() {
            return Err(SimError::InvariantViolation(format!(
                "state vector has {} entries, layout needs {}",
                data.len(),
                layout.total_len()
            )));
        }
        Ok(Self { layout, data })
    }

    pub fn layout(&self) -> StateLayout {
        self.layout
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn position(&self) -> &[f64] {
        &self.data[self.layout.position()]
    }

    pub fn position_mut(&mut self) -> &mut [f64] {
        let r = self.layout.position();
        &mut self.data[r]
    }

    pub fn velocity(&self) -> &[f64] {
        &self.data[self.layout.velocity()]
    }

    pub fn velocity_mut(&mut self) -> &mut [f64] {
        let r = self.layout.velocity();
        &mut self.data[r]
    }

    pub fn energy(&self) -> &[f64] {
        &self.data[self.layout.energy()]
    }

    pub fn energy_mut(&mut self) -> &mut [f64] {
        let r = self.layout.energy();
        &mut self.data[r]
    }

    pub fn stress(&self) -> &[f64] {
        &self.data[self.layout.stress()]
    }

    pub fn stress_mut(&mut self) -> &mut [f64] {
        let r = self.layout.stress();
        &mut self.data[r]
    }

    pub fn initial_position(&self) -> &[f64] {
        &self.data[self.layout.initial_position()]
    }

    pub fn initial_position_mut(&mut self) -> &mut [f64] {
        let r = self.layout.initial_position();
        &mut self.data[r]
    }

    /// Packed stress at one thermodynamic dof
    pub fn dof_stress(&self, dof: usize) -> Vec<f64> {
        let n = self.layout.num_thermo();
        let s = self.stress();
        (0..self.layout.stress_components()).map(|k| s[k * n + dof]).collect()
    }

    /// self += a · other
    pub fn axpy(&mut self, a: f64, other: &GlobalState) {
        debug_assert_eq!(self.layout, other.layout);
        for (x, y) in self.data.iter_mut().zip(&other.data) {
            *x += a * y;
        }
    }

    /// self = base + a · other
    pub fn assign_axpy(&mut self, base: &GlobalState, a: f64, other: &GlobalState) {
        debug_assert_eq!(self.layout, base.layout);
        for ((x, b), y) in self.data.iter_mut().zip(&base.data).zip(&other.data) {
            *x = b + a * y;
        }
    }

    /// self = a · self + b · other
    pub fn blend(&mut self, a: f64, b: f64, other: &GlobalState) {
        debug_assert_eq!(self.layout, other.layout);
        for (x, y) in self.data.iter_mut().zip(&other.data) {
            *x = a * *x + b * y;
        }
    }

    pub fn copy_from(&mut self, other: &GlobalState) {
        self.layout = other.layout;
        self.data.clear();
        self.data.extend_from_slice(&other.data);
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Accumulated displacement x - x0
    pub fn displacement(&self) -> Vec<f64> {
        self.position()
            .iter()
            .zip(self.initial_position())
            .map(|(x, x0)| x - x0)
            .collect()
    }

    /// Largest nodal speed
    pub fn max_speed(&self) -> f64 {
        let n = self.layout.num_nodes;
        let v = self.velocity();
        (0..n)
            .map(|node| {
                (0..self.layout.dim)
                    .map(|c| v[c * n + node] * v[c * n + node])
                    .sum::<f64>()
                    .sqrt()
            })
            .fold(0.0, f64::max)
    }

    /// Euclidean norm of a block
    pub fn block_norm(&self, range: Range<usize>) -> f64 {
        self.data[range].iter().map(|x| x * x).sum::<f64>().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_block_offsets_2d() {
        let layout = StateLayout::new(2, 6, 2);
        assert_eq!(layout.position(), 0..12);
        assert_eq!(layout.velocity(), 12..24);
        assert_eq!(layout.energy(), 24..26);
        assert_eq!(layout.stress(), 26..32);
        assert_eq!(layout.initial_position(), 32..44);
        assert_eq!(layout.total_len(), 44);
    }

    #[test]
    fn test_block_offsets_3d() {
        let layout = StateLayout::new(3, 8, 1);
        assert_eq!(layout.stress_components(), 6);
        assert_eq!(layout.stress().len(), 6);
        assert_eq!(layout.total_len(), 24 * 3 + 1 + 6);
    }

    #[test]
    fn test_block_offsets_with_thermo_dofs() {
        // Two cells with four energy dofs each
        let layout = StateLayout::with_thermo_dofs(2, 15, 2, 4);
        assert_eq!(layout.num_thermo(), 8);
        assert_eq!(layout.energy(), 60..68);
        assert_eq!(layout.stress(), 68..92);
        assert_eq!(layout.total_len(), 92 + 30);
    }

    #[test]
    fn test_axpy_and_displacement() {
        let layout = StateLayout::new(2, 2, 1);
        let mut s = GlobalState::zeros(layout);
        s.position_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        s.initial_position_mut().copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let mut rate = GlobalState::zeros(layout);
        rate.position_mut().copy_from_slice(&[1.0, 0.0, 0.0, 0.0]);
        s.axpy(0.5, &rate);

        assert_eq!(s.displacement(), vec![0.5, 1.0, 2.0, 3.0]);

        let mut out = GlobalState::zeros(layout);
        out.assign_axpy(&s, 2.0, &rate);
        assert_eq!(out.position()[0], 3.5);
    }

    #[test]
    fn test_max_speed_and_dof_stress() {
        let layout = StateLayout::new(2, 2, 2);
        let mut s = GlobalState::zeros(layout);
        s.velocity_mut().copy_from_slice(&[3.0, 0.0, 4.0, 1.0]);
        assert_relative_eq!(s.max_speed(), 5.0);

        s.stress_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(s.dof_stress(1), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_from_vec_length_checked() {
        let layout = StateLayout::new(2, 4, 1);
        assert!(GlobalState::from_vec(layout, vec![0.0; 3]).is_err());
        assert!(GlobalState::from_vec(layout, vec![0.0; layout.total_len()]).is_ok());
    }
}
