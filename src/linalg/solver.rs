use sprs::CsMat;

/// Statistics from an iterative mass solve
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    pub iterations: usize,

    /// Final residual norm ||r|| = ||b - Ax||
    pub residual_norm: f64,

    /// Relative residual ||r|| / ||b||
    pub relative_residual: f64,

    pub converged: bool,

    /// Solve time in seconds
    pub solve_time: f64,
}

/// Trait for a linear operator A that can be applied to a vector x to get Ax
///
/// Implemented by the assembled mass matrices and by the matrix-free force
/// operator of the explicit scheme.
pub trait LinearOperator {
    /// out = A * v
    fn apply(&self, v: &[f64]) -> Vec<f64>;

    /// out += A * v
    fn apply_add(&self, v: &[f64], out: &mut [f64]) {
        let result = self.apply(v);
        for (o, val) in out.iter_mut().zip(result) {
            *o += val;
        }
    }

    /// Number of rows (output dimension)
    fn rows(&self) -> usize;

    /// Number of columns (input dimension)
    fn cols(&self) -> usize;
}

impl LinearOperator for CsMat<f64> {
    fn apply(&self, v: &[f64]) -> Vec<f64> {
        let mut result = vec![0.0; CsMat::rows(self)];
        self.apply_add(v, &mut result);
        result
    }

    fn apply_add(&self, v: &[f64], out: &mut [f64]) {
        for (row_idx, row) in self.outer_iterator().enumerate() {
            let mut sum = 0.0;
            for (col_idx, &val) in row.iter() {
                sum += val * v[col_idx];
            }
            out[row_idx] += sum;
        }
    }

    fn rows(&self) -> usize {
        CsMat::rows(self)
    }

    fn cols(&self) -> usize {
        CsMat::cols(self)
    }
}

/// Vector helpers shared by the solvers and energy diagnostics
pub struct SolverUtils;

impl SolverUtils {
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    /// L2 norm of a vector
    pub fn norm(v: &[f64]) -> f64 {
        Self::dot(v, v).sqrt()
    }

    /// r = b - Ax
    #[allow(non_snake_case)]
    pub fn compute_residual<O: LinearOperator>(A: &O, x: &[f64], b: &[f64]) -> Vec<f64> {
        let ax = A.apply(x);
        b.iter().zip(ax).map(|(&bi, axi)| bi - axi).collect()
    }

    /// ||b - Ax|| / ||b|| (absolute residual when b vanishes)
    #[allow(non_snake_case)]
    pub fn relative_residual<O: LinearOperator>(A: &O, x: &[f64], b: &[f64]) -> f64 {
        let r_norm = Self::norm(&Self::compute_residual(A, x, b));
        let b_norm = Self::norm(b);
        if b_norm < 1e-14 {
            r_norm
        } else {
            r_norm / b_norm
        }
    }
}
