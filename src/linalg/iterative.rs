use std::time::Instant;

use super::preconditioner::Preconditioner;
use super::solver::{LinearOperator, SolverStats, SolverUtils};

/// Preconditioned Conjugate Gradient for the symmetric positive definite
/// mass systems
///
/// The tolerance is relative to ||b||; an optional absolute floor stops the
/// iteration earlier. The starting guess is supplied by the caller.
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    max_iterations: usize,
    tolerance: f64,
    abs_tolerance: f64,
}

impl ConjugateGradient {
    pub fn new() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-8,
            abs_tolerance: 0.0,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_abs_tolerance(mut self, abs_tolerance: f64) -> Self {
        self.abs_tolerance = abs_tolerance;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Solve A x = b starting from `x` (overwritten with the solution)
    pub fn solve<O, P>(&self, a: &O, b: &[f64], x: &mut [f64], precond: &P) -> SolverStats
    where
        O: LinearOperator,
        P: Preconditioner,
    {
        let n = b.len();
        let start = Instant::now();
        let b_norm = SolverUtils::norm(b);

        if b_norm == 0.0 {
            x.iter_mut().for_each(|xi| *xi = 0.0);
            return SolverStats {
                converged: true,
                solve_time: start.elapsed().as_secs_f64(),
                ..SolverStats::default()
            };
        }

        let mut r = SolverUtils::compute_residual(a, x, b);
        let mut r_norm = SolverUtils::norm(&r);
        let target = (self.tolerance * b_norm).max(self.abs_tolerance);

        let mut z = precond.apply(&r);
        let mut p = z.clone();
        let mut rz = SolverUtils::dot(&r, &z);

        let mut iteration = 0;
        let mut converged = r_norm <= target;

        while !converged && iteration < self.max_iterations {
            let ap = a.apply(&p);
            let p_ap = SolverUtils::dot(&p, &ap);
            if p_ap <= 0.0 {
                break;
            }
            let alpha = rz / p_ap;

            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }
            iteration += 1;

            r_norm = SolverUtils::norm(&r);
            if r_norm <= target {
                converged = true;
                break;
            }

            z = precond.apply(&r);
            let rz_new = SolverUtils::dot(&r, &z);
            let beta = rz_new / rz;
            rz = rz_new;

            for i in 0..n {
                p[i] = z[i] + beta * p[i];
            }
        }

        SolverStats {
            iterations: iteration,
            residual_norm: r_norm,
            relative_residual: r_norm / b_norm,
            converged,
            solve_time: start.elapsed().as_secs_f64(),
        }
    }
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new()
    }
}
