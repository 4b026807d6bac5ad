use sprs::CsMat;

/// Preconditioner trait for iterative solvers
///
/// Solves M z = r approximately (where M ≈ A)
pub trait Preconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64>;
}

/// Jacobi (diagonal) preconditioner
///
/// M = diag(A). Well suited to consistent mass matrices, whose diagonal
/// dominates the row sums.
pub struct JacobiPreconditioner {
    /// Inverse of diagonal entries: 1/A_ii
    diag_inv: Vec<f64>,
}

impl JacobiPreconditioner {
    #[allow(non_snake_case)]
    pub fn new(A: &CsMat<f64>) -> Self {
        let diag_inv = (0..A.rows())
            .map(|i| match A.get(i, i) {
                Some(&val) if val.abs() > 1e-300 => 1.0 / val,
                _ => 1.0,
            })
            .collect();
        Self { diag_inv }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64> {
        r.iter()
            .zip(self.diag_inv.iter())
            .map(|(&ri, &di)| ri * di)
            .collect()
    }
}

/// No preconditioning
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64> {
        r.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    #[test]
    fn test_jacobi_preconditioner() {
        // Mass-like scaling: tiny diagonal entries must still be inverted
        let mut triplets = TriMat::new((3, 3));
        triplets.add_triplet(0, 0, 2.0);
        triplets.add_triplet(1, 1, 4.0e-20);
        triplets.add_triplet(2, 2, 8.0);
        let a = triplets.to_csr();

        let z = JacobiPreconditioner::new(&a).apply(&[2.0, 4.0e-20, 8.0]);
        assert_relative_eq!(z[0], 1.0, epsilon = 1e-14);
        assert_relative_eq!(z[1], 1.0, epsilon = 1e-14);
        assert_relative_eq!(z[2], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_identity_preconditioner() {
        let r = vec![1.0, 2.0, 3.0];
        assert_eq!(IdentityPreconditioner.apply(&r), r);
    }
}
