//! Dense linear algebra helpers for the constrained solvers
//!
//! Every system in this crate is small and dense, and several of them are
//! rank-deficient by construction (active-constraint Jacobians, reduced
//! Hessians with negative curvature). All solves therefore go through
//! `nalgebra`'s SVD with an explicit numerical-rank cutoff instead of a
//! Cholesky or QR factorization.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::error;

/// Singular values below this threshold are treated as zero
pub const RANK_TOL: f64 = 1e-15;

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Errors from the dense factorization helpers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinAlgError {
    /// The SVD-based least-squares solve failed
    #[error("Least-squares solve failed: {0}")]
    SolveFailed(String),

    /// The pseudo-inverse could not be formed
    #[error("Pseudo-inverse computation failed: {0}")]
    PseudoInverseFailed(String),
}

impl LinAlgError {
    /// Log this error at ERROR level and return it for further propagation
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Minimum-norm least-squares solution of `a * x = rhs`
///
/// Handles square, tall, and wide `a`; rank deficiency is resolved by the
/// [`RANK_TOL`] cutoff on singular values.
pub fn solve_least_squares(a: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<DVector<f64>> {
    let svd = a.clone().svd(true, true);
    svd.solve(rhs, RANK_TOL)
        .map_err(|e| LinAlgError::SolveFailed(e.to_string()).log())
}

/// Orthogonal projector onto the null space of `a`, formed as `I - a^+ a`
///
/// Used to restrict search directions to the tangent space of a set of
/// active constraint gradients.
pub fn null_space_projector(a: &DMatrix<f64>) -> LinAlgResult<DMatrix<f64>> {
    let n = a.ncols();
    let pinv = a
        .clone()
        .svd(true, true)
        .pseudo_inverse(RANK_TOL)
        .map_err(|e| LinAlgError::PseudoInverseFailed(e.to_string()).log())?;
    Ok(DMatrix::identity(n, n) - pinv * a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_squares_square_system() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let rhs = DVector::from_vec(vec![2.0, 8.0]);
        let x = solve_least_squares(&a, &rhs).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_least_squares_wide_system_min_norm() {
        // Single equation x1 + x2 = 2, minimum-norm solution is (1, 1)
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let rhs = DVector::from_vec(vec![2.0]);
        let x = solve_least_squares(&a, &rhs).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_least_squares_rank_deficient() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let rhs = DVector::from_vec(vec![2.0, 2.0]);
        let x = solve_least_squares(&a, &rhs).unwrap();
        assert!((&a * &x - rhs).norm() < 1e-12, "residual should vanish");
    }

    #[test]
    fn test_null_space_projector() {
        let a = DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]);
        let p = null_space_projector(&a).unwrap();

        // Projector annihilates the row space and fixes the null space
        let v = DVector::from_vec(vec![5.0, 1.0, -2.0]);
        let pv = &p * &v;
        assert!(pv[0].abs() < 1e-12);
        assert!((pv[1] - 1.0).abs() < 1e-12);
        assert!((pv[2] + 2.0).abs() < 1e-12);

        // Idempotent
        assert!((&p * &p - &p).norm() < 1e-10);
    }
}
