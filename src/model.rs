//! Compact quadratic model representation
//!
//! A [`QuadModel`] stores one quadratic surrogate per model output: row 0 is
//! the objective, rows `1..=m` are the inequality constraints `c_j(x) <= 0`.
//! Each row holds `n + 1 + n(n+1)/2` coefficients over an `n`-dimensional
//! variable space, laid out as:
//!
//! ```text
//! [ constant | linear g_1..g_n | Hessian diagonal d_1..d_n | strict upper
//!   triangle o_12, o_13, .., o_1n, o_23, .., o_(n-1)n  (row-major) ]
//! ```
//!
//! The value of a row at `x` is
//!
//! ```text
//! c0 + g.x + 1/2 * sum_i d_i x_i^2 + sum_{i<j} o_ij x_i x_j
//! ```
//!
//! so the full Hessian has `H_ii = d_i` and `H_ij = H_ji = o_ij`. The model
//! is immutable after construction; all accessors are read-only.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::error;

/// Errors raised while constructing a quadratic model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The coefficient matrix width does not match the variable dimension
    #[error(
        "Coefficient matrix has {cols} columns but dimension {dimension} requires {expected}"
    )]
    CoefficientCount {
        cols: usize,
        dimension: usize,
        expected: usize,
    },

    /// The coefficient matrix has no rows (the objective row is mandatory)
    #[error("Coefficient matrix must contain at least the objective row")]
    MissingObjective,

    /// The variable dimension is zero
    #[error("Model dimension must be at least 1")]
    ZeroDimension,
}

impl ModelError {
    /// Log this error at ERROR level and return it for further propagation
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Quadratic surrogate of an objective and a block of inequality constraints
///
/// Wraps the compact coefficient matrix produced by a model-building phase and
/// exposes named evaluation routines instead of raw coefficient indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadModel {
    coeffs: DMatrix<f64>,
    n: usize,
}

impl QuadModel {
    /// Number of coefficients each row must carry for dimension `n`
    pub fn num_coefficients(n: usize) -> usize {
        n + 1 + n * (n + 1) / 2
    }

    /// Build a model from its compact coefficient matrix
    ///
    /// `coeffs` must have at least one row (the objective) and exactly
    /// [`Self::num_coefficients`]`(n)` columns.
    pub fn new(coeffs: DMatrix<f64>, n: usize) -> Result<Self, ModelError> {
        if n == 0 {
            return Err(ModelError::ZeroDimension.log());
        }
        if coeffs.nrows() == 0 {
            return Err(ModelError::MissingObjective.log());
        }
        let expected = Self::num_coefficients(n);
        if coeffs.ncols() != expected {
            return Err(ModelError::CoefficientCount {
                cols: coeffs.ncols(),
                dimension: n,
                expected,
            }
            .log());
        }
        Ok(Self { coeffs, n })
    }

    /// Pack a single explicit quadratic `c0 + g.x + 1/2 x^T H x` into a
    /// one-row, unconstrained model
    ///
    /// Only the upper triangle of `hessian` is read; the matrix is assumed
    /// symmetric.
    pub fn from_quadratic(constant: f64, gradient: &DVector<f64>, hessian: &DMatrix<f64>) -> Self {
        let n = gradient.len();
        debug_assert_eq!(hessian.nrows(), n);
        debug_assert_eq!(hessian.ncols(), n);

        let mut coeffs = DMatrix::<f64>::zeros(1, Self::num_coefficients(n));
        coeffs[(0, 0)] = constant;
        for i in 0..n {
            coeffs[(0, 1 + i)] = gradient[i];
            coeffs[(0, 1 + n + i)] = hessian[(i, i)];
        }
        let mut k = 1 + 2 * n;
        for i in 0..n {
            for j in (i + 1)..n {
                coeffs[(0, k)] = hessian[(i, j)];
                k += 1;
            }
        }
        Self { coeffs, n }
    }

    /// Variable space dimension `n`
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Number of modeled constraints (rows beyond the objective)
    pub fn num_constraints(&self) -> usize {
        self.coeffs.nrows() - 1
    }

    fn row_value(&self, row: usize, x: &DVector<f64>) -> f64 {
        let n = self.n;
        let mut value = self.coeffs[(row, 0)];
        for i in 0..n {
            value += self.coeffs[(row, 1 + i)] * x[i];
            value += 0.5 * self.coeffs[(row, 1 + n + i)] * x[i] * x[i];
        }
        let mut k = 1 + 2 * n;
        for i in 0..n {
            for j in (i + 1)..n {
                value += self.coeffs[(row, k)] * x[i] * x[j];
                k += 1;
            }
        }
        value
    }

    fn row_gradient(&self, row: usize, x: &DVector<f64>) -> DVector<f64> {
        let n = self.n;
        let mut grad = DVector::<f64>::zeros(n);
        for i in 0..n {
            grad[i] = self.coeffs[(row, 1 + i)] + self.coeffs[(row, 1 + n + i)] * x[i];
        }
        let mut k = 1 + 2 * n;
        for i in 0..n {
            for j in (i + 1)..n {
                let o = self.coeffs[(row, k)];
                grad[i] += o * x[j];
                grad[j] += o * x[i];
                k += 1;
            }
        }
        grad
    }

    fn row_hessian(&self, row: usize) -> DMatrix<f64> {
        let n = self.n;
        let mut hess = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            hess[(i, i)] = self.coeffs[(row, 1 + n + i)];
        }
        let mut k = 1 + 2 * n;
        for i in 0..n {
            for j in (i + 1)..n {
                let o = self.coeffs[(row, k)];
                hess[(i, j)] = o;
                hess[(j, i)] = o;
                k += 1;
            }
        }
        hess
    }

    /// Objective value at `x`
    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        self.row_value(0, x)
    }

    /// Objective gradient at `x`
    pub fn objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        self.row_gradient(0, x)
    }

    /// Constant objective Hessian
    pub fn objective_hessian(&self) -> DMatrix<f64> {
        self.row_hessian(0)
    }

    /// Value of constraint `j` at `x` (modeled as `c_j(x) <= 0`)
    pub fn constraint(&self, j: usize, x: &DVector<f64>) -> f64 {
        self.row_value(j + 1, x)
    }

    /// All constraint values at `x`
    pub fn constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        let m = self.num_constraints();
        DVector::from_fn(m, |j, _| self.row_value(j + 1, x))
    }

    /// Gradient of constraint `j` at `x`
    pub fn constraint_gradient(&self, j: usize, x: &DVector<f64>) -> DVector<f64> {
        self.row_gradient(j + 1, x)
    }

    /// Constant Hessian of constraint `j`
    pub fn constraint_hessian(&self, j: usize) -> DMatrix<f64> {
        self.row_hessian(j + 1)
    }

    /// Jacobian of the constraint block at `x` (one row per constraint)
    pub fn constraints_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let m = self.num_constraints();
        let n = self.n;
        let mut jac = DMatrix::<f64>::zeros(m, n);
        for j in 0..m {
            jac.row_mut(j).copy_from(&self.row_gradient(j + 1, x).transpose());
        }
        jac
    }

    /// Lagrangian `sigma * f(x) - lambda^T c(x)`
    pub fn lagrangian(&self, x: &DVector<f64>, lambda: &DVector<f64>, sigma: f64) -> f64 {
        let mut value = sigma * self.objective(x);
        for j in 0..self.num_constraints() {
            value -= lambda[j] * self.constraint(j, x);
        }
        value
    }

    /// Gradient of the Lagrangian with respect to `x`
    pub fn lagrangian_gradient(
        &self,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        sigma: f64,
    ) -> DVector<f64> {
        let mut grad = self.objective_gradient(x) * sigma;
        for j in 0..self.num_constraints() {
            grad.axpy(-lambda[j], &self.constraint_gradient(j, x), 1.0);
        }
        grad
    }

    /// Hessian of the Lagrangian (constant in `x`)
    pub fn lagrangian_hessian(&self, lambda: &DVector<f64>, sigma: f64) -> DMatrix<f64> {
        let mut hess = self.objective_hessian() * sigma;
        for j in 0..self.num_constraints() {
            hess += self.constraint_hessian(j) * (-lambda[j]);
        }
        hess
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> QuadModel {
        // f(x) = 1 + 2 x1 + 3 x2 + 0.5 (4 x1^2 + 6 x2^2) + 5 x1 x2
        // c1(x) = -2 + x1 + x2
        let mut coeffs = DMatrix::<f64>::zeros(2, QuadModel::num_coefficients(2));
        coeffs[(0, 0)] = 1.0;
        coeffs[(0, 1)] = 2.0;
        coeffs[(0, 2)] = 3.0;
        coeffs[(0, 3)] = 4.0;
        coeffs[(0, 4)] = 6.0;
        coeffs[(0, 5)] = 5.0;
        coeffs[(1, 0)] = -2.0;
        coeffs[(1, 1)] = 1.0;
        coeffs[(1, 2)] = 1.0;
        QuadModel::new(coeffs, 2).unwrap()
    }

    #[test]
    fn test_coefficient_count() {
        assert_eq!(QuadModel::num_coefficients(1), 3);
        assert_eq!(QuadModel::num_coefficients(2), 6);
        assert_eq!(QuadModel::num_coefficients(3), 10);
        assert_eq!(QuadModel::num_coefficients(4), 15);
    }

    #[test]
    fn test_new_rejects_bad_shapes() {
        let err = QuadModel::new(DMatrix::zeros(1, 5), 2).unwrap_err();
        assert!(matches!(err, ModelError::CoefficientCount { expected: 6, .. }));

        let err = QuadModel::new(DMatrix::zeros(0, 6), 2).unwrap_err();
        assert_eq!(err, ModelError::MissingObjective);

        let err = QuadModel::new(DMatrix::zeros(1, 1), 0).unwrap_err();
        assert_eq!(err, ModelError::ZeroDimension);
    }

    #[test]
    fn test_objective_evaluation() {
        let model = sample_model();
        let x = DVector::from_vec(vec![1.0, -1.0]);
        // 1 + 2 - 3 + 0.5*(4 + 6) - 5 = 0
        assert!((model.objective(&x) - 0.0).abs() < 1e-14);

        let grad = model.objective_gradient(&x);
        // [2 + 4*1 + 5*(-1), 3 + 6*(-1) + 5*1] = [1, 2]
        assert!((grad[0] - 1.0).abs() < 1e-14);
        assert!((grad[1] - 2.0).abs() < 1e-14);

        let hess = model.objective_hessian();
        assert_eq!(hess[(0, 0)], 4.0);
        assert_eq!(hess[(1, 1)], 6.0);
        assert_eq!(hess[(0, 1)], 5.0);
        assert_eq!(hess[(1, 0)], 5.0);
    }

    #[test]
    fn test_constraints_and_jacobian() {
        let model = sample_model();
        assert_eq!(model.num_constraints(), 1);
        let x = DVector::from_vec(vec![0.5, 0.5]);
        assert!((model.constraint(0, &x) + 1.0).abs() < 1e-14);

        let jac = model.constraints_jacobian(&x);
        assert_eq!(jac.nrows(), 1);
        assert_eq!(jac[(0, 0)], 1.0);
        assert_eq!(jac[(0, 1)], 1.0);
    }

    #[test]
    fn test_from_quadratic_round_trip() {
        let grad = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let hess = DMatrix::from_row_slice(
            3,
            3,
            &[2.0, 0.3, -0.1, 0.3, 1.5, 0.7, -0.1, 0.7, 4.0],
        );
        let model = QuadModel::from_quadratic(-3.0, &grad, &hess);

        let x = DVector::from_vec(vec![0.4, -1.2, 2.0]);
        let expected = -3.0 + grad.dot(&x) + 0.5 * (&hess * &x).dot(&x);
        assert!((model.objective(&x) - expected).abs() < 1e-12);

        let g = model.objective_gradient(&x);
        let expected_g = &grad + &hess * &x;
        assert!((g - expected_g).norm() < 1e-12);
        assert!((model.objective_hessian() - hess).norm() < 1e-14);
    }

    #[test]
    fn test_lagrangian_identity() {
        let model = sample_model();
        let x = DVector::from_vec(vec![0.3, -0.7]);
        let lambda = DVector::from_vec(vec![-1.5]);

        let expected = model.objective(&x) - lambda[0] * model.constraint(0, &x);
        assert!((model.lagrangian(&x, &lambda, 1.0) - expected).abs() < 1e-14);

        let g = model.lagrangian_gradient(&x, &lambda, 1.0);
        let expected_g =
            model.objective_gradient(&x) - model.constraint_gradient(0, &x) * lambda[0];
        assert!((g - expected_g).norm() < 1e-14);
    }
}
