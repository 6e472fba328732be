//! Error types for the quad-solver library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.
//!
//! # Error Hierarchy
//!
//! The library uses a hierarchical error system where:
//! - **`QuadSolverError`** is the top-level error exposed to users via public APIs
//! - **Module errors** (`ModelError`, `LinAlgError`, etc.) are wrapped inside QuadSolverError
//! - **Error sources** are preserved, allowing full error chain inspection
//!
//! Note that the solvers themselves report outcomes through `SolveStatus` values
//! rather than errors; `QuadSolverError` covers construction and setup failures.
//!
//! Example error chain:
//! ```text
//! QuadSolverError::Model(
//!     ModelError::CoefficientCount {
//!         cols: 5,
//!         dimension: 2,
//!         expected: 6,
//!     }
//! )
//! ```

use crate::{linalg::LinAlgError, model::ModelError, observers::ObserverError};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the quad-solver library
pub type QuadSolverResult<T> = Result<T, QuadSolverError>;

/// Main error type for the quad-solver library
///
/// This is the top-level error type exposed by public APIs. It wraps module-specific
/// errors while preserving the full error chain for debugging.
///
/// # Error Chain Access
///
/// You can access the full error chain using the `chain()` method:
///
/// ```rust,ignore
/// if let Err(e) = QuadModel::new(coeffs, n) {
///     warn!("Error: {}", e);
///     warn!("Full chain: {}", QuadSolverError::from(e).chain());
/// }
/// ```
#[derive(Debug, Error)]
pub enum QuadSolverError {
    /// Quadratic model construction errors
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Linear algebra errors
    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    /// Observer errors
    #[error(transparent)]
    Observer(#[from] ObserverError),
}

// Module-specific errors are automatically converted via #[from] attributes above

impl QuadSolverError {
    /// Get the full error chain as a string for logging and debugging.
    ///
    /// This method traverses the error source chain and returns a formatted string
    /// showing the hierarchy of errors from the top-level QuadSolverError down to the
    /// root cause.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    ///
    /// Similar to `chain()` but formats as a single line with arrow separators.
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_solver_error_display() {
        let model_error = ModelError::MissingObjective;
        let error = QuadSolverError::from(model_error);
        assert!(error.to_string().contains("objective"));
    }

    #[test]
    fn test_quad_solver_error_chain() {
        let linalg_error = LinAlgError::SolveFailed("SVD least-squares solve failed".to_string());
        let error = QuadSolverError::from(linalg_error);

        let chain = error.chain();
        assert!(chain.contains("SVD"));
    }

    #[test]
    fn test_quad_solver_error_chain_compact() {
        let model_error = ModelError::ZeroDimension;
        let error = QuadSolverError::from(model_error);

        let chain_compact = error.chain_compact();
        assert!(chain_compact.contains("at least 1"));
    }

    #[test]
    fn test_quad_solver_result_ok() {
        let result: QuadSolverResult<i32> = Ok(42);
        assert!(result.is_ok());
        if let Ok(value) = result {
            assert_eq!(value, 42);
        }
    }

    #[test]
    fn test_transparent_error_conversion() {
        // Test automatic conversion via #[from]
        let model_error = ModelError::CoefficientCount {
            cols: 5,
            dimension: 2,
            expected: 6,
        };

        let quad_error: QuadSolverError = model_error.into();
        match quad_error {
            QuadSolverError::Model(_) => { /* Expected */ }
            _ => panic!("Expected Model variant"),
        }
    }
}
