//! # Quad Solver
//!
//! A Rust library for minimizing quadratic surrogate models under variable
//! bounds and quadratic inequality constraints, as used by derivative-free
//! optimization methods that build local models of expensive blackbox
//! functions.
//!
//! ## Features
//!
//! - **Compact Model Representation**: One coefficient row per output over a
//!   shared `[constant | linear | Hessian]` layout, with typed evaluation of
//!   values, gradients, Hessians, and Lagrangian quantities
//! - **Bound-Constrained Solver**: Projected-gradient / conjugate-gradient
//!   active-set method for bound-only quadratic programs
//! - **Two Constrained Solvers**: An L1 exact-penalty augmented Lagrangian
//!   and a smooth slack-based augmented Lagrangian, both reducing to
//!   bound-constrained subproblems
//! - **Status-Based Outcomes**: Solvers never panic on numerical trouble;
//!   they report a `SolveStatus` and always leave the iterate box-feasible
//! - **Observability**: Pluggable iteration observers and `tracing`-based
//!   iteration tables
//!
//! ## Solver Types
//!
//! - **BcqpSolver**: Bound-constrained quadratic programs
//! - **L1AugLagSolver**: Inequality constraints via an L1 exact penalty and
//!   active-set inner iterations
//! - **AugLagSolver**: Inequality constraints via slack variables and
//!   non-monotone trust-region inner iterations

pub mod error;
pub mod linalg;
pub mod logger;
pub mod model;
pub mod observers;
pub mod solver;

// Re-export model types
pub use model::{ModelError, QuadModel};

pub use error::{QuadSolverError, QuadSolverResult};
pub use linalg::LinAlgError;
pub use logger::{init_logger, init_logger_with_level};
pub use observers::{SolveObserver, SolveObserverVec};
pub use solver::{
    AugLagConfig, AugLagSolver, BcqpConfig, BcqpSolver, FeasibilityRestoration, L1AugLagConfig,
    L1AugLagSolver, RestorationConfig, RestorationStatus, SolveStatus,
};
