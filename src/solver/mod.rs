//! Solver family for bound- and inequality-constrained quadratic models
//!
//! Three entry points share a common calling convention: the iterate is passed
//! as `&mut DVector<f64>` and updated in place, and the outcome is reported as
//! a [`SolveStatus`] value rather than an error. On every status, including
//! failures, the iterate is left inside the variable bounds.
//!
//! - [`BcqpSolver`] - projected-gradient / conjugate-gradient active-set
//!   method for bound-only models
//! - [`L1AugLagSolver`] - L1 exact-penalty augmented Lagrangian for
//!   inequality-constrained models
//! - [`AugLagSolver`] - smooth augmented Lagrangian with slack variables,
//!   using [`BcqpSolver`] for its inner trust-region subproblems and
//!   [`FeasibilityRestoration`] for its initial and recovery phases

pub mod auglag;
pub mod bcqp;
pub mod l1_auglag;
pub mod restoration;

pub use auglag::{AugLagConfig, AugLagSolver};
pub use bcqp::{BcqpConfig, BcqpSolver};
pub use l1_auglag::{L1AugLagConfig, L1AugLagSolver};
pub use restoration::{FeasibilityRestoration, RestorationConfig, RestorationStatus};

use nalgebra::DVector;
use std::fmt::{self, Display, Formatter};

/// Bound pairs closer than this fix their variable and abort the solve
pub(crate) const TIGHT_BOUNDS_TOL: f64 = 1e-8;

/// Tolerance for classifying a coordinate as sitting on one of its bounds
pub(crate) const ACTIVE_BOUND_TOL: f64 = 1e-15;

/// Termination status shared by all solvers in this crate
///
/// `solve` never panics on numerical trouble; it reports one of these values
/// and leaves the iterate box-feasible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Convergence criterion satisfied
    Solved,
    /// Iteration budget exhausted before convergence
    MaxIterReached,
    /// Successive iterates stopped making progress
    StagnationIterates,
    /// A numerical failure (non-finite direction, failed factorization)
    NumericalError,
    /// Some variable has lower and upper bounds too close together
    TightVarBounds,
    /// Lower bound exceeds upper bound for some variable
    BoundsError,
    /// Model, iterate, or bound dimensions are inconsistent
    DimensionMismatch,
    /// Line search step size shrank below the representable minimum
    MinStepsizeReached,
    /// As many (or more) constraints active as variables, no working set fits
    TooManyActiveConstraints,
    /// The feasibility restoration phase failed to produce a usable point
    RestorationFailure,
}

impl Display for SolveStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Solved => write!(f, "Solved"),
            SolveStatus::MaxIterReached => write!(f, "Maximum iterations reached"),
            SolveStatus::StagnationIterates => write!(f, "Stagnation of successive iterates"),
            SolveStatus::NumericalError => write!(f, "Numerical error"),
            SolveStatus::TightVarBounds => write!(f, "Variable bounds too tight"),
            SolveStatus::BoundsError => write!(f, "Incompatible variable bounds"),
            SolveStatus::DimensionMismatch => write!(f, "Dimension mismatch"),
            SolveStatus::MinStepsizeReached => write!(f, "Minimum step size reached"),
            SolveStatus::TooManyActiveConstraints => {
                write!(f, "Too many active constraints")
            }
            SolveStatus::RestorationFailure => write!(f, "Feasibility restoration failed"),
        }
    }
}

/// Clamp `x` componentwise into `[lb, ub]`
pub(crate) fn project_onto_bounds(x: &mut DVector<f64>, lb: &DVector<f64>, ub: &DVector<f64>) {
    for i in 0..x.len() {
        x[i] = x[i].clamp(lb[i], ub[i]);
    }
}

/// Projection of `x` into `[lb, ub]`, returning a fresh vector
pub(crate) fn projection(x: &DVector<f64>, lb: &DVector<f64>, ub: &DVector<f64>) -> DVector<f64> {
    DVector::from_fn(x.len(), |i, _| x[i].clamp(lb[i], ub[i]))
}

/// Projected first-order criticality measure `|| x - P[x - g] ||_inf`
///
/// Zero exactly at a first-order stationary point of the bound-constrained
/// problem with gradient `g`.
pub(crate) fn first_order_error(
    x: &DVector<f64>,
    grad: &DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
) -> f64 {
    let mut err = 0.0_f64;
    for i in 0..x.len() {
        let projected = (x[i] - grad[i]).clamp(lb[i], ub[i]);
        err = err.max((x[i] - projected).abs());
    }
    err
}

/// True when `lb <= ub` componentwise
pub(crate) fn bounds_are_ordered(lb: &DVector<f64>, ub: &DVector<f64>) -> bool {
    (0..lb.len()).all(|i| lb[i] <= ub[i])
}

/// True when some variable's bounds are within [`TIGHT_BOUNDS_TOL`]
pub(crate) fn has_fixed_variable(lb: &DVector<f64>, ub: &DVector<f64>) -> bool {
    (0..lb.len()).any(|i| (ub[i] - lb[i]).abs() <= TIGHT_BOUNDS_TOL)
}

/// Largest `t >= 0` such that `x + t * d` stays inside `[lb, ub]`
///
/// Returns infinity when `d` points into the interior along every coordinate.
pub(crate) fn max_step_along(
    x: &DVector<f64>,
    d: &DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
) -> f64 {
    let mut t_max = f64::INFINITY;
    for i in 0..x.len() {
        if d[i] > 0.0 {
            t_max = t_max.min((ub[i] - x[i]) / d[i]);
        } else if d[i] < 0.0 {
            t_max = t_max.min((lb[i] - x[i]) / d[i]);
        }
    }
    t_max.max(0.0)
}
