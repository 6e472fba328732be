//! Bound-constrained quadratic solver
//!
//! Minimizes a quadratic model over a box:
//!
//! ```text
//! min  q(x) = c + g.x + 1/2 x^T H x
//! s.t. lb <= x <= ub
//! ```
//!
//! ## Algorithm Overview
//!
//! Active-set method in the style of More and Toraldo, alternating two
//! phases until the projected gradient is small enough:
//!
//! 1. **Projected gradient phase**: projected Armijo searches along the
//!    steepest-descent direction identify a promising face of the box. The
//!    phase stops when the working set settles or the objective decrease per
//!    sweep falls below a fraction of the best decrease seen.
//! 2. **Subspace phase**: a conjugate-gradient iteration minimizes the
//!    quadratic restricted to the free variables, with explicit negative- and
//!    zero-curvature detection. The resulting direction is pushed through a
//!    projected line search; along negative curvature the search starts from
//!    the largest box-feasible step and backtracks.
//!
//! Binding-set analysis after the first line search decides whether a second,
//! tighter conjugate-gradient sweep on the same face is worthwhile.
//!
//! The solver reports a [`SolveStatus`] and always leaves the iterate inside
//! the box, including on failure paths.
//!
//! # References
//!
//! * J. J. More and G. Toraldo, "On the Solution of Large Quadratic
//!   Programming Problems with Bound Constraints", SIAM Journal on
//!   Optimization, 1(1):93-113, 1991.
//! * A. R. Conn, N. I. M. Gould and Ph. L. Toint, "Trust-Region Methods",
//!   MPS-SIAM Series on Optimization, 2000. Chapter 17 (bound-constrained
//!   subproblems).

use nalgebra::{DMatrix, DVector};
use tracing::debug;
use web_time::Instant;

use crate::model::QuadModel;
use crate::observers::{SolveObserver, SolveObserverVec};
use crate::solver::{
    bounds_are_ordered, first_order_error, has_fixed_variable, max_step_along, project_onto_bounds,
    projection, ACTIVE_BOUND_TOL, SolveStatus,
};

/// Relative stopping tolerance on the projected gradient
const TAU: f64 = 1e-7;

/// Sufficient-decrease fraction for leaving the projected gradient phase
const KAPPA: f64 = 0.1;

/// Stagnation tolerance on successive objective values
const TOL_SUCCESSIVE_OBJ: f64 = 1e-9;

/// Configuration for [`BcqpSolver`]
#[derive(Debug, Clone)]
pub struct BcqpConfig {
    /// Maximum number of outer iterations
    pub max_iterations: usize,
    /// Stagnation tolerance on the distance between successive iterates
    pub tol_dist_successive_x: f64,
}

impl Default for BcqpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tol_dist_successive_x: 1e-15,
        }
    }
}

impl BcqpConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of outer iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the stagnation tolerance on successive iterates
    pub fn with_tol_dist_successive_x(mut self, tol: f64) -> Self {
        self.tol_dist_successive_x = tol;
        self
    }

    /// Print the configuration at debug level
    pub fn print_configuration(&self) {
        debug!("BCQP configuration:");
        debug!("  max_iterations:        {}", self.max_iterations);
        debug!("  tol_dist_successive_x: {:.2e}", self.tol_dist_successive_x);
    }
}

/// Per-iteration statistics row, logged at debug level
struct IterationStats {
    iteration: usize,
    objective: f64,
    criticality: f64,
    n_active: usize,
    step_norm: f64,
    total_time_ms: f64,
}

impl IterationStats {
    fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>12}  {:>6}  {:>12}  {:>10}",
            "iter", "objective", "criticality", "active", "step_norm", "time_ms"
        );
    }

    fn print_line(&self) {
        debug!(
            "{:>4}  {:>13.6e}  {:>12.6e}  {:>6}  {:>12.6e}  {:>10.3}",
            self.iteration,
            self.objective,
            self.criticality,
            self.n_active,
            self.step_norm,
            self.total_time_ms
        );
    }
}

/// Projected-gradient / conjugate-gradient active-set solver for
/// bound-constrained quadratic models
///
/// The model must contain the objective row only; constrained models belong
/// to [`L1AugLagSolver`](crate::solver::L1AugLagSolver) or
/// [`AugLagSolver`](crate::solver::AugLagSolver).
#[derive(Default)]
pub struct BcqpSolver {
    config: BcqpConfig,
    observers: SolveObserverVec,
}

impl BcqpSolver {
    /// Create a solver with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver with a custom configuration
    pub fn with_config(config: BcqpConfig) -> Self {
        Self {
            config,
            observers: SolveObserverVec::new(),
        }
    }

    /// Register an observer notified at each outer iteration
    pub fn add_observer(&mut self, observer: impl SolveObserver + 'static) {
        self.observers.add(observer);
    }

    /// Minimize the model objective over `[lb, ub]`, updating `x` in place
    ///
    /// `x` serves as the starting point and receives the final iterate, which
    /// is box-feasible for every returned status.
    pub fn solve(
        &self,
        x: &mut DVector<f64>,
        model: &QuadModel,
        lb: &DVector<f64>,
        ub: &DVector<f64>,
    ) -> SolveStatus {
        let n = model.dimension();
        if model.num_constraints() != 0
            || x.len() != n
            || lb.len() != n
            || ub.len() != n
        {
            return SolveStatus::DimensionMismatch;
        }
        if !bounds_are_ordered(lb, ub) {
            return SolveStatus::BoundsError;
        }
        // Fixed variables are rejected before any modification of x
        if has_fixed_variable(lb, ub) {
            return SolveStatus::TightVarBounds;
        }

        project_onto_bounds(x, lb, ub);
        self.config.print_configuration();

        let start_time = Instant::now();
        let mut grad = model.objective_gradient(x);
        let ng0 = grad.amax();

        let mut active_lower = vec![false; n];
        let mut active_upper = vec![false; n];
        let mut dist_x_loop = f64::INFINITY;
        let mut dist_obj_loop = f64::INFINITY;
        let mut active_sets_changed = true;

        IterationStats::print_header();

        let mut status = SolveStatus::MaxIterReached;
        let mut iteration = 0;
        while iteration < self.config.max_iterations {
            let criticality = first_order_error(x, &grad, lb, ub);
            snap_and_classify(x, lb, ub, &mut active_lower, &mut active_upper);
            let n_active = count_active(&active_lower, &active_upper);

            let objective = model.objective(x);
            let stats = IterationStats {
                iteration,
                objective,
                criticality,
                n_active,
                step_norm: if dist_x_loop.is_finite() { dist_x_loop } else { 0.0 },
                total_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
            };
            stats.print_line();
            self.observers
                .set_iteration_metrics(objective, criticality, 0.0, stats.step_norm);
            self.observers.notify(x, iteration);

            if criticality <= TAU * ng0.max(1.0) {
                status = SolveStatus::Solved;
                break;
            }
            if n_active == n && all_bounds_binding(&grad, &active_lower, &active_upper) {
                status = SolveStatus::Solved;
                break;
            }
            if !active_sets_changed
                && (dist_x_loop <= self.config.tol_dist_successive_x
                    || dist_obj_loop <= TOL_SUCCESSIVE_OBJ)
            {
                status = SolveStatus::StagnationIterates;
                break;
            }

            let xm = x.clone();
            let fxm = objective;
            let prev_lower = active_lower.clone();
            let prev_upper = active_upper.clone();

            projected_gradient_phase(model, x, &mut grad, lb, ub, &mut active_lower, &mut active_upper);

            classify_active(x, lb, ub, &mut active_lower, &mut active_upper);
            grad = model.objective_gradient(x);

            let mut free: Vec<usize> = (0..n)
                .filter(|&i| !(active_lower[i] || active_upper[i]))
                .collect();
            if free.is_empty() {
                // Fully active iterate: a bound whose gradient component
                // points into the interior is not binding and is released
                free = (0..n)
                    .filter(|&i| {
                        (active_lower[i] && grad[i] < 0.0)
                            || (active_upper[i] && grad[i] > 0.0)
                    })
                    .collect();
                if free.is_empty() {
                    status = SolveStatus::Solved;
                    break;
                }
                for &i in &free {
                    active_lower[i] = false;
                    active_upper[i] = false;
                }
            }

            // Reduced quadratic on the free variables
            let hess = model.objective_hessian();
            let gz = DVector::from_fn(free.len(), |k, _| grad[free[k]]);
            let zhz = DMatrix::from_fn(free.len(), free.len(), |r, c| hess[(free[r], free[c])]);

            let mut dz = DVector::<f64>::zeros(free.len());
            let has_negative_curvature = conjugate_gradient_step(&mut dz, &zhz, &gz, 1e-3);

            let mut d = embed_direction(&dz, &free, n);
            if d.iter().any(|v| v.is_nan()) {
                status = SolveStatus::NumericalError;
                break;
            }
            line_search_step(
                model,
                x,
                &mut grad,
                &d,
                lb,
                ub,
                &mut active_lower,
                &mut active_upper,
                has_negative_curvature,
            );

            // An active variable whose multiplier sign is wrong is not binding;
            // in that case restart the outer loop to change the working face.
            let binding_matches_active = (0..n).all(|i| {
                let active = active_lower[i] || active_upper[i];
                let binding = (active_lower[i] && grad[i] >= 0.0)
                    || (active_upper[i] && grad[i] <= 0.0);
                binding == active
            });
            if !binding_matches_active {
                dist_x_loop = (&*x - &xm).norm();
                dist_obj_loop = (fxm - model.objective(x)).abs();
                active_sets_changed =
                    prev_lower == active_lower && prev_upper == active_upper;
                iteration += 1;
                continue;
            }

            // Second, tighter conjugate-gradient sweep on the same face,
            // warm-started from the previous reduced direction
            let has_negative_curvature = conjugate_gradient_step(&mut dz, &zhz, &gz, 1e-5);
            d = embed_direction(&dz, &free, n);
            if d.iter().any(|v| v.is_nan()) {
                status = SolveStatus::NumericalError;
                break;
            }
            line_search_step(
                model,
                x,
                &mut grad,
                &d,
                lb,
                ub,
                &mut active_lower,
                &mut active_upper,
                has_negative_curvature,
            );

            dist_x_loop = (&*x - &xm).norm();
            dist_obj_loop = (fxm - model.objective(x)).abs();
            active_sets_changed =
                prev_lower != active_lower || prev_upper != active_upper;
            iteration += 1;
        }

        debug!(
            "BCQP finished: {} | objective: {:.6e} | criticality: {:.6e} | iterations: {} | elapsed: {:.3} ms",
            status,
            model.objective(x),
            first_order_error(x, &model.objective_gradient(x), lb, ub),
            iteration,
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        status
    }
}

/// Snap coordinates within [`ACTIVE_BOUND_TOL`] of a bound onto it, then mark
/// the active sets by exact comparison
fn snap_and_classify(
    x: &mut DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
    active_lower: &mut [bool],
    active_upper: &mut [bool],
) {
    for i in 0..x.len() {
        if (x[i] - lb[i]).abs() <= ACTIVE_BOUND_TOL {
            x[i] = lb[i];
        }
        if (x[i] - ub[i]).abs() <= ACTIVE_BOUND_TOL {
            x[i] = ub[i];
        }
        active_lower[i] = x[i] == lb[i];
        active_upper[i] = x[i] == ub[i];
    }
}

/// Mark the active sets without moving the iterate
fn classify_active(
    x: &DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
    active_lower: &mut [bool],
    active_upper: &mut [bool],
) {
    for i in 0..x.len() {
        active_lower[i] = (x[i] - lb[i]).abs() <= ACTIVE_BOUND_TOL;
        active_upper[i] = (x[i] - ub[i]).abs() <= ACTIVE_BOUND_TOL;
    }
}

fn count_active(active_lower: &[bool], active_upper: &[bool]) -> usize {
    (0..active_lower.len())
        .filter(|&i| active_lower[i] || active_upper[i])
        .count()
}

/// True when every active variable is blocked by its bound: at the lower
/// bound the gradient component must satisfy `grad >= 0`, at the upper bound
/// `grad <= 0`
fn all_bounds_binding(
    grad: &DVector<f64>,
    active_lower: &[bool],
    active_upper: &[bool],
) -> bool {
    (0..grad.len()).all(|i| {
        if active_lower[i] {
            grad[i] >= 0.0
        } else if active_upper[i] {
            grad[i] <= 0.0
        } else {
            true
        }
    })
}

/// Scatter the reduced direction back into full space, zero on active variables
fn embed_direction(dz: &DVector<f64>, free: &[usize], n: usize) -> DVector<f64> {
    let mut d = DVector::<f64>::zeros(n);
    for (k, &i) in free.iter().enumerate() {
        d[i] = dz[k];
    }
    d
}

/// Projected steepest-descent sweeps used to identify a working face
fn projected_gradient_phase(
    model: &QuadModel,
    x: &mut DVector<f64>,
    grad: &mut DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
    active_lower: &mut [bool],
    active_upper: &mut [bool],
) {
    let n = x.len();
    let mut qm = model.objective(x);
    let mut diff_decrease = 0.0_f64;

    for _ in 0..n {
        let prev_active: Vec<bool> =
            (0..n).map(|i| active_lower[i] || active_upper[i]).collect();

        *grad = model.objective_gradient(x);
        let d = -grad.clone();
        let slope = -grad.norm_squared();
        let ak = projected_armijo_line_search(model, x, &d, lb, ub, qm, slope, 1.0);

        x.axpy(ak, &d, 1.0);
        project_onto_bounds(x, lb, ub);
        classify_active(x, lb, ub, active_lower, active_upper);

        let same_face =
            (0..n).all(|i| (active_lower[i] || active_upper[i]) == prev_active[i]);
        if same_face {
            break;
        }

        let qmp = model.objective(x);
        if qm - qmp <= KAPPA * diff_decrease {
            break;
        }
        diff_decrease = diff_decrease.max(qm - qmp);
        qm = qmp;
    }
}

/// Projected Armijo line search with a bounded Wolfe-type expansion
///
/// Returns the accepted step, or 0 when no step satisfying the sufficient
/// decrease condition exists above the smallest representable step.
fn projected_armijo_line_search(
    model: &QuadModel,
    x_start: &DVector<f64>,
    d: &DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
    f0: f64,
    slope: f64,
    t_max: f64,
) -> f64 {
    const ARMIJO_TOL: f64 = 1e-4;
    const T_SMALL: f64 = 1e-15;
    const T_DECREASE: f64 = 2.5;
    const WOLFE_TOL: f64 = 0.9999;
    const WOLFE_ITER_MAX: usize = 5;
    const T_INCREASE: f64 = 5.0;

    let trial = |t: f64| -> DVector<f64> {
        let mut xt = x_start + d * t;
        project_onto_bounds(&mut xt, lb, ub);
        xt
    };

    let mut tk = t_max.min(1.0);
    let mut xt = trial(tk);
    let mut fkp = model.objective(&xt);
    let mut slope_t = d.dot(&model.objective_gradient(&xt));

    // Expand the step while both the curvature and decrease conditions allow it
    let mut wolfe_iter = 0;
    while slope_t < WOLFE_TOL * slope
        && fkp <= f0 + ARMIJO_TOL * tk * slope
        && wolfe_iter < WOLFE_ITER_MAX
        && tk <= t_max
    {
        tk *= T_INCREASE;
        xt = trial(tk);
        fkp = model.objective(&xt);
        slope_t = d.dot(&model.objective_gradient(&xt));
        wolfe_iter += 1;
    }

    // Backtrack until the sufficient decrease condition holds
    let mut armijo = fkp <= f0 + ARMIJO_TOL * tk * slope;
    while !armijo && tk > T_SMALL {
        tk /= T_DECREASE;
        xt = trial(tk);
        fkp = model.objective(&xt);
        armijo = fkp <= f0 + ARMIJO_TOL * tk * slope;
    }

    if armijo { tk } else { 0.0 }
}

/// Conjugate gradient on the reduced quadratic `1/2 v^T H v + g.v`
///
/// `v` is used as a warm start and receives the final reduced direction.
/// Returns true when the iteration stopped on non-positive curvature, in
/// which case the caller must treat `v` as a negative-curvature direction.
fn conjugate_gradient_step(
    v: &mut DVector<f64>,
    h: &DMatrix<f64>,
    g: &DVector<f64>,
    xi: f64,
) -> bool {
    const ATOL: f64 = 1e-7;
    const RTOL: f64 = 1e-7;

    let n = g.len();
    let mut avk = h * &*v;
    let mut r = g + &avk;
    let mut s = -r.clone();
    let mut gamma = r.dot(&r);
    let s_norm_square = gamma;
    let mut r_norm = gamma.sqrt();
    let tol = ATOL + RTOL * r_norm;

    let mut s_as = 0.0_f64;
    let mut solved = r_norm <= tol;
    let mut zero_curvature = false;

    let mut diff_qmqmp = 0.0_f64;
    let mut qm = 0.5 * avk.dot(v) + v.dot(g);

    let max_iter = 2 * n;
    let mut iter = 0;
    while !(iter >= max_iter || solved || zero_curvature) {
        let hs = h * &s;
        s_as = hs.dot(&s);

        if s_as <= ATOL * ATOL * s_norm_square {
            if s_as.abs() <= ATOL * s_norm_square {
                zero_curvature = true;
            }
            // At iteration 0 fall back to steepest descent; later on the
            // previous candidate is returned as-is
            if iter == 0 {
                *v = -g.clone();
            }
            solved = true;
            continue;
        }

        let alpha = gamma / s_as;
        v.axpy(alpha, &s, 1.0);
        r.axpy(alpha, &hs, 1.0);

        let gammap = r.dot(&r);
        r_norm = gammap.sqrt();
        if r_norm <= tol {
            solved = true;
            continue;
        }

        let beta = gammap / gamma;
        s = s * beta - &r;
        gamma = gammap;

        avk = h * &*v;
        let qmp = 0.5 * avk.dot(v) + v.dot(g);
        if qm - qmp <= xi * diff_qmqmp {
            solved = true;
        }
        diff_qmqmp = diff_qmqmp.max(qm - qmp);
        qm = qmp;
        iter += 1;
    }

    solved && s_as <= 0.0
}

/// Line search along `d`, updating the iterate, the active sets, and the
/// gradient; returns `(a_max, a_k)`
#[allow(clippy::too_many_arguments)]
fn line_search_step(
    model: &QuadModel,
    x: &mut DVector<f64>,
    grad: &mut DVector<f64>,
    d: &DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
    active_lower: &mut [bool],
    active_upper: &mut [bool],
    has_negative_curvature: bool,
) -> (f64, f64) {
    let a_max = max_step_along(x, d, lb, ub);

    let a_k = if has_negative_curvature {
        // Along negative curvature the objective decreases without limit
        // inside the box, so start from the boundary step
        let mut xp = projection(&(&*x + d * a_max), lb, ub);
        let fx = model.objective(x);
        if model.objective(&xp) <= fx {
            a_max
        } else {
            let mut stepsize = a_max;
            const MAX_TRIALS: usize = 10;
            for _ in 0..MAX_TRIALS {
                xp = projection(&(&*x + d * stepsize), lb, ub);
                let qxp = model.objective(&xp);
                let slope = grad.dot(&(&xp - &*x));
                if qxp <= fx + 1e-4 * slope {
                    break;
                }
                stepsize /= 3.0;
            }
            if model.objective(&xp) <= fx { stepsize } else { 0.0 }
        }
    } else {
        let slope = d.dot(grad);
        let fx = model.objective(x);
        if a_max > 1e-15 {
            projected_armijo_line_search(model, x, d, lb, ub, fx, slope, a_max)
        } else {
            0.0
        }
    };

    if a_k > 0.0 {
        x.axpy(a_k, d, 1.0);
        project_onto_bounds(x, lb, ub);
        classify_active(x, lb, ub, active_lower, active_upper);
    }
    *grad = model.objective_gradient(x);

    (a_max, a_k)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_model(constant: f64, linear: f64, quad: f64) -> QuadModel {
        let grad = DVector::from_vec(vec![linear]);
        let hess = DMatrix::from_vec(1, 1, vec![quad]);
        QuadModel::from_quadratic(constant, &grad, &hess)
    }

    #[test]
    fn test_interior_minimum() {
        // (x - 3)^2 = 9 - 6x + x^2
        let model = scalar_model(9.0, -6.0, 2.0);
        let lb = DVector::from_vec(vec![0.0]);
        let ub = DVector::from_vec(vec![5.0]);
        let mut x = DVector::from_vec(vec![0.0]);

        let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::Solved);
        assert!((x[0] - 3.0).abs() < 1e-6, "expected 3, got {}", x[0]);
    }

    #[test]
    fn test_minimum_on_bound() {
        let model = scalar_model(9.0, -6.0, 2.0);
        let lb = DVector::from_vec(vec![4.0]);
        let ub = DVector::from_vec(vec![5.0]);
        let mut x = DVector::from_vec(vec![5.0]);

        let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::Solved);
        assert!((x[0] - 4.0).abs() < 1e-6, "expected 4, got {}", x[0]);
    }

    #[test]
    fn test_releases_non_binding_bound_after_overshoot() {
        // The first steepest-descent sweep overshoots the interior minimizer
        // onto the upper bound; the bound is not binding there and must be
        // released instead of reported as optimal
        let model = scalar_model(9.0, -6.0, 2.0);
        let lb = DVector::from_vec(vec![0.0]);
        let ub = DVector::from_vec(vec![5.0]);
        let mut x = DVector::from_vec(vec![0.5]);

        let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::Solved);
        assert!((x[0] - 3.0).abs() < 1e-6, "expected 3, got {}", x[0]);
    }

    #[test]
    fn test_all_bounds_binding_uses_gradient_signs() {
        let grad = DVector::from_vec(vec![1.0, -1.0]);
        assert!(all_bounds_binding(&grad, &[true, false], &[false, true]));
        assert!(!all_bounds_binding(&grad, &[false, true], &[true, false]));
    }

    #[test]
    fn test_tight_bounds_leave_x_unchanged() {
        let model = scalar_model(9.0, -6.0, 2.0);
        let lb = DVector::from_vec(vec![2.0]);
        let ub = DVector::from_vec(vec![2.0 + 1e-9]);
        let mut x = DVector::from_vec(vec![7.0]);

        let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::TightVarBounds);
        assert_eq!(x[0], 7.0, "iterate must not move on tight bounds");
    }

    #[test]
    fn test_incompatible_bounds() {
        let model = scalar_model(0.0, 1.0, 1.0);
        let lb = DVector::from_vec(vec![1.0]);
        let ub = DVector::from_vec(vec![0.0]);
        let mut x = DVector::from_vec(vec![0.5]);
        let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::BoundsError);
    }

    #[test]
    fn test_rejects_constrained_model() {
        let mut coeffs = DMatrix::<f64>::zeros(2, QuadModel::num_coefficients(1));
        coeffs[(0, 2)] = 1.0;
        let model = QuadModel::new(coeffs, 1).unwrap();
        let lb = DVector::from_vec(vec![0.0]);
        let ub = DVector::from_vec(vec![1.0]);
        let mut x = DVector::from_vec(vec![0.5]);
        let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::DimensionMismatch);
    }

    #[test]
    fn test_convex_two_dimensional() {
        // f(x) = (x1 - 1)^2 + (x2 + 2)^2, minimum at (1, -2)
        let grad = DVector::from_vec(vec![-2.0, 4.0]);
        let hess = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]);
        let model = QuadModel::from_quadratic(5.0, &grad, &hess);

        let lb = DVector::from_vec(vec![-10.0, -10.0]);
        let ub = DVector::from_vec(vec![10.0, 10.0]);
        let mut x = DVector::from_vec(vec![8.0, 8.0]);

        let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::Solved);
        assert!((x[0] - 1.0).abs() < 1e-5);
        assert!((x[1] + 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_indefinite_model_stays_feasible() {
        // Saddle: f(x) = x1^2 - x2^2
        let grad = DVector::zeros(2);
        let hess = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, -2.0]);
        let model = QuadModel::from_quadratic(0.0, &grad, &hess);

        let lb = DVector::from_vec(vec![-1.0, -1.0]);
        let ub = DVector::from_vec(vec![1.0, 1.0]);
        let mut x = DVector::from_vec(vec![0.3, 0.1]);
        let f0 = model.objective(&x);

        let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_ne!(status, SolveStatus::NumericalError);
        for i in 0..2 {
            assert!(x[i] >= lb[i] - 1e-12 && x[i] <= ub[i] + 1e-12);
        }
        // The negative curvature direction must not be wasted
        assert!(model.objective(&x) <= f0 + 1e-12);
    }

    #[test]
    fn test_conjugate_gradient_solves_spd_system() {
        let h = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let g = DVector::from_vec(vec![1.0, 2.0]);
        let mut v = DVector::zeros(2);
        let has_neg = conjugate_gradient_step(&mut v, &h, &g, 1e-3);
        assert!(!has_neg);
        // v should approximately solve H v = -g
        let res = &h * &v + &g;
        assert!(res.norm() < 1e-4, "residual too large: {}", res.norm());
    }

    #[test]
    fn test_conjugate_gradient_detects_negative_curvature() {
        let h = DMatrix::from_row_slice(2, 2, &[-2.0, 0.0, 0.0, -1.0]);
        let g = DVector::from_vec(vec![1.0, 1.0]);
        let mut v = DVector::zeros(2);
        let has_neg = conjugate_gradient_step(&mut v, &h, &g, 1e-3);
        assert!(has_neg, "negative curvature should be flagged");
    }

    #[test]
    fn test_idempotence_at_solution() {
        let model = scalar_model(9.0, -6.0, 2.0);
        let lb = DVector::from_vec(vec![0.0]);
        let ub = DVector::from_vec(vec![5.0]);
        let mut x = DVector::from_vec(vec![0.0]);

        assert_eq!(BcqpSolver::new().solve(&mut x, &model, &lb, &ub), SolveStatus::Solved);
        let x_first = x.clone();
        assert_eq!(BcqpSolver::new().solve(&mut x, &model, &lb, &ub), SolveStatus::Solved);
        assert!((x - x_first).norm() < 1e-10, "resolving must not move the solution");
    }
}
