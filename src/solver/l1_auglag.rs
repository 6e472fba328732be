//! L1 exact-penalty augmented Lagrangian solver
//!
//! Minimizes a quadratic model objective subject to the model's inequality
//! constraints and variable bounds:
//!
//! ```text
//! min  f(x)
//! s.t. c(x) <= 0
//!      lb <= x <= ub
//! ```
//!
//! ## Algorithm Overview
//!
//! The outer loop drives the multiplier estimate `lambda`, the penalty
//! parameter `mu`, and the feasibility/optimality targets `eta`/`omega`. Each
//! outer iteration approximately minimizes the L1 exact penalty function
//!
//! ```text
//! P(x) = L(x, lambda) + (1/mu) * sum_j max(0, c_j(x))
//! ```
//!
//! over the box. The inner loop is an active-set method on `P`: constraints
//! within a working precision of zero form the active set, infeasible
//! constraints contribute `-1/mu` to the working multipliers, and the
//! candidate multipliers `lambda_b` of the active set come from a
//! least-squares fit of the active Jacobian against the pseudo-gradient.
//! Search directions are
//!
//! - a *horizontal step* minimizing the Lagrangian model on the tangent space
//!   of the active constraints,
//! - a *drop-constraint step* leaving one active constraint whose candidate
//!   multiplier has the wrong sign,
//! - a *vertical step* restoring feasibility of the active constraints after
//!   a horizontal move, and
//! - a *strengthened step* recomputed under tightened working tolerances
//!   when everything else stalls.
//!
//! Moves along non-smooth directions use a piecewise line search that walks
//! the breakpoints of the penalty term before falling back to quadratic
//! interpolation and a plain Armijo backtrack.
//!
//! Because the constraints are posed as `c(x) <= 0`, the candidate
//! multipliers of the active set are nonpositive at optimality: `lambda_b`
//! is accepted exactly when every component lies in `[-1/mu, 0]`. (The
//! classical derivation poses `c(x) >= 0` and obtains the mirrored interval
//! `[0, 1/mu]`.)
//!
//! # References
//!
//! * T. F. Coleman and A. R. Conn, "Nonlinear programming via an exact
//!   penalty function: Global analysis", Mathematical Programming,
//!   24(1):137-161, 1982.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};
use web_time::Instant;

use crate::linalg::{null_space_projector, solve_least_squares, LinAlgResult};
use crate::model::QuadModel;
use crate::observers::{SolveObserver, SolveObserverVec};
use crate::solver::{
    bounds_are_ordered, first_order_error, has_fixed_variable, project_onto_bounds, projection,
    SolveStatus,
};

/// Floor for the working optimality tolerance of the inner loop
const MIN_INNER_TOL_OPT: f64 = 1e-5;

/// Floor for the working constraint-classification precision of the inner loop
const MIN_INNER_PRECISION: f64 = 1e-5;

/// Smallest step size accepted by the piecewise line search
const SMALL_GAMMA: f64 = 1e-15;

/// Backtracking divisor of the piecewise line search
const GAMMA_UPDATE: f64 = 1.5;

/// Sufficient-decrease offset of the piecewise line search
const PIECEWISE_DELTA: f64 = 1e-7;

/// Configuration for [`L1AugLagSolver`]
#[derive(Debug, Clone)]
pub struct L1AugLagConfig {
    /// Maximum number of outer (multiplier update) iterations
    pub max_outer_iterations: usize,
    /// Maximum number of inner (active-set) iterations per outer iteration
    pub max_inner_iterations: usize,
    /// Stagnation tolerance on the distance between successive inner iterates
    pub tol_dist_successive_x: f64,
    /// Relative stopping tolerance on the projected Lagrangian gradient
    pub tol_opt: f64,
    /// Relative stopping tolerance on the constraint violation
    pub tol_feas: f64,
}

impl Default for L1AugLagConfig {
    fn default() -> Self {
        Self {
            max_outer_iterations: 50,
            max_inner_iterations: 100,
            tol_dist_successive_x: 1e-15,
            tol_opt: 1e-5,
            tol_feas: 1e-5,
        }
    }
}

impl L1AugLagConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outer iteration budget
    pub fn with_max_outer_iterations(mut self, max_outer_iterations: usize) -> Self {
        self.max_outer_iterations = max_outer_iterations;
        self
    }

    /// Set the inner iteration budget
    pub fn with_max_inner_iterations(mut self, max_inner_iterations: usize) -> Self {
        self.max_inner_iterations = max_inner_iterations;
        self
    }

    /// Set the stagnation tolerance on successive iterates
    pub fn with_tol_dist_successive_x(mut self, tol: f64) -> Self {
        self.tol_dist_successive_x = tol;
        self
    }

    /// Set the relative optimality tolerance
    pub fn with_tol_opt(mut self, tol: f64) -> Self {
        self.tol_opt = tol;
        self
    }

    /// Set the relative feasibility tolerance
    pub fn with_tol_feas(mut self, tol: f64) -> Self {
        self.tol_feas = tol;
        self
    }

    /// Print the configuration at debug level
    pub fn print_configuration(&self) {
        debug!("L1 augmented Lagrangian configuration:");
        debug!("  max_outer_iterations:  {}", self.max_outer_iterations);
        debug!("  max_inner_iterations:  {}", self.max_inner_iterations);
        debug!("  tol_dist_successive_x: {:.2e}", self.tol_dist_successive_x);
        debug!("  tol_opt:               {:.2e}", self.tol_opt);
        debug!("  tol_feas:              {:.2e}", self.tol_feas);
    }
}

/// Per-outer-iteration statistics row, logged at debug level
struct IterationStats {
    iteration: usize,
    lagrangian: f64,
    max_violation: f64,
    criticality: f64,
    mu: f64,
    eta: f64,
    omega: f64,
}

impl IterationStats {
    fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>12}  {:>10}  {:>10}  {:>10}",
            "iter", "lagrangian", "max_viol", "criticality", "mu", "eta", "omega"
        );
    }

    fn print_line(&self) {
        debug!(
            "{:>4}  {:>13.6e}  {:>13.6e}  {:>12.6e}  {:>10.3e}  {:>10.3e}  {:>10.3e}",
            self.iteration,
            self.lagrangian,
            self.max_violation,
            self.criticality,
            self.mu,
            self.eta,
            self.omega
        );
    }
}

/// State carried out of the inner loop for the outer multiplier update
struct InnerOutcome {
    status: SolveStatus,
    lambda_b: DVector<f64>,
    active: Vec<bool>,
    infeasible: Vec<bool>,
}

/// Exact-penalty active-set solver for inequality-constrained quadratic models
#[derive(Default)]
pub struct L1AugLagSolver {
    config: L1AugLagConfig,
    observers: SolveObserverVec,
}

impl L1AugLagSolver {
    /// Create a solver with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver with a custom configuration
    pub fn with_config(config: L1AugLagConfig) -> Self {
        Self {
            config,
            observers: SolveObserverVec::new(),
        }
    }

    /// Register an observer notified at each outer iteration
    pub fn add_observer(&mut self, observer: impl SolveObserver + 'static) {
        self.observers.add(observer);
    }

    /// Minimize the model objective subject to the model constraints and the
    /// box `[lb, ub]`, updating `x` in place
    pub fn solve(
        &self,
        x: &mut DVector<f64>,
        model: &QuadModel,
        lb: &DVector<f64>,
        ub: &DVector<f64>,
    ) -> SolveStatus {
        let n = model.dimension();
        let m = model.num_constraints();
        if m == 0 || x.len() != n || lb.len() != n || ub.len() != n {
            return SolveStatus::DimensionMismatch;
        }
        if !bounds_are_ordered(lb, ub) {
            return SolveStatus::BoundsError;
        }
        if has_fixed_variable(lb, ub) {
            return SolveStatus::TightVarBounds;
        }

        project_onto_bounds(x, lb, ub);
        self.config.print_configuration();

        let start_time = Instant::now();

        let mut lambda = DVector::<f64>::zeros(m);
        let mut mu = 0.1_f64;
        let mut eta = 1.0_f64;
        let mut omega = 1.0_f64;
        const SUCCESSIVE_ACCEPTABLE_BEFORE_UPDATE: usize = 2;
        const MAX_SUCCESSIVE_FAILURE: usize = 5;

        // Reference magnitudes for the relative stopping criteria
        let nproj_fx0 = first_order_error(x, &model.objective_gradient(x), lb, ub);
        let ncx0 = model
            .constraints(x)
            .iter()
            .fold(0.0_f64, |acc, &c| acc.max(c));

        let mut successive_acceptable = 0_usize;
        let mut successive_failure = 0_usize;

        IterationStats::print_header();

        let mut status = SolveStatus::MaxIterReached;
        for iteration in 0..self.config.max_outer_iterations {
            let cons = model.constraints(x);
            let grad_lk = model.lagrangian_gradient(x, &lambda, 1.0);
            let criticality = first_order_error(x, &grad_lk, lb, ub);
            let max_violation = cons.iter().fold(0.0_f64, |acc, &c| acc.max(c));

            let stats = IterationStats {
                iteration,
                lagrangian: model.lagrangian(x, &lambda, 1.0),
                max_violation,
                criticality,
                mu,
                eta,
                omega,
            };
            stats.print_line();
            self.observers
                .set_iteration_metrics(model.objective(x), criticality, max_violation, 0.0);
            self.observers.notify(x, iteration);

            if criticality <= self.config.tol_opt * nproj_fx0.max(1.0)
                && constraints_below_tol(&cons, self.config.tol_feas * ncx0.max(1.0))
            {
                status = SolveStatus::Solved;
                break;
            }
            if mu <= self.config.tol_opt / 10.0 || successive_failure >= MAX_SUCCESSIVE_FAILURE {
                status = SolveStatus::StagnationIterates;
                break;
            }

            let inner = self.solve_inner(x, model, lb, ub, &lambda, omega, mu);
            let inner_success = matches!(
                inner.status,
                SolveStatus::Solved
                    | SolveStatus::StagnationIterates
                    | SolveStatus::TooManyActiveConstraints
                    | SolveStatus::MaxIterReached
                    | SolveStatus::MinStepsizeReached
            );
            if !inner_success {
                status = inner.status;
                break;
            }

            // Early exit on the multiplier-corrected criterion
            let cons = model.constraints(x);
            let grad_lk = model.lagrangian_gradient(x, &lambda, 1.0);
            let jac = model.constraints_jacobian(x);
            let pseudo = pseudo_gradient(&grad_lk, &jac, &inner.infeasible, mu);
            let grad_ld = grad_ld(&pseudo, &jac, &inner.lambda_b, &inner.active);
            if first_order_error(x, &grad_ld, lb, ub) <= self.config.tol_opt * nproj_fx0.max(1.0)
                && constraints_below_tol(&cons, self.config.tol_feas * ncx0.max(1.0))
            {
                status = SolveStatus::Solved;
                break;
            }
            if inner.status == SolveStatus::TooManyActiveConstraints {
                status = SolveStatus::TooManyActiveConstraints;
                break;
            }

            if constraints_below_tol(&cons, eta) {
                // Feasible enough: update the multipliers and tighten eta
                for j in 0..m {
                    if inner.active[j] {
                        lambda[j] += inner.lambda_b[j];
                    }
                    if inner.infeasible[j] {
                        lambda[j] -= 1.0 / mu;
                    }
                }
                eta *= mu.powf(0.9);
                if inner.status == SolveStatus::Solved {
                    omega = (omega * mu).max(1e-7);
                    successive_acceptable = 0;
                    successive_failure = 0;
                } else if successive_acceptable >= SUCCESSIVE_ACCEPTABLE_BEFORE_UPDATE {
                    omega = (omega * mu.sqrt()).max(1e-7);
                    successive_acceptable += 1;
                    successive_failure += 1;
                } else {
                    successive_acceptable += 1;
                }
            } else {
                // Not feasible enough: increase the penalty
                if inner.status == SolveStatus::Solved {
                    mu /= 10.0;
                    successive_failure = 0;
                } else if successive_acceptable >= SUCCESSIVE_ACCEPTABLE_BEFORE_UPDATE {
                    mu /= 10.0_f64.sqrt();
                    successive_failure += 1;
                } else {
                    successive_acceptable += 1;
                }
                eta = mu.powf(0.1) / 10.0;
                omega = mu;
            }
        }

        debug!(
            "L1 augmented Lagrangian finished: {} | objective: {:.6e} | max violation: {:.6e} | elapsed: {:.3} ms",
            status,
            model.objective(x),
            model.constraints(x).iter().fold(0.0_f64, |a, &c| a.max(c)),
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        status
    }

    /// Approximate minimization of the L1 penalty function for fixed
    /// multipliers and penalty parameter
    #[allow(clippy::too_many_arguments)]
    fn solve_inner(
        &self,
        x: &mut DVector<f64>,
        model: &QuadModel,
        lb: &DVector<f64>,
        ub: &DVector<f64>,
        lambda: &DVector<f64>,
        omega: f64,
        mu: f64,
    ) -> InnerOutcome {
        let n = model.dimension();
        let m = model.num_constraints();

        // Working tolerances, tightened as the active set grows
        let mut inner_tol_opt = 1.0_f64;
        let mut inner_precision = 1.0_f64;

        let mut active = vec![false; m];
        let mut infeasible = vec![false; m];
        let mut lambda_b = DVector::<f64>::zeros(m);

        let mut cons = model.constraints(x);
        let mut grad_lk = model.lagrangian_gradient(x, lambda, 1.0);
        let mut jac = model.constraints_jacobian(x);

        let mut dist_x = f64::INFINITY;
        let mut compute_sets = true;
        let mut consider_multipliers = true;
        let mut step_size_log = 1.0_f64;

        let mut status = SolveStatus::MaxIterReached;
        for _ in 0..self.config.max_inner_iterations {
            if compute_sets {
                classify_constraints(&cons, inner_precision, &mut active, &mut infeasible);
                let mut nb_active = active.iter().filter(|&&a| a).count();
                // A working set as large as the variable space leaves no
                // tangent space; shrink the classification precision
                while nb_active >= n {
                    inner_precision /= 2.0;
                    inner_tol_opt = (inner_tol_opt / 2.0).max(MIN_INNER_TOL_OPT);
                    if inner_precision < MIN_INNER_PRECISION {
                        break;
                    }
                    classify_constraints(&cons, inner_precision, &mut active, &mut infeasible);
                    nb_active = active.iter().filter(|&&a| a).count();
                }
            }
            inner_precision = inner_precision.max(MIN_INNER_PRECISION);

            lambda_b = match active_multipliers(&grad_lk, &jac, &active, &infeasible, mu) {
                Ok(l) => l,
                Err(_) => {
                    return InnerOutcome {
                        status: SolveStatus::NumericalError,
                        lambda_b,
                        active,
                        infeasible,
                    }
                }
            };
            let pseudo = pseudo_gradient(&grad_lk, &jac, &infeasible, mu);
            let grad_ld_k = grad_ld(&pseudo, &jac, &lambda_b, &active);
            let n_ld_proj = first_order_error(x, &grad_ld_k, lb, ub);

            if n_ld_proj <= omega
                && multipliers_critical(&lambda_b, mu)
                && constraints_below_tol(&cons, MIN_INNER_PRECISION)
            {
                status = SolveStatus::Solved;
                break;
            }
            if step_size_log <= SMALL_GAMMA {
                status = SolveStatus::MinStepsizeReached;
                break;
            }
            if dist_x <= self.config.tol_dist_successive_x {
                status = SolveStatus::StagnationIterates;
                break;
            }
            let nb_active = active.iter().filter(|&&a| a).count();
            if nb_active >= n {
                status = SolveStatus::TooManyActiveConstraints;
                break;
            }

            let proj_pg_norm = first_order_error(x, &pseudo, lb, ub);
            if proj_pg_norm < MIN_INNER_TOL_OPT
                && multipliers_critical(&lambda_b, mu)
                && constraints_below_tol(&cons, MIN_INNER_PRECISION)
            {
                status = SolveStatus::Solved;
                break;
            }

            let x_prev = x.clone();

            // Branch 1: minimize on the tangent space, ignoring the candidate
            // multipliers of the active set
            if nb_active == 0 || (proj_pg_norm > inner_tol_opt && consider_multipliers) {
                let h = match horizontal_step(
                    model, x, &jac, &active, &infeasible, lambda, &lambda_b, mu, false,
                ) {
                    Ok(h) => h,
                    Err(_) => {
                        return InnerOutcome {
                            status: SolveStatus::NumericalError,
                            lambda_b,
                            active,
                            infeasible,
                        }
                    }
                };
                let step =
                    piecewise_line_search(model, x, &h, lb, ub, &active, &infeasible, lambda, mu);
                x.axpy(step, &h, 1.0);
                project_onto_bounds(x, lb, ub);

                grad_lk = model.lagrangian_gradient(x, lambda, 1.0);
                cons = model.constraints(x);
                jac = model.constraints_jacobian(x);
                dist_x = (&*x - &x_prev).norm();
                compute_sets = true;
                consider_multipliers = true;
                step_size_log = step;
                continue;
            }

            let jac_active = extract_rows(&jac, &active);

            // Branch 2: leave one active constraint with a wrong-sign multiplier
            match drop_constraint_step(&jac_active, &lambda_b, &pseudo, &active, mu) {
                Err(_) => {
                    return InnerOutcome {
                        status: SolveStatus::NumericalError,
                        lambda_b,
                        active,
                        infeasible,
                    }
                }
                Ok(Some(d)) => {
                    let step = piecewise_line_search(
                        model, x, &d, lb, ub, &active, &infeasible, lambda, mu,
                    );
                    x.axpy(step, &d, 1.0);
                    project_onto_bounds(x, lb, ub);

                    grad_lk = model.lagrangian_gradient(x, lambda, 1.0);
                    cons = model.constraints(x);
                    jac = model.constraints_jacobian(x);
                    dist_x = (&*x - &x_prev).norm();
                    compute_sets = true;
                    consider_multipliers = true;
                    step_size_log = step;
                    continue;
                }
                Ok(None) => {}
            }

            // Branch 3: non-critical multipliers, retry under tightened tolerances
            if !multipliers_critical(&lambda_b, mu) {
                let strengthened = strengthened_step(
                    model,
                    x,
                    lambda,
                    &mut active,
                    &mut infeasible,
                    &mut inner_tol_opt,
                    &mut inner_precision,
                    mu,
                );
                if inner_tol_opt < inner_precision {
                    status = SolveStatus::TooManyActiveConstraints;
                    break;
                }
                let h = match strengthened {
                    Ok(h) => h,
                    Err(_) => {
                        return InnerOutcome {
                            status: SolveStatus::NumericalError,
                            lambda_b,
                            active,
                            infeasible,
                        }
                    }
                };
                let step =
                    piecewise_line_search(model, x, &h, lb, ub, &active, &infeasible, lambda, mu);
                x.axpy(step, &h, 1.0);
                project_onto_bounds(x, lb, ub);

                grad_lk = model.lagrangian_gradient(x, lambda, 1.0);
                cons = model.constraints(x);
                jac = model.constraints_jacobian(x);
                dist_x = (&*x - &x_prev).norm();
                compute_sets = true;
                consider_multipliers = true;
                step_size_log = step;
                continue;
            }

            // Branch 4: horizontal step with the candidate multipliers,
            // followed by a vertical restoration of the active constraints
            let h = match horizontal_step(
                model, x, &jac, &active, &infeasible, lambda, &lambda_b, mu, true,
            ) {
                Ok(h) => h,
                Err(_) => {
                    return InnerOutcome {
                        status: SolveStatus::NumericalError,
                        lambda_b,
                        active,
                        infeasible,
                    }
                }
            };
            let mut xcan = projection(&(&*x + &h), lb, ub);

            // Vertical step from the active gradients at x, not at the candidate
            let cons_can = model.constraints(&xcan);
            let rhs = DVector::from_vec(
                (0..m)
                    .filter(|&j| active[j])
                    .map(|j| -cons_can[j])
                    .collect::<Vec<f64>>(),
            );
            let v = match solve_least_squares(&jac_active, &rhs) {
                Ok(v) => v,
                Err(_) => {
                    return InnerOutcome {
                        status: SolveStatus::NumericalError,
                        lambda_b,
                        active,
                        infeasible,
                    }
                }
            };
            xcan += &v;
            project_onto_bounds(&mut xcan, lb, ub);

            let n_phi: f64 = (0..m)
                .filter(|&j| active[j])
                .map(|j| cons[j].abs())
                .sum();
            let p0 = l1_merit(model, x, lambda, mu);
            let pcan = l1_merit(model, &xcan, lambda, mu);
            let sufficient_decrease =
                pcan - p0 <= -1e-6 * (proj_pg_norm * proj_pg_norm + n_phi);
            if sufficient_decrease {
                *x = xcan;

                grad_lk = model.lagrangian_gradient(x, lambda, 1.0);
                cons = model.constraints(x);
                jac = model.constraints_jacobian(x);
                dist_x = (&*x - &x_prev).norm();
                compute_sets = false;
                consider_multipliers = false;
                step_size_log = 1.0;
                continue;
            }

            // Branch 5: no decrease, strengthened step as a last resort
            let strengthened = strengthened_step(
                model,
                x,
                lambda,
                &mut active,
                &mut infeasible,
                &mut inner_tol_opt,
                &mut inner_precision,
                mu,
            );
            if inner_precision < MIN_INNER_PRECISION {
                status = SolveStatus::TooManyActiveConstraints;
                break;
            }
            let h = match strengthened {
                Ok(h) => h,
                Err(_) => {
                    return InnerOutcome {
                        status: SolveStatus::NumericalError,
                        lambda_b,
                        active,
                        infeasible,
                    }
                }
            };
            let step =
                piecewise_line_search(model, x, &h, lb, ub, &active, &infeasible, lambda, mu);
            x.axpy(step, &h, 1.0);
            project_onto_bounds(x, lb, ub);

            grad_lk = model.lagrangian_gradient(x, lambda, 1.0);
            cons = model.constraints(x);
            jac = model.constraints_jacobian(x);
            dist_x = (&*x - &x_prev).norm();
            compute_sets = true;
            consider_multipliers = true;
            step_size_log = step;
        }

        InnerOutcome {
            status,
            lambda_b,
            active,
            infeasible,
        }
    }
}

/// L1 exact penalty `L(x, lambda) + (1/mu) sum_j max(0, c_j(x))`
fn l1_merit(model: &QuadModel, x: &DVector<f64>, lambda: &DVector<f64>, mu: f64) -> f64 {
    let cons = model.constraints(x);
    let penalty: f64 = cons.iter().map(|&c| c.max(0.0)).sum();
    model.lagrangian(x, lambda, 1.0) + penalty / mu
}

fn constraints_below_tol(cons: &DVector<f64>, tol: f64) -> bool {
    cons.iter().all(|&c| c <= tol)
}

/// Active: `|c_j| <= precision`; infeasible: `c_j > precision`
fn classify_constraints(
    cons: &DVector<f64>,
    precision: f64,
    active: &mut [bool],
    infeasible: &mut [bool],
) {
    for j in 0..cons.len() {
        active[j] = cons[j].abs() <= precision;
        infeasible[j] = cons[j] > precision;
    }
}

/// Candidate multipliers are critical when every component lies in `[-1/mu, 0]`
fn multipliers_critical(lambda_b: &DVector<f64>, mu: f64) -> bool {
    lambda_b.iter().all(|&l| l <= 0.0 && l >= -1.0 / mu)
}

/// Rows of `jac` belonging to the active set
fn extract_rows(jac: &DMatrix<f64>, active: &[bool]) -> DMatrix<f64> {
    let rows: Vec<usize> = (0..active.len()).filter(|&j| active[j]).collect();
    let mut out = DMatrix::<f64>::zeros(rows.len(), jac.ncols());
    for (k, &j) in rows.iter().enumerate() {
        out.row_mut(k).copy_from(&jac.row(j));
    }
    out
}

/// Pseudo-gradient of the penalty: `grad L + (1/mu) sum_infeasible grad c_j`
fn pseudo_gradient(
    grad_lk: &DVector<f64>,
    jac: &DMatrix<f64>,
    infeasible: &[bool],
    mu: f64,
) -> DVector<f64> {
    let mut pg = grad_lk.clone();
    for j in 0..infeasible.len() {
        if infeasible[j] {
            pg.axpy(1.0 / mu, &jac.row(j).transpose(), 1.0);
        }
    }
    pg
}

/// Gradient of the penalty corrected by the candidate active multipliers
fn grad_ld(
    pseudo: &DVector<f64>,
    jac: &DMatrix<f64>,
    lambda_b: &DVector<f64>,
    active: &[bool],
) -> DVector<f64> {
    let mut g = pseudo.clone();
    for j in 0..active.len() {
        if active[j] {
            g.axpy(-lambda_b[j], &jac.row(j).transpose(), 1.0);
        }
    }
    g
}

/// Least-squares fit of the active Jacobian against the pseudo-gradient,
/// scattered back onto the full constraint index range
fn active_multipliers(
    grad_lk: &DVector<f64>,
    jac: &DMatrix<f64>,
    active: &[bool],
    infeasible: &[bool],
    mu: f64,
) -> LinAlgResult<DVector<f64>> {
    let m = active.len();
    let mut lambda_b = DVector::<f64>::zeros(m);
    let rows: Vec<usize> = (0..m).filter(|&j| active[j]).collect();
    if rows.is_empty() {
        return Ok(lambda_b);
    }

    let grad_d = pseudo_gradient(grad_lk, jac, infeasible, mu);
    let jac_active_t = {
        let mut t = DMatrix::<f64>::zeros(jac.ncols(), rows.len());
        for (k, &j) in rows.iter().enumerate() {
            t.column_mut(k).copy_from(&jac.row(j).transpose());
        }
        t
    };
    let fitted = solve_least_squares(&jac_active_t, &grad_d)?;
    for (k, &j) in rows.iter().enumerate() {
        lambda_b[j] = fitted[k];
    }
    Ok(lambda_b)
}

/// Minimizer of the Lagrangian model on the tangent space of the active
/// constraints, via the stationarity system
///
/// ```text
/// [ H  Ja^T ] [ h ]   [ -g ]
/// [ Ja  0   ] [ y ] = [  0 ]
/// ```
///
/// solved in the least-squares sense. Falls back to the negative gradient
/// when the computed direction is not a descent direction.
#[allow(clippy::too_many_arguments)]
fn horizontal_step(
    model: &QuadModel,
    x: &DVector<f64>,
    jac: &DMatrix<f64>,
    active: &[bool],
    infeasible: &[bool],
    lambda: &DVector<f64>,
    lambda_b: &DVector<f64>,
    mu: f64,
    consider_active_multipliers: bool,
) -> LinAlgResult<DVector<f64>> {
    let n = x.len();
    let m = active.len();

    let mut multipliers_hess = DVector::<f64>::zeros(m);
    let mut multipliers_grad = DVector::<f64>::zeros(m);
    for j in 0..m {
        let base = lambda[j];
        multipliers_grad[j] = if infeasible[j] { base - 1.0 / mu } else { base };
        multipliers_hess[j] = if infeasible[j] {
            base - 1.0 / mu
        } else if active[j] && consider_active_multipliers {
            base + lambda_b[j]
        } else {
            base
        };
    }

    let h_lag = model.lagrangian_hessian(&multipliers_hess, 1.0);
    let g_lag = model.lagrangian_gradient(x, &multipliers_grad, 1.0);

    let rows: Vec<usize> = (0..m).filter(|&j| active[j]).collect();
    let h = if rows.is_empty() {
        let rhs = -&g_lag;
        solve_least_squares(&h_lag, &rhs)?
    } else {
        let ma = rows.len();
        let mut kkt = DMatrix::<f64>::zeros(n + ma, n + ma);
        kkt.view_mut((0, 0), (n, n)).copy_from(&h_lag);
        for (k, &j) in rows.iter().enumerate() {
            for i in 0..n {
                kkt[(i, n + k)] = jac[(j, i)];
                kkt[(n + k, i)] = jac[(j, i)];
            }
        }
        let mut rhs = DVector::<f64>::zeros(n + ma);
        for i in 0..n {
            rhs[i] = -g_lag[i];
        }
        let sol = solve_least_squares(&kkt, &rhs)?;
        sol.rows(0, n).into_owned()
    };

    // The stationary point of an indefinite model may point uphill
    if h.dot(&g_lag) >= 0.0 {
        return Ok(-g_lag);
    }
    Ok(h)
}

/// Direction leaving the first active constraint whose candidate multiplier
/// falls outside `[-1/mu, 0]`
///
/// Returns `Ok(None)` when no such constraint exists or the direction fails
/// the descent test.
fn drop_constraint_step(
    jac_active: &DMatrix<f64>,
    lambda_b: &DVector<f64>,
    pseudo: &DVector<f64>,
    active: &[bool],
    mu: f64,
) -> LinAlgResult<Option<DVector<f64>>> {
    let m = active.len();
    let mut drop_j = None;
    let mut drop_row = 0_usize;
    let mut row = 0_usize;
    for j in 0..m {
        if !active[j] {
            continue;
        }
        if lambda_b[j] > 0.0 || lambda_b[j] < -1.0 / mu {
            drop_j = Some(j);
            drop_row = row;
            break;
        }
        row += 1;
    }
    let Some(j) = drop_j else {
        return Ok(None);
    };

    let sigma = if lambda_b[j] > 0.0 { -1.0 } else { 1.0 };
    let grad_cj = jac_active.row(drop_row).transpose();

    let d = if jac_active.nrows() == 1 {
        grad_cj.clone() * sigma
    } else {
        let mut jac_minus = DMatrix::<f64>::zeros(jac_active.nrows() - 1, jac_active.ncols());
        let mut k = 0;
        for r in 0..jac_active.nrows() {
            if r == drop_row {
                continue;
            }
            jac_minus.row_mut(k).copy_from(&jac_active.row(r));
            k += 1;
        }
        let p = null_space_projector(&jac_minus)?;
        (&p * &grad_cj) * sigma
    };

    // The direction must strictly decrease the penalty
    let mut grad_test = pseudo.clone();
    if lambda_b[j] < -1.0 / mu {
        grad_test += &grad_cj;
    }
    if d.dot(&grad_test) < -1e-6 {
        Ok(Some(d))
    } else {
        Ok(None)
    }
}

/// Horizontal step recomputed under tightened working tolerances
///
/// Halves both tolerances, reclassifies the constraints (shrinking further
/// while the active set fills the variable space), and regenerates the
/// tangent-space direction without the candidate multipliers.
#[allow(clippy::too_many_arguments)]
fn strengthened_step(
    model: &QuadModel,
    x: &DVector<f64>,
    lambda: &DVector<f64>,
    active: &mut [bool],
    infeasible: &mut [bool],
    inner_tol_opt: &mut f64,
    inner_precision: &mut f64,
    mu: f64,
) -> LinAlgResult<DVector<f64>> {
    let n = x.len();
    *inner_tol_opt = (*inner_tol_opt / 2.0).max(MIN_INNER_TOL_OPT);
    *inner_precision = (*inner_precision / 2.0).max(MIN_INNER_PRECISION);

    let cons = model.constraints(x);
    classify_constraints(&cons, *inner_precision, active, infeasible);
    let mut nb_active = active.iter().filter(|&&a| a).count();
    while nb_active >= n {
        *inner_precision /= 2.0;
        *inner_tol_opt = (*inner_tol_opt / 2.0).max(MIN_INNER_TOL_OPT);
        if *inner_precision < MIN_INNER_PRECISION {
            break;
        }
        classify_constraints(&cons, *inner_precision, active, infeasible);
        nb_active = active.iter().filter(|&&a| a).count();
    }

    let jac = model.constraints_jacobian(x);
    let lambda_b = DVector::<f64>::zeros(lambda.len());
    horizontal_step(
        model, x, &jac, active, infeasible, lambda, &lambda_b, mu, false,
    )
}

/// Piecewise line search over the breakpoints of the L1 penalty along `d`
///
/// Walks the constraint breakpoints while the directional derivative stays
/// negative, then validates the step against a sufficient decrease of the
/// penalty, falling back to quadratic interpolation and a plain backtrack.
#[allow(clippy::too_many_arguments)]
fn piecewise_line_search(
    model: &QuadModel,
    x: &DVector<f64>,
    d: &DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
    active: &[bool],
    infeasible: &[bool],
    lambda: &DVector<f64>,
    mu: f64,
) -> f64 {
    let m = lambda.len();

    let mut multipliers = DVector::<f64>::zeros(m);
    for j in 0..m {
        multipliers[j] = if infeasible[j] {
            lambda[j] - 1.0 / mu
        } else {
            lambda[j]
        };
    }
    let pseudo = model.lagrangian_gradient(x, &multipliers, 1.0);

    let mut ak = d.dot(&pseudo);
    if ak >= 0.0 {
        warn!("piecewise line search: the initial slope should be negative");
        return 0.0;
    }

    let cons = model.constraints(x);
    let jac = model.constraints_jacobian(x);
    let jprod = &jac * d;

    let mut in_set = vec![false; m];
    let mut gamma = vec![0.0_f64; m];
    for j in 0..m {
        if !active[j] {
            if jprod[j] == 0.0 {
                continue;
            }
            gamma[j] = -cons[j] / jprod[j];
        }
        in_set[j] = gamma[j] > 0.0 && !active[j];
    }

    // Walk the breakpoints in increasing order while the slope stays negative
    let mut gamma_lk = 0.0_f64;
    while in_set.iter().any(|&b| b) && ak < 0.0 {
        gamma_lk = f64::INFINITY;
        let mut lk = 0_usize;
        for j in 0..m {
            if in_set[j] && gamma[j] <= gamma_lk {
                lk = j;
                gamma_lk = gamma[j];
            }
        }
        ak += jprod[lk].abs();
        in_set[lk] = false;
    }

    let p0 = l1_merit(model, x, lambda, mu);
    let mut xt = projection(&(x + d * gamma_lk), lb, ub);
    let mut pk = l1_merit(model, &xt, lambda, mu);
    if pk < p0 - PIECEWISE_DELTA {
        return gamma_lk;
    }

    let quad_step = quadratic_interpolation_search(model, x, d, lb, ub, lambda, mu).min(1.0);
    xt = projection(&(x + d * quad_step), lb, ub);
    pk = l1_merit(model, &xt, lambda, mu);
    if pk < p0 - PIECEWISE_DELTA {
        return quad_step;
    }

    // Plain backtracking as a last resort
    loop {
        gamma_lk /= GAMMA_UPDATE;
        let xt = x + d * gamma_lk;
        pk = l1_merit(model, &xt, lambda, mu);
        if pk < p0 - PIECEWISE_DELTA || gamma_lk <= SMALL_GAMMA {
            break;
        }
    }
    gamma_lk.max(SMALL_GAMMA)
}

/// Derivative-free quadratic interpolation of the penalty along `d`
fn quadratic_interpolation_search(
    model: &QuadModel,
    x: &DVector<f64>,
    d: &DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
    lambda: &DVector<f64>,
    mu: f64,
) -> f64 {
    const MIN_THRESHOLD: f64 = 1e-12;

    // Largest step keeping x + c d inside the box
    let mut c = f64::INFINITY;
    for i in 0..x.len() {
        c = c.min(ub[i] - lb[i]);
    }
    for i in 0..x.len() {
        let di = d[i];
        if di == 0.0 {
            continue;
        }
        if di < 0.0 && lb[i] != f64::NEG_INFINITY {
            c = c.min((x[i] - lb[i]) / di.abs());
            continue;
        }
        if di > 0.0 && ub[i] != f64::INFINITY {
            c = c.min((ub[i] - x[i]) / di.abs());
        }
    }

    let merit_at = |t: f64| l1_merit(model, &(x + d * t), lambda, mu);

    let mut b = c / 2.0;
    let mut a = 0.0_f64;
    let mut alpha = (b + c) / 2.0;

    let mut fxa = merit_at(a);
    let mut fxb = merit_at(b);
    let mut fxc = merit_at(c);
    let mut fxalpha = merit_at(alpha);

    while (alpha - b).abs() > MIN_THRESHOLD {
        if (alpha - b) * (alpha - c) < 0.0 {
            if fxalpha < fxb {
                a = b;
                b = alpha;
                fxa = fxb;
                fxb = fxalpha;
            } else {
                c = alpha;
                fxc = fxalpha;
            }
        } else if fxalpha < fxb {
            c = b;
            b = alpha;
            fxc = fxb;
            fxb = fxalpha;
        } else {
            a = alpha;
            fxa = fxalpha;
        }

        let denom = 2.0 * (fxa * (b - c) + fxb * (c - a) + fxc * (a - b));
        if denom.abs() <= MIN_THRESHOLD {
            alpha = b;
            fxalpha = fxb;
        } else {
            alpha = (fxa * (b * b - c * c) + fxb * (c * c - a * a) + fxc * (a * a - b * b)) / denom;
            if (alpha - a) * (alpha - c) < 0.0 {
                fxalpha = merit_at(alpha);
            } else {
                alpha = b;
                fxalpha = fxb;
            }
        }
    }
    alpha
}

#[cfg(test)]
mod tests {
    use super::*;

    /// min (x1-2)^2 + (x2-2)^2 s.t. x1 + x2 - 2 <= 0 on [0, 3]^2
    ///
    /// Solution (1, 1) with multiplier -2 on the constraint.
    fn constrained_model() -> QuadModel {
        let mut coeffs = DMatrix::<f64>::zeros(2, QuadModel::num_coefficients(2));
        coeffs[(0, 0)] = 8.0;
        coeffs[(0, 1)] = -4.0;
        coeffs[(0, 2)] = -4.0;
        coeffs[(0, 3)] = 2.0;
        coeffs[(0, 4)] = 2.0;
        coeffs[(1, 0)] = -2.0;
        coeffs[(1, 1)] = 1.0;
        coeffs[(1, 2)] = 1.0;
        QuadModel::new(coeffs, 2).unwrap()
    }

    fn box_bounds() -> (DVector<f64>, DVector<f64>) {
        (DVector::from_vec(vec![0.0, 0.0]), DVector::from_vec(vec![3.0, 3.0]))
    }

    #[test]
    fn test_active_constraint_solution() {
        let model = constrained_model();
        let (lb, ub) = box_bounds();
        let mut x = DVector::from_vec(vec![2.5, 2.5]);

        let status = L1AugLagSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::Solved);
        assert!((x[0] - 1.0).abs() < 1e-3, "x1 = {}", x[0]);
        assert!((x[1] - 1.0).abs() < 1e-3, "x2 = {}", x[1]);
        assert!(model.constraint(0, &x) <= 1e-5, "solution must be feasible");
    }

    #[test]
    fn test_infeasible_start_recovers_feasibility() {
        // From this start a tangent-space step parks the iterate at a point
        // with tiny projected gradient but constraint value 1; the inner loop
        // must keep restoring feasibility rather than declare success there
        let model = constrained_model();
        let (lb, ub) = box_bounds();
        let mut x = DVector::from_vec(vec![0.2, 2.8]);

        let status = L1AugLagSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::Solved);
        assert!((x[0] - 1.0).abs() < 1e-3, "x1 = {}", x[0]);
        assert!((x[1] - 1.0).abs() < 1e-3, "x2 = {}", x[1]);
        assert!(model.constraint(0, &x) <= 1e-5, "solution must be feasible");
    }

    #[test]
    fn test_inactive_constraint_reaches_interior_minimum() {
        // Same objective, constraint x1 - 10 <= 0 never active
        let mut coeffs = DMatrix::<f64>::zeros(2, QuadModel::num_coefficients(2));
        coeffs[(0, 0)] = 8.0;
        coeffs[(0, 1)] = -4.0;
        coeffs[(0, 2)] = -4.0;
        coeffs[(0, 3)] = 2.0;
        coeffs[(0, 4)] = 2.0;
        coeffs[(1, 0)] = -10.0;
        coeffs[(1, 1)] = 1.0;
        let model = QuadModel::new(coeffs, 2).unwrap();
        let (lb, ub) = box_bounds();
        let mut x = DVector::from_vec(vec![0.5, 0.5]);

        let status = L1AugLagSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::Solved);
        assert!((x[0] - 2.0).abs() < 1e-3, "x1 = {}", x[0]);
        assert!((x[1] - 2.0).abs() < 1e-3, "x2 = {}", x[1]);
    }

    #[test]
    fn test_result_is_box_feasible_on_any_status() {
        let model = constrained_model();
        let (lb, ub) = box_bounds();
        let config = L1AugLagConfig::new()
            .with_max_outer_iterations(2)
            .with_max_inner_iterations(3);
        let mut x = DVector::from_vec(vec![3.0, 3.0]);

        let _ = L1AugLagSolver::with_config(config).solve(&mut x, &model, &lb, &ub);
        for i in 0..2 {
            assert!(x[i] >= lb[i] - 1e-12 && x[i] <= ub[i] + 1e-12);
        }
    }

    #[test]
    fn test_rejects_unconstrained_model() {
        let grad = DVector::from_vec(vec![1.0]);
        let hess = DMatrix::from_vec(1, 1, vec![2.0]);
        let model = QuadModel::from_quadratic(0.0, &grad, &hess);
        let lb = DVector::from_vec(vec![0.0]);
        let ub = DVector::from_vec(vec![1.0]);
        let mut x = DVector::from_vec(vec![0.5]);
        let status = L1AugLagSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::DimensionMismatch);
    }

    #[test]
    fn test_tight_bounds_leave_x_unchanged() {
        let model = constrained_model();
        let lb = DVector::from_vec(vec![0.0, 1.0]);
        let ub = DVector::from_vec(vec![3.0, 1.0 + 1e-10]);
        let mut x = DVector::from_vec(vec![2.5, 2.5]);
        let status = L1AugLagSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::TightVarBounds);
        assert_eq!(x[1], 2.5);
    }

    #[test]
    fn test_multipliers_critical_interval() {
        let mu = 0.1;
        let ok = DVector::from_vec(vec![0.0, -5.0, -10.0]);
        assert!(multipliers_critical(&ok, mu));

        let too_positive = DVector::from_vec(vec![0.1]);
        assert!(!multipliers_critical(&too_positive, mu));

        let too_negative = DVector::from_vec(vec![-10.0 - 1e-6]);
        assert!(!multipliers_critical(&too_negative, mu));
    }

    #[test]
    fn test_classify_constraints() {
        let cons = DVector::from_vec(vec![-0.5, 0.0, 0.5]);
        let mut active = vec![false; 3];
        let mut infeasible = vec![false; 3];
        classify_constraints(&cons, 0.1, &mut active, &mut infeasible);
        assert_eq!(active, vec![false, true, false]);
        assert_eq!(infeasible, vec![false, false, true]);
    }

    #[test]
    fn test_solved_point_satisfies_first_order_conditions() {
        let model = constrained_model();
        let (lb, ub) = box_bounds();
        let mut x = DVector::from_vec(vec![2.5, 0.5]);

        let status = L1AugLagSolver::new().solve(&mut x, &model, &lb, &ub);
        assert_eq!(status, SolveStatus::Solved);

        // At (1, 1) the exact multiplier is -2: grad f = lambda * grad c
        let lambda = DVector::from_vec(vec![-2.0]);
        let grad_l = model.lagrangian_gradient(&x, &lambda, 1.0);
        let crit = crate::solver::first_order_error(&x, &grad_l, &lb, &ub);
        assert!(crit < 1e-2, "criticality too large: {}", crit);
    }
}
