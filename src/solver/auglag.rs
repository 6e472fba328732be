//! Smooth augmented Lagrangian solver with slack variables
//!
//! Minimizes a quadratic model objective subject to the model's inequality
//! constraints and variable bounds by converting the inequalities into
//! equalities with nonnegative slacks:
//!
//! ```text
//! min  f(x)                        min  f(x)
//! s.t. c(x) <= 0          <=>      s.t. c(x) + s = 0,  s >= 0
//!      lb <= x <= ub                    lb <= x <= ub
//! ```
//!
//! and minimizing the augmented Lagrangian
//!
//! ```text
//! La(x, s; lambda, mu) = f(x) - sum_j lambda_j (c_j + s_j)
//!                        + (1/(2 mu)) sum_j (c_j + s_j)^2
//! ```
//!
//! over the box on the combined variable `xs = (x, s)`. The outer loop
//! updates the multipliers and penalty in the standard way; each inner
//! subproblem is a bound-constrained minimization of `La` handled by a
//! trust-region method whose quadratic subproblems go through
//! [`BcqpSolver`]. After every trial point the slacks are reset to their
//! closed-form minimizers (`s_j = max(0, -c_j + lambda_j mu)`), the
//! so-called magic step. The ratio test is non-monotone: a reference value
//! tracking the recent best allows accepting steps that a strictly monotone
//! test would reject.
//!
//! An initial feasibility restoration produces a starting point with a
//! small slack residual, and further restorations recover from inner solves
//! that neither converge nor decrease `La`.
//!
//! # References
//!
//! * A. R. Conn, N. I. M. Gould, and Ph. L. Toint, "A globally convergent
//!   augmented Lagrangian algorithm for optimization with general
//!   constraints and simple bounds", SIAM Journal on Numerical Analysis,
//!   28(2):545-572, 1991.
//! * N. I. M. Gould and Ph. L. Toint, "Nonlinear programming without a
//!   penalty function or a filter", Mathematical Programming,
//!   122(1):155-196, 2010.

use nalgebra::{DMatrix, DVector};
use tracing::debug;
use web_time::Instant;

use crate::model::QuadModel;
use crate::observers::{SolveObserver, SolveObserverVec};
use crate::solver::{
    bounds_are_ordered, first_order_error, has_fixed_variable, project_onto_bounds, projection,
    BcqpConfig, BcqpSolver, FeasibilityRestoration, RestorationConfig, SolveStatus,
};

/// Configuration for [`AugLagSolver`]
#[derive(Debug, Clone)]
pub struct AugLagConfig {
    /// Initial penalty parameter
    pub mu_init: f64,
    /// Penalty division factor applied on infeasible outer iterations
    pub mu_decrease: f64,
    /// Initial inner optimality target
    pub omega_init: f64,
    /// Initial feasibility target
    pub eta_init: f64,
    /// Maximum number of outer (multiplier update) iterations
    pub max_outer_iterations: usize,
    /// Maximum number of inner trust-region iterations per outer iteration
    pub max_inner_iterations: usize,
    /// Iteration budget of each trust-region subproblem solve
    pub max_bcqp_iterations: usize,
    /// Stagnation tolerance on the distance between successive iterates
    pub tol_dist_successive_x: f64,
    /// Relative stopping tolerance on the projected Lagrangian gradient
    pub tol_opt: f64,
    /// Relative stopping tolerance on the slack residual
    pub tol_feas: f64,
}

impl Default for AugLagConfig {
    fn default() -> Self {
        Self {
            mu_init: 0.1,
            mu_decrease: 10.0,
            omega_init: 1.0,
            eta_init: 1.0,
            max_outer_iterations: 50,
            max_inner_iterations: 100,
            max_bcqp_iterations: 100,
            tol_dist_successive_x: 1e-15,
            tol_opt: 1e-7,
            tol_feas: 1e-7,
        }
    }
}

impl AugLagConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial penalty parameter
    pub fn with_mu_init(mut self, mu_init: f64) -> Self {
        self.mu_init = mu_init;
        self
    }

    /// Set the penalty division factor
    pub fn with_mu_decrease(mut self, mu_decrease: f64) -> Self {
        self.mu_decrease = mu_decrease;
        self
    }

    /// Set the initial inner optimality target
    pub fn with_omega_init(mut self, omega_init: f64) -> Self {
        self.omega_init = omega_init;
        self
    }

    /// Set the initial feasibility target
    pub fn with_eta_init(mut self, eta_init: f64) -> Self {
        self.eta_init = eta_init;
        self
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

    /// Set the subproblem iteration budget
    pub fn with_max_bcqp_iterations(mut self, max_bcqp_iterations: usize) -> Self {
        self.max_bcqp_iterations = max_bcqp_iterations;
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
        debug!("Augmented Lagrangian configuration:");
        debug!("  mu_init:               {:.2e}", self.mu_init);
        debug!("  mu_decrease:           {:.2e}", self.mu_decrease);
        debug!("  omega_init:            {:.2e}", self.omega_init);
        debug!("  eta_init:              {:.2e}", self.eta_init);
        debug!("  max_outer_iterations:  {}", self.max_outer_iterations);
        debug!("  max_inner_iterations:  {}", self.max_inner_iterations);
        debug!("  max_bcqp_iterations:   {}", self.max_bcqp_iterations);
        debug!("  tol_dist_successive_x: {:.2e}", self.tol_dist_successive_x);
        debug!("  tol_opt:               {:.2e}", self.tol_opt);
        debug!("  tol_feas:              {:.2e}", self.tol_feas);
    }
}

/// Per-outer-iteration statistics row, logged at debug level
struct IterationStats {
    iteration: usize,
    objective: f64,
    residual: f64,
    criticality: f64,
    mu: f64,
    eta: f64,
    omega: f64,
}

impl IterationStats {
    fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>12}  {:>10}  {:>10}  {:>10}",
            "iter", "objective", "residual", "criticality", "mu", "eta", "omega"
        );
    }

    fn print_line(&self) {
        debug!(
            "{:>4}  {:>13.6e}  {:>13.6e}  {:>12.6e}  {:>10.3e}  {:>10.3e}  {:>10.3e}",
            self.iteration,
            self.objective,
            self.residual,
            self.criticality,
            self.mu,
            self.eta,
            self.omega
        );
    }
}

/// Outcome of the inner bound-constrained minimization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InnerStatus {
    Solved,
    MaxIterReached,
    Stagnation,
    NumericalError,
    /// At least one trust-region step was accepted before stopping
    OneStepMade,
}

/// Slack-based augmented Lagrangian solver for inequality-constrained
/// quadratic models
#[derive(Default)]
pub struct AugLagSolver {
    config: AugLagConfig,
    observers: SolveObserverVec,
}

impl AugLagSolver {
    /// Create a solver with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver with a custom configuration
    pub fn with_config(config: AugLagConfig) -> Self {
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
        let nvar = n + m;

        // Combined variable xs = (x, s) with s initialized at max(0, -c)
        let cons = model.constraints(x);
        let mut xs = DVector::<f64>::zeros(nvar);
        for i in 0..n {
            xs[i] = x[i];
        }
        for j in 0..m {
            xs[n + j] = (-cons[j]).max(0.0);
        }
        let mut lvar = DVector::<f64>::from_element(nvar, 0.0);
        let mut uvar = DVector::<f64>::from_element(nvar, f64::INFINITY);
        for i in 0..n {
            lvar[i] = lb[i];
            uvar[i] = ub[i];
        }

        // Initial restoration toward a small slack residual
        let restoration = FeasibilityRestoration::with_config(
            RestorationConfig::new()
                .with_feasibility_tol(self.config.mu_init)
                .with_tol_dist_successive_x(1e-15)
                .with_max_iterations(30),
        );
        let _ = restoration.solve(&mut xs, model, &lvar, &uvar);
        if (0..nvar).any(|i| xs[i] < lvar[i] || xs[i] > uvar[i]) {
            x.copy_from(&xs.rows(0, n));
            project_onto_bounds(x, lb, ub);
            return SolveStatus::RestorationFailure;
        }
        x.copy_from(&xs.rows(0, n));

        // Reference magnitudes for the relative stopping criteria
        let nproj_fx0 = first_order_error(x, &model.objective_gradient(x), lb, ub);
        let ncx0s0 = slack_residual(model, &xs).amax();

        let mut lambda = DVector::<f64>::zeros(m);
        let mut mu = self.config.mu_init;
        let mut eta = self.config.eta_init;
        let mut omega = self.config.omega_init;
        const SUCCESSIVE_ACCEPTABLE_BEFORE_UPDATE: usize = 2;
        const MAX_SUCCESSIVE_FAILURE: usize = 5;

        let mut auglag_val = aug_lag_objective(model, &xs, &lambda, mu);
        let mut successive_acceptable = 0_usize;
        let mut successive_failure = 0_usize;

        IterationStats::print_header();

        let mut status = SolveStatus::MaxIterReached;
        for iteration in 0..self.config.max_outer_iterations {
            let xk = xs.rows(0, n).into_owned();
            let grad_l = model.lagrangian_gradient(&xk, &lambda, 1.0);
            let residual = slack_residual(model, &xs);

            // Criticality combines the x-space projected gradient with the
            // slack complementarity error
            let mut nproj_l = first_order_error(&xk, &grad_l, lb, ub);
            for j in 0..m {
                let s = xs[n + j];
                nproj_l = nproj_l.max((s - (s + lambda[j]).max(0.0)).abs());
            }

            let stats = IterationStats {
                iteration,
                objective: model.objective(&xk),
                residual: residual.amax(),
                criticality: nproj_l,
                mu,
                eta,
                omega,
            };
            stats.print_line();
            self.observers.set_iteration_metrics(
                model.objective(&xk),
                nproj_l,
                residual.amax(),
                0.0,
            );
            self.observers.notify(&xk, iteration);

            if nproj_l <= self.config.tol_opt * nproj_fx0.max(1.0)
                && residual.amax() <= self.config.tol_feas * ncx0s0.max(1.0)
            {
                status = SolveStatus::Solved;
                break;
            }
            if mu <= self.config.tol_opt / self.config.mu_decrease
                || successive_failure >= MAX_SUCCESSIVE_FAILURE
            {
                status = SolveStatus::StagnationIterates;
                break;
            }

            let mut xs_trial = xs.clone();
            let inner = self.solve_bound_auglag(&mut xs_trial, model, &lvar, &uvar, &lambda, mu, omega);
            match inner {
                InnerStatus::NumericalError => {
                    status = SolveStatus::NumericalError;
                    break;
                }
                InnerStatus::Stagnation => {
                    status = SolveStatus::StagnationIterates;
                    break;
                }
                _ => {}
            }

            let residual_trial = slack_residual(model, &xs_trial);
            let auglag_val_trial = aug_lag_objective(model, &xs_trial, &lambda, mu);

            if residual_trial.amax() <= eta {
                // Feasible enough: first-order multiplier update
                for j in 0..m {
                    lambda[j] -= residual_trial[j] / mu;
                }
                eta = (eta * mu.powf(0.9)).max(self.config.tol_opt);
                if inner == InnerStatus::Solved {
                    successive_acceptable = 0;
                    omega *= mu;
                } else if successive_acceptable >= SUCCESSIVE_ACCEPTABLE_BEFORE_UPDATE {
                    successive_acceptable += 1;
                    omega *= mu.sqrt();
                } else {
                    successive_acceptable += 1;
                }
                omega = omega.max(self.config.tol_opt);
            } else {
                // Not feasible enough: increase the penalty
                if inner == InnerStatus::Solved {
                    successive_acceptable = 0;
                    mu /= self.config.mu_decrease;
                } else if successive_acceptable >= SUCCESSIVE_ACCEPTABLE_BEFORE_UPDATE {
                    successive_acceptable += 1;
                    mu /= self.config.mu_decrease.sqrt();
                } else {
                    successive_acceptable += 1;
                }
                eta = mu.powf(0.1).max(self.config.tol_opt);
                omega = mu;
            }

            if inner == InnerStatus::Solved || auglag_val_trial < 0.99 * auglag_val {
                xs = xs_trial;
                auglag_val = aug_lag_objective(model, &xs, &lambda, mu);
                successive_failure = 0;
                continue;
            }

            successive_failure += 1;
            if successive_failure < MAX_SUCCESSIVE_FAILURE - 1 {
                // Recovery: push the trial point back toward feasibility
                let recovery = FeasibilityRestoration::with_config(
                    RestorationConfig::new()
                        .with_feasibility_tol(omega)
                        .with_tol_dist_successive_x(1e-15)
                        .with_max_iterations(30),
                );
                let mut xs_rec = xs_trial.clone();
                let rec_status = recovery.solve(&mut xs_rec, model, &lvar, &uvar);
                if rec_status.is_usable() {
                    let dist = (&xs_rec - &xs).norm();
                    xs = xs_rec;
                    auglag_val = aug_lag_objective(model, &xs, &lambda, mu);
                    if dist > self.config.tol_dist_successive_x {
                        successive_failure = 0;
                    }
                }
            } else {
                xs = xs_trial;
                auglag_val = aug_lag_objective(model, &xs, &lambda, mu);
            }
        }

        x.copy_from(&xs.rows(0, n));
        project_onto_bounds(x, lb, ub);

        debug!(
            "augmented Lagrangian finished: {} | objective: {:.6e} | residual: {:.6e} | elapsed: {:.3} ms",
            status,
            model.objective(x),
            slack_residual(model, &xs).amax(),
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        status
    }

    /// Bound-constrained minimization of the augmented Lagrangian over the
    /// combined variable by a non-monotone trust-region method
    #[allow(clippy::too_many_arguments)]
    fn solve_bound_auglag(
        &self,
        xs: &mut DVector<f64>,
        model: &QuadModel,
        lvar: &DVector<f64>,
        uvar: &DVector<f64>,
        lambda: &DVector<f64>,
        mu: f64,
        omega: f64,
    ) -> InnerStatus {
        const EPSILON_1: f64 = 0.05;
        const EPSILON_2: f64 = 0.9;
        const GAMMA_1: f64 = 0.5;
        const GAMMA_2: f64 = 2.0;
        const MIN_TR_RADIUS: f64 = 1e-15;
        const MAX_TR_RADIUS: f64 = 1e15;
        const MAX_UNSUCCESSFUL: usize = 40;
        const TOL_TR_RATIO: f64 = 1e-15;
        const MAX_NM_STEPS: usize = 10;
        const BACKTRACK_DECREASE: f64 = 1.2;
        const ARMIJO_TOL: f64 = 1e-4;

        let n = model.dimension();
        let m = model.num_constraints();
        let nvar = n + m;

        let tol_opt_inner = omega.min(1e-8);
        let tol_success = omega;

        let mut grad_la = aug_lag_gradient(model, xs, lambda, mu);
        let mut f_current = aug_lag_objective(model, xs, lambda, mu);
        let mut tr_model =
            QuadModel::from_quadratic(0.0, &grad_la, &aug_lag_hessian(model, xs, lambda, mu));

        let ngproj0 = first_order_error(xs, &grad_la, lvar, uvar);
        let mut ngproj = ngproj0;
        let mut delta = 0.1 * ngproj0;

        // Non-monotone reference bookkeeping
        let mut f_min = f_current;
        let mut f_ref = f_current;
        let mut f_can = f_current;
        let mut sig_ref = 0.0_f64;
        let mut sig_can = 0.0_f64;
        let mut nm_steps = 0_usize;

        let mut d = DVector::<f64>::zeros(nvar);
        let mut successive_unsuccessful = 0_usize;
        let mut dist_x = f64::INFINITY;

        let bcqp = BcqpSolver::with_config(
            BcqpConfig::new()
                .with_max_iterations(self.config.max_bcqp_iterations)
                .with_tol_dist_successive_x(self.config.tol_dist_successive_x),
        );

        let mut status = InnerStatus::MaxIterReached;
        for _ in 0..self.config.max_inner_iterations {
            if ngproj <= tol_opt_inner * ngproj0 || ngproj <= tol_success {
                status = InnerStatus::Solved;
                break;
            }
            if dist_x <= self.config.tol_dist_successive_x
                || successive_unsuccessful > MAX_UNSUCCESSFUL
            {
                if status != InnerStatus::OneStepMade {
                    status = InnerStatus::Stagnation;
                }
                break;
            }

            // Trust-region box intersected with the variable bounds
            let dlvar = DVector::from_fn(nvar, |i, _| (lvar[i] - xs[i]).max(-delta));
            let duvar = DVector::from_fn(nvar, |i, _| (uvar[i] - xs[i]).min(delta));

            let d_outside = (0..nvar).any(|i| d[i] < dlvar[i] || d[i] > duvar[i]);
            if successive_unsuccessful == 0 || d_outside {
                d = DVector::zeros(nvar);
                match bcqp.solve(&mut d, &tr_model, &dlvar, &duvar) {
                    SolveStatus::BoundsError
                    | SolveStatus::NumericalError
                    | SolveStatus::DimensionMismatch => {
                        return InnerStatus::NumericalError;
                    }
                    SolveStatus::TightVarBounds => {
                        if status != InnerStatus::OneStepMade {
                            status = InnerStatus::Stagnation;
                        }
                        break;
                    }
                    _ => {}
                }
            }

            let mut xs_can = projection(&(&*xs + &d), lvar, uvar);
            let f_trial = aug_lag_objective(model, &xs_can, lambda, mu);
            magic_step(model, &mut xs_can, lambda, mu);
            let f_trial_magic = aug_lag_objective(model, &xs_can, lambda, mu);

            let qm = tr_model.objective(&d);
            let pred = -qm + f_trial - f_trial_magic + TOL_TR_RATIO * f_current.abs().max(1.0);
            let mut ared = f_current - f_trial_magic + TOL_TR_RATIO * f_current.abs().max(1.0);
            if qm.abs() < 1000.0 * TOL_TR_RATIO
                || ared.abs() < 1000.0 * TOL_TR_RATIO * f_current.abs()
            {
                // Differences drown in rounding; fall back to a slope average
                let grad_can = aug_lag_gradient(model, &xs_can, lambda, mu);
                ared = (grad_can.dot(&d) + grad_la.dot(&d)) / 2.0;
            }
            let rho_his = (f_ref - f_trial_magic) / (sig_ref + pred);
            let rho = rho_his.max(ared / pred);
            let mut alpha = 1.0_f64;

            if rho >= EPSILON_1 {
                d = &xs_can - &*xs;
                *xs = xs_can;
                let nd = d.amax();
                if rho >= EPSILON_2 {
                    delta = (GAMMA_2 * delta.max(nd)).min(MAX_TR_RADIUS);
                }

                sig_ref += pred;
                sig_can += pred;
                if f_trial_magic < f_min {
                    f_can = f_trial_magic;
                    f_min = f_trial_magic;
                    sig_can = 0.0;
                    nm_steps = 0;
                } else {
                    nm_steps += 1;
                }
                if f_trial_magic > f_can {
                    f_can = f_trial_magic;
                    sig_can = 0.0;
                }
                if nm_steps == MAX_NM_STEPS {
                    f_ref = f_can;
                    sig_ref = sig_can;
                }

                successive_unsuccessful = 0;
                grad_la = aug_lag_gradient(model, xs, lambda, mu);
                f_current = aug_lag_objective(model, xs, lambda, mu);
                tr_model = QuadModel::from_quadratic(
                    0.0,
                    &grad_la,
                    &aug_lag_hessian(model, xs, lambda, mu),
                );
                ngproj = first_order_error(xs, &grad_la, lvar, uvar);
                dist_x = alpha.sqrt() * d.norm();
                status = InnerStatus::OneStepMade;
                continue;
            }

            // Rejected: backtrack along d with magic steps before shrinking
            let slope = d.dot(&grad_la);
            let f_start = f_current;
            let nd = d.amax();
            let mut satisfied = false;
            for _ in 0..5 {
                alpha /= BACKTRACK_DECREASE;
                xs_can = &*xs + &d * alpha;
                magic_step(model, &mut xs_can, lambda, mu);
                project_onto_bounds(&mut xs_can, lvar, uvar);
                let f_bt = aug_lag_objective(model, &xs_can, lambda, mu);
                if f_bt <= f_start + ARMIJO_TOL * slope {
                    satisfied = true;
                    break;
                }
            }

            if satisfied {
                d = &xs_can - &*xs;
                let nd = d.amax();
                *xs = xs_can;
                successive_unsuccessful = 0;
                delta = (alpha * nd).min(delta).max(MIN_TR_RADIUS);
                grad_la = aug_lag_gradient(model, xs, lambda, mu);
                f_current = aug_lag_objective(model, xs, lambda, mu);
                tr_model = QuadModel::from_quadratic(
                    0.0,
                    &grad_la,
                    &aug_lag_hessian(model, xs, lambda, mu),
                );
                ngproj = first_order_error(xs, &grad_la, lvar, uvar);
                dist_x = d.norm();
                status = InnerStatus::OneStepMade;
            } else {
                delta = (GAMMA_1 * delta.min(nd)).max(MIN_TR_RADIUS);
                dist_x = alpha.sqrt() * d.norm();
                successive_unsuccessful += 1;
            }
        }
        status
    }
}

/// Slack residual `c(x) + s` of the combined variable
fn slack_residual(model: &QuadModel, xs: &DVector<f64>) -> DVector<f64> {
    let n = model.dimension();
    let m = model.num_constraints();
    let x = xs.rows(0, n).into_owned();
    let cons = model.constraints(&x);
    DVector::from_fn(m, |j, _| cons[j] + xs[n + j])
}

/// Reset the slacks to their closed-form minimizers of the augmented
/// Lagrangian: `s_j = max(0, -c_j(x) + lambda_j mu)`
fn magic_step(model: &QuadModel, xs: &mut DVector<f64>, lambda: &DVector<f64>, mu: f64) {
    let n = model.dimension();
    let m = model.num_constraints();
    let x = xs.rows(0, n).into_owned();
    let cons = model.constraints(&x);
    for j in 0..m {
        xs[n + j] = (-cons[j] + lambda[j] * mu).max(0.0);
    }
}

/// Augmented Lagrangian value at the combined variable
fn aug_lag_objective(model: &QuadModel, xs: &DVector<f64>, lambda: &DVector<f64>, mu: f64) -> f64 {
    let n = model.dimension();
    let x = xs.rows(0, n).into_owned();
    let r = slack_residual(model, xs);
    model.objective(&x) - lambda.dot(&r) + r.norm_squared() / (2.0 * mu)
}

/// Gradient of the augmented Lagrangian with respect to `(x, s)`
fn aug_lag_gradient(
    model: &QuadModel,
    xs: &DVector<f64>,
    lambda: &DVector<f64>,
    mu: f64,
) -> DVector<f64> {
    let n = model.dimension();
    let m = model.num_constraints();
    let x = xs.rows(0, n).into_owned();
    let r = slack_residual(model, xs);
    let jac = model.constraints_jacobian(&x);

    let grad_x = model.lagrangian_gradient(&x, lambda, 1.0) + jac.transpose() * &r / mu;
    let mut grad = DVector::<f64>::zeros(n + m);
    for i in 0..n {
        grad[i] = grad_x[i];
    }
    for j in 0..m {
        grad[n + j] = -lambda[j] + r[j] / mu;
    }
    grad
}

/// Hessian of the augmented Lagrangian with respect to `(x, s)`
///
/// ```text
/// [ H_L  0 ]           y_j = lambda_j - r_j / mu
/// [ 0    0 ]  + (1/mu) J_xs^T J_xs,    J_xs = [ Jc(x)  I ]
/// ```
fn aug_lag_hessian(
    model: &QuadModel,
    xs: &DVector<f64>,
    lambda: &DVector<f64>,
    mu: f64,
) -> DMatrix<f64> {
    let n = model.dimension();
    let m = model.num_constraints();
    let nvar = n + m;
    let x = xs.rows(0, n).into_owned();
    let r = slack_residual(model, xs);
    let jac = model.constraints_jacobian(&x);

    let y = DVector::from_fn(m, |j, _| lambda[j] - r[j] / mu);
    let h_l = model.lagrangian_hessian(&y, 1.0);

    let mut jxs = DMatrix::<f64>::zeros(m, nvar);
    jxs.view_mut((0, 0), (m, n)).copy_from(&jac);
    for j in 0..m {
        jxs[(j, n + j)] = 1.0;
    }

    let mut hess = jxs.transpose() * &jxs / mu;
    hess.view_mut((0, 0), (n, n)).zip_apply(&h_l, |h, hl| *h += hl);
    hess
}
