//! Feasibility restoration for slack-augmented constraint systems
//!
//! Minimizes `1/2 || c(x) + s ||^2` over the combined variable `xs = (x, s)`
//! inside `[lvar, uvar]`, where `c` is the constraint block of a quadratic
//! model and `s` are slack variables. A damped Gauss-Newton iteration with
//! bound projection drives the residual toward zero:
//!
//! ```text
//! (J^T J + lambda I) d = -J^T r,    J = [ Jc(x)  I ],   r = c(x) + s
//! xs <- P[xs + d]
//! ```
//!
//! The damping parameter grows on rejected steps and shrinks on accepted
//! ones. The augmented Lagrangian solver uses this component to produce a
//! near-feasible starting point and to recover after failed inner solves.

use nalgebra::{DMatrix, DVector};
use std::fmt::{self, Display, Formatter};
use tracing::debug;

use crate::model::QuadModel;
use crate::solver::project_onto_bounds;

/// Outcome of a restoration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorationStatus {
    /// The residual dropped below the feasibility tolerance
    Solved,
    /// The residual decreased but did not reach the tolerance
    Improved,
    /// Iteration budget exhausted without improvement
    MaxIterReached,
    /// Successive iterates stopped moving
    StagnationIterates,
    /// No acceptable step could be found
    Failure,
}

impl RestorationStatus {
    /// True for the statuses callers may treat as a usable result
    pub fn is_usable(&self) -> bool {
        matches!(self, RestorationStatus::Solved | RestorationStatus::Improved)
    }
}

impl Display for RestorationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RestorationStatus::Solved => write!(f, "Solved"),
            RestorationStatus::Improved => write!(f, "Improved"),
            RestorationStatus::MaxIterReached => write!(f, "Maximum iterations reached"),
            RestorationStatus::StagnationIterates => {
                write!(f, "Stagnation of successive iterates")
            }
            RestorationStatus::Failure => write!(f, "Failure"),
        }
    }
}

/// Configuration for [`FeasibilityRestoration`]
#[derive(Debug, Clone)]
pub struct RestorationConfig {
    /// Stop when `|| c(x) + s ||_inf` falls below this value
    pub feasibility_tol: f64,
    /// Stagnation tolerance on the distance between successive iterates
    pub tol_dist_successive_x: f64,
    /// Maximum number of Gauss-Newton iterations
    pub max_iterations: usize,
}

impl Default for RestorationConfig {
    fn default() -> Self {
        Self {
            feasibility_tol: 1e-8,
            tol_dist_successive_x: 1e-15,
            max_iterations: 30,
        }
    }
}

impl RestorationConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the feasibility tolerance
    pub fn with_feasibility_tol(mut self, tol: f64) -> Self {
        self.feasibility_tol = tol;
        self
    }

    /// Set the stagnation tolerance on successive iterates
    pub fn with_tol_dist_successive_x(mut self, tol: f64) -> Self {
        self.tol_dist_successive_x = tol;
        self
    }

    /// Set the iteration budget
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Damped Gauss-Newton solver for the slack feasibility problem
#[derive(Default)]
pub struct FeasibilityRestoration {
    config: RestorationConfig,
}

impl FeasibilityRestoration {
    /// Create a solver with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver with a custom configuration
    pub fn with_config(config: RestorationConfig) -> Self {
        Self { config }
    }

    /// Drive `|| c(x) + s ||` toward zero, updating `xs = (x, s)` in place
    ///
    /// `xs` must have length `n + m` for a model with `n` variables and `m`
    /// constraints; `lvar`/`uvar` bound the combined variable. The iterate is
    /// box-feasible on return for every status.
    pub fn solve(
        &self,
        xs: &mut DVector<f64>,
        model: &QuadModel,
        lvar: &DVector<f64>,
        uvar: &DVector<f64>,
    ) -> RestorationStatus {
        let n = model.dimension();
        let m = model.num_constraints();
        let nvar = n + m;
        if xs.len() != nvar || lvar.len() != nvar || uvar.len() != nvar || m == 0 {
            return RestorationStatus::Failure;
        }

        project_onto_bounds(xs, lvar, uvar);

        const DAMPING_INIT: f64 = 1e-4;
        const DAMPING_INCREASE: f64 = 10.0;
        const DAMPING_DECREASE: f64 = 0.3;
        const DAMPING_MIN: f64 = 1e-12;
        const DAMPING_MAX: f64 = 1e12;

        let mut damping = DAMPING_INIT;
        let mut residual = slack_residual(model, xs);
        let initial_sq = residual.norm_squared();
        let mut current_sq = initial_sq;
        let mut improved = false;

        let mut status = RestorationStatus::MaxIterReached;
        for iteration in 0..self.config.max_iterations {
            if residual.amax() <= self.config.feasibility_tol {
                status = RestorationStatus::Solved;
                break;
            }

            let jac = slack_jacobian(model, xs);
            let jt_r = jac.transpose() * &residual;
            let jtj = jac.transpose() * &jac;

            // Damped normal equations; raise the damping until the
            // factorization succeeds
            let d = loop {
                let mut damped = jtj.clone();
                for i in 0..nvar {
                    damped[(i, i)] += damping;
                }
                match damped.cholesky() {
                    Some(chol) => break Some(chol.solve(&(-&jt_r))),
                    None => {
                        damping *= DAMPING_INCREASE;
                        if damping > DAMPING_MAX {
                            break None;
                        }
                    }
                }
            };
            let Some(d) = d else {
                status = if improved {
                    RestorationStatus::Improved
                } else {
                    RestorationStatus::Failure
                };
                break;
            };

            let mut xs_trial = &*xs + &d;
            project_onto_bounds(&mut xs_trial, lvar, uvar);
            let residual_trial = slack_residual(model, &xs_trial);
            let trial_sq = residual_trial.norm_squared();

            if trial_sq < current_sq {
                let step_norm = (&xs_trial - &*xs).norm();
                *xs = xs_trial;
                residual = residual_trial;
                current_sq = trial_sq;
                improved = true;
                damping = (damping * DAMPING_DECREASE).max(DAMPING_MIN);
                debug!(
                    "restoration iter {}: residual {:.6e}, step {:.3e}, damping {:.3e}",
                    iteration,
                    current_sq.sqrt(),
                    step_norm,
                    damping
                );
                if step_norm <= self.config.tol_dist_successive_x {
                    status = RestorationStatus::StagnationIterates;
                    break;
                }
            } else {
                damping *= DAMPING_INCREASE;
                if damping > DAMPING_MAX {
                    status = if improved {
                        RestorationStatus::Improved
                    } else {
                        RestorationStatus::Failure
                    };
                    break;
                }
            }
        }

        if status == RestorationStatus::MaxIterReached && current_sq < initial_sq {
            status = RestorationStatus::Improved;
        }
        if status == RestorationStatus::MaxIterReached
            && residual.amax() <= self.config.feasibility_tol
        {
            status = RestorationStatus::Solved;
        }
        debug!(
            "restoration finished: {} | residual {:.6e}",
            status,
            current_sq.sqrt()
        );
        status
    }
}

/// Residual `c(x) + s` of the slack system
fn slack_residual(model: &QuadModel, xs: &DVector<f64>) -> DVector<f64> {
    let n = model.dimension();
    let m = model.num_constraints();
    let x = xs.rows(0, n).into_owned();
    let cons = model.constraints(&x);
    DVector::from_fn(m, |j, _| cons[j] + xs[n + j])
}

/// Jacobian `[ Jc(x)  I ]` of the slack system
fn slack_jacobian(model: &QuadModel, xs: &DVector<f64>) -> DMatrix<f64> {
    let n = model.dimension();
    let m = model.num_constraints();
    let x = xs.rows(0, n).into_owned();
    let jc = model.constraints_jacobian(&x);
    let mut jac = DMatrix::<f64>::zeros(m, n + m);
    jac.view_mut((0, 0), (m, n)).copy_from(&jc);
    for j in 0..m {
        jac[(j, n + j)] = 1.0;
    }
    jac
}
