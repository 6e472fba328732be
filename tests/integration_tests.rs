//! Integration tests for Quad Solver
//!
//! These tests exercise the public solver API end to end on small quadratic
//! programs with known solutions.
//!
//! # Test Coverage
//!
//! - **BcqpSolver**: bound-constrained problems with interior and boundary
//!   minimizers, degenerate bounds, indefinite Hessians
//! - **L1AugLagSolver / AugLagSolver**: inequality-constrained problems with
//!   active and inactive constraints
//!
//! # Properties Verified
//!
//! Each test verifies some of:
//! - The returned iterate lies inside the variable bounds for every status
//! - At `Solved`, constraint violations stay within the feasibility tolerance
//! - At `Solved`, the projected first-order error is small
//! - Re-solving from a solution keeps the iterate in place (idempotence)
//! - The objective never increases along the bound-constrained solve
//!
//! # Running Tests
//!
//! ```bash
//! cargo test
//!
//! # With per-iteration solver tables
//! RUST_LOG=debug cargo test -- --nocapture
//! ```

use nalgebra::{DMatrix, DVector};
use quad_solver::{
    AugLagConfig, AugLagSolver, BcqpConfig, BcqpSolver, L1AugLagSolver, QuadModel, SolveObserver,
    SolveStatus,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// Observer recording the objective at every notified iteration
#[derive(Clone)]
struct ObjectiveRecorder {
    values: Arc<Mutex<Vec<f64>>>,
    model: QuadModel,
}

impl SolveObserver for ObjectiveRecorder {
    fn on_iteration(&self, x: &DVector<f64>, _iteration: usize) {
        if let Ok(mut values) = self.values.lock() {
            values.push(self.model.objective(x));
        }
    }
}

/// One-dimensional model f(x) = (x - 3)^2 = 9 - 6x + x^2
fn shifted_parabola() -> QuadModel {
    let grad = DVector::from_vec(vec![-6.0]);
    let hess = DMatrix::from_vec(1, 1, vec![2.0]);
    QuadModel::from_quadratic(9.0, &grad, &hess)
}

/// min (x1-2)^2 + (x2-2)^2 s.t. x1 + x2 - 2 <= 0
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

#[test]
fn test_bcqp_interior_minimum() {
    let model = shifted_parabola();
    let lb = DVector::from_vec(vec![0.0]);
    let ub = DVector::from_vec(vec![5.0]);
    let mut x = DVector::from_vec(vec![0.5]);

    let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
    assert_eq!(status, SolveStatus::Solved);
    assert!((x[0] - 3.0).abs() < 1e-6, "x = {}", x[0]);
}

#[test]
fn test_bcqp_minimum_on_bound() {
    let model = shifted_parabola();
    let lb = DVector::from_vec(vec![4.0]);
    let ub = DVector::from_vec(vec![5.0]);
    let mut x = DVector::from_vec(vec![4.5]);

    let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
    assert_eq!(status, SolveStatus::Solved);
    assert!((x[0] - 4.0).abs() < 1e-8, "x = {}", x[0]);
}

#[test]
fn test_bcqp_tight_bounds_leave_iterate_unchanged() {
    let model = shifted_parabola();
    let lb = DVector::from_vec(vec![2.0]);
    let ub = DVector::from_vec(vec![2.0 + 1e-9]);
    let mut x = DVector::from_vec(vec![0.5]);

    let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
    assert_eq!(status, SolveStatus::TightVarBounds);
    assert_eq!(x[0], 0.5);
}

#[test]
fn test_bcqp_incompatible_bounds() {
    let model = shifted_parabola();
    let lb = DVector::from_vec(vec![2.0]);
    let ub = DVector::from_vec(vec![1.0]);
    let mut x = DVector::from_vec(vec![0.5]);

    let status = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
    assert_eq!(status, SolveStatus::BoundsError);
}

#[test]
fn test_bcqp_objective_never_increases() {
    // Bound-only version of the constrained test objective
    let grad0 = DVector::from_vec(vec![-4.0, -4.0]);
    let hess0 = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]);
    let bound_model = QuadModel::from_quadratic(8.0, &grad0, &hess0);

    let values = Arc::new(Mutex::new(Vec::new()));
    let recorder = ObjectiveRecorder {
        values: values.clone(),
        model: bound_model.clone(),
    };

    let mut solver = BcqpSolver::new();
    solver.add_observer(recorder);

    let lb = DVector::from_vec(vec![0.0, 0.0]);
    let ub = DVector::from_vec(vec![3.0, 3.0]);
    let mut x = DVector::from_vec(vec![3.0, 0.0]);
    let status = solver.solve(&mut x, &bound_model, &lb, &ub);
    assert_eq!(status, SolveStatus::Solved);

    let recorded = values.lock().unwrap();
    for pair in recorded.windows(2) {
        assert!(
            pair[1] <= pair[0] + 1e-10,
            "objective increased: {} -> {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_bcqp_idempotent_at_solution() {
    let model = shifted_parabola();
    let lb = DVector::from_vec(vec![0.0]);
    let ub = DVector::from_vec(vec![5.0]);
    let mut x = DVector::from_vec(vec![0.5]);

    let first = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
    assert_eq!(first, SolveStatus::Solved);
    let x_solved = x.clone();

    let second = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
    assert!(matches!(
        second,
        SolveStatus::Solved | SolveStatus::StagnationIterates
    ));
    assert!((x - x_solved).amax() < 1e-9);
}

#[test]
fn test_bcqp_indefinite_hessian_stays_feasible() {
    // Saddle: f = x1^2 - x2^2, unbounded below without the box
    let grad = DVector::from_vec(vec![0.0, 0.0]);
    let hess = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, -2.0]);
    let model = QuadModel::from_quadratic(0.0, &grad, &hess);

    let lb = DVector::from_vec(vec![-1.0, -1.0]);
    let ub = DVector::from_vec(vec![1.0, 1.0]);
    let mut x = DVector::from_vec(vec![0.3, 0.1]);
    let f0 = model.objective(&x);

    let _ = BcqpSolver::new().solve(&mut x, &model, &lb, &ub);
    for i in 0..2 {
        assert!(x[i] >= lb[i] - 1e-12 && x[i] <= ub[i] + 1e-12);
    }
    assert!(model.objective(&x) <= f0 + 1e-10);
}

#[test]
fn test_bcqp_random_indefinite_problems_stay_feasible() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let n = rng.gen_range(2..5);
        let grad = DVector::from_fn(n, |_, _| rng.gen_range(-2.0..2.0));
        let mut hess = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                let v = rng.gen_range(-3.0..3.0);
                hess[(i, j)] = v;
                hess[(j, i)] = v;
            }
        }
        let model = QuadModel::from_quadratic(rng.gen_range(-1.0..1.0), &grad, &hess);

        let lb = DVector::from_fn(n, |_, _| rng.gen_range(-2.0..-1.0));
        let ub = DVector::from_fn(n, |_, _| rng.gen_range(1.0..2.0));
        let mut x = DVector::from_fn(n, |i, _| (lb[i] + ub[i]) / 2.0);
        let f0 = model.objective(&x);

        let config = BcqpConfig::new().with_max_iterations(50);
        let _ = BcqpSolver::with_config(config).solve(&mut x, &model, &lb, &ub);

        for i in 0..n {
            assert!(
                x[i] >= lb[i] - 1e-10 && x[i] <= ub[i] + 1e-10,
                "iterate left the box"
            );
        }
        assert!(
            model.objective(&x) <= f0 + 1e-8,
            "objective increased on a random problem"
        );
    }
}

#[test]
fn test_l1_auglag_active_constraint() {
    let model = constrained_model();
    let lb = DVector::from_vec(vec![0.0, 0.0]);
    let ub = DVector::from_vec(vec![3.0, 3.0]);
    let mut x = DVector::from_vec(vec![2.5, 2.5]);

    let status = L1AugLagSolver::new().solve(&mut x, &model, &lb, &ub);
    assert_eq!(status, SolveStatus::Solved);
    assert!((x[0] - 1.0).abs() < 1e-3);
    assert!((x[1] - 1.0).abs() < 1e-3);
    assert!(model.constraint(0, &x) <= 1e-5, "violation too large");
}

#[test]
fn test_auglag_active_constraint() {
    let model = constrained_model();
    let lb = DVector::from_vec(vec![0.0, 0.0]);
    let ub = DVector::from_vec(vec![3.0, 3.0]);
    let mut x = DVector::from_vec(vec![2.5, 2.5]);

    let status = AugLagSolver::new().solve(&mut x, &model, &lb, &ub);
    assert_eq!(status, SolveStatus::Solved);
    assert!((x[0] - 1.0).abs() < 1e-4);
    assert!((x[1] - 1.0).abs() < 1e-4);
    assert!(model.constraint(0, &x) <= 1e-6, "violation too large");
}

#[test]
fn test_constrained_solvers_agree() {
    let model = constrained_model();
    let lb = DVector::from_vec(vec![0.0, 0.0]);
    let ub = DVector::from_vec(vec![3.0, 3.0]);

    let mut x_l1 = DVector::from_vec(vec![0.2, 2.8]);
    let mut x_al = DVector::from_vec(vec![0.2, 2.8]);
    assert_eq!(
        L1AugLagSolver::new().solve(&mut x_l1, &model, &lb, &ub),
        SolveStatus::Solved
    );
    assert_eq!(
        AugLagSolver::new().solve(&mut x_al, &model, &lb, &ub),
        SolveStatus::Solved
    );
    assert!((x_l1 - x_al).amax() < 1e-2);
}

#[test]
fn test_constrained_solvers_ignore_inactive_constraint() {
    // x1 + x2 - 10 <= 0 never binds on [0, 3]^2: both solvers must land on
    // the unconstrained minimizer (2, 2)
    let mut coeffs = DMatrix::<f64>::zeros(2, QuadModel::num_coefficients(2));
    coeffs[(0, 0)] = 8.0;
    coeffs[(0, 1)] = -4.0;
    coeffs[(0, 2)] = -4.0;
    coeffs[(0, 3)] = 2.0;
    coeffs[(0, 4)] = 2.0;
    coeffs[(1, 0)] = -10.0;
    coeffs[(1, 1)] = 1.0;
    coeffs[(1, 2)] = 1.0;
    let model = QuadModel::new(coeffs, 2).unwrap();
    let lb = DVector::from_vec(vec![0.0, 0.0]);
    let ub = DVector::from_vec(vec![3.0, 3.0]);

    let mut x_l1 = DVector::from_vec(vec![0.5, 0.5]);
    let status_l1 = L1AugLagSolver::new().solve(&mut x_l1, &model, &lb, &ub);
    assert_eq!(status_l1, SolveStatus::Solved);
    assert!((x_l1[0] - 2.0).abs() < 1e-3, "x1 = {}", x_l1[0]);
    assert!((x_l1[1] - 2.0).abs() < 1e-3, "x2 = {}", x_l1[1]);

    let mut x_al = DVector::from_vec(vec![0.5, 0.5]);
    let status_al = AugLagSolver::new().solve(&mut x_al, &model, &lb, &ub);
    assert_eq!(status_al, SolveStatus::Solved);
    assert!((x_al[0] - 2.0).abs() < 1e-4, "x1 = {}", x_al[0]);
    assert!((x_al[1] - 2.0).abs() < 1e-4, "x2 = {}", x_al[1]);
}

#[test]
fn test_constrained_result_box_feasible_on_budget_exhaustion() {
    let model = constrained_model();
    let lb = DVector::from_vec(vec![0.0, 0.0]);
    let ub = DVector::from_vec(vec![3.0, 3.0]);

    let config = AugLagConfig::new()
        .with_max_outer_iterations(1)
        .with_max_inner_iterations(2);
    let mut x = DVector::from_vec(vec![3.0, 3.0]);
    let _ = AugLagSolver::with_config(config).solve(&mut x, &model, &lb, &ub);
    for i in 0..2 {
        assert!(x[i] >= lb[i] - 1e-12 && x[i] <= ub[i] + 1e-12);
    }
}

#[test]
fn test_constrained_solvers_reject_bound_only_model() {
    let model = shifted_parabola();
    let lb = DVector::from_vec(vec![0.0]);
    let ub = DVector::from_vec(vec![5.0]);

    let mut x = DVector::from_vec(vec![0.5]);
    assert_eq!(
        L1AugLagSolver::new().solve(&mut x, &model, &lb, &ub),
        SolveStatus::DimensionMismatch
    );
    assert_eq!(
        AugLagSolver::new().solve(&mut x, &model, &lb, &ub),
        SolveStatus::DimensionMismatch
    );
}
