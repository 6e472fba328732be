//! Observer pattern for solver monitoring.
//!
//! Observers can be registered with any of the solvers and are notified once
//! per (outer) iteration with the current iterate, enabling logging, metrics
//! collection, and custom convergence analysis without touching solver code.
//!
//! # Design Philosophy
//!
//! - **Decoupling**: solver logic is independent of how progress is monitored
//! - **Composability**: multiple observers can run simultaneously
//! - **Zero overhead**: when no observers are registered, notification is a no-op
//!
//! # Custom Observer
//!
//! ```no_run
//! use quad_solver::observers::SolveObserver;
//! use nalgebra::DVector;
//!
//! struct BestObjectiveTracker {
//!     best: std::sync::Mutex<f64>,
//! }
//!
//! impl SolveObserver for BestObjectiveTracker {
//!     fn on_iteration(&self, _x: &DVector<f64>, _iteration: usize) {}
//!
//!     fn set_iteration_metrics(
//!         &self,
//!         objective: f64,
//!         _criticality: f64,
//!         _feasibility: f64,
//!         _step_norm: f64,
//!     ) {
//!         if let Ok(mut best) = self.best.lock() {
//!             *best = best.min(objective);
//!         }
//!     }
//! }
//! ```

use nalgebra::DVector;
use thiserror::Error;
use tracing::error;

/// Observer-specific error types
#[derive(Debug, Clone, Error)]
pub enum ObserverError {
    /// Mutex was poisoned (thread panicked while holding lock)
    #[error("Mutex poisoned in {context}: {reason}")]
    MutexPoisoned { context: String, reason: String },
}

impl ObserverError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for observer operations
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Observer trait for monitoring solver progress.
///
/// Implement this trait to be notified at each iteration checkpoint with the
/// current iterate and scalar progress metrics.
///
/// # Implementation Guidelines
///
/// - Keep callbacks fast to avoid slowing the solve
/// - Handle errors internally (log warnings, don't panic)
/// - Observers receive immutable references and cannot modify solver state
///
/// # Thread Safety
///
/// Observers must be `Send`. Use interior mutability (`Mutex`, `RefCell`) if
/// you need to accumulate state.
pub trait SolveObserver: Send {
    /// Called after each (outer) solver iteration.
    ///
    /// # Arguments
    ///
    /// * `x` - Current iterate, always inside the variable bounds
    /// * `iteration` - Iteration number (0 = initial point, 1+ = after steps)
    fn on_iteration(&self, x: &DVector<f64>, iteration: usize);

    /// Receive scalar metrics for the current iteration.
    ///
    /// Called before `on_iteration`. The default implementation does nothing,
    /// allowing simple observers to ignore metrics.
    ///
    /// # Arguments
    ///
    /// * `objective` - Model objective value at the current iterate
    /// * `criticality` - Projected first-order error of the active criterion
    /// * `feasibility` - Maximum constraint violation (0 for bound-only solves)
    /// * `step_norm` - L2 norm of the last accepted step
    fn set_iteration_metrics(
        &self,
        _objective: f64,
        _criticality: f64,
        _feasibility: f64,
        _step_norm: f64,
    ) {
        // Default implementation does nothing
    }
}

/// Collection of observers owned by a solver.
///
/// Manages a vector of boxed observers and fans notifications out to all of
/// them. Solvers use this internally via their `add_observer()` method.
#[derive(Default)]
pub struct SolveObserverVec {
    observers: Vec<Box<dyn SolveObserver>>,
}

impl SolveObserverVec {
    /// Create a new empty observer collection.
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Add an observer to the collection.
    ///
    /// Observers are called at each iteration in the order they were added.
    pub fn add(&mut self, observer: impl SolveObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Forward iteration metrics to all observers.
    #[inline]
    pub fn set_iteration_metrics(
        &self,
        objective: f64,
        criticality: f64,
        feasibility: f64,
        step_norm: f64,
    ) {
        for observer in &self.observers {
            observer.set_iteration_metrics(objective, criticality, feasibility, step_norm);
        }
    }

    /// Notify all observers with the current iterate.
    ///
    /// No-op when no observers are registered.
    #[inline]
    pub fn notify(&self, x: &DVector<f64>, iteration: usize) {
        for observer in &self.observers {
            observer.on_iteration(x, iteration);
        }
    }

    /// Check if any observers are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Get the number of registered observers.
    #[inline]
    pub fn len(&self) -> usize {
        self.observers.len()
    }
}
