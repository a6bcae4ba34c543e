//! Classic 4th-order Runge-Kutta solver (RK4)

use nalgebra::DVector;
use std::collections::VecDeque;

use super::{ExplicitSolver, Solver, SolverError, SolverStepResult};

/// Stage evaluation times
const C: [f64; 4] = [0.0, 0.5, 0.5, 1.0];

/// Propagating weights
const B: [f64; 4] = [1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0];

/// Classic 4th-order Runge-Kutta solver
///
/// Fixed-step explicit method with four stages. Used by the sampling loop
/// when a deterministic number of right-hand side evaluations per sample
/// is preferred over error control.
///
/// # Characteristics
/// - Order: 4
/// - Stages: 4
/// - Explicit, fixed timestep
///
/// # References
/// - Butcher, J. C. (2016). "Numerical Methods for Ordinary Differential
///   Equations". John Wiley & Sons, 3rd Edition.
#[derive(Debug, Clone)]
pub struct RK4 {
    state: DVector<f64>,
    initial: DVector<f64>,
    history: VecDeque<DVector<f64>>,
    slopes: Vec<DVector<f64>>,
    stage: usize,
}

impl RK4 {
    /// Create a new RK4 solver with the given initial state
    pub fn new(initial: DVector<f64>) -> Self {
        let n = initial.len();
        Self {
            state: initial.clone(),
            initial,
            history: VecDeque::with_capacity(2),
            slopes: vec![DVector::zeros(n); 4],
            stage: 0,
        }
    }
}

impl Solver for RK4 {
    fn state(&self) -> &DVector<f64> {
        &self.state
    }

    fn set_state(&mut self, state: DVector<f64>) {
        if state.len() != self.slopes[0].len() {
            self.slopes = vec![DVector::zeros(state.len()); 4];
        }
        self.state = state;
        self.stage = 0;
    }

    fn buffer(&mut self, _dt: f64) {
        if self.history.len() >= 2 {
            self.history.pop_back();
        }
        self.history.push_front(self.state.clone());
        self.stage = 0;
    }

    fn revert(&mut self) -> Result<(), SolverError> {
        self.state = self.history.pop_front().ok_or(SolverError::EmptyHistory)?;
        self.stage = 0;
        Ok(())
    }

    fn reset(&mut self) {
        self.state = self.initial.clone();
        self.history.clear();
        self.stage = 0;
    }

    fn order(&self) -> usize {
        4
    }

    fn stages(&self) -> usize {
        4
    }

    fn is_adaptive(&self) -> bool {
        false
    }
}

impl ExplicitSolver for RK4 {
    fn step<F>(&mut self, mut f: F, dt: f64) -> SolverStepResult
    where
        F: FnMut(&DVector<f64>, f64) -> DVector<f64>,
    {
        let x0 = self
            .history
            .front()
            .expect("Must call buffer() before step()");

        self.slopes[self.stage] = f(&self.state, C[self.stage] * dt);

        if self.stage < 3 {
            // Each intermediate state only uses the most recent slope
            self.state = x0 + (C[self.stage + 1] * dt) * &self.slopes[self.stage];
            self.stage += 1;
        } else {
            let mut increment = DVector::zeros(x0.len());
            for (weight, slope) in B.iter().zip(&self.slopes) {
                increment += *weight * slope;
            }
            self.state = x0 + dt * increment;
            self.stage = 0;
        }

        SolverStepResult::default()
    }
}
