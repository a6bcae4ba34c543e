//! Dormand-Prince 5(4) adaptive Runge-Kutta solver

use nalgebra::DVector;
use std::collections::VecDeque;

use super::{ExplicitSolver, Solver, SolverError, SolverStepResult};

/// Stage evaluation times
const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

/// Butcher tableau rows for stages 2..=7 (the last row is also the 5th order solution)
#[rustfmt::skip]
const A: [&[f64]; 6] = [
    &[1.0/5.0],
    &[3.0/40.0, 9.0/40.0],
    &[44.0/45.0, -56.0/15.0, 32.0/9.0],
    &[19372.0/6561.0, -25360.0/2187.0, 64448.0/6561.0, -212.0/729.0],
    &[9017.0/3168.0, -355.0/33.0, 46732.0/5247.0, 49.0/176.0, -5103.0/18656.0],
    &[35.0/384.0, 0.0, 500.0/1113.0, 125.0/192.0, -2187.0/6784.0, 11.0/84.0],
];

/// Difference between the 5th and 4th order weights
const TR: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// Dormand-Prince 5(4) adaptive solver (DOPRI5)
///
/// Seven-stage, 5th order Runge-Kutta method with embedded 4th order
/// error estimate. The default integrator of the sampling loop: the
/// plant equation is smooth between step events, so a handful of accepted
/// steps cover one sampling interval at tight tolerances.
///
/// The FSAL property is not exploited, all seven stages are evaluated
/// each step.
///
/// # Characteristics
/// - Order: 5 (propagating) / 4 (embedded)
/// - Stages: 7
/// - Explicit, adaptive timestep
///
/// # References
/// - Dormand, J. R., & Prince, P. J. (1980). "A family of embedded
///   Runge-Kutta formulae". Journal of Computational and Applied
///   Mathematics, 6(1), 19-26.
/// - Shampine, L. F., & Reichelt, M. W. (1997). "The MATLAB ODE Suite".
///   SIAM Journal on Scientific Computing, 18(1), 1-22.
#[derive(Debug, Clone)]
pub struct RKDP54 {
    state: DVector<f64>,
    initial: DVector<f64>,
    history: VecDeque<DVector<f64>>,
    slopes: Vec<DVector<f64>>,
    stage: usize,
    tol_abs: f64,
    tol_rel: f64,
    beta: f64,
}

impl RKDP54 {
    /// Create a new RKDP54 solver with the given initial state
    ///
    /// # Arguments
    /// * `initial` - Initial state vector
    ///
    /// Uses `tol_abs = 1e-10` and `tol_rel = 1e-8`.
    pub fn new(initial: DVector<f64>) -> Self {
        Self::with_tolerances(initial, 1e-10, 1e-8)
    }

    /// Create a new RKDP54 solver with custom tolerances
    pub fn with_tolerances(initial: DVector<f64>, tol_abs: f64, tol_rel: f64) -> Self {
        let n = initial.len();
        Self {
            state: initial.clone(),
            initial,
            history: VecDeque::with_capacity(2),
            slopes: vec![DVector::zeros(n); 7],
            stage: 0,
            tol_abs,
            tol_rel,
            beta: 0.9, // Safety factor
        }
    }

    /// Absolute and relative tolerances
    pub fn tolerances(&self) -> (f64, f64) {
        (self.tol_abs, self.tol_rel)
    }

    /// Compute error norm and timestep scale factor
    fn error_controller(&self, dt: f64) -> (bool, f64, f64) {
        let mut error_slope = DVector::zeros(self.state.len());
        for (coef, slope) in TR.iter().zip(&self.slopes) {
            error_slope += *coef * slope;
        }

        let scale = self.state.map(|x| self.tol_abs + self.tol_rel * x.abs());
        let scaled_error = (dt * &error_slope).component_div(&scale).map(|e| e.abs());

        // Max norm with a floor so the rescale factor stays finite
        let error_norm = scaled_error.max().max(1e-16);
        let success = error_norm <= 1.0;

        // Exponent from the embedded order (4)
        let timestep_scale = (self.beta / error_norm.powf(1.0 / 5.0)).clamp(0.1, 10.0);

        (success, error_norm, timestep_scale)
    }
}

impl Solver for RKDP54 {
    fn state(&self) -> &DVector<f64> {
        &self.state
    }

    fn set_state(&mut self, state: DVector<f64>) {
        if state.len() != self.slopes[0].len() {
            self.slopes = vec![DVector::zeros(state.len()); 7];
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
        5
    }

    fn stages(&self) -> usize {
        7
    }

    fn is_adaptive(&self) -> bool {
        true
    }
}

impl ExplicitSolver for RKDP54 {
    fn step<F>(&mut self, mut f: F, dt: f64) -> SolverStepResult
    where
        F: FnMut(&DVector<f64>, f64) -> DVector<f64>,
    {
        let x0 = self
            .history
            .front()
            .expect("Must call buffer() before step()");

        self.slopes[self.stage] = f(&self.state, C[self.stage] * dt);

        if self.stage < 6 {
            let mut slope_sum = DVector::zeros(x0.len());
            for (coef, slope) in A[self.stage].iter().zip(&self.slopes) {
                slope_sum += *coef * slope;
            }
            self.state = x0 + dt * slope_sum;
            self.stage += 1;

            SolverStepResult::default()
        } else {
            // Stage 7 is evaluated at the 5th order solution, state already holds it
            let (success, error_norm, scale) = self.error_controller(dt);
            self.stage = 0;

            SolverStepResult {
                success,
                error_norm,
                scale: Some(scale),
            }
        }
    }
}
