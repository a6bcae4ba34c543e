//! Interval integration driver
//!
//! Advances a scalar state across one sampling interval using either the
//! adaptive RKDP54 pair or fixed-step RK4, landing exactly on the interval
//! end.

use log::{trace, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{ExplicitSolver, Solver, SolverError, RK4, RKDP54};
use crate::error::{ensure_finite, ConfigError};

/// Available interval integrators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SolverType {
    /// Dormand-Prince 5(4), adaptive
    #[default]
    Rkdp54,
    /// Classical RK4 with a fixed number of substeps per interval
    Rk4,
}

impl SolverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverType::Rkdp54 => "RKDP54",
            SolverType::Rk4 => "RK4",
        }
    }
}

/// Integrator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    /// Solver used for each sampling interval
    pub solver: SolverType,

    /// Absolute tolerance for adaptive stepping
    pub atol: f64,

    /// Relative tolerance for adaptive stepping
    pub rtol: f64,

    /// Minimum accepted timestep before giving up
    pub dt_min: f64,

    /// Maximum number of attempted steps per interval
    pub max_steps: usize,

    /// Substeps per interval for fixed-step RK4
    pub substeps: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            solver: SolverType::Rkdp54,
            atol: 1e-10,
            rtol: 1e-8,
            dt_min: 1e-10,
            max_steps: 10_000,
            substeps: 10,
        }
    }
}

impl IntegratorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_finite("atol", self.atol)?;
        ensure_finite("rtol", self.rtol)?;
        ensure_finite("dt_min", self.dt_min)?;
        if self.atol < 0.0 || self.rtol < 0.0 || (self.atol == 0.0 && self.rtol == 0.0) {
            return Err(ConfigError::InvalidTolerance {
                atol: self.atol,
                rtol: self.rtol,
            });
        }
        if self.dt_min <= 0.0 {
            return Err(ConfigError::NonPositiveMinStep(self.dt_min));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroStepCount("max_steps"));
        }
        if self.substeps == 0 {
            return Err(ConfigError::ZeroStepCount("substeps"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Stepper {
    Adaptive(RKDP54),
    Fixed(RK4),
}

/// Single-interval ODE integrator for a scalar state
///
/// The right-hand side is `f(t, y) -> dy/dt` with absolute time `t`.
/// The adaptive stepper remembers the last accepted step size and reuses
/// it as the first guess for the next interval.
#[derive(Debug, Clone)]
pub struct Integrator {
    settings: IntegratorSettings,
    stepper: Stepper,
    dt_guess: Option<f64>,
}

impl Integrator {
    pub fn new(settings: IntegratorSettings) -> Self {
        let initial = DVector::from_element(1, 0.0);
        let stepper = match settings.solver {
            SolverType::Rkdp54 => {
                Stepper::Adaptive(RKDP54::with_tolerances(initial, settings.atol, settings.rtol))
            }
            SolverType::Rk4 => Stepper::Fixed(RK4::new(initial)),
        };
        Self {
            settings,
            stepper,
            dt_guess: None,
        }
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    /// Forget the remembered step size and solver history
    pub fn reset(&mut self) {
        self.dt_guess = None;
        match &mut self.stepper {
            Stepper::Adaptive(solver) => solver.reset(),
            Stepper::Fixed(solver) => solver.reset(),
        }
    }

    /// Integrate `y` from `start` to `end`
    ///
    /// Returns the state at exactly `end`. A non-finite state, a timestep
    /// underflow or running out of steps is an error.
    pub fn integrate<F>(&mut self, f: F, start: f64, end: f64, y: f64) -> Result<f64, SolverError>
    where
        F: FnMut(f64, f64) -> f64,
    {
        let span = end - start;
        if !(span.is_finite() && span >= 0.0) {
            return Err(SolverError::InvalidInterval { start, end });
        }
        if span == 0.0 {
            return Ok(y);
        }

        let settings = self.settings;
        let y_end = match &mut self.stepper {
            Stepper::Adaptive(solver) => {
                let dt = self.dt_guess.unwrap_or(span).min(span);
                let (y_end, dt_next) = adaptive(solver, &settings, f, start, end, y, dt)?;
                self.dt_guess = Some(dt_next);
                y_end
            }
            Stepper::Fixed(solver) => fixed(solver, settings.substeps.max(1), f, start, end, y)?,
        };

        if !y_end.is_finite() {
            return Err(SolverError::NonFiniteState { t: end });
        }
        Ok(y_end)
    }
}

fn run_stages<S, F>(solver: &mut S, f: &mut F, t: f64, h: f64) -> super::SolverStepResult
where
    S: ExplicitSolver,
    F: FnMut(f64, f64) -> f64,
{
    solver.buffer(h);
    let mut result = super::SolverStepResult::default();
    for _ in 0..solver.stages() {
        result = solver.step(|x, offset| x.map(|y| f(t + offset, y)), h);
    }
    result
}

fn adaptive<F>(
    solver: &mut RKDP54,
    settings: &IntegratorSettings,
    mut f: F,
    start: f64,
    end: f64,
    y: f64,
    mut dt: f64,
) -> Result<(f64, f64), SolverError>
where
    F: FnMut(f64, f64) -> f64,
{
    solver.set_state(DVector::from_element(1, y));

    let mut t = start;
    let mut rejections = 0usize;

    for _ in 0..settings.max_steps {
        let remaining = end - t;
        // Absorb a sliver left by rounding into the current step
        let last = dt >= remaining * (1.0 - 1e-12);
        let h = if last { remaining } else { dt };

        let result = run_stages(solver, &mut f, t, h);
        let scale = result.scale.unwrap_or(1.0);

        if !solver.state()[0].is_finite() {
            return Err(SolverError::NonFiniteState { t: t + h });
        }

        if !result.success {
            solver.revert()?;
            rejections += 1;
            dt = h * scale;
            if dt < settings.dt_min {
                warn!("integrator step underflow at t = {t} after {rejections} rejections");
                return Err(SolverError::TimestepTooSmall {
                    dt,
                    dt_min: settings.dt_min,
                });
            }
            continue;
        }

        if last {
            // A shortened final step says nothing about the step size the dynamics allow
            let dt_next = if h < dt { dt } else { h * scale };
            trace!("interval [{start}, {end}] done, {rejections} rejections");
            return Ok((solver.state()[0], dt_next));
        }
        t += h;
        dt = h * scale;
    }

    Err(SolverError::ConvergenceFailure(settings.max_steps))
}

fn fixed<F>(solver: &mut RK4, substeps: usize, mut f: F, start: f64, end: f64, y: f64) -> Result<f64, SolverError>
where
    F: FnMut(f64, f64) -> f64,
{
    solver.set_state(DVector::from_element(1, y));

    let h = (end - start) / substeps as f64;
    for k in 0..substeps {
        let t = start + k as f64 * h;
        run_stages(solver, &mut f, t, h);
        if !solver.state()[0].is_finite() {
            return Err(SolverError::NonFiniteState { t: t + h });
        }
    }

    Ok(solver.state()[0])
}
