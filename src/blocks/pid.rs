//! Incremental discrete PID controller

use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, ConfigError};

/// Controller operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlMode {
    /// Closed loop, the PID law computes the output
    #[default]
    Auto,
    /// Open loop, the output is set by the operator
    Manual,
}

impl ControlMode {
    pub fn is_auto(&self) -> bool {
        matches!(self, ControlMode::Auto)
    }
}

/// Gains, sample period and output limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerParameters {
    pub kc: f64,
    pub ki: f64,
    pub kd: f64,
    /// Sample period, must be positive
    pub ts: f64,
    pub co_min: f64,
    pub co_max: f64,
}

impl ControllerParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_finite("kc", self.kc)?;
        ensure_finite("ki", self.ki)?;
        ensure_finite("kd", self.kd)?;
        ensure_finite("ts", self.ts)?;
        ensure_finite("co_min", self.co_min)?;
        ensure_finite("co_max", self.co_max)?;
        if self.ts <= 0.0 {
            return Err(ConfigError::NonPositiveSamplePeriod(self.ts));
        }
        if self.co_min > self.co_max {
            return Err(ConfigError::InvertedOutputLimits {
                min: self.co_min,
                max: self.co_max,
            });
        }
        Ok(())
    }

    /// Velocity-form coefficients `[q0, q1, q2]`
    ///
    /// Trapezoidal integral, backward-difference derivative.
    pub fn coefficients(&self) -> [f64; 3] {
        let Self { kc, ki, kd, ts, .. } = *self;
        [
            kc + ts * ki / 2.0 + kd / ts,
            kc - ts * ki / 2.0 + 2.0 * kd / ts,
            kd / ts,
        ]
    }
}

/// Current and two previous error samples
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorHistory {
    pub ek: f64,
    pub ek1: f64,
    pub ek2: f64,
}

impl ErrorHistory {
    fn push(&mut self, ek: f64) {
        self.ek2 = self.ek1;
        self.ek1 = self.ek;
        self.ek = ek;
    }
}

/// Discrete PID in incremental (velocity) form
///
/// # Control Law
///
/// ```text
/// ek     = ysp - y
/// delta  = q0*ek - q1*ek1 + q2*ek2
/// new_co = clamp(prev_co + delta, co_min, co_max)
/// ```
///
/// The coefficients are derived from the current gains on every step, so
/// a gain change takes effect on the next sample without a jump in the
/// output. Saturation clamps the output only; the error history is never
/// altered and there is no anti-windup.
///
/// In manual mode the operator value (clamped to the same limits) is
/// returned, while the error history keeps advancing so that switching
/// back to auto does not kick the derivative term.
///
/// # Example
///
/// ```ignore
/// let mut pid = PidController::new(params)?;
/// let co = pid.step(y, ysp, prev_co);
/// ```
#[derive(Debug, Clone)]
pub struct PidController {
    params: ControllerParameters,
    mode: ControlMode,
    manual_output: f64,
    errors: ErrorHistory,
}

impl PidController {
    pub fn new(params: ControllerParameters) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            mode: ControlMode::Auto,
            manual_output: params.co_min,
            errors: ErrorHistory::default(),
        })
    }

    pub fn params(&self) -> &ControllerParameters {
        &self.params
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn errors(&self) -> &ErrorHistory {
        &self.errors
    }

    pub fn manual_output(&self) -> f64 {
        self.manual_output
    }

    pub fn coefficients(&self) -> [f64; 3] {
        self.params.coefficients()
    }

    /// Set PID gains
    ///
    /// Rejected gains leave the previous ones in place.
    pub fn set_gains(&mut self, kc: f64, ki: f64, kd: f64) -> Result<(), ConfigError> {
        let params = ControllerParameters { kc, ki, kd, ..self.params };
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Set output limits
    pub fn set_limits(&mut self, co_min: f64, co_max: f64) -> Result<(), ConfigError> {
        let params = ControllerParameters {
            co_min,
            co_max,
            ..self.params
        };
        params.validate()?;
        self.params = params;
        self.manual_output = self.clamp(self.manual_output);
        Ok(())
    }

    pub fn set_mode(&mut self, mode: ControlMode) {
        self.mode = mode;
    }

    /// Operator output used in manual mode
    pub fn set_manual_output(&mut self, co: f64) {
        self.manual_output = self.clamp(co);
    }

    /// Clear the error history
    pub fn reset(&mut self) {
        self.errors = ErrorHistory::default();
    }

    /// Compute the next controller output
    pub fn step(&mut self, y: f64, ysp: f64, prev_co: f64) -> f64 {
        self.errors.push(ysp - y);

        match self.mode {
            ControlMode::Auto => {
                let [q0, q1, q2] = self.coefficients();
                let ErrorHistory { ek, ek1, ek2 } = self.errors;
                let delta = q0 * ek - q1 * ek1 + q2 * ek2;
                self.clamp(prev_co + delta)
            }
            ControlMode::Manual => self.manual_output,
        }
    }

    #[inline]
    fn clamp(&self, co: f64) -> f64 {
        co.clamp(self.params.co_min, self.params.co_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> ControllerParameters {
        ControllerParameters {
            kc: 0.6058,
            ki: 0.0606,
            kd: 0.0,
            ts: 0.1,
            co_min: 0.0,
            co_max: 100.0,
        }
    }

    #[test]
    fn test_coefficients() {
        let p = ControllerParameters {
            kd: 0.5,
            ..params()
        };
        let [q0, q1, q2] = p.coefficients();
        assert_relative_eq!(q0, 0.6058 + 0.00303 + 5.0, epsilon = 1e-12);
        assert_relative_eq!(q1, 0.6058 - 0.00303 + 10.0, epsilon = 1e-12);
        assert_relative_eq!(q2, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_first_step_is_proportional_plus_half_integral() {
        let mut pid = PidController::new(params()).unwrap();
        let co = pid.step(50.0, 52.0, 50.0);
        assert_relative_eq!(co, 50.0 + 2.0 * (0.6058 + 0.00303), epsilon = 1e-12);
        assert_eq!(pid.errors().ek, 2.0);
    }

    #[test]
    fn test_constant_error_ramps_by_integral_term() {
        let mut pid = PidController::new(params()).unwrap();
        let mut co = 50.0;
        co = pid.step(50.0, 51.0, co);
        let first = co;
        co = pid.step(50.0, 51.0, co);
        // q0 - q1 = Ts * Ki
        assert_relative_eq!(co - first, 0.1 * 0.0606, epsilon = 1e-12);
    }

    #[test]
    fn test_output_is_clamped_without_touching_errors() {
        let mut pid = PidController::new(params()).unwrap();
        let co = pid.step(0.0, 1000.0, 99.0);
        assert_eq!(co, 100.0);
        assert_eq!(pid.errors().ek, 1000.0);

        let co = pid.step(1000.0, 0.0, 1.0);
        assert_eq!(co, 0.0);
        assert_eq!(pid.errors().ek1, 1000.0);
        assert_eq!(pid.errors().ek, -1000.0);
    }

    #[test]
    fn test_clamp_holds_for_extreme_inputs() {
        let gains = [-50.0, -1.0, 0.0, 0.3, 10.0, 1e6];
        let values = [-1e9, -3.0, 0.0, 2.5, 1e9];
        for &kc in &gains {
            for &kd in &gains {
                let mut pid = PidController::new(ControllerParameters { kc, kd, ..params() }).unwrap();
                let mut co = 50.0;
                for &y in &values {
                    for &ysp in &values {
                        co = pid.step(y, ysp, co);
                        assert!((0.0..=100.0).contains(&co), "co {co} out of range");
                    }
                }
            }
        }
    }

    #[test]
    fn test_manual_mode_advances_errors() {
        let mut pid = PidController::new(params()).unwrap();
        pid.set_mode(ControlMode::Manual);
        pid.set_manual_output(42.0);

        assert_eq!(pid.step(50.0, 51.0, 60.0), 42.0);
        assert_eq!(pid.step(50.5, 51.0, 42.0), 42.0);
        assert_eq!(
            *pid.errors(),
            ErrorHistory {
                ek: 0.5,
                ek1: 1.0,
                ek2: 0.0
            }
        );
    }

    #[test]
    fn test_manual_output_is_clamped() {
        let mut pid = PidController::new(params()).unwrap();
        pid.set_manual_output(150.0);
        assert_eq!(pid.manual_output(), 100.0);
        pid.set_limits(0.0, 80.0).unwrap();
        assert_eq!(pid.manual_output(), 80.0);
    }

    #[test]
    fn test_gain_change_keeps_output_continuous() {
        let mut pid = PidController::new(params()).unwrap();
        let mut co = pid.step(50.0, 50.0, 50.0);
        assert_eq!(co, 50.0);

        pid.set_gains(5.0, 1.0, 0.0).unwrap();
        // Zero error, so the new gains cannot move the output
        co = pid.step(50.0, 50.0, co);
        assert_eq!(co, 50.0);
    }

    #[test]
    fn test_rejected_gains_keep_previous() {
        let mut pid = PidController::new(params()).unwrap();
        assert!(pid.set_gains(f64::NAN, 0.0, 0.0).is_err());
        assert_eq!(pid.params().kc, 0.6058);

        assert_eq!(
            pid.set_limits(10.0, 5.0),
            Err(ConfigError::InvertedOutputLimits { min: 10.0, max: 5.0 })
        );
    }

    #[test]
    fn test_invalid_sample_period() {
        let p = ControllerParameters { ts: 0.0, ..params() };
        assert_eq!(
            PidController::new(p).unwrap_err(),
            ConfigError::NonPositiveSamplePeriod(0.0)
        );
    }
}
