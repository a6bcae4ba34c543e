//! First-order-plus-dead-time process model

use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, ConfigError};

/// FOPDT process parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessParameters {
    /// Process gain
    pub kp: f64,
    /// Time constant, must be positive
    pub tau_p: f64,
    /// Dead time, must be non-negative
    pub td: f64,
    /// Reference level subtracted from the unit step gate
    pub u0: f64,
}

impl ProcessParameters {
    /// Validated parameters with `u0 = 0`
    pub fn new(kp: f64, tau_p: f64, td: f64) -> Result<Self, ConfigError> {
        let params = Self {
            kp,
            tau_p,
            td,
            u0: 0.0,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_finite("kp", self.kp)?;
        ensure_finite("tau_p", self.tau_p)?;
        ensure_finite("td", self.td)?;
        ensure_finite("u0", self.u0)?;
        if self.tau_p <= 0.0 {
            return Err(ConfigError::NonPositiveTimeConstant(self.tau_p));
        }
        if self.td < 0.0 {
            return Err(ConfigError::NegativeDeadTime(self.td));
        }
        Ok(())
    }
}

/// Operating point the linearised model is anchored to
///
/// Re-anchored to the latest sample on every step-change event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasPoint {
    pub y0: f64,
    pub co0: f64,
    /// Time of the most recent step-change event
    pub tstep: f64,
}

/// FOPDT plant
///
/// ```text
/// u     = 0 if t - tstep < td else 1
/// dy/dt = -(y - y0)/tau_p + (kp/tau_p) * (u - u0) * (co - co0)
/// ```
///
/// Dead time acts as a gate on the forcing term: until `td` has elapsed
/// since the last step event the output only relaxes toward `y0`.
#[derive(Debug, Clone, PartialEq)]
pub struct FopdtModel {
    params: ProcessParameters,
}

impl FopdtModel {
    pub fn new(params: ProcessParameters) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ProcessParameters {
        &self.params
    }

    /// Unit step gate at absolute time `t`
    #[inline]
    pub fn gate(&self, t: f64, bias: &BiasPoint) -> f64 {
        if t - bias.tstep < self.params.td {
            0.0
        } else {
            1.0
        }
    }

    /// Absolute time at which the gate opens
    #[inline]
    pub fn gate_opens_at(&self, bias: &BiasPoint) -> f64 {
        bias.tstep + self.params.td
    }

    /// dy/dt for output `y` and delayed controller output `co_delayed`
    #[inline]
    pub fn derivative(&self, t: f64, y: f64, co_delayed: f64, bias: &BiasPoint) -> f64 {
        self.gated_derivative(self.gate(t, bias), y, co_delayed, bias)
    }

    /// dy/dt with the gate value `u` supplied by the caller
    ///
    /// Lets an integrator hold the gate constant over a segment that ends
    /// exactly at the opening instant.
    #[inline]
    pub fn gated_derivative(&self, u: f64, y: f64, co_delayed: f64, bias: &BiasPoint) -> f64 {
        let ProcessParameters { kp, tau_p, u0, .. } = self.params;
        -(y - bias.y0) / tau_p + kp / tau_p * (u - u0) * (co_delayed - bias.co0)
    }

    /// Analytic response to a constant `co_delayed` held since the last step event
    ///
    /// Valid for `u0 = 0` and an output starting at `y0`.
    pub fn step_response(&self, t: f64, co_delayed: f64, bias: &BiasPoint) -> f64 {
        let elapsed = t - self.gate_opens_at(bias);
        if elapsed <= 0.0 {
            return bias.y0;
        }
        let ProcessParameters { kp, tau_p, .. } = self.params;
        bias.y0 + kp * (co_delayed - bias.co0) * (1.0 - (-elapsed / tau_p).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> FopdtModel {
        FopdtModel::new(ProcessParameters::new(4.59, 15.14, 5.0).unwrap()).unwrap()
    }

    const BIAS: BiasPoint = BiasPoint {
        y0: 50.0,
        co0: 50.0,
        tstep: 2.0,
    };

    #[test]
    fn test_gate_closed_before_dead_time() {
        let m = model();
        assert_eq!(m.gate(2.0, &BIAS), 0.0);
        assert_eq!(m.gate(6.999, &BIAS), 0.0);
        assert_eq!(m.gate(7.0, &BIAS), 1.0);
        assert_eq!(m.gate_opens_at(&BIAS), 7.0);
    }

    #[test]
    fn test_derivative_unforced_before_gate() {
        let m = model();
        // Forcing ignored, only relaxation toward y0
        assert_eq!(m.derivative(3.0, 50.0, 80.0, &BIAS), 0.0);
        assert_relative_eq!(m.derivative(3.0, 51.514, 80.0, &BIAS), -0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_derivative_forced_after_gate() {
        let m = model();
        let dydt = m.derivative(8.0, 50.0, 51.0, &BIAS);
        assert_relative_eq!(dydt, 4.59 / 15.14, epsilon = 1e-12);
    }

    #[test]
    fn test_u0_offsets_gate() {
        let params = ProcessParameters {
            u0: 1.0,
            ..ProcessParameters::new(2.0, 4.0, 1.0).unwrap()
        };
        let m = FopdtModel::new(params).unwrap();
        let bias = BiasPoint {
            y0: 0.0,
            co0: 0.0,
            tstep: 0.0,
        };
        assert_eq!(m.derivative(5.0, 0.0, 3.0, &bias), 0.0);
        assert_relative_eq!(m.derivative(0.5, 0.0, 3.0, &bias), -1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_step_response_shape() {
        let m = model();
        assert_eq!(m.step_response(6.0, 51.0, &BIAS), 50.0);
        let one_tau = m.step_response(7.0 + 15.14, 51.0, &BIAS);
        assert_relative_eq!(one_tau, 50.0 + 4.59 * (1.0 - (-1.0_f64).exp()), epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert_eq!(
            ProcessParameters::new(1.0, 0.0, 1.0),
            Err(ConfigError::NonPositiveTimeConstant(0.0))
        );
        assert_eq!(
            ProcessParameters::new(1.0, 1.0, -0.5),
            Err(ConfigError::NegativeDeadTime(-0.5))
        );
        assert!(matches!(
            ProcessParameters::new(f64::NAN, 1.0, 1.0),
            Err(ConfigError::NonFinite { field: "kp", .. })
        ));
    }
}
