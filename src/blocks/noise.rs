//! Multiplicative measurement noise

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;

use crate::error::{ensure_finite, ConfigError};

/// Multiplicative Gaussian sensor noise
///
/// `y_meas = y * m` with `m ~ Normal(1, sqrt(variance))`. While disabled
/// (or with zero variance) the sample passes through untouched and no
/// random number is drawn. Supports reproducible sequences via optional
/// seed.
///
/// # Example
///
/// ```ignore
/// let mut noise = NoiseInjector::new(1e-6, true, Some(42))?;
/// let measured = noise.apply(50.0);
/// ```
#[derive(Debug, Clone)]
pub struct NoiseInjector {
    variance: f64,
    enabled: bool,
    rng: StdRng,
    distribution: Normal<f64>,
}

impl NoiseInjector {
    /// Create an injector with variance, on/off state and optional seed
    pub fn new(variance: f64, enabled: bool, seed: Option<u64>) -> Result<Self, ConfigError> {
        let distribution = multiplier(variance)?;
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            variance,
            enabled,
            rng,
            distribution,
        })
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn set_variance(&mut self, variance: f64) -> Result<(), ConfigError> {
        self.distribution = multiplier(variance)?;
        self.variance = variance;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Reset with new seed
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Apply noise to a freshly integrated output sample
    pub fn apply(&mut self, y: f64) -> f64 {
        if !self.enabled || self.variance == 0.0 {
            return y;
        }
        y * self.distribution.sample(&mut self.rng)
    }
}

fn multiplier(variance: f64) -> Result<Normal<f64>, ConfigError> {
    ensure_finite("variance", variance)?;
    if variance < 0.0 {
        return Err(ConfigError::NegativeVariance(variance));
    }
    Normal::new(1.0, variance.sqrt()).map_err(|_| ConfigError::NegativeVariance(variance))
}
