//! Dead-time lookup into the controller output history

use crate::error::{ensure_finite, ConfigError};

/// Guard added before truncation so exact multiples survive rounding
const ROUNDING_GUARD: f64 = 1e-9;

/// Dead time expressed in whole samples
///
/// `floor(td / ts)`, with a small guard so that e.g. `0.3 / 0.1`
/// (`2.9999999999999996` in binary floating point) counts as 3 samples.
pub fn delay_samples(td: f64, ts: f64) -> Result<usize, ConfigError> {
    ensure_finite("td", td)?;
    ensure_finite("ts", ts)?;
    if ts <= 0.0 {
        return Err(ConfigError::NonPositiveSamplePeriod(ts));
    }
    if td < 0.0 {
        return Err(ConfigError::NegativeDeadTime(td));
    }
    Ok((td / ts + ROUNDING_GUARD).floor() as usize)
}

/// Delayed view of the controller output series
///
/// For the sample about to be computed at index `n = history.len()` the
/// plant sees `history[n - d]`, `d` being the dead time in samples. While
/// fewer than `d` samples exist the bias output `co0` is returned. A zero
/// delay holds the latest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadTimeBuffer {
    delay: usize,
}

impl DeadTimeBuffer {
    pub fn new(td: f64, ts: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            delay: delay_samples(td, ts)?,
        })
    }

    /// Delay in samples
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Index into `history` that a lookup would read, if any
    pub fn index(&self, len: usize) -> Option<usize> {
        match self.delay {
            0 => len.checked_sub(1),
            d if len >= d => Some(len - d),
            _ => None,
        }
    }

    /// Delayed controller output
    pub fn lookup(&self, history: &[f64], co0: f64) -> f64 {
        self.index(history.len())
            .map(|i| history[i])
            .unwrap_or(co0)
    }
}
