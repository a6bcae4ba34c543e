//! fopdt-sim - First-order-plus-dead-time process under discrete PID control
//!
//! A sampled-time loop simulator for tuning and teaching: a linear FOPDT
//! plant with dead time and multiplicative sensor noise, closed by an
//! incremental PID controller with auto/manual modes and output clamping.
//!
//! # Architecture
//!
//! - [`blocks`]: the loop components (plant, dead-time lookup, noise, PID)
//! - [`solvers`]: RKDP54 / RK4 steppers and the per-interval integrator
//! - [`simulation`]: the clock that owns the loop and records the trend
//! - [`state`]: the recorded trend and borrowed views of it
//! - [`config`], [`export`]: JSON configuration and CSV export
//!
//! # Example
//!
//! ```rust,ignore
//! use fopdt_sim::prelude::*;
//!
//! let mut clock = SimulationClock::new(SimulationConfig::default())?;
//! clock.set_setpoint(52.0)?;
//! while clock.time() < 150.0 {
//!     clock.run_batch()?;
//! }
//! let last = clock.last();
//! ```

pub mod blocks;
pub mod config;
pub mod error;
pub mod export;
pub mod simulation;
pub mod solvers;
pub mod state;

pub use config::{parse_input, SimulationConfig};
pub use error::{ConfigError, Result, SimError};
pub use simulation::{BatchReport, Command, SimulationClock};
pub use state::{Sample, Trend, TrendView};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::blocks::*;
    pub use crate::config::{parse_input, SimulationConfig};
    pub use crate::error::{ConfigError, SimError};
    pub use crate::export::{save_csv, write_csv, CsvStyle};
    pub use crate::simulation::{BatchReport, Command, SimulationClock};
    pub use crate::solvers::{IntegratorSettings, SolverType};
    pub use crate::state::{Sample, Trend, TrendView};
}
