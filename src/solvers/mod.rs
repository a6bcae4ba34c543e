//! Numerical integration solvers
//!
//! Provides the explicit Runge-Kutta methods used to advance the plant
//! between samples:
//! - Dormand-Prince 5(4) with adaptive timestepping (default)
//! - Classical RK4 with fixed substeps
//!
//! [`Integrator`] drives either one across a single sampling interval.

mod base;
mod integrator;
mod rk4;
mod rkdp54;

pub use base::*;
pub use integrator::{Integrator, IntegratorSettings, SolverType};
pub use rk4::RK4;
pub use rkdp54::RKDP54;
