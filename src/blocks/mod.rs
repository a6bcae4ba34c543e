//! Loop components: plant, dead time, sensor noise and controller

mod dead_time;
mod fopdt;
mod noise;
mod pid;

pub use dead_time::{delay_samples, DeadTimeBuffer};
pub use fopdt::{BiasPoint, FopdtModel, ProcessParameters};
pub use noise::NoiseInjector;
pub use pid::{ControlMode, ControllerParameters, ErrorHistory, PidController};
