//! Simulation configuration
//!
//! A flat JSON document describing the plant, the controller, the initial
//! operating point and the run settings. Keys of the original simulator's
//! `config.json` (`Kp`, `taup`, `Ts`, `ruidoSenalEncendido`, ...) are
//! accepted as aliases, with integer 0/1 flags where booleans are expected.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::blocks::{BiasPoint, ControlMode, ControllerParameters, ProcessParameters};
use crate::error::{ensure_finite, ConfigError, SimError};
use crate::solvers::IntegratorSettings;
use crate::state::Sample;

/// Complete configuration of one simulated loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Process gain
    #[serde(alias = "Kp")]
    pub kp: f64,

    /// Process time constant
    #[serde(alias = "taup")]
    pub tau_p: f64,

    /// Process dead time
    pub td: f64,

    /// Unit step reference level of the plant gate
    pub u0: f64,

    #[serde(alias = "Kc")]
    pub kc: f64,

    #[serde(alias = "Ki")]
    pub ki: f64,

    #[serde(alias = "Kd")]
    pub kd: f64,

    /// Sample period
    #[serde(alias = "Ts")]
    pub ts: f64,

    /// Variance of the multiplicative measurement noise
    pub variance: f64,

    #[serde(alias = "ruidoSenalEncendido", deserialize_with = "flag")]
    pub noise_enabled: bool,

    pub co_min: f64,
    pub co_max: f64,

    /// Initial time
    pub t0: f64,

    /// Initial process output
    pub y0: f64,

    /// Initial controller output
    pub co0: f64,

    /// Initial setpoint
    pub ysp0: f64,

    #[serde(alias = "controlAutomaticoEncendido", deserialize_with = "mode")]
    pub mode: ControlMode,

    /// Steps per `run_batch` call
    #[serde(alias = "tVel")]
    pub batch_size: usize,

    /// Trailing span shown by trend displays, in seconds
    #[serde(alias = "tminGrafica")]
    pub trend_window: f64,

    /// Start with the clock running
    #[serde(alias = "estadoSimulacion", deserialize_with = "flag")]
    pub autostart: bool,

    /// Noise seed, `None` seeds from entropy
    pub seed: Option<u64>,

    pub integrator: IntegratorSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            kp: 4.59,
            tau_p: 15.14,
            td: 5.0,
            u0: 0.0,
            kc: 0.6058,
            ki: 0.0606,
            kd: 0.0,
            ts: 0.1,
            variance: 1e-8,
            noise_enabled: true,
            co_min: 0.0,
            co_max: 100.0,
            t0: 0.0,
            y0: 50.0,
            co0: 50.0,
            ysp0: 50.0,
            mode: ControlMode::Auto,
            batch_size: 10,
            trend_window: 120.0,
            autostart: true,
            seed: None,
            integrator: IntegratorSettings::default(),
        }
    }
}

impl SimulationConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(text: &str) -> Result<Self, SimError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every invariant the core relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.process_parameters().validate()?;
        self.controller_parameters().validate()?;
        self.integrator.validate()?;

        ensure_finite("variance", self.variance)?;
        if self.variance < 0.0 {
            return Err(ConfigError::NegativeVariance(self.variance));
        }
        for (field, value) in [
            ("t0", self.t0),
            ("y0", self.y0),
            ("co0", self.co0),
            ("ysp0", self.ysp0),
            ("trend_window", self.trend_window),
        ] {
            ensure_finite(field, value)?;
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }

    pub fn process_parameters(&self) -> ProcessParameters {
        ProcessParameters {
            kp: self.kp,
            tau_p: self.tau_p,
            td: self.td,
            u0: self.u0,
        }
    }

    pub fn controller_parameters(&self) -> ControllerParameters {
        ControllerParameters {
            kc: self.kc,
            ki: self.ki,
            kd: self.kd,
            ts: self.ts,
            co_min: self.co_min,
            co_max: self.co_max,
        }
    }

    /// Operating point at run start
    pub fn bias(&self) -> BiasPoint {
        BiasPoint {
            y0: self.y0,
            co0: self.co0,
            tstep: self.t0,
        }
    }

    pub fn initial_sample(&self) -> Sample {
        Sample {
            t: self.t0,
            y: self.y0,
            co: self.co0,
            ysp: self.ysp0,
        }
    }
}

/// Parse operator text for a numeric parameter
///
/// Used at the collaborator boundary before a command reaches the core.
/// On error the caller keeps showing the previous value.
pub fn parse_input(field: &str, input: &str) -> Result<f64, SimError> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SimError::InputValidation {
            field: field.to_string(),
            input: input.to_string(),
        })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match *self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
            Flag::Float(f) => f != 0.0,
        }
    }
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Flag::deserialize(deserializer)?.is_set())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModeRepr {
    Named(ControlMode),
    Flag(Flag),
}

fn mode<'de, D>(deserializer: D) -> Result<ControlMode, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ModeRepr::deserialize(deserializer)? {
        ModeRepr::Named(mode) => mode,
        ModeRepr::Flag(flag) if flag.is_set() => ControlMode::Auto,
        ModeRepr::Flag(_) => ControlMode::Manual,
    })
}
