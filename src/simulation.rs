//! Sampled-time simulation clock
//!
//! [`SimulationClock`] owns the plant, the controller and the recorded
//! trend. Each call to [`SimulationClock::run_batch`] advances the loop by
//! `batch_size` sampling periods:
//!
//! ```text
//! t_k     = t0 + k*ts
//! co_d    = co[k - d]             (dead-time lookup)
//! y_k     = noise(integrate(y_{k-1}, t_{k-1} -> t_k))
//! co_k    = pid(y_k, ysp, co_{k-1})
//! ```
//!
//! Operator changes that step an input (setpoint, manual output, mode)
//! re-anchor the linearised model at the latest sample.

use std::collections::VecDeque;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::blocks::{
    BiasPoint, ControlMode, DeadTimeBuffer, FopdtModel, NoiseInjector, PidController, ProcessParameters,
};
use crate::config::SimulationConfig;
use crate::error::{ensure_finite, Result, SimError};
use crate::solvers::{Integrator, SolverError};
use crate::state::{Sample, Trend, TrendView};

/// Operator command, queued with [`SimulationClock::submit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    SetSetpoint(f64),
    SetManualOutput(f64),
    SetGains { kc: f64, ki: f64, kd: f64 },
    SetMode(ControlMode),
    SetNoiseEnabled(bool),
    SetNoiseVariance(f64),
    SetBatchSize(usize),
    SetProcess(ProcessParameters),
    Start,
    Stop,
    Reset,
}

/// Result of one [`SimulationClock::run_batch`] call
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Sampling steps taken
    pub steps: usize,
    /// Queued commands that failed validation, with the reason
    pub rejected: Vec<(Command, SimError)>,
}

/// FOPDT plant under discrete PID control
pub struct SimulationClock {
    config: SimulationConfig,
    model: FopdtModel,
    dead_time: DeadTimeBuffer,
    integrator: Integrator,
    noise: NoiseInjector,
    pid: PidController,
    trend: Trend,
    bias: BiasPoint,
    setpoint: f64,
    batch_size: usize,
    running: bool,
    pending: VecDeque<Command>,
}

impl SimulationClock {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let params = config.process_parameters();
        let model = FopdtModel::new(params)?;
        let dead_time = DeadTimeBuffer::new(params.td, config.ts)?;
        let noise = NoiseInjector::new(config.variance, config.noise_enabled, config.seed)?;

        let mut pid = PidController::new(config.controller_parameters())?;
        pid.set_mode(config.mode);
        pid.set_manual_output(config.co0);

        info!(
            "simulation ready: kp={} tau_p={} td={} ts={} ({} delay samples, {})",
            params.kp,
            params.tau_p,
            params.td,
            config.ts,
            dead_time.delay(),
            config.integrator.solver.as_str()
        );

        Ok(Self {
            model,
            dead_time,
            integrator: Integrator::new(config.integrator),
            noise,
            pid,
            trend: Trend::new(config.initial_sample()),
            bias: config.bias(),
            setpoint: config.ysp0,
            batch_size: config.batch_size,
            running: config.autostart,
            pending: VecDeque::new(),
            config,
        })
    }

    /// Current settings
    ///
    /// Gains, process parameters, noise and batch size track the setters,
    /// so saving this persists the live tuning. The initial operating
    /// point is the one `reset` returns to.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn trend(&self) -> &Trend {
        &self.trend
    }

    /// Owned copy of the trend for a display or export collaborator
    pub fn snapshot(&self) -> Trend {
        self.trend.clone()
    }

    /// Trailing samples covering the last `span` seconds
    pub fn window(&self, span: f64) -> TrendView<'_> {
        self.trend.window(span)
    }

    /// Trailing samples covering the configured trend window
    pub fn display_window(&self) -> TrendView<'_> {
        self.trend.window(self.config.trend_window)
    }

    pub fn last(&self) -> Sample {
        self.trend.last().unwrap_or_else(|| self.config.initial_sample())
    }

    pub fn time(&self) -> f64 {
        self.last().t
    }

    pub fn bias(&self) -> &BiasPoint {
        &self.bias
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn mode(&self) -> ControlMode {
        self.pid.mode()
    }

    pub fn controller(&self) -> &PidController {
        &self.pid
    }

    pub fn model(&self) -> &FopdtModel {
        &self.model
    }

    pub fn dead_time(&self) -> &DeadTimeBuffer {
        &self.dead_time
    }

    pub fn noise(&self) -> &NoiseInjector {
        &self.noise
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Commands waiting for the next batch
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn start(&mut self) {
        if !self.running {
            info!("simulation started at t = {}", self.time());
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            info!("simulation stopped at t = {}", self.time());
        }
        self.running = false;
    }

    /// Change the setpoint
    ///
    /// A new value is a step event. Setting the current value again does
    /// nothing.
    pub fn set_setpoint(&mut self, ysp: f64) -> Result<()> {
        ensure_finite("ysp", ysp)?;
        if ysp != self.setpoint {
            debug!("setpoint {} -> {}", self.setpoint, ysp);
            self.setpoint = ysp;
            self.reanchor();
        }
        Ok(())
    }

    /// Change the operator output
    ///
    /// The value is clamped to the output limits. It is a step event only
    /// while the controller is in manual mode.
    pub fn set_manual_output(&mut self, co: f64) -> Result<()> {
        ensure_finite("co", co)?;
        let before = self.pid.manual_output();
        self.pid.set_manual_output(co);
        if !self.pid.mode().is_auto() && self.pid.manual_output() != before {
            debug!("manual output {} -> {}", before, self.pid.manual_output());
            self.reanchor();
        }
        Ok(())
    }

    /// Replace the PID gains, effective from the next sample
    pub fn set_gains(&mut self, kc: f64, ki: f64, kd: f64) -> Result<()> {
        self.pid.set_gains(kc, ki, kd)?;
        self.config.kc = kc;
        self.config.ki = ki;
        self.config.kd = kd;
        debug!("gains kc={kc} ki={ki} kd={kd}");
        Ok(())
    }

    /// Switch between auto and manual
    ///
    /// Entering manual holds the latest output so the transfer is
    /// bumpless. A mode flip is a step event.
    pub fn set_mode(&mut self, mode: ControlMode) {
        if mode == self.pid.mode() {
            return;
        }
        if mode == ControlMode::Manual {
            self.pid.set_manual_output(self.last().co);
        }
        self.pid.set_mode(mode);
        debug!("mode -> {mode:?}");
        self.reanchor();
    }

    pub fn set_noise_enabled(&mut self, enabled: bool) {
        if enabled != self.noise.is_enabled() {
            debug!("noise {}", if enabled { "on" } else { "off" });
        }
        self.noise.set_enabled(enabled);
        self.config.noise_enabled = enabled;
    }

    /// Replace the variance of the measurement noise
    pub fn set_noise_variance(&mut self, variance: f64) -> Result<()> {
        self.noise.set_variance(variance)?;
        self.config.variance = variance;
        Ok(())
    }

    /// Steps per batch, at least 1
    pub fn set_batch_size(&mut self, steps: usize) {
        self.batch_size = steps.max(1);
        self.config.batch_size = self.batch_size;
    }

    /// Replace the plant parameters
    ///
    /// Only allowed while the clock is stopped. The sample period is
    /// owned by the controller and does not change.
    pub fn set_process(&mut self, params: ProcessParameters) -> Result<()> {
        if self.running {
            return Err(SimError::Running);
        }
        let model = FopdtModel::new(params)?;
        let dead_time = DeadTimeBuffer::new(params.td, self.config.ts)?;
        self.model = model;
        self.dead_time = dead_time;
        self.config.kp = params.kp;
        self.config.tau_p = params.tau_p;
        self.config.td = params.td;
        self.config.u0 = params.u0;
        info!(
            "process kp={} tau_p={} td={} ({} delay samples)",
            params.kp,
            params.tau_p,
            params.td,
            self.dead_time.delay()
        );
        Ok(())
    }

    /// Restart the trend from the initial operating point
    ///
    /// Gains, process parameters, noise and batch size are operator
    /// settings and survive a reset.
    pub fn reset(&mut self) {
        self.trend = Trend::new(self.config.initial_sample());
        self.bias = self.config.bias();
        self.setpoint = self.config.ysp0;
        self.pid.reset();
        self.pid.set_mode(self.config.mode);
        self.pid.set_manual_output(self.config.co0);
        self.integrator.reset();
        self.pending.clear();
        info!("simulation reset to t = {}", self.config.t0);
    }

    /// Queue a command for the start of the next batch
    pub fn submit(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// Apply one command immediately
    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::SetSetpoint(ysp) => self.set_setpoint(ysp),
            Command::SetManualOutput(co) => self.set_manual_output(co),
            Command::SetGains { kc, ki, kd } => self.set_gains(kc, ki, kd),
            Command::SetMode(mode) => {
                self.set_mode(mode);
                Ok(())
            }
            Command::SetNoiseEnabled(enabled) => {
                self.set_noise_enabled(enabled);
                Ok(())
            }
            Command::SetNoiseVariance(variance) => self.set_noise_variance(variance),
            Command::SetBatchSize(steps) => {
                self.set_batch_size(steps);
                Ok(())
            }
            Command::SetProcess(params) => self.set_process(params),
            Command::Start => {
                self.start();
                Ok(())
            }
            Command::Stop => {
                self.stop();
                Ok(())
            }
            Command::Reset => {
                self.reset();
                Ok(())
            }
        }
    }

    /// Apply queued commands, then advance `batch_size` steps if running
    ///
    /// A rejected command is reported and skipped; the rest of the queue
    /// and the batch still run. On a numeric failure the clock stops and
    /// the trend keeps every sample produced before it.
    pub fn run_batch(&mut self) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        while let Some(command) = self.pending.pop_front() {
            if let Err(err) = self.apply(command.clone()) {
                warn!("rejected {command:?}: {err}");
                report.rejected.push((command, err));
            }
        }

        if self.running {
            report.steps = self.run_steps(self.batch_size)?;
        }
        Ok(report)
    }

    /// Advance exactly `steps` sampling periods regardless of run state
    pub fn run_steps(&mut self, steps: usize) -> Result<usize> {
        for taken in 0..steps {
            if let Err(err) = self.advance() {
                error!("{err}, stopping after {taken} steps");
                self.running = false;
                return Err(err);
            }
        }
        Ok(steps)
    }

    fn advance(&mut self) -> Result<Sample> {
        let prev = self.last();
        let t = self.config.t0 + self.trend.len() as f64 * self.config.ts;

        let co_delayed = self.dead_time.lookup(self.trend.co(), self.bias.co0);
        let y = self
            .integrate(prev.t, t, prev.y, co_delayed)
            .map_err(|source| SimError::NumericInstability { t, source })?;

        let y = self.noise.apply(y);
        if !y.is_finite() {
            return Err(SimError::NumericInstability {
                t,
                source: SolverError::NonFiniteState { t },
            });
        }

        let ysp = self.setpoint;
        let co = self.pid.step(y, ysp, prev.co);
        let sample = Sample { t, y, co, ysp };
        self.trend.push(sample);
        Ok(sample)
    }

    /// Integrate the plant over `[start, end]` with the gate held constant
    /// on each side of its opening instant.
    fn integrate(&mut self, start: f64, end: f64, y: f64, co_delayed: f64) -> std::result::Result<f64, SolverError> {
        let model = &self.model;
        let bias = self.bias;
        let gate = model.gate_opens_at(&bias);
        let closed = move |_t: f64, y: f64| model.gated_derivative(0.0, y, co_delayed, &bias);
        let open = move |_t: f64, y: f64| model.gated_derivative(1.0, y, co_delayed, &bias);

        if end <= gate {
            self.integrator.integrate(closed, start, end, y)
        } else if start >= gate {
            self.integrator.integrate(open, start, end, y)
        } else {
            let y_gate = self.integrator.integrate(closed, start, gate, y)?;
            self.integrator.integrate(open, gate, end, y_gate)
        }
    }

    fn reanchor(&mut self) {
        let last = self.last();
        self.bias = BiasPoint {
            y0: last.y,
            co0: last.co,
            tstep: last.t,
        };
        debug!(
            "bias y0={} co0={} tstep={}",
            self.bias.y0, self.bias.co0, self.bias.tstep
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::{IntegratorSettings, SolverType};
    use approx::assert_relative_eq;

    fn quiet(config: SimulationConfig) -> SimulationConfig {
        SimulationConfig {
            noise_enabled: false,
            seed: Some(0),
            ..config
        }
    }

    fn clock() -> SimulationClock {
        SimulationClock::new(quiet(SimulationConfig::default())).unwrap()
    }

    #[test]
    fn test_steady_state_is_held() {
        let mut clock = clock();
        let report = clock.run_batch().unwrap();
        assert_eq!(report.steps, 10);
        assert_eq!(clock.trend().len(), 11);
        for sample in clock.trend().iter() {
            assert_eq!(sample.y, 50.0);
            assert_eq!(sample.co, 50.0);
        }
    }

    #[test]
    fn test_time_is_index_based() {
        let mut clock = clock();
        clock.run_steps(1000).unwrap();
        let t = clock.trend().t();
        for (k, &tk) in t.iter().enumerate() {
            assert_eq!(tk, k as f64 * 0.1);
        }
    }

    #[test]
    fn test_stopped_clock_takes_no_steps() {
        let mut clock = clock();
        clock.stop();
        assert_eq!(clock.run_batch().unwrap().steps, 0);
        assert_eq!(clock.trend().len(), 1);
        clock.start();
        assert_eq!(clock.run_batch().unwrap().steps, 10);
    }

    #[test]
    fn test_setpoint_change_reanchors_bias() {
        let mut clock = clock();
        clock.run_steps(20).unwrap();
        clock.set_setpoint(52.0).unwrap();
        assert_eq!(
            *clock.bias(),
            BiasPoint {
                y0: 50.0,
                co0: 50.0,
                tstep: clock.time()
            }
        );

        let tstep = clock.bias().tstep;
        clock.run_steps(5).unwrap();
        clock.set_setpoint(52.0).unwrap();
        assert_eq!(clock.bias().tstep, tstep);
    }

    #[test]
    fn test_switch_to_manual_is_bumpless() {
        let mut clock = clock();
        clock.set_setpoint(52.0).unwrap();
        clock.run_steps(30).unwrap();
        let co = clock.last().co;
        assert!(co > 50.0);

        clock.set_mode(ControlMode::Manual);
        assert_eq!(clock.controller().manual_output(), co);
        assert_eq!(clock.bias().co0, co);

        clock.run_steps(10).unwrap();
        assert!(clock.trend().co()[31..].iter().all(|&c| c == co));
    }

    #[test]
    fn test_manual_output_in_auto_is_not_an_event() {
        let mut clock = clock();
        clock.run_steps(5).unwrap();
        clock.set_manual_output(70.0).unwrap();
        assert_eq!(clock.bias().tstep, 0.0);
        assert_eq!(clock.controller().manual_output(), 70.0);
    }

    #[test]
    fn test_queued_commands_apply_before_batch() {
        let mut clock = clock();
        clock.submit(Command::SetBatchSize(0));
        clock.submit(Command::SetSetpoint(51.0));
        clock.submit(Command::SetGains {
            kc: f64::NAN,
            ki: 0.0,
            kd: 0.0,
        });
        assert_eq!(clock.pending(), 3);

        let report = clock.run_batch().unwrap();
        assert_eq!(report.steps, 1);
        assert_eq!(report.rejected.len(), 1);
        assert!(matches!(report.rejected[0].1, SimError::Config(_)));
        assert_eq!(clock.pending(), 0);
        assert_eq!(clock.last().ysp, 51.0);
        assert_eq!(clock.controller().params().kc, 0.6058);
    }

    #[test]
    fn test_process_change_requires_stopped_clock() {
        let mut clock = clock();
        let params = ProcessParameters::new(2.0, 8.0, 0.35).unwrap();
        assert!(matches!(clock.set_process(params), Err(SimError::Running)));

        clock.stop();
        clock.set_process(params).unwrap();
        assert_eq!(clock.model().params(), &params);
        assert_eq!(clock.dead_time().delay(), 3);

        let invalid = ProcessParameters { tau_p: -1.0, ..params };
        assert!(clock.set_process(invalid).is_err());
        assert_eq!(clock.model().params(), &params);
    }

    #[test]
    fn test_config_tracks_live_settings() {
        let mut clock = clock();
        clock.set_gains(1.2, 0.08, 0.3).unwrap();
        clock.set_noise_enabled(true);
        clock.set_noise_variance(1e-6).unwrap();
        clock.set_batch_size(25);
        clock.stop();
        clock.set_process(ProcessParameters::new(2.0, 8.0, 1.5).unwrap()).unwrap();

        let saved = SimulationConfig::from_json_str(&clock.config().to_json_string().unwrap()).unwrap();
        assert_eq!((saved.kc, saved.ki, saved.kd), (1.2, 0.08, 0.3));
        assert_eq!((saved.kp, saved.tau_p, saved.td), (2.0, 8.0, 1.5));
        assert!(saved.noise_enabled);
        assert_eq!(saved.variance, 1e-6);
        assert_eq!(saved.batch_size, 25);
        assert!(clock.noise().is_enabled());

        // Rejected values leave the saved settings alone
        assert!(clock.set_noise_variance(-1.0).is_err());
        assert!(clock.set_gains(f64::INFINITY, 0.0, 0.0).is_err());
        assert_eq!(clock.config().variance, 1e-6);
        assert_eq!(clock.config().kc, 1.2);
    }

    #[test]
    fn test_reset_restores_initial_point() {
        let mut clock = clock();
        clock.set_setpoint(55.0).unwrap();
        clock.set_gains(1.0, 0.1, 0.0).unwrap();
        clock.run_steps(100).unwrap();

        clock.reset();
        assert_eq!(clock.trend().len(), 1);
        assert_eq!(clock.setpoint(), 50.0);
        assert_eq!(*clock.bias(), clock.config().bias());
        assert_eq!(clock.controller().errors().ek, 0.0);
        assert_eq!(clock.controller().params().kc, 1.0);
    }

    #[test]
    fn test_nan_state_stops_clock() {
        // kp/tau_p overflows, so the forcing term is inf * 0
        let config = SimulationConfig {
            kp: 1e308,
            tau_p: 1e-3,
            ..quiet(SimulationConfig::default())
        };
        let mut clock = SimulationClock::new(config).unwrap();
        let err = clock.run_batch().unwrap_err();
        assert!(matches!(err, SimError::NumericInstability { .. }));
        assert!(!clock.is_running());
        assert_eq!(clock.trend().len(), 1);
    }

    #[test]
    fn test_window_follows_configured_span() {
        let config = SimulationConfig {
            trend_window: 1.0,
            ..quiet(SimulationConfig::default())
        };
        let mut clock = SimulationClock::new(config).unwrap();
        clock.run_steps(50).unwrap();
        assert_eq!(clock.display_window().len(), 11);
        assert_eq!(clock.window(2.0).len(), 21);
    }

    #[test]
    fn test_fixed_step_solver_tracks_adaptive() {
        let fixed = SimulationConfig {
            integrator: IntegratorSettings {
                solver: SolverType::Rk4,
                ..IntegratorSettings::default()
            },
            ..quiet(SimulationConfig::default())
        };
        let mut a = clock();
        let mut b = SimulationClock::new(fixed).unwrap();
        for clock in [&mut a, &mut b] {
            clock.set_setpoint(52.0).unwrap();
            clock.run_steps(300).unwrap();
        }
        assert_relative_eq!(a.last().y, b.last().y, epsilon = 1e-6);
    }
}
