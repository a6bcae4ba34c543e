use std::env;

use fopdt_sim::export::{save_csv, CsvStyle};
use fopdt_sim::{SimError, SimulationClock, SimulationConfig};

/// Setpoint step applied at the start of the demo run
const SETPOINT_STEP: f64 = 2.0;
/// Simulated duration of the demo run in seconds
const DURATION: f64 = 150.0;

/// Closed-loop setpoint step demo
///
/// Usage: `fopdt-sim [config.json] [trend.csv]`
fn main() -> Result<(), SimError> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    let export = args.next();

    println!("FOPDT loop under PID control");
    println!("============================\n");
    println!(
        "  Plant:      Kp = {}, tau_p = {} s, td = {} s",
        config.kp, config.tau_p, config.td
    );
    println!(
        "  Controller: Kc = {}, Ki = {}, Kd = {}, Ts = {} s",
        config.kc, config.ki, config.kd, config.ts
    );
    println!("  Mode:       {:?}\n", config.mode);

    let mut clock = SimulationClock::new(config)?;
    clock.start();
    let ysp = clock.setpoint() + SETPOINT_STEP;
    clock.set_setpoint(ysp)?;

    let end = clock.time() + DURATION;
    while clock.time() < end {
        clock.run_batch()?;
    }

    let trend = clock.trend();
    let peak = trend.y().iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let last = clock.last();

    println!("Results after {:.1} s ({} samples):", DURATION, trend.len());
    println!("  Setpoint:   {:.4}", ysp);
    println!("  Peak y:     {:.4}", peak);
    println!("  Final y:    {:.4}", last.y);
    println!("  Final CO:   {:.4} %", last.co);
    println!("  Error:      {:.6}", (ysp - last.y).abs());

    if let Some(path) = export {
        let written = save_csv(path, trend.view(), CsvStyle::Standard)?;
        println!("\nTrend written to {}", written.display());
    }

    Ok(())
}
