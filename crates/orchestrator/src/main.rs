//! Headless SPH runner.
//!
//! Usage: `sph-run <config.json>`
//!
//! Runs the configured scene to completion on the current machine and logs a
//! summary. Log level follows `RUST_LOG`.

use std::process::ExitCode;
use std::time::Instant;

use sph_orchestrator::{create_simulation, RunnerState, SimulationConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sph_run=info,sph_orchestrator=info,sph_kernel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("usage: sph-run <config.json>");
        return ExitCode::from(2);
    };

    match run(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    // A headless run must end on its own.
    let config = SimulationConfig::load(config_path)?;
    if config.max_timesteps.is_none() && config.max_time.is_none() {
        return Err("config must set max_timesteps or max_time for a headless run".into());
    }

    let runner = create_simulation(config_path)?;
    let wall = Instant::now();
    runner.start();

    // The loop thread exits on its own at the configured limit.
    let state = loop {
        std::thread::sleep(std::time::Duration::from_millis(50));
        let state = runner.state();
        if matches!(state, RunnerState::Finished | RunnerState::Error) {
            break state;
        }
    };

    let steps = runner.timestep_count();
    let sim_time = runner.sim_time();
    let frame = runner.latest_frame();
    let error = runner.error_message();
    runner.join()?;

    if state == RunnerState::Error {
        return Err(error.unwrap_or_else(|| "simulation failed".to_string()).into());
    }

    let elapsed = wall.elapsed().as_secs_f64();
    tracing::info!(
        "Run complete: {} steps, {:.4}s simulated in {:.2}s wall ({:.1} steps/s)",
        steps,
        sim_time,
        elapsed,
        steps as f64 / elapsed.max(1e-9)
    );
    if let Some((lo, hi)) = frame.as_deref().and_then(|f| f.density_range()) {
        tracing::info!("Final density range: [{:.4}, {:.4}]", lo, hi);
    }

    Ok(())
}
