//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner` which manages the simulation
//! lifecycle in a background thread, including start, pause, resume, stop and
//! status tracking. After every step the thread publishes a [`Frame`] that a
//! renderer can pick up with [`SimulationRunner::latest_frame`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use sph_kernel::SimulationKernel;
use thiserror::Error;

use crate::config::TimeStepConfig;

/// Progress is logged every this many steps.
const PROGRESS_LOG_INTERVAL: u64 = 100;

/// Runner state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Simulation paused
    Paused,
    /// Simulation finished (reached stopping condition or stopped)
    Finished,
    /// Simulation encountered an error
    Error,
}

/// Errors returned by [`SimulationRunner::join`].
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The simulation thread panicked.
    #[error("simulation thread panicked")]
    ThreadPanicked,
}

/// Particle state at the end of one step
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Number of steps completed when the frame was captured
    pub step: u64,
    /// Simulated time (seconds)
    pub sim_time: f64,
    /// Particle positions
    pub positions: Vec<Vec3>,
    /// Particle velocities
    pub velocities: Vec<Vec3>,
    /// Particle densities
    pub densities: Vec<f32>,
    /// Particle pressures
    pub pressures: Vec<f32>,
}

impl Frame {
    /// Copy the current particle state out of a kernel.
    pub fn capture(kernel: &dyn SimulationKernel) -> Self {
        let particles = kernel.particles();
        Self {
            step: kernel.step_count(),
            sim_time: kernel.sim_time(),
            positions: particles.iter().map(|p| p.position).collect(),
            velocities: particles.iter().map(|p| p.velocity).collect(),
            densities: particles.iter().map(|p| p.density).collect(),
            pressures: particles.iter().map(|p| p.pressure).collect(),
        }
    }

    /// Number of particles in the frame.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True if the frame holds no particles.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Smallest and largest density, or `None` for an empty frame.
    pub fn density_range(&self) -> Option<(f32, f32)> {
        self.densities.iter().fold(None, |acc, &d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })
    }
}

/// Shared state between the runner thread and control interface
struct SharedState {
    /// Current runner state
    state: RunnerState,
    /// Current simulation time (seconds)
    sim_time: f64,
    /// Number of timesteps executed
    timestep_count: u64,
    /// Most recent error message (if state is Error)
    error_message: Option<String>,
    /// Most recently published frame
    latest_frame: Option<Arc<Frame>>,
}

/// Stopping conditions and dt policy for the loop
#[derive(Debug, Clone, Copy)]
struct LoopLimits {
    time_step: TimeStepConfig,
    max_timesteps: Option<u64>,
    max_time: Option<f64>,
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    /// Shared state (protected by mutex)
    shared: Arc<Mutex<SharedState>>,
    /// Handle to the background thread
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl SimulationRunner {
    /// Create a new simulation runner with the given kernel
    ///
    /// The kernel moves onto a background thread that waits for [`start`].
    ///
    /// # Arguments
    /// * `kernel` - The simulation kernel to run
    /// * `time_step` - How each step's dt is chosen
    /// * `max_timesteps` - Optional maximum number of timesteps
    /// * `max_time` - Optional maximum simulation time (seconds)
    ///
    /// [`start`]: SimulationRunner::start
    pub fn new(
        mut kernel: Box<dyn SimulationKernel + Send>,
        time_step: TimeStepConfig,
        max_timesteps: Option<u64>,
        max_time: Option<f64>,
    ) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            state: RunnerState::Created,
            sim_time: kernel.sim_time(),
            timestep_count: kernel.step_count(),
            error_message: None,
            latest_frame: Some(Arc::new(Frame::capture(kernel.as_ref()))),
        }));

        let shared_clone = Arc::clone(&shared);
        let limits = LoopLimits {
            time_step,
            max_timesteps,
            max_time,
        };

        // Spawn background thread
        let thread_handle = thread::spawn(move || {
            run_simulation_loop(kernel.as_mut(), shared_clone, limits);
        });

        Self {
            shared,
            thread_handle: Some(thread_handle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        lock_shared(&self.shared)
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        self.lock().state
    }

    /// Get current simulation time (seconds)
    pub fn sim_time(&self) -> f64 {
        self.lock().sim_time
    }

    /// Get current timestep count
    pub fn timestep_count(&self) -> u64 {
        self.lock().timestep_count
    }

    /// Get error message if state is Error
    pub fn error_message(&self) -> Option<String> {
        self.lock().error_message.clone()
    }

    /// Most recently published particle frame
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.lock().latest_frame.clone()
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut state = self.lock();
        if state.state == RunnerState::Created {
            state.state = RunnerState::Running;
        }
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut state = self.lock();
        if state.state == RunnerState::Running {
            state.state = RunnerState::Paused;
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut state = self.lock();
        if state.state == RunnerState::Paused {
            state.state = RunnerState::Running;
        }
    }

    /// Stop the simulation; the thread exits after its current step
    pub fn stop(&self) {
        let mut state = self.lock();
        if matches!(
            state.state,
            RunnerState::Created | RunnerState::Running | RunnerState::Paused
        ) {
            state.state = RunnerState::Finished;
        }
    }

    /// Wait for the simulation thread to complete
    pub fn join(mut self) -> Result<(), RunnerError> {
        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| RunnerError::ThreadPanicked)?;
        }
        Ok(())
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Signal the thread to exit; it is detached, not joined.
        self.stop();
    }
}

fn lock_shared(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Main simulation loop executed in background thread
fn run_simulation_loop(
    kernel: &mut dyn SimulationKernel,
    shared: Arc<Mutex<SharedState>>,
    limits: LoopLimits,
) {
    // Wait for start signal
    loop {
        match lock_shared(&shared).state {
            RunnerState::Created => thread::sleep(Duration::from_millis(10)),
            RunnerState::Running => break,
            _ => return, // Exit if finished or error
        }
    }

    let start_wall_time = Instant::now();
    let mut last_tick = Instant::now();

    loop {
        let current_state = lock_shared(&shared).state;

        match current_state {
            RunnerState::Running => {
                let dt = match limits.time_step {
                    TimeStepConfig::Fixed { dt } => dt,
                    TimeStepConfig::WallClock { max_dt } => {
                        last_tick.elapsed().as_secs_f32().clamp(f32::EPSILON, max_dt)
                    }
                };
                last_tick = Instant::now();

                kernel.step(dt);

                let timestep_count = kernel.step_count();
                let sim_time = kernel.sim_time();
                let frame = Arc::new(Frame::capture(kernel));
                let healthy = frame
                    .positions
                    .iter()
                    .chain(&frame.velocities)
                    .all(|v| v.is_finite());

                // Update shared state
                {
                    let mut guard = lock_shared(&shared);
                    guard.sim_time = sim_time;
                    guard.timestep_count = timestep_count;
                    guard.latest_frame = Some(frame);

                    if !healthy {
                        let message =
                            format!("non-finite particle state after step {timestep_count}");
                        tracing::error!("{}", message);
                        guard.state = RunnerState::Error;
                        guard.error_message = Some(message);
                        break;
                    }
                }

                // Check stopping conditions
                if let Some(max_steps) = limits.max_timesteps {
                    if timestep_count >= max_steps {
                        tracing::info!(
                            "Simulation finished: reached max_timesteps = {}",
                            max_steps
                        );
                        finish(&shared);
                        break;
                    }
                }

                if let Some(max_t) = limits.max_time {
                    if sim_time >= max_t {
                        tracing::info!("Simulation finished: reached max_time = {:.3}s", max_t);
                        finish(&shared);
                        break;
                    }
                }

                // Log progress periodically
                if timestep_count % PROGRESS_LOG_INTERVAL == 0 {
                    tracing::debug!(
                        "Step {}: sim_time={:.4}s, dt={:.6}s, wall_time={:.2}s",
                        timestep_count,
                        sim_time,
                        dt,
                        start_wall_time.elapsed().as_secs_f64(),
                    );
                }
            }
            RunnerState::Paused => {
                // Wait while paused; paused time does not count toward wall-clock dt
                thread::sleep(Duration::from_millis(20));
                last_tick = Instant::now();
            }
            RunnerState::Finished | RunnerState::Error | RunnerState::Created => break,
        }
    }

    tracing::info!(
        "Simulation thread exiting: {} timesteps, {:.4}s simulated, {:.2}s wall",
        kernel.step_count(),
        kernel.sim_time(),
        start_wall_time.elapsed().as_secs_f64()
    );
}

fn finish(shared: &Mutex<SharedState>) {
    let mut guard = lock_shared(shared);
    if guard.state != RunnerState::Error {
        guard.state = RunnerState::Finished;
    }
}
