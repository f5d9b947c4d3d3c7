//! Host cycle: plant → controller → plant, paced at a fixed period.
//!
//! ## RT Setup Sequence
//! 1. Pre-allocate all buffers (zero heap in loop).
//! 2. `mlockall(MCL_CURRENT | MCL_FUTURE)` - lock all pages.
//! 3. Prefault stack pages.
//! 4. `sched_setaffinity` - pin to isolated CPU core.
//! 5. `sched_setscheduler(SCHED_FIFO, prio)` - RT priority.
//!
//! ## Cycle Body
//! Measure plant → stage extra inputs → control step → apply joint
//! setpoints to the plant → read extra outputs.
//!
//! ## Phases
//! The runner walks a state sequence (default Offset → Calibration →
//! Preprocessing → Operation). The state request is issued at the start of
//! a phase and applied by the controller at the next step boundary.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use rci_common::config::ConfigError;
use rci_common::consts::DEFAULT_CYCLE_TIME_US;
use rci_common::dof::DoFVariables;
use rci_common::error::{ControllerError, StepAnomaly};
use rci_common::state::ControlState;

use crate::controller::{RobotController, StepDiagnostics};
use crate::plant::SimulatedPlant;
use crate::registry::RegistryError;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of overruns detected.
    pub overruns: u64,
    /// Maximum wake-up latency [ns].
    pub max_latency_ns: i64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during RT setup, runner construction or cycle execution.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("controller: {0}")]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Runner parameters inconsistent with the controller dimensions.
    #[error("runner: {0}")]
    Setup(String),

    /// Cycle overrun detected (RT mode only).
    #[error("cycle overrun: {actual_ns}ns > {budget_ns}ns budget")]
    CycleOverrun {
        /// Actual cycle duration [ns].
        actual_ns: i64,
        /// Configured cycle budget [ns].
        budget_ns: i64,
    },
}

// ─── Runner configuration ([runner] table) ──────────────────────────

/// One state of the phase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub state: ControlState,
    pub cycles: u64,
}

/// `[runner]` table of the runner configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Cycle period [µs].
    pub cycle_time_us: u64,
    /// Actuator lag time constant [s] (0 = ideal tracking).
    pub plant_time_constant: f64,
    /// Initial joint positions (empty = all zero).
    pub initial_joint_positions: Vec<f64>,
    /// Hand-guided sweep amplitude applied during Calibration [joint units].
    pub calibration_sweep: f64,
    /// Axis position target used in Operation (empty = hold).
    pub target: Vec<f64>,
    /// Constant extra input values staged every cycle (empty = none staged,
    /// otherwise one per declared input).
    pub extra_inputs: Vec<f64>,
    /// State sequence.
    pub phases: Vec<Phase>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            plant_time_constant: 0.01,
            initial_joint_positions: Vec::new(),
            calibration_sweep: 0.5,
            target: Vec::new(),
            extra_inputs: Vec::new(),
            phases: vec![
                Phase {
                    state: ControlState::Offset,
                    cycles: 10,
                },
                Phase {
                    state: ControlState::Calibration,
                    cycles: 1000,
                },
                Phase {
                    state: ControlState::Preprocessing,
                    cycles: 10,
                },
                Phase {
                    state: ControlState::Operation,
                    cycles: 2000,
                },
            ],
        }
    }
}

impl RunnerConfig {
    pub const CYCLE_TIME_US_MIN: u64 = 100;
    pub const CYCLE_TIME_US_MAX: u64 = 1_000_000;

    /// Parse the `[runner]` table of a configuration string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct RunnerFile {
            #[serde(default)]
            runner: RunnerConfig,
        }
        let file: RunnerFile =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        file.runner.validate()?;
        Ok(file.runner)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(Self::CYCLE_TIME_US_MIN..=Self::CYCLE_TIME_US_MAX).contains(&self.cycle_time_us) {
            return Err(ConfigError::ValidationError(format!(
                "cycle_time_us {} out of range [{}, {}]",
                self.cycle_time_us,
                Self::CYCLE_TIME_US_MIN,
                Self::CYCLE_TIME_US_MAX
            )));
        }
        if !self.plant_time_constant.is_finite() || self.plant_time_constant < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "plant_time_constant {} must be finite and >= 0",
                self.plant_time_constant
            )));
        }
        if !self.calibration_sweep.is_finite() {
            return Err(ConfigError::ValidationError(
                "calibration_sweep must be finite".to_string(),
            ));
        }
        if self.phases.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one phase is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Cycle period [s].
    #[inline]
    pub fn cycle_time_s(&self) -> f64 {
        self.cycle_time_us as f64 * 1e-6
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages (prevent page faults in RT loop).
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(()) // No-op in simulation mode
}

/// Prefault stack pages to prevent page faults during RT execution.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, aligned, exclusive reference.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a specific CPU core.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(()) // No-op in simulation mode
}

/// Set SCHED_FIFO with the given RT priority.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 targets the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(()) // No-op in simulation mode
}

/// Perform the full RT setup sequence.
///
/// In simulation mode (no `rt` feature), all RT calls are no-ops.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Summary returned by [`CycleRunner::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub cycles: u64,
    pub final_state: ControlState,
    /// Union of every anomaly seen during the run.
    pub anomalies: StepAnomaly,
    pub degraded_steps: u64,
    pub rejected_steps: u64,
    pub last: StepDiagnostics,
    pub interrupted: bool,
}

/// Owns one initialized controller, the simulated plant and all buffers.
pub struct CycleRunner {
    controller: Box<dyn RobotController>,
    config: RunnerConfig,
    plant: SimulatedPlant,
    joint_measures: Vec<DoFVariables>,
    axis_measures: Vec<DoFVariables>,
    joint_setpoints: Vec<DoFVariables>,
    axis_setpoints: Vec<DoFVariables>,
    extra_outputs: Vec<f64>,
    home: Vec<f64>,
    sweep: Vec<f64>,
    /// Cycle statistics.
    pub stats: CycleStats,
    cycle_time_ns: i64,
    paced: bool,
}

impl CycleRunner {
    /// Initialize `controller` with `controller_config` and size all buffers.
    pub fn new(
        mut controller: Box<dyn RobotController>,
        controller_config: &str,
        config: RunnerConfig,
    ) -> Result<Self, CycleError> {
        config.validate()?;
        controller.init(controller_config)?;

        let joints = controller.joints_number();
        let axes = controller.axes_number();
        let home = if config.initial_joint_positions.is_empty() {
            vec![0.0; joints]
        } else if config.initial_joint_positions.len() == joints {
            config.initial_joint_positions.clone()
        } else {
            controller.end();
            return Err(CycleError::Setup(format!(
                "initial_joint_positions has {} entries, controller has {joints} joints",
                config.initial_joint_positions.len()
            )));
        };
        if !config.target.is_empty() && config.target.len() != axes {
            controller.end();
            return Err(CycleError::Setup(format!(
                "target has {} entries, controller has {axes} axes",
                config.target.len()
            )));
        }
        let inputs = controller.extra_inputs_number();
        if !config.extra_inputs.is_empty() && config.extra_inputs.len() != inputs {
            controller.end();
            return Err(CycleError::Setup(format!(
                "extra_inputs has {} entries, controller declares {inputs} inputs",
                config.extra_inputs.len()
            )));
        }

        let plant = SimulatedPlant::new(&home, config.plant_time_constant);
        let cycle_time_ns = config.cycle_time_us as i64 * 1000;
        Ok(Self {
            joint_measures: vec![DoFVariables::ZERO; joints],
            axis_measures: vec![DoFVariables::ZERO; axes],
            joint_setpoints: home.iter().map(|p| DoFVariables::at_position(*p)).collect(),
            axis_setpoints: vec![DoFVariables::ZERO; axes],
            extra_outputs: vec![0.0; controller.extra_outputs_number()],
            sweep: home.clone(),
            home,
            plant,
            controller,
            config,
            stats: CycleStats::new(),
            cycle_time_ns,
            paced: true,
        })
    }

    /// Disable sleeping between cycles (tests, offline runs).
    pub fn with_pacing(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn controller(&self) -> &dyn RobotController {
        self.controller.as_ref()
    }

    pub fn plant(&self) -> &SimulatedPlant {
        &self.plant
    }

    pub fn axis_measures(&self) -> &[DoFVariables] {
        &self.axis_measures
    }

    pub fn joint_setpoints(&self) -> &[DoFVariables] {
        &self.joint_setpoints
    }

    /// Extra outputs read after the last cycle.
    pub fn extra_outputs(&self) -> &[f64] {
        &self.extra_outputs
    }

    /// Walk every phase until done or `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) -> Result<RunSummary, CycleError> {
        let mut summary = RunSummary {
            cycles: 0,
            final_state: self.controller.control_state(),
            anomalies: StepAnomaly::empty(),
            degraded_steps: 0,
            rejected_steps: 0,
            last: StepDiagnostics::default(),
            interrupted: false,
        };
        let mut pacer = Pacer::start(self.cycle_time_ns, self.paced)?;

        let phases = self.config.phases.clone();
        for phase in phases {
            info!(
                "{}: phase {} for {} cycles",
                self.controller.name(),
                phase.state,
                phase.cycles
            );
            self.controller.set_control_state(phase.state);
            if phase.state == ControlState::Operation && !self.config.target.is_empty() {
                for (sp, target) in self.axis_setpoints.iter_mut().zip(self.config.target.iter()) {
                    sp.position = *target;
                }
            }

            for k in 0..phase.cycles {
                if !running.load(Ordering::SeqCst) {
                    summary.interrupted = true;
                    return Ok(self.finish(summary));
                }
                let started = std::time::Instant::now();
                self.cycle_body(phase, k);
                let diag = *self.controller.diagnostics();
                summary.cycles += 1;
                summary.anomalies |= diag.anomalies;
                if diag.is_degraded() {
                    summary.degraded_steps += 1;
                }
                if diag.anomalies.is_rejected() {
                    summary.rejected_steps += 1;
                }
                summary.last = diag;

                let duration_ns = i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX);
                let latency_ns = pacer.wait()?;
                self.stats.record(duration_ns, latency_ns);
                if duration_ns > self.cycle_time_ns {
                    self.stats.overruns += 1;
                    if cfg!(feature = "rt") && self.paced {
                        return Err(CycleError::CycleOverrun {
                            actual_ns: duration_ns,
                            budget_ns: self.cycle_time_ns,
                        });
                    }
                }
            }
            debug!(
                "{}: phase {} done, last anomalies {:?}",
                self.controller.name(),
                phase.state,
                summary.last.anomalies
            );
        }
        Ok(self.finish(summary))
    }

    fn finish(&self, mut summary: RunSummary) -> RunSummary {
        summary.final_state = self.controller.control_state();
        let steps = self.controller.stats();
        info!(
            "{}: {} cycles, state {}, {} degraded, {} rejected, step max {}ns, dt avg {:.6}s, cycle avg {}ns",
            self.controller.name(),
            summary.cycles,
            summary.final_state,
            summary.degraded_steps,
            summary.rejected_steps,
            steps.max_exec_ns,
            steps.avg_time_delta(),
            self.stats.avg_cycle_ns()
        );
        if summary.degraded_steps > 0 {
            warn!(
                "{}: {} degraded steps (anomalies seen: {:?})",
                self.controller.name(),
                summary.degraded_steps,
                summary.anomalies
            );
        }
        summary
    }

    /// Measure → stage → step → actuate. No allocation.
    fn cycle_body(&mut self, phase: Phase, k: u64) {
        let dt = self.config.cycle_time_s();

        if phase.state == ControlState::Calibration && self.config.calibration_sweep != 0.0 {
            // One full sine period over the phase, ± amplitude around home.
            let wave = (std::f64::consts::TAU * k as f64 / phase.cycles as f64).sin();
            for (s, h) in self.sweep.iter_mut().zip(self.home.iter()) {
                *s = h + self.config.calibration_sweep * wave;
            }
            self.plant.guide(&self.sweep, dt);
        }
        self.plant.measure(&mut self.joint_measures);

        if !self.config.extra_inputs.is_empty() {
            self.controller.set_extra_inputs(&self.config.extra_inputs);
        }
        self.controller.run_control_step(
            &mut self.joint_measures,
            &mut self.axis_measures,
            &mut self.joint_setpoints,
            &mut self.axis_setpoints,
            dt,
        );
        self.plant.apply(&self.joint_setpoints, dt);
        self.controller.extra_outputs(&mut self.extra_outputs);
    }
}

impl Drop for CycleRunner {
    fn drop(&mut self) {
        self.controller.end();
    }
}

// ─── Pacing ─────────────────────────────────────────────────────────

/// Absolute-time pacing on `CLOCK_MONOTONIC` (RT build).
#[cfg(feature = "rt")]
struct Pacer {
    next_wake: nix::sys::time::TimeSpec,
    period_ns: i64,
    enabled: bool,
}

#[cfg(feature = "rt")]
impl Pacer {
    fn start(period_ns: i64, enabled: bool) -> Result<Self, CycleError> {
        use nix::time::{ClockId, clock_gettime};
        let next_wake = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
        Ok(Self {
            next_wake,
            period_ns,
            enabled,
        })
    }

    /// Sleep until the next boundary; returns the wake-up latency [ns].
    fn wait(&mut self) -> Result<i64, CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};
        if !self.enabled {
            return Ok(0);
        }
        let clock = ClockId::CLOCK_MONOTONIC;
        self.next_wake = timespec_add_ns(self.next_wake, self.period_ns);
        let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &self.next_wake);
        let woke = clock_gettime(clock)
            .map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
        Ok(timespec_diff_ns(&woke, &self.next_wake).abs())
    }
}

/// Relative sleep pacing (simulation build).
#[cfg(not(feature = "rt"))]
struct Pacer {
    cycle_start: std::time::Instant,
    period: std::time::Duration,
    enabled: bool,
}

#[cfg(not(feature = "rt"))]
impl Pacer {
    fn start(period_ns: i64, enabled: bool) -> Result<Self, CycleError> {
        Ok(Self {
            cycle_start: std::time::Instant::now(),
            period: std::time::Duration::from_nanos(period_ns.max(0) as u64),
            enabled,
        })
    }

    fn wait(&mut self) -> Result<i64, CycleError> {
        if self.enabled {
            if let Some(remaining) = self.period.checked_sub(self.cycle_start.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
        self.cycle_start = std::time::Instant::now();
        Ok(0)
    }
}

/// Add nanoseconds to a TimeSpec, handling overflow.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a - b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
