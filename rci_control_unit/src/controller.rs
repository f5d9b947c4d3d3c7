//! Controller trait and the generic control step orchestrator.
//!
//! [`ControlUnit`] turns any [`KinematicModel`] into a [`RobotController`].
//! All buffers are fixed-size arrays sized by the model's const dimensions,
//! so a control step performs no allocation and a bounded amount of work
//! (`max_iterations` Newton updates at most).
//!
//! ## Step sequence
//! 1. Validate: initialized, buffer lengths, `time_delta`, finite measures.
//!    A rejected step rewrites axis measures and joint setpoints with the
//!    previous outputs and leaves every other piece of state untouched.
//! 2. Apply the pending state request and its entry actions.
//! 3. Latch extra inputs.
//! 4. Joint measure processing: velocity estimate, offsets, calibration.
//! 5. Forward pass.
//! 6. Axis setpoint refinement by state, Preprocessing derivation.
//! 7. Inverse pass; in Operation the impedance law, range clamp and speed limit.
//! 8. Sanitize outputs, store them, derive extra outputs.

use std::time::Instant;

use nalgebra::SVector;
use static_assertions::const_assert;
use tracing::{debug, error, info};

use rci_common::config::{ConfigError, ControllerConfig};
use rci_common::consts::{MAX_AXES, MAX_JOINTS};
use rci_common::coordinates::{CoordinateKind, CoordinateSet};
use rci_common::dof::{DoFVariables, all_finite};
use rci_common::error::{ControllerError, StepAnomaly};
use rci_common::state::ControlState;

use crate::extra_io::{ExtraIo, OutputSnapshot};
use crate::kinematics::KinematicModel;
use crate::params::ControllerParameters;
use crate::state::{ControlStateMachine, Transition};
use crate::stats::StepStats;
use crate::transform::TransformEngine;

// Every plugin needs joints >= axes.
const_assert!(MAX_JOINTS >= MAX_AXES);

/// Plugin-facing controller interface.
///
/// One instance serves one host loop; a step takes `&mut self`, so steps
/// are never reentrant. The trait is object safe and hosts hold
/// `Box<dyn RobotController>`.
pub trait RobotController: Send {
    /// Plugin name.
    fn name(&self) -> &'static str;

    /// Parse `config` (TOML), build the model and allocate all state.
    ///
    /// On failure nothing is retained.
    fn init(&mut self, config: &str) -> Result<(), ControllerError>;

    /// Release names and state. Harmless when not initialized.
    fn end(&mut self);

    fn is_initialized(&self) -> bool;

    fn joints_number(&self) -> usize;
    /// Joint names; index `i` names buffer index `i`.
    fn joint_names(&self) -> &[String];

    fn axes_number(&self) -> usize;
    /// Axis names; index `i` names buffer index `i`.
    fn axis_names(&self) -> &[String];

    /// Request a state; applied at the next step boundary.
    fn set_control_state(&mut self, state: ControlState);
    /// Active state.
    fn control_state(&self) -> ControlState;

    /// Run one control step.
    ///
    /// Joint measures are read only; axis measures and joint setpoints are
    /// written; axis setpoints are read and, outside Operation, refined in
    /// place to a zero-effort hold.
    fn run_control_step(
        &mut self,
        joint_measures: &mut [DoFVariables],
        axis_measures: &mut [DoFVariables],
        joint_setpoints: &mut [DoFVariables],
        axis_setpoints: &mut [DoFVariables],
        time_delta: f64,
    );

    fn extra_inputs_number(&self) -> usize;
    /// Stage extra inputs for the next step.
    fn set_extra_inputs(&mut self, values: &[f64]);

    fn extra_outputs_number(&self) -> usize;
    /// Copy the last step's extra outputs; returns the count written.
    fn extra_outputs(&self, out: &mut [f64]) -> usize;

    /// Diagnostics of the last step.
    fn diagnostics(&self) -> &StepDiagnostics;
    fn stats(&self) -> &StepStats;
}

/// Out-of-band report of one control step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepDiagnostics {
    pub anomalies: StepAnomaly,
    /// Manipulability at the measured configuration.
    pub manipulability: f64,
    /// Newton updates used by the inverse pass.
    pub newton_iterations: u32,
    /// Max-norm of axis setpoint minus axis measure positions.
    pub tracking_error: f64,
    /// Transition applied at the start of the step.
    pub transition: Option<Transition>,
    pub time_delta: f64,
}

impl StepDiagnostics {
    #[inline]
    pub const fn is_degraded(&self) -> bool {
        self.anomalies.is_degraded()
    }
}

// ─── Session (everything init builds) ───────────────────────────────

struct Session<M, const J: usize, const A: usize>
where
    M: KinematicModel<J, A>,
{
    model: M,
    engine: TransformEngine<J, A>,
    estimate_velocity: bool,
    joints: CoordinateSet,
    axes: CoordinateSet,
    machine: ControlStateMachine,
    params: ControllerParameters<J, A>,
    extra: ExtraIo,
    prev_joint_setpoints: [DoFVariables; J],
    prev_axis_measures: [DoFVariables; A],
    prev_raw_positions: Option<[f64; J]>,
    has_previous: bool,
}

impl<M, const J: usize, const A: usize> Session<M, J, A>
where
    M: KinematicModel<J, A>,
{
    fn build(name: &'static str, text: &str) -> Result<Self, ControllerError> {
        let config = ControllerConfig::<M::Config>::from_toml(text)?;
        if let Some(ref plugin) = config.plugin {
            if plugin != name {
                return Err(ConfigError::ValidationError(format!(
                    "configuration is for plugin '{plugin}', not '{name}'"
                ))
                .into());
            }
        }

        let model = M::from_config(&config.model)?;
        let joints = CoordinateSet::new(
            CoordinateKind::Joint,
            config
                .joint_names()
                .unwrap_or_else(<M as KinematicModel<J, A>>::default_joint_names),
            J,
            MAX_JOINTS,
        )?;
        let axes = CoordinateSet::new(
            CoordinateKind::Axis,
            config
                .axis_names()
                .unwrap_or_else(<M as KinematicModel<J, A>>::default_axis_names),
            A,
            MAX_AXES,
        )?;
        let extra = ExtraIo::from_config(&config.extra_io)?;

        Ok(Self {
            model,
            engine: TransformEngine::new(config.controller),
            estimate_velocity: config.controller.estimate_velocity,
            joints,
            axes,
            machine: ControlStateMachine::new(),
            params: ControllerParameters::new(),
            extra,
            prev_joint_setpoints: [DoFVariables::ZERO; J],
            prev_axis_measures: [DoFVariables::ZERO; A],
            prev_raw_positions: None,
            has_previous: false,
        })
    }

    /// Rejected step: rewrite outputs with the previous cycle's values.
    fn hold_outputs(&self, axis_measures: &mut [DoFVariables], joint_setpoints: &mut [DoFVariables]) {
        for (dst, src) in axis_measures.iter_mut().zip(self.prev_axis_measures.iter()) {
            *dst = *src;
        }
        for (dst, src) in joint_setpoints.iter_mut().zip(self.prev_joint_setpoints.iter()) {
            *dst = *src;
        }
    }

    /// Fallback joint setpoints: previous valid ones at rest.
    fn held_joint_setpoints(&self, measured: &[DoFVariables; J]) -> [DoFVariables; J] {
        if self.has_previous {
            let mut held = self.prev_joint_setpoints;
            for joint in held.iter_mut() {
                joint.velocity = 0.0;
                joint.acceleration = 0.0;
            }
            held
        } else {
            measured.map(|m| m.hold())
        }
    }

    /// Operation: clamp to derived ranges and apply the speed limit.
    fn limit_setpoints(
        &self,
        joints: &mut [DoFVariables; J],
        measured: &[DoFVariables; J],
        time_delta: f64,
    ) -> StepAnomaly {
        let mut flags = StepAnomaly::empty();
        if let Some(ref ranges) = self.params.ranges {
            for (joint, range) in joints.iter_mut().zip(ranges.iter()) {
                let clamped = range.clamp(joint.position);
                if clamped != joint.position {
                    joint.position = clamped;
                    joint.velocity = 0.0;
                    flags |= StepAnomaly::JOINT_LIMITED;
                }
            }
        }

        let max_speed = self.engine.config().max_joint_speed;
        if max_speed > 0.0 {
            let max_step = max_speed * time_delta;
            for (i, joint) in joints.iter_mut().enumerate() {
                let reference = if self.has_previous {
                    self.prev_joint_setpoints[i].position
                } else {
                    measured[i].position
                };
                let delta = joint.position - reference;
                if delta.abs() > max_step {
                    joint.position = reference + max_step.copysign(delta);
                    flags |= StepAnomaly::RATE_LIMITED;
                }
                if joint.velocity.abs() > max_speed {
                    joint.velocity = max_speed.copysign(joint.velocity);
                    flags |= StepAnomaly::RATE_LIMITED;
                }
            }
        }
        flags
    }

    fn step(
        &mut self,
        name: &'static str,
        joint_measures: &mut [DoFVariables],
        axis_measures: &mut [DoFVariables],
        joint_setpoints: &mut [DoFVariables],
        axis_setpoints: &mut [DoFVariables],
        time_delta: f64,
    ) -> StepDiagnostics {
        // ═══ VALIDATE ═══
        let mut anomalies = StepAnomaly::empty();
        if joint_measures.len() != J
            || joint_setpoints.len() != J
            || axis_measures.len() != A
            || axis_setpoints.len() != A
        {
            anomalies |= StepAnomaly::BUFFER_LENGTH_MISMATCH;
        }
        if !(time_delta.is_finite() && time_delta > 0.0) {
            anomalies |= StepAnomaly::INVALID_TIME_DELTA;
        }
        if !all_finite(joint_measures) {
            anomalies |= StepAnomaly::NON_FINITE_MEASURE;
        }
        if !anomalies.is_empty() {
            self.hold_outputs(axis_measures, joint_setpoints);
            return StepDiagnostics {
                anomalies,
                time_delta,
                ..StepDiagnostics::default()
            };
        }

        // ═══ BOUNDARY ═══
        let transition = self.machine.apply_pending();
        if let Some(t) = transition {
            debug!("{name}: control state {} -> {}", t.from, t.to);
            if t.to == ControlState::Calibration {
                self.params.reset_limits();
            }
        }
        let state = self.machine.state();

        if self.extra.latch() {
            anomalies |= StepAnomaly::EXTRA_INPUTS_MISMATCH;
        }

        // ═══ JOINT MEASURES ═══
        let mut measured = [DoFVariables::ZERO; J];
        measured.copy_from_slice(joint_measures);
        if self.estimate_velocity {
            match self.prev_raw_positions {
                Some(prev) => {
                    for (m, p) in measured.iter_mut().zip(prev.iter()) {
                        m.velocity = (m.position - p) / time_delta;
                    }
                }
                None => {
                    for m in measured.iter_mut() {
                        m.velocity = 0.0;
                    }
                }
            }
        }
        self.prev_raw_positions = Some(measured.map(|m| m.position));

        if state == ControlState::Offset {
            self.params.capture_offsets(&measured);
        }
        self.params.remove_offsets(&mut measured);
        if state == ControlState::Calibration {
            self.params.observe_joints(&measured);
        }

        // ═══ FORWARD ═══
        let mut axes = [DoFVariables::ZERO; A];
        let forward = self.engine.forward(&self.model, &measured, &mut axes);
        if forward.singular {
            anomalies |= StepAnomaly::SINGULAR;
        }
        if state == ControlState::Calibration {
            self.params.observe_axes(&axes);
        }

        // ═══ AXIS SETPOINT REFINEMENT ═══
        if !state.is_closed_loop() {
            for (sp, m) in axis_setpoints.iter_mut().zip(axes.iter()) {
                *sp = m.hold();
            }
        }
        if state == ControlState::Preprocessing {
            if let Some(ranges) = self.params.derive_ranges() {
                self.model.preprocess(ranges);
            }
        }
        let tracking_error = axis_setpoints
            .iter()
            .zip(axes.iter())
            .map(|(sp, m)| (sp.position - m.position).abs())
            .fold(0.0, f64::max);

        // ═══ INVERSE ═══
        let mut targets = [DoFVariables::ZERO; A];
        targets.copy_from_slice(axis_setpoints);
        let mut newton_iterations = 0;
        let mut setpoints = if !all_finite(&targets) {
            anomalies |= StepAnomaly::NON_FINITE_SETPOINT;
            self.held_joint_setpoints(&measured)
        } else {
            let scale = self.extra.impedance_scale();
            if state.is_closed_loop() {
                apply_impedance_law(&mut targets, &axes, scale);
            }
            let seed = SVector::<f64, J>::from_fn(|i, _| measured[i].position);
            match self.engine.inverse(&self.model, &seed, &targets) {
                Ok(solution) => {
                    newton_iterations = solution.iterations;
                    if solution.singular {
                        anomalies |= StepAnomaly::SINGULAR;
                    }
                    let mut joints = solution.joints;
                    if state.is_closed_loop() {
                        for joint in joints.iter_mut() {
                            joint.stiffness *= scale;
                            joint.damping *= scale;
                        }
                        anomalies |= self.limit_setpoints(&mut joints, &measured, time_delta);
                    }
                    joints
                }
                Err(failure) => {
                    newton_iterations = failure.iterations();
                    anomalies |= StepAnomaly::UNREACHABLE;
                    self.held_joint_setpoints(&measured)
                }
            }
        };

        // ═══ EMIT ═══
        for dof in setpoints.iter_mut().chain(axes.iter_mut()) {
            if dof.sanitize() {
                anomalies |= StepAnomaly::OUTPUT_SANITIZED;
            }
        }
        joint_setpoints.copy_from_slice(&setpoints);
        axis_measures.copy_from_slice(&axes);
        self.prev_joint_setpoints = setpoints;
        self.prev_axis_measures = axes;
        self.has_previous = true;

        let diagnostics = StepDiagnostics {
            anomalies,
            manipulability: forward.manipulability,
            newton_iterations,
            tracking_error,
            transition,
            time_delta,
        };
        self.extra.derive_outputs(&OutputSnapshot {
            manipulability: diagnostics.manipulability,
            tracking_error,
            newton_iterations,
            degraded: anomalies.is_degraded(),
            control_state: state,
            time_delta,
        });
        diagnostics
    }
}

/// Axis force command `F = F_d + s·(K(x_d − x) + B(ẋ_d − ẋ))`, written into
/// the target force.
#[inline]
fn apply_impedance_law(targets: &mut [DoFVariables], measured: &[DoFVariables], scale: f64) {
    for (t, m) in targets.iter_mut().zip(measured.iter()) {
        let spring = t.stiffness * (t.position - m.position);
        let damper = t.damping * (t.velocity - m.velocity);
        t.force += scale * (spring + damper);
    }
}

// ─── ControlUnit ────────────────────────────────────────────────────

/// Generic controller over a kinematic model with `J` joints and `A` axes.
pub struct ControlUnit<M, const J: usize, const A: usize>
where
    M: KinematicModel<J, A>,
{
    name: &'static str,
    session: Option<Session<M, J, A>>,
    diagnostics: StepDiagnostics,
    stats: StepStats,
}

impl<M, const J: usize, const A: usize> ControlUnit<M, J, A>
where
    M: KinematicModel<J, A>,
{
    /// Create an uninitialized controller.
    pub fn new(name: &'static str) -> Self {
        const {
            assert!(A > 0, "at least one axis");
            assert!(J >= A, "the transform requires joints >= axes");
            assert!(J <= MAX_JOINTS && A <= MAX_AXES, "dimension exceeds capacity");
        }
        Self {
            name,
            session: None,
            diagnostics: StepDiagnostics::default(),
            stats: StepStats::new(),
        }
    }

    /// Offsets, limits and derived ranges (None before init).
    pub fn parameters(&self) -> Option<&ControllerParameters<J, A>> {
        self.session.as_ref().map(|s| &s.params)
    }

    /// Kinematic model (None before init).
    pub fn model(&self) -> Option<&M> {
        self.session.as_ref().map(|s| &s.model)
    }

    /// State request waiting for the next step boundary.
    pub fn pending_state(&self) -> Option<ControlState> {
        self.session.as_ref().and_then(|s| s.machine.pending())
    }

    /// Transitions applied since init.
    pub fn transition_count(&self) -> u64 {
        self.session
            .as_ref()
            .map_or(0, |s| s.machine.transition_count())
    }

    /// Latched extra input values of the last step.
    pub fn extra_inputs(&self) -> &[f64] {
        self.session
            .as_ref()
            .map(|s| s.extra.inputs())
            .unwrap_or(&[])
    }
}

impl<M, const J: usize, const A: usize> RobotController for ControlUnit<M, J, A>
where
    M: KinematicModel<J, A>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&mut self, config: &str) -> Result<(), ControllerError> {
        if self.session.is_some() {
            return Err(ControllerError::AlreadyInitialized(self.name));
        }
        match Session::<M, J, A>::build(self.name, config) {
            Ok(session) => {
                info!(
                    "{}: initialized ({} joints {:?}, {} axes {:?}, {} extra in, {} extra out)",
                    self.name,
                    J,
                    session.joints.names(),
                    A,
                    session.axes.names(),
                    session.extra.input_count(),
                    session.extra.output_count()
                );
                self.session = Some(session);
                self.diagnostics = StepDiagnostics::default();
                self.stats = StepStats::new();
                Ok(())
            }
            Err(e) => {
                error!("{}: init failed: {e}", self.name);
                Err(e)
            }
        }
    }

    fn end(&mut self) {
        if self.session.take().is_some() {
            info!(
                "{}: ended after {} steps ({} rejected, {} degraded)",
                self.name, self.stats.steps, self.stats.rejected, self.stats.degraded
            );
            self.diagnostics = StepDiagnostics::default();
        }
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    fn joints_number(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.joints.len())
    }

    fn joint_names(&self) -> &[String] {
        self.session
            .as_ref()
            .map(|s| s.joints.names())
            .unwrap_or(&[])
    }

    fn axes_number(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.axes.len())
    }

    fn axis_names(&self) -> &[String] {
        self.session
            .as_ref()
            .map(|s| s.axes.names())
            .unwrap_or(&[])
    }

    fn set_control_state(&mut self, state: ControlState) {
        match self.session.as_mut() {
            Some(session) => session.machine.request(state),
            None => debug!("{}: state request {state} ignored, not initialized", self.name),
        }
    }

    fn control_state(&self) -> ControlState {
        self.session
            .as_ref()
            .map_or(ControlState::Passive, |s| s.machine.state())
    }

    fn run_control_step(
        &mut self,
        joint_measures: &mut [DoFVariables],
        axis_measures: &mut [DoFVariables],
        joint_setpoints: &mut [DoFVariables],
        axis_setpoints: &mut [DoFVariables],
        time_delta: f64,
    ) {
        let started = Instant::now();
        let diagnostics = match self.session.as_mut() {
            Some(session) => session.step(
                self.name,
                joint_measures,
                axis_measures,
                joint_setpoints,
                axis_setpoints,
                time_delta,
            ),
            None => StepDiagnostics {
                anomalies: StepAnomaly::NOT_INITIALIZED,
                time_delta,
                ..StepDiagnostics::default()
            },
        };
        let exec_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.stats.record(diagnostics.anomalies, time_delta, exec_ns);
        self.diagnostics = diagnostics;
    }

    fn extra_inputs_number(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.extra.input_count())
    }

    fn set_extra_inputs(&mut self, values: &[f64]) {
        if let Some(session) = self.session.as_mut() {
            session.extra.stage(values);
        }
    }

    fn extra_outputs_number(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.extra.output_count())
    }

    fn extra_outputs(&self, out: &mut [f64]) -> usize {
        self.session.as_ref().map_or(0, |s| s.extra.read_outputs(out))
    }

    fn diagnostics(&self) -> &StepDiagnostics {
        &self.diagnostics
    }

    fn stats(&self) -> &StepStats {
        &self.stats
    }
}
