//! Error types shared by controllers and hosts.
//!
//! Init-time failures are `thiserror` enums. Per-step anomalies are bitflags:
//! a control step never fails, it reports what it had to work around.

use bitflags::bitflags;
use thiserror::Error;

use crate::config::ConfigError;
use crate::coordinates::CoordinateError;

bitflags! {
    /// Anomalies observed during one control step.
    ///
    /// DEGRADED flags mean the emitted setpoints are a fallback, not the
    /// requested ones (see [`StepAnomaly::DEGRADED_MASK`]).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StepAnomaly: u16 {
        /// Step called before init or after end.
        const NOT_INITIALIZED         = 0x0001;
        /// `time_delta` was zero, negative or not finite. **DEGRADED**.
        const INVALID_TIME_DELTA      = 0x0002;
        /// A coordinate buffer length differs from the declared count. **DEGRADED**.
        const BUFFER_LENGTH_MISMATCH  = 0x0004;
        /// Joint measures contained NaN/Inf. **DEGRADED**.
        const NON_FINITE_MEASURE      = 0x0008;
        /// Axis setpoints contained NaN/Inf. **DEGRADED**.
        const NON_FINITE_SETPOINT     = 0x0010;
        /// Jacobian near singular, damped resolution applied. **DEGRADED**.
        const SINGULAR                = 0x0020;
        /// Inverse transform did not converge, previous setpoint held. **DEGRADED**.
        const UNREACHABLE             = 0x0040;
        /// Extra inputs supplied with a length other than declared.
        const EXTRA_INPUTS_MISMATCH   = 0x0080;
        /// A joint setpoint was clamped to its calibrated range.
        const JOINT_LIMITED           = 0x0100;
        /// A joint setpoint was slowed down to the configured speed limit.
        const RATE_LIMITED            = 0x0200;
        /// A computed output was not finite and was zeroed. **DEGRADED**.
        const OUTPUT_SANITIZED        = 0x0400;
    }
}

impl StepAnomaly {
    /// Flags that mark a cycle as degraded.
    pub const DEGRADED_MASK: Self = Self::from_bits_truncate(
        Self::INVALID_TIME_DELTA.bits()
            | Self::BUFFER_LENGTH_MISMATCH.bits()
            | Self::NON_FINITE_MEASURE.bits()
            | Self::NON_FINITE_SETPOINT.bits()
            | Self::SINGULAR.bits()
            | Self::UNREACHABLE.bits()
            | Self::OUTPUT_SANITIZED.bits(),
    );

    /// Flags that turn the step into a no-op (previous outputs held).
    pub const REJECTED_MASK: Self = Self::from_bits_truncate(
        Self::NOT_INITIALIZED.bits()
            | Self::INVALID_TIME_DELTA.bits()
            | Self::BUFFER_LENGTH_MISMATCH.bits()
            | Self::NON_FINITE_MEASURE.bits(),
    );

    /// Returns true if any DEGRADED flag is set.
    #[inline]
    pub const fn is_degraded(&self) -> bool {
        self.intersects(Self::DEGRADED_MASK)
    }

    /// Returns true if the step was rejected as a whole.
    #[inline]
    pub const fn is_rejected(&self) -> bool {
        self.intersects(Self::REJECTED_MASK)
    }
}

impl Default for StepAnomaly {
    fn default() -> Self {
        Self::empty()
    }
}

/// Controller lifecycle errors.
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    /// Configuration could not be parsed or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Coordinate names are inconsistent with the model.
    #[error("coordinate set: {0}")]
    Coordinates(#[from] CoordinateError),

    /// The kinematic model rejected its parameters.
    #[error("model: {0}")]
    Model(String),

    /// `init` called on an initialized controller.
    #[error("controller '{0}' is already initialized")]
    AlreadyInitialized(&'static str),
}
