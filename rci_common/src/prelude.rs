//! Prelude module for common re-exports.
//!
//! `use rci_common::prelude::*;` brings in the types every controller and
//! host touches.

// ─── Records & states ───────────────────────────────────────────────
pub use crate::dof::DoFVariables;
pub use crate::state::ControlState;

// ─── Coordinates ────────────────────────────────────────────────────
pub use crate::coordinates::{CoordinateKind, CoordinateSet};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, ControllerConfig, ExtraIoConfig, ExtraOutputSource, LogLevel,
    TransformConfig,
};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{ControllerError, StepAnomaly};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{MAX_AXES, MAX_EXTRA_IO, MAX_JOINTS};
