//! System-wide constants for the robot control interface workspace.
//!
//! Single source of truth for all fixed capacities and defaults.
//! Everything sized by these constants is allocated once at init.

/// Maximum number of joint coordinates per controller.
pub const MAX_JOINTS: usize = 16;

/// Maximum number of axis coordinates per controller.
pub const MAX_AXES: usize = 16;

/// Maximum number of extra inputs and of extra outputs.
pub const MAX_EXTRA_IO: usize = 16;

/// Number of `f64` fields in one DoF record (binary contract).
pub const DOF_FIELDS: usize = 7;

/// Maximum coordinate / extra I/O name length in bytes.
pub const MAX_NAME_LEN: usize = 32;

/// Default host cycle time in microseconds (1 kHz).
pub const DEFAULT_CYCLE_TIME_US: u64 = 1000;

/// Default inverse-transform iteration bound.
pub const MAX_ITERATIONS_DEFAULT: u32 = 20;

/// Lower bound for `max_iterations`.
pub const MAX_ITERATIONS_MIN: u32 = 1;

/// Upper bound for `max_iterations` (keeps the step time bounded).
pub const MAX_ITERATIONS_MAX: u32 = 200;

/// Default inverse-transform convergence tolerance (axis position units).
pub const POSITION_TOLERANCE_DEFAULT: f64 = 1e-9;

/// Default manipulability below which damping kicks in.
pub const SINGULARITY_THRESHOLD_DEFAULT: f64 = 1e-3;

/// Default damped least-squares factor.
pub const DAMPING_FACTOR_DEFAULT: f64 = 0.05;
