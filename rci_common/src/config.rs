//! Configuration loading traits and types.
//!
//! A controller receives its configuration as an opaque TOML string. The
//! common sections (`[controller]`, `[[joints]]`, `[[axes]]`, `[extra_io]`)
//! are defined here; the plugin-specific `[model]` table is a type parameter.
//!
//! # TOML Example
//!
//! ```toml
//! plugin = "planar_2r"
//!
//! [controller]
//! max_iterations = 20
//! singularity_threshold = 1e-3
//!
//! [[joints]]
//! name = "shoulder"
//! [[joints]]
//! name = "elbow"
//!
//! [extra_io]
//! inputs = ["contact"]
//! outputs = ["manipulability"]
//! impedance_scale_input = "contact"
//!
//! [model]
//! link_lengths = [1.0, 1.0]
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    DAMPING_FACTOR_DEFAULT, MAX_EXTRA_IO, MAX_ITERATIONS_DEFAULT, MAX_ITERATIONS_MAX,
    MAX_ITERATIONS_MIN, MAX_NAME_LEN, POSITION_TOLERANCE_DEFAULT, SINGULARITY_THRESHOLD_DEFAULT,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

// ─── [controller] ───────────────────────────────────────────────────

/// Transform engine and step parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Inverse-transform Newton iteration bound.
    pub max_iterations: u32,
    /// Convergence tolerance on axis positions (max-norm).
    pub position_tolerance: f64,
    /// Manipulability below which damped resolution is used.
    pub singularity_threshold: f64,
    /// Damped least-squares factor at full singularity.
    pub damping_factor: f64,
    /// Joint setpoint speed limit [units/s] (0 = disabled).
    pub max_joint_speed: f64,
    /// Replace measured joint velocities by a finite difference of positions.
    pub estimate_velocity: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS_DEFAULT,
            position_tolerance: POSITION_TOLERANCE_DEFAULT,
            singularity_threshold: SINGULARITY_THRESHOLD_DEFAULT,
            damping_factor: DAMPING_FACTOR_DEFAULT,
            max_joint_speed: 0.0,
            estimate_velocity: false,
        }
    }
}

impl TransformConfig {
    pub const POSITION_TOLERANCE_MIN: f64 = 1e-15;
    pub const POSITION_TOLERANCE_MAX: f64 = 1e-2;
    pub const DAMPING_FACTOR_MAX: f64 = 10.0;

    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations < MAX_ITERATIONS_MIN || self.max_iterations > MAX_ITERATIONS_MAX {
            return Err(ConfigError::ValidationError(format!(
                "max_iterations {} out of range [{}, {}]",
                self.max_iterations, MAX_ITERATIONS_MIN, MAX_ITERATIONS_MAX
            )));
        }
        if !(Self::POSITION_TOLERANCE_MIN..=Self::POSITION_TOLERANCE_MAX)
            .contains(&self.position_tolerance)
        {
            return Err(ConfigError::ValidationError(format!(
                "position_tolerance {} out of range [{}, {}]",
                self.position_tolerance,
                Self::POSITION_TOLERANCE_MIN,
                Self::POSITION_TOLERANCE_MAX
            )));
        }
        if !self.singularity_threshold.is_finite() || self.singularity_threshold < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "singularity_threshold {} must be finite and >= 0",
                self.singularity_threshold
            )));
        }
        if !(0.0..=Self::DAMPING_FACTOR_MAX).contains(&self.damping_factor) {
            return Err(ConfigError::ValidationError(format!(
                "damping_factor {} out of range [0, {}]",
                self.damping_factor,
                Self::DAMPING_FACTOR_MAX
            )));
        }
        if self.singularity_threshold > 0.0 && self.damping_factor == 0.0 {
            return Err(ConfigError::ValidationError(
                "damping_factor must be > 0 when singularity_threshold is set".to_string(),
            ));
        }
        if !self.max_joint_speed.is_finite() || self.max_joint_speed < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "max_joint_speed {} must be finite and >= 0",
                self.max_joint_speed
            )));
        }
        Ok(())
    }
}

// ─── [[joints]] / [[axes]] ──────────────────────────────────────────

/// One named coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateEntry {
    pub name: String,
}

// ─── [extra_io] ─────────────────────────────────────────────────────

/// Value source for one extra output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraOutputSource {
    /// `sqrt(det(J·Jᵀ))` at the measured configuration.
    Manipulability,
    /// Max-norm of axis setpoint minus axis measure positions.
    TrackingError,
    /// Newton iterations used by the inverse pass.
    NewtonIterations,
    /// 1.0 when the step was degraded, else 0.0.
    Degraded,
    /// Active control state as its `u8` value.
    ControlState,
    /// `time_delta` of the step.
    TimeDelta,
}

/// Auxiliary channel layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraIoConfig {
    /// Extra input names, in vector order.
    pub inputs: Vec<String>,
    /// Extra output sources, in vector order.
    pub outputs: Vec<ExtraOutputSource>,
    /// Input (by name) scaling joint stiffness/damping in Operation.
    pub impedance_scale_input: Option<String>,
}

impl ExtraIoConfig {
    /// Validate counts, names and references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inputs.len() > MAX_EXTRA_IO {
            return Err(ConfigError::ValidationError(format!(
                "extra inputs {} exceed capacity {}",
                self.inputs.len(),
                MAX_EXTRA_IO
            )));
        }
        if self.outputs.len() > MAX_EXTRA_IO {
            return Err(ConfigError::ValidationError(format!(
                "extra outputs {} exceed capacity {}",
                self.outputs.len(),
                MAX_EXTRA_IO
            )));
        }
        let mut seen = HashSet::new();
        for name in &self.inputs {
            if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
                return Err(ConfigError::ValidationError(format!(
                    "invalid extra input name '{name}'"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate extra input '{name}'"
                )));
            }
        }
        if let Some(ref scale) = self.impedance_scale_input {
            if !self.inputs.iter().any(|n| n == scale) {
                return Err(ConfigError::ValidationError(format!(
                    "impedance_scale_input '{scale}' is not a declared extra input"
                )));
            }
        }
        Ok(())
    }

    /// Index of the impedance scale input, if configured.
    pub fn impedance_scale_index(&self) -> Option<usize> {
        let scale = self.impedance_scale_input.as_ref()?;
        self.inputs.iter().position(|n| n == scale)
    }
}

// ─── Top level ──────────────────────────────────────────────────────

/// Complete controller configuration with a plugin-specific `[model]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig<M> {
    /// Plugin name (used by hosts selecting from a registry).
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub controller: TransformConfig,
    #[serde(default)]
    pub joints: Vec<CoordinateEntry>,
    #[serde(default)]
    pub axes: Vec<CoordinateEntry>,
    #[serde(default)]
    pub extra_io: ExtraIoConfig,
    #[serde(default)]
    pub model: M,
}

impl<M: DeserializeOwned + Default> ControllerConfig<M> {
    /// Parse and validate the common sections.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.controller.validate()?;
        config.extra_io.validate()?;
        Ok(config)
    }

    /// Joint names, if any were configured.
    pub fn joint_names(&self) -> Option<Vec<String>> {
        names_of(&self.joints)
    }

    /// Axis names, if any were configured.
    pub fn axis_names(&self) -> Option<Vec<String>> {
        names_of(&self.axes)
    }
}

fn names_of(entries: &[CoordinateEntry]) -> Option<Vec<String>> {
    if entries.is_empty() {
        None
    } else {
        Some(entries.iter().map(|e| e.name.clone()).collect())
    }
}

/// Read only the `plugin` key of a configuration string.
pub fn plugin_name(text: &str) -> Result<Option<String>, ConfigError> {
    #[derive(Deserialize)]
    struct PluginOnly {
        plugin: Option<String>,
    }
    let only: PluginOnly =
        toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    Ok(only.plugin)
}

/// Read only the `log_level` key of a configuration string (default `info`).
pub fn log_level(text: &str) -> Result<LogLevel, ConfigError> {
    #[derive(Deserialize)]
    struct LevelOnly {
        #[serde(default)]
        log_level: LogLevel,
    }
    let only: LevelOnly =
        toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    Ok(only.log_level)
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_config_file(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: DeserializeOwned> ConfigLoader for T {}

/// Read a configuration file into a string, mapping I/O errors.
pub fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound
        } else {
            ConfigError::ParseError(e.to_string())
        }
    })
}
