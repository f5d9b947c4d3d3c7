//! # RCI Control Unit Library
//!
//! Generic robot controller core. A controller maps measured joint state to
//! task-space axis state (forward transform), turns requested axis setpoints
//! into joint setpoints (inverse transform) and runs a five-state control
//! machine around both.
//!
//! ## Layers
//!
//! 1. **KinematicModel** : per-robot geometry (`kinematics`)
//! 2. **TransformEngine** : pseudo-inverse, Newton inverse, impedance mapping
//! 3. **ControlUnit** : step orchestrator implementing `RobotController`
//! 4. **PluginRegistry** : plugin name to controller factory
//! 5. **CycleRunner** : host loop against a simulated plant
//!
//! ## Zero-Allocation Step
//!
//! All controller state is sized by const generics and built in `init`.
//! `run_control_step` performs no heap allocation.

#![deny(clippy::disallowed_types)]

pub mod controller;
pub mod cycle;
pub mod extra_io;
pub mod kinematics;
pub mod params;
pub mod plant;
pub mod registry;
pub mod state;
pub mod stats;
pub mod transform;

pub use controller::{ControlUnit, RobotController, StepDiagnostics};
pub use kinematics::KinematicModel;
pub use registry::PluginRegistry;
