//! Robot Control Interface: common library
//!
//! Shared types for every controller plugin and every host:
//!
//! - [`dof`] - `DoFVariables`, the seven-`f64` per-DoF binary record
//! - [`coordinates`] - named, index-stable joint/axis sets
//! - [`state`] - the five-state `ControlState` enum
//! - [`config`] - TOML configuration sections and loader
//! - [`error`] - init errors and per-step anomaly flags
//! - [`consts`] - fixed capacities and defaults
//! - [`prelude`] - common re-exports
//!
//! # Usage
//!
//! ```rust
//! use rci_common::prelude::*;
//!
//! let mut joint = DoFVariables::at_position(0.5);
//! joint.stiffness = 120.0;
//! assert_eq!(joint.to_array()[5], 120.0);
//! assert_eq!(ControlState::from_u8(4), Some(ControlState::Operation));
//! ```

pub mod config;
pub mod consts;
pub mod coordinates;
pub mod dof;
pub mod error;
pub mod prelude;
pub mod state;
