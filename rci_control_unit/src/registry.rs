//! Plugin registry.
//!
//! Maps plugin names to controller factories. Hosts select a plugin at
//! configuration time and hold the result as `Box<dyn RobotController>`.
//! Constructed explicitly and passed by value; there is no global registry.

use std::collections::HashMap;

use thiserror::Error;

use crate::controller::{ControlUnit, RobotController};
use crate::kinematics::{DifferentialWrist, LinearCoupling, PlanarArm};

/// Factory producing an uninitialized controller.
pub type ControllerFactory = fn() -> Box<dyn RobotController>;

/// Registry lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("plugin '{0}' is not registered")]
    PluginNotFound(String),

    #[error("plugin '{0}' is already registered")]
    AlreadyRegistered(&'static str),
}

/// Two-link planar arm, axes `x, y`.
pub type Planar2R = ControlUnit<PlanarArm<2>, 2, 2>;
/// Redundant three-link planar arm, axes `x, y`.
pub type Planar3R = ControlUnit<PlanarArm<3>, 3, 2>;
/// Bevel differential wrist, axes `pitch, roll`.
pub type DifferentialWristUnit = ControlUnit<DifferentialWrist, 2, 2>;
/// Single geared linear axis.
pub type LinearAxis = ControlUnit<LinearCoupling<1, 1>, 1, 1>;

pub const PLANAR_2R: &str = "planar_2r";
pub const PLANAR_3R: &str = "planar_3r";
pub const DIFFERENTIAL_WRIST: &str = "differential_wrist";
pub const LINEAR_AXIS: &str = "linear_axis";

fn create_planar_2r() -> Box<dyn RobotController> {
    Box::new(Planar2R::new(PLANAR_2R))
}

fn create_planar_3r() -> Box<dyn RobotController> {
    Box::new(Planar3R::new(PLANAR_3R))
}

fn create_differential_wrist() -> Box<dyn RobotController> {
    Box::new(DifferentialWristUnit::new(DIFFERENTIAL_WRIST))
}

fn create_linear_axis() -> Box<dyn RobotController> {
    Box::new(LinearAxis::new(LINEAR_AXIS))
}

/// Registry of available controller plugins.
pub struct PluginRegistry {
    factories: HashMap<&'static str, ControllerFactory>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry populated with the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.factories.insert(PLANAR_2R, create_planar_2r);
        reg.factories.insert(PLANAR_3R, create_planar_3r);
        reg.factories
            .insert(DIFFERENTIAL_WRIST, create_differential_wrist);
        reg.factories.insert(LINEAR_AXIS, create_linear_axis);
        reg
    }

    /// Register a plugin factory.
    ///
    /// # Errors
    /// Returns `RegistryError::AlreadyRegistered` if the name is taken.
    pub fn register(
        &mut self,
        name: &'static str,
        factory: ControllerFactory,
    ) -> Result<(), RegistryError> {
        if self.factories.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Get a plugin factory by name.
    pub fn get_factory(&self, name: &str) -> Option<ControllerFactory> {
        self.factories.get(name).copied()
    }

    /// Create an uninitialized controller by name.
    ///
    /// # Errors
    /// Returns `RegistryError::PluginNotFound` if no plugin with the given name is registered.
    pub fn create(&self, name: &str) -> Result<Box<dyn RobotController>, RegistryError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| RegistryError::PluginNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// All registered plugin names, sorted.
    pub fn list_plugins(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
