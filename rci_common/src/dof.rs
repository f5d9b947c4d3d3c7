//! Per degree-of-freedom control variables.
//!
//! `DoFVariables` is the binary contract shared by joint and axis buffers:
//! seven consecutive `f64` in the order position, velocity, force,
//! acceleration, inertia, stiffness, damping (56 bytes).

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

use crate::consts::DOF_FIELDS;

/// Complete mechanical state of one joint or axis at an instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct DoFVariables {
    /// Position [rad or m].
    pub position: f64,
    /// Velocity [rad/s or m/s].
    pub velocity: f64,
    /// Force or torque [N or Nm].
    pub force: f64,
    /// Acceleration [rad/s² or m/s²].
    pub acceleration: f64,
    /// Inertia [kg·m² or kg].
    pub inertia: f64,
    /// Stiffness [Nm/rad or N/m].
    pub stiffness: f64,
    /// Damping [Nm·s/rad or N·s/m].
    pub damping: f64,
}

const_assert_eq!(core::mem::size_of::<DoFVariables>(), DOF_FIELDS * 8);
const_assert_eq!(core::mem::align_of::<DoFVariables>(), 8);

impl DoFVariables {
    /// All-zero record.
    pub const ZERO: Self = Self {
        position: 0.0,
        velocity: 0.0,
        force: 0.0,
        acceleration: 0.0,
        inertia: 0.0,
        stiffness: 0.0,
        damping: 0.0,
    };

    /// Record holding a position with every other field at zero.
    #[inline]
    pub const fn at_position(position: f64) -> Self {
        Self {
            position,
            ..Self::ZERO
        }
    }

    /// Fields in wire order.
    #[inline]
    pub const fn to_array(&self) -> [f64; DOF_FIELDS] {
        [
            self.position,
            self.velocity,
            self.force,
            self.acceleration,
            self.inertia,
            self.stiffness,
            self.damping,
        ]
    }

    /// Build from fields in wire order.
    #[inline]
    pub const fn from_array(raw: [f64; DOF_FIELDS]) -> Self {
        Self {
            position: raw[0],
            velocity: raw[1],
            force: raw[2],
            acceleration: raw[3],
            inertia: raw[4],
            stiffness: raw[5],
            damping: raw[6],
        }
    }

    /// Returns true if all fields are finite (not NaN, not Inf).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Replace every non-finite field with zero. Returns true if anything changed.
    #[inline]
    pub fn sanitize(&mut self) -> bool {
        if self.is_finite() {
            return false;
        }
        let mut raw = self.to_array();
        for v in raw.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        *self = Self::from_array(raw);
        true
    }

    /// Impedance-free copy: keeps position, zeroes everything else.
    #[inline]
    pub const fn hold(&self) -> Self {
        Self::at_position(self.position)
    }
}

/// Returns true if every record in the buffer is finite.
#[inline]
pub fn all_finite(buffer: &[DoFVariables]) -> bool {
    buffer.iter().all(DoFVariables::is_finite)
}
