//! Control state enum shared by hosts and controllers.
//!
//! `#[repr(u8)]` keeps the state transportable as a single byte. The set is
//! closed: there is no "unknown" variant, `from_u8` rejects anything else.

use serde::{Deserialize, Serialize};

/// Controller operating mode.
///
/// Exactly one state is active per controller instance. Any state may follow
/// any other; each has its own per-step processing contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlState {
    /// Fully compliant behaviour, measurement only.
    #[default]
    Passive = 0,
    /// Capture of the reference zero for measurements.
    Offset = 1,
    /// Capture of min/max limits for measurements.
    Calibration = 2,
    /// Automatic derivation of controller parameters.
    Preprocessing = 3,
    /// Normal closed-loop operation.
    Operation = 4,
}

impl ControlState {
    /// Total number of control states.
    pub const COUNT: usize = 5;

    /// All states in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Passive,
        Self::Offset,
        Self::Calibration,
        Self::Preprocessing,
        Self::Operation,
    ];

    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Passive),
            1 => Some(Self::Offset),
            2 => Some(Self::Calibration),
            3 => Some(Self::Preprocessing),
            4 => Some(Self::Operation),
            _ => None,
        }
    }

    /// Whether setpoints are driven by the client (closed loop).
    #[inline]
    pub const fn is_closed_loop(&self) -> bool {
        matches!(self, Self::Operation)
    }

    /// Lowercase name for logs and `Display`. Serde (and so every TOML file)
    /// uses the variant name instead, e.g. `"Calibration"`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::Offset => "offset",
            Self::Calibration => "calibration",
            Self::Preprocessing => "preprocessing",
            Self::Operation => "operation",
        }
    }
}

impl core::fmt::Display for ControlState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
