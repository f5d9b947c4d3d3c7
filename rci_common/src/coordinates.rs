//! Named coordinate sets (joints or axes).
//!
//! A `CoordinateSet` fixes the index ↔ name bijection once at init; it is
//! immutable afterwards, so `names()[i]` always describes buffer index `i`.

use std::collections::HashSet;

use thiserror::Error;

use crate::consts::MAX_NAME_LEN;

/// Which side of the transform a coordinate set describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateKind {
    /// Actuated degrees of freedom.
    Joint,
    /// Task-space degrees of freedom.
    Axis,
}

impl core::fmt::Display for CoordinateKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Joint => f.write_str("joint"),
            Self::Axis => f.write_str("axis"),
        }
    }
}

/// Coordinate set construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    /// Name list length differs from the model dimension.
    #[error("{kind} count {actual} does not match expected {expected}")]
    CountMismatch {
        kind: CoordinateKind,
        expected: usize,
        actual: usize,
    },
    /// Capacity exceeded.
    #[error("{kind} count {count} exceeds capacity {capacity}")]
    TooMany {
        kind: CoordinateKind,
        count: usize,
        capacity: usize,
    },
    /// Empty name.
    #[error("{kind} {index} has an empty name")]
    EmptyName { kind: CoordinateKind, index: usize },
    /// Name longer than `MAX_NAME_LEN`.
    #[error("{kind} name '{name}' longer than {max} bytes", max = MAX_NAME_LEN)]
    NameTooLong { kind: CoordinateKind, name: String },
    /// Duplicate name.
    #[error("duplicate {kind} name '{name}'")]
    Duplicate { kind: CoordinateKind, name: String },
}

/// Ordered, immutable list of coordinate names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinateSet {
    kind: CoordinateKind,
    names: Vec<String>,
}

impl CoordinateSet {
    /// Build a set, checking count, capacity, emptiness, length and uniqueness.
    pub fn new(
        kind: CoordinateKind,
        names: Vec<String>,
        expected: usize,
        capacity: usize,
    ) -> Result<Self, CoordinateError> {
        if names.len() > capacity {
            return Err(CoordinateError::TooMany {
                kind,
                count: names.len(),
                capacity,
            });
        }
        if names.len() != expected {
            return Err(CoordinateError::CountMismatch {
                kind,
                expected,
                actual: names.len(),
            });
        }
        let mut seen = HashSet::new();
        for (index, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(CoordinateError::EmptyName { kind, index });
            }
            if name.len() > MAX_NAME_LEN {
                return Err(CoordinateError::NameTooLong {
                    kind,
                    name: name.clone(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(CoordinateError::Duplicate {
                    kind,
                    name: name.clone(),
                });
            }
        }
        Ok(Self { kind, names })
    }

    /// Empty set (uninitialized controller).
    pub const fn empty(kind: CoordinateKind) -> Self {
        Self {
            kind,
            names: Vec::new(),
        }
    }

    #[inline]
    pub const fn kind(&self) -> CoordinateKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in buffer index order.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name at buffer index `index`.
    #[inline]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}
