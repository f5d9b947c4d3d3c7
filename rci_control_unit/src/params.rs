//! Controller-owned parameters: offsets, calibration limits, joint ranges.
//!
//! Mutated only from the Offset, Calibration and Preprocessing states.

use rci_common::dof::DoFVariables;

use crate::kinematics::JointRange;

/// Running `[min, max]` of observed positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub min: f64,
    pub max: f64,
}

impl Span {
    /// Nothing observed yet.
    pub const EMPTY: Self = Self {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    #[inline]
    pub fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

/// Parameters a controller instance owns across steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerParameters<const J: usize, const A: usize> {
    /// Raw joint positions captured as zero in Offset.
    pub offsets: [f64; J],
    /// Calibrated joint limits (offset-relative).
    pub joint_limits: [Span; J],
    /// Calibrated axis limits.
    pub axis_limits: [Span; A],
    /// Joint ranges derived in Preprocessing.
    pub ranges: Option<[JointRange; J]>,
}

impl<const J: usize, const A: usize> ControllerParameters<J, A> {
    pub const fn new() -> Self {
        Self {
            offsets: [0.0; J],
            joint_limits: [Span::EMPTY; J],
            axis_limits: [Span::EMPTY; A],
            ranges: None,
        }
    }

    /// Offset state: capture raw positions as the reference zero.
    pub fn capture_offsets(&mut self, raw: &[DoFVariables; J]) {
        for (offset, joint) in self.offsets.iter_mut().zip(raw.iter()) {
            *offset = joint.position;
        }
    }

    /// Remove offsets from joint positions in place.
    #[inline]
    pub fn remove_offsets(&self, joints: &mut [DoFVariables; J]) {
        for (joint, offset) in joints.iter_mut().zip(self.offsets.iter()) {
            joint.position -= offset;
        }
    }

    /// Calibration entry: forget previous limits.
    pub fn reset_limits(&mut self) {
        self.joint_limits = [Span::EMPTY; J];
        self.axis_limits = [Span::EMPTY; A];
    }

    pub fn observe_joints(&mut self, joints: &[DoFVariables; J]) {
        for (span, joint) in self.joint_limits.iter_mut().zip(joints.iter()) {
            span.include(joint.position);
        }
    }

    pub fn observe_axes(&mut self, axes: &[DoFVariables; A]) {
        for (span, axis) in self.axis_limits.iter_mut().zip(axes.iter()) {
            span.include(axis.position);
        }
    }

    /// Preprocessing: derive ranges from the limits.
    ///
    /// Pure function of the stored limits; ranges stay `None` until every
    /// joint has been observed.
    pub fn derive_ranges(&mut self) -> Option<&[JointRange; J]> {
        if self.joint_limits.iter().any(Span::is_empty) {
            self.ranges = None;
            return None;
        }
        let mut ranges = [JointRange::from_bounds(0.0, 0.0); J];
        for (range, span) in ranges.iter_mut().zip(self.joint_limits.iter()) {
            *range = JointRange::from_bounds(span.min, span.max);
        }
        self.ranges = Some(ranges);
        self.ranges.as_ref()
    }
}

impl<const J: usize, const A: usize> Default for ControllerParameters<J, A> {
    fn default() -> Self {
        Self::new()
    }
}
