//! Auxiliary scalar channel (extra inputs / extra outputs).
//!
//! Lengths are fixed at init. Inputs are staged by the host between steps
//! and latched once at the start of a step; outputs are derived once at
//! the end of a step.

use heapless::Vec;
use tracing::warn;

use rci_common::config::{ExtraIoConfig, ExtraOutputSource};
use rci_common::consts::MAX_EXTRA_IO;
use rci_common::error::ControllerError;
use rci_common::state::ControlState;

/// Values an extra output can be derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputSnapshot {
    pub manipulability: f64,
    pub tracking_error: f64,
    pub newton_iterations: u32,
    pub degraded: bool,
    pub control_state: ControlState,
    pub time_delta: f64,
}

impl OutputSnapshot {
    #[inline]
    fn value(&self, source: ExtraOutputSource) -> f64 {
        match source {
            ExtraOutputSource::Manipulability => self.manipulability,
            ExtraOutputSource::TrackingError => self.tracking_error,
            ExtraOutputSource::NewtonIterations => f64::from(self.newton_iterations),
            ExtraOutputSource::Degraded => {
                if self.degraded {
                    1.0
                } else {
                    0.0
                }
            }
            ExtraOutputSource::ControlState => f64::from(self.control_state as u8),
            ExtraOutputSource::TimeDelta => self.time_delta,
        }
    }
}

/// Fixed-capacity extra I/O buffers.
#[derive(Debug, Clone)]
pub struct ExtraIo {
    staged: Vec<f64, MAX_EXTRA_IO>,
    latched: Vec<f64, MAX_EXTRA_IO>,
    outputs: Vec<f64, MAX_EXTRA_IO>,
    sources: Vec<ExtraOutputSource, MAX_EXTRA_IO>,
    scale_index: Option<usize>,
    mismatch_pending: bool,
}

fn filled<T: Copy, const N: usize>(len: usize, value: T) -> Result<Vec<T, N>, ControllerError> {
    let mut v = Vec::new();
    v.resize(len, value).map_err(|_| {
        ControllerError::Model(format!("extra I/O length {len} exceeds capacity {N}"))
    })?;
    Ok(v)
}

impl ExtraIo {
    /// No extra channels (uninitialized controller).
    pub const fn empty() -> Self {
        Self {
            staged: Vec::new(),
            latched: Vec::new(),
            outputs: Vec::new(),
            sources: Vec::new(),
            scale_index: None,
            mismatch_pending: false,
        }
    }

    /// Allocate buffers for a validated configuration.
    pub fn from_config(config: &ExtraIoConfig) -> Result<Self, ControllerError> {
        let mut sources = Vec::new();
        for source in &config.outputs {
            sources.push(*source).map_err(|_| {
                ControllerError::Model(format!("extra outputs exceed capacity {MAX_EXTRA_IO}"))
            })?;
        }
        Ok(Self {
            staged: filled(config.inputs.len(), 0.0)?,
            latched: filled(config.inputs.len(), 0.0)?,
            outputs: filled(config.outputs.len(), 0.0)?,
            sources,
            scale_index: config.impedance_scale_index(),
            mismatch_pending: false,
        })
    }

    #[inline]
    pub fn input_count(&self) -> usize {
        self.staged.len()
    }

    #[inline]
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Stage inputs for the next step.
    ///
    /// Copies `min(values.len(), declared)` values; non-finite values become
    /// 0.0. Returns false (and flags the next step) on a length mismatch.
    pub fn stage(&mut self, values: &[f64]) -> bool {
        for (slot, v) in self.staged.iter_mut().zip(values.iter()) {
            *slot = if v.is_finite() { *v } else { 0.0 };
        }
        if values.len() != self.staged.len() {
            warn!(
                "extra inputs: supplied {} values, declared {}",
                values.len(),
                self.staged.len()
            );
            self.mismatch_pending = true;
            return false;
        }
        true
    }

    /// Latch staged inputs. Returns true if a mismatch was pending.
    #[inline]
    pub fn latch(&mut self) -> bool {
        self.latched.copy_from_slice(&self.staged);
        core::mem::take(&mut self.mismatch_pending)
    }

    /// Latched input values.
    #[inline]
    pub fn inputs(&self) -> &[f64] {
        &self.latched
    }

    /// Impedance scale in `[0, 1]` (1.0 when not configured).
    #[inline]
    pub fn impedance_scale(&self) -> f64 {
        self.scale_index
            .and_then(|i| self.latched.get(i))
            .map_or(1.0, |v| v.clamp(0.0, 1.0))
    }

    /// Derive every output from the step snapshot.
    pub fn derive_outputs(&mut self, snapshot: &OutputSnapshot) {
        for (out, source) in self.outputs.iter_mut().zip(self.sources.iter()) {
            let v = snapshot.value(*source);
            *out = if v.is_finite() { v } else { 0.0 };
        }
    }

    /// Copy outputs into `out`; returns the number of values written.
    pub fn read_outputs(&self, out: &mut [f64]) -> usize {
        let n = out.len().min(self.outputs.len());
        out[..n].copy_from_slice(&self.outputs[..n]);
        n
    }
}

impl Default for ExtraIo {
    fn default() -> Self {
        Self::empty()
    }
}
