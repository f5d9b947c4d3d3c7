//! First-order actuator simulation used by the runner.
//!
//! Each joint follows its position setpoint through a first-order lag with
//! time constant `tau`. Buffers are allocated once at construction.

use rci_common::dof::DoFVariables;

/// Simulated joint actuators.
#[derive(Debug, Clone)]
pub struct SimulatedPlant {
    positions: Vec<f64>,
    velocities: Vec<f64>,
    accelerations: Vec<f64>,
    torques: Vec<f64>,
    time_constant: f64,
}

impl SimulatedPlant {
    /// Plant at rest at `initial` positions.
    pub fn new(initial: &[f64], time_constant: f64) -> Self {
        let n = initial.len();
        Self {
            positions: initial.to_vec(),
            velocities: vec![0.0; n],
            accelerations: vec![0.0; n],
            torques: vec![0.0; n],
            time_constant: time_constant.max(0.0),
        }
    }

    #[inline]
    pub fn joints(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// Write current joint state into a measure buffer.
    pub fn measure(&self, out: &mut [DoFVariables]) {
        for (i, m) in out.iter_mut().enumerate().take(self.joints()) {
            *m = DoFVariables {
                position: self.positions[i],
                velocity: self.velocities[i],
                force: self.torques[i],
                acceleration: self.accelerations[i],
                ..DoFVariables::ZERO
            };
        }
    }

    /// Move joints by hand (external guidance), bypassing the actuators.
    pub fn guide(&mut self, positions: &[f64], dt: f64) {
        for (i, target) in positions.iter().enumerate().take(self.joints()) {
            let velocity = if dt > 0.0 {
                (target - self.positions[i]) / dt
            } else {
                0.0
            };
            self.positions[i] = *target;
            self.velocities[i] = velocity;
            self.accelerations[i] = 0.0;
        }
    }

    /// Advance the actuators by `dt` toward `setpoints`.
    pub fn apply(&mut self, setpoints: &[DoFVariables], dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let alpha = dt / (self.time_constant + dt);
        for (i, sp) in setpoints.iter().enumerate().take(self.joints()) {
            let next = self.positions[i] + alpha * (sp.position - self.positions[i]);
            let velocity = (next - self.positions[i]) / dt;
            self.accelerations[i] = (velocity - self.velocities[i]) / dt;
            self.velocities[i] = velocity;
            self.positions[i] = next;
            self.torques[i] = sp.force;
        }
    }
}
