//! Buffers and helpers shared by the integration tests.

use rci_common::dof::DoFVariables;
use rci_common::state::ControlState;
use rci_control_unit::controller::{RobotController, StepDiagnostics};
use rci_control_unit::registry::PluginRegistry;

/// Nominal step period [s].
pub const DT: f64 = 0.001;

/// Create and initialize a built-in plugin.
pub fn create(plugin: &str, config: &str) -> Box<dyn RobotController> {
    let mut controller = PluginRegistry::with_builtins()
        .create(plugin)
        .expect("plugin registered");
    controller.init(config).expect("config accepted");
    controller
}

/// The four coordinate buffers a host owns.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffers {
    pub joint_measures: Vec<DoFVariables>,
    pub axis_measures: Vec<DoFVariables>,
    pub joint_setpoints: Vec<DoFVariables>,
    pub axis_setpoints: Vec<DoFVariables>,
}

impl Buffers {
    pub fn sized_for<C: RobotController + ?Sized>(controller: &C) -> Self {
        let joints = controller.joints_number();
        let axes = controller.axes_number();
        Self {
            joint_measures: vec![DoFVariables::ZERO; joints],
            axis_measures: vec![DoFVariables::ZERO; axes],
            joint_setpoints: vec![DoFVariables::ZERO; joints],
            axis_setpoints: vec![DoFVariables::ZERO; axes],
        }
    }

    pub fn set_joint_positions(&mut self, positions: &[f64]) {
        for (m, p) in self.joint_measures.iter_mut().zip(positions.iter()) {
            m.position = *p;
        }
    }

    pub fn set_axis_targets(&mut self, positions: &[f64]) {
        for (sp, p) in self.axis_setpoints.iter_mut().zip(positions.iter()) {
            sp.position = *p;
        }
    }

    pub fn step<C: RobotController + ?Sized>(
        &mut self,
        controller: &mut C,
        time_delta: f64,
    ) -> StepDiagnostics {
        controller.run_control_step(
            &mut self.joint_measures,
            &mut self.axis_measures,
            &mut self.joint_setpoints,
            &mut self.axis_setpoints,
            time_delta,
        );
        *controller.diagnostics()
    }

    /// Request `state` and run the boundary step that applies it.
    pub fn enter<C: RobotController + ?Sized>(
        &mut self,
        controller: &mut C,
        state: ControlState,
    ) -> StepDiagnostics {
        controller.set_control_state(state);
        let diag = self.step(controller, DT);
        assert_eq!(controller.control_state(), state);
        diag
    }

    pub fn axis_positions(&self) -> Vec<f64> {
        self.axis_measures.iter().map(|a| a.position).collect()
    }

    pub fn joint_setpoint_positions(&self) -> Vec<f64> {
        self.joint_setpoints.iter().map(|j| j.position).collect()
    }

    pub fn all_finite(&self) -> bool {
        self.joint_measures
            .iter()
            .chain(self.axis_measures.iter())
            .chain(self.joint_setpoints.iter())
            .chain(self.axis_setpoints.iter())
            .all(DoFVariables::is_finite)
    }
}

pub fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() <= tol,
            "index {i}: {a} differs from {e} by more than {tol}"
        );
    }
}
