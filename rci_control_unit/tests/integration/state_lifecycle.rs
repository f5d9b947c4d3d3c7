//! Control state lifecycle: boundaries, offsets, calibration, preprocessing
//! and the parameter isolation of Passive and Operation.

use rci_common::error::StepAnomaly;
use rci_common::state::ControlState;
use rci_control_unit::controller::RobotController;
use rci_control_unit::kinematics::JointRange;
use rci_control_unit::params::ControllerParameters;
use rci_control_unit::registry::{DIFFERENTIAL_WRIST, DifferentialWristUnit, PLANAR_2R, Planar2R};
use rci_control_unit::state::Transition;

use super::harness::{Buffers, DT, assert_close};

fn planar() -> Planar2R {
    let mut c = Planar2R::new(PLANAR_2R);
    c.init("").unwrap();
    c
}

fn wrist() -> DifferentialWristUnit {
    let mut c = DifferentialWristUnit::new(DIFFERENTIAL_WRIST);
    c.init("").unwrap();
    c
}

/// Sweep joints linearly from `from` to `to` over `steps` steps.
fn sweep<C: RobotController>(c: &mut C, bufs: &mut Buffers, from: [f64; 2], to: [f64; 2], steps: usize) {
    for k in 0..=steps {
        let s = k as f64 / steps as f64;
        bufs.set_joint_positions(&[
            from[0] + s * (to[0] - from[0]),
            from[1] + s * (to[1] - from[1]),
        ]);
        bufs.step(c, DT);
    }
}

#[test]
fn request_applies_at_next_boundary() {
    let mut c = planar();
    let mut bufs = Buffers::sized_for(&c);
    bufs.set_joint_positions(&[0.3, 1.2]);

    c.set_control_state(ControlState::Offset);
    assert_eq!(c.control_state(), ControlState::Passive);
    assert_eq!(c.pending_state(), Some(ControlState::Offset));

    let diag = bufs.step(&mut c, DT);
    assert_eq!(c.control_state(), ControlState::Offset);
    assert_eq!(
        diag.transition,
        Some(Transition {
            from: ControlState::Passive,
            to: ControlState::Offset
        })
    );

    // Re-requesting the active state is not a transition.
    c.set_control_state(ControlState::Offset);
    let diag = bufs.step(&mut c, DT);
    assert_eq!(diag.transition, None);
    assert_eq!(c.transition_count(), 1);
}

#[test]
fn every_state_is_reachable_from_every_state() {
    let mut c = planar();
    let mut bufs = Buffers::sized_for(&c);
    bufs.set_joint_positions(&[0.3, 1.2]);
    bufs.step(&mut c, DT);

    let mut expected = 0;
    for from in ControlState::ALL {
        for to in ControlState::ALL {
            if from == to {
                continue;
            }
            if c.control_state() != from {
                bufs.enter(&mut c, from);
                expected += 1;
            }
            bufs.set_joint_positions(&[0.3, 1.2]);
            let diag = bufs.enter(&mut c, to);
            expected += 1;
            assert_eq!(diag.transition, Some(Transition { from, to }));
        }
    }
    assert_eq!(c.transition_count(), expected);
}

#[test]
fn passive_and_operation_leave_parameters_untouched() {
    let mut c = planar();
    let mut bufs = Buffers::sized_for(&c);
    for k in 0..50 {
        let s = k as f64 * 0.01;
        bufs.set_joint_positions(&[0.1 + s, 1.0 - s]);
        bufs.step(&mut c, DT);
    }
    assert_eq!(c.parameters().copied(), Some(ControllerParameters::new()));

    bufs.enter(&mut c, ControlState::Offset);
    sweep(&mut c, &mut bufs, [0.0, 0.5], [0.2, 1.0], 10);
    let captured = c.parameters().copied();

    bufs.enter(&mut c, ControlState::Operation);
    for k in 0..50 {
        let s = k as f64 * 0.002;
        bufs.set_joint_positions(&[0.2 + s, 1.0 + s]);
        bufs.set_axis_targets(&[1.0, 1.0]);
        bufs.step(&mut c, DT);
    }
    assert_eq!(c.parameters().copied(), captured);
}

#[test]
fn offset_capture_is_idempotent() {
    let mut c = wrist();
    let mut bufs = Buffers::sized_for(&c);
    bufs.set_joint_positions(&[0.1, -0.2]);
    bufs.enter(&mut c, ControlState::Offset);
    let first = bufs.clone();

    for _ in 0..5 {
        let diag = bufs.step(&mut c, DT);
        assert!(diag.anomalies.is_empty(), "{:?}", diag.anomalies);
        assert_eq!(bufs, first);
    }
    let params = c.parameters().unwrap();
    assert_eq!(params.offsets, [0.1, -0.2]);
    assert_close(&bufs.axis_positions(), &[0.0, 0.0], 1e-15);
    // The measure buffer is input only.
    assert_eq!(bufs.joint_measures[0].position, 0.1);

    // Offsets persist after leaving Offset.
    bufs.enter(&mut c, ControlState::Passive);
    bufs.set_joint_positions(&[0.3, -0.2]);
    bufs.step(&mut c, DT);
    // pitch = (m₁ + m₂)/2, roll = (m₁ − m₂)/2 on offset-relative motors.
    assert_close(&bufs.axis_positions(), &[0.1, 0.1], 1e-12);
}

#[test]
fn calibration_and_preprocessing_derive_ranges() {
    let mut c = planar();
    let mut bufs = Buffers::sized_for(&c);
    bufs.set_joint_positions(&[0.0, 1.0]);
    bufs.step(&mut c, DT);

    bufs.enter(&mut c, ControlState::Calibration);
    sweep(&mut c, &mut bufs, [-0.5, 0.5], [0.5, 1.5], 20);
    let params = c.parameters().unwrap();
    assert_eq!(params.joint_limits[0].min, -0.5);
    assert_eq!(params.joint_limits[1].max, 1.5);
    assert!(!params.axis_limits[0].is_empty());
    assert!(params.ranges.is_none());

    bufs.enter(&mut c, ControlState::Preprocessing);
    let first = c.parameters().unwrap().ranges;
    assert_eq!(
        first,
        Some([
            JointRange::from_bounds(-0.5, 0.5),
            JointRange::from_bounds(0.5, 1.5)
        ])
    );
    for _ in 0..3 {
        bufs.step(&mut c, DT);
        assert_eq!(c.parameters().unwrap().ranges, first);
    }

    // Operation clamps into the derived ranges.
    bufs.set_joint_positions(&[0.4, 1.4]);
    bufs.enter(&mut c, ControlState::Operation);
    // Reachable only with the elbow nearly straight (q₂ < 0.5).
    bufs.set_axis_targets(&[1.9, 0.5]);
    let diag = bufs.step(&mut c, DT);
    assert!(diag.anomalies.contains(StepAnomaly::JOINT_LIMITED), "{:?}", diag.anomalies);
    let q = bufs.joint_setpoint_positions();
    assert!((-0.5..=0.5).contains(&q[0]));
    assert!((0.5..=1.5).contains(&q[1]));
}

#[test]
fn calibration_entry_forgets_previous_limits() {
    let mut c = planar();
    let mut bufs = Buffers::sized_for(&c);

    bufs.enter(&mut c, ControlState::Calibration);
    sweep(&mut c, &mut bufs, [-1.0, 0.2], [1.0, 2.0], 20);
    bufs.enter(&mut c, ControlState::Passive);

    bufs.set_joint_positions(&[0.0, 1.0]);
    bufs.enter(&mut c, ControlState::Calibration);
    sweep(&mut c, &mut bufs, [-0.1, 0.9], [0.1, 1.1], 4);
    let params = c.parameters().unwrap();
    assert_eq!(params.joint_limits[0].min, -0.1);
    assert_eq!(params.joint_limits[0].max, 0.1);
    assert_eq!(params.joint_limits[1].min, 0.9);
}

#[test]
fn names_stay_index_stable() {
    let config = r#"
[[joints]]
name = "base"
[[joints]]
name = "tip"

[[axes]]
name = "horizontal"
[[axes]]
name = "vertical"
"#;
    let mut c = Planar2R::new(PLANAR_2R);
    c.init(config).unwrap();
    let joints = c.joint_names().to_vec();
    let axes = c.axis_names().to_vec();
    assert_eq!(joints, vec!["base", "tip"]);
    assert_eq!(axes, vec!["horizontal", "vertical"]);

    let mut bufs = Buffers::sized_for(&c);
    bufs.set_joint_positions(&[0.3, 1.2]);
    for state in ControlState::ALL {
        bufs.enter(&mut c, state);
        bufs.step(&mut c, DT);
        assert_eq!(c.joint_names(), joints.as_slice());
        assert_eq!(c.axis_names(), axes.as_slice());
    }

    // Default names when none are configured.
    let c = planar();
    assert_eq!(c.joint_names(), ["shoulder", "elbow"]);
    assert_eq!(c.axis_names(), ["x", "y"]);
}
