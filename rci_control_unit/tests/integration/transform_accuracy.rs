//! Transform accuracy through the full control step.
//!
//! Forward kinematics on known poses, inverse/forward round trips,
//! minimum-norm resolution on a redundant arm and impedance congruence
//! on a decoupled axis.

use std::f64::consts::FRAC_PI_2;

use nalgebra::SVector;
use rci_common::error::StepAnomaly;
use rci_common::state::ControlState;
use rci_control_unit::kinematics::{KinematicModel, PlanarArm};
use rci_control_unit::registry::{LINEAR_AXIS, PLANAR_2R, PLANAR_3R};

use super::harness::{Buffers, DT, assert_close, create};

const LEAD_SCREW: &str = r#"
[model]
matrix = [[0.01]]
"#;

#[test]
fn planar_quarter_turn_elbow_reaches_one_one() {
    let mut c = create(PLANAR_2R, "");
    let mut bufs = Buffers::sized_for(c.as_ref());
    bufs.set_joint_positions(&[0.0, FRAC_PI_2]);
    bufs.joint_measures[0].velocity = 1.0;

    let diag = bufs.step(c.as_mut(), DT);
    assert!(diag.anomalies.is_empty(), "{:?}", diag.anomalies);
    assert_close(&bufs.axis_positions(), &[1.0, 1.0], 1e-12);
    assert!((diag.manipulability - 1.0).abs() < 1e-12);

    // ẋ = J·q̇ with J(0, π/2) = [[-1, -1], [1, 0]].
    assert!((bufs.axis_measures[0].velocity + 1.0).abs() < 1e-12);
    assert!((bufs.axis_measures[1].velocity - 1.0).abs() < 1e-12);
}

#[test]
fn planar_inverse_then_forward_round_trips() {
    let mut c = create(PLANAR_2R, "");
    let mut bufs = Buffers::sized_for(c.as_ref());
    bufs.set_joint_positions(&[0.3, 1.2]);
    bufs.step(c.as_mut(), DT);
    bufs.enter(c.as_mut(), ControlState::Operation);

    let target = [1.2, 0.8];
    bufs.set_axis_targets(&target);
    let diag = bufs.step(c.as_mut(), DT);
    assert!(!diag.is_degraded(), "{:?}", diag.anomalies);
    assert!(diag.newton_iterations > 0);

    let solved = bufs.joint_setpoint_positions();
    bufs.set_joint_positions(&solved);
    bufs.step(c.as_mut(), DT);
    assert_close(&bufs.axis_positions(), &target, 1e-9);
    assert!(c.diagnostics().tracking_error < 1e-9);
}

#[test]
fn redundant_arm_resolves_with_minimum_norm() {
    let config = "[model]\nlink_lengths = [1.0, 0.8, 0.6]\n";
    let arm = PlanarArm::<3>::new([1.0, 0.8, 0.6]).unwrap();
    let q0 = SVector::<f64, 3>::new(0.2, 0.8, 0.8);
    let x0 = arm.forward_position(&q0);

    let mut c = create(PLANAR_3R, config);
    let mut bufs = Buffers::sized_for(c.as_ref());
    bufs.set_joint_positions(q0.as_slice());
    bufs.step(c.as_mut(), DT);
    bufs.enter(c.as_mut(), ControlState::Operation);

    bufs.set_axis_targets(&[x0[0] + 1e-3, x0[1] - 1e-3]);
    let diag = bufs.step(c.as_mut(), DT);
    assert!(!diag.is_degraded(), "{:?}", diag.anomalies);

    let q = bufs.joint_setpoint_positions();
    let dq = SVector::<f64, 3>::from_fn(|i, _| q[i] - q0[i]);
    let jac = arm.jacobian(&q0);
    let null = jac.row(0).transpose().cross(&jac.row(1).transpose());

    assert!(dq.norm() > 1e-4);
    assert!(dq.dot(&null).abs() / null.norm() < 1e-5);
}

#[test]
fn singular_pose_is_flagged_and_finite() {
    let mut c = create(PLANAR_2R, "");
    let mut bufs = Buffers::sized_for(c.as_ref());
    bufs.set_joint_positions(&[0.0, 0.0]);
    bufs.joint_measures[0].force = 1.0;
    bufs.joint_measures[1].stiffness = 50.0;

    let diag = bufs.step(c.as_mut(), DT);
    assert!(diag.anomalies.contains(StepAnomaly::SINGULAR));
    assert!(diag.is_degraded());
    assert!(diag.manipulability.abs() < 1e-12);
    assert!(bufs.all_finite());
    assert_close(&bufs.axis_positions(), &[2.0, 0.0], 1e-12);

    bufs.enter(c.as_mut(), ControlState::Operation);
    bufs.set_axis_targets(&[1.9, 0.1]);
    let diag = bufs.step(c.as_mut(), DT);
    assert!(
        diag.anomalies
            .intersects(StepAnomaly::SINGULAR | StepAnomaly::UNREACHABLE)
    );
    assert!(bufs.all_finite());
}

#[test]
fn decoupled_impedance_round_trips() {
    let mut c = create(LINEAR_AXIS, LEAD_SCREW);
    let mut bufs = Buffers::sized_for(c.as_ref());
    bufs.joint_measures[0].position = 0.2;
    bufs.joint_measures[0].force = 2.0;
    bufs.joint_measures[0].stiffness = 100.0;
    bufs.joint_measures[0].damping = 4.0;

    bufs.step(c.as_mut(), DT);
    let axis = bufs.axis_measures[0];
    assert!((axis.position - 0.002).abs() < 1e-15);
    assert!((axis.force - 200.0).abs() < 1e-9);
    assert!((axis.stiffness / 1e6 - 1.0).abs() < 1e-9);
    assert!((axis.damping / 4e4 - 1.0).abs() < 1e-9);

    // Command the measured impedance back at the measured position.
    bufs.axis_setpoints[0] = axis;
    bufs.axis_setpoints[0].velocity = 0.0;
    bufs.joint_measures[0].velocity = 0.0;
    bufs.enter(c.as_mut(), ControlState::Operation);
    bufs.axis_setpoints[0] = axis;
    bufs.axis_setpoints[0].velocity = 0.0;
    let diag = bufs.step(c.as_mut(), DT);
    assert!(diag.anomalies.is_empty(), "{:?}", diag.anomalies);

    let joint = bufs.joint_setpoints[0];
    assert!((joint.position - 0.2).abs() < 1e-12);
    assert!((joint.force - 2.0).abs() < 1e-9);
    assert!((joint.stiffness - 100.0).abs() < 1e-6);
    assert!((joint.damping - 4.0).abs() < 1e-8);
}
