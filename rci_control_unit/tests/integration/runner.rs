//! Cycle runner end to end: phases, plant, extra I/O.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use rci_common::config::read_config_file;
use rci_common::state::ControlState;
use rci_common::error::StepAnomaly;
use rci_control_unit::cycle::{CycleError, CycleRunner, Phase, RunnerConfig};
use rci_control_unit::registry::{LINEAR_AXIS, PLANAR_2R, PluginRegistry};

use super::harness::assert_close;

#[test]
fn linear_axis_runs_all_phases_to_target() {
    let text = r#"
[model]
matrix = [[0.01]]

[extra_io]
outputs = ["tracking_error", "control_state"]

[runner]
cycle_time_us = 500
plant_time_constant = 0.0
calibration_sweep = 0.5
target = [0.004]
phases = [
    { state = "Offset", cycles = 5 },
    { state = "Calibration", cycles = 200 },
    { state = "Preprocessing", cycles = 5 },
    { state = "Operation", cycles = 400 },
]
"#;
    let controller = PluginRegistry::with_builtins().create(LINEAR_AXIS).unwrap();
    let config = RunnerConfig::from_toml(text).unwrap();
    let mut runner = CycleRunner::new(controller, text, config)
        .unwrap()
        .with_pacing(false);

    let summary = runner.run(&AtomicBool::new(true)).unwrap();
    assert!(!summary.interrupted);
    assert_eq!(summary.cycles, 610);
    assert_eq!(summary.final_state, ControlState::Operation);
    assert_eq!(summary.rejected_steps, 0);
    assert_eq!(summary.degraded_steps, 0);
    assert_eq!(runner.stats.cycle_count, 610);

    assert_close(&[runner.axis_measures()[0].position], &[0.004], 1e-9);
    assert_close(runner.plant().positions(), &[0.4], 1e-9);
    assert!(runner.extra_outputs()[0] < 1e-9);
    assert_eq!(runner.extra_outputs()[1], 4.0);
    assert_eq!(runner.controller().stats().steps, 610);
}

#[test]
fn planar_sample_reaches_its_target() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/planar_2r.toml");
    let text = read_config_file(&path).unwrap();
    let config = RunnerConfig::from_toml(&text).unwrap();
    let target = config.target.clone();

    let controller = PluginRegistry::with_builtins().create(PLANAR_2R).unwrap();
    let mut runner = CycleRunner::new(controller, &text, config)
        .unwrap()
        .with_pacing(false);
    let summary = runner.run(&AtomicBool::new(true)).unwrap();

    assert_eq!(summary.final_state, ControlState::Operation);
    assert_eq!(summary.rejected_steps, 0);
    assert!(!summary.last.is_degraded(), "{:?}", summary.last.anomalies);
    let reached: Vec<f64> = runner.axis_measures().iter().map(|a| a.position).collect();
    assert_close(&reached, &target, 1e-6);
}

#[test]
fn initial_positions_must_match_joint_count() {
    let controller = PluginRegistry::with_builtins().create(PLANAR_2R).unwrap();
    let config = RunnerConfig {
        initial_joint_positions: vec![0.0; 3],
        ..RunnerConfig::default()
    };
    assert!(CycleRunner::new(controller, "", config).is_err());
}

#[test]
fn extra_inputs_must_match_declared_inputs() {
    let text = r#"
[model]
matrix = [[0.01]]

[extra_io]
inputs = ["compliance"]

[runner]
extra_inputs = [1.0, 2.0]
"#;
    let controller = PluginRegistry::with_builtins().create(LINEAR_AXIS).unwrap();
    let config = RunnerConfig::from_toml(text).unwrap();
    let err = CycleRunner::new(controller, text, config).err().unwrap();
    assert!(matches!(err, CycleError::Setup(_)), "{err}");

    // Matching length runs without flagging the channel.
    let text = text.replace("[1.0, 2.0]", "[1.0]");
    let controller = PluginRegistry::with_builtins().create(LINEAR_AXIS).unwrap();
    let mut config = RunnerConfig::from_toml(&text).unwrap();
    config.phases = vec![Phase {
        state: ControlState::Operation,
        cycles: 5,
    }];
    let mut runner = CycleRunner::new(controller, &text, config)
        .unwrap()
        .with_pacing(false);
    let summary = runner.run(&AtomicBool::new(true)).unwrap();
    assert!(!summary.anomalies.contains(StepAnomaly::EXTRA_INPUTS_MISMATCH));
    assert_eq!(summary.rejected_steps, 0);
}
