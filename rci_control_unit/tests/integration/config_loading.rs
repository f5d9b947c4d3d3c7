//! Configuration files, plugin selection and init failures.

use std::io::Write;
use std::path::{Path, PathBuf};

use rci_common::config::{
    ConfigError, ConfigLoader, ControllerConfig, plugin_name, read_config_file,
};
use rci_common::error::ControllerError;
use rci_control_unit::cycle::RunnerConfig;
use rci_control_unit::kinematics::PlanarArmConfig;
use rci_control_unit::registry::{PLANAR_2R, PLANAR_3R, PluginRegistry};
use tempfile::NamedTempFile;

fn sample(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join(name)
}

#[test]
fn shipped_configs_initialize_their_plugins() {
    let registry = PluginRegistry::with_builtins();
    for file in [
        "planar_2r.toml",
        "planar_3r.toml",
        "differential_wrist.toml",
        "linear_axis.toml",
    ] {
        let text = read_config_file(&sample(file)).unwrap();
        let name = plugin_name(&text).unwrap().expect("plugin key");
        assert_eq!(format!("{name}.toml"), file);

        let mut controller = registry.create(&name).unwrap();
        controller.init(&text).unwrap();
        assert!(controller.is_initialized());
        assert_eq!(controller.joint_names().len(), controller.joints_number());

        let runner = RunnerConfig::from_toml(&text).unwrap();
        assert!(!runner.phases.is_empty());
        if !runner.target.is_empty() {
            assert_eq!(runner.target.len(), controller.axes_number());
        }
        controller.end();
    }
}

#[test]
fn config_from_temp_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
plugin = "planar_2r"

[controller]
max_iterations = 40

[model]
link_lengths = [0.5, 0.25]
"#
    )
    .unwrap();

    let cfg = ControllerConfig::<PlanarArmConfig>::load(file.path()).unwrap();
    assert_eq!(cfg.controller.max_iterations, 40);
    assert_eq!(cfg.model.link_lengths, vec![0.5, 0.25]);

    let text = read_config_file(file.path()).unwrap();
    let mut c = PluginRegistry::with_builtins().create(PLANAR_2R).unwrap();
    c.init(&text).unwrap();
    assert_eq!(c.axes_number(), 2);
}

#[test]
fn missing_file_is_reported() {
    let err = read_config_file(Path::new("/nonexistent/rci/controller.toml")).unwrap_err();
    assert_eq!(err, ConfigError::FileNotFound);
}

#[test]
fn config_for_another_plugin_is_rejected() {
    let text = read_config_file(&sample("planar_3r.toml")).unwrap();
    let mut c = PluginRegistry::with_builtins().create(PLANAR_2R).unwrap();
    let err = c.init(&text).unwrap_err();
    assert!(matches!(err, ControllerError::Config(ConfigError::ValidationError(_))));
    assert!(err.to_string().contains(PLANAR_3R));
    assert!(!c.is_initialized());
}

#[test]
fn invalid_configs_leave_controller_uninitialized() {
    let registry = PluginRegistry::with_builtins();
    for text in [
        // wrong joint count
        "[[joints]]\nname = \"only\"\n",
        // duplicate axis names
        "[[axes]]\nname = \"x\"\n[[axes]]\nname = \"x\"\n",
        // negative link
        "[model]\nlink_lengths = [1.0, -1.0]\n",
        // undeclared impedance scale input
        "[extra_io]\nimpedance_scale_input = \"missing\"\n",
        // out-of-range iterations
        "[controller]\nmax_iterations = 0\n",
        // malformed
        "[controller\n",
    ] {
        let mut c = registry.create(PLANAR_2R).unwrap();
        assert!(c.init(text).is_err(), "accepted: {text}");
        assert!(!c.is_initialized());
        assert_eq!(c.joints_number(), 0);
    }
}
