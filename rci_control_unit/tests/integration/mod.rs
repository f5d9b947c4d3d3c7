mod config_loading;
mod harness;
mod runner;
mod state_lifecycle;
mod transform_accuracy;
