//! # RCI Runner
//!
//! Host process for one controller plugin. Loads a TOML file, selects the
//! plugin by its `plugin` key (or `--plugin`), initializes it with the whole
//! file, performs RT setup and runs the `[runner]` phase sequence against a
//! simulated plant.

use clap::Parser;
use rci_common::config::{LogLevel, log_level, plugin_name, read_config_file};
use rci_control_unit::cycle::{CycleRunner, RunnerConfig, rt_setup};
use rci_control_unit::registry::PluginRegistry;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// RCI Runner: drive a robot controller plugin against a simulated plant
#[derive(Parser, Debug)]
#[command(name = "rci_runner")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Run a robot controller plugin through its control states")]
struct Args {
    /// Path to the controller + runner configuration TOML.
    #[arg(default_value = "config/planar_2r.toml")]
    config: PathBuf,

    /// Plugin name (overrides the `plugin` key of the file).
    #[arg(long)]
    plugin: Option<String>,

    /// List registered plugins and exit.
    #[arg(long)]
    list_plugins: bool,

    /// CPU core to pin the RT thread to (default: 1).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (default: 80).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Run cycles back to back without pacing.
    #[arg(long)]
    fast: bool,

    /// Enable verbose logging (DEBUG level, overrides `log_level`).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    // Unreadable files are reported by `run` once logging is up.
    let file_level = read_config_file(&args.config)
        .ok()
        .and_then(|text| log_level(&text).ok())
        .unwrap_or_default();
    setup_tracing(&args, file_level);

    info!("RCI Runner v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("RCI Runner shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let registry = PluginRegistry::with_builtins();
    if args.list_plugins {
        for name in registry.list_plugins() {
            println!("{name}");
        }
        return Ok(());
    }

    let text = read_config_file(&args.config)?;
    let name = match (&args.plugin, plugin_name(&text)?) {
        (Some(cli), Some(file)) if *cli != file => {
            warn!("--plugin '{cli}' overrides '{file}' from {}", args.config.display());
            cli.clone()
        }
        (Some(cli), _) => cli.clone(),
        (None, Some(file)) => file,
        (None, None) => {
            return Err(format!(
                "{}: no `plugin` key and no --plugin given (available: {})",
                args.config.display(),
                registry.list_plugins().join(", ")
            )
            .into());
        }
    };

    let runner_config = RunnerConfig::from_toml(&text)?;
    info!(
        "Config OK: plugin={name}, cycle_time={}µs, phases={}",
        runner_config.cycle_time_us,
        runner_config.phases.len()
    );

    let controller = registry.create(&name)?;
    let mut runner = CycleRunner::new(controller, &text, runner_config)?.with_pacing(!args.fast);
    info!(
        "{name} initialized: joints {:?}, axes {:?}",
        runner.controller().joint_names(),
        runner.controller().axis_names()
    );

    // RT setup (mlockall, affinity, scheduler).
    rt_setup(args.cpu_core, args.rt_priority)?;
    info!(
        "RT setup complete (cpu_core={}, priority={})",
        args.cpu_core, args.rt_priority
    );

    // Setup signal handler for graceful shutdown.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let summary = runner.run(&running)?;
    if summary.interrupted {
        warn!("Run interrupted after {} cycles", summary.cycles);
    }
    let axes: Vec<f64> = runner.axis_measures().iter().map(|a| a.position).collect();
    info!(
        "Final state {}: axis positions {:?}, manipulability {:.4}, tracking error {:.3e}",
        summary.final_state, axes, summary.last.manipulability, summary.last.tracking_error
    );
    if !runner.extra_outputs().is_empty() {
        info!("Extra outputs: {:?}", runner.extra_outputs());
    }
    info!(
        "Cycles: {} (avg {}ns, max {}ns, overruns {})",
        runner.stats.cycle_count,
        runner.stats.avg_cycle_ns(),
        runner.stats.max_cycle_ns,
        runner.stats.overruns
    );

    Ok(())
}

/// Setup tracing subscriber from the file's `log_level`, `--verbose` overriding it.
fn setup_tracing(args: &Args, file_level: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        file_level.as_directive().parse().unwrap_or(Level::INFO)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
