use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use checkpoint::JsonCheckpointWriter;
use config::SimulationConfig;
use solver::Simulation;

mod boundary;
mod checkpoint;
mod config;
mod domain;
mod error;
mod numerical;
mod poisson;
mod solver;

/// Incompressible flow on a staggered grid (projection method).
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON scenario file; the default lid-driven cavity is used without one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for velocity checkpoints; nothing is written without one
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the configured iteration count
    #[arg(short, long)]
    steps: Option<usize>,

    /// trace, debug, info, warn or error
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SimulationConfig::from_json_file(path)?
        }
        None => SimulationConfig::default(),
    };
    if let Some(steps) = cli.steps {
        config.scenario.iterations = steps;
    }

    let mut simulation = Simulation::from_config(&config)?;
    if let Some(directory) = &cli.output {
        let writer = JsonCheckpointWriter::new(directory, &config.scenario, &config.save)?;
        simulation = simulation.with_checkpoint_sink(writer)?;
    }

    let summary = simulation.run()?;

    if summary.unconverged_steps > 0 {
        warn!(
            "Pressure solve hit max_iterations on {} of {} steps",
            summary.unconverged_steps, summary.steps_completed
        );
    }
    if summary.checkpoints_dropped > 0 {
        warn!("{} checkpoints were dropped", summary.checkpoints_dropped);
    }
    if let Some(stats) = summary.dispatch {
        info!("Checkpoints written: {}, failed: {}", stats.written, stats.failed);
    }
    if let Some(last) = summary.last_step {
        info!(
            "Final divergence {:.3e} after {} steps (t = {:.4})",
            last.divergence, summary.steps_completed, summary.time
        );
    }

    Ok(())
}
