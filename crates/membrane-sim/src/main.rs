//! Membrane simulator binary.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release -p membrane-sim -- --duration 5 --wav out.wav
//! ```
//!
//! While running, type `x y` (normalized coordinates) and Enter to strike
//! the membrane there, or `q` to stop.

mod cli;
mod input;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use membrane_core::audio::{default_sink, AudioSink};
use membrane_core::wav::write_wav;
use membrane_core::{NullSink, Simulation};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("membrane_sim=info,membrane_core=info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let params = cli.resolve_params()?;
    let sample_rate = params.sample_rate;

    let sink: Box<dyn AudioSink> = if cli.mute {
        Box::new(NullSink::new())
    } else {
        default_sink()
    };
    let mut sim = Simulation::new(params, sink).context("failed to set up simulation")?;

    if !cli.no_input {
        // Detached: a blocked stdin read must not hold up exit.
        input::spawn_strike_reader(sim.trigger(), sim.stop_handle())
            .context("failed to start input thread")?;
        info!("type `x y` to strike, `q` to stop");
    }

    let summary = sim.run().context("simulation failed")?;
    if summary.cancelled {
        info!(batches = summary.batches, "stopped early");
    }

    if let Some(path) = &cli.snapshot {
        sim.save_snapshot(path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
    }

    let done = sim.finish().context("final playback failed")?;
    if let Some(path) = &cli.wav {
        write_wav(path, &done.samples, sample_rate)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    info!(samples = done.samples.len(), "waiting for playback to finish");
    done.sink.wait_idle();
    Ok(())
}
