//! Command-line arguments and how they layer over the config file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use membrane_core::{Cell, ComputeBackend, ExcitationMode, MembraneParams};

/// Membrane - 2D wave simulation heard through a virtual microphone
#[derive(Debug, Parser)]
#[command(name = "membrane-sim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Domain width in cells
    #[arg(long)]
    pub width: Option<usize>,

    /// Domain height in cells
    #[arg(long)]
    pub height: Option<usize>,

    /// Propagation factor λ (0 to 0.5)
    #[arg(long)]
    pub propagation_factor: Option<f32>,

    /// Damping factor (0 to 1)
    #[arg(long)]
    pub damping_factor: Option<f32>,

    /// Use free (reflecting, non-inverting) edges instead of clamped ones
    #[arg(long)]
    pub free_edges: bool,

    /// Fire once, then wait for a strike to re-arm
    #[arg(long)]
    pub single_shot: bool,

    /// Excitation firings per second
    #[arg(long, value_name = "HZ")]
    pub excitation_frequency: Option<u32>,

    /// Normalized excitation position
    #[arg(long, num_args = 2, value_names = ["X", "Y"])]
    pub excitation_position: Option<Vec<f32>>,

    /// Listener cell
    #[arg(long, num_args = 2, value_names = ["X", "Y"])]
    pub listener: Option<Vec<usize>>,

    /// Samples per second
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Run length in seconds
    #[arg(short, long)]
    pub duration: Option<u32>,

    /// Ticks per capture batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Compute surface
    #[arg(long, value_enum)]
    pub compute: Option<ComputeArg>,

    /// Worker threads for the parallel surface
    #[arg(long)]
    pub threads: Option<usize>,

    /// Pace batches to wall-clock time
    #[arg(long)]
    pub realtime: bool,

    /// Do not open an audio device
    #[arg(long)]
    pub mute: bool,

    /// Write the full recording to this WAV file
    #[arg(long, value_name = "PATH")]
    pub wav: Option<PathBuf>,

    /// Write the final pressure field to this PNG file
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Do not read strikes from stdin
    #[arg(long)]
    pub no_input: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ComputeArg {
    Serial,
    Parallel,
}

impl From<ComputeArg> for ComputeBackend {
    fn from(arg: ComputeArg) -> Self {
        match arg {
            ComputeArg::Serial => ComputeBackend::Serial,
            ComputeArg::Parallel => ComputeBackend::Parallel,
        }
    }
}

impl Cli {
    /// Config file (or defaults) with every given flag applied on top.
    pub fn resolve_params(&self) -> Result<MembraneParams> {
        let mut params = match &self.config {
            Some(path) => MembraneParams::read_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => MembraneParams::default(),
        };

        if let Some(v) = self.width {
            params.width = v;
        }
        if let Some(v) = self.height {
            params.height = v;
        }
        if let Some(v) = self.propagation_factor {
            params.propagation_factor = v;
        }
        if let Some(v) = self.damping_factor {
            params.damping_factor = v;
        }
        if self.free_edges {
            params.boundary_gain = 0.0;
        }
        if self.single_shot {
            params.excitation_mode = ExcitationMode::SingleShot;
        }
        if let Some(v) = self.excitation_frequency {
            params.excitation_frequency = v;
        }
        if let Some([x, y]) = self.excitation_position.as_deref() {
            params.excitation_position = [*x, *y];
        }
        if let Some([x, y]) = self.listener.as_deref() {
            params.listener = Cell::new(*x, *y);
        }
        if let Some(v) = self.sample_rate {
            params.sample_rate = v;
        }
        if let Some(v) = self.duration {
            params.duration = v;
        }
        if let Some(v) = self.batch_size {
            params.batch_size = v;
        }
        if let Some(v) = self.compute {
            params.compute = v.into();
        }
        if self.threads.is_some() {
            params.threads = self.threads;
        }
        if self.realtime {
            params.pace_realtime = true;
        }

        params.validate().context("invalid configuration")?;
        Ok(params)
    }
}
