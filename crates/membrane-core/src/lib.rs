pub mod assembler;
pub mod audio;
pub mod constants;
pub mod error;
pub mod excitation;
pub mod grid;
pub mod kernel;
pub mod sampler;
pub mod simulation;
pub mod snapshot;
pub mod stepper;
pub mod surface;
pub mod wav;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use assembler::{AudioBufferAssembler, FinalPlayback};
pub use audio::{AudioSink, CpalSink, NullSink};
pub use error::{MembraneError, Result};
pub use excitation::{ExcitationController, ExcitationMode, ExcitationTrigger};
pub use grid::{BoundaryMode, Cell, GridState, Layer};
pub use kernel::{KernelUniforms, LeapfrogKernel, Stencil, UpdateKernel};
pub use sampler::{AudioSampler, CaptureBuffer};
pub use simulation::{RunSummary, Simulation, StopHandle};
pub use stepper::{SettledGrid, SimulationStepper};
pub use surface::ComputeBackend;

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Everything needed to set up one run of the membrane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembraneParams {
    /// Domain width in cells, edges included.
    pub width: usize,
    /// Domain height in cells, edges included.
    pub height: usize,
    /// λ, squared Courant number; stable up to 0.5.
    pub propagation_factor: f32,
    /// Fraction of the field lost per tick.
    pub damping_factor: f32,
    /// 0 for free edges, 1 for clamped edges.
    pub boundary_gain: f32,
    pub excitation_mode: ExcitationMode,
    /// Normalized strike position in `[0, 1]²`.
    pub excitation_position: [f32; 2],
    /// Firings per second.
    pub excitation_frequency: u32,
    /// Amplitude of each firing, also restored by every strike.
    pub excitation_amplitude: f32,
    /// Cell whose pressure is recorded.
    pub listener: Cell,
    /// Ticks per second of audio.
    pub sample_rate: u32,
    /// Run length in seconds.
    pub duration: u32,
    /// Ticks per capture batch.
    pub batch_size: usize,
    pub compute: ComputeBackend,
    /// Worker threads for the parallel surface; `None` uses every core.
    pub threads: Option<usize>,
    /// Sleep after each batch so the run never outpaces real time.
    pub pace_realtime: bool,
}

impl Default for MembraneParams {
    fn default() -> Self {
        Self {
            width: 80,
            height: 80,
            propagation_factor: 0.3,
            damping_factor: 0.001,
            boundary_gain: 1.0,
            excitation_mode: ExcitationMode::Continuous,
            excitation_position: [0.4, 0.5],
            excitation_frequency: 1000,
            excitation_amplitude: 1.0,
            listener: Cell::new(5, 5),
            sample_rate: 44_100,
            duration: 10,
            batch_size: 128,
            compute: ComputeBackend::Parallel,
            threads: None,
            pace_realtime: false,
        }
    }
}

impl MembraneParams {
    /// Load and validate a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let params = Self::read_json_file(path)?;
        params.validate()?;
        Ok(params)
    }

    /// Parse a JSON file without validating it, for callers that layer
    /// overrides on top before checking the result.
    pub fn read_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Reject any configuration the tick loop cannot run.
    pub fn validate(&self) -> Result<()> {
        use constants::{MAX_PROPAGATION_FACTOR, MIN_DOMAIN_EDGE};

        if self.width < MIN_DOMAIN_EDGE || self.height < MIN_DOMAIN_EDGE {
            return Err(MembraneError::InvalidDomain {
                width: self.width,
                height: self.height,
            });
        }
        if !(0.0..=MAX_PROPAGATION_FACTOR).contains(&self.propagation_factor) {
            return Err(MembraneError::invalid_param(
                "propagation_factor",
                format!("{} is outside [0, {MAX_PROPAGATION_FACTOR}]", self.propagation_factor),
            ));
        }
        if !(0.0..=1.0).contains(&self.damping_factor) {
            return Err(MembraneError::invalid_param(
                "damping_factor",
                format!("{} is outside [0, 1]", self.damping_factor),
            ));
        }
        self.boundary_mode()?;
        if self.sample_rate == 0 {
            return Err(MembraneError::invalid_param("sample_rate", "must be positive"));
        }
        if self.excitation_period() == 0 {
            return Err(MembraneError::invalid_param(
                "excitation_frequency",
                format!(
                    "{} Hz gives no whole tick between firings at {} Hz",
                    self.excitation_frequency, self.sample_rate
                ),
            ));
        }
        if !self.excitation_amplitude.is_finite() {
            return Err(MembraneError::invalid_param("excitation_amplitude", "must be finite"));
        }
        if self.batch_size == 0 {
            return Err(MembraneError::invalid_param("batch_size", "must be positive"));
        }
        if self.threads == Some(0) {
            return Err(MembraneError::invalid_param("threads", "must be positive"));
        }
        if self.listener.x >= self.width || self.listener.y >= self.height {
            return Err(MembraneError::InvalidCell {
                x: self.listener.x,
                y: self.listener.y,
                width: self.width,
                height: self.height,
                reason: "listener must lie inside the domain",
            });
        }
        Ok(())
    }

    pub fn boundary_mode(&self) -> Result<BoundaryMode> {
        BoundaryMode::from_gain(self.boundary_gain)
    }

    /// Ticks between excitation firings.
    pub fn excitation_period(&self) -> u32 {
        constants::excitation_period(self.sample_rate, self.excitation_frequency)
    }

    /// Samples in the configured duration.
    pub fn total_samples(&self) -> usize {
        self.sample_rate as usize * self.duration as usize
    }

    /// Whole batches that fit in the duration; a partial tail is not run.
    pub fn batch_count(&self) -> usize {
        self.total_samples() / self.batch_size.max(1)
    }
}
