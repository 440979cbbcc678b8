//! The tick loop: excitation, update, settle, sample, in batches.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::assembler::{AudioBufferAssembler, FinalPlayback};
use crate::audio::AudioSink;
use crate::constants::batch_duration;
use crate::error::Result;
use crate::excitation::{ExcitationController, ExcitationTrigger};
use crate::grid::GridState;
use crate::kernel::UpdateKernel;
use crate::sampler::{AudioSampler, CaptureBuffer};
use crate::snapshot;
use crate::stepper::SimulationStepper;
use crate::MembraneParams;

/// Cloneable request to stop the run at the next batch boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// What a call to [`Simulation::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub ticks: u64,
    pub rolling_flushes: usize,
    pub playback_len: usize,
    /// True if a stop request ended the run before the last batch.
    pub cancelled: bool,
}

/// A configured membrane with its audio path.
pub struct Simulation<S: AudioSink> {
    params: MembraneParams,
    grid: GridState,
    stepper: SimulationStepper,
    excitation: ExcitationController,
    trigger: ExcitationTrigger,
    sampler: AudioSampler,
    capture: CaptureBuffer,
    assembler: AudioBufferAssembler<S>,
    stop: StopHandle,
    batches_done: usize,
}

impl<S: AudioSink> Simulation<S> {
    /// Validate `params` and build every stage. Any failure here happens
    /// before the first tick.
    pub fn new(params: MembraneParams, sink: S) -> Result<Self> {
        params.validate()?;
        let stepper = SimulationStepper::from_params(&params)?;
        Self::build(params, stepper, sink)
    }

    /// Same as [`Simulation::new`] with a custom update kernel.
    pub fn with_kernel(
        params: MembraneParams,
        kernel: Box<dyn UpdateKernel>,
        sink: S,
    ) -> Result<Self> {
        params.validate()?;
        let stepper = SimulationStepper::with_kernel(&params, kernel)?;
        Self::build(params, stepper, sink)
    }

    fn build(params: MembraneParams, stepper: SimulationStepper, sink: S) -> Result<Self> {
        let mut grid = GridState::new(params.width, params.height, params.boundary_mode()?)?;
        let excitation = ExcitationController::from_params(&params);
        grid.set_excitation(grid.cell_at(excitation.position()))?;
        let sampler = AudioSampler::new(params.listener, &grid)?;
        let capture = CaptureBuffer::new(params.batch_size);
        let recorded = params.batch_count() * params.batch_size;
        let assembler = AudioBufferAssembler::with_capacity(sink, params.sample_rate, recorded);

        info!(
            width = params.width,
            height = params.height,
            kernel = stepper.kernel_name(),
            surface = stepper.surface_name(),
            period = excitation.period(),
            "simulation ready"
        );

        Ok(Self {
            params,
            grid,
            stepper,
            excitation,
            trigger: ExcitationTrigger::new(),
            sampler,
            capture,
            assembler,
            stop: StopHandle::new(),
            batches_done: 0,
        })
    }

    /// Handle for posting strikes from other threads.
    pub fn trigger(&self) -> ExcitationTrigger {
        self.trigger.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn params(&self) -> &MembraneParams {
        &self.params
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn excitation(&self) -> &ExcitationController {
        &self.excitation
    }

    pub fn assembler(&self) -> &AudioBufferAssembler<S> {
        &self.assembler
    }

    fn apply_pending_strike(&mut self) -> Result<()> {
        if let Some(position) = self.trigger.take() {
            self.excitation.set_excitation(position);
            let cell = self.grid.cell_at(self.excitation.position());
            self.grid.set_excitation(cell)?;
            debug!(x = cell.x, y = cell.y, "excitation moved");
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.apply_pending_strike()?;
        let magnitude = self.excitation.magnitude();
        let settled = self.stepper.advance(&mut self.grid, magnitude)?.wait()?;
        self.capture.deposit(self.sampler.sample_once(&settled))?;
        self.excitation.tick();
        Ok(())
    }

    /// Run one batch of ticks and hand its samples to the assembler.
    pub fn run_batch(&mut self) -> Result<()> {
        for _ in 0..self.params.batch_size {
            self.tick()?;
        }
        let batch = self.capture.retrieve();
        self.assembler.append_batch(batch)?;
        self.batches_done += 1;
        trace!(batch = self.batches_done, "batch captured");
        Ok(())
    }

    /// Run the remaining batches, or until a stop is requested.
    ///
    /// The stop flag is only checked between batches.
    pub fn run(&mut self) -> Result<RunSummary> {
        let total = self.params.batch_count();
        let pace = self
            .params
            .pace_realtime
            .then(|| batch_duration(self.params.batch_size, self.params.sample_rate));
        let started = Instant::now();
        let mut cancelled = false;

        info!(batches = total, batch_size = self.params.batch_size, "run started");
        while self.batches_done < total {
            if self.stop.is_stop_requested() {
                cancelled = true;
                info!(batch = self.batches_done, "stop requested");
                break;
            }
            let batch_start = Instant::now();
            self.run_batch()?;
            if let Some(target) = pace {
                let elapsed = batch_start.elapsed();
                if elapsed < target {
                    std::thread::sleep(target - elapsed);
                }
            }
        }

        let summary = RunSummary {
            batches: self.batches_done,
            ticks: self.stepper.ticks(),
            rolling_flushes: self.assembler.flushes(),
            playback_len: self.assembler.playback_len(),
            cancelled,
        };
        info!(
            batches = summary.batches,
            ticks = summary.ticks,
            flushes = summary.rolling_flushes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(summary)
    }

    /// Save the settled field as PNG.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        snapshot::save_snapshot(
            path,
            self.grid.layer_values(self.grid.settled_layer()),
            self.grid.width(),
            self.grid.height(),
        )
    }

    /// Hand the whole recording to the sink.
    pub fn finish(self) -> Result<FinalPlayback<S>> {
        self.assembler.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests::RecordingSink;
    use crate::audio::NullSink;
    use crate::excitation::ExcitationMode;
    use crate::grid::{BoundaryMode, Cell};
    use crate::surface::ComputeBackend;

    fn small_params() -> MembraneParams {
        MembraneParams {
            width: 16,
            height: 12,
            sample_rate: 100,
            duration: 3,
            batch_size: 16,
            excitation_frequency: 25,
            listener: Cell::new(5, 5),
            compute: ComputeBackend::Serial,
            ..MembraneParams::default()
        }
    }

    // -----------------------------------------------------------------------
    // Buffer accounting
    // -----------------------------------------------------------------------

    #[test]
    fn test_playback_length_is_whole_batches() {
        let mut sim = Simulation::new(small_params(), RecordingSink::default()).unwrap();
        let summary = sim.run().unwrap();

        // 300 samples in batches of 16: 18 batches, 288 samples.
        assert_eq!(summary.batches, 18);
        assert_eq!(summary.ticks, 288);
        assert_eq!(summary.playback_len, 288);
        assert_eq!(summary.rolling_flushes, 2);
        assert!(!summary.cancelled);

        let done = sim.finish().unwrap();
        assert_eq!(done.samples.len(), 288);
        let clips = &done.sink.clips;
        assert_eq!(clips.len(), 3, "two rolling flushes and the final playback");
        assert_eq!(clips[0].0.as_slice(), &done.samples[..100]);
        assert_eq!(clips[1].0.as_slice(), &done.samples[100..200]);
        assert_eq!(clips[2].0, done.samples);
    }

    #[test]
    fn test_listener_hears_excitation() {
        let params = MembraneParams {
            excitation_position: [0.4, 0.5],
            listener: Cell::new(6, 6),
            ..small_params()
        };
        let mut sim = Simulation::new(params, NullSink::new()).unwrap();
        assert_eq!(sim.grid().excitation_cell(), Some(Cell::new(6, 6)));
        sim.run().unwrap();
        let done = sim.finish().unwrap();
        // First firing is injected on tick 4 and heard on tick 5, once its
        // layer has been finalized.
        assert_eq!(&done.samples[..5], &[0, 0, 0, 0, 0]);
        assert_eq!(done.samples[5], 32767);
    }

    #[test]
    fn test_run_again_after_completion_is_a_no_op() {
        let mut sim = Simulation::new(small_params(), NullSink::new()).unwrap();
        sim.run().unwrap();
        let again = sim.run().unwrap();
        assert_eq!(again.batches, 18);
        assert_eq!(again.ticks, 288);
    }

    // -----------------------------------------------------------------------
    // Cancellation and strikes
    // -----------------------------------------------------------------------

    #[test]
    fn test_stop_before_run_still_finalizes() {
        let mut sim = Simulation::new(small_params(), RecordingSink::default()).unwrap();
        sim.stop_handle().request_stop();
        let summary = sim.run().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.batches, 0);

        let done = sim.finish().unwrap();
        assert!(done.samples.is_empty());
        assert_eq!(done.sink.clips.len(), 1, "final playback still happens");
    }

    /// Sink that requests a stop on its first rolling flush.
    struct StopOnFlush {
        stop: StopHandle,
    }

    impl AudioSink for StopOnFlush {
        fn play(&mut self, _samples: &[i16], _sample_rate: u32) -> Result<()> {
            self.stop.request_stop();
            Ok(())
        }
    }

    #[test]
    fn test_stop_finishes_current_batch() {
        let stop = StopHandle::new();
        let sink = StopOnFlush { stop: stop.clone() };
        let mut sim = Simulation::new(small_params(), sink).unwrap();
        sim.stop = stop;
        let summary = sim.run().unwrap();

        // The flush at sample 100 happens inside batch 7 (samples 96..112).
        assert!(summary.cancelled);
        assert_eq!(summary.batches, 7);
        assert_eq!(summary.playback_len, 112);
    }

    #[test]
    fn test_strike_moves_excitation_and_rearms() {
        let params = MembraneParams {
            excitation_mode: ExcitationMode::SingleShot,
            ..small_params()
        };
        let mut sim = Simulation::new(params, NullSink::new()).unwrap();
        sim.run_batch().unwrap();
        assert!(!sim.excitation().is_armed(), "single shot has fired");

        sim.trigger().set_excitation(0.75, 0.25);
        sim.run_batch().unwrap();
        assert_eq!(sim.grid().excitation_cell(), Some(Cell::new(12, 3)));
        assert_eq!(sim.excitation().position(), [0.75, 0.25]);
        assert!(!sim.excitation().is_armed(), "the re-armed shot fired within the batch");
    }

    #[test]
    fn test_clamped_edges_stay_zero_through_run() {
        let mut sim = Simulation::new(small_params(), NullSink::new()).unwrap();
        sim.run().unwrap();
        let grid = sim.grid();
        let field = grid.layer_values(grid.settled_layer());
        assert_eq!(grid.boundary(), BoundaryMode::Clamped);
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                if !grid.is_interior(Cell::new(x, y)) {
                    assert_eq!(field[y * grid.width() + x], 0.0, "edge ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn test_invalid_params_fail_before_running() {
        let params = MembraneParams {
            propagation_factor: 0.75,
            ..small_params()
        };
        assert!(Simulation::new(params, NullSink::new()).is_err());

        let params = MembraneParams {
            listener: Cell::new(16, 0),
            ..small_params()
        };
        assert!(Simulation::new(params, NullSink::new()).is_err());
    }

    #[test]
    fn test_snapshot_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("field.png");
        let mut sim = Simulation::new(small_params(), NullSink::new()).unwrap();
        sim.run_batch().unwrap();
        sim.save_snapshot(&path).unwrap();
        assert!(path.exists());
    }
}
