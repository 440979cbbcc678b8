//! Compute surfaces: the executors that run the update kernel over the grid.
//!
//! A dispatch hands back a [`Fence`]. The stepper waits on it before it
//! flips parity or lets anyone read the grid.
//!
//! The CPU surfaces write every cell of `pass.target` before `dispatch`
//! returns (for [`RayonSurface`] the barrier is the pool's `install` join),
//! so they return [`Fence::complete`] and allocate nothing per tick. A
//! surface whose executor reports completion from elsewhere, such as a
//! worker thread acknowledging the pass, returns [`Fence::pending`] and
//! the stepper blocks in `wait` until it is signalled.

use std::sync::mpsc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MembraneError, Result};
use crate::grid::{BoundaryLink, UpdatePass};
use crate::kernel::{KernelUniforms, Stencil, UpdateKernel};

/// Which compute surface to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputeBackend {
    /// Single-threaded update on the calling thread.
    Serial,
    /// Row-parallel update on a dedicated rayon pool.
    #[default]
    Parallel,
}

/// Completion signal for one dispatched update.
#[must_use = "a dispatched update must be waited on before the grid is read"]
pub struct Fence {
    state: FenceState,
}

enum FenceState {
    Complete,
    Pending(mpsc::Receiver<Result<()>>),
}

/// Sending half of a pending [`Fence`], held by whoever completes the update.
pub struct FenceSignal {
    tx: mpsc::SyncSender<Result<()>>,
}

impl Fence {
    /// A fence for an update that finished inside `dispatch`.
    pub fn complete() -> Self {
        Self {
            state: FenceState::Complete,
        }
    }

    /// Create an unsignalled fence and the handle that completes it.
    pub fn pending() -> (FenceSignal, Fence) {
        let (tx, rx) = mpsc::sync_channel(1);
        let fence = Fence {
            state: FenceState::Pending(rx),
        };
        (FenceSignal { tx }, fence)
    }

    /// Block until the update has finished writing its layer.
    pub fn wait(self) -> Result<()> {
        match self.state {
            FenceState::Complete => Ok(()),
            FenceState::Pending(done) => done.recv().map_err(|_| {
                MembraneError::compute("update dropped before signalling completion")
            })?,
        }
    }
}

impl FenceSignal {
    pub fn signal(self, result: Result<()>) {
        // A dropped fence means nobody is waiting; nothing to report to.
        let _ = self.tx.send(result);
    }
}

/// Executor for one grid update.
pub trait ComputeSurface: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Run `kernel` over every cell of `pass.target`.
    ///
    /// Interior cells are written first; edge cells are then derived from
    /// the freshly written interior. The pass is only borrowed for this
    /// call, so every write to `pass.target` must land before returning;
    /// the fence reports when the executor has acknowledged completion.
    fn dispatch(
        &mut self,
        pass: UpdatePass<'_>,
        kernel: &dyn UpdateKernel,
        uniforms: &KernelUniforms,
    ) -> Result<Fence>;
}

/// Build the surface selected in the configuration.
///
/// Failure here is fatal: there is no degraded mode in which updates are
/// silently skipped.
pub fn build_surface(
    backend: ComputeBackend,
    threads: Option<usize>,
) -> Result<Box<dyn ComputeSurface>> {
    match backend {
        ComputeBackend::Serial => Ok(Box::new(SerialSurface)),
        ComputeBackend::Parallel => Ok(Box::new(RayonSurface::new(threads)?)),
    }
}

/// Update one row of interior cells.
#[inline]
#[allow(clippy::too_many_arguments)]
fn update_row(
    y: usize,
    width: usize,
    settled: &[f32],
    target_row: &mut [f32],
    interior: &[bool],
    excitation: &[f32],
    kernel: &dyn UpdateKernel,
    uniforms: &KernelUniforms,
) {
    let row_start = y * width;
    for x in 1..width - 1 {
        let idx = row_start + x;
        if !interior[idx] {
            continue;
        }
        let stencil = Stencil {
            cur: settled[idx],
            prev: target_row[x],
            north: settled[idx - width],
            south: settled[idx + width],
            east: settled[idx + 1],
            west: settled[idx - 1],
            excitation: excitation[idx],
        };
        target_row[x] = kernel.interior(&stencil, uniforms);
    }
}

/// Write every edge cell from its (already updated) interior neighbour.
fn apply_boundary(
    target: &mut [f32],
    links: &[BoundaryLink],
    kernel: &dyn UpdateKernel,
    uniforms: &KernelUniforms,
) {
    for link in links {
        target[link.cell] = match link.adjacent {
            Some(adjacent) => kernel.boundary(target[adjacent], uniforms),
            None => 0.0,
        };
    }
}

/// Sequential surface, fastest for small grids.
#[derive(Debug, Default)]
pub struct SerialSurface;

impl ComputeSurface for SerialSurface {
    fn name(&self) -> &str {
        "serial"
    }

    fn dispatch(
        &mut self,
        pass: UpdatePass<'_>,
        kernel: &dyn UpdateKernel,
        uniforms: &KernelUniforms,
    ) -> Result<Fence> {
        let UpdatePass {
            width,
            height,
            settled,
            target,
            interior,
            excitation,
            boundary,
        } = pass;

        for (y, row) in target
            .chunks_mut(width)
            .enumerate()
            .take(height - 1)
            .skip(1)
        {
            update_row(y, width, settled, row, interior, excitation, kernel, uniforms);
        }
        apply_boundary(target, boundary, kernel, uniforms);

        Ok(Fence::complete())
    }
}

/// Row-parallel surface backed by its own rayon thread pool.
pub struct RayonSurface {
    pool: rayon::ThreadPool,
}

impl RayonSurface {
    /// Build the worker pool; `None` lets rayon pick one thread per core.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("membrane-update-{i}"));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| MembraneError::compute(format!("failed to build update pool: {e}")))?;
        debug!(threads = pool.current_num_threads(), "parallel compute surface ready");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ComputeSurface for RayonSurface {
    fn name(&self) -> &str {
        "parallel"
    }

    fn dispatch(
        &mut self,
        pass: UpdatePass<'_>,
        kernel: &dyn UpdateKernel,
        uniforms: &KernelUniforms,
    ) -> Result<Fence> {
        let UpdatePass {
            width,
            height,
            settled,
            target,
            interior,
            excitation,
            boundary,
        } = pass;

        // Rows 0 and height-1 hold no interior cells.
        let interior_rows = &mut target[width..(height - 1) * width];
        self.pool.install(|| {
            interior_rows
                .par_chunks_mut(width)
                .enumerate()
                .for_each(|(offset, row)| {
                    update_row(
                        offset + 1,
                        width,
                        settled,
                        row,
                        interior,
                        excitation,
                        kernel,
                        uniforms,
                    );
                });
        });
        apply_boundary(target, boundary, kernel, uniforms);

        Ok(Fence::complete())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::grid::{BoundaryMode, Cell, GridState, Layer};
    use crate::kernel::LeapfrogKernel;

    fn uniforms(magnitude: f32, gain: f32) -> KernelUniforms {
        KernelUniforms {
            propagation_factor: 0.3,
            damping_factor: 0.001,
            boundary_gain: gain,
            excitation_magnitude: magnitude,
        }
    }

    fn seeded_grid(boundary: BoundaryMode) -> GridState {
        let mut grid = GridState::new(37, 23, boundary).unwrap();
        for y in 1..22 {
            for x in 1..36 {
                let v = ((x * 7 + y * 13) % 11) as f32 / 11.0 - 0.5;
                grid.write(Layer::Zero, x, y, v);
                grid.write(Layer::One, x, y, 0.5 * v);
            }
        }
        grid.set_excitation(Cell::new(10, 10)).unwrap();
        grid
    }

    #[test]
    fn test_fence_reports_completion() {
        let (signal, fence) = Fence::pending();
        signal.signal(Ok(()));
        assert!(fence.wait().is_ok());
    }

    #[test]
    fn test_complete_fence_needs_no_signal() {
        assert!(Fence::complete().wait().is_ok());
    }

    #[test]
    fn test_pending_fence_blocks_until_signalled() {
        let (signal, fence) = Fence::pending();
        let signalled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&signalled);
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
            signal.signal(Ok(()));
        });

        let started = Instant::now();
        fence.wait().unwrap();
        assert!(
            signalled.load(Ordering::SeqCst),
            "wait returned before the completion signal"
        );
        assert!(started.elapsed() >= Duration::from_millis(50));
        worker.join().unwrap();
    }

    #[test]
    fn test_fence_dropped_signal_is_an_error() {
        let (signal, fence) = Fence::pending();
        drop(signal);
        let err = fence.wait().unwrap_err();
        assert!(matches!(err, MembraneError::ComputeSurface { .. }), "{err}");
    }

    #[test]
    fn test_fence_propagates_failure() {
        let (signal, fence) = Fence::pending();
        signal.signal(Err(MembraneError::compute("kernel fault")));
        assert!(fence.wait().unwrap_err().to_string().contains("kernel fault"));
    }

    #[test]
    fn test_parallel_matches_serial() {
        for boundary in [BoundaryMode::Clamped, BoundaryMode::Free] {
            let mut a = seeded_grid(boundary);
            let mut b = seeded_grid(boundary);
            let u = uniforms(1.0, boundary.gain());

            let mut serial = SerialSurface;
            let mut parallel = RayonSurface::new(Some(3)).unwrap();
            serial
                .dispatch(a.update_pass(), &LeapfrogKernel, &u)
                .unwrap()
                .wait()
                .unwrap();
            parallel
                .dispatch(b.update_pass(), &LeapfrogKernel, &u)
                .unwrap()
                .wait()
                .unwrap();

            assert_eq!(
                a.layer_values(Layer::One),
                b.layer_values(Layer::One),
                "serial and parallel updates must agree ({boundary:?})"
            );
        }
    }

    #[test]
    fn test_dispatch_leaves_settled_layer_untouched() {
        let mut grid = seeded_grid(BoundaryMode::Clamped);
        let before = grid.layer_values(Layer::Zero).to_vec();
        SerialSurface
            .dispatch(grid.update_pass(), &LeapfrogKernel, &uniforms(1.0, 1.0))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(grid.layer_values(Layer::Zero), before.as_slice());
    }

    #[test]
    fn test_free_edges_copy_interior() {
        let mut grid = seeded_grid(BoundaryMode::Free);
        SerialSurface
            .dispatch(grid.update_pass(), &LeapfrogKernel, &uniforms(0.0, 0.0))
            .unwrap()
            .wait()
            .unwrap();
        let w = grid.width();
        let h = grid.height();
        for y in 1..h - 1 {
            assert_eq!(grid.read(Layer::One, 0, y), grid.read(Layer::One, 1, y));
            assert_eq!(grid.read(Layer::One, w - 1, y), grid.read(Layer::One, w - 2, y));
        }
        for x in 1..w - 1 {
            assert_eq!(grid.read(Layer::One, x, 0), grid.read(Layer::One, x, 1));
            assert_eq!(grid.read(Layer::One, x, h - 1), grid.read(Layer::One, x, h - 2));
        }
        assert_eq!(grid.read(Layer::One, 0, 0), 0.0, "corners stay at zero");
    }

    #[test]
    fn test_build_surface() {
        assert_eq!(build_surface(ComputeBackend::Serial, None).unwrap().name(), "serial");
        let parallel = build_surface(ComputeBackend::Parallel, Some(2)).unwrap();
        assert_eq!(parallel.name(), "parallel");
    }
}
