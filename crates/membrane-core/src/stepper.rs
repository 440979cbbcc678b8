//! Tick-by-tick advance of the grid with explicit settle ordering.
//!
//! Every tick has two phases:
//!
//! 1. **Update**: the compute surface reads the settled layer and overwrites
//!    the older layer with the next time step.
//! 2. **Settle**: the update's fence is awaited, parity flips, and only then
//!    may the freshly written layer be read.
//!
//! The ordering is carried by the types. [`SimulationStepper::advance`]
//! returns a [`PendingTick`] that holds the grid exclusively; the only way
//! to get a readable [`SettledGrid`] back is [`PendingTick::wait`].

use tracing::trace;

use crate::error::Result;
use crate::grid::{Cell, GridState, Layer};
use crate::kernel::{KernelUniforms, LeapfrogKernel, UpdateKernel};
use crate::surface::{build_surface, ComputeSurface, Fence};
use crate::MembraneParams;

/// Advances a [`GridState`] one sample tick at a time.
pub struct SimulationStepper {
    kernel: Box<dyn UpdateKernel>,
    surface: Box<dyn ComputeSurface>,
    propagation_factor: f32,
    damping_factor: f32,
    ticks: u64,
}

/// An update that has been dispatched but not yet confirmed complete.
#[must_use = "call wait() before reading the grid or advancing again"]
pub struct PendingTick<'g> {
    grid: &'g mut GridState,
    fence: Fence,
}

/// Read-only view of a grid whose last update has completed.
pub struct SettledGrid<'g> {
    grid: &'g GridState,
}

impl SimulationStepper {
    pub fn new(
        kernel: Box<dyn UpdateKernel>,
        surface: Box<dyn ComputeSurface>,
        propagation_factor: f32,
        damping_factor: f32,
    ) -> Self {
        Self {
            kernel,
            surface,
            propagation_factor,
            damping_factor,
            ticks: 0,
        }
    }

    /// Leapfrog kernel on the configured compute surface.
    pub fn from_params(params: &MembraneParams) -> Result<Self> {
        Self::with_kernel(params, Box::new(LeapfrogKernel))
    }

    /// Custom kernel on the configured compute surface.
    pub fn with_kernel(params: &MembraneParams, kernel: Box<dyn UpdateKernel>) -> Result<Self> {
        let surface = build_surface(params.compute, params.threads)?;
        Ok(Self::new(
            kernel,
            surface,
            params.propagation_factor,
            params.damping_factor,
        ))
    }

    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }

    pub fn surface_name(&self) -> &str {
        self.surface.name()
    }

    /// Number of completed dispatches.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Dispatch the update for one tick.
    pub fn advance<'g>(
        &mut self,
        grid: &'g mut GridState,
        excitation_magnitude: f32,
    ) -> Result<PendingTick<'g>> {
        let uniforms = KernelUniforms {
            propagation_factor: self.propagation_factor,
            damping_factor: self.damping_factor,
            boundary_gain: grid.boundary().gain(),
            excitation_magnitude,
        };
        let fence = self
            .surface
            .dispatch(grid.update_pass(), self.kernel.as_ref(), &uniforms)?;
        self.ticks += 1;
        if excitation_magnitude != 0.0 {
            trace!(tick = self.ticks, excitation_magnitude, "excitation fired");
        }
        Ok(PendingTick { grid, fence })
    }

    /// Discrete energy of the two-layer scheme.
    ///
    /// With `a = 1 − d`, `cur` the settled layer and `prev` the other one:
    /// `E = Σcur² + a·Σprev² − a·⟨cur, (2I + λ∇²)prev⟩` over interior cells.
    /// Without excitation, `E` is unchanged by a tick when `d = 0` and is
    /// multiplied by exactly `a` otherwise (clamped edges).
    pub fn wave_energy(&self, grid: &GridState) -> f64 {
        let cur_layer = grid.settled_layer();
        let cur = grid.layer_values(cur_layer);
        let prev = grid.layer_values(cur_layer.other());
        let width = grid.width();
        let a = 1.0 - self.damping_factor as f64;
        let lambda = self.propagation_factor as f64;

        let mut cur_sq = 0.0;
        let mut prev_sq = 0.0;
        let mut coupling = 0.0;
        for y in 1..grid.height() - 1 {
            for x in 1..width - 1 {
                let idx = y * width + x;
                let c = cur[idx] as f64;
                let p = prev[idx] as f64;
                let lap = prev[idx - width] as f64
                    + prev[idx + width] as f64
                    + prev[idx - 1] as f64
                    + prev[idx + 1] as f64
                    - 4.0 * p;
                cur_sq += c * c;
                prev_sq += p * p;
                coupling += c * (2.0 * p + lambda * lap);
            }
        }
        cur_sq + a * prev_sq - a * coupling
    }
}

impl<'g> PendingTick<'g> {
    /// Wait for the update to complete, flip parity, and hand out the
    /// settled view.
    pub fn wait(self) -> Result<SettledGrid<'g>> {
        self.fence.wait()?;
        let grid = self.grid;
        grid.flip_parity();
        Ok(SettledGrid { grid })
    }
}

impl SettledGrid<'_> {
    /// Pressure at `cell` in the layer this tick just wrote.
    pub fn pressure(&self, cell: Cell) -> f32 {
        self.grid.read(self.grid.settled_layer(), cell.x, cell.y)
    }

    /// Pressure at `cell` in the layer finalized by the previous update.
    ///
    /// Audio is read here, never from the layer written in the same tick.
    pub fn finalized_pressure(&self, cell: Cell) -> f32 {
        self.grid.read(self.grid.settled_layer().other(), cell.x, cell.y)
    }

    pub fn layer(&self) -> Layer {
        self.grid.settled_layer()
    }

    /// Whole settled field, row-major.
    pub fn field(&self) -> &[f32] {
        self.grid.layer_values(self.grid.settled_layer())
    }

    pub fn grid(&self) -> &GridState {
        self.grid
    }
}
