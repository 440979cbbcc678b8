//! Listener readout and the per-batch capture buffer.

use crate::constants::PCM_SCALE;
use crate::error::{MembraneError, Result};
use crate::grid::{Cell, GridState};
use crate::stepper::SettledGrid;

/// Convert a normalized pressure to 16-bit PCM.
///
/// Truncates toward zero through a 32-bit integer; values beyond ±1 wrap
/// instead of saturating.
#[inline]
pub fn to_pcm16(value: f32) -> i16 {
    (value * PCM_SCALE) as i32 as i16
}

/// Reads the pressure at a fixed listener cell once per tick.
#[derive(Debug, Clone, Copy)]
pub struct AudioSampler {
    listener: Cell,
}

impl AudioSampler {
    /// The listener may sit on an edge cell but must lie inside the domain.
    pub fn new(listener: Cell, grid: &GridState) -> Result<Self> {
        if !grid.contains(listener) {
            return Err(MembraneError::InvalidCell {
                x: listener.x,
                y: listener.y,
                width: grid.width(),
                height: grid.height(),
                reason: "listener must lie inside the domain",
            });
        }
        Ok(Self { listener })
    }

    pub fn listener(&self) -> Cell {
        self.listener
    }

    /// Sample the listener in the layer finalized by the previous update.
    ///
    /// A firing is therefore heard one tick after the update that injects it.
    pub fn sample_once(&self, settled: &SettledGrid<'_>) -> i16 {
        to_pcm16(settled.finalized_pressure(self.listener))
    }
}

/// Fixed-capacity store for one batch of samples.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    samples: Vec<i16>,
    cursor: usize,
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity],
            cursor: 0,
        }
    }

    /// Write one sample at the cursor and advance it.
    pub fn deposit(&mut self, sample: i16) -> Result<()> {
        let capacity = self.samples.len();
        let slot = self
            .samples
            .get_mut(self.cursor)
            .ok_or(MembraneError::CaptureOverflow { capacity })?;
        *slot = sample;
        self.cursor += 1;
        Ok(())
    }

    /// Read back the samples deposited since the last retrieval and rewind.
    pub fn retrieve(&mut self) -> &[i16] {
        let filled = self.cursor;
        self.cursor = 0;
        &self.samples[..filled]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }
}
