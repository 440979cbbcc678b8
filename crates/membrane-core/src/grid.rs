//! Two-layer pressure field and its static cell masks.
//!
//! Both layers are flat row-major `width * height` arrays. A parity bit
//! selects the *settled* layer, the one fully written by the last completed
//! update. The other layer holds the field finalized one update earlier:
//! it is what the listener reads, and it is the one the next update
//! overwrites.

use serde::{Deserialize, Serialize};

use crate::constants::MIN_DOMAIN_EDGE;
use crate::error::{MembraneError, Result};

/// Grid cell coordinate, `x` along the width and `y` along the height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// One of the two pressure layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Zero,
    One,
}

impl Layer {
    /// The layer opposite this one.
    pub fn other(self) -> Self {
        match self {
            Layer::Zero => Layer::One,
            Layer::One => Layer::Zero,
        }
    }

    fn index(self) -> usize {
        match self {
            Layer::Zero => 0,
            Layer::One => 1,
        }
    }
}

/// How non-interior cells behave.
///
/// Only the two endpoints of the boundary gain are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryMode {
    /// Gain 0: edge cells mirror the adjacent interior cell (zero normal
    /// gradient), waves reflect without inversion.
    Free,
    /// Gain 1: edge cells are held at zero, waves reflect inverted.
    #[default]
    Clamped,
}

impl BoundaryMode {
    /// Select the boundary regime from a gain value; only 0 and 1 are valid.
    pub fn from_gain(gain: f32) -> Result<Self> {
        if gain == 0.0 {
            Ok(BoundaryMode::Free)
        } else if gain == 1.0 {
            Ok(BoundaryMode::Clamped)
        } else {
            Err(MembraneError::invalid_param(
                "boundary_gain",
                format!("{gain} is not supported, use 0 (free) or 1 (clamped)"),
            ))
        }
    }

    pub fn gain(self) -> f32 {
        match self {
            BoundaryMode::Free => 0.0,
            BoundaryMode::Clamped => 1.0,
        }
    }
}

/// A non-interior cell and the interior cell it takes its value from
/// (`None` for corners, which touch no interior cell).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryLink {
    pub cell: usize,
    pub adjacent: Option<usize>,
}

/// Split borrow of the grid handed to a compute surface for one update.
///
/// `settled` is read-only, `target` holds the older layer and receives the
/// new values. The masks are shared and never written during a pass.
pub struct UpdatePass<'a> {
    pub width: usize,
    pub height: usize,
    pub settled: &'a [f32],
    pub target: &'a mut [f32],
    pub interior: &'a [bool],
    pub excitation: &'a [f32],
    pub boundary: &'a [BoundaryLink],
}

/// Double-buffered pressure field plus interior and excitation masks.
pub struct GridState {
    width: usize,
    height: usize,
    layers: [Vec<f32>; 2],
    /// Layer holding the most recently completed update.
    settled: Layer,
    interior: Vec<bool>,
    excitation: Vec<f32>,
    excitation_cell: Option<Cell>,
    boundary_links: Vec<BoundaryLink>,
    boundary: BoundaryMode,
}

impl GridState {
    /// Create a zeroed grid and build its interior mask.
    ///
    /// The outermost ring of cells is non-interior. Either dimension below
    /// three leaves no interior and is rejected.
    pub fn new(width: usize, height: usize, boundary: BoundaryMode) -> Result<Self> {
        if width < MIN_DOMAIN_EDGE || height < MIN_DOMAIN_EDGE {
            return Err(MembraneError::InvalidDomain { width, height });
        }
        let size = width * height;

        let mut interior = vec![false; size];
        let mut boundary_links = Vec::with_capacity(2 * (width + height));
        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                let edge_x = x == 0 || x == width - 1;
                let edge_y = y == 0 || y == height - 1;
                if !edge_x && !edge_y {
                    interior[idx] = true;
                    continue;
                }
                let adjacent = if edge_x && edge_y {
                    None
                } else {
                    let ax = x.clamp(1, width - 2);
                    let ay = y.clamp(1, height - 2);
                    Some(ay * width + ax)
                };
                boundary_links.push(BoundaryLink {
                    cell: idx,
                    adjacent,
                });
            }
        }

        Ok(Self {
            width,
            height,
            layers: [vec![0.0; size], vec![0.0; size]],
            settled: Layer::Zero,
            interior,
            excitation: vec![0.0; size],
            excitation_cell: None,
            boundary_links,
            boundary,
        })
    }

    #[inline(always)]
    fn idx(&self, cell: Cell) -> usize {
        cell.y * self.width + cell.x
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn boundary(&self) -> BoundaryMode {
        self.boundary
    }

    /// Layer holding the most recently completed update.
    pub fn settled_layer(&self) -> Layer {
        self.settled
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x < self.width && cell.y < self.height
    }

    pub fn is_interior(&self, cell: Cell) -> bool {
        self.contains(cell) && self.interior[self.idx(cell)]
    }

    /// Currently marked excitation site, if any.
    pub fn excitation_cell(&self) -> Option<Cell> {
        self.excitation_cell
    }

    /// Mark `cell` as the single excitation site, clearing the previous one.
    pub fn set_excitation(&mut self, cell: Cell) -> Result<()> {
        if !self.is_interior(cell) {
            return Err(MembraneError::InvalidCell {
                x: cell.x,
                y: cell.y,
                width: self.width,
                height: self.height,
                reason: "excitation must be an interior cell",
            });
        }
        if let Some(previous) = self.excitation_cell.take() {
            let idx = self.idx(previous);
            self.excitation[idx] = 0.0;
        }
        let idx = self.idx(cell);
        self.excitation[idx] = 1.0;
        self.excitation_cell = Some(cell);
        Ok(())
    }

    /// Interior cell under normalized domain coordinates `(x, y) ∈ [0, 1]²`.
    ///
    /// Out-of-range coordinates are clamped onto the interior.
    pub fn cell_at(&self, position: [f32; 2]) -> Cell {
        let to_index = |v: f32, len: usize| -> usize {
            let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
            ((v * len as f32) as usize).clamp(1, len - 2)
        };
        Cell::new(
            to_index(position[0], self.width),
            to_index(position[1], self.height),
        )
    }

    /// Read one cell of a layer.
    ///
    /// # Panics
    /// If `x` or `y` is outside the grid.
    #[inline]
    pub fn read(&self, layer: Layer, x: usize, y: usize) -> f32 {
        assert!(x < self.width && y < self.height, "cell ({x}, {y}) out of bounds");
        self.layers[layer.index()][y * self.width + x]
    }

    /// Write one cell of a layer.
    ///
    /// # Panics
    /// If `x` or `y` is outside the grid.
    #[inline]
    pub fn write(&mut self, layer: Layer, x: usize, y: usize, value: f32) {
        assert!(x < self.width && y < self.height, "cell ({x}, {y}) out of bounds");
        self.layers[layer.index()][y * self.width + x] = value;
    }

    /// Whole layer, row-major, for visualization and diagnostics.
    pub fn layer_values(&self, layer: Layer) -> &[f32] {
        &self.layers[layer.index()]
    }

    /// Sum of squared pressure over interior cells of `layer`.
    pub fn total_squared_pressure(&self, layer: Layer) -> f64 {
        self.layers[layer.index()]
            .iter()
            .zip(&self.interior)
            .filter(|(_, &inside)| inside)
            .map(|(&p, _)| (p as f64) * (p as f64))
            .sum()
    }

    /// Largest absolute pressure anywhere in `layer`.
    pub fn max_abs_pressure(&self, layer: Layer) -> f32 {
        self.layers[layer.index()]
            .iter()
            .map(|p| p.abs())
            .fold(0.0, f32::max)
    }

    /// Borrow the settled layer for reading and the other layer for writing.
    pub(crate) fn update_pass(&mut self) -> UpdatePass<'_> {
        let (first, second) = self.layers.split_at_mut(1);
        let (settled, target) = match self.settled {
            Layer::Zero => (first[0].as_slice(), second[0].as_mut_slice()),
            Layer::One => (second[0].as_slice(), first[0].as_mut_slice()),
        };
        UpdatePass {
            width: self.width,
            height: self.height,
            settled,
            target,
            interior: &self.interior,
            excitation: &self.excitation,
            boundary: &self.boundary_links,
        }
    }

    /// Make the freshly written layer the settled one.
    ///
    /// Only called once the update that wrote it has signalled completion.
    pub(crate) fn flip_parity(&mut self) {
        self.settled = self.settled.other();
    }
}
