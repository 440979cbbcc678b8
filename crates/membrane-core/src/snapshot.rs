//! PNG rendering of a pressure field.

use std::path::Path;

use image::{Rgba, RgbaImage};
use tracing::info;

use crate::error::Result;

/// Diverging colour for `t ∈ [-1, 1]`: blue for negative, white at zero,
/// red for positive.
fn diverging(t: f32) -> Rgba<u8> {
    let t = t.clamp(-1.0, 1.0);
    let fade = ((1.0 - t.abs()) * 255.0).round() as u8;
    if t >= 0.0 {
        Rgba([255, fade, fade, 255])
    } else {
        Rgba([fade, fade, 255, 255])
    }
}

/// Render a row-major `width × height` field, scaled by its peak magnitude.
///
/// Grid row 0 is drawn at the bottom of the image.
pub fn render_field(field: &[f32], width: usize, height: usize) -> RgbaImage {
    let peak = field
        .iter()
        .filter(|v| v.is_finite())
        .fold(0.0f32, |m, v| m.max(v.abs()));
    let scale = if peak > 0.0 { 1.0 / peak } else { 0.0 };

    RgbaImage::from_fn(width as u32, height as u32, |px, py| {
        let row = height - 1 - py as usize;
        let v = field.get(row * width + px as usize).copied().unwrap_or(0.0);
        diverging(if v.is_finite() { v * scale } else { 0.0 })
    })
}

/// Render a field and save it as PNG.
pub fn save_snapshot(
    path: impl AsRef<Path>,
    field: &[f32],
    width: usize,
    height: usize,
) -> Result<()> {
    let path = path.as_ref();
    render_field(field, width, height).save(path)?;
    info!(path = %path.display(), width, height, "wrote field snapshot");
    Ok(())
}
