//! Per-cell update rule, injected into the stepper as a strategy.
//!
//! A kernel sees one cell's stencil and the uniform scalars of the current
//! tick and returns the cell's next value. It never touches the grid
//! itself, so it can be tested without any compute surface.

/// Values around one interior cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stencil {
    /// Settled value at the cell (time n).
    pub cur: f32,
    /// Older value at the cell (time n-1), about to be overwritten.
    pub prev: f32,
    pub north: f32,
    pub south: f32,
    pub east: f32,
    pub west: f32,
    /// Excitation mask weight of the cell (1 at the excitation site).
    pub excitation: f32,
}

impl Stencil {
    /// Discrete Laplacian: Σ4-neighbors − 4·cur.
    #[inline(always)]
    pub fn laplacian(&self) -> f32 {
        self.north + self.south + self.east + self.west - 4.0 * self.cur
    }
}

/// Scalars shared by every cell during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelUniforms {
    /// λ, the neighbour-coupling coefficient (squared Courant number).
    pub propagation_factor: f32,
    /// Fraction of the updated value removed each tick.
    pub damping_factor: f32,
    /// 0 for a free edge, 1 for a clamped edge.
    pub boundary_gain: f32,
    /// Amplitude injected at the excitation site this tick.
    pub excitation_magnitude: f32,
}

/// Numeric update rule for the membrane.
pub trait UpdateKernel: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Next value of an interior cell.
    fn interior(&self, stencil: &Stencil, uniforms: &KernelUniforms) -> f32;

    /// Next value of an edge cell from the freshly updated interior cell
    /// next to it: `(1 − g) · adjacent`.
    ///
    /// A clamped edge (g = 1) is always zero; a free edge (g = 0) copies its
    /// neighbour.
    fn boundary(&self, adjacent: f32, uniforms: &KernelUniforms) -> f32 {
        if uniforms.boundary_gain >= 1.0 {
            // Exact zero even if the neighbour has diverged.
            return 0.0;
        }
        (1.0 - uniforms.boundary_gain) * adjacent
    }
}

/// Explicit 2D wave-equation leapfrog scheme:
///
/// `next = (1 − d)·[2·cur − prev + λ·∇²cur] + m·excitation`
#[derive(Debug, Clone, Copy, Default)]
pub struct LeapfrogKernel;

impl UpdateKernel for LeapfrogKernel {
    fn name(&self) -> &str {
        "leapfrog"
    }

    #[inline]
    fn interior(&self, s: &Stencil, u: &KernelUniforms) -> f32 {
        let wave = 2.0 * s.cur - s.prev + u.propagation_factor * s.laplacian();
        (1.0 - u.damping_factor) * wave + u.excitation_magnitude * s.excitation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniforms(lambda: f32, damping: f32, gain: f32, magnitude: f32) -> KernelUniforms {
        KernelUniforms {
            propagation_factor: lambda,
            damping_factor: damping,
            boundary_gain: gain,
            excitation_magnitude: magnitude,
        }
    }

    #[test]
    fn test_leapfrog_at_rest_stays_at_rest() {
        let k = LeapfrogKernel;
        let next = k.interior(&Stencil::default(), &uniforms(0.3, 0.01, 1.0, 0.0));
        assert_eq!(next, 0.0);
    }

    #[test]
    fn test_leapfrog_excitation_only_at_site() {
        let k = LeapfrogKernel;
        let u = uniforms(0.25, 0.0, 1.0, 1.0);
        let site = Stencil {
            excitation: 1.0,
            ..Default::default()
        };
        assert_eq!(k.interior(&site, &u), 1.0);
        assert_eq!(k.interior(&Stencil::default(), &u), 0.0);
    }

    #[test]
    fn test_leapfrog_neighbour_coupling() {
        // A single neighbour at 1 pulls a resting cell up by λ.
        let k = LeapfrogKernel;
        let s = Stencil {
            east: 1.0,
            ..Default::default()
        };
        let next = k.interior(&s, &uniforms(0.25, 0.0, 1.0, 0.0));
        assert!((next - 0.25).abs() < 1e-7, "next = {next}");
    }

    #[test]
    fn test_leapfrog_recurrence_with_history() {
        // cur = 1, prev = 0, neighbours 0: 2·1 − 0 + λ·(−4) = 1 at λ = 0.25.
        let k = LeapfrogKernel;
        let s = Stencil {
            cur: 1.0,
            ..Default::default()
        };
        assert!((k.interior(&s, &uniforms(0.25, 0.0, 1.0, 0.0)) - 1.0).abs() < 1e-7);

        // Damping scales the wave term but not the injected amplitude.
        let s = Stencil {
            cur: 1.0,
            excitation: 1.0,
            ..Default::default()
        };
        let next = k.interior(&s, &uniforms(0.25, 0.5, 1.0, 2.0));
        assert!((next - 2.5).abs() < 1e-7, "next = {next}");
    }

    #[test]
    fn test_boundary_regimes() {
        let k = LeapfrogKernel;
        assert_eq!(k.boundary(0.7, &uniforms(0.3, 0.0, 1.0, 0.0)), 0.0);
        assert_eq!(k.boundary(0.7, &uniforms(0.3, 0.0, 0.0, 0.0)), 0.7);
        assert_eq!(k.boundary(f32::INFINITY, &uniforms(0.3, 0.0, 1.0, 0.0)), 0.0);
    }
}
