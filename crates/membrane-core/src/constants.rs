use std::time::Duration;

/// Full-scale multiplier from normalized pressure to 16-bit PCM.
pub const PCM_SCALE: f32 = 32767.0;

/// Largest propagation factor (squared Courant number) for which the
/// explicit 2D leapfrog scheme stays stable: λ ≤ 1/2.
pub const MAX_PROPAGATION_FACTOR: f32 = 0.5;

/// Smallest usable domain edge: one interior cell between two boundary cells.
pub const MIN_DOMAIN_EDGE: usize = 3;

/// Ticks between excitation firings, `sample_rate / excitation_frequency`
/// (integer division, as the excitation counter only ever sees whole ticks).
pub fn excitation_period(sample_rate: u32, excitation_frequency: u32) -> u32 {
    if excitation_frequency == 0 {
        return 0;
    }
    sample_rate / excitation_frequency
}

/// Wall-clock length of one batch of `batch_size` samples.
pub fn batch_duration(batch_size: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(batch_size as f64 / sample_rate.max(1) as f64)
}
