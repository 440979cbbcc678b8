//! Periodic excitation source and the cross-thread strike inbox.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::MembraneParams;

/// Whether the source keeps firing after the first strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExcitationMode {
    /// Fire once per period for the whole run.
    #[default]
    Continuous,
    /// Fire once, then stay silent until re-armed by a strike.
    SingleShot,
}

/// Counter-driven impulse source.
///
/// Every `period` ticks the next tick injects `max_excitation` at the
/// excitation site; all other ticks inject nothing.
#[derive(Debug, Clone)]
pub struct ExcitationController {
    /// Normalized strike position in `[0, 1]²`.
    position: [f32; 2],
    /// Amplitude injected on the current tick.
    magnitude: f32,
    /// Amplitude of the next firing; zeroed after a single-shot fires.
    max_excitation: f32,
    /// Configured amplitude restored by every strike.
    amplitude: f32,
    mode: ExcitationMode,
    period: u32,
    counter: u32,
}

impl ExcitationController {
    pub fn new(position: [f32; 2], amplitude: f32, period: u32, mode: ExcitationMode) -> Self {
        Self {
            position: clamp_position(position),
            magnitude: 0.0,
            max_excitation: amplitude,
            amplitude,
            mode,
            period,
            counter: 0,
        }
    }

    pub fn from_params(params: &MembraneParams) -> Self {
        Self::new(
            params.excitation_position,
            params.excitation_amplitude,
            params.excitation_period(),
            params.excitation_mode,
        )
    }

    /// Amplitude to inject on the current tick.
    pub fn magnitude(&self) -> f32 {
        self.magnitude
    }

    /// Advance the counter by one tick and decide the next tick's magnitude.
    pub fn tick(&mut self) {
        if self.period == 0 {
            self.magnitude = 0.0;
            return;
        }
        self.counter += 1;
        if self.counter == self.period {
            self.magnitude = self.max_excitation;
            self.counter = 0;
            if self.mode == ExcitationMode::SingleShot {
                self.max_excitation = 0.0;
            }
        } else {
            self.magnitude = 0.0;
        }
    }

    /// Move the strike position and re-arm the source.
    ///
    /// Re-arming restores the configured amplitude (`excitation_amplitude`,
    /// 1.0 unless configured otherwise) rather than a fixed 1.0. The firing
    /// counter keeps running, so the next strike lands on the existing
    /// cadence.
    pub fn set_excitation(&mut self, position: [f32; 2]) {
        self.position = clamp_position(position);
        self.max_excitation = self.amplitude;
    }

    pub fn position(&self) -> [f32; 2] {
        self.position
    }

    pub fn mode(&self) -> ExcitationMode {
        self.mode
    }

    /// Ticks between firings.
    pub fn period(&self) -> u32 {
        self.period
    }

    /// True while a firing is still pending (always true in continuous mode
    /// with a non-zero amplitude).
    pub fn is_armed(&self) -> bool {
        self.max_excitation != 0.0
    }
}

fn clamp_position(position: [f32; 2]) -> [f32; 2] {
    position.map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
}

/// Cloneable handle for posting strikes from other threads.
///
/// Holds at most one pending position; a newer post replaces an older one
/// that the tick loop has not drained yet. Draining an empty inbox is a
/// single atomic load and never touches the lock.
#[derive(Debug, Clone, Default)]
pub struct ExcitationTrigger {
    inbox: Arc<Inbox>,
}

#[derive(Debug, Default)]
struct Inbox {
    pending: AtomicBool,
    slot: Mutex<Option<[f32; 2]>>,
}

impl ExcitationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a strike at normalized `(x, y)`.
    pub fn set_excitation(&self, x: f32, y: f32) {
        let mut slot = self
            .inbox
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some([x, y]);
        self.inbox.pending.store(true, Ordering::Release);
    }

    /// True if a strike is waiting to be drained.
    pub fn is_pending(&self) -> bool {
        self.inbox.pending.load(Ordering::Acquire)
    }

    /// Drain the pending strike, if any.
    pub(crate) fn take(&self) -> Option<[f32; 2]> {
        if !self.inbox.pending.swap(false, Ordering::AcqRel) {
            return None;
        }
        self.inbox
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::excitation_period;

    /// Magnitudes seen on ticks `0..n`.
    fn fire_pattern(controller: &mut ExcitationController, n: usize) -> Vec<f32> {
        (0..n)
            .map(|_| {
                let m = controller.magnitude();
                controller.tick();
                m
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Firing cadence
    // -----------------------------------------------------------------------

    #[test]
    fn test_continuous_fires_every_period() {
        let period = excitation_period(100, 25);
        assert_eq!(period, 4);
        let mut c = ExcitationController::new([0.5, 0.5], 1.0, period, ExcitationMode::Continuous);
        let pattern = fire_pattern(&mut c, 17);
        let fired: Vec<usize> = pattern
            .iter()
            .enumerate()
            .filter(|(_, &m)| m != 0.0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fired, vec![4, 8, 12, 16], "pattern = {pattern:?}");
        assert!(pattern.iter().all(|&m| m == 0.0 || m == 1.0));
    }

    #[test]
    fn test_magnitude_zero_before_first_firing() {
        let c = ExcitationController::new([0.5, 0.5], 1.0, 4, ExcitationMode::Continuous);
        assert_eq!(c.magnitude(), 0.0);
    }

    #[test]
    fn test_single_shot_fires_once_until_rearmed() {
        let mut c = ExcitationController::new([0.5, 0.5], 0.8, 4, ExcitationMode::SingleShot);
        let pattern = fire_pattern(&mut c, 20);
        assert_eq!(pattern.iter().filter(|&&m| m != 0.0).count(), 1);
        assert_eq!(pattern[4], 0.8);
        assert!(!c.is_armed());

        c.set_excitation([0.2, 0.3]);
        assert!(c.is_armed());
        let pattern = fire_pattern(&mut c, 20);
        let fired: Vec<f32> = pattern.iter().copied().filter(|&m| m != 0.0).collect();
        assert_eq!(
            fired,
            vec![0.8],
            "a strike re-arms exactly one more firing at the configured amplitude"
        );
        assert_eq!(c.position(), [0.2, 0.3]);
    }

    #[test]
    fn test_zero_period_never_fires() {
        let mut c = ExcitationController::new([0.5, 0.5], 1.0, 0, ExcitationMode::Continuous);
        assert!(fire_pattern(&mut c, 50).iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_strike_position_is_clamped() {
        let mut c = ExcitationController::new([0.5, 0.5], 1.0, 4, ExcitationMode::Continuous);
        c.set_excitation([-1.0, 2.0]);
        assert_eq!(c.position(), [0.0, 1.0]);
        c.set_excitation([f32::NAN, 0.25]);
        assert_eq!(c.position(), [0.0, 0.25]);
    }

    // -----------------------------------------------------------------------
    // Trigger inbox
    // -----------------------------------------------------------------------

    #[test]
    fn test_trigger_last_writer_wins() {
        let trigger = ExcitationTrigger::new();
        let remote = trigger.clone();
        remote.set_excitation(0.1, 0.1);
        remote.set_excitation(0.9, 0.2);
        assert_eq!(trigger.take(), Some([0.9, 0.2]));
        assert_eq!(trigger.take(), None, "draining empties the slot");
    }

    #[test]
    fn test_idle_drain_does_not_wait_for_the_lock() {
        let trigger = ExcitationTrigger::new();
        let drainer = trigger.clone();

        // Hold the slot lock as a posting thread would; draining an empty
        // inbox must still return at once.
        let _guard = trigger.inbox.slot.lock().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(drainer.take());
        });
        let drained = rx
            .recv_timeout(std::time::Duration::from_secs(2))
            .expect("empty drain blocked on the slot lock");
        assert_eq!(drained, None);
    }

    #[test]
    fn test_pending_flag_tracks_slot() {
        let trigger = ExcitationTrigger::new();
        assert!(!trigger.is_pending());
        trigger.set_excitation(0.4, 0.6);
        assert!(trigger.is_pending());
        assert_eq!(trigger.take(), Some([0.4, 0.6]));
        assert!(!trigger.is_pending());
    }

    #[test]
    fn test_trigger_from_another_thread() {
        let trigger = ExcitationTrigger::new();
        let remote = trigger.clone();
        std::thread::spawn(move || remote.set_excitation(0.3, 0.7))
            .join()
            .unwrap();
        assert_eq!(trigger.take(), Some([0.3, 0.7]));
    }
}
