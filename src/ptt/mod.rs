//! Push-to-talk control
//!
//! - [`Mode`]: who owns the audio pipeline
//! - [`DwellTimer`]: minimum time a mode is held before the button is
//!   sampled again
//! - [`Clock`]: monotonic time base, swappable for simulation
//! - [`PushToTalkController`]: the polling state machine

pub mod controller;
pub mod stats;

#[cfg(test)]
pub(crate) mod mock;

pub use controller::{Direction, PushToTalkController};
pub use stats::RelayStats;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Owner of the audio pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Before the first button sample; never re-entered
    Idle,
    /// Microphone to link
    Transmitting,
    /// Link to speaker
    Receiving,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Idle => "idle",
            Mode::Transmitting => "transmitting",
            Mode::Receiving => "receiving",
        })
    }
}

/// Monotonic time source
pub trait Clock {
    /// Time since the clock's origin
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

/// Wall-clock time from a fixed `Instant`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually advanced clock; clones share the same time.
///
/// `sleep` advances the clock instead of blocking.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Elapsed time since the current mode was entered
#[derive(Debug, Clone, Copy)]
pub struct DwellTimer {
    entered_at: Duration,
    minimum: Duration,
}

impl DwellTimer {
    pub fn new(minimum: Duration) -> Self {
        Self {
            entered_at: Duration::ZERO,
            minimum,
        }
    }

    /// Re-anchor at mode entry
    pub fn reset(&mut self, now: Duration) {
        self.entered_at = now;
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.entered_at)
    }

    /// Whether the mode has been held for at least the minimum dwell
    pub fn is_satisfied(&self, now: Duration) -> bool {
        self.elapsed(now) >= self.minimum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dwell_timer() {
        let mut timer = DwellTimer::new(Duration::from_millis(1000));
        timer.reset(Duration::from_millis(500));

        assert!(!timer.is_satisfied(Duration::from_millis(1499)));
        assert!(timer.is_satisfied(Duration::from_millis(1500)));
        assert_eq!(timer.elapsed(Duration::from_millis(700)), Duration::from_millis(200));
        assert_eq!(timer.elapsed(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(5));
        other.sleep(Duration::from_millis(10));
        assert_eq!(clock.now(), Duration::from_millis(15));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now() >= a + Duration::from_millis(2));
    }
}
