//! Wall-clock sources and the reversible media clock.
//!
//! The playback engine's own clock only runs forward. [`ReversibleClock`]
//! derives a virtual media position from elapsed wall time, a direction
//! and a speed, so seek pacing knows where playback "should" be.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Source of monotonic wall-clock time in milliseconds.
pub trait TimeSource: Send + Sync {
    fn elapsed_realtime_ms(&self) -> i64;
}

/// [`TimeSource`] backed by `Instant`, measured from construction.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn elapsed_realtime_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }
}

/// Manually advanced [`TimeSource`] for deterministic tests and simulation.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now_ms: AtomicI64,
}

impl ManualTimeSource {
    pub fn new(start_ms: i64) -> Self {
        Self { now_ms: AtomicI64::new(start_ms) }
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn elapsed_realtime_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Maps elapsed playout (wall) time to advanced media time at a speed.
///
/// Supplied by the playback engine, which may apply a non-linear curve
/// at high speeds.
pub trait SpeedMapping: Send + Sync {
    /// Media time in µs covered by `playout_ms` of wall time at `speed` (> 0).
    fn media_time_us_for_playout_ms(&self, speed: f32, playout_ms: i64) -> i64;
}

/// Plain `speed * elapsed` mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearSpeedMapping;

impl SpeedMapping for LinearSpeedMapping {
    fn media_time_us_for_playout_ms(&self, speed: f32, playout_ms: i64) -> i64 {
        (playout_ms as f64 * 1000.0 * f64::from(speed)).round() as i64
    }
}

/// Media clock that can run backwards.
///
/// Position is `base ± f(elapsed)`, never below zero.
pub struct ReversibleClock {
    is_forward: bool,
    speed: f32,
    base_us: i64,
    base_elapsed_ms: i64,
    time: Arc<dyn TimeSource>,
    mapping: Arc<dyn SpeedMapping>,
}

impl ReversibleClock {
    /// `speed` may be signed; only its magnitude is used, `is_forward` picks the sign.
    pub fn new(
        is_forward: bool,
        position_us: i64,
        speed: f32,
        time: Arc<dyn TimeSource>,
        mapping: Arc<dyn SpeedMapping>,
    ) -> Self {
        let base_elapsed_ms = time.elapsed_realtime_ms();
        Self {
            is_forward,
            speed: speed.abs(),
            base_us: position_us,
            base_elapsed_ms,
            time,
            mapping,
        }
    }

    pub fn is_forward(&self) -> bool {
        self.is_forward
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.time
    }

    /// Rebase to `position_us` at the current wall time.
    ///
    /// Used when a seek lands on a different frame than requested.
    pub fn reset_position(&mut self, position_us: i64) {
        self.base_elapsed_ms = self.time.elapsed_realtime_ms();
        self.base_us = position_us;
    }

    pub fn position_us(&self) -> i64 {
        let elapsed_ms = self.time.elapsed_realtime_ms() - self.base_elapsed_ms;
        let advanced_us = if self.speed == 1.0 {
            elapsed_ms * 1000
        } else {
            self.mapping.media_time_us_for_playout_ms(self.speed, elapsed_ms)
        };
        let position_us = if self.is_forward {
            self.base_us + advanced_us
        } else {
            self.base_us - advanced_us
        };
        position_us.max(0)
    }
}

impl std::fmt::Debug for ReversibleClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReversibleClock")
            .field("is_forward", &self.is_forward)
            .field("speed", &self.speed)
            .field("base_us", &self.base_us)
            .field("base_elapsed_ms", &self.base_elapsed_ms)
            .finish()
    }
}
