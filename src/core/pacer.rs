//! Seek pacing: trick-play by repeated discrete seeks.
//!
//! Used when the engine cannot produce the mode natively (reverse, or no
//! iframe track for high speed forward). A [`ReversibleClock`] tracks where
//! the viewer "should" be; every tick seeks there. The cadence aims at the
//! target frame rate and backs off when renders stop arriving:
//!
//! - tick: seek to the clock (clamped to the seekable window) and reschedule,
//!   but only while the minimum frame rate is met; otherwise park
//! - frame rendered: remember the render time; a parked pacer resumes with an
//!   immediate catch-up seek
//! - seek processed: if the engine landed elsewhere (sync frame snapping),
//!   rebase the clock so the next seek advances from where we really are
//!
//! The boundary check that force-exits trick-play runs before [`SeekPacer::on_tick`]
//! and belongs to the controller; the pacer only seeks.

use crate::core::clock::ReversibleClock;
use crate::core::engine::{PlaybackEngine, SeekMode};
use log::{debug, trace};
use std::sync::Arc;
use std::time::Duration;

/// Where pacer ticks go. The controller posts them to the playback looper.
pub trait TickScheduler: Send {
    /// Run one tick after `delay`.
    fn schedule_tick(&mut self, delay: Duration);
    /// Drop every tick not yet run. Later ticks from this scheduler must do nothing.
    fn cancel_all(&mut self);
}

/// Target and floor frame intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacerTiming {
    pub target_interval: Duration,
    pub min_interval: Duration,
}

impl PacerTiming {
    pub fn from_fps(target_fps: u32, min_fps: u32) -> Self {
        Self {
            target_interval: Duration::from_millis(1000 / u64::from(target_fps.max(1))),
            min_interval: Duration::from_millis(1000 / u64::from(min_fps.max(1))),
        }
    }
}

impl Default for PacerTiming {
    fn default() -> Self {
        Self::from_fps(3, 1)
    }
}

pub struct SeekPacer {
    clock: ReversibleClock,
    engine: Arc<dyn PlaybackEngine>,
    scheduler: Box<dyn TickScheduler>,
    timing: PacerTiming,
    seek_target_ms: Option<i64>,
    last_render_ms: Option<i64>,
    tick_pending: bool,
    seek_in_flight: bool,
    active: bool,
}

impl SeekPacer {
    pub fn new(
        clock: ReversibleClock,
        engine: Arc<dyn PlaybackEngine>,
        scheduler: Box<dyn TickScheduler>,
        timing: PacerTiming,
    ) -> Self {
        Self {
            clock,
            engine,
            scheduler,
            timing,
            seek_target_ms: None,
            last_render_ms: None,
            tick_pending: false,
            seek_in_flight: false,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// No tick scheduled: the minimum frame rate was missed and the pacer
    /// waits for the next render.
    pub fn is_parked(&self) -> bool {
        self.active && !self.tick_pending
    }

    pub fn seek_target_ms(&self) -> Option<i64> {
        self.seek_target_ms
    }

    pub fn clock(&self) -> &ReversibleClock {
        &self.clock
    }

    /// Switch to sync-frame seeking, seek to the clock and schedule the first tick.
    pub fn start(&mut self) {
        self.active = true;
        self.engine.set_seek_mode(SeekMode::ClosestSync);
        let target = self.clock.position_us() / 1000;
        debug!("Seek pacing start at {} ms, clock {:?}", target, self.clock);
        self.seek(target);
        self.schedule();
    }

    pub fn on_tick(&mut self) {
        self.tick_pending = false;
        if !self.active {
            return;
        }
        let since_render = self.since_last_render_ms();
        let min_rate_met = since_render.is_none_or(|ms| ms <= self.min_interval_ms());

        let target = self.clamped_clock_ms();
        trace!(
            "Pacer tick: position {} target {} since render {:?} min rate met {}",
            self.engine.current_position_ms(),
            target,
            since_render,
            min_rate_met
        );

        if min_rate_met {
            self.seek(target);
            self.schedule();
        } else {
            debug!("Pacer parked, no render for {:?} ms", since_render);
        }
    }

    pub fn on_frame_rendered(&mut self, presentation_time_us: i64) {
        if !self.active {
            return;
        }
        self.last_render_ms = Some(self.now_ms());
        trace!("Pacer render at {} us, tick pending {}", presentation_time_us, self.tick_pending);

        // Parked: render arrived late, catch up right away
        if !self.tick_pending {
            if self.seek_in_flight {
                return;
            }
            let target = self.clamped_clock_ms();
            self.seek(target);
            self.schedule();
        }
    }

    pub fn on_seek_started(&mut self) {
        if self.active {
            self.seek_in_flight = true;
        }
    }

    pub fn on_seek_processed(&mut self, landed_ms: i64) {
        self.seek_in_flight = false;
        if !self.active {
            return;
        }
        if self.seek_target_ms != Some(landed_ms) {
            trace!(
                "Seek landed at {} ms, requested {:?}, rebasing clock",
                landed_ms, self.seek_target_ms
            );
            self.clock.reset_position(landed_ms * 1000);
        }
    }

    /// Cancel all scheduled work. No seek is issued after this returns.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.tick_pending = false;
        self.scheduler.cancel_all();
        debug!("Seek pacing stopped, last target {:?}", self.seek_target_ms);
    }

    fn seek(&mut self, target_ms: i64) {
        self.seek_target_ms = Some(target_ms);
        self.engine.seek_to(target_ms);
    }

    fn schedule(&mut self) {
        self.tick_pending = true;
        self.scheduler.schedule_tick(self.timing.target_interval);
    }

    fn clamped_clock_ms(&self) -> i64 {
        let clock_ms = self.clock.position_us() / 1000;
        match self.engine.current_window().and_then(|w| w.last_seekable_position_ms()) {
            Some(limit) => clock_ms.min(limit),
            None => clock_ms,
        }
    }

    fn now_ms(&self) -> i64 {
        self.clock.time_source().elapsed_realtime_ms()
    }

    fn since_last_render_ms(&self) -> Option<i64> {
        self.last_render_ms.map(|at| self.now_ms() - at)
    }

    fn min_interval_ms(&self) -> i64 {
        i64::try_from(self.timing.min_interval.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Drop for SeekPacer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SeekPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeekPacer")
            .field("active", &self.active)
            .field("tick_pending", &self.tick_pending)
            .field("seek_in_flight", &self.seek_in_flight)
            .field("seek_target_ms", &self.seek_target_ms)
            .field("last_render_ms", &self.last_render_ms)
            .field("clock", &self.clock)
            .finish()
    }
}
