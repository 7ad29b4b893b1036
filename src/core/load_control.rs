//! Buffering policy wrapper for trick-play.
//!
//! Seek pacing jumps backwards a lot, so while any trick mode is active we
//! keep a large back buffer. Start/continue decisions are made as if playing
//! at 1x: the delegate's speed scaling would otherwise demand huge buffers.

use crate::core::mode::{TrickMode, TrickModeSource};
use std::sync::Arc;

/// Engine-side buffering decisions.
pub trait LoadControl: Send {
    fn on_prepared(&mut self) {}
    fn on_stopped(&mut self) {}
    fn on_released(&mut self) {}
    fn back_buffer_duration_us(&self) -> i64;
    fn retain_back_buffer_from_keyframe(&self) -> bool;
    fn should_continue_loading(&self, buffered_duration_us: i64, playback_speed: f32) -> bool;
    fn should_start_playback(&self, buffered_duration_us: i64, playback_speed: f32, rebuffering: bool) -> bool;
}

/// Plain threshold load control.
#[derive(Debug, Clone)]
pub struct DefaultLoadControl {
    pub min_buffer_us: i64,
    pub max_buffer_us: i64,
    pub buffer_for_playback_us: i64,
    pub buffer_for_rebuffer_us: i64,
    pub back_buffer_us: i64,
}

impl Default for DefaultLoadControl {
    fn default() -> Self {
        Self {
            min_buffer_us: 15_000_000,
            max_buffer_us: 50_000_000,
            buffer_for_playback_us: 2_500_000,
            buffer_for_rebuffer_us: 5_000_000,
            back_buffer_us: 0,
        }
    }
}

impl LoadControl for DefaultLoadControl {
    fn back_buffer_duration_us(&self) -> i64 {
        self.back_buffer_us
    }

    fn retain_back_buffer_from_keyframe(&self) -> bool {
        false
    }

    fn should_continue_loading(&self, buffered_duration_us: i64, playback_speed: f32) -> bool {
        let min_us = (self.min_buffer_us as f64 * f64::from(playback_speed.max(1.0))) as i64;
        buffered_duration_us < min_us.min(self.max_buffer_us)
    }

    fn should_start_playback(&self, buffered_duration_us: i64, playback_speed: f32, rebuffering: bool) -> bool {
        let target = if rebuffering {
            self.buffer_for_rebuffer_us
        } else {
            self.buffer_for_playback_us
        };
        let target = (target as f64 * f64::from(playback_speed.max(1.0))) as i64;
        buffered_duration_us >= target
    }
}

pub struct TrickPlayLoadControl<L: LoadControl> {
    delegate: L,
    modes: Arc<dyn TrickModeSource>,
    trick_back_buffer_us: i64,
}

impl<L: LoadControl> TrickPlayLoadControl<L> {
    pub fn new(delegate: L, modes: Arc<dyn TrickModeSource>, trick_back_buffer_us: i64) -> Self {
        Self {
            delegate,
            modes,
            trick_back_buffer_us,
        }
    }

    pub fn delegate(&self) -> &L {
        &self.delegate
    }
}

impl<L: LoadControl> LoadControl for TrickPlayLoadControl<L> {
    fn on_prepared(&mut self) {
        self.delegate.on_prepared();
    }

    fn on_stopped(&mut self) {
        self.delegate.on_stopped();
    }

    fn on_released(&mut self) {
        self.delegate.on_released();
    }

    fn back_buffer_duration_us(&self) -> i64 {
        match self.modes.current_trick_mode() {
            TrickMode::Normal => self.delegate.back_buffer_duration_us(),
            _ => self.trick_back_buffer_us,
        }
    }

    fn retain_back_buffer_from_keyframe(&self) -> bool {
        self.delegate.retain_back_buffer_from_keyframe()
    }

    fn should_continue_loading(&self, buffered_duration_us: i64, _playback_speed: f32) -> bool {
        self.delegate.should_continue_loading(buffered_duration_us, 1.0)
    }

    fn should_start_playback(&self, buffered_duration_us: i64, _playback_speed: f32, rebuffering: bool) -> bool {
        self.delegate.should_start_playback(buffered_duration_us, 1.0, rebuffering)
    }
}
