//! Render-side frame rate limit for forward trick modes.
//!
//! At high speed the decoder could deliver far more iframes than the viewer
//! can follow. The renderer asks [`TrickFrameGate::should_read`] before pulling
//! the next sample and reports every rendered frame back.

use crate::core::mode::{TrickDirection, TrickModeSource};
use log::trace;
use std::sync::Arc;

pub struct TrickFrameGate {
    modes: Arc<dyn TrickModeSource>,
    inter_frame_us: i64,
    last_render_us: Option<i64>,
    last_position_us: Option<i64>,
}

impl TrickFrameGate {
    pub fn new(modes: Arc<dyn TrickModeSource>, target_fps: u32) -> Self {
        Self {
            modes,
            inter_frame_us: 1_000_000 / i64::from(target_fps.max(1)),
            last_render_us: None,
            last_position_us: None,
        }
    }

    /// Gating applies in forward trick modes only.
    pub fn is_active(&self) -> bool {
        self.modes.current_trick_mode().direction() == TrickDirection::Forward
    }

    /// True if the next frame is due at wall time `now_us`.
    pub fn should_read(&self, now_us: i64) -> bool {
        if !self.is_active() {
            return true;
        }
        self.last_render_us
            .is_none_or(|last| now_us - last >= self.inter_frame_us)
    }

    /// Record a rendered frame; returns true if it was a trick-play frame.
    pub fn on_rendered(&mut self, now_us: i64, presentation_time_us: i64) -> bool {
        self.last_render_us = Some(now_us);
        self.last_position_us = Some(presentation_time_us);
        self.is_active()
    }

    /// Seek / discontinuity.
    pub fn on_position_reset(&mut self, position_us: i64) {
        self.last_position_us = Some(position_us);
    }

    /// Renderer stopped (pause, buffering, seek): next frame is due immediately.
    pub fn on_stopped(&mut self) {
        trace!("Frame gate reset, last render {:?}", self.last_render_us);
        self.last_render_us = None;
    }

    pub fn last_position_us(&self) -> Option<i64> {
        self.last_position_us
    }
}
