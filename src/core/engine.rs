//! Surface of the playback engine the trick-play controller drives.
//!
//! The engine decodes and renders; the controller only queries its window,
//! position and tracks, commands speed/seek/pause, and listens to its
//! notifications. Notifications are asynchronous: an engine must never call
//! back into a listener from inside one of the command methods below.

use crate::core::clock::{LinearSpeedMapping, SpeedMapping};
use crate::core::looper::LooperHandle;
use crate::core::tracks::{TrackGroup, TrackType};
use std::sync::Arc;

/// Snapshot of the current seekable window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackWindow {
    /// Live / sliding window.
    pub is_dynamic: bool,
    /// Window duration, `None` until the source has determined it.
    pub duration_ms: Option<i64>,
    /// Default start position; for live windows this is the live edge.
    pub default_position_ms: i64,
    /// Offset of the window start within its first period.
    pub position_in_first_period_us: i64,
}

impl PlaybackWindow {
    /// Last position it is safe to seek to: live edge for dynamic windows,
    /// duration otherwise.
    pub fn last_seekable_position_ms(&self) -> Option<i64> {
        if self.is_dynamic {
            Some(self.default_position_ms)
        } else {
            self.duration_ms
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Buffering,
    Ready,
    Ended,
}

/// Seek precision requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekMode {
    /// Engine default (exact).
    #[default]
    Default,
    /// Snap to the nearest sync (key) frame.
    ClosestSync,
}

/// Notifications delivered by the engine on its playback thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged {
        play_when_ready: bool,
        state: PlaybackState,
    },
    TimelineChanged,
    PositionDiscontinuity,
    TracksChanged {
        groups: Vec<TrackGroup>,
    },
    FrameRendered {
        presentation_time_us: i64,
    },
    SeekStarted,
    SeekProcessed {
        position_ms: i64,
    },
}

pub trait PlayerEventListener: Send + Sync {
    fn on_player_event(&self, event: &PlayerEvent);
}

/// Query/command surface of a playback engine.
pub trait PlaybackEngine: Send + Sync {
    /// Current window, `None` for an empty timeline.
    fn current_window(&self) -> Option<PlaybackWindow>;
    fn current_position_ms(&self) -> i64;
    fn playback_state(&self) -> PlaybackState;

    fn renderer_count(&self) -> usize;
    fn renderer_type(&self, renderer_index: usize) -> TrackType;
    /// True if the renderer currently has an active track selection.
    fn has_selection(&self, renderer_index: usize) -> bool;
    fn current_track_groups(&self) -> Vec<TrackGroup>;

    fn set_play_when_ready(&self, play_when_ready: bool);
    fn seek_to(&self, position_ms: i64);
    fn set_playback_speed(&self, speed: f32);
    fn playback_speed(&self) -> f32;
    fn set_seek_mode(&self, mode: SeekMode);

    /// Queue bound to the playback thread.
    fn playback_looper(&self) -> LooperHandle;
    /// Queue bound to the application thread that owns the engine.
    fn application_looper(&self) -> LooperHandle;

    fn add_event_listener(&self, listener: Arc<dyn PlayerEventListener>);
    fn remove_event_listener(&self, listener: &Arc<dyn PlayerEventListener>);

    /// Playout time to media time mapping used by the engine at non-unit speed.
    fn speed_mapping(&self) -> Arc<dyn SpeedMapping> {
        Arc::new(LinearSpeedMapping)
    }
}
