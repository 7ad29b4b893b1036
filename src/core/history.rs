//! Ring of recently rendered trick-play frame times.
//!
//! Written from the playback thread on every rendered frame while in a trick
//! mode, read from the control thread when trick-play ends so normal playback
//! can resume at (or N frames before) the last frame the viewer saw.

use crate::core::engine::PlaybackWindow;
use log::warn;
use std::sync::Mutex;

/// Number of rendered frame times retained.
pub const HISTORY_CAPACITY: usize = 15;

/// Marker for a slot that was never written.
const TIME_UNSET: i64 = i64::MIN;

struct Ring {
    store: [i64; HISTORY_CAPACITY],
    last_write: Option<usize>,
}

/// Fixed-capacity, internally synchronized ring of frame times in µs.
pub struct FrameHistoryRing {
    inner: Mutex<Ring>,
}

impl Default for FrameHistoryRing {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHistoryRing {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Ring {
                store: [TIME_UNSET; HISTORY_CAPACITY],
                last_write: None,
            }),
        }
    }

    /// Record the presentation time of a rendered frame.
    pub fn add(&self, timestamp_us: i64) {
        let mut ring = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let next = ring.last_write.map_or(0, |i| (i + 1) % HISTORY_CAPACITY);
        ring.store[next] = timestamp_us;
        ring.last_write = Some(next);
    }

    /// Count of recorded entries (at most [`HISTORY_CAPACITY`]).
    pub fn len(&self) -> usize {
        let ring = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        ring.store.iter().filter(|&&v| v != TIME_UNSET).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw media times, most recent first.
    fn recent_first(&self) -> Vec<i64> {
        let ring = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut values = Vec::with_capacity(HISTORY_CAPACITY);
        let Some(mut read) = ring.last_write else {
            return values;
        };
        while values.len() < HISTORY_CAPACITY && ring.store[read] != TIME_UNSET {
            values.push(ring.store[read]);
            read = if read == 0 { HISTORY_CAPACITY - 1 } else { read - 1 };
        }
        values
    }

    /// Recorded frame times, most recent first, as µs offsets into `window`.
    ///
    /// `None` (empty timeline) yields an empty list.
    pub fn last_n_positions(&self, window: Option<&PlaybackWindow>) -> Vec<i64> {
        let Some(window) = window else {
            warn!("Frame history requested with empty timeline");
            return Vec::new();
        };
        self.recent_first()
            .into_iter()
            .map(|us| us - window.position_in_first_period_us)
            .collect()
    }
}

impl std::fmt::Debug for FrameHistoryRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHistoryRing")
            .field("recent", &self.recent_first())
            .finish()
    }
}
