//! Track model and the audio/iframe track adaptation used by trick-play.
//!
//! Audio is always off outside normal playback. The controller remembers
//! which audio renderer it disabled so the exact same one comes back on exit.

use crate::core::engine::PlaybackEngine;
use log::{debug, trace};
use std::sync::Arc;

/// Role flag marking an iframe-only (trick-play) representation.
pub const ROLE_FLAG_TRICK_PLAY: u32 = 1 << 14;

const VIDEO_CODEC_PREFIXES: &[&str] = &["avc1", "avc3", "hvc1", "hev1", "vp8", "vp09", "vp9", "av01", "mp4v"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Unknown,
    Audio,
    Video,
    Text,
    Metadata,
}

/// One representation within a track group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Format {
    pub id: String,
    pub sample_mime_type: Option<String>,
    pub codecs: Option<String>,
    pub bitrate: u32,
    pub role_flags: u32,
}

impl Format {
    pub fn is_trick_play(&self) -> bool {
        self.role_flags & ROLE_FLAG_TRICK_PLAY != 0
    }

    /// Video by MIME type when known, otherwise by the codecs string.
    pub fn is_video(&self) -> bool {
        if let Some(mime) = self.sample_mime_type.as_deref() {
            let top = mime.split('/').next().unwrap_or_default();
            if matches!(top, "video" | "audio" | "text" | "application") {
                return top == "video";
            }
        }
        self.codecs.as_deref().is_some_and(|codecs| {
            codecs.split(',').any(|codec| {
                let codec = codec.trim();
                VIDEO_CODEC_PREFIXES.iter().any(|prefix| codec.starts_with(prefix))
            })
        })
    }
}

/// Adaptations of one playlist / adaptation set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackGroup {
    pub formats: Vec<Format>,
}

impl TrackGroup {
    pub fn new(formats: Vec<Format>) -> Self {
        Self { formats }
    }

    pub fn is_video(&self) -> bool {
        self.formats.first().is_some_and(Format::is_video)
    }

    pub fn trick_play_track_indices(&self) -> Vec<usize> {
        self.formats
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_trick_play())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Forces a renderer onto specific tracks of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepresentationOverride {
    pub group_index: usize,
    pub track_indices: Vec<usize>,
}

/// Track selection capability the controller is bound to.
pub trait TrackSelector: Send + Sync {
    fn set_renderer_disabled(&self, renderer_index: usize, disabled: bool);
    /// `None` clears the override and restores adaptive selection.
    fn set_representation_override(&self, renderer_index: usize, selection: Option<RepresentationOverride>);
}

/// Audio disable/restore bookkeeping plus iframe representation selection.
pub struct TrackAdaptationBridge {
    selector: Arc<dyn TrackSelector>,
    remembered_audio: Vec<usize>,
    iframe_override: Option<usize>,
}

impl TrackAdaptationBridge {
    pub fn new(selector: Arc<dyn TrackSelector>) -> Self {
        Self {
            selector,
            remembered_audio: Vec::new(),
            iframe_override: None,
        }
    }

    /// True iff the group carries at least one trick-play format.
    pub fn is_iframe_track_available(group: &TrackGroup) -> bool {
        group.formats.iter().any(Format::is_trick_play)
    }

    /// True iff any video group in `groups` has an iframe representation.
    pub fn detect_smooth_play(groups: &[TrackGroup]) -> bool {
        groups
            .iter()
            .filter(|g| g.is_video())
            .any(Self::is_iframe_track_available)
    }

    pub fn remembered_audio(&self) -> &[usize] {
        &self.remembered_audio
    }

    /// Disable every active audio renderer, remembering each one.
    ///
    /// When audio is already off (trick mode to trick mode) the earlier
    /// remembered renderers are kept.
    pub fn disable_audio_and_remember_selection(&mut self, engine: &dyn PlaybackEngine) -> &[usize] {
        for index in 0..engine.renderer_count() {
            if engine.renderer_type(index) == TrackType::Audio && engine.has_selection(index) {
                if !self.remembered_audio.contains(&index) {
                    self.remembered_audio.push(index);
                }
                debug!("Disabling audio renderer {}", index);
                self.selector.set_renderer_disabled(index, true);
            }
        }
        &self.remembered_audio
    }

    /// Re-enable the remembered audio renderers.
    pub fn restore_audio_selection(&mut self, engine: &dyn PlaybackEngine) {
        for index in std::mem::take(&mut self.remembered_audio) {
            if index < engine.renderer_count() {
                debug!("Restoring audio renderer {}", index);
                self.selector.set_renderer_disabled(index, false);
            }
        }
    }

    /// Pin the video renderer to the iframe-only tracks. Returns false when
    /// there is no video renderer or no iframe track to select.
    pub fn select_iframe_representation(&mut self, engine: &dyn PlaybackEngine) -> bool {
        let Some(renderer) = (0..engine.renderer_count()).find(|&i| engine.renderer_type(i) == TrackType::Video) else {
            return false;
        };
        let groups = engine.current_track_groups();
        let Some((group_index, group)) = groups
            .iter()
            .enumerate()
            .find(|(_, g)| g.is_video() && Self::is_iframe_track_available(g))
        else {
            return false;
        };

        let selection = RepresentationOverride {
            group_index,
            track_indices: group.trick_play_track_indices(),
        };
        trace!("Selecting iframe tracks {:?} on renderer {}", selection, renderer);
        self.selector.set_representation_override(renderer, Some(selection));
        self.iframe_override = Some(renderer);
        true
    }

    /// Drop the iframe override so adaptive video selection applies again.
    pub fn clear_iframe_representation(&mut self) {
        if let Some(renderer) = self.iframe_override.take() {
            trace!("Clearing iframe override on renderer {}", renderer);
            self.selector.set_representation_override(renderer, None);
        }
    }

    /// Forget bookkeeping without touching the selector (engine rebind).
    pub fn reset(&mut self) {
        self.remembered_audio.clear();
        self.iframe_override = None;
    }
}

/// Format admission used by adaptive video selection during trick-play.
///
/// Above the speed threshold only iframe-only formats qualify, regardless
/// of bandwidth, so high speed playback keeps a steady frame rate.
#[derive(Debug, Clone, Copy)]
pub struct IframeAwareFormatFilter {
    pub speed_threshold: f32,
}

impl Default for IframeAwareFormatFilter {
    fn default() -> Self {
        Self { speed_threshold: 6.0 }
    }
}

impl IframeAwareFormatFilter {
    pub fn can_select_format(&self, format: &Format, track_bitrate: u32, playback_speed: f32, effective_bitrate: u64) -> bool {
        if playback_speed.abs() > self.speed_threshold {
            format.is_trick_play()
        } else {
            (f64::from(track_bitrate) * f64::from(playback_speed)).round() <= effective_bitrate as f64
        }
    }
}
