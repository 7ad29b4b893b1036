//! Deterministic fakes shared by unit tests.

use crate::core::engine::{PlaybackEngine, PlaybackState, PlaybackWindow, PlayerEvent, PlayerEventListener, SeekMode};
use crate::core::event_bus::{TrickPlayEvent, TrickPlayListener};
use crate::core::looper::{Looper, LooperHandle};
use crate::core::tracks::{Format, ROLE_FLAG_TRICK_PLAY, RepresentationOverride, TrackGroup, TrackSelector, TrackType};
use crossbeam_channel::bounded;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Block until every task posted to `handle` before this call has run.
pub fn flush(handle: &LooperHandle) {
    let (tx, rx) = bounded(1);
    assert!(handle.post(move || {
        let _ = tx.send(());
    }));
    rx.recv_timeout(FLUSH_TIMEOUT)
        .unwrap_or_else(|_| panic!("looper {} did not drain", handle.name()));
}

/// Video group: two regular representations and a third one that carries the
/// trick-play role flag when `iframe` is set.
pub fn video_group(iframe: bool) -> TrackGroup {
    let video = |id: &str, bitrate: u32, role_flags: u32| Format {
        id: id.into(),
        sample_mime_type: Some("video/avc".into()),
        codecs: Some("avc1.64001f".into()),
        bitrate,
        role_flags,
    };
    TrackGroup::new(vec![
        video("720p", 2_000_000, 0),
        video("1080p", 5_000_000, 0),
        video("iframe", 300_000, if iframe { ROLE_FLAG_TRICK_PLAY } else { 0 }),
    ])
}

pub fn audio_group() -> TrackGroup {
    TrackGroup::new(vec![Format {
        id: "aac".into(),
        sample_mime_type: Some("audio/mp4a-latm".into()),
        bitrate: 128_000,
        ..Default::default()
    }])
}

/// Command issued to the [`FakeEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    PlayWhenReady(bool),
    SeekTo(i64),
    Speed(f32),
    SeekMode(SeekMode),
}

struct FakeState {
    window: Option<PlaybackWindow>,
    position_ms: i64,
    state: PlaybackState,
    renderers: Vec<(TrackType, bool)>,
    groups: Vec<TrackGroup>,
    speed: f32,
    calls: Vec<EngineCall>,
    listeners: Vec<Arc<dyn PlayerEventListener>>,
}

/// Scripted engine: records commands, answers queries from settable state and
/// delivers notifications on its own playback looper.
pub struct FakeEngine {
    state: Mutex<FakeState>,
    playback: Looper,
    application: Looper,
}

impl FakeEngine {
    pub fn with_renderers(types: &[TrackType]) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                window: None,
                position_ms: 0,
                state: PlaybackState::Ready,
                renderers: types.iter().map(|&t| (t, true)).collect(),
                groups: Vec::new(),
                speed: 1.0,
                calls: Vec::new(),
                listeners: Vec::new(),
            }),
            playback: Looper::new("fake-playback").unwrap(),
            application: Looper::new("fake-application").unwrap(),
        })
    }

    /// VOD engine with renderers [video, text, audio] positioned at `position_ms`.
    pub fn vod(duration_ms: i64, position_ms: i64) -> Arc<Self> {
        let engine = Self::with_renderers(&[TrackType::Video, TrackType::Text, TrackType::Audio]);
        engine.set_window(Some(PlaybackWindow {
            is_dynamic: false,
            duration_ms: Some(duration_ms),
            default_position_ms: 0,
            position_in_first_period_us: 0,
        }));
        engine.set_position_ms(position_ms);
        engine
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn set_window(&self, window: Option<PlaybackWindow>) {
        self.lock().window = window;
    }

    pub fn set_position_ms(&self, position_ms: i64) {
        self.lock().position_ms = position_ms;
    }

    pub fn set_selected(&self, renderer_index: usize, selected: bool) {
        self.lock().renderers[renderer_index].1 = selected;
    }

    pub fn set_track_groups(&self, groups: Vec<TrackGroup>) {
        self.lock().groups = groups;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn seeks(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::SeekTo(ms) => Some(ms),
                _ => None,
            })
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Deliver `event` to every subscribed listener on the playback looper
    /// and wait for the delivery to finish.
    pub fn emit(&self, event: PlayerEvent) {
        let listeners = self.lock().listeners.clone();
        for listener in listeners {
            let event = event.clone();
            self.playback.handle().post(move || listener.on_player_event(&event));
        }
        flush(&self.playback.handle());
    }

    /// Tracks-changed notification for the groups currently set.
    pub fn emit_tracks(&self) {
        let groups = self.lock().groups.clone();
        self.emit(PlayerEvent::TracksChanged { groups });
    }
}

impl PlaybackEngine for FakeEngine {
    fn current_window(&self) -> Option<PlaybackWindow> {
        self.lock().window
    }

    fn current_position_ms(&self) -> i64 {
        self.lock().position_ms
    }

    fn playback_state(&self) -> PlaybackState {
        self.lock().state
    }

    fn renderer_count(&self) -> usize {
        self.lock().renderers.len()
    }

    fn renderer_type(&self, renderer_index: usize) -> TrackType {
        self.lock()
            .renderers
            .get(renderer_index)
            .map_or(TrackType::Unknown, |r| r.0)
    }

    fn has_selection(&self, renderer_index: usize) -> bool {
        self.lock().renderers.get(renderer_index).is_some_and(|r| r.1)
    }

    fn current_track_groups(&self) -> Vec<TrackGroup> {
        self.lock().groups.clone()
    }

    fn set_play_when_ready(&self, play_when_ready: bool) {
        self.lock().calls.push(EngineCall::PlayWhenReady(play_when_ready));
    }

    fn seek_to(&self, position_ms: i64) {
        let mut state = self.lock();
        state.position_ms = position_ms;
        state.calls.push(EngineCall::SeekTo(position_ms));
    }

    fn set_playback_speed(&self, speed: f32) {
        let mut state = self.lock();
        state.speed = speed;
        state.calls.push(EngineCall::Speed(speed));
    }

    fn playback_speed(&self) -> f32 {
        self.lock().speed
    }

    fn set_seek_mode(&self, mode: SeekMode) {
        self.lock().calls.push(EngineCall::SeekMode(mode));
    }

    fn playback_looper(&self) -> LooperHandle {
        self.playback.handle()
    }

    fn application_looper(&self) -> LooperHandle {
        self.application.handle()
    }

    fn add_event_listener(&self, listener: Arc<dyn PlayerEventListener>) {
        self.lock().listeners.push(listener);
    }

    fn remove_event_listener(&self, listener: &Arc<dyn PlayerEventListener>) {
        self.lock()
            .listeners
            .retain(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectorCall {
    Disabled(usize, bool),
    Override(usize, Option<RepresentationOverride>),
}

#[derive(Default)]
pub struct RecordingSelector {
    calls: Mutex<Vec<SelectorCall>>,
}

impl RecordingSelector {
    pub fn calls(&self) -> Vec<SelectorCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl TrackSelector for RecordingSelector {
    fn set_renderer_disabled(&self, renderer_index: usize, disabled: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(SelectorCall::Disabled(renderer_index, disabled));
    }

    fn set_representation_override(&self, renderer_index: usize, selection: Option<RepresentationOverride>) {
        self.calls
            .lock()
            .unwrap()
            .push(SelectorCall::Override(renderer_index, selection));
    }
}

#[derive(Default)]
pub struct CollectingListener {
    events: Mutex<Vec<TrickPlayEvent>>,
}

impl CollectingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TrickPlayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn mode_changes(&self) -> Vec<(crate::core::mode::TrickMode, crate::core::mode::TrickMode)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TrickPlayEvent::ModeChanged { new_mode, prev_mode } => Some((new_mode, prev_mode)),
                _ => None,
            })
            .collect()
    }
}

impl TrickPlayListener for CollectingListener {
    fn on_event(&self, event: &TrickPlayEvent) {
        self.events.lock().unwrap().push(*event);
    }
}
