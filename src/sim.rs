//! Simulated playback engine and command script runner.
//!
//! The simulated engine has no decoder. It keeps a media position, advances
//! it at the commanded speed while playing, snaps seeks to key frames in
//! sync-frame mode and reports rendered frames, all through the same
//! asynchronous notifications a real engine delivers on its playback looper.

use crate::core::clock::TimeSource;
use crate::core::engine::{PlaybackEngine, PlaybackState, PlaybackWindow, PlayerEvent, PlayerEventListener, SeekMode};
use crate::core::load_control::LoadControl;
use crate::core::looper::{Looper, LooperHandle};
use crate::core::mode::{TrickDirection, TrickMode};
use crate::core::render_gate::TrickFrameGate;
use crate::core::tracks::{
    Format, IframeAwareFormatFilter, ROLE_FLAG_TRICK_PLAY, RepresentationOverride, TrackGroup, TrackSelector, TrackType,
};
use crate::core::controller::TrickPlayController;
use crate::error::{ModeChangeError, TrickPlayError};
use log::{debug, info, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

/// Distance of the live edge from the end of a live window.
const LIVE_EDGE_OFFSET_MS: i64 = 2000;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub duration_ms: i64,
    pub start_ms: i64,
    pub live: bool,
    pub iframe_track: bool,
    pub keyframe_interval_ms: i64,
    /// Playout loop period.
    pub step_ms: u64,
    /// Delay between a processed seek and its first rendered frame.
    pub decode_delay_ms: u64,
    /// Download bandwidth; media loads at `bandwidth / bitrate` times real time.
    pub bandwidth_bps: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            duration_ms: 600_000,
            start_ms: 0,
            live: false,
            iframe_track: true,
            keyframe_interval_ms: 2000,
            step_ms: 40,
            decode_delay_ms: 30,
            bandwidth_bps: 8_000_000,
        }
    }
}

impl SimConfig {
    fn window(&self) -> PlaybackWindow {
        PlaybackWindow {
            is_dynamic: self.live,
            duration_ms: Some(self.duration_ms),
            default_position_ms: if self.live {
                (self.duration_ms - LIVE_EDGE_OFFSET_MS).max(0)
            } else {
                0
            },
            position_in_first_period_us: 0,
        }
    }

    fn track_groups(&self) -> Vec<TrackGroup> {
        let video = |id: &str, bitrate: u32, role_flags: u32| Format {
            id: id.into(),
            sample_mime_type: Some("video/avc".into()),
            codecs: Some("avc1.640028".into()),
            bitrate,
            role_flags,
        };
        let mut formats = vec![video("540p", 1_800_000, 0), video("1080p", 6_000_000, 0)];
        if self.iframe_track {
            formats.push(video("iframe", 400_000, ROLE_FLAG_TRICK_PLAY));
        }
        vec![
            TrackGroup::new(formats),
            TrackGroup::new(vec![Format {
                id: "aac-stereo".into(),
                sample_mime_type: Some("audio/mp4a-latm".into()),
                bitrate: 128_000,
                ..Default::default()
            }]),
        ]
    }
}

struct SimState {
    position_ms: i64,
    play_when_ready: bool,
    state: PlaybackState,
    speed: f32,
    seek_mode: SeekMode,
    renderers: Vec<(TrackType, bool)>,
    groups: Vec<TrackGroup>,
    iframe_override: bool,
    last_step_ms: Option<i64>,
    frames_rendered: u64,
    /// Loaded media range, back buffer included.
    buffer_start_ms: i64,
    buffer_end_ms: i64,
    video_format: Option<Format>,
    rebuffers: u64,
    seek_buffer_hits: u64,
}

/// Load control answers for one playout step.
struct LoadPolicy {
    continue_loading: bool,
    start_playback: bool,
    back_buffer_ms: i64,
}

pub struct SimulatedEngine {
    this: Weak<SimulatedEngine>,
    config: SimConfig,
    time: Arc<dyn TimeSource>,
    state: Mutex<SimState>,
    listeners: Mutex<Vec<Arc<dyn PlayerEventListener>>>,
    gate: Mutex<Option<TrickFrameGate>>,
    load_control: Mutex<Option<Box<dyn LoadControl>>>,
    format_filter: Mutex<Option<IframeAwareFormatFilter>>,
    playback: Looper,
    application: Looper,
}

impl SimulatedEngine {
    pub fn new(config: SimConfig, time: Arc<dyn TimeSource>) -> Result<Arc<Self>, TrickPlayError> {
        let playback = Looper::new("sim-playback").map_err(TrickPlayError::Spawn)?;
        let application = Looper::new("sim-application").map_err(TrickPlayError::Spawn)?;
        let start_ms = config.start_ms.clamp(0, config.duration_ms);
        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: Mutex::new(SimState {
                position_ms: start_ms,
                play_when_ready: false,
                state: PlaybackState::Idle,
                speed: 1.0,
                seek_mode: SeekMode::Default,
                renderers: vec![(TrackType::Video, true), (TrackType::Audio, true), (TrackType::Text, false)],
                groups: Vec::new(),
                iframe_override: false,
                last_step_ms: None,
                frames_rendered: 0,
                buffer_start_ms: start_ms,
                buffer_end_ms: start_ms,
                video_format: None,
                rebuffers: 0,
                seek_buffer_hits: 0,
            }),
            config,
            time,
            listeners: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            load_control: Mutex::new(None),
            format_filter: Mutex::new(None),
            playback,
            application,
        }))
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forward-mode render limiter consulted before each playout frame.
    pub fn install_frame_gate(&self, gate: TrickFrameGate) {
        *self.gate.lock().unwrap_or_else(|e| e.into_inner()) = Some(gate);
    }

    /// Buffering policy consulted every playout step.
    pub fn install_load_control(&self, load_control: Box<dyn LoadControl>) {
        *self.load_control.lock().unwrap_or_else(|e| e.into_inner()) = Some(load_control);
    }

    /// Admission rule for adaptive video format selection.
    pub fn install_format_filter(&self, filter: IframeAwareFormatFilter) {
        *self.format_filter.lock().unwrap_or_else(|e| e.into_inner()) = Some(filter);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.lock().frames_rendered
    }

    pub fn buffered_range_ms(&self) -> (i64, i64) {
        let st = self.lock();
        (st.buffer_start_ms, st.buffer_end_ms)
    }

    pub fn active_video_format(&self) -> Option<String> {
        self.lock().video_format.as_ref().map(|f| f.id.clone())
    }

    pub fn rebuffer_count(&self) -> u64 {
        self.lock().rebuffers
    }

    /// Seeks that landed inside already loaded media.
    pub fn seek_buffer_hits(&self) -> u64 {
        self.lock().seek_buffer_hits
    }

    pub fn is_iframe_override_active(&self) -> bool {
        self.lock().iframe_override
    }

    /// Load the source: buffering, tracks, ready, then start the playout loop.
    pub fn prepare(&self) {
        let weak = self.this.clone();
        self.playback.handle().post(move || {
            let Some(engine) = weak.upgrade() else {
                return;
            };
            engine.set_state(PlaybackState::Buffering);
            if let Some(load_control) = engine.load_control.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
                load_control.on_prepared();
            }
            let groups = engine.config.track_groups();
            engine.lock().groups = groups.clone();
            engine.notify(&PlayerEvent::TracksChanged { groups });
            engine.notify(&PlayerEvent::TimelineChanged);
            engine.set_state(PlaybackState::Ready);
            engine.schedule_step();
        });
    }

    fn set_state(&self, state: PlaybackState) {
        let play_when_ready = {
            let mut st = self.lock();
            st.state = state;
            st.play_when_ready
        };
        self.notify(&PlayerEvent::StateChanged { play_when_ready, state });
    }

    /// Playback looper only.
    fn notify(&self, event: &PlayerEvent) {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner()).clone();
        for listener in listeners {
            listener.on_player_event(event);
        }
    }

    fn schedule_step(&self) {
        let weak = self.this.clone();
        self.playback
            .handle()
            .post_delayed(Duration::from_millis(self.config.step_ms), move || {
                if let Some(engine) = weak.upgrade() {
                    engine.step();
                    engine.schedule_step();
                }
            });
    }

    fn position_limit_ms(&self) -> i64 {
        self.config
            .window()
            .last_seekable_position_ms()
            .unwrap_or(self.config.duration_ms)
    }

    /// One playout step: pick the video format, load, advance the position
    /// and render a frame when due.
    fn step(&self) {
        let now_ms = self.time.elapsed_realtime_ms();
        // Gate and load control read the controller mode; never under the state lock
        let frame_due = self
            .gate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_none_or(|g| g.should_read(now_ms * 1000));
        let (buffered_us, speed, rebuffering) = {
            let st = self.lock();
            (
                (st.buffer_end_ms - st.position_ms).max(0) * 1000,
                st.speed,
                st.state == PlaybackState::Buffering,
            )
        };
        let policy = self.load_policy(buffered_us, speed, rebuffering);
        let filter = *self.format_filter.lock().unwrap_or_else(|e| e.into_inner());

        let mut events = Vec::new();
        {
            let mut st = self.lock();
            let elapsed_ms = st.last_step_ms.map_or(0, |t| now_ms - t);
            st.last_step_ms = Some(now_ms);
            st.video_format = self.pick_video_format(&st, filter);
            self.load(&mut st, elapsed_ms, &policy);

            if st.state == PlaybackState::Buffering && self.may_resume(&st, &policy) {
                st.state = PlaybackState::Ready;
                events.push(PlayerEvent::StateChanged {
                    play_when_ready: st.play_when_ready,
                    state: PlaybackState::Ready,
                });
            }
            if st.play_when_ready && st.state == PlaybackState::Ready {
                self.advance(&mut st, elapsed_ms, frame_due, &mut events);
            }
            st.buffer_start_ms = st
                .buffer_start_ms
                .max(st.position_ms - policy.back_buffer_ms)
                .min(st.position_ms);
        }

        for event in &events {
            if let PlayerEvent::FrameRendered { presentation_time_us } = event
                && let Some(gate) = self.gate.lock().unwrap_or_else(|e| e.into_inner()).as_mut()
            {
                gate.on_rendered(now_ms * 1000, *presentation_time_us);
            }
            self.notify(event);
        }
    }

    fn load_policy(&self, buffered_us: i64, speed: f32, rebuffering: bool) -> LoadPolicy {
        match self.load_control.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(lc) => LoadPolicy {
                continue_loading: lc.should_continue_loading(buffered_us, speed),
                start_playback: lc.should_start_playback(buffered_us, speed, rebuffering),
                back_buffer_ms: lc.back_buffer_duration_us() / 1000,
            },
            None => LoadPolicy {
                continue_loading: true,
                start_playback: true,
                back_buffer_ms: 0,
            },
        }
    }

    /// Highest bitrate video format the filter admits at the current speed.
    /// An iframe override pins the trick-play format.
    fn pick_video_format(&self, st: &SimState, filter: Option<IframeAwareFormatFilter>) -> Option<Format> {
        let group = st.groups.iter().find(|g| g.is_video())?;
        if st.iframe_override
            && let Some(format) = group.formats.iter().find(|f| f.is_trick_play())
        {
            return Some(format.clone());
        }
        let speed = st.speed.abs().max(1.0);
        let bandwidth = self.config.bandwidth_bps;
        group
            .formats
            .iter()
            .filter(|f| match filter {
                Some(filter) => filter.can_select_format(f, f.bitrate, speed, bandwidth),
                None => !f.is_trick_play() && u64::from(f.bitrate) <= bandwidth,
            })
            .max_by_key(|f| f.bitrate)
            .or_else(|| group.formats.iter().filter(|f| !f.is_trick_play()).min_by_key(|f| f.bitrate))
            .cloned()
    }

    fn load(&self, st: &mut SimState, elapsed_ms: i64, policy: &LoadPolicy) {
        if st.position_ms < st.buffer_start_ms || st.position_ms > st.buffer_end_ms {
            st.buffer_start_ms = st.position_ms;
            st.buffer_end_ms = st.position_ms;
        }
        if !policy.continue_loading {
            return;
        }
        let limit_ms = self.position_limit_ms();
        let loaded_ms = match st.video_format.as_ref().map_or(0, |f| f.bitrate) {
            0 => limit_ms,
            bitrate => (elapsed_ms as f64 * self.config.bandwidth_bps as f64 / f64::from(bitrate)) as i64,
        };
        st.buffer_end_ms = st.buffer_end_ms.saturating_add(loaded_ms).min(limit_ms);
    }

    fn may_resume(&self, st: &SimState, policy: &LoadPolicy) -> bool {
        if st.position_ms >= self.position_limit_ms() {
            // Caught up with the live edge; resumes once back at 1x
            return self.config.live && st.speed <= 1.0;
        }
        policy.start_playback
    }

    fn advance(&self, st: &mut SimState, elapsed_ms: i64, frame_due: bool, events: &mut Vec<PlayerEvent>) {
        let limit_ms = self.position_limit_ms();
        let wanted_ms = (elapsed_ms as f64 * f64::from(st.speed)) as i64;
        if wanted_ms > st.buffer_end_ms - st.position_ms && st.buffer_end_ms < limit_ms {
            st.position_ms = st.buffer_end_ms;
            st.state = PlaybackState::Buffering;
            st.rebuffers += 1;
            debug!("Sim rebuffering at {} ms", st.position_ms);
            events.push(PlayerEvent::StateChanged {
                play_when_ready: st.play_when_ready,
                state: PlaybackState::Buffering,
            });
            return;
        }
        st.position_ms = (st.position_ms + wanted_ms).min(limit_ms);
        if frame_due {
            st.frames_rendered += 1;
            events.push(PlayerEvent::FrameRendered {
                presentation_time_us: st.position_ms * 1000,
            });
        }
        if st.position_ms < limit_ms {
            return;
        }
        let state = if !self.config.live {
            PlaybackState::Ended
        } else if st.speed > 1.0 {
            PlaybackState::Buffering
        } else {
            return;
        };
        st.state = state;
        events.push(PlayerEvent::StateChanged {
            play_when_ready: st.play_when_ready,
            state,
        });
    }

    fn process_seek(&self, requested_ms: i64) {
        self.notify(&PlayerEvent::SeekStarted);
        let (landed_ms, left_end) = {
            let mut st = self.lock();
            let landed = match st.seek_mode {
                SeekMode::ClosestSync => {
                    let interval = self.config.keyframe_interval_ms.max(1);
                    ((requested_ms + interval / 2) / interval) * interval
                }
                SeekMode::Default => requested_ms,
            };
            let landed = landed.clamp(0, self.position_limit_ms());
            st.position_ms = landed;
            if (st.buffer_start_ms..=st.buffer_end_ms).contains(&landed) {
                st.seek_buffer_hits += 1;
            } else {
                st.buffer_start_ms = landed;
                st.buffer_end_ms = landed;
            }
            (landed, st.state == PlaybackState::Ended)
        };
        if left_end {
            self.set_state(PlaybackState::Ready);
        }
        trace!("Sim seek {} ms landed at {} ms", requested_ms, landed_ms);
        if let Some(gate) = self.gate.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            gate.on_stopped();
            gate.on_position_reset(landed_ms * 1000);
        }
        self.notify(&PlayerEvent::SeekProcessed { position_ms: landed_ms });
        self.notify(&PlayerEvent::PositionDiscontinuity);

        let weak = self.this.clone();
        self.playback
            .handle()
            .post_delayed(Duration::from_millis(self.config.decode_delay_ms), move || {
                let Some(engine) = weak.upgrade() else {
                    return;
                };
                {
                    let mut st = engine.lock();
                    if st.state == PlaybackState::Idle || st.position_ms != landed_ms {
                        return; // superseded by a later seek
                    }
                    st.frames_rendered += 1;
                }
                engine.notify(&PlayerEvent::FrameRendered {
                    presentation_time_us: landed_ms * 1000,
                });
            });
    }

    fn set_renderer_enabled(&self, renderer_index: usize, enabled: bool) {
        if let Some(renderer) = self.lock().renderers.get_mut(renderer_index) {
            renderer.1 = enabled;
        }
    }

    fn set_iframe_override(&self, active: bool) {
        self.lock().iframe_override = active;
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn current_window(&self) -> Option<PlaybackWindow> {
        if self.lock().state == PlaybackState::Idle {
            return None;
        }
        Some(self.config.window())
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
        {
            let mut st = self.lock();
            st.play_when_ready = play_when_ready;
            st.last_step_ms = None;
        }
        let weak = self.this.clone();
        self.playback.handle().post(move || {
            if let Some(engine) = weak.upgrade() {
                let state = engine.lock().state;
                engine.notify(&PlayerEvent::StateChanged { play_when_ready, state });
            }
        });
    }

    fn seek_to(&self, position_ms: i64) {
        self.lock().position_ms = position_ms.clamp(0, self.config.duration_ms);
        let weak = self.this.clone();
        self.playback.handle().post(move || {
            if let Some(engine) = weak.upgrade() {
                engine.process_seek(position_ms);
            }
        });
    }

    fn set_playback_speed(&self, speed: f32) {
        self.lock().speed = speed;
    }

    fn playback_speed(&self) -> f32 {
        self.lock().speed
    }

    fn set_seek_mode(&self, mode: SeekMode) {
        self.lock().seek_mode = mode;
    }

    fn playback_looper(&self) -> LooperHandle {
        self.playback.handle()
    }

    fn application_looper(&self) -> LooperHandle {
        self.application.handle()
    }

    fn add_event_listener(&self, listener: Arc<dyn PlayerEventListener>) {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).push(listener);
    }

    fn remove_event_listener(&self, listener: &Arc<dyn PlayerEventListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
    }
}

/// Track selector applying renderer enable/disable and iframe overrides to a [`SimulatedEngine`].
pub struct SimTrackSelector {
    engine: Weak<SimulatedEngine>,
}

impl SimTrackSelector {
    pub fn new(engine: &Arc<SimulatedEngine>) -> Self {
        Self {
            engine: Arc::downgrade(engine),
        }
    }
}

impl TrackSelector for SimTrackSelector {
    fn set_renderer_disabled(&self, renderer_index: usize, disabled: bool) {
        if let Some(engine) = self.engine.upgrade() {
            debug!("Sim renderer {} {}", renderer_index, if disabled { "disabled" } else { "enabled" });
            engine.set_renderer_enabled(renderer_index, !disabled);
        }
    }

    fn set_representation_override(&self, renderer_index: usize, selection: Option<RepresentationOverride>) {
        if let Some(engine) = self.engine.upgrade() {
            debug!("Sim renderer {} override {:?}", renderer_index, selection);
            engine.set_iframe_override(selection.is_some());
        }
    }
}

/// One scripted action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCommand {
    Mode(TrickMode),
    /// Single fast-forward / rewind key: next mode in that direction.
    Shuttle(TrickDirection),
    Seek(i64),
    PlayedFrame(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptStep {
    pub at_ms: u64,
    pub command: SimCommand,
}

/// Parse `cmd@ms` items separated by commas or whitespace.
///
/// Commands: a mode name (`ff1`..`ff3`, `fr1`..`fr3`, `normal`), `ff` / `rw`
/// for shuttle keys, `seek=<ms>` and `frame=<n>`. Steps come back ordered by time.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, TrickPlayError> {
    let mut steps = Vec::new();
    for item in text.split(|c: char| c == ',' || c.is_whitespace()).filter(|s| !s.is_empty()) {
        let (cmd, at) = item
            .split_once('@')
            .ok_or_else(|| TrickPlayError::InvalidScript(format!("missing '@time' in '{}'", item)))?;
        let at_ms: u64 = at
            .parse()
            .map_err(|_| TrickPlayError::InvalidScript(format!("bad time '{}' in '{}'", at, item)))?;

        let command = match cmd.split_once('=') {
            Some(("seek", value)) => SimCommand::Seek(
                value
                    .parse()
                    .map_err(|_| TrickPlayError::InvalidScript(format!("bad seek position '{}'", value)))?,
            ),
            Some(("frame", value)) => SimCommand::PlayedFrame(
                value
                    .parse()
                    .map_err(|_| TrickPlayError::InvalidScript(format!("bad frame index '{}'", value)))?,
            ),
            Some(_) => return Err(TrickPlayError::InvalidScript(format!("unknown command '{}'", cmd))),
            None => match cmd.to_ascii_lowercase().as_str() {
                "ff" => SimCommand::Shuttle(TrickDirection::Forward),
                "rw" => SimCommand::Shuttle(TrickDirection::Reverse),
                name => SimCommand::Mode(
                    TrickMode::from_name(name)
                        .ok_or_else(|| TrickPlayError::InvalidScript(format!("unknown mode '{}'", name)))?,
                ),
            },
        };
        steps.push(ScriptStep { at_ms, command });
    }
    steps.sort_by_key(|s| s.at_ms);
    Ok(steps)
}

#[derive(Debug)]
pub struct StepOutcome {
    pub step: ScriptStep,
    pub mode_result: Option<Result<usize, ModeChangeError>>,
    /// Result of the NORMAL hop a shuttle takes when it reverses direction.
    pub detour: Option<Result<usize, ModeChangeError>>,
    pub position_ms: i64,
}

#[derive(Debug)]
pub struct SimReport {
    pub outcomes: Vec<StepOutcome>,
    pub final_mode: TrickMode,
    pub final_state: PlaybackState,
    pub final_position_ms: i64,
    pub frames_rendered: u64,
    pub rebuffers: u64,
    pub seek_buffer_hits: u64,
    pub video_format: Option<String>,
    pub played_frames_ms: Vec<i64>,
}

/// Run `steps` against `controller` in real time, then keep playing until
/// `run_ms` has elapsed.
pub fn run_script(
    controller: &TrickPlayController,
    engine: &SimulatedEngine,
    steps: &[ScriptStep],
    run_ms: u64,
) -> SimReport {
    let started = Instant::now();
    let mut outcomes = Vec::with_capacity(steps.len());

    for step in steps {
        let due = started + Duration::from_millis(step.at_ms);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }

        let mut detour = None;
        let mode_result = match step.command {
            SimCommand::Mode(mode) => Some(controller.set_trick_mode(mode)),
            SimCommand::Shuttle(direction) => {
                let current = controller.current_trick_mode();
                // Direction change from a trick mode goes through NORMAL
                if current.is_trick() && current.direction() != direction {
                    let hop = controller.set_trick_mode(TrickMode::Normal);
                    if let Err(e) = &hop {
                        info!("t={} {:?} intermediate NORMAL refused: {}", step.at_ms, step.command, e);
                    }
                    detour = Some(hop);
                }
                Some(controller.set_trick_mode(current.next_in_direction(direction)))
            }
            SimCommand::Seek(target) => {
                controller.bounded_seek_to(target);
                None
            }
            SimCommand::PlayedFrame(n) => {
                if !controller.seek_to_nth_played_frame(n) {
                    warn!("No played frame {} to seek to", n);
                }
                None
            }
        };
        let position_ms = engine.current_position_ms();
        match &mode_result {
            Some(Ok(count)) => info!("t={} {:?} ok ({}) at {} ms", step.at_ms, step.command, count, position_ms),
            Some(Err(e)) => info!("t={} {:?} refused: {}", step.at_ms, step.command, e),
            None => info!("t={} {:?} at {} ms", step.at_ms, step.command, position_ms),
        }
        outcomes.push(StepOutcome {
            step: *step,
            mode_result,
            detour,
            position_ms,
        });
    }

    let end = started + Duration::from_millis(run_ms);
    if let Some(wait) = end.checked_duration_since(Instant::now()) {
        std::thread::sleep(wait);
    }

    SimReport {
        outcomes,
        final_mode: controller.current_trick_mode(),
        final_state: engine.playback_state(),
        final_position_ms: engine.current_position_ms(),
        frames_rendered: engine.frames_rendered(),
        rebuffers: engine.rebuffer_count(),
        seek_buffer_hits: engine.seek_buffer_hits(),
        video_format: engine.active_video_format(),
        played_frames_ms: controller.played_frame_positions_ms(),
    }
}
