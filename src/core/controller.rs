//! Trick-play controller: the only component applications talk to.
//!
//! Owns the current [`TrickMode`] and hides which strategy realizes it:
//! - **continuous**: forward modes with an iframe track; the engine plays
//!   natively at the mode's speed on the iframe representation
//! - **seek pacing**: everything else; a [`SeekPacer`] issues timed seeks
//!
//! Threads:
//! - control thread calls `set_trick_mode()` and the accessors
//! - engine notifications and pacer ticks arrive on the playback looper
//!
//! All mutable state sits behind one mutex. The pacer lives inside that
//! state, so tearing it down while a tick runs simply waits for the tick.

use crate::config::TrickPlayConfig;
use crate::core::clock::{ReversibleClock, SystemTimeSource, TimeSource};
use crate::core::engine::{PlaybackEngine, PlaybackState, PlaybackWindow, PlayerEvent, PlayerEventListener, SeekMode};
use crate::core::event_bus::{Affinity, EventBus, TrickPlayEvent, TrickPlayListener};
use crate::core::history::FrameHistoryRing;
use crate::core::load_control::{LoadControl, TrickPlayLoadControl};
use crate::core::looper::{CancelToken, LooperHandle};
use crate::core::mode::{SpeedTable, TrickDirection, TrickMode, TrickModeSource};
use crate::core::pacer::{SeekPacer, TickScheduler};
use crate::core::render_gate::TrickFrameGate;
use crate::core::tracks::{IframeAwareFormatFilter, TrackAdaptationBridge, TrackSelector};
use crate::error::ModeChangeError;
use log::{debug, info, trace};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

/// How the current mode is being realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveStrategy {
    /// NORMAL playback.
    None,
    /// Engine-native speed on the iframe track.
    Continuous,
    /// Timed seeks driven by a [`SeekPacer`].
    SeekPacing,
}

enum Strategy {
    Idle,
    Continuous,
    Pacing(SeekPacer),
}

struct Binding {
    engine: Arc<dyn PlaybackEngine>,
    listener: Arc<dyn PlayerEventListener>,
    playback: LooperHandle,
    /// Cancelled on unbind; stale notifications check it.
    token: CancelToken,
}

struct ControllerState {
    mode: TrickMode,
    speeds: SpeedTable,
    smooth_play: bool,
    metadata_valid: bool,
    history: FrameHistoryRing,
    bridge: TrackAdaptationBridge,
    strategy: Strategy,
    binding: Option<Binding>,
}

impl ControllerState {
    /// NORMAL, unbound, speed table built as if iframes were available until
    /// the first track notification says otherwise.
    fn initial(config: &TrickPlayConfig, selector: Arc<dyn TrackSelector>) -> Self {
        debug!("Speed table assumes iframe tracks until tracks are known");
        Self {
            mode: TrickMode::Normal,
            speeds: config.speed_table(true),
            smooth_play: false,
            metadata_valid: false,
            history: FrameHistoryRing::new(),
            bridge: TrackAdaptationBridge::new(selector),
            strategy: Strategy::Idle,
            binding: None,
        }
    }

    fn engine(&self) -> Option<Arc<dyn PlaybackEngine>> {
        self.binding.as_ref().map(|b| Arc::clone(&b.engine))
    }
}

struct Shared {
    this: Weak<Shared>,
    state: Mutex<ControllerState>,
    bus: EventBus,
    config: TrickPlayConfig,
    time: Arc<dyn TimeSource>,
}

/// Trick-play front end. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TrickPlayController {
    shared: Arc<Shared>,
}

impl TrickPlayController {
    pub fn new(selector: Arc<dyn TrackSelector>) -> Self {
        Self::with_config(selector, TrickPlayConfig::default())
    }

    pub fn with_config(selector: Arc<dyn TrackSelector>, config: TrickPlayConfig) -> Self {
        Self::with_time_source(selector, config, Arc::new(SystemTimeSource::new()))
    }

    /// `time` drives the pacing clock and render timing.
    pub fn with_time_source(
        selector: Arc<dyn TrackSelector>,
        config: TrickPlayConfig,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let shared = Arc::new_cyclic(|this| Shared {
            this: this.clone(),
            state: Mutex::new(ControllerState::initial(&config, selector)),
            bus: EventBus::new(),
            config,
            time,
        });
        Self { shared }
    }

    /// Bind to `engine`. Any previous engine is released first and the mode
    /// goes back to NORMAL. Registered listeners are kept.
    pub fn set_player(&self, engine: Arc<dyn PlaybackEngine>) {
        let shared = &self.shared;
        let mut st = shared.lock();
        let exited = shared.unbind(&mut st);

        let token = CancelToken::new();
        let listener: Arc<dyn PlayerEventListener> = Arc::new(EngineListener {
            shared: shared.this.clone(),
            token: token.clone(),
        });
        let playback = engine.playback_looper();
        shared.bus.bind(playback.clone(), engine.application_looper());
        engine.add_event_listener(Arc::clone(&listener));
        info!("Trick-play bound to engine (playback looper {})", playback.name());

        st.binding = Some(Binding {
            engine,
            listener,
            playback,
            token,
        });

        // Queued deliveries died with the old loopers; announce on the new ones
        if let Some(prev_mode) = exited {
            shared.bus.dispatch(TrickPlayEvent::ModeChanged {
                new_mode: TrickMode::Normal,
                prev_mode,
            });
        }
    }

    /// Release the engine: stop pacing, drop queued work and clear all listeners.
    pub fn remove_player_reference(&self) {
        let shared = &self.shared;
        let mut st = shared.lock();
        shared.unbind(&mut st);
        shared.bus.clear();
    }

    /// Request `requested`.
    ///
    /// Returns the number of recorded trick frames when exiting to NORMAL and
    /// 0 when entering a trick mode.
    pub fn set_trick_mode(&self, requested: TrickMode) -> Result<usize, ModeChangeError> {
        let shared = &self.shared;
        let mut st = shared.lock();
        let previous = st.mode;

        if requested == previous {
            return Err(ModeChangeError::AlreadyInMode(previous));
        }
        let Some(engine) = st.engine() else {
            return Err(ModeChangeError::NoPlayer);
        };
        if previous.is_trick() && requested.is_trick() && previous.direction() != requested.direction() {
            debug!("set_trick_mode({}) rejected, direction reversal from {}", requested, previous);
            return Err(ModeChangeError::DirectionReversal {
                current: previous,
                requested,
            });
        }

        let position_ms = engine.current_position_ms();
        if !shared.is_mode_possible(&st.speeds, engine.current_window(), position_ms, requested) {
            debug!("set_trick_mode({}) not possible at {} ms", requested, position_ms);
            return Err(ModeChangeError::Infeasible { requested, position_ms });
        }

        debug!("set_trick_mode({}) pausing playback, previous mode {}", requested, previous);
        engine.set_play_when_ready(false);

        if requested == TrickMode::Normal {
            Ok(shared.switch_to_normal(&mut st, &engine, previous))
        } else {
            shared.switch_trick_speed(&mut st, &engine, requested, previous);
            Ok(0)
        }
    }

    pub fn current_trick_mode(&self) -> TrickMode {
        self.shared.lock().mode
    }

    pub fn current_trick_direction(&self) -> TrickDirection {
        self.current_trick_mode().direction()
    }

    pub fn speed_for(&self, mode: TrickMode) -> f32 {
        self.shared.lock().speeds.speed_for(mode)
    }

    /// True once tracks are known and the video has an iframe representation.
    pub fn is_smooth_play_available(&self) -> bool {
        self.shared.lock().smooth_play
    }

    pub fn is_metadata_valid(&self) -> bool {
        self.shared.lock().metadata_valid
    }

    pub fn active_strategy(&self) -> ActiveStrategy {
        match self.shared.lock().strategy {
            Strategy::Idle => ActiveStrategy::None,
            Strategy::Continuous => ActiveStrategy::Continuous,
            Strategy::Pacing(_) => ActiveStrategy::SeekPacing,
        }
    }

    /// Live edge for live windows, duration otherwise. `None` when unbound,
    /// for an empty timeline or before the duration is known.
    pub fn largest_safe_seek_position_ms(&self) -> Option<i64> {
        let engine = self.shared.lock().engine()?;
        engine.current_window()?.last_seekable_position_ms()
    }

    /// Seek to `target_ms` clamped to `[0, largest safe seek position]`.
    /// Returns the position actually requested, `None` when unbound.
    pub fn bounded_seek_to(&self, target_ms: i64) -> Option<i64> {
        let engine = self.shared.lock().engine()?;
        let upper = engine
            .current_window()
            .and_then(|w| w.last_seekable_position_ms())
            .unwrap_or(i64::MAX);
        let position_ms = target_ms.clamp(0, upper.max(0));
        trace!("bounded_seek_to({}) -> {}", target_ms, position_ms);
        engine.seek_to(position_ms);
        Some(position_ms)
    }

    /// Positions (ms, most recent first) of the frames rendered in the
    /// current or last trick-play session.
    pub fn played_frame_positions_ms(&self) -> Vec<i64> {
        let st = self.shared.lock();
        let Some(engine) = st.engine() else {
            return Vec::new();
        };
        let window = engine.current_window();
        st.history
            .last_n_positions(window.as_ref())
            .into_iter()
            .map(|us| us / 1000)
            .collect()
    }

    /// Seek to the n-th most recent trick frame (0 = last one shown).
    pub fn seek_to_nth_played_frame(&self, n: usize) -> bool {
        let st = self.shared.lock();
        let Some(engine) = st.engine() else {
            return false;
        };
        let positions = st.history.last_n_positions(engine.current_window().as_ref());
        match positions.get(n) {
            Some(&position_us) => {
                debug!("Seek to played frame {} at {} us", n, position_us);
                engine.seek_to(position_us / 1000);
                true
            }
            None => false,
        }
    }

    /// Listener called on the application looper.
    pub fn add_event_listener(&self, listener: Arc<dyn TrickPlayListener>) {
        self.shared.bus.add_listener(listener, Affinity::Application);
    }

    pub fn remove_event_listener(&self, listener: &Arc<dyn TrickPlayListener>) {
        self.shared.bus.remove_listener(listener, Affinity::Application);
    }

    /// Listener called on the playback looper; also receives `FrameRendered`.
    pub fn add_event_listener_internal(&self, listener: Arc<dyn TrickPlayListener>) {
        self.shared.bus.add_listener(listener, Affinity::Playback);
    }

    pub fn remove_event_listener_internal(&self, listener: &Arc<dyn TrickPlayListener>) {
        self.shared.bus.remove_listener(listener, Affinity::Playback);
    }

    /// Mode view that does not keep the controller alive.
    pub fn mode_source(&self) -> Arc<dyn TrickModeSource> {
        Arc::new(ModeProbe {
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Wrap `delegate` with the trick-play buffering policy.
    pub fn create_load_control<L: LoadControl>(&self, delegate: L) -> TrickPlayLoadControl<L> {
        TrickPlayLoadControl::new(delegate, self.mode_source(), self.shared.config.trick_back_buffer_ms * 1000)
    }

    /// Render-side frame rate limiter for forward trick modes.
    pub fn create_frame_gate(&self) -> TrickFrameGate {
        TrickFrameGate::new(self.mode_source(), self.shared.config.render_gate_fps)
    }

    /// Adaptive video format admission with the configured iframe speed threshold.
    pub fn create_format_filter(&self) -> IframeAwareFormatFilter {
        self.shared.config.format_filter()
    }
}

impl TrickModeSource for TrickPlayController {
    fn current_trick_mode(&self) -> TrickMode {
        TrickPlayController::current_trick_mode(self)
    }
}

impl std::fmt::Debug for TrickPlayController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.shared.lock();
        f.debug_struct("TrickPlayController")
            .field("mode", &st.mode)
            .field("smooth_play", &st.smooth_play)
            .field("metadata_valid", &st.metadata_valid)
            .field("bound", &st.binding.is_some())
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Boundary check shared by mode requests and automatic exits.
    ///
    /// Empty timeline or unknown duration counts as possible.
    fn is_mode_possible(
        &self,
        speeds: &SpeedTable,
        window: Option<PlaybackWindow>,
        position_ms: i64,
        mode: TrickMode,
    ) -> bool {
        let Some(window) = window else {
            return true;
        };
        if window.duration_ms.is_none() {
            return true;
        }
        let Some(last_seekable_ms) = window.last_seekable_position_ms() else {
            return true;
        };

        match mode.direction() {
            TrickDirection::Forward => {
                let tolerance_ms = (self.config.forward_tolerance_ms_per_speed as f32 * speeds.speed_for(mode)) as i64;
                last_seekable_ms - position_ms >= tolerance_ms
            }
            TrickDirection::Reverse => position_ms >= self.config.reverse_min_position_ms,
            TrickDirection::None => true,
        }
    }

    fn switch_trick_speed(
        &self,
        st: &mut ControllerState,
        engine: &Arc<dyn PlaybackEngine>,
        mode: TrickMode,
        previous: TrickMode,
    ) {
        if previous == TrickMode::Normal {
            st.history = FrameHistoryRing::new();
        }

        self.teardown_strategy(st, engine.as_ref());
        st.bridge.disable_audio_and_remember_selection(engine.as_ref());

        let speed = st.speeds.speed_for(mode);
        if mode.direction() == TrickDirection::Forward && st.smooth_play {
            info!("Start iframe trick-play {} at {} ms", mode, engine.current_position_ms());
            st.bridge.select_iframe_representation(engine.as_ref());
            engine.set_play_when_ready(true);
            engine.set_playback_speed(speed);
            st.strategy = Strategy::Continuous;
        } else {
            info!("Start seek-based trick-play {} at {} ms", mode, engine.current_position_ms());
            st.bridge.clear_iframe_representation();
            let pacer = self.start_pacer(st, engine, mode, speed);
            st.strategy = Strategy::Pacing(pacer);
        }

        st.mode = mode;
        self.bus.dispatch(TrickPlayEvent::ModeChanged {
            new_mode: mode,
            prev_mode: previous,
        });
    }

    fn start_pacer(&self, st: &ControllerState, engine: &Arc<dyn PlaybackEngine>, mode: TrickMode, speed: f32) -> SeekPacer {
        let clock = ReversibleClock::new(
            mode.direction() == TrickDirection::Forward,
            engine.current_position_ms() * 1000,
            speed,
            Arc::clone(&self.time),
            engine.speed_mapping(),
        );
        let playback = st
            .binding
            .as_ref()
            .map_or_else(|| engine.playback_looper(), |b| b.playback.clone());
        let scheduler = LooperTickScheduler {
            shared: self.this.clone(),
            playback,
            token: CancelToken::new(),
        };
        let mut pacer = SeekPacer::new(clock, Arc::clone(engine), Box::new(scheduler), self.config.pacer_timing());
        pacer.start();
        pacer
    }

    /// Stop whatever realizes the current mode and restore default seek and speed.
    fn teardown_strategy(&self, st: &mut ControllerState, engine: &dyn PlaybackEngine) {
        if let Strategy::Pacing(mut pacer) = std::mem::replace(&mut st.strategy, Strategy::Idle) {
            pacer.stop();
        }
        engine.set_seek_mode(SeekMode::Default);
        engine.set_playback_speed(1.0);
    }

    /// Back to NORMAL without resuming playback.
    fn reset_trick_state(&self, st: &mut ControllerState, engine: &dyn PlaybackEngine, dispatch: bool) {
        self.teardown_strategy(st, engine);
        st.bridge.clear_iframe_representation();
        st.bridge.restore_audio_selection(engine);

        let previous = std::mem::replace(&mut st.mode, TrickMode::Normal);
        debug!("Trick-play state reset, previous mode {}", previous);
        if dispatch && previous != TrickMode::Normal {
            self.bus.dispatch(TrickPlayEvent::ModeChanged {
                new_mode: TrickMode::Normal,
                prev_mode: previous,
            });
        }
    }

    fn switch_to_normal(&self, st: &mut ControllerState, engine: &Arc<dyn PlaybackEngine>, previous: TrickMode) -> usize {
        let position_ms = engine.current_position_ms();
        info!("Stop trick-play {} at {} ms", previous, position_ms);

        self.reset_trick_state(st, engine.as_ref(), false);
        engine.set_play_when_ready(true);

        let recorded = st.history.len();
        if previous.direction() == TrickDirection::Forward {
            let positions = st.history.last_n_positions(engine.current_window().as_ref());
            debug!("Last rendered frame positions (us) {:?}", positions);
            if let Some(&last_us) = positions.first() {
                debug!("Seek to last rendered frame at {} ms", last_us / 1000);
                engine.seek_to(last_us / 1000);
            }
        }

        self.bus.dispatch(TrickPlayEvent::ModeChanged {
            new_mode: TrickMode::Normal,
            prev_mode: previous,
        });
        recorded
    }

    /// Force NORMAL if the current mode can no longer continue at the
    /// current position. Returns true if it exited.
    fn exit_if_timeline_exceeded(&self, st: &mut ControllerState) -> bool {
        let mode = st.mode;
        if mode == TrickMode::Normal {
            return false;
        }
        let Some(engine) = st.engine() else {
            return false;
        };
        let Some(window) = engine.current_window() else {
            return false;
        };
        let position_ms = engine.current_position_ms();
        if self.is_mode_possible(&st.speeds, Some(window), position_ms, mode) {
            return false;
        }
        info!("Trick-play {} reached seek boundary at {} ms, back to NORMAL", mode, position_ms);
        self.switch_to_normal(st, &engine, mode);
        true
    }

    fn on_pacer_tick(&self, token: &CancelToken) {
        let mut st = self.lock();
        // Torn down while this tick waited for the lock
        if token.is_cancelled() {
            return;
        }
        if self.exit_if_timeline_exceeded(&mut st) {
            return;
        }
        if let Strategy::Pacing(pacer) = &mut st.strategy {
            pacer.on_tick();
        }
    }

    fn on_player_event(&self, event: &PlayerEvent) {
        let mut st = self.lock();
        match event {
            PlayerEvent::StateChanged { state, .. } => match state {
                PlaybackState::Idle | PlaybackState::Ended => {
                    debug!("Playback {:?}, metadata invalid", state);
                    st.metadata_valid = false;
                    if let Some(engine) = st.engine() {
                        self.reset_trick_state(&mut st, engine.as_ref(), true);
                    }
                    self.bus.dispatch(TrickPlayEvent::MetadataValid(false));
                }
                PlaybackState::Buffering | PlaybackState::Ready => {
                    self.exit_if_timeline_exceeded(&mut st);
                }
            },
            PlayerEvent::TimelineChanged | PlayerEvent::PositionDiscontinuity => {
                self.exit_if_timeline_exceeded(&mut st);
            }
            PlayerEvent::TracksChanged { groups } => {
                st.metadata_valid = true;
                st.smooth_play = TrackAdaptationBridge::detect_smooth_play(groups);
                st.speeds = self.config.speed_table(st.smooth_play);
                info!(
                    "Tracks changed: smooth play {}, FF1 speed {}",
                    st.smooth_play,
                    st.speeds.speed_for(TrickMode::FF1)
                );
                self.bus.dispatch(TrickPlayEvent::MetadataValid(true));
            }
            PlayerEvent::FrameRendered { presentation_time_us } => {
                if st.mode.is_trick() {
                    st.history.add(*presentation_time_us);
                    if let Strategy::Pacing(pacer) = &mut st.strategy {
                        pacer.on_frame_rendered(*presentation_time_us);
                    }
                    self.bus.dispatch(TrickPlayEvent::FrameRendered {
                        timestamp_us: *presentation_time_us,
                    });
                }
            }
            PlayerEvent::SeekStarted => {
                if let Strategy::Pacing(pacer) = &mut st.strategy {
                    pacer.on_seek_started();
                }
            }
            PlayerEvent::SeekProcessed { position_ms } => {
                if let Strategy::Pacing(pacer) = &mut st.strategy {
                    pacer.on_seek_processed(*position_ms);
                }
            }
        }
    }

    /// Release the bound engine. A trick mode is undone on the old engine
    /// first (audio back on, override cleared, default seek and speed);
    /// returns that mode so the caller can announce the change.
    fn unbind(&self, st: &mut ControllerState) -> Option<TrickMode> {
        let mut exited = None;
        if let Some(engine) = st.engine()
            && st.mode.is_trick()
        {
            exited = Some(st.mode);
            self.reset_trick_state(st, engine.as_ref(), false);
        }
        if let Some(binding) = st.binding.take() {
            if let Strategy::Pacing(mut pacer) = std::mem::replace(&mut st.strategy, Strategy::Idle) {
                pacer.stop();
            }
            binding.token.cancel();
            binding.engine.remove_event_listener(&binding.listener);
            debug!("Trick-play released engine, exited mode {:?}", exited);
        }
        st.strategy = Strategy::Idle;
        st.mode = TrickMode::Normal;
        st.bridge.reset();
        self.bus.unbind();
        exited
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(binding) = st.binding.take() {
            binding.token.cancel();
            binding.engine.remove_event_listener(&binding.listener);
        }
    }
}

/// Engine notification adapter. Holds the controller weakly so the engine
/// never keeps it alive.
struct EngineListener {
    shared: Weak<Shared>,
    token: CancelToken,
}

impl PlayerEventListener for EngineListener {
    fn on_player_event(&self, event: &PlayerEvent) {
        if self.token.is_cancelled() {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.on_player_event(event);
        }
    }
}

/// Posts pacer ticks to the playback looper under a per-pacer token.
struct LooperTickScheduler {
    shared: Weak<Shared>,
    playback: LooperHandle,
    token: CancelToken,
}

impl TickScheduler for LooperTickScheduler {
    fn schedule_tick(&mut self, delay: Duration) {
        let shared = self.shared.clone();
        let token = self.token.clone();
        self.playback.post_cancellable(&self.token, delay, move || {
            if let Some(shared) = shared.upgrade() {
                shared.on_pacer_tick(&token);
            }
        });
    }

    fn cancel_all(&mut self) {
        self.token.cancel();
    }
}

struct ModeProbe {
    shared: Weak<Shared>,
}

impl TrickModeSource for ModeProbe {
    fn current_trick_mode(&self) -> TrickMode {
        self.shared
            .upgrade()
            .map_or(TrickMode::Normal, |shared| shared.lock().mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualTimeSource;
    use crate::core::load_control::DefaultLoadControl;
    use crate::core::tracks::RepresentationOverride;
    use crate::test_utils::{
        CollectingListener, EngineCall, FakeEngine, RecordingSelector, SelectorCall, audio_group, flush, video_group,
    };
    use crossbeam_channel::unbounded;

    struct Rig {
        controller: TrickPlayController,
        engine: Arc<FakeEngine>,
        selector: Arc<RecordingSelector>,
        listener: Arc<CollectingListener>,
    }

    impl Rig {
        fn new(duration_ms: i64, position_ms: i64) -> Self {
            let engine = FakeEngine::vod(duration_ms, position_ms);
            let selector = Arc::new(RecordingSelector::default());
            let controller = TrickPlayController::with_time_source(
                selector.clone(),
                TrickPlayConfig::default(),
                Arc::new(ManualTimeSource::new(0)),
            );
            controller.set_player(engine.clone());
            let listener = CollectingListener::new();
            controller.add_event_listener(listener.clone());
            Self {
                controller,
                engine,
                selector,
                listener,
            }
        }

        /// Announce tracks, with or without an iframe representation.
        fn with_tracks(self, iframe: bool) -> Self {
            self.engine.set_track_groups(vec![video_group(iframe), audio_group()]);
            self.engine.emit_tracks();
            self.engine.clear_calls();
            self
        }

        fn drain(&self) {
            flush(&self.engine.playback_looper());
            flush(&self.engine.application_looper());
        }

        fn audio_calls(&self) -> Vec<SelectorCall> {
            self.selector
                .calls()
                .into_iter()
                .filter(|c| matches!(c, SelectorCall::Disabled(..)))
                .collect()
        }
    }

    #[test]
    fn test_forward_boundary_rejected() {
        let rig = Rig::new(100_000, 99_000);
        let result = rig.controller.set_trick_mode(TrickMode::FF1);
        assert_eq!(
            result,
            Err(ModeChangeError::Infeasible {
                requested: TrickMode::FF1,
                position_ms: 99_000
            })
        );
        assert_eq!(rig.controller.current_trick_mode(), TrickMode::Normal);
        assert!(rig.engine.calls().is_empty());
        rig.drain();
        assert!(rig.listener.events().is_empty());
    }

    #[test]
    fn test_reverse_needs_one_second() {
        let rig = Rig::new(100_000, 999);
        assert!(matches!(
            rig.controller.set_trick_mode(TrickMode::FR1),
            Err(ModeChangeError::Infeasible { .. })
        ));

        rig.engine.set_position_ms(1000);
        assert_eq!(rig.controller.set_trick_mode(TrickMode::FR1), Ok(0));
        assert_eq!(rig.controller.current_trick_direction(), TrickDirection::Reverse);
    }

    #[test]
    fn test_same_mode_is_rejected_without_event() {
        let rig = Rig::new(100_000, 10_000).with_tracks(true);
        assert_eq!(
            rig.controller.set_trick_mode(TrickMode::Normal),
            Err(ModeChangeError::AlreadyInMode(TrickMode::Normal))
        );
        assert_eq!(rig.controller.set_trick_mode(TrickMode::FF1), Ok(0));
        let calls_before = rig.engine.calls();
        assert_eq!(
            rig.controller.set_trick_mode(TrickMode::FF1),
            Err(ModeChangeError::AlreadyInMode(TrickMode::FF1))
        );
        assert_eq!(rig.engine.calls(), calls_before);

        rig.drain();
        assert_eq!(rig.listener.mode_changes(), vec![(TrickMode::FF1, TrickMode::Normal)]);
    }

    #[test]
    fn test_unbound_controller_rejects() {
        let controller = TrickPlayController::new(Arc::new(RecordingSelector::default()));
        assert_eq!(controller.set_trick_mode(TrickMode::FF1), Err(ModeChangeError::NoPlayer));
        assert_eq!(controller.largest_safe_seek_position_ms(), None);
        assert!(!controller.seek_to_nth_played_frame(0));
    }

    #[test]
    fn test_direction_reversal_rejected() {
        let rig = Rig::new(100_000, 50_000).with_tracks(true);
        rig.controller.set_trick_mode(TrickMode::FF2).unwrap();
        assert_eq!(
            rig.controller.set_trick_mode(TrickMode::FR1),
            Err(ModeChangeError::DirectionReversal {
                current: TrickMode::FF2,
                requested: TrickMode::FR1
            })
        );
        assert_eq!(rig.controller.current_trick_mode(), TrickMode::FF2);
        // Same direction is fine
        assert_eq!(rig.controller.set_trick_mode(TrickMode::FF3), Ok(0));
    }

    #[test]
    fn test_forward_with_iframes_is_continuous() {
        let rig = Rig::new(100_000, 10_000).with_tracks(true);
        assert!(rig.controller.is_smooth_play_available());
        assert_eq!(rig.controller.set_trick_mode(TrickMode::FF2), Ok(0));

        assert_eq!(rig.controller.active_strategy(), ActiveStrategy::Continuous);
        assert_eq!(
            rig.engine.calls(),
            vec![
                EngineCall::PlayWhenReady(false),
                EngineCall::SeekMode(SeekMode::Default),
                EngineCall::Speed(1.0),
                EngineCall::PlayWhenReady(true),
                EngineCall::Speed(30.0),
            ]
        );
        assert_eq!(
            rig.selector.calls(),
            vec![
                SelectorCall::Disabled(2, true),
                SelectorCall::Override(
                    0,
                    Some(RepresentationOverride {
                        group_index: 0,
                        track_indices: vec![2]
                    })
                ),
            ]
        );
    }

    #[test]
    fn test_without_iframes_uses_pacer_and_attenuated_speed() {
        let rig = Rig::new(100_000, 20_000).with_tracks(false);
        assert!(!rig.controller.is_smooth_play_available());
        assert_eq!(rig.controller.speed_for(TrickMode::FF1), 2.5);

        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        assert_eq!(rig.controller.active_strategy(), ActiveStrategy::SeekPacing);
        let calls = rig.engine.calls();
        assert!(calls.contains(&EngineCall::SeekMode(SeekMode::ClosestSync)));
        assert_eq!(rig.engine.seeks()[0], 20_000);
        assert!(!calls.iter().any(|c| matches!(c, EngineCall::Speed(s) if *s != 1.0)));
    }

    #[test]
    fn test_reverse_with_iframes_still_paces() {
        let rig = Rig::new(100_000, 20_000).with_tracks(true);
        rig.controller.set_trick_mode(TrickMode::FR1).unwrap();
        assert_eq!(rig.controller.active_strategy(), ActiveStrategy::SeekPacing);
    }

    #[test]
    fn test_audio_restored_on_normal() {
        let rig = Rig::new(100_000, 20_000).with_tracks(true);
        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        rig.controller.set_trick_mode(TrickMode::FF2).unwrap();
        rig.controller.set_trick_mode(TrickMode::Normal).unwrap();

        assert_eq!(
            rig.audio_calls(),
            vec![SelectorCall::Disabled(2, true), SelectorCall::Disabled(2, true), SelectorCall::Disabled(2, false)]
        );
        assert_eq!(rig.controller.active_strategy(), ActiveStrategy::None);
        assert_eq!(rig.selector.calls().last(), Some(&SelectorCall::Disabled(2, false)));
    }

    #[test]
    fn test_exit_seeks_to_last_rendered_frame() {
        let rig = Rig::new(100_000, 30_000).with_tracks(true);
        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        rig.engine.emit(PlayerEvent::FrameRendered {
            presentation_time_us: 30_000_000,
        });
        rig.engine.emit(PlayerEvent::FrameRendered {
            presentation_time_us: 30_500_000,
        });

        assert_eq!(rig.controller.set_trick_mode(TrickMode::Normal), Ok(2));
        assert_eq!(rig.engine.seeks(), vec![30_500]);
        assert_eq!(rig.engine.calls().last(), Some(&EngineCall::SeekTo(30_500)));
        assert_eq!(rig.controller.played_frame_positions_ms(), vec![30_500, 30_000]);

        rig.drain();
        assert_eq!(
            rig.listener.mode_changes(),
            vec![(TrickMode::FF1, TrickMode::Normal), (TrickMode::Normal, TrickMode::FF1)]
        );
    }

    #[test]
    fn test_history_recreated_when_leaving_normal() {
        let rig = Rig::new(100_000, 30_000).with_tracks(true);
        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        rig.engine.emit(PlayerEvent::FrameRendered {
            presentation_time_us: 31_000_000,
        });
        rig.controller.set_trick_mode(TrickMode::Normal).unwrap();
        // Frames in NORMAL are not recorded
        rig.engine.emit(PlayerEvent::FrameRendered {
            presentation_time_us: 32_000_000,
        });
        assert_eq!(rig.controller.played_frame_positions_ms(), vec![31_000]);

        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        assert!(rig.controller.played_frame_positions_ms().is_empty());
    }

    #[test]
    fn test_seek_to_nth_played_frame() {
        let rig = Rig::new(100_000, 10_000).with_tracks(true);
        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        for pts in [10_000_000, 11_000_000, 12_000_000] {
            rig.engine.emit(PlayerEvent::FrameRendered {
                presentation_time_us: pts,
            });
        }
        rig.engine.clear_calls();

        assert!(rig.controller.seek_to_nth_played_frame(1));
        assert_eq!(rig.engine.seeks(), vec![11_000]);
        assert!(!rig.controller.seek_to_nth_played_frame(3));
        assert_eq!(rig.engine.seeks().len(), 1);
    }

    #[test]
    fn test_frame_events_only_reach_internal_listeners() {
        let rig = Rig::new(100_000, 10_000).with_tracks(true);
        let internal = CollectingListener::new();
        rig.controller.add_event_listener_internal(internal.clone());
        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        rig.engine.emit(PlayerEvent::FrameRendered {
            presentation_time_us: 10_100_000,
        });
        rig.drain();

        assert!(internal.events().contains(&TrickPlayEvent::FrameRendered {
            timestamp_us: 10_100_000
        }));
        assert!(
            !rig.listener
                .events()
                .iter()
                .any(|e| matches!(e, TrickPlayEvent::FrameRendered { .. }))
        );
    }

    #[test]
    fn test_state_change_at_boundary_forces_normal() {
        let rig = Rig::new(100_000, 50_000).with_tracks(true);
        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        rig.engine.set_position_ms(99_000);
        rig.engine.emit(PlayerEvent::StateChanged {
            play_when_ready: true,
            state: PlaybackState::Ready,
        });

        assert_eq!(rig.controller.current_trick_mode(), TrickMode::Normal);
        assert_eq!(rig.audio_calls().last(), Some(&SelectorCall::Disabled(2, false)));
        rig.drain();
        assert_eq!(
            rig.listener.mode_changes(),
            vec![(TrickMode::FF1, TrickMode::Normal), (TrickMode::Normal, TrickMode::FF1)]
        );
    }

    #[test]
    fn test_idle_invalidates_metadata_and_resets() {
        let rig = Rig::new(100_000, 50_000).with_tracks(true);
        assert!(rig.controller.is_metadata_valid());
        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        rig.engine.emit(PlayerEvent::StateChanged {
            play_when_ready: false,
            state: PlaybackState::Idle,
        });

        assert!(!rig.controller.is_metadata_valid());
        assert_eq!(rig.controller.current_trick_mode(), TrickMode::Normal);
        rig.drain();
        assert_eq!(
            rig.listener.events(),
            vec![
                TrickPlayEvent::MetadataValid(true),
                TrickPlayEvent::ModeChanged {
                    new_mode: TrickMode::FF1,
                    prev_mode: TrickMode::Normal
                },
                TrickPlayEvent::ModeChanged {
                    new_mode: TrickMode::Normal,
                    prev_mode: TrickMode::FF1
                },
                TrickPlayEvent::MetadataValid(false),
            ]
        );
    }

    #[test]
    fn test_pacer_tick_exits_at_reverse_boundary() {
        let rig = Rig::new(100_000, 5_000);
        let (tx, rx) = unbounded();
        rig.controller.add_event_listener_internal(Arc::new(move |event: &TrickPlayEvent| {
            if let TrickPlayEvent::ModeChanged { new_mode, .. } = event {
                let _ = tx.send(*new_mode);
            }
        }));

        rig.controller.set_trick_mode(TrickMode::FR1).unwrap();
        assert_eq!(rig.controller.active_strategy(), ActiveStrategy::SeekPacing);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), TrickMode::FR1);

        // Next tick sees the position inside the reverse margin
        rig.engine.set_position_ms(900);
        assert_eq!(rx.recv_timeout(Duration::from_secs(3)).unwrap(), TrickMode::Normal);
        assert_eq!(rig.controller.current_trick_mode(), TrickMode::Normal);
        assert_eq!(rig.controller.active_strategy(), ActiveStrategy::None);
    }

    #[test]
    fn test_exit_to_normal_silences_queued_ticks() {
        let rig = Rig::new(100_000, 20_000);
        rig.controller.set_trick_mode(TrickMode::FR1).unwrap();
        rig.controller.set_trick_mode(TrickMode::Normal).unwrap();
        let seeks = rig.engine.seeks();

        std::thread::sleep(Duration::from_millis(500));
        flush(&rig.engine.playback_looper());
        assert_eq!(rig.engine.seeks(), seeks);
        assert_eq!(rig.engine.calls().last(), Some(&EngineCall::PlayWhenReady(true)));
    }

    #[test]
    fn test_superseded_pacer_ticks_do_nothing() {
        let engine = FakeEngine::vod(100_000, 20_000);
        let time = Arc::new(ManualTimeSource::new(0));
        let controller = TrickPlayController::with_time_source(
            Arc::new(RecordingSelector::default()),
            TrickPlayConfig::default(),
            time.clone(),
        );
        controller.set_player(engine.clone());

        controller.set_trick_mode(TrickMode::FR1).unwrap();
        // FR1 clock now reads 18_500 ms; FR2 starts from the engine position
        time.advance_ms(100);
        controller.set_trick_mode(TrickMode::FR2).unwrap();
        engine.clear_calls();

        // One FR2 tick is due in this window; the queued FR1 tick must not add a second
        std::thread::sleep(Duration::from_millis(500));
        flush(&engine.playback_looper());
        assert_eq!(engine.seeks(), vec![20_000]);
    }

    #[test]
    fn test_remove_player_reference_releases_everything() {
        let rig = Rig::new(100_000, 20_000);
        rig.controller.set_trick_mode(TrickMode::FR1).unwrap();
        assert_eq!(rig.engine.listener_count(), 1);

        rig.controller.remove_player_reference();
        assert_eq!(rig.engine.listener_count(), 0);
        assert_eq!(rig.controller.current_trick_mode(), TrickMode::Normal);
        assert_eq!(rig.controller.active_strategy(), ActiveStrategy::None);
        assert_eq!(rig.controller.set_trick_mode(TrickMode::FF1), Err(ModeChangeError::NoPlayer));

        // Pacer ticks already queued are cancelled
        let seeks = rig.engine.seeks().len();
        std::thread::sleep(Duration::from_millis(400));
        flush(&rig.engine.playback_looper());
        assert_eq!(rig.engine.seeks().len(), seeks);
    }

    #[test]
    fn test_set_player_rebinds_and_resets() {
        let rig = Rig::new(100_000, 20_000).with_tracks(true);
        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        rig.drain();
        rig.engine.clear_calls();

        let other = FakeEngine::vod(50_000, 0);
        rig.controller.set_player(other.clone());
        assert_eq!(rig.engine.listener_count(), 0);
        assert_eq!(other.listener_count(), 1);
        assert_eq!(rig.controller.current_trick_mode(), TrickMode::Normal);
        assert_eq!(rig.controller.largest_safe_seek_position_ms(), Some(50_000));

        // Trick state undone on the released engine and the shared selector
        let calls = rig.selector.calls();
        assert!(calls.contains(&SelectorCall::Disabled(2, false)));
        assert!(calls.contains(&SelectorCall::Override(0, None)));
        assert_eq!(
            rig.engine.calls(),
            vec![EngineCall::SeekMode(SeekMode::Default), EngineCall::Speed(1.0)]
        );
        assert!(other.calls().is_empty());

        flush(&other.application_looper());
        assert_eq!(
            rig.listener.mode_changes(),
            vec![(TrickMode::FF1, TrickMode::Normal), (TrickMode::Normal, TrickMode::FF1)]
        );
    }

    #[test]
    fn test_remove_player_reference_restores_tracks() {
        let rig = Rig::new(100_000, 20_000).with_tracks(true);
        rig.controller.set_trick_mode(TrickMode::FF2).unwrap();
        rig.controller.remove_player_reference();

        assert_eq!(rig.audio_calls(), vec![SelectorCall::Disabled(2, true), SelectorCall::Disabled(2, false)]);
        assert!(rig.selector.calls().contains(&SelectorCall::Override(0, None)));
        assert_eq!(rig.engine.calls().last(), Some(&EngineCall::Speed(1.0)));
    }

    #[test]
    fn test_bounded_seek_clamps_to_window() {
        let rig = Rig::new(60_000, 1_000);
        assert_eq!(rig.controller.bounded_seek_to(90_000), Some(60_000));
        assert_eq!(rig.controller.bounded_seek_to(-5), Some(0));
        assert_eq!(rig.controller.bounded_seek_to(12_345), Some(12_345));
        assert_eq!(rig.engine.seeks(), vec![60_000, 0, 12_345]);
    }

    #[test]
    fn test_load_control_and_gate_follow_mode() {
        let rig = Rig::new(100_000, 20_000).with_tracks(true);
        let modes = rig.controller.mode_source();
        assert_eq!(modes.current_trick_mode(), TrickMode::Normal);
        rig.controller.set_trick_mode(TrickMode::FF1).unwrap();
        assert_eq!(modes.current_trick_mode(), TrickMode::FF1);

        let gate = rig.controller.create_frame_gate();
        assert!(gate.is_active());
    }

    #[test]
    fn test_load_control_back_buffer_follows_mode() {
        let rig = Rig::new(100_000, 20_000).with_tracks(true);
        let control = rig.controller.create_load_control(DefaultLoadControl::default());
        assert_eq!(control.back_buffer_duration_us(), 0);

        rig.controller.set_trick_mode(TrickMode::FR1).unwrap();
        assert_eq!(control.back_buffer_duration_us(), 200_000_000);
        // Start decisions ignore the trick speed
        assert!(control.should_start_playback(2_500_000, -15.0, false));

        rig.controller.set_trick_mode(TrickMode::Normal).unwrap();
        assert_eq!(control.back_buffer_duration_us(), 0);

        let filter = rig.controller.create_format_filter();
        let group = video_group(true);
        let (hd, iframe) = (&group.formats[1], &group.formats[2]);
        assert!(filter.can_select_format(iframe, iframe.bitrate, 15.0, 1_000_000));
        assert!(!filter.can_select_format(hd, hd.bitrate, 15.0, u64::MAX));
    }
}
