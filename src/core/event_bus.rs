//! Dual-affinity event bus for trick-play notifications.
//!
//! Architecture:
//! - Listeners register with an [`Affinity`]: PLAYBACK (engine thread) or
//!   APPLICATION (thread that owns the engine, usually UI)
//! - `dispatch()` never calls a listener inline. Every delivery is posted to
//!   the looper for the listener's affinity, so a listener can call back into
//!   the controller without re-entering the call that produced the event
//! - Delivery order per affinity is FIFO (looper order)
//! - Unbinding cancels deliveries that are still queued
//!
//! `FrameRendered` is high frequency and only goes to PLAYBACK listeners.

use crate::core::looper::{CancelToken, LooperHandle};
use crate::core::mode::TrickMode;
use log::trace;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Which thread a listener is called back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affinity {
    Playback,
    Application,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrickPlayEvent {
    /// Track metadata for the current source is known (or was invalidated).
    MetadataValid(bool),
    /// Mode changed, by request or by a forced exit at a boundary.
    ModeChanged { new_mode: TrickMode, prev_mode: TrickMode },
    /// A frame was rendered while in a trick mode.
    FrameRendered { timestamp_us: i64 },
}

pub trait TrickPlayListener: Send + Sync {
    fn on_event(&self, event: &TrickPlayEvent);
}

// Closures are listeners
impl<F> TrickPlayListener for F
where
    F: Fn(&TrickPlayEvent) + Send + Sync,
{
    fn on_event(&self, event: &TrickPlayEvent) {
        self(event)
    }
}

struct Registration {
    listener: Arc<dyn TrickPlayListener>,
    affinity: Affinity,
}

struct BoundQueues {
    playback: LooperHandle,
    application: LooperHandle,
    token: CancelToken,
}

impl BoundQueues {
    fn for_affinity(&self, affinity: Affinity) -> &LooperHandle {
        match affinity {
            Affinity::Playback => &self.playback,
            Affinity::Application => &self.application,
        }
    }
}

fn same_listener(a: &Arc<dyn TrickPlayListener>, b: &Arc<dyn TrickPlayListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[derive(Clone, Default)]
pub struct EventBus {
    registrations: Arc<RwLock<Vec<Registration>>>,
    queues: Arc<RwLock<Option<BoundQueues>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the loopers deliveries are posted to.
    pub fn bind(&self, playback: LooperHandle, application: LooperHandle) {
        let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = queues.take() {
            old.token.cancel();
        }
        *queues = Some(BoundQueues {
            playback,
            application,
            token: CancelToken::new(),
        });
    }

    /// Detach loopers and drop every delivery still queued.
    pub fn unbind(&self) {
        if let Some(old) = self.queues.write().unwrap_or_else(|e| e.into_inner()).take() {
            old.token.cancel();
        }
    }

    /// Register `listener`; returns false if already registered with this affinity.
    pub fn add_listener(&self, listener: Arc<dyn TrickPlayListener>, affinity: Affinity) -> bool {
        let mut regs = self.registrations.write().unwrap_or_else(|e| e.into_inner());
        if regs
            .iter()
            .any(|r| r.affinity == affinity && same_listener(&r.listener, &listener))
        {
            return false;
        }
        regs.push(Registration { listener, affinity });
        true
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TrickPlayListener>, affinity: Affinity) {
        self.registrations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|r| !(r.affinity == affinity && same_listener(&r.listener, listener)));
    }

    pub fn clear(&self) {
        self.registrations.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn listener_count(&self) -> usize {
        self.registrations.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Post `event` to every interested listener's looper.
    pub fn dispatch(&self, event: TrickPlayEvent) {
        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());
        let Some(queues) = queues.as_ref() else {
            trace!("EventBus unbound, dropping {:?}", event);
            return;
        };
        let frame_event = matches!(event, TrickPlayEvent::FrameRendered { .. });

        for reg in self.registrations.read().unwrap_or_else(|e| e.into_inner()).iter() {
            if frame_event && reg.affinity != Affinity::Playback {
                continue;
            }
            let listener = Arc::clone(&reg.listener);
            queues
                .for_affinity(reg.affinity)
                .post_cancellable(&queues.token, Duration::ZERO, move || listener.on_event(&event));
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("bound", &self.queues.read().map(|q| q.is_some()).unwrap_or(false))
            .finish()
    }
}
