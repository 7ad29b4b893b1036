//! Trick-play engine modules: mode model, clock, pacing, controller, and the
//! engine surface they drive.

pub mod clock;
pub mod controller;
pub mod engine;
pub mod event_bus;
pub mod history;
pub mod load_control;
pub mod looper;
pub mod mode;
pub mod pacer;
pub mod render_gate;
pub mod tracks;

pub use clock::{ReversibleClock, SystemTimeSource, TimeSource};
pub use controller::TrickPlayController;
pub use engine::{PlaybackEngine, PlaybackWindow, PlayerEvent};
pub use event_bus::EventBus;
pub use looper::{CancelToken, Looper, LooperHandle};
pub use mode::{SpeedTable, TrickDirection, TrickMode};
