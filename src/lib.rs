//! Trick-play (fast forward / rewind) controller for a media playback engine.
//!
//! The controller switches between normal playback, high speed continuous
//! playback and seek pacing, restores the viewer's tracks on exit and keeps a
//! short history of the frames shown during trick-play.

pub mod core;

pub mod cli;
pub mod config;
pub mod error;
pub mod paths;
pub mod sim;

#[cfg(test)]
mod test_utils;

pub use core::controller::{ActiveStrategy, TrickPlayController};
pub use core::event_bus::{Affinity, TrickPlayEvent, TrickPlayListener};
pub use core::mode::{TrickDirection, TrickMode};
pub use error::{ModeChangeError, TrickPlayError};
