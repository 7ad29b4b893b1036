//! Trick modes, scan direction and the per-mode speed table.
//!
//! Seven discrete modes: normal plus three forward and three reverse
//! scan speeds. The speed for a mode is not a property of the enum itself,
//! it comes from a [`SpeedTable`] that is rebuilt whenever iframe track
//! availability for the current source is learned.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Playback mode requested by the application.
///
/// Declaration order is the ordinal used to index [`SpeedTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrickMode {
    FF1,
    FF2,
    FF3,
    Normal,
    FR1,
    FR2,
    FR3,
}

/// Scan direction implied by a [`TrickMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrickDirection {
    Forward,
    None,
    Reverse,
}

impl TrickMode {
    /// All modes in ordinal order.
    pub const ALL: [TrickMode; 7] = [
        TrickMode::FF1,
        TrickMode::FF2,
        TrickMode::FF3,
        TrickMode::Normal,
        TrickMode::FR1,
        TrickMode::FR2,
        TrickMode::FR3,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn direction(self) -> TrickDirection {
        match self {
            TrickMode::FF1 | TrickMode::FF2 | TrickMode::FF3 => TrickDirection::Forward,
            TrickMode::Normal => TrickDirection::None,
            TrickMode::FR1 | TrickMode::FR2 | TrickMode::FR3 => TrickDirection::Reverse,
        }
    }

    /// Intensity within the direction: 0 for normal, 1..=3 for scan modes.
    pub fn level(self) -> u8 {
        match self {
            TrickMode::Normal => 0,
            TrickMode::FF1 | TrickMode::FR1 => 1,
            TrickMode::FF2 | TrickMode::FR2 => 2,
            TrickMode::FF3 | TrickMode::FR3 => 3,
        }
    }

    pub fn is_trick(self) -> bool {
        self != TrickMode::Normal
    }

    /// Next mode when a single fast-forward or rewind key is pressed repeatedly.
    ///
    /// Steps 1 -> 2 -> 3 within the direction and stays on 3. Pressing the
    /// key for the other direction (or from normal) starts at level 1.
    /// `TrickDirection::None` always yields [`TrickMode::Normal`].
    pub fn next_in_direction(self, direction: TrickDirection) -> TrickMode {
        match direction {
            TrickDirection::None => TrickMode::Normal,
            TrickDirection::Forward => match self {
                TrickMode::FF1 => TrickMode::FF2,
                TrickMode::FF2 | TrickMode::FF3 => TrickMode::FF3,
                _ => TrickMode::FF1,
            },
            TrickDirection::Reverse => match self {
                TrickMode::FR1 => TrickMode::FR2,
                TrickMode::FR2 | TrickMode::FR3 => TrickMode::FR3,
                _ => TrickMode::FR1,
            },
        }
    }

    /// Parse the short names used by the simulator command script.
    pub fn from_name(name: &str) -> Option<TrickMode> {
        match name.to_ascii_lowercase().as_str() {
            "ff1" => Some(TrickMode::FF1),
            "ff2" => Some(TrickMode::FF2),
            "ff3" => Some(TrickMode::FF3),
            "normal" | "play" => Some(TrickMode::Normal),
            "fr1" => Some(TrickMode::FR1),
            "fr2" => Some(TrickMode::FR2),
            "fr3" => Some(TrickMode::FR3),
            _ => None,
        }
    }
}

impl fmt::Display for TrickMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrickMode::FF1 => "FF1",
            TrickMode::FF2 => "FF2",
            TrickMode::FF3 => "FF3",
            TrickMode::Normal => "NORMAL",
            TrickMode::FR1 => "FR1",
            TrickMode::FR2 => "FR2",
            TrickMode::FR3 => "FR3",
        };
        f.write_str(name)
    }
}

/// Read-only view of the current mode, for components that only need to
/// know whether trick-play is on (buffering policy, render gate).
pub trait TrickModeSource: Send + Sync {
    fn current_trick_mode(&self) -> TrickMode;
}

/// Signed playback speed for every [`TrickMode`], indexed by ordinal.
///
/// Immutable once built. The controller swaps in a new table when iframe
/// availability changes instead of patching entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedTable {
    speeds: [f32; 7],
}

impl SpeedTable {
    /// Build the table from base level speeds (levels 1..=3, positive).
    ///
    /// Without iframes every scan speed is divided by `non_iframe_divisor`,
    /// normal stays at 1.0.
    pub fn build(base: [f32; 3], iframes_available: bool, non_iframe_divisor: f32) -> Self {
        let divisor = if iframes_available { 1.0 } else { non_iframe_divisor };
        let mut speeds = [1.0; 7];
        for mode in TrickMode::ALL {
            let level = mode.level();
            if level == 0 {
                continue;
            }
            let magnitude = base[usize::from(level) - 1] / divisor;
            speeds[mode.ordinal()] = match mode.direction() {
                TrickDirection::Reverse => -magnitude,
                _ => magnitude,
            };
        }
        Self { speeds }
    }

    pub fn speed_for(&self, mode: TrickMode) -> f32 {
        self.speeds[mode.ordinal()]
    }
}
