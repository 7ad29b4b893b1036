//! Error types for mode requests and configuration.

use crate::core::mode::TrickMode;
use std::path::PathBuf;

/// Why a [`set_trick_mode`](crate::TrickPlayController::set_trick_mode) request was refused.
///
/// None of these change controller state or emit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChangeError {
    /// Requested mode is already the current mode.
    AlreadyInMode(TrickMode),
    /// No playback engine bound.
    NoPlayer,
    /// Direct forward <-> reverse switch; go through NORMAL first.
    DirectionReversal { current: TrickMode, requested: TrickMode },
    /// Too close to the seekable window boundary for the requested mode.
    Infeasible { requested: TrickMode, position_ms: i64 },
}

impl std::fmt::Display for ModeChangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeChangeError::AlreadyInMode(mode) => write!(f, "Already in mode {}", mode),
            ModeChangeError::NoPlayer => write!(f, "No player bound"),
            ModeChangeError::DirectionReversal { current, requested } => {
                write!(f, "Cannot reverse direction from {} to {} without NORMAL", current, requested)
            }
            ModeChangeError::Infeasible { requested, position_ms } => {
                write!(f, "Mode {} not possible at position {} ms", requested, position_ms)
            }
        }
    }
}

impl std::error::Error for ModeChangeError {}

/// Configuration, script and simulator failures.
#[derive(Debug)]
pub enum TrickPlayError {
    ConfigRead { path: PathBuf, source: std::io::Error },
    ConfigParse { path: PathBuf, source: serde_json::Error },
    InvalidConfig(String),
    InvalidScript(String),
    Spawn(std::io::Error),
}

impl std::fmt::Display for TrickPlayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrickPlayError::ConfigRead { path, source } => {
                write!(f, "Failed to read config {}: {}", path.display(), source)
            }
            TrickPlayError::ConfigParse { path, source } => {
                write!(f, "Failed to parse config {}: {}", path.display(), source)
            }
            TrickPlayError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            TrickPlayError::InvalidScript(msg) => write!(f, "Invalid script: {}", msg),
            TrickPlayError::Spawn(e) => write!(f, "Failed to start thread: {}", e),
        }
    }
}

impl std::error::Error for TrickPlayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrickPlayError::ConfigRead { source, .. } => Some(source),
            TrickPlayError::ConfigParse { source, .. } => Some(source),
            TrickPlayError::Spawn(source) => Some(source),
            TrickPlayError::InvalidConfig(_) | TrickPlayError::InvalidScript(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_change_error_messages() {
        let err = ModeChangeError::DirectionReversal {
            current: TrickMode::FF2,
            requested: TrickMode::FR1,
        };
        assert_eq!(err.to_string(), "Cannot reverse direction from FF2 to FR1 without NORMAL");
        assert_eq!(
            ModeChangeError::Infeasible {
                requested: TrickMode::FF1,
                position_ms: 99_000
            }
            .to_string(),
            "Mode FF1 not possible at position 99000 ms"
        );
    }
}
