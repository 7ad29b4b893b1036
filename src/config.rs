//! Trick-play tuning loaded from `trickplay.json`.
//!
//! Every field has a default, so a partial file (or none at all) is fine.

use crate::core::mode::SpeedTable;
use crate::core::pacer::PacerTiming;
use crate::core::tracks::IframeAwareFormatFilter;
use crate::error::TrickPlayError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name looked up by [`crate::paths::config_file`].
pub const CONFIG_FILE_NAME: &str = "trickplay.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrickPlayConfig {
    /// Seek pacing target cadence.
    pub target_fps: u32,
    /// Seek pacing floor; below it the pacer parks until the next render.
    pub min_fps: u32,
    /// Forward modes need `speed * this` ms between position and window end.
    pub forward_tolerance_ms_per_speed: i64,
    /// Reverse modes need at least this position.
    pub reverse_min_position_ms: i64,
    /// FF1/FF2/FF3 magnitudes; reverse modes mirror them.
    pub base_speeds: [f32; 3],
    /// Scan speeds are divided by this when the source has no iframe track.
    pub non_iframe_speed_divisor: f32,
    /// Above this |speed| adaptive selection only admits iframe formats.
    pub iframe_speed_threshold: f32,
    /// Back buffer kept while in any trick mode.
    pub trick_back_buffer_ms: i64,
    /// Render rate limit in forward trick modes.
    pub render_gate_fps: u32,
}

impl Default for TrickPlayConfig {
    fn default() -> Self {
        Self {
            target_fps: 3,
            min_fps: 1,
            forward_tolerance_ms_per_speed: 100,
            reverse_min_position_ms: 1000,
            base_speeds: [15.0, 30.0, 60.0],
            non_iframe_speed_divisor: 6.0,
            iframe_speed_threshold: 6.0,
            trick_back_buffer_ms: 200_000,
            render_gate_fps: 15,
        }
    }
}

impl TrickPlayConfig {
    /// Load from `path`. A missing file yields defaults; a malformed or
    /// invalid one is an error.
    pub fn load(path: &Path) -> Result<Self, TrickPlayError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| TrickPlayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| TrickPlayError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!("Loaded trick-play config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrickPlayError> {
        if self.target_fps == 0 || self.min_fps == 0 {
            return Err(TrickPlayError::InvalidConfig("frame rates must be non-zero".into()));
        }
        if self.min_fps > self.target_fps {
            return Err(TrickPlayError::InvalidConfig(format!(
                "min_fps {} above target_fps {}",
                self.min_fps, self.target_fps
            )));
        }
        if self.non_iframe_speed_divisor <= 0.0 {
            return Err(TrickPlayError::InvalidConfig("non_iframe_speed_divisor must be positive".into()));
        }
        if self.base_speeds.iter().any(|s| *s <= 0.0) {
            return Err(TrickPlayError::InvalidConfig("base_speeds must be positive".into()));
        }
        if self.forward_tolerance_ms_per_speed < 0 || self.reverse_min_position_ms < 0 {
            return Err(TrickPlayError::InvalidConfig("boundary tolerances must not be negative".into()));
        }
        Ok(())
    }

    pub fn pacer_timing(&self) -> PacerTiming {
        PacerTiming::from_fps(self.target_fps, self.min_fps)
    }

    pub fn speed_table(&self, iframes_available: bool) -> SpeedTable {
        SpeedTable::build(self.base_speeds, iframes_available, self.non_iframe_speed_divisor)
    }

    pub fn format_filter(&self) -> IframeAwareFormatFilter {
        IframeAwareFormatFilter {
            speed_threshold: self.iframe_speed_threshold,
        }
    }
}
