use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::coordinator::CoordinatorConfig;
use voxloop_audio::CaptureConfig;
use voxloop_foundation::EngineError;
use voxloop_vad::SegmenterConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub enabled: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Complete engine configuration, explicitly constructed and passed in; no
/// process-wide mutable config object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub capture: CaptureConfig,
    pub segmenter: SegmenterConfig,
    pub coordinator: CoordinatorConfig,
    pub playback: PlaybackConfig,
}

impl ConversationConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.capture.sample_rate_hz == 0 {
            return Err(EngineError::Config("sample_rate_hz must be non-zero".into()));
        }
        if self.capture.frame_duration_ms == 0 {
            return Err(EngineError::Config(
                "frame_duration_ms must be non-zero".into(),
            ));
        }
        if self.capture.frame_duration_ms != self.segmenter.frame_duration_ms {
            return Err(EngineError::Config(format!(
                "capture frame duration ({} ms) and segmenter frame duration ({} ms) must match",
                self.capture.frame_duration_ms, self.segmenter.frame_duration_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.segmenter.vad_threshold) {
            return Err(EngineError::Config(format!(
                "vad_threshold {} outside [0, 1]",
                self.segmenter.vad_threshold
            )));
        }
        if self.coordinator.queue_capacity == 0 {
            return Err(EngineError::Config("queue_capacity must be non-zero".into()));
        }
        if self.coordinator.poll_interval_ms == 0 {
            return Err(EngineError::Config(
                "poll_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
