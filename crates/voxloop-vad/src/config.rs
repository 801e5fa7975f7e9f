use serde::{Deserialize, Serialize};

/// Utterance segmentation parameters.
///
/// `frame_duration_ms` must match the duration of the frames the capture
/// pipeline produces; the accumulators advance by this amount per frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Probabilities strictly above this count as speech.
    pub vad_threshold: f32,
    /// Spans with less accumulated speech than this are discarded as noise.
    pub min_speech_duration_ms: u32,
    /// Trailing silence required before an utterance is finalized.
    pub min_silence_duration_ms: u32,
    /// Reserved: trailing padding is currently bounded by
    /// `min_silence_duration_ms` rather than by this knob.
    pub speech_pad_ms: u32,
    pub frame_duration_ms: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.5,
            min_speech_duration_ms: 500,
            min_silence_duration_ms: 800,
            speech_pad_ms: 300,
            frame_duration_ms: 500,
        }
    }
}

impl SegmenterConfig {
    pub fn responsive() -> Self {
        Self {
            vad_threshold: 0.4,
            min_speech_duration_ms: 250,
            min_silence_duration_ms: 500,
            speech_pad_ms: 150,
            frame_duration_ms: 250,
        }
    }

    pub fn noisy_environment() -> Self {
        Self {
            vad_threshold: 0.6,
            min_speech_duration_ms: 700,
            min_silence_duration_ms: 1000,
            ..Default::default()
        }
    }
}
