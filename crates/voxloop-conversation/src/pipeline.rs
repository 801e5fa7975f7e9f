use std::path::{Path, PathBuf};
use thiserror::Error;
use voxloop_vad::Utterance;

/// Errors from the downstream answer pipeline, by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Context retrieval failed: {0}")]
    Retrieval(String),

    #[error("Response generation failed: {0}")]
    Generation(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio encoding error: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// One finalized utterance as linear PCM, ready for the answer pipeline.
#[derive(Debug, Clone)]
pub struct UtteranceAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    /// Stream timestamp of the utterance's first frame; results carry it so
    /// consumers can correlate answers with what they said when.
    pub captured_at_ms: u64,
}

impl UtteranceAudio {
    pub fn from_utterance(utterance: Utterance, sample_rate: u32) -> Self {
        let captured_at_ms = utterance.started_at_ms();
        Self {
            samples: utterance.into_samples(),
            sample_rate,
            captured_at_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    /// Persist as a 16-bit mono WAV for pipelines that take file input.
    pub fn write_wav(&self, path: &Path) -> Result<(), PipelineError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer =
            hound::WavWriter::create(path, spec).map_err(|e| PipelineError::Encoding(e.to_string()))?;
        for &sample in &self.samples {
            writer
                .write_sample(sample)
                .map_err(|e| PipelineError::Encoding(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| PipelineError::Encoding(e.to_string()))
    }
}

/// What the downstream pipeline returns for one utterance.
#[derive(Debug, Clone)]
pub struct AnswerReply {
    pub transcript: String,
    pub response_text: String,
    /// Synthesized speech on disk, when the pipeline produced audio.
    pub audio_path: Option<PathBuf>,
    /// Source documents that grounded the response.
    pub sources: Vec<String>,
}

/// The full transcribe -> retrieve -> generate -> synthesize pipeline,
/// invoked as a single blocking call from the coordinator thread.
///
/// Implementations own their models and state; the engine never inspects
/// them. Errors are converted to failure results, never crash the loop.
pub trait AnswerPipeline: Send {
    fn answer(&mut self, audio: &UtteranceAudio) -> Result<AnswerReply, PipelineError>;
}
