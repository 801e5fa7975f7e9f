//! Shared synthetic collaborators for engine integration tests.
#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use voxloop_audio::{AudioProducer, FrameInput, InputStreamConfig};
use voxloop_conversation::{
    AnswerPipeline, AnswerReply, ConversationConfig, ConversationResult, PipelineError,
    UtteranceAudio,
};
use voxloop_foundation::AudioError;
use voxloop_vad::SpeechClassifier;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Engine config tuned for tests: real-time pacing is irrelevant, playback
/// stays off so no output device is needed.
pub fn test_config() -> ConversationConfig {
    let mut config = ConversationConfig::default();
    config.playback.enabled = false;
    config
}

pub const FRAME_SAMPLES: usize = 8_000; // 500 ms at 16 kHz

pub fn speech_block(tag: i16) -> Vec<i16> {
    vec![tag; FRAME_SAMPLES]
}

pub fn silence_block() -> Vec<i16> {
    vec![0i16; FRAME_SAMPLES]
}

/// A `FrameInput` that replays scripted sample blocks from a thread, then
/// idles until stopped. Restartable; replays the script on every start.
pub struct ScriptedInput {
    blocks: Vec<Vec<i16>>,
    stopped: Arc<AtomicBool>,
    running: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

impl ScriptedInput {
    pub fn new(blocks: Vec<Vec<i16>>) -> (Self, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        (
            Self {
                blocks,
                stopped: stopped.clone(),
                running: None,
            },
            stopped,
        )
    }
}

impl FrameInput for ScriptedInput {
    fn start(&mut self, mut producer: AudioProducer) -> Result<InputStreamConfig, AudioError> {
        let blocks = self.blocks.clone();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        self.stopped.store(false, Ordering::SeqCst);

        let handle = thread::spawn(move || {
            for block in &blocks {
                if !flag.load(Ordering::SeqCst) {
                    return;
                }
                // Pace writes so the consumer keeps up with the ring.
                while !producer.write(block) {
                    if !flag.load(Ordering::SeqCst) {
                        return;
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                thread::sleep(Duration::from_millis(5));
            }
            while flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(10));
            }
        });

        self.running = Some((running, handle));
        Ok(InputStreamConfig {
            sample_rate: 16_000,
            channels: 1,
        })
    }

    fn stop(&mut self) {
        if let Some((flag, handle)) = self.running.take() {
            flag.store(false, Ordering::SeqCst);
            let _ = handle.join();
            self.stopped.store(true, Ordering::SeqCst);
        }
    }
}

/// A `FrameInput` whose device is never available.
pub struct UnavailableInput;

impl FrameInput for UnavailableInput {
    fn start(&mut self, _producer: AudioProducer) -> Result<InputStreamConfig, AudioError> {
        Err(AudioError::DeviceNotFound {
            name: Some("test-mic".into()),
        })
    }

    fn stop(&mut self) {}
}

/// Deterministic classifier: any sample above the amplitude floor is speech.
pub struct ThresholdClassifier;

impl SpeechClassifier for ThresholdClassifier {
    fn classify(&mut self, frame: &[i16]) -> Result<f32, String> {
        let speech = frame.iter().any(|&s| s.abs() > 100);
        Ok(if speech { 0.9 } else { 0.1 })
    }
}

/// A classifier that always errors; the engine must assume speech.
pub struct BrokenClassifier;

impl SpeechClassifier for BrokenClassifier {
    fn classify(&mut self, _frame: &[i16]) -> Result<f32, String> {
        Err("model not loaded".into())
    }
}

/// Answer pipeline that tags replies with the utterance's dominant sample
/// value, and fails on call indices listed in `fail_on`.
pub struct TaggingPipeline {
    calls: Arc<AtomicUsize>,
    fail_on: Vec<usize>,
    pub seen: Arc<Mutex<Vec<u64>>>,
}

impl TaggingPipeline {
    pub fn new(fail_on: Vec<usize>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_on,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl AnswerPipeline for TaggingPipeline {
    fn answer(&mut self, audio: &UtteranceAudio) -> Result<AnswerReply, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(audio.captured_at_ms);

        if self.fail_on.contains(&call) {
            return Err(PipelineError::Generation("model overloaded".into()));
        }

        let tag = audio
            .samples
            .iter()
            .find(|&&s| s != 0)
            .copied()
            .unwrap_or(0);
        Ok(AnswerReply {
            transcript: format!("tag-{tag}"),
            response_text: format!("response to tag-{tag}"),
            audio_path: None,
            sources: vec!["doc-a".into(), "doc-b".into()],
        })
    }
}

/// Poll the engine's result channel until `count` results arrive or the
/// deadline passes.
pub fn collect_results(
    engine: &voxloop_conversation::ConversationEngine,
    count: usize,
    timeout: Duration,
) -> Vec<ConversationResult> {
    let deadline = Instant::now() + timeout;
    let mut results = Vec::new();
    while results.len() < count && Instant::now() < deadline {
        match engine.poll_result() {
            Some(result) => results.push(result),
            None => thread::sleep(Duration::from_millis(20)),
        }
    }
    results
}
