use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::queue::UtteranceQueue;
use crate::types::{publish_status, CallbackHub, SharedState};
use voxloop_audio::{AudioFrame, FrameChunker, FrameReader};
use voxloop_foundation::EngineError;
use voxloop_telemetry::PipelineMetrics;
use voxloop_vad::{Frame, SegmenterEvent, SpeechClassifier, UtteranceSegmenter};

/// Idle poll cadence when the ring buffer is dry. At the default 500 ms
/// frame size this checks many times per frame period without burning CPU.
const IDLE_POLL: Duration = Duration::from_millis(25);

/// The capture-side loop: drains the ring buffer, chunks samples into
/// frames, classifies each frame, and feeds the segmenter. Completed
/// utterances go to the coordinator through the bounded queue; that enqueue
/// is this thread's only potentially blocking operation.
pub(crate) struct SegmentationWorker {
    reader: FrameReader,
    chunker: FrameChunker,
    classifier: Arc<Mutex<Box<dyn SpeechClassifier>>>,
    segmenter: UtteranceSegmenter,
    queue: UtteranceQueue,
    shared: Arc<SharedState>,
    callbacks: CallbackHub,
    metrics: Arc<PipelineMetrics>,
    running: Arc<AtomicBool>,
    speaking: bool,
}

impl SegmentationWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        reader: FrameReader,
        chunker: FrameChunker,
        classifier: Arc<Mutex<Box<dyn SpeechClassifier>>>,
        segmenter: UtteranceSegmenter,
        queue: UtteranceQueue,
        shared: Arc<SharedState>,
        callbacks: CallbackHub,
        metrics: Arc<PipelineMetrics>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            reader,
            chunker,
            classifier,
            segmenter,
            queue,
            shared,
            callbacks,
            metrics,
            running,
            speaking: false,
        }
    }

    pub(crate) fn spawn(mut self) -> Result<JoinHandle<()>, EngineError> {
        thread::Builder::new()
            .name("segmentation".into())
            .spawn(move || self.run())
            .map_err(|e| EngineError::Fatal(format!("failed to spawn segmentation worker: {e}")))
    }

    fn run(&mut self) {
        tracing::info!("segmentation loop started");

        while self.running.load(Ordering::SeqCst) {
            let frames = match self.reader.read_block() {
                Some(block) => self.chunker.push(block),
                None => {
                    thread::sleep(IDLE_POLL);
                    continue;
                }
            };

            for frame in frames {
                self.metrics.increment_chunker_frames();
                self.handle_frame(frame);
            }
        }

        // Shutdown: speech captured right before stop is finalized and
        // offered to whatever is left of the queue, best effort.
        if let Some(SegmenterEvent::SpeechEnded(utterance)) = self.segmenter.flush() {
            tracing::debug!(
                frames = utterance.num_frames(),
                "flushed in-flight utterance on shutdown"
            );
            self.metrics.increment_utterances_segmented();
            self.queue.send(utterance);
        }

        tracing::info!("segmentation loop stopped");
    }

    fn handle_frame(&mut self, frame: AudioFrame) {
        let probability = match self.classifier.lock().classify(&frame.samples) {
            Ok(p) => p,
            Err(e) => {
                // Bias toward not losing user input: a broken classifier
                // means every frame counts as speech.
                tracing::warn!("classifier error, assuming speech: {e}");
                self.metrics.increment_classifier_failures();
                1.0
            }
        };

        let frame = Frame {
            samples: frame.samples,
            seq: frame.seq,
            timestamp_ms: frame.timestamp_ms,
        };

        match self.segmenter.observe(frame, probability) {
            Some(SegmenterEvent::SpeechStarted { timestamp_ms }) => {
                tracing::debug!(timestamp_ms, "speech started");
                self.set_speaking(true);
                publish_status(&self.shared, &self.callbacks, "Speech detected");
            }
            Some(SegmenterEvent::SpeechEnded(utterance)) => {
                tracing::info!(
                    frames = utterance.num_frames(),
                    speech_ms = utterance.speech_ms(),
                    "utterance captured"
                );
                self.set_speaking(false);
                self.metrics.increment_utterances_segmented();
                self.queue.send(utterance);
            }
            None => {
                // A sub-minimum span silently returning to idle is a discard
                if self.speaking
                    && self.segmenter.current_state() == voxloop_vad::SegmentState::Idle
                {
                    self.set_speaking(false);
                    self.metrics.increment_utterances_discarded();
                }
            }
        }
    }

    fn set_speaking(&mut self, speaking: bool) {
        if self.speaking != speaking {
            self.speaking = speaking;
            self.metrics.mark_speaking(speaking);
        }
    }
}
