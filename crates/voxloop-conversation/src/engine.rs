use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::ConversationConfig;
use crate::coordinator::ProcessingCoordinator;
use crate::pipeline::AnswerPipeline;
use crate::queue::UtteranceQueue;
use crate::segmentation::SegmentationWorker;
use crate::types::{
    publish_status, CallbackHub, ConversationCallbacks, ConversationResult, ConversationSnapshot,
    SharedState,
};
use voxloop_audio::{AudioRingBuffer, FrameChunker, FrameInput, FrameReader, PlaybackGate};
use voxloop_foundation::{EngineError, EngineState, StateManager};
use voxloop_telemetry::PipelineMetrics;
use voxloop_vad::{SpeechClassifier, UtteranceSegmenter};

struct EngineRuntime {
    running: Arc<AtomicBool>,
    segmentation: JoinHandle<()>,
    coordinator: JoinHandle<()>,
}

/// The continuous conversation engine.
///
/// Construction takes already-initialized collaborators: the frame input
/// (microphone), the speech classifier (VAD), and the answer pipeline.
/// `start`/`stop` are safe to call from any thread and serialize against
/// each other; the result channel and snapshot survive across restarts.
pub struct ConversationEngine {
    config: ConversationConfig,
    input: Mutex<Box<dyn FrameInput>>,
    classifier: Arc<Mutex<Box<dyn SpeechClassifier>>>,
    pipeline: Arc<Mutex<Box<dyn AnswerPipeline>>>,
    playback: Option<Arc<PlaybackGate>>,
    metrics: Arc<PipelineMetrics>,
    state: StateManager,
    shared: Arc<SharedState>,
    callbacks: CallbackHub,
    result_tx: Sender<ConversationResult>,
    result_rx: Receiver<ConversationResult>,
    runtime: Mutex<Option<EngineRuntime>>,
}

impl ConversationEngine {
    pub fn new(
        config: ConversationConfig,
        input: Box<dyn FrameInput>,
        classifier: Box<dyn SpeechClassifier>,
        pipeline: Box<dyn AnswerPipeline>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let playback = config
            .playback
            .enabled
            .then(|| Arc::new(PlaybackGate::new()));
        let (result_tx, result_rx) = crossbeam_channel::unbounded();

        Ok(Self {
            config,
            input: Mutex::new(input),
            classifier: Arc::new(Mutex::new(classifier)),
            pipeline: Arc::new(Mutex::new(pipeline)),
            playback,
            metrics: Arc::new(PipelineMetrics::new()),
            state: StateManager::new(),
            shared: Arc::new(SharedState::default()),
            callbacks: Arc::new(RwLock::new(ConversationCallbacks::default())),
            result_tx,
            result_rx,
            runtime: Mutex::new(None),
        })
    }

    /// Begin a conversation session: acquire the input device, spawn the
    /// segmentation and coordinator threads. No-op with a warning when
    /// already running; device acquisition failure leaves the engine
    /// stopped and restartable.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut runtime = self.runtime.lock();

        if self.state.current() == EngineState::Running {
            tracing::warn!("conversation already running");
            return Ok(());
        }
        self.state.transition(EngineState::Starting)?;

        let ring = AudioRingBuffer::new(self.config.capture.ring_capacity_samples());
        let (producer, consumer) = ring.split();

        let input_config = match self.input.lock().start(producer) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!("failed to open audio input: {e}");
                self.state.transition(EngineState::Stopped)?;
                return Err(e.into());
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let frame_size = self.config.capture.frame_size_samples();

        let (queue, utterance_rx) = UtteranceQueue::bounded(
            self.config.coordinator.queue_capacity,
            self.config.coordinator.overflow_policy,
            running.clone(),
            self.metrics.clone(),
        );

        let worker = SegmentationWorker::new(
            FrameReader::new(consumer, frame_size.max(4_096)),
            FrameChunker::new(
                input_config,
                self.config.capture.sample_rate_hz,
                frame_size,
                self.config.capture.resampler_quality,
            ),
            self.classifier.clone(),
            UtteranceSegmenter::new(self.config.segmenter.clone()),
            queue,
            self.shared.clone(),
            self.callbacks.clone(),
            self.metrics.clone(),
            running.clone(),
        );
        let segmentation = match worker.spawn() {
            Ok(handle) => handle,
            Err(e) => {
                self.abort_start(&running);
                return Err(e);
            }
        };

        let coordinator = ProcessingCoordinator::new(
            utterance_rx,
            self.pipeline.clone(),
            self.playback.clone(),
            self.result_tx.clone(),
            self.shared.clone(),
            self.callbacks.clone(),
            self.metrics.clone(),
            running.clone(),
            Duration::from_millis(self.config.coordinator.poll_interval_ms),
            self.config.capture.sample_rate_hz,
        );
        let coordinator = match coordinator.spawn() {
            Ok(handle) => handle,
            Err(e) => {
                self.abort_start(&running);
                let _ = segmentation.join();
                return Err(e);
            }
        };

        *runtime = Some(EngineRuntime {
            running,
            segmentation,
            coordinator,
        });
        self.state.transition(EngineState::Running)?;
        publish_status(
            &self.shared,
            &self.callbacks,
            "Conversation started, speak naturally",
        );
        tracing::info!("conversation engine started");
        Ok(())
    }

    /// End the session: stop frame production, drain the threads, release
    /// the device. No-op with a warning when not running. A coordinator
    /// stuck in a long answer call is abandoned after the configured join
    /// timeout rather than hanging the caller.
    pub fn stop(&self) -> Result<(), EngineError> {
        let mut runtime = self.runtime.lock();

        if self.state.current() != EngineState::Running {
            tracing::warn!("conversation not running");
            return Ok(());
        }
        self.state.transition(EngineState::Stopping)?;

        if let Some(rt) = runtime.take() {
            rt.running.store(false, Ordering::SeqCst);
            self.input.lock().stop();

            if rt.segmentation.join().is_err() {
                tracing::error!("segmentation thread panicked");
            }

            let timeout = Duration::from_millis(self.config.coordinator.join_timeout_ms);
            if !join_with_timeout(rt.coordinator, timeout) {
                tracing::warn!(
                    "coordinator did not exit within {:?} (answer call still in flight), abandoning",
                    timeout
                );
            }
        }

        self.state.transition(EngineState::Stopped)?;
        publish_status(&self.shared, &self.callbacks, "Conversation stopped");
        tracing::info!("conversation engine stopped");
        Ok(())
    }

    fn abort_start(&self, running: &Arc<AtomicBool>) {
        running.store(false, Ordering::SeqCst);
        self.input.lock().stop();
        let _ = self.state.transition(EngineState::Stopped);
    }

    pub fn is_active(&self) -> bool {
        self.state.current() == EngineState::Running
    }

    pub fn state(&self) -> EngineState {
        self.state.current()
    }

    pub fn subscribe_state(&self) -> Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Latest transcript/response/status view, for polling consumers.
    pub fn latest_snapshot(&self) -> ConversationSnapshot {
        self.shared.snapshot(self.is_active())
    }

    /// Non-blocking drain of the result channel, one result per call.
    pub fn poll_result(&self) -> Option<ConversationResult> {
        self.result_rx.try_recv().ok()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    pub fn set_on_transcript(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks.write().on_transcript = Some(Arc::new(f));
    }

    pub fn set_on_response(&self, f: impl Fn(&str, Option<&Path>) + Send + Sync + 'static) {
        self.callbacks.write().on_response = Some(Arc::new(f));
    }

    pub fn set_on_status(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks.write().on_status = Some(Arc::new(f));
    }
}

impl Drop for ConversationEngine {
    fn drop(&mut self) {
        if self.state.current() == EngineState::Running {
            let _ = self.stop();
        }
    }
}

/// Poll-join with a deadline. Returns false when the thread is abandoned.
fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if handle.is_finished() {
            if handle.join().is_err() {
                tracing::error!("coordinator thread panicked");
            }
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}
