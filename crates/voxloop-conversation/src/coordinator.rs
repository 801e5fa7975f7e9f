use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::pipeline::{AnswerPipeline, UtteranceAudio};
use crate::queue::OverflowPolicy;
use crate::types::{publish_status, CallbackHub, ConversationResult, SharedState};
use voxloop_audio::PlaybackGate;
use voxloop_foundation::EngineError;
use voxloop_telemetry::PipelineMetrics;
use voxloop_vad::Utterance;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum pending utterances before the overflow policy applies.
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Dequeue poll interval; bounds how fast the stop flag is observed.
    pub poll_interval_ms: u64,
    /// How long `stop()` waits for the coordinator before abandoning it.
    pub join_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            overflow_policy: OverflowPolicy::default(),
            poll_interval_ms: 100,
            join_timeout_ms: 2_000,
        }
    }
}

/// Consumes finalized utterances in FIFO order on a dedicated thread and
/// publishes exactly one result per utterance.
///
/// Processing is globally serialized: the next utterance is not dequeued
/// until the previous result is published (and its audio played). Errors from
/// the answer pipeline become failure results; nothing escapes the loop.
pub(crate) struct ProcessingCoordinator {
    utterance_rx: Receiver<Utterance>,
    pipeline: Arc<Mutex<Box<dyn AnswerPipeline>>>,
    playback: Option<Arc<PlaybackGate>>,
    result_tx: Sender<ConversationResult>,
    shared: Arc<SharedState>,
    callbacks: CallbackHub,
    metrics: Arc<PipelineMetrics>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    sample_rate: u32,
    processed: u64,
}

impl ProcessingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        utterance_rx: Receiver<Utterance>,
        pipeline: Arc<Mutex<Box<dyn AnswerPipeline>>>,
        playback: Option<Arc<PlaybackGate>>,
        result_tx: Sender<ConversationResult>,
        shared: Arc<SharedState>,
        callbacks: CallbackHub,
        metrics: Arc<PipelineMetrics>,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
        sample_rate: u32,
    ) -> Self {
        Self {
            utterance_rx,
            pipeline,
            playback,
            result_tx,
            shared,
            callbacks,
            metrics,
            running,
            poll_interval,
            sample_rate,
            processed: 0,
        }
    }

    pub(crate) fn spawn(self) -> Result<JoinHandle<()>, EngineError> {
        thread::Builder::new()
            .name("conversation-coordinator".into())
            .spawn(move || self.run())
            .map_err(|e| EngineError::Fatal(format!("failed to spawn coordinator: {e}")))
    }

    fn run(mut self) {
        tracing::info!("processing coordinator started");

        while self.running.load(Ordering::SeqCst) {
            match self.utterance_rx.recv_timeout(self.poll_interval) {
                Ok(utterance) => {
                    self.metrics.set_queue_depth(self.utterance_rx.len());
                    self.process_utterance(utterance);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!(
            utterances = self.processed,
            "processing coordinator stopped"
        );
    }

    fn process_utterance(&mut self, utterance: Utterance) {
        publish_status(&self.shared, &self.callbacks, "Processing your question");

        let audio = UtteranceAudio::from_utterance(utterance, self.sample_rate);
        let captured_at_ms = audio.captured_at_ms;
        tracing::info!(
            duration_ms = audio.duration_ms(),
            captured_at_ms,
            "processing utterance"
        );

        let outcome = self.pipeline.lock().answer(&audio);
        self.processed += 1;
        self.metrics.increment_utterances_processed();

        match outcome {
            Ok(reply) => {
                tracing::info!(
                    transcript_len = reply.transcript.len(),
                    sources = reply.sources.len(),
                    "answer ready"
                );

                self.shared.set_reply(
                    &reply.transcript,
                    &reply.response_text,
                    reply.audio_path.as_deref(),
                );
                {
                    let callbacks = self.callbacks.read();
                    callbacks.transcript(&reply.transcript);
                    callbacks.response(&reply.response_text, reply.audio_path.as_deref());
                }

                let _ = self.result_tx.send(ConversationResult::Success {
                    transcript: reply.transcript,
                    response_text: reply.response_text,
                    audio_path: reply.audio_path.clone(),
                    source_count: reply.sources.len(),
                    captured_at_ms,
                });

                if let Some(path) = &reply.audio_path {
                    self.play_reply_audio(path);
                }

                publish_status(&self.shared, &self.callbacks, "Response ready");
            }
            Err(e) => {
                tracing::warn!("answer pipeline failed: {e}");
                self.metrics.increment_answers_failed();
                publish_status(&self.shared, &self.callbacks, &format!("Error: {e}"));
                let _ = self.result_tx.send(ConversationResult::Failure {
                    message: e.to_string(),
                    captured_at_ms,
                });
            }
        }
    }

    fn play_reply_audio(&self, path: &std::path::Path) {
        let Some(gate) = &self.playback else {
            return;
        };
        if !path.exists() {
            tracing::warn!("reply audio {} does not exist, skipping playback", path.display());
            return;
        }
        // Playback failure must not abort the conversation loop.
        if let Err(e) = gate.play(path) {
            tracing::warn!("playback of {} failed: {e}", path.display());
            self.metrics.increment_playback_failures();
        }
    }
}
