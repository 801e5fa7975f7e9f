use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use voxloop_telemetry::PipelineMetrics;
use voxloop_vad::Utterance;

/// What to do when the processing thread falls behind capture.
///
/// The reference design had an unbounded queue; bounding it and shedding the
/// oldest turn is the deliberate deviation recommended in the design notes:
/// in a conversation, the newest utterance is the one the user still wants
/// answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Stall the capture loop until a slot frees (still observes engine
    /// shutdown).
    Block,
    DropOldest,
    DropNewest,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::DropOldest
    }
}

/// Producer side of the bounded utterance queue.
///
/// Single logical producer (the segmentation thread), single consumer (the
/// coordinator). A cloned receiver lets the producer shed the oldest entry
/// under the `DropOldest` policy.
pub struct UtteranceQueue {
    tx: Sender<Utterance>,
    drain: Receiver<Utterance>,
    policy: OverflowPolicy,
    running: Arc<AtomicBool>,
    metrics: Arc<PipelineMetrics>,
}

impl UtteranceQueue {
    pub fn bounded(
        capacity: usize,
        policy: OverflowPolicy,
        running: Arc<AtomicBool>,
        metrics: Arc<PipelineMetrics>,
    ) -> (Self, Receiver<Utterance>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let queue = Self {
            drain: rx.clone(),
            tx,
            policy,
            running,
            metrics,
        };
        (queue, rx)
    }

    /// Hand one finalized utterance to the coordinator. Returns false when
    /// the utterance was shed (policy) or the engine is shutting down.
    pub fn send(&self, utterance: Utterance) -> bool {
        let mut pending = utterance;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => {
                    self.metrics.set_queue_depth(self.tx.len());
                    return true;
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::warn!("utterance queue disconnected, dropping utterance");
                    self.metrics.increment_utterances_dropped();
                    return false;
                }
                Err(TrySendError::Full(rejected)) => match self.policy {
                    OverflowPolicy::Block => {
                        if !self.running.load(Ordering::SeqCst) {
                            tracing::warn!("engine stopping, dropping blocked utterance");
                            self.metrics.increment_utterances_dropped();
                            return false;
                        }
                        pending = rejected;
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    OverflowPolicy::DropOldest => {
                        if self.drain.try_recv().is_ok() {
                            tracing::warn!(
                                "utterance queue full, dropped oldest pending utterance"
                            );
                            self.metrics.increment_utterances_dropped();
                        }
                        pending = rejected;
                    }
                    OverflowPolicy::DropNewest => {
                        tracing::warn!("utterance queue full, dropping newest utterance");
                        self.metrics.increment_utterances_dropped();
                        return false;
                    }
                },
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}
