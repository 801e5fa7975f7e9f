use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared metrics for cross-thread pipeline monitoring.
///
/// Every field is independently updatable from the thread that owns the
/// corresponding stage; readers may sample at any time.
#[derive(Clone)]
pub struct PipelineMetrics {
    // Capture stage
    pub capture_frames: Arc<AtomicU64>,
    pub capture_overflows: Arc<AtomicU64>,

    // Chunker stage
    pub chunker_frames: Arc<AtomicU64>,

    // Classification / segmentation
    pub classifier_failures: Arc<AtomicU64>,
    pub utterances_segmented: Arc<AtomicU64>,
    pub utterances_discarded: Arc<AtomicU64>,

    // Queue / coordinator
    pub utterances_dropped: Arc<AtomicU64>,
    pub utterances_processed: Arc<AtomicU64>,
    pub answers_failed: Arc<AtomicU64>,
    pub playback_failures: Arc<AtomicU64>,
    pub queue_depth: Arc<AtomicUsize>,

    // Activity indicators
    pub is_speaking: Arc<AtomicBool>,
    pub last_speech_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            capture_frames: Arc::new(AtomicU64::new(0)),
            capture_overflows: Arc::new(AtomicU64::new(0)),
            chunker_frames: Arc::new(AtomicU64::new(0)),
            classifier_failures: Arc::new(AtomicU64::new(0)),
            utterances_segmented: Arc::new(AtomicU64::new(0)),
            utterances_discarded: Arc::new(AtomicU64::new(0)),
            utterances_dropped: Arc::new(AtomicU64::new(0)),
            utterances_processed: Arc::new(AtomicU64::new(0)),
            answers_failed: Arc::new(AtomicU64::new(0)),
            playback_failures: Arc::new(AtomicU64::new(0)),
            queue_depth: Arc::new(AtomicUsize::new(0)),
            is_speaking: Arc::new(AtomicBool::new(false)),
            last_speech_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_capture_frames(&self) {
        self.capture_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_capture_overflows(&self) {
        self.capture_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_chunker_frames(&self) {
        self.chunker_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_classifier_failures(&self) {
        self.classifier_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_utterances_segmented(&self) {
        self.utterances_segmented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_utterances_discarded(&self) {
        self.utterances_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_utterances_dropped(&self) {
        self.utterances_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_utterances_processed(&self) {
        self.utterances_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_answers_failed(&self) {
        self.answers_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_playback_failures(&self) {
        self.playback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn mark_speaking(&self, speaking: bool) {
        self.is_speaking.store(speaking, Ordering::Relaxed);
        if speaking {
            *self.last_speech_time.write() = Some(Instant::now());
        }
    }
}
