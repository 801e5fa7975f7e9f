use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of one processed utterance. Exactly one is published per
/// utterance that reaches the coordinator, in finalization order.
#[derive(Debug, Clone)]
pub enum ConversationResult {
    Success {
        transcript: String,
        response_text: String,
        audio_path: Option<PathBuf>,
        source_count: usize,
        captured_at_ms: u64,
    },
    Failure {
        message: String,
        captured_at_ms: u64,
    },
}

impl ConversationResult {
    pub fn captured_at_ms(&self) -> u64 {
        match self {
            Self::Success { captured_at_ms, .. } | Self::Failure { captured_at_ms, .. } => {
                *captured_at_ms
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Point-in-time view for polling consumers.
#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot {
    pub transcript: String,
    pub response_text: String,
    pub audio_path: Option<PathBuf>,
    pub status: String,
    pub is_active: bool,
}

#[derive(Debug, Default)]
struct SnapshotInner {
    transcript: String,
    response_text: String,
    audio_path: Option<PathBuf>,
    status: String,
}

/// The latest-results view shared between engine threads and readers.
///
/// Single writer (whichever engine thread is publishing), many readers; the
/// lock is never held across an external call.
#[derive(Default)]
pub(crate) struct SharedState {
    snapshot: RwLock<SnapshotInner>,
}

impl SharedState {
    pub fn set_status(&self, status: &str) {
        self.snapshot.write().status = status.to_string();
    }

    pub fn set_reply(&self, transcript: &str, response_text: &str, audio_path: Option<&Path>) {
        let mut inner = self.snapshot.write();
        inner.transcript = transcript.to_string();
        inner.response_text = response_text.to_string();
        inner.audio_path = audio_path.map(Path::to_path_buf);
    }

    pub fn snapshot(&self, is_active: bool) -> ConversationSnapshot {
        let inner = self.snapshot.read();
        ConversationSnapshot {
            transcript: inner.transcript.clone(),
            response_text: inner.response_text.clone(),
            audio_path: inner.audio_path.clone(),
            status: inner.status.clone(),
            is_active,
        }
    }
}

type TranscriptFn = dyn Fn(&str) + Send + Sync;
type ResponseFn = dyn Fn(&str, Option<&Path>) + Send + Sync;
type StatusFn = dyn Fn(&str) + Send + Sync;

/// Push-style observers, invoked from engine threads at publication points.
/// Implementations must not assume a particular thread and must not block
/// indefinitely.
#[derive(Clone, Default)]
pub struct ConversationCallbacks {
    pub(crate) on_transcript: Option<Arc<TranscriptFn>>,
    pub(crate) on_response: Option<Arc<ResponseFn>>,
    pub(crate) on_status: Option<Arc<StatusFn>>,
}

impl ConversationCallbacks {
    pub(crate) fn transcript(&self, text: &str) {
        if let Some(f) = &self.on_transcript {
            f(text);
        }
    }

    pub(crate) fn response(&self, text: &str, audio_path: Option<&Path>) {
        if let Some(f) = &self.on_response {
            f(text, audio_path);
        }
    }

    pub(crate) fn status(&self, message: &str) {
        if let Some(f) = &self.on_status {
            f(message);
        }
    }
}

pub(crate) type CallbackHub = Arc<RwLock<ConversationCallbacks>>;

/// Route one status message to both read patterns: the snapshot for pollers
/// and the status callback for push consumers.
pub(crate) fn publish_status(shared: &SharedState, callbacks: &CallbackHub, message: &str) {
    shared.set_status(message);
    callbacks.read().status(message);
}
