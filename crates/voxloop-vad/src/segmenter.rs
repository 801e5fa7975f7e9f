use crate::config::SegmenterConfig;

/// One fixed-duration slice of mono PCM, tagged with its position in the
/// capture stream.
///
/// This mirrors the audio crate's frame type at the crate boundary so the
/// segmenter stays free of audio-device dependencies.
#[derive(Debug, Clone)]
pub struct Frame {
    pub samples: Vec<i16>,
    pub seq: u64,
    pub timestamp_ms: u64,
}

/// A finalized span of detected speech plus its trailing silence padding.
#[derive(Debug, Clone)]
pub struct Utterance {
    frames: Vec<Frame>,
    speech_ms: u32,
    silence_ms: u32,
    started_at_ms: u64,
}

impl Utterance {
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn speech_ms(&self) -> u32 {
        self.speech_ms
    }

    pub fn silence_ms(&self) -> u32 {
        self.silence_ms
    }

    /// Stream timestamp of the first frame.
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn sample_count(&self) -> usize {
        self.frames.iter().map(|f| f.samples.len()).sum()
    }

    /// Concatenate all frames into one linear PCM buffer.
    pub fn into_samples(self) -> Vec<i16> {
        let mut out = Vec::with_capacity(self.sample_count());
        for frame in self.frames {
            out.extend_from_slice(&frame.samples);
        }
        out
    }
}

#[derive(Debug)]
pub enum SegmenterEvent {
    SpeechStarted { timestamp_ms: u64 },
    SpeechEnded(Utterance),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Idle,
    Speaking,
    TrailingSilence,
}

/// Classifies a stream of (frame, probability) pairs into discrete
/// utterances.
///
/// Exactly one utterance is open at any time. Frames observed while idle are
/// dropped so the idle path never accumulates memory. Trailing silence frames
/// are appended to the open utterance until `min_silence_duration_ms` is
/// reached, at which point the utterance is finalized if it carries at least
/// `min_speech_duration_ms` of speech and discarded otherwise.
pub struct UtteranceSegmenter {
    config: SegmenterConfig,
    state: SegmentState,
    frames: Vec<Frame>,
    speech_ms: u32,
    silence_ms: u32,
    started_at_ms: u64,
    last_seq: Option<u64>,
}

impl UtteranceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: SegmentState::Idle,
            frames: Vec::new(),
            speech_ms: 0,
            silence_ms: 0,
            started_at_ms: 0,
            last_seq: None,
        }
    }

    pub fn current_state(&self) -> SegmentState {
        self.state
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Feed one frame and its speech probability.
    pub fn observe(&mut self, frame: Frame, probability: f32) -> Option<SegmenterEvent> {
        self.check_continuity(&frame);

        let frame_ms = self.config.frame_duration_ms;

        if probability > self.config.vad_threshold {
            let starting = self.state == SegmentState::Idle;
            if starting {
                self.speech_ms = 0;
                self.silence_ms = 0;
                self.frames.clear();
                self.started_at_ms = frame.timestamp_ms;
                tracing::debug!(timestamp_ms = frame.timestamp_ms, "speech started");
            }

            self.state = SegmentState::Speaking;
            self.speech_ms += frame_ms;
            self.silence_ms = 0;
            let timestamp_ms = frame.timestamp_ms;
            self.frames.push(frame);

            return starting.then_some(SegmenterEvent::SpeechStarted { timestamp_ms });
        }

        match self.state {
            // Idle silence is never part of any utterance.
            SegmentState::Idle => None,
            SegmentState::Speaking | SegmentState::TrailingSilence => {
                self.state = SegmentState::TrailingSilence;
                self.silence_ms += frame_ms;
                self.frames.push(frame);

                if self.silence_ms < self.config.min_silence_duration_ms {
                    return None;
                }

                if self.speech_ms >= self.config.min_speech_duration_ms {
                    Some(SegmenterEvent::SpeechEnded(self.take_utterance()))
                } else {
                    tracing::debug!(
                        speech_ms = self.speech_ms,
                        "discarding sub-minimum speech span as noise"
                    );
                    self.reset_accumulators();
                    None
                }
            }
        }
    }

    /// Finalize an in-flight utterance without waiting for trailing silence.
    ///
    /// Used on engine stop so speech captured right before shutdown is not
    /// lost. Spans below the minimum speech duration are still discarded.
    pub fn flush(&mut self) -> Option<SegmenterEvent> {
        if self.state == SegmentState::Idle {
            return None;
        }
        if self.speech_ms >= self.config.min_speech_duration_ms {
            tracing::debug!(speech_ms = self.speech_ms, "flushing in-flight utterance");
            Some(SegmenterEvent::SpeechEnded(self.take_utterance()))
        } else {
            self.reset_accumulators();
            None
        }
    }

    pub fn reset(&mut self) {
        self.reset_accumulators();
        self.last_seq = None;
    }

    fn take_utterance(&mut self) -> Utterance {
        let utterance = Utterance {
            frames: std::mem::take(&mut self.frames),
            speech_ms: self.speech_ms,
            silence_ms: self.silence_ms,
            started_at_ms: self.started_at_ms,
        };
        tracing::info!(
            frames = utterance.num_frames(),
            speech_ms = utterance.speech_ms,
            "utterance finalized"
        );
        self.reset_accumulators();
        utterance
    }

    fn reset_accumulators(&mut self) {
        self.state = SegmentState::Idle;
        self.frames.clear();
        self.speech_ms = 0;
        self.silence_ms = 0;
        self.started_at_ms = 0;
    }

    fn check_continuity(&mut self, frame: &Frame) {
        if let Some(last) = self.last_seq {
            if frame.seq != last + 1 && self.state != SegmentState::Idle {
                tracing::warn!(
                    expected = last + 1,
                    got = frame.seq,
                    "frame sequence discontinuity while accumulating utterance"
                );
            }
        }
        self.last_seq = Some(frame.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64, frame_ms: u32) -> Frame {
        Frame {
            samples: vec![0i16; 80],
            seq,
            timestamp_ms: seq * frame_ms as u64,
        }
    }

    fn config(frame_ms: u32, min_speech: u32, min_silence: u32) -> SegmenterConfig {
        SegmenterConfig {
            vad_threshold: 0.5,
            min_speech_duration_ms: min_speech,
            min_silence_duration_ms: min_silence,
            frame_duration_ms: frame_ms,
            ..Default::default()
        }
    }

    #[test]
    fn starts_idle() {
        let seg = UtteranceSegmenter::new(SegmenterConfig::default());
        assert_eq!(seg.current_state(), SegmentState::Idle);
    }

    #[test]
    fn emits_speech_started_once() {
        let mut seg = UtteranceSegmenter::new(config(500, 1000, 1000));
        assert!(matches!(
            seg.observe(frame(0, 500), 0.9),
            Some(SegmenterEvent::SpeechStarted { timestamp_ms: 0 })
        ));
        assert!(seg.observe(frame(1, 500), 0.9).is_none());
        assert_eq!(seg.current_state(), SegmentState::Speaking);
    }

    #[test]
    fn idle_silence_is_discarded() {
        let mut seg = UtteranceSegmenter::new(config(500, 1000, 1000));
        for i in 0..10 {
            assert!(seg.observe(frame(i, 500), 0.1).is_none());
        }
        assert_eq!(seg.current_state(), SegmentState::Idle);
    }

    #[test]
    fn speech_resume_clears_trailing_silence() {
        let mut seg = UtteranceSegmenter::new(config(500, 500, 1000));
        seg.observe(frame(0, 500), 0.9);
        seg.observe(frame(1, 500), 0.1);
        assert_eq!(seg.current_state(), SegmentState::TrailingSilence);
        // Resuming speech must not re-emit SpeechStarted
        assert!(seg.observe(frame(2, 500), 0.9).is_none());
        assert_eq!(seg.current_state(), SegmentState::Speaking);
        // Silence accumulator restarted: one silence frame is not enough again
        assert!(seg.observe(frame(3, 500), 0.1).is_none());
        // Second silence frame finalizes with all four frames kept
        match seg.observe(frame(4, 500), 0.1) {
            Some(SegmenterEvent::SpeechEnded(utt)) => {
                assert_eq!(utt.num_frames(), 5);
                assert_eq!(utt.speech_ms(), 1000);
            }
            other => panic!("expected SpeechEnded, got {:?}", other),
        }
    }

    #[test]
    fn flush_emits_in_flight_utterance() {
        let mut seg = UtteranceSegmenter::new(config(500, 500, 1000));
        seg.observe(frame(0, 500), 0.9);
        seg.observe(frame(1, 500), 0.9);
        match seg.flush() {
            Some(SegmenterEvent::SpeechEnded(utt)) => assert_eq!(utt.num_frames(), 2),
            other => panic!("expected SpeechEnded, got {:?}", other),
        }
        assert_eq!(seg.current_state(), SegmentState::Idle);
    }

    #[test]
    fn flush_discards_short_span() {
        let mut seg = UtteranceSegmenter::new(config(500, 1000, 1000));
        seg.observe(frame(0, 500), 0.9);
        assert!(seg.flush().is_none());
        assert_eq!(seg.current_state(), SegmentState::Idle);
    }

    #[test]
    fn utterance_concatenates_samples_in_order() {
        let mut seg = UtteranceSegmenter::new(config(500, 500, 500));
        let mut f0 = frame(0, 500);
        f0.samples = vec![1, 2];
        let mut f1 = frame(1, 500);
        f1.samples = vec![3, 4];
        seg.observe(f0, 0.9);
        match seg.observe(f1, 0.1) {
            Some(SegmenterEvent::SpeechEnded(utt)) => {
                assert_eq!(utt.sample_count(), 4);
                assert_eq!(utt.into_samples(), vec![1, 2, 3, 4]);
            }
            other => panic!("expected SpeechEnded, got {:?}", other),
        }
    }
}
