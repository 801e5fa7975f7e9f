/// A trait for per-frame speech probability sources.
///
/// This is the seam to the external voice-activity model: given one frame of
/// mono PCM it returns the probability that the frame contains speech. The
/// segmentation layer treats implementations as fast and non-blocking; a
/// failing implementation must not stop the capture loop (the caller assumes
/// speech on error so user input is not lost).
pub trait SpeechClassifier: Send {
    /// Speech probability for one frame, in `[0.0, 1.0]`.
    fn classify(&mut self, frame: &[i16]) -> Result<f32, String>;

    /// Clear any internal model state between conversations.
    fn reset(&mut self) {}

    fn required_sample_rate(&self) -> u32 {
        16_000
    }
}
