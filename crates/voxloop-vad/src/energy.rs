use crate::classifier::SpeechClassifier;

/// Energy-based reference classifier.
///
/// Maps frame RMS level in dBFS onto a linear probability ramp between a
/// noise floor and a speech level. Kept for tests and as a fallback when no
/// model-backed classifier is wired in; real deployments are expected to
/// inject an ML classifier behind [`SpeechClassifier`].
pub struct EnergyClassifier {
    floor_dbfs: f32,
    speech_dbfs: f32,
}

impl EnergyClassifier {
    pub fn new(floor_dbfs: f32, speech_dbfs: f32) -> Self {
        Self {
            floor_dbfs,
            speech_dbfs,
        }
    }

    fn rms_dbfs(frame: &[i16]) -> f32 {
        if frame.is_empty() {
            return -100.0;
        }
        let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (sum_sq / frame.len() as f64).sqrt();
        if rms < 1.0 {
            return -100.0;
        }
        (20.0 * (rms / i16::MAX as f64).log10()) as f32
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new(-55.0, -30.0)
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn classify(&mut self, frame: &[i16]) -> Result<f32, String> {
        let level = Self::rms_dbfs(frame);
        let span = self.speech_dbfs - self.floor_dbfs;
        if span <= 0.0 {
            return Err(format!(
                "invalid energy thresholds: floor {} >= speech {}",
                self.floor_dbfs, self.speech_dbfs
            ));
        }
        Ok(((level - self.floor_dbfs) / span).clamp(0.0, 1.0))
    }
}
