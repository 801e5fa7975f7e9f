pub mod classifier;
pub mod config;
pub mod energy;
pub mod segmenter;

pub use classifier::SpeechClassifier;
pub use config::SegmenterConfig;
pub use energy::EnergyClassifier;
pub use segmenter::{Frame, SegmentState, SegmenterEvent, Utterance, UtteranceSegmenter};
