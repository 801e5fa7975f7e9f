pub mod capture;
pub mod chunker;
pub mod device;
pub mod frame_reader;
pub mod playback;
pub mod resampler;
pub mod ring_buffer;
pub mod watchdog;

pub use capture::{CaptureConfig, CpalFrameInput, FrameInput, InputStreamConfig};
pub use chunker::{AudioFrame, FrameChunker};
pub use device::DeviceManager;
pub use frame_reader::FrameReader;
pub use playback::PlaybackGate;
pub use resampler::{ResamplerQuality, StreamResampler};
pub use ring_buffer::{AudioConsumer, AudioProducer, AudioRingBuffer};
pub use watchdog::WatchdogTimer;
