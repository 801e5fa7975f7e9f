use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::device::DeviceManager;
use super::resampler::ResamplerQuality;
use super::ring_buffer::AudioProducer;
use super::watchdog::WatchdogTimer;
use voxloop_foundation::AudioError;
use voxloop_telemetry::PipelineMetrics;

/// Capture-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device name; None selects the host default.
    pub device: Option<String>,
    /// Target pipeline rate; device rates are resampled to this.
    pub sample_rate_hz: u32,
    pub frame_duration_ms: u32,
    /// Ring buffer depth between the device callback and the segmentation
    /// thread, in milliseconds of target-rate audio.
    pub ring_capacity_ms: u32,
    pub resampler_quality: ResamplerQuality,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate_hz: 16_000,
            frame_duration_ms: 500,
            ring_capacity_ms: 4_000,
            resampler_quality: ResamplerQuality::Balanced,
        }
    }
}

impl CaptureConfig {
    pub fn frame_size_samples(&self) -> usize {
        (self.sample_rate_hz as u64 * self.frame_duration_ms as u64 / 1000) as usize
    }

    pub fn ring_capacity_samples(&self) -> usize {
        (self.sample_rate_hz as u64 * self.ring_capacity_ms as u64 / 1000) as usize
    }
}

/// Negotiated device stream parameters, as actually opened.
#[derive(Debug, Clone, Copy)]
pub struct InputStreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

/// The audio-input collaborator contract: something that, once started,
/// pushes interleaved i16 PCM into the ring buffer until stopped.
///
/// `start` after `stop` must work; the engine restarts inputs across
/// conversation sessions.
pub trait FrameInput: Send {
    fn start(&mut self, producer: AudioProducer) -> Result<InputStreamConfig, AudioError>;
    fn stop(&mut self);
}

struct CaptureThread {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

/// Live-microphone `FrameInput` over cpal.
///
/// The cpal stream is not `Send`, so it lives on a dedicated
/// `audio-capture` thread; the startup handshake reports the negotiated
/// device config (or the device error, fail-fast) back to the caller.
pub struct CpalFrameInput {
    device_name: Option<String>,
    metrics: Option<Arc<PipelineMetrics>>,
    watchdog_timeout: Duration,
    thread: Option<CaptureThread>,
}

impl CpalFrameInput {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            metrics: None,
            watchdog_timeout: Duration::from_secs(5),
            thread: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl FrameInput for CpalFrameInput {
    fn start(&mut self, producer: AudioProducer) -> Result<InputStreamConfig, AudioError> {
        if self.thread.is_some() {
            return Err(AudioError::Fatal("capture already started".into()));
        }

        let running = Arc::new(AtomicBool::new(true));
        let startup: Arc<Mutex<Option<Result<InputStreamConfig, AudioError>>>> =
            Arc::new(Mutex::new(None));

        let device_name = self.device_name.clone();
        let metrics = self.metrics.clone();
        let watchdog_timeout = self.watchdog_timeout;
        let thread_running = running.clone();
        let thread_startup = startup.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let mut watchdog = WatchdogTimer::new(watchdog_timeout);
                match build_capture_stream(
                    device_name.as_deref(),
                    producer,
                    metrics,
                    thread_running.clone(),
                    &mut watchdog,
                ) {
                    Ok((stream, config)) => {
                        *thread_startup.lock() = Some(Ok(config));
                        while thread_running.load(Ordering::SeqCst) {
                            thread::sleep(Duration::from_millis(100));
                        }
                        drop(stream);
                        watchdog.stop();
                        tracing::info!("audio capture thread shut down");
                    }
                    Err(e) => {
                        thread_running.store(false, Ordering::SeqCst);
                        *thread_startup.lock() = Some(Err(e));
                    }
                }
            })
            .map_err(|e| AudioError::Fatal(format!("failed to spawn capture thread: {e}")))?;

        // Bounded wait for the negotiated config or the device error.
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            if let Some(result) = startup.lock().take() {
                match result {
                    Ok(config) => {
                        tracing::info!(
                            sample_rate = config.sample_rate,
                            channels = config.channels,
                            "audio capture started"
                        );
                        self.thread = Some(CaptureThread { handle, running });
                        return Ok(config);
                    }
                    Err(e) => {
                        let _ = handle.join();
                        return Err(e);
                    }
                }
            }
            if Instant::now() >= deadline {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AudioError::Fatal(
                    "no device configuration within startup timeout".into(),
                ));
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn stop(&mut self) {
        if let Some(capture) = self.thread.take() {
            capture.running.store(false, Ordering::SeqCst);
            let _ = capture.handle.join();
        }
    }
}

impl Drop for CpalFrameInput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_capture_stream(
    device_name: Option<&str>,
    producer: AudioProducer,
    metrics: Option<Arc<PipelineMetrics>>,
    running: Arc<AtomicBool>,
    watchdog: &mut WatchdogTimer,
) -> Result<(Stream, InputStreamConfig), AudioError> {
    let manager = DeviceManager::new()?;
    let device = manager.open_input(device_name)?;
    if let Ok(name) = device.name() {
        tracing::info!("selected input device: {}", name);
    }
    let (config, sample_format) = manager.negotiate_input_config(&device)?;

    let stream_config = InputStreamConfig {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let stream = build_stream_for_format(
        &device,
        config,
        sample_format,
        producer,
        metrics,
        running.clone(),
        watchdog.clone(),
    )?;
    stream.play()?;
    watchdog.start(running);

    Ok((stream, stream_config))
}

fn build_stream_for_format(
    device: &cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    producer: AudioProducer,
    metrics: Option<Arc<PipelineMetrics>>,
    running: Arc<AtomicBool>,
    watchdog: WatchdogTimer,
) -> Result<Stream, AudioError> {
    let producer = Arc::new(Mutex::new(producer));

    let err_fn = |err: cpal::StreamError| {
        tracing::error!("audio stream error: {}", err);
    };

    let handle_i16 = move |data: &[i16]| {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        watchdog.feed();
        let accepted = producer.lock().write(data);
        if let Some(m) = &metrics {
            if accepted {
                m.increment_capture_frames();
            } else {
                m.increment_capture_overflows();
            }
        }
    };

    // Conversion buffers are thread-local to keep the device callback
    // allocation-free after warmup.
    thread_local! {
        static CONVERT_BUFFER: std::cell::RefCell<Vec<i16>> =
            const { std::cell::RefCell::new(Vec::new()) };
    }

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &_| handle_i16(data),
            err_fn,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    for &s in data {
                        converted.push((s.clamp(-1.0, 1.0) * 32767.0).round() as i16);
                    }
                    handle_i16(&converted);
                });
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    for &s in data {
                        converted.push((s as i32 - 32768) as i16);
                    }
                    handle_i16(&converted);
                });
            },
            err_fn,
            None,
        )?,
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            });
        }
    };

    Ok(stream)
}
