use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::SampleFormat;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::device::DeviceManager;
use super::resampler::{ResamplerQuality, StreamResampler};
use voxloop_foundation::AudioError;

/// Serializes synthesized-audio playback on the output device.
///
/// Playback runs on the caller's thread (the processing coordinator) and
/// holds the output device only for the duration of one call, so capture is
/// never re-triggered by overlapping assistant audio. Concurrent callers
/// queue on the internal mutex.
pub struct PlaybackGate {
    gate: Mutex<()>,
}

impl Default for PlaybackGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackGate {
    pub fn new() -> Self {
        Self {
            gate: Mutex::new(()),
        }
    }

    /// Play one WAV file to completion, blocking the calling thread.
    pub fn play(&self, path: &Path) -> Result<(), AudioError> {
        let _exclusive = self.gate.lock();

        let (samples, source_rate) = load_wav_mono(path)?;
        if samples.is_empty() {
            tracing::warn!("playback source {} is empty", path.display());
            return Ok(());
        }

        let manager = DeviceManager::new()?;
        let device = manager.open_output()?;
        let (config, sample_format) = manager.negotiate_output_config(&device)?;
        let device_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let samples = if device_rate == source_rate {
            samples
        } else {
            resample_whole(&samples, source_rate, device_rate)
        };

        let total = samples.len();
        let source = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);

        let err_fn = |err: cpal::StreamError| {
            tracing::error!("playback stream error: {}", err);
        };

        let stream = match sample_format {
            SampleFormat::F32 => {
                let src = source.clone();
                let pos = position.clone();
                device.build_output_stream(
                    &config,
                    move |out: &mut [f32], _: &_| {
                        let mut p = pos.load(Ordering::Relaxed);
                        for frame in out.chunks_mut(channels) {
                            let value = if p < src.len() {
                                let v = src[p] as f32 / 32768.0;
                                p += 1;
                                v
                            } else {
                                0.0
                            };
                            frame.fill(value);
                        }
                        pos.store(p, Ordering::Relaxed);
                        if p >= src.len() {
                            let _ = done_tx.try_send(());
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let src = source.clone();
                let pos = position.clone();
                device.build_output_stream(
                    &config,
                    move |out: &mut [i16], _: &_| {
                        let mut p = pos.load(Ordering::Relaxed);
                        for frame in out.chunks_mut(channels) {
                            let value = if p < src.len() {
                                let v = src[p];
                                p += 1;
                                v
                            } else {
                                0
                            };
                            frame.fill(value);
                        }
                        pos.store(p, Ordering::Relaxed);
                        if p >= src.len() {
                            let _ = done_tx.try_send(());
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => {
                return Err(AudioError::FormatNotSupported {
                    format: format!("{:?}", other),
                });
            }
        };

        stream.play()?;

        let expected = Duration::from_millis(total as u64 * 1000 / device_rate as u64)
            + Duration::from_secs(2);
        match done_rx.recv_timeout(expected) {
            Ok(()) => {
                // Let the device drain its final buffer before release.
                std::thread::sleep(Duration::from_millis(150));
                tracing::debug!("playback of {} finished", path.display());
                Ok(())
            }
            Err(_) => Err(AudioError::PlaybackTimeout { timeout: expected }),
        }
        // Stream drops here, releasing the output device.
    }
}

/// Load a WAV file as mono i16, folding channels by averaging.
/// Accepts 16-bit integer and 32-bit float sources.
pub fn load_wav_mono(path: &Path) -> Result<(Vec<i16>, u32), AudioError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| AudioError::PlaybackSource(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::PlaybackSource(e.to_string()))?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * 32767.0).round() as i16))
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::PlaybackSource(e.to_string()))?,
        (format, bits) => {
            return Err(AudioError::PlaybackSource(format!(
                "unsupported WAV format: {:?} {} bit",
                format, bits
            )));
        }
    };

    let channels = spec.channels as usize;
    let mono = if channels <= 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

fn resample_whole(samples: &[i16], from: u32, to: u32) -> Vec<i16> {
    let mut rs = StreamResampler::new(from, to, ResamplerQuality::Balanced);
    let mut out = rs.process(samples);
    // Zero-pad to flush the sinc filter tail out of the resampler.
    out.extend(rs.process(&[0i16; 1024]));
    out
}
