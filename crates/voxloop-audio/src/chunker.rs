use std::collections::VecDeque;

use super::capture::InputStreamConfig;
use super::resampler::{ResamplerQuality, StreamResampler};

/// One fixed-duration frame of mono PCM at the pipeline's target rate.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub seq: u64,
    pub timestamp_ms: u64,
}

/// Turns raw device blocks into fixed-size mono frames at the target rate.
///
/// Multi-channel input is folded to mono by averaging; a resampler is
/// inserted only when the device rate differs from the target. Frame `seq`
/// values are contiguous from 0 and `timestamp_ms` is stream time derived
/// from the emitted sample count.
pub struct FrameChunker {
    buffer: VecDeque<i16>,
    frame_size_samples: usize,
    target_rate: u32,
    input_channels: u16,
    resampler: Option<StreamResampler>,
    next_seq: u64,
    samples_emitted: u64,
}

impl FrameChunker {
    pub fn new(
        input: InputStreamConfig,
        target_rate: u32,
        frame_size_samples: usize,
        quality: ResamplerQuality,
    ) -> Self {
        let resampler = if input.sample_rate != target_rate {
            tracing::info!(
                "resampling {} Hz {} ch -> {} Hz mono",
                input.sample_rate,
                input.channels,
                target_rate
            );
            Some(StreamResampler::new(input.sample_rate, target_rate, quality))
        } else {
            None
        };

        Self {
            buffer: VecDeque::with_capacity(frame_size_samples * 4),
            frame_size_samples,
            target_rate,
            input_channels: input.channels,
            resampler,
            next_seq: 0,
            samples_emitted: 0,
        }
    }

    /// Feed one interleaved device block; returns every frame that became
    /// complete.
    pub fn push(&mut self, samples: &[i16]) -> Vec<AudioFrame> {
        let mono = self.fold_to_mono(samples);
        match &mut self.resampler {
            Some(rs) => self.buffer.extend(rs.process(&mono)),
            None => self.buffer.extend(mono),
        }
        self.drain_ready_frames()
    }

    fn fold_to_mono(&self, samples: &[i16]) -> Vec<i16> {
        if self.input_channels <= 1 {
            return samples.to_vec();
        }
        let channels = self.input_channels as usize;
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    }

    fn drain_ready_frames(&mut self) -> Vec<AudioFrame> {
        let mut out = Vec::new();
        while self.buffer.len() >= self.frame_size_samples {
            let samples: Vec<i16> = self.buffer.drain(..self.frame_size_samples).collect();
            let timestamp_ms = self.samples_emitted * 1000 / self.target_rate as u64;
            out.push(AudioFrame {
                samples,
                seq: self.next_seq,
                timestamp_ms,
            });
            self.next_seq += 1;
            self.samples_emitted += self.frame_size_samples as u64;
        }
        out
    }

    /// Samples waiting for the next frame boundary.
    pub fn pending_samples(&self) -> usize {
        self.buffer.len()
    }
}
