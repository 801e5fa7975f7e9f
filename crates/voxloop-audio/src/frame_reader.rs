use super::ring_buffer::AudioConsumer;

/// Drains the capture ring buffer in raw sample blocks for the segmentation
/// thread; framing and timestamps are the chunker's job.
pub struct FrameReader {
    consumer: AudioConsumer,
    scratch: Vec<i16>,
}

impl FrameReader {
    pub fn new(consumer: AudioConsumer, max_block_samples: usize) -> Self {
        Self {
            consumer,
            scratch: vec![0i16; max_block_samples],
        }
    }

    /// Read whatever is available, up to the configured block size. Returns
    /// None when the ring is empty.
    pub fn read_block(&mut self) -> Option<&[i16]> {
        let n = self.consumer.read(&mut self.scratch);
        if n == 0 {
            None
        } else {
            Some(&self.scratch[..n])
        }
    }

    pub fn available_samples(&self) -> usize {
        self.consumer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::AudioRingBuffer;

    #[test]
    fn reads_available_and_reports_empty() {
        let (mut producer, consumer) = AudioRingBuffer::new(64).split();
        let mut reader = FrameReader::new(consumer, 32);

        assert!(reader.read_block().is_none());

        producer.write(&[1, 2, 3]);
        assert_eq!(reader.read_block().unwrap(), &[1, 2, 3]);
        assert!(reader.read_block().is_none());
    }

    #[test]
    fn caps_reads_at_block_size() {
        let (mut producer, consumer) = AudioRingBuffer::new(64).split();
        let mut reader = FrameReader::new(consumer, 4);

        producer.write(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(reader.read_block().unwrap(), &[1, 2, 3, 4]);
        assert_eq!(reader.read_block().unwrap(), &[5, 6]);
    }
}
