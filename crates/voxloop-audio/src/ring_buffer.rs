use rtrb::{Consumer, Producer, RingBuffer};
use tracing::warn;

/// Real-time safe SPSC sample buffer between the device callback and the
/// segmentation thread.
pub struct AudioRingBuffer {
    producer: Producer<i16>,
    consumer: Consumer<i16>,
}

impl AudioRingBuffer {
    pub fn new(capacity_samples: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity_samples);
        Self { producer, consumer }
    }

    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        (
            AudioProducer {
                producer: self.producer,
            },
            AudioConsumer {
                consumer: self.consumer,
            },
        )
    }
}

/// Producer half, owned by the audio callback.
pub struct AudioProducer {
    producer: Producer<i16>,
}

impl AudioProducer {
    /// Write a whole callback buffer. The block is dropped in full when the
    /// ring cannot hold it; partial frames would corrupt chunk alignment
    /// downstream.
    pub fn write(&mut self, samples: &[i16]) -> bool {
        let mut chunk = match self.producer.write_chunk(samples.len()) {
            Ok(chunk) => chunk,
            Err(_) => {
                warn!(
                    dropped = samples.len(),
                    "ring buffer overflow, dropping capture block"
                );
                return false;
            }
        };

        // The chunk may wrap around the ring; fill both slices.
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&samples[..split]);
        if !second.is_empty() {
            second.copy_from_slice(&samples[split..]);
        }
        chunk.commit_all();
        true
    }

    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer half, owned by the segmentation thread.
pub struct AudioConsumer {
    consumer: Consumer<i16>,
}

impl AudioConsumer {
    /// Read up to `buffer.len()` samples; returns the count actually read.
    pub fn read(&mut self, buffer: &mut [i16]) -> usize {
        let chunk = match self.consumer.read_chunk(buffer.len()) {
            Ok(chunk) => chunk,
            Err(rtrb::chunks::ChunkError::TooFewSlots(available)) => {
                if available == 0 {
                    return 0;
                }
                match self.consumer.read_chunk(available) {
                    Ok(chunk) => chunk,
                    Err(_) => return 0,
                }
            }
        };

        let len = chunk.len();
        let (first, second) = chunk.as_slices();
        let split = first.len();
        buffer[..split].copy_from_slice(first);
        if !second.is_empty() {
            buffer[split..split + second.len()].copy_from_slice(second);
        }
        chunk.commit_all();
        len
    }

    pub fn slots(&self) -> usize {
        self.consumer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrip() {
        let rb = AudioRingBuffer::new(1024);
        let (mut producer, mut consumer) = rb.split();

        assert!(producer.write(&[1, 2, 3, 4, 5]));

        let mut buffer = [0i16; 10];
        assert_eq!(consumer.read(&mut buffer), 5);
        assert_eq!(&buffer[..5], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn overflow_drops_whole_block() {
        let rb = AudioRingBuffer::new(16);
        let (mut producer, mut consumer) = rb.split();

        assert!(!producer.write(&[1i16; 20]));
        assert!(producer.write(&[1i16; 16]));
        assert!(!producer.write(&[2i16; 1]));

        let mut buffer = [0i16; 16];
        assert_eq!(consumer.read(&mut buffer), 16);
        assert_eq!(buffer, [1i16; 16]);
    }

    #[test]
    fn read_from_empty_returns_zero() {
        let rb = AudioRingBuffer::new(8);
        let (_producer, mut consumer) = rb.split();
        let mut buffer = [0i16; 4];
        assert_eq!(consumer.read(&mut buffer), 0);
    }

    #[test]
    fn wrapping_preserves_order() {
        let rb = AudioRingBuffer::new(8);
        let (mut producer, mut consumer) = rb.split();
        let mut buffer = [0i16; 8];

        assert!(producer.write(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(consumer.read(&mut buffer[..4]), 4);
        // Next write wraps around the ring boundary
        assert!(producer.write(&[7, 8, 9, 10]));
        assert_eq!(consumer.read(&mut buffer), 6);
        assert_eq!(&buffer[..6], &[5, 6, 7, 8, 9, 10]);
    }
}
