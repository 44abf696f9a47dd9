use crate::buffer::{Buffer, BufferPool};
use crate::config::{ModemConfig, SampleBits};
use log::{debug, error};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a call to [`SineGenerator::generate`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Every requested sample was written
    Completed,
    /// The generator was stopped before or during synthesis
    Stopped,
    /// The pool was closed while waiting for a free buffer
    PoolClosed,
}

/// Pure tone PCM writer
///
/// Samples are `round(sin(phase) * range / 2) + offset`. The offset is the
/// configured midpoint constant and is applied identically for 8-bit and
/// 16-bit output, so silence (0 Hz) is a run of that constant in both modes.
pub struct SineGenerator {
    pool: Arc<BufferPool>,
    sample_rate: u32,
    bits: SampleBits,
    amplitude_offset: i32,
    generating: AtomicBool,
}

impl SineGenerator {
    pub fn new(pool: Arc<BufferPool>, sample_rate: u32, bits: SampleBits, amplitude_offset: i32) -> Self {
        Self {
            pool,
            sample_rate,
            bits,
            amplitude_offset,
            generating: AtomicBool::new(false),
        }
    }

    pub fn from_config(pool: Arc<BufferPool>, config: &ModemConfig) -> Self {
        Self::new(pool, config.sample_rate, config.bits, config.amplitude_offset)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits(&self) -> SampleBits {
        self.bits
    }

    /// Number of samples a tone of `duration_ms` spans (truncating)
    pub fn samples_for(&self, duration_ms: u32) -> usize {
        (duration_ms as u64 * self.sample_rate as u64 / 1000) as usize
    }

    pub fn start(&self) {
        if !self.generating.swap(true, Ordering::SeqCst) {
            debug!("sine generator started");
        }
    }

    /// Abort any in-flight `generate` at the next sample boundary.
    pub fn stop(&self) {
        if self.generating.swap(false, Ordering::SeqCst) {
            debug!("sine generator stopped");
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// Synthesize `duration_ms` of a `frequency_hz` tone into pool buffers.
    ///
    /// Full buffers are released as ready as soon as the next sample no longer
    /// fits. Whatever was written before a stop is still flushed. Frequency 0
    /// yields a constant midpoint, used as the gap between messages.
    pub fn generate(&self, frequency_hz: u32, duration_ms: u32) -> GenerateOutcome {
        if !self.is_generating() {
            return GenerateOutcome::Stopped;
        }

        let total = self.samples_for(duration_ms);
        let per = frequency_hz as f64 / self.sample_rate as f64 * 2.0 * PI;
        let amplitude = (self.bits.amplitude_range() / 2) as f64;
        let sample_bytes = self.bits.bytes_per_sample();
        let (low, high) = self.bits.sample_limits();
        debug!("gen {} Hz, {} samples", frequency_hz, total);

        let mut buffer = match self.pool.acquire_available() {
            Some(buffer) => buffer,
            None => {
                error!("no buffer available, pool closed");
                return GenerateOutcome::PoolClosed;
            }
        };

        let mut outcome = GenerateOutcome::Completed;
        let mut phase = 0.0f64;
        for _ in 0..total {
            if !self.is_generating() {
                debug!("sine generation force stop");
                outcome = GenerateOutcome::Stopped;
                break;
            }

            if buffer.remaining() < sample_bytes {
                self.flush(buffer);
                buffer = match self.pool.acquire_available() {
                    Some(buffer) => buffer,
                    None => {
                        error!("no buffer available, pool closed");
                        return GenerateOutcome::PoolClosed;
                    }
                };
            }

            let out = ((phase.sin() * amplitude).round() as i32 + self.amplitude_offset)
                .clamp(low, high);
            match self.bits {
                SampleBits::Eight => buffer.push(&[out as u8]),
                SampleBits::Sixteen => buffer.push(&(out as i16).to_le_bytes()),
            };

            phase += per;
        }

        self.flush(buffer);
        outcome
    }

    fn flush(&self, buffer: Buffer) {
        if buffer.is_empty() {
            self.pool.release_as_available(buffer);
        } else {
            self.pool.release_as_ready(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReadyItem;
    use std::thread;

    /// Pull every queued data buffer and concatenate the bytes.
    fn drain_ready(pool: &BufferPool) -> (Vec<u8>, usize) {
        pool.push_end_of_stream();
        let mut bytes = Vec::new();
        let mut buffers = 0;
        while let Some(ReadyItem::Data(buffer)) = pool.acquire_ready() {
            bytes.extend_from_slice(buffer.filled());
            buffers += 1;
            pool.release_as_available(buffer);
        }
        (bytes, buffers)
    }

    fn decode_16(bytes: &[u8]) -> Vec<i32> {
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as i32)
            .collect()
    }

    #[test]
    fn test_generate_requires_start() {
        let pool = Arc::new(BufferPool::new(4, 1024));
        let generator = SineGenerator::new(pool.clone(), 8000, SampleBits::Eight, 128);
        assert_eq!(generator.generate(1000, 10), GenerateOutcome::Stopped);
        assert_eq!(pool.ready_len(), 0);
    }

    #[test]
    fn test_silence_is_midpoint_8bit() {
        let pool = Arc::new(BufferPool::new(8, 256));
        let generator = SineGenerator::new(pool.clone(), 8000, SampleBits::Eight, 128);
        generator.start();
        assert_eq!(generator.generate(0, 50), GenerateOutcome::Completed);

        let (bytes, _) = drain_ready(&pool);
        assert_eq!(bytes.len(), 400);
        assert!(bytes.iter().all(|&b| b == 128));
    }

    #[test]
    fn test_silence_offset_is_not_rescaled_for_16bit() {
        let pool = Arc::new(BufferPool::new(8, 256));
        let generator = SineGenerator::new(pool.clone(), 8000, SampleBits::Sixteen, 128);
        generator.start();
        generator.generate(0, 10);

        let (bytes, _) = drain_ready(&pool);
        let samples = decode_16(&bytes);
        assert_eq!(samples.len(), 80);
        // same constant as 8-bit mode, not 0 and not 32768
        assert!(samples.iter().all(|&s| s == 128));
    }

    #[test]
    fn test_custom_offset() {
        let pool = Arc::new(BufferPool::new(2, 64));
        let generator = SineGenerator::new(pool.clone(), 8000, SampleBits::Sixteen, 0);
        generator.start();
        generator.generate(0, 2);
        let (bytes, _) = drain_ready(&pool);
        assert!(decode_16(&bytes).iter().all(|&s| s == 0));
    }

    #[test]
    fn test_tone_follows_phase_16bit() {
        let sample_rate = 8000;
        let freq = 1422;
        let pool = Arc::new(BufferPool::new(16, 512));
        let generator = SineGenerator::new(pool.clone(), sample_rate, SampleBits::Sixteen, 128);
        generator.start();
        generator.generate(freq, 100);

        let (bytes, _) = drain_ready(&pool);
        let samples = decode_16(&bytes);
        assert_eq!(samples.len(), 800);

        let per = 2.0 * PI * freq as f64 / sample_rate as f64;
        for (i, &s) in samples.iter().enumerate() {
            let phase = (i as f64 * per) % (2.0 * PI);
            let expected = (phase.sin() * 16384.0).round() as i32 + 128;
            assert!(
                (s - expected).abs() <= 1,
                "sample {}: got {}, expected {}",
                i,
                s,
                expected
            );
        }
    }

    #[test]
    fn test_tone_stays_in_byte_range_8bit() {
        let pool = Arc::new(BufferPool::new(16, 512));
        let generator = SineGenerator::new(pool.clone(), 8000, SampleBits::Eight, 128);
        generator.start();
        generator.generate(2004, 100);

        let (bytes, _) = drain_ready(&pool);
        assert_eq!(bytes.len(), 800);
        assert!(bytes.iter().all(|&b| (64..=192).contains(&b)));
        assert!(bytes.iter().any(|&b| b > 180));
        assert!(bytes.iter().any(|&b| b < 76));
    }

    #[test]
    fn test_low_offset_saturates_instead_of_wrapping() {
        let pool = Arc::new(BufferPool::new(8, 256));
        let generator = SineGenerator::new(pool.clone(), 8000, SampleBits::Eight, 0);
        generator.start();
        generator.generate(1000, 10);

        let (bytes, _) = drain_ready(&pool);
        // the negative half of every cycle sits at zero
        assert!(bytes.iter().all(|&b| b <= 64));
        assert!(bytes.iter().filter(|&&b| b == 0).count() >= 30);
    }

    #[test]
    fn test_sample_count_truncates() {
        let pool = Arc::new(BufferPool::new(4, 1024));
        let generator = SineGenerator::new(pool.clone(), 11025, SampleBits::Eight, 128);
        // 3 * 11025 / 1000 = 33.075
        assert_eq!(generator.samples_for(3), 33);
        generator.start();
        generator.generate(1000, 3);
        let (bytes, _) = drain_ready(&pool);
        assert_eq!(bytes.len(), 33);
    }

    #[test]
    fn test_splits_across_buffers() {
        let pool = Arc::new(BufferPool::new(8, 100));
        let generator = SineGenerator::new(pool.clone(), 8000, SampleBits::Sixteen, 128);
        generator.start();
        // 25 ms = 200 samples = 400 bytes = 4 full buffers
        generator.generate(1575, 25);

        let (bytes, buffers) = drain_ready(&pool);
        assert_eq!(bytes.len(), 400);
        assert_eq!(buffers, 4);
    }

    #[test]
    fn test_odd_capacity_keeps_samples_whole() {
        let pool = Arc::new(BufferPool::new(8, 7));
        let generator = SineGenerator::new(pool.clone(), 8000, SampleBits::Sixteen, 128);
        generator.start();
        generator.generate(0, 1);

        pool.push_end_of_stream();
        let mut total = 0;
        while let Some(ReadyItem::Data(buffer)) = pool.acquire_ready() {
            assert_eq!(buffer.filled_len() % 2, 0);
            total += buffer.filled_len();
            pool.release_as_available(buffer);
        }
        assert_eq!(total, 16);
    }

    #[test]
    fn test_stop_flushes_partial_output() {
        let pool = Arc::new(BufferPool::new(2, 64));
        let generator = Arc::new(SineGenerator::new(pool.clone(), 8000, SampleBits::Eight, 128));
        generator.start();

        let producer = {
            let pool = pool.clone();
            let generator = generator.clone();
            thread::spawn(move || {
                let outcome = generator.generate(1764, 10_000);
                pool.push_end_of_stream();
                outcome
            })
        };

        let mut received = 0;
        let mut buffers = 0;
        while let Some(ReadyItem::Data(buffer)) = pool.acquire_ready() {
            received += buffer.filled_len();
            buffers += 1;
            if buffers == 3 {
                generator.stop();
            }
            pool.release_as_available(buffer);
        }

        assert_eq!(producer.join().unwrap(), GenerateOutcome::Stopped);
        assert!(received >= 3 * 64);
        assert!(received < 80_000);
        assert_eq!(pool.available_len(), 2);
    }

    #[test]
    fn test_closed_pool_aborts() {
        let pool = Arc::new(BufferPool::new(1, 16));
        let generator = SineGenerator::new(pool.clone(), 8000, SampleBits::Eight, 128);
        generator.start();
        pool.close();
        assert_eq!(generator.generate(1000, 100), GenerateOutcome::PoolClosed);
    }
}
