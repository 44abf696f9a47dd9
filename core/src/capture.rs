use crate::buffer::BufferPool;
use crate::error::{ModemError, Result};
use crate::event::{EventListener, ModemEvent};
use log::{debug, error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Microphone-like PCM producer
pub trait AudioSource: Send {
    /// Smallest read size, in bytes, the device can serve
    fn min_buffer_size(&self) -> usize {
        0
    }

    fn start(&mut self) -> Result<()>;

    /// Fill `pcm` with captured bytes, returning how many were written.
    fn read(&mut self, pcm: &mut [u8]) -> Result<usize>;

    fn stop(&mut self) -> Result<()>;
}

/// Capture loop: fills free pool buffers from an [`AudioSource`] and queues
/// them for a consumer
pub struct Recorder {
    pool: Arc<BufferPool>,
    listener: Arc<dyn EventListener>,
    recording: AtomicBool,
}

impl Recorder {
    pub fn new(pool: Arc<BufferPool>, listener: Arc<dyn EventListener>) -> Self {
        Self {
            pool,
            listener,
            recording: AtomicBool::new(false),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Ask a running capture loop to finish after its current read.
    pub fn stop(&self) {
        if self.recording.swap(false, Ordering::SeqCst) {
            debug!("record stop requested");
        }
    }

    /// Capture until stopped, the source fails or the pool closes.
    ///
    /// End-of-stream is always queued on the way out so the consumer can
    /// finish. Returns the number of bytes captured.
    pub fn run<S: AudioSource + ?Sized>(&self, source: &mut S) -> Result<u64> {
        let minimum = source.min_buffer_size();
        if self.pool.capacity() < minimum {
            error!("buffer size is too small");
            return Err(ModemError::BufferTooSmall {
                requested: self.pool.capacity(),
                minimum,
            });
        }

        if self
            .recording
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ModemError::SessionActive);
        }

        if let Err(e) = source.start() {
            self.recording.store(false, Ordering::SeqCst);
            return Err(e);
        }
        debug!("record start");
        self.listener.on_event(ModemEvent::RecordStarted);

        let mut captured: u64 = 0;
        while self.is_recording() {
            let mut buffer = match self.pool.acquire_available() {
                Some(buffer) => buffer,
                None => {
                    error!("no free buffer, pool closed");
                    break;
                }
            };

            match source.read(buffer.storage_mut()) {
                Ok(n) => {
                    buffer.set_filled_len(n);
                    captured += buffer.filled_len() as u64;
                    self.pool.release_as_ready(buffer);
                }
                Err(e) => {
                    error!("capture read failed: {}", e);
                    self.pool.release_as_available(buffer);
                    break;
                }
            }
        }

        self.recording.store(false, Ordering::SeqCst);
        self.pool.push_end_of_stream();
        if let Err(e) = source.stop() {
            error!("audio source failed to stop: {}", e);
        }
        self.listener.on_event(ModemEvent::RecordEnded);
        debug!("record stop, {} bytes", captured);

        Ok(captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReadyItem;
    use crate::event::NoopListener;
    use pretty_assertions::assert_eq;
    use std::thread;

    /// Produces a rising byte counter, optionally failing after some reads.
    struct CounterSource {
        next: u8,
        reads: usize,
        fail_after: Option<usize>,
        min: usize,
    }

    impl CounterSource {
        fn new() -> Self {
            Self {
                next: 0,
                reads: 0,
                fail_after: None,
                min: 0,
            }
        }
    }

    impl AudioSource for CounterSource {
        fn min_buffer_size(&self) -> usize {
            self.min
        }

        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn read(&mut self, pcm: &mut [u8]) -> Result<usize> {
            if Some(self.reads) == self.fail_after {
                return Err(ModemError::Source("mic unplugged".into()));
            }
            self.reads += 1;
            for byte in pcm.iter_mut() {
                *byte = self.next;
                self.next = self.next.wrapping_add(1);
            }
            Ok(pcm.len())
        }

        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_rejects_buffer_below_device_minimum() {
        let pool = Arc::new(BufferPool::new(2, 64));
        let recorder = Recorder::new(pool.clone(), Arc::new(NoopListener));
        let mut source = CounterSource::new();
        source.min = 128;

        let err = recorder.run(&mut source).unwrap_err();
        assert!(matches!(err, ModemError::BufferTooSmall { requested: 64, minimum: 128 }));
        assert_eq!(source.reads, 0);
        assert_eq!(pool.ready_len(), 0);
    }

    #[test]
    fn test_capture_until_source_fails() {
        let pool = Arc::new(BufferPool::new(8, 4));
        let (tx, rx) = crossbeam_channel::unbounded();
        let recorder = Recorder::new(pool.clone(), Arc::new(tx));
        let mut source = CounterSource::new();
        source.fail_after = Some(3);

        assert_eq!(recorder.run(&mut source).unwrap(), 12);
        assert!(!recorder.is_recording());

        let mut bytes = Vec::new();
        while let Some(ReadyItem::Data(buffer)) = pool.acquire_ready() {
            bytes.extend_from_slice(buffer.filled());
            pool.release_as_available(buffer);
        }
        assert_eq!(bytes, (0..12).collect::<Vec<u8>>());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events, vec![ModemEvent::RecordStarted, ModemEvent::RecordEnded]);
    }

    #[test]
    fn test_stop_from_consumer() {
        let pool = Arc::new(BufferPool::new(2, 16));
        let recorder = Arc::new(Recorder::new(pool.clone(), Arc::new(NoopListener)));

        let capture = {
            let recorder = recorder.clone();
            thread::spawn(move || {
                let mut source = CounterSource::new();
                recorder.run(&mut source)
            })
        };

        let mut buffers = 0;
        while let Some(ReadyItem::Data(buffer)) = pool.acquire_ready() {
            buffers += 1;
            if buffers == 5 {
                recorder.stop();
            }
            pool.release_as_available(buffer);
        }

        let captured = capture.join().unwrap().unwrap();
        assert_eq!(captured, buffers as u64 * 16);
        assert!(buffers >= 5);
        pool.reset().unwrap();
    }
}
