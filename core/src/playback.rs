use crate::buffer::{BufferPool, ReadyItem};
use crate::error::{ModemError, Result};
use crate::event::{EventListener, ModemEvent};
use crate::sink::AudioSink;
use log::{debug, error};
use std::sync::Arc;

/// Consumer side of the pool: drains ready buffers into an [`AudioSink`]
pub struct PcmPlayer {
    pool: Arc<BufferPool>,
    listener: Arc<dyn EventListener>,
}

impl PcmPlayer {
    pub fn new(pool: Arc<BufferPool>, listener: Arc<dyn EventListener>) -> Self {
        Self { pool, listener }
    }

    /// Play until end-of-stream or until the pool is closed. Returns bytes written.
    ///
    /// A sink that fails to start or write closes the pool so the producer
    /// cannot block forever, then the loop winds down like a normal end and
    /// the first sink error is returned.
    pub fn run<S: AudioSink + ?Sized>(&self, sink: &mut S) -> Result<u64> {
        if let Err(e) = sink.start() {
            error!("audio sink failed to start: {}", e);
            self.pool.close();
            return Err(e);
        }

        self.listener.on_event(ModemEvent::PlayStarted);

        let mut played: u64 = 0;
        let mut failure = None;
        loop {
            match self.pool.acquire_ready() {
                Some(ReadyItem::Data(buffer)) => {
                    let result = write_all(sink, buffer.filled());
                    self.pool.release_as_available(buffer);
                    match result {
                        Ok(n) => played += n as u64,
                        Err(e) => {
                            error!("audio sink write failed: {}", e);
                            self.pool.close();
                            failure = Some(e);
                            break;
                        }
                    }
                }
                Some(ReadyItem::EndOfStream) => {
                    debug!("end of input, stopping playback");
                    break;
                }
                None => {
                    error!("no ready buffer, pool closed");
                    break;
                }
            }
        }

        if let Err(e) = sink.stop() {
            error!("audio sink failed to stop: {}", e);
            failure.get_or_insert(e);
        }
        debug!("played {} bytes", played);
        self.listener.on_event(ModemEvent::PlayEnded);

        match failure {
            Some(e) => Err(e),
            None => Ok(played),
        }
    }
}

fn write_all<S: AudioSink + ?Sized>(sink: &mut S, mut pcm: &[u8]) -> Result<usize> {
    let total = pcm.len();
    while !pcm.is_empty() {
        let n = sink.write(pcm)?;
        if n == 0 {
            return Err(ModemError::Sink("device accepted no data".into()));
        }
        pcm = &pcm[n.min(pcm.len())..];
    }
    Ok(total)
}
