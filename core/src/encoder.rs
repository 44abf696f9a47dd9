use crate::cancel::CancelToken;
use crate::event::{EventListener, ModemEvent};
use crate::synth::{GenerateOutcome, SineGenerator};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Turns a symbol sequence into consecutive tones
///
/// Each symbol selects one carrier from the frequency table; the message is
/// followed by a silent gap so back-to-back messages stay separable. The
/// encoder is either Stopped or Encoding, and [`FrequencyEncoder::stop`] is how
/// another thread cuts a running `encode` short.
pub struct FrequencyEncoder {
    generator: SineGenerator,
    frequencies: Vec<u32>,
    encoding: AtomicBool,
    cancel: CancelToken,
    listener: Arc<dyn EventListener>,
}

impl FrequencyEncoder {
    pub fn new(
        generator: SineGenerator,
        frequencies: Vec<u32>,
        cancel: CancelToken,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            generator,
            frequencies,
            encoding: AtomicBool::new(false),
            cancel,
            listener,
        }
    }

    pub fn generator(&self) -> &SineGenerator {
        &self.generator
    }

    pub fn is_stopped(&self) -> bool {
        !self.encoding.load(Ordering::SeqCst)
    }

    fn is_encoding(&self) -> bool {
        self.encoding.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Synthesize every symbol for `duration_ms`, then `mute_interval_ms` of silence.
    ///
    /// Does nothing if an encode is already running. Out-of-range symbols are
    /// skipped. Always returns Stopped, with the generator stopped.
    pub fn encode(&self, symbols: &[usize], duration_ms: u32, mute_interval_ms: u32) {
        if self
            .encoding
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("encode ignored, already encoding");
            return;
        }

        self.listener.on_event(ModemEvent::EncodeStarted);
        self.generator.start();

        for &symbol in symbols {
            if !self.is_encoding() {
                debug!("encode force stop");
                break;
            }

            match self.frequencies.get(symbol) {
                Some(&frequency) => {
                    debug!("encode: {}", symbol);
                    if self.generator.generate(frequency, duration_ms) == GenerateOutcome::PoolClosed {
                        warn!("buffer pool closed, abandoning message");
                        break;
                    }
                }
                None => warn!(
                    "symbol {} out of range 0..{}, skipped",
                    symbol,
                    self.frequencies.len()
                ),
            }
        }

        if self.is_encoding() {
            self.generator.generate(0, mute_interval_ms);
        } else {
            debug!("encode force stop, skipping mute interval");
        }

        self.encoding.store(false, Ordering::SeqCst);
        self.generator.stop();

        self.listener.on_event(ModemEvent::EncodeEnded);
    }

    /// Cancel a running `encode`. Idempotent.
    pub fn stop(&self) {
        if self
            .encoding
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!("encoder stop requested");
            self.generator.stop();
        }
    }
}
