//! Acoustic text modem
//!
//! Maps each character of a small codebook onto a fixed carrier tone,
//! synthesizes the tones as PCM and streams them to an audio sink through a
//! fixed pool of buffers shared by a filling thread and a draining thread.

pub mod error;
pub mod config;
pub mod cancel;
pub mod event;
pub mod codebook;
pub mod buffer;
pub mod synth;
pub mod encoder;
pub mod sink;
pub mod playback;
pub mod capture;
pub mod session;

pub use buffer::{Buffer, BufferPool, ReadyItem};
pub use cancel::CancelToken;
pub use capture::{AudioSource, Recorder};
pub use codebook::Codebook;
pub use config::{ModemConfig, SampleBits};
pub use encoder::FrequencyEncoder;
pub use error::{ModemError, Result};
pub use event::{EventListener, ModemEvent, NoopListener};
pub use playback::PcmPlayer;
pub use session::{SessionState, TonePlayer};
pub use sink::{AudioSink, MemorySink};
pub use synth::{GenerateOutcome, SineGenerator};

// Stream defaults
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_BUFFER_COUNT: usize = 3;
pub const DEFAULT_TONE_DURATION_MS: u32 = 100;

/// Midpoint added to every synthesized sample, regardless of bit depth
pub const DEFAULT_AMPLITUDE_OFFSET: i32 = 128;

// Carrier table: start tone, five character tones, stop tone
pub const CODE_FREQUENCIES: [u32; 7] = [1422, 1575, 1764, 2004, 2321, 2940, 4410];
pub const MAX_SYMBOLS: usize = CODE_FREQUENCIES.len();
pub const START_TOKEN: usize = 0;
pub const STOP_TOKEN: usize = MAX_SYMBOLS - 1;

pub const DEFAULT_CODEBOOK: &str = "12345";
