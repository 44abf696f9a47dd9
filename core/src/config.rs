use crate::error::{ModemError, Result};
use crate::{
    CODE_FREQUENCIES, DEFAULT_AMPLITUDE_OFFSET, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE,
    DEFAULT_SAMPLE_RATE, DEFAULT_TONE_DURATION_MS,
};

/// PCM sample width written by the synthesizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleBits {
    /// Unsigned 8-bit samples, one byte each
    Eight,
    /// Signed 16-bit little-endian samples, two bytes each
    Sixteen,
}

impl SampleBits {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleBits::Eight => 1,
            SampleBits::Sixteen => 2,
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        match self {
            SampleBits::Eight => 8,
            SampleBits::Sixteen => 16,
        }
    }

    /// Peak-to-peak magnitude used to scale the sine wave.
    ///
    /// Half of this value is the amplitude, so an 8-bit tone swings 64 around
    /// the midpoint and a 16-bit tone swings 16384.
    pub fn amplitude_range(self) -> i32 {
        match self {
            SampleBits::Eight => 128,
            SampleBits::Sixteen => 32768,
        }
    }

    /// Smallest and largest value a sample of this width can hold
    pub fn sample_limits(self) -> (i32, i32) {
        match self {
            SampleBits::Eight => (u8::MIN as i32, u8::MAX as i32),
            SampleBits::Sixteen => (i16::MIN as i32, i16::MAX as i32),
        }
    }

    /// Offsets that keep a full-scale tone inside the sample limits
    pub fn offset_limits(self) -> (i32, i32) {
        let (low, high) = self.sample_limits();
        let peak = self.amplitude_range() / 2;
        (low + peak, high - peak)
    }

    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(SampleBits::Eight),
            16 => Ok(SampleBits::Sixteen),
            other => Err(ModemError::InvalidConfig(format!(
                "unsupported bit depth {}, expected 8 or 16",
                other
            ))),
        }
    }
}

/// Everything a session needs to know about its PCM stream
#[derive(Debug, Clone)]
pub struct ModemConfig {
    pub sample_rate: u32,
    pub bits: SampleBits,
    /// Capacity of each pool buffer in bytes
    pub buffer_size: usize,
    pub buffer_count: usize,
    pub tone_duration_ms: u32,
    /// Added to every sample after scaling. Fixed at configuration time and
    /// applied the same way for both bit depths.
    pub amplitude_offset: i32,
    /// Carrier per symbol: index 0 is the start tone, the last index the stop tone
    pub frequencies: Vec<u32>,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            bits: SampleBits::Sixteen,
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffer_count: DEFAULT_BUFFER_COUNT,
            tone_duration_ms: DEFAULT_TONE_DURATION_MS,
            amplitude_offset: DEFAULT_AMPLITUDE_OFFSET,
            frequencies: CODE_FREQUENCIES.to_vec(),
        }
    }
}

impl ModemConfig {
    pub fn max_symbols(&self) -> usize {
        self.frequencies.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ModemError::InvalidConfig("sample rate must be positive".into()));
        }
        if self.buffer_count == 0 {
            return Err(ModemError::InvalidConfig("buffer count must be positive".into()));
        }
        if self.buffer_size < self.bits.bytes_per_sample() {
            return Err(ModemError::InvalidConfig(format!(
                "buffer size {} cannot hold a single {}-bit sample",
                self.buffer_size,
                self.bits.bits_per_sample()
            )));
        }
        // start tone + stop tone + at least one character
        if self.frequencies.len() < 3 {
            return Err(ModemError::InvalidConfig(format!(
                "need at least 3 carrier frequencies, got {}",
                self.frequencies.len()
            )));
        }
        let (low, high) = self.bits.offset_limits();
        if !(low..=high).contains(&self.amplitude_offset) {
            return Err(ModemError::InvalidConfig(format!(
                "amplitude offset {} must be within {}..={} for {}-bit samples",
                self.amplitude_offset,
                low,
                high,
                self.bits.bits_per_sample()
            )));
        }
        // frequency 0 is reserved for the silence gap
        if self.frequencies.contains(&0) {
            return Err(ModemError::InvalidConfig(
                "carrier frequencies must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
