use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tonelink_core::{AudioSink, ModemError, Result, SampleBits};

/// Writes the PCM stream into a mono WAV file
///
/// The file is (re)created on every `start` and finalized on `stop`, so each
/// session produces one complete file.
pub struct WavSink {
    path: PathBuf,
    spec: WavSpec,
    bits: SampleBits,
    writer: Option<WavWriter<BufWriter<File>>>,
    samples: u64,
}

impl WavSink {
    pub fn new(path: PathBuf, sample_rate: u32, bits: SampleBits) -> Self {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: bits.bits_per_sample(),
            sample_format: SampleFormat::Int,
        };
        Self {
            path,
            spec,
            bits,
            writer: None,
            samples: 0,
        }
    }

    pub fn samples_written(&self) -> u64 {
        self.samples
    }
}

fn sink_error(e: hound::Error) -> ModemError {
    ModemError::Sink(e.to_string())
}

impl AudioSink for WavSink {
    fn start(&mut self) -> Result<()> {
        let writer = WavWriter::create(&self.path, self.spec).map_err(sink_error)?;
        self.writer = Some(writer);
        self.samples = 0;
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ModemError::Sink("WAV sink not started".into()))?;

        match self.bits {
            SampleBits::Eight => {
                // hound takes 8-bit samples signed and stores them unsigned
                for &byte in pcm {
                    writer
                        .write_sample((byte as i16 - 128) as i8)
                        .map_err(sink_error)?;
                }
                self.samples += pcm.len() as u64;
                Ok(pcm.len())
            }
            SampleBits::Sixteen => {
                for pair in pcm.chunks_exact(2) {
                    writer
                        .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                        .map_err(sink_error)?;
                }
                let whole = pcm.len() / 2;
                self.samples += whole as u64;
                Ok(whole * 2)
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(writer) => writer.finalize().map_err(sink_error),
            None => Ok(()),
        }
    }
}
