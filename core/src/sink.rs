use crate::error::Result;

/// Destination for the PCM stream, driven by the draining thread
pub trait AudioSink: Send {
    fn start(&mut self) -> Result<()>;

    /// Write as much of `pcm` as the device accepts, returning the byte count.
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;

    fn stop(&mut self) -> Result<()>;
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        (**self).write(pcm)
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }
}

/// Sink that keeps everything written to it
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub bytes: Vec<u8>,
    /// Length of every individual write, in order
    pub writes: Vec<usize>,
    pub starts: usize,
    pub stops: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for MemorySink {
    fn start(&mut self) -> Result<()> {
        self.starts += 1;
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        self.bytes.extend_from_slice(pcm);
        self.writes.push(pcm.len());
        Ok(pcm.len())
    }

    fn stop(&mut self) -> Result<()> {
        self.stops += 1;
        Ok(())
    }
}
