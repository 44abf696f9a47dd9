use crate::error::CliError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, warn};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tonelink_core::{AudioSink, AudioSource, ModemError, Result, SampleBits};

/// How long the sink keeps the device open after the last sample was queued
const DRAIN_GRACE: Duration = Duration::from_millis(150);

/// Upper bound on waiting for the device to pull the queued samples
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

fn mono_config(sample_rate: u32) -> StreamConfig {
    StreamConfig {
        channels: 1,
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    }
}

/// Convert synthesizer PCM into `[-1, 1]` floats.
pub fn pcm_to_f32(pcm: &[u8], bits: SampleBits) -> Vec<f32> {
    match bits {
        SampleBits::Eight => pcm.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        SampleBits::Sixteen => pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect(),
    }
}

/// Write one float sample as PCM bytes, returning how many bytes were used.
pub fn f32_to_pcm(sample: f32, bits: SampleBits, out: &mut [u8]) -> usize {
    let clamped = sample.clamp(-1.0, 1.0);
    match bits {
        SampleBits::Eight => {
            out[0] = ((clamped * 127.0).round() as i32 + 128) as u8;
            1
        }
        SampleBits::Sixteen => {
            let value = (clamped * 32767.0).round() as i16;
            out[..2].copy_from_slice(&value.to_le_bytes());
            2
        }
    }
}

/// Owns a cpal stream on a dedicated thread (streams are not `Send`)
struct StreamThread {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    fn spawn<F>(name: &str, build: F) -> std::result::Result<Self, CliError>
    where
        F: FnOnce() -> std::result::Result<cpal::Stream, CliError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CliError::Device(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // park until the owner hangs up
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| CliError::Device(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                shutdown: Some(shutdown_tx),
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CliError::Device("stream thread exited".into()))
            }
        }
    }

    fn close(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("audio stream thread panicked");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.close();
    }
}

/// Plays the PCM stream on the default output device
///
/// `write` blocks once a quarter second of audio is queued, which paces the
/// draining thread to real time.
pub struct CpalSink {
    sample_rate: u32,
    bits: SampleBits,
    queue: Option<Sender<f32>>,
    stream: Option<StreamThread>,
}

impl CpalSink {
    pub fn new(sample_rate: u32, bits: SampleBits) -> Self {
        Self {
            sample_rate,
            bits,
            queue: None,
            stream: None,
        }
    }

    fn open(&mut self) -> std::result::Result<(), CliError> {
        let (tx, rx) = crossbeam_channel::bounded::<f32>((self.sample_rate / 4).max(1) as usize);
        let config = mono_config(self.sample_rate);

        let stream = StreamThread::spawn("tonelink-output", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or(CliError::NoDevice("output"))?;
            debug!("output device: {}", device.name().unwrap_or_else(|_| "<unknown>".into()));
            device
                .build_output_stream(
                    &config,
                    move |out: &mut [f32], _| {
                        for sample in out.iter_mut() {
                            *sample = rx.try_recv().unwrap_or(0.0);
                        }
                    },
                    move |err| error!("output stream error: {}", err),
                    None,
                )
                .map_err(|e| CliError::Device(e.to_string()))
        })?;

        self.queue = Some(tx);
        self.stream = Some(stream);
        Ok(())
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self) -> Result<()> {
        self.open().map_err(|e| ModemError::Sink(e.to_string()))
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| ModemError::Sink("output device not started".into()))?;

        for sample in pcm_to_f32(pcm, self.bits) {
            queue
                .send_timeout(sample, DRAIN_TIMEOUT)
                .map_err(|_| ModemError::Sink("output stream stalled".into()))?;
        }
        Ok(pcm.len() - pcm.len() % self.bits.bytes_per_sample())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(queue) = self.queue.take() {
            if wait_until_drained(&queue, DRAIN_TIMEOUT) {
                thread::sleep(DRAIN_GRACE);
            } else {
                warn!("output device stalled, dropping {} queued samples", queue.len());
            }
        }
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        Ok(())
    }
}

/// Wait for the output callback to empty `queue`. False if it stalled.
fn wait_until_drained<T>(queue: &Sender<T>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !queue.is_empty() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

/// Captures mono PCM from the default input device
pub struct CpalSource {
    sample_rate: u32,
    bits: SampleBits,
    min_buffer_size: usize,
    queue: Option<Receiver<Vec<f32>>>,
    pending: Vec<f32>,
    stream: Option<StreamThread>,
}

impl CpalSource {
    pub fn new(sample_rate: u32, bits: SampleBits) -> Self {
        Self {
            sample_rate,
            bits,
            // roughly 20 ms of audio
            min_buffer_size: (sample_rate as usize / 50) * bits.bytes_per_sample(),
            queue: None,
            pending: Vec::new(),
            stream: None,
        }
    }

    fn open(&mut self) -> std::result::Result<(), CliError> {
        let (tx, rx) = crossbeam_channel::bounded::<Vec<f32>>(256);
        let config = mono_config(self.sample_rate);

        let stream = StreamThread::spawn("tonelink-input", move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or(CliError::NoDevice("input"))?;
            debug!("input device: {}", device.name().unwrap_or_else(|_| "<unknown>".into()));
            device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        if tx.try_send(data.to_vec()).is_err() {
                            warn!("capture queue full, dropping {} samples", data.len());
                        }
                    },
                    move |err| error!("input stream error: {}", err),
                    None,
                )
                .map_err(|e| CliError::Device(e.to_string()))
        })?;

        self.queue = Some(rx);
        self.stream = Some(stream);
        Ok(())
    }
}

impl AudioSource for CpalSource {
    fn min_buffer_size(&self) -> usize {
        self.min_buffer_size
    }

    fn start(&mut self) -> Result<()> {
        self.pending.clear();
        self.open().map_err(|e| ModemError::Source(e.to_string()))
    }

    fn read(&mut self, pcm: &mut [u8]) -> Result<usize> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| ModemError::Source("input device not started".into()))?;

        let width = self.bits.bytes_per_sample();
        let wanted = pcm.len() / width;
        while self.pending.len() < wanted {
            match queue.recv_timeout(Duration::from_secs(1)) {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(_) => return Err(ModemError::Source("input stream stalled".into())),
            }
        }

        let mut written = 0;
        for sample in self.pending.drain(..wanted) {
            written += f32_to_pcm(sample, self.bits, &mut pcm[written..]);
        }
        Ok(written)
    }

    fn stop(&mut self) -> Result<()> {
        self.queue.take();
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        Ok(())
    }
}
