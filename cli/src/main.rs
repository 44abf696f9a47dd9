mod device;
mod error;
mod wav;

use clap::{Args, Parser, Subcommand};
use device::{CpalSink, CpalSource};
use error::CliError;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tonelink_core::{
    AudioSink, BufferPool, ModemConfig, ModemError, NoopListener, PcmPlayer, Recorder, SampleBits,
    TonePlayer, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE, DEFAULT_CODEBOOK, DEFAULT_SAMPLE_RATE,
    DEFAULT_TONE_DURATION_MS,
};
use wav::WavSink;

#[derive(Parser)]
#[command(name = "tonelink")]
#[command(about = "Send short text messages as audible tones")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// PCM stream settings shared by every command
#[derive(Args, Clone)]
struct StreamArgs {
    /// Sample rate in Hz
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Bits per sample (8 or 16)
    #[arg(long, default_value_t = 16)]
    bits: u16,

    /// Size of each pool buffer in bytes
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Number of pool buffers
    #[arg(long, default_value_t = DEFAULT_BUFFER_COUNT)]
    buffer_count: usize,

    /// Duration of each tone in milliseconds
    #[arg(long, default_value_t = DEFAULT_TONE_DURATION_MS)]
    tone_ms: u32,
}

impl StreamArgs {
    fn to_config(&self) -> Result<ModemConfig, ModemError> {
        let config = ModemConfig {
            sample_rate: self.sample_rate,
            bits: SampleBits::from_bits(self.bits)?,
            buffer_size: self.buffer_size,
            buffer_count: self.buffer_count,
            tone_duration_ms: self.tone_ms,
            ..ModemConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render a message to a WAV file
    Encode {
        /// Message, made of codebook characters only
        text: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Characters that can be sent, in symbol order
        #[arg(long, default_value = DEFAULT_CODEBOOK)]
        codebook: String,

        /// Silence after the message in milliseconds
        #[arg(long, default_value_t = 0)]
        mute_ms: u32,

        #[command(flatten)]
        stream: StreamArgs,
    },

    /// Play a message on the default output device
    Play {
        /// Message, made of codebook characters only
        text: String,

        /// Characters that can be sent, in symbol order
        #[arg(long, default_value = DEFAULT_CODEBOOK)]
        codebook: String,

        /// Silence after each message in milliseconds
        #[arg(long, default_value_t = 0)]
        mute_ms: u32,

        /// Loop the message until stopped
        #[arg(long)]
        repeat: bool,

        /// Force-stop after this many seconds
        #[arg(long)]
        seconds: Option<f32>,

        #[command(flatten)]
        stream: StreamArgs,
    },

    /// Capture the default input device to a WAV file
    Record {
        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Capture length in seconds
        #[arg(long, default_value_t = 5.0)]
        seconds: f32,

        #[command(flatten)]
        stream: StreamArgs,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            text,
            output,
            codebook,
            mute_ms,
            stream,
        } => encode_command(&text, &output, &codebook, mute_ms, &stream)?,
        Commands::Play {
            text,
            codebook,
            mute_ms,
            repeat,
            seconds,
            stream,
        } => play_command(&text, &codebook, mute_ms, repeat, seconds, &stream)?,
        Commands::Record {
            output,
            seconds,
            stream,
        } => record_command(&output, seconds, &stream)?,
    }

    Ok(())
}

fn start_session<S: AudioSink + 'static>(
    sink: S,
    codebook: &str,
    text: &str,
    repeat: bool,
    mute_ms: u32,
    stream: &StreamArgs,
) -> Result<TonePlayer<S>, CliError> {
    let player = TonePlayer::new(stream.to_config()?, sink)?;
    player.set_codebook(codebook)?;
    player.play(text, repeat, mute_ms)?;
    Ok(player)
}

fn encode_command(
    text: &str,
    output_path: &PathBuf,
    codebook: &str,
    mute_ms: u32,
    stream: &StreamArgs,
) -> Result<(), CliError> {
    let config = stream.to_config()?;
    let sink = WavSink::new(output_path.clone(), config.sample_rate, config.bits);

    let player = start_session(sink, codebook, text, false, mute_ms, stream)?;
    player.wait();
    if let Some(e) = player.take_error() {
        return Err(e.into());
    }

    let samples = player.with_sink(|sink| sink.samples_written());
    println!("Encoded {:?} to {} audio samples", text, samples);
    println!("Wrote {}", output_path.display());
    Ok(())
}

fn play_command(
    text: &str,
    codebook: &str,
    mute_ms: u32,
    repeat: bool,
    seconds: Option<f32>,
    stream: &StreamArgs,
) -> Result<(), CliError> {
    let config = stream.to_config()?;
    let sink = CpalSink::new(config.sample_rate, config.bits);

    let player = start_session(sink, codebook, text, repeat, mute_ms, stream)?;
    match seconds {
        Some(secs) => {
            thread::sleep(Duration::from_secs_f32(secs.max(0.0)));
            info!("time is up, stopping");
            player.stop();
        }
        None => {
            if repeat {
                warn!("repeating until interrupted");
            }
            player.wait();
        }
    }
    match player.take_error() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn record_command(output_path: &PathBuf, seconds: f32, stream: &StreamArgs) -> Result<(), CliError> {
    let config = stream.to_config()?;
    let pool = Arc::new(BufferPool::new(config.buffer_count, config.buffer_size));
    let recorder = Arc::new(Recorder::new(pool.clone(), Arc::new(NoopListener)));

    let writer = {
        let pool = pool.clone();
        let mut sink = WavSink::new(output_path.clone(), config.sample_rate, config.bits);
        thread::spawn(move || {
            PcmPlayer::new(pool, Arc::new(NoopListener))
                .run(&mut sink)
                .map(|_| sink.samples_written())
        })
    };

    let capture = {
        let recorder = recorder.clone();
        let (sample_rate, bits) = (config.sample_rate, config.bits);
        thread::spawn(move || {
            let mut source = CpalSource::new(sample_rate, bits);
            recorder.run(&mut source)
        })
    };

    println!("Recording for {:.1} s", seconds);
    thread::sleep(Duration::from_secs_f32(seconds.max(0.0)));
    recorder.stop();

    let captured = capture
        .join()
        .map_err(|_| CliError::Device("capture thread panicked".into()))?;
    if captured.is_err() {
        // the recorder never started, so nothing will end the writer's stream
        pool.close();
    }
    let written = writer
        .join()
        .map_err(|_| CliError::Device("writer thread panicked".into()))?;
    captured?;
    let samples = written?;

    println!("Captured {} samples", samples);
    println!("Wrote {}", output_path.display());
    Ok(())
}
