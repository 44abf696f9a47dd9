use thiserror::Error;
use tonelink_core::ModemError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("No default {0} device")]
    NoDevice(&'static str),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Modem(#[from] ModemError),
}
