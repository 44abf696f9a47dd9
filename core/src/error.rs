use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModemError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Codebook is empty")]
    EmptyCodebook,

    #[error("Codebook has {len} characters, at most {max} fit between the start and stop tones")]
    CodebookTooLong { len: usize, max: usize },

    #[error("Codebook contains '{0}' more than once")]
    DuplicateCharacter(char),

    #[error("No codebook has been set")]
    NoCodebook,

    #[error("Character '{0}' is not in the codebook")]
    UnknownCharacter(char),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Buffer of {requested} bytes is smaller than the device minimum of {minimum}")]
    BufferTooSmall { requested: usize, minimum: usize },

    #[error("A session is already active")]
    SessionActive,

    #[error("{0} buffers are still held outside the pool")]
    BuffersOutstanding(usize),

    #[error("Audio sink error: {0}")]
    Sink(String),

    #[error("Audio source error: {0}")]
    Source(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModemError>;
