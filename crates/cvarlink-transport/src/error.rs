use cvarlink_channel::ChannelError;

/// Errors that can occur while planning, sending or receiving transfers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A chunk size of zero was requested.
    #[error("invalid chunk size {0} (must be at least 1)")]
    InvalidChunkSize(usize),

    /// A command starting with the header prefix could not be decoded.
    #[error("invalid transfer header: {0:?}")]
    InvalidHeader(String),

    /// A sequenced chunk did not carry a valid sequence number.
    #[error("malformed sequence number in chunk: {0:?}")]
    MalformedSequence(String),

    /// A sequenced chunk skipped ahead; the session was discarded.
    #[error("sequence gap (expected {expected}, found {found})")]
    SequenceGap { expected: u16, found: u16 },

    /// The accumulated payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The transfer sink rejected data.
    #[error("sink error: {0}")]
    Sink(String),

    /// An async send task panicked or was aborted.
    #[error("send task failed: {0}")]
    TaskFailed(String),

    /// A channel-level failure (validation, escaping, I/O).
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// An I/O error occurred while persisting a transfer.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
