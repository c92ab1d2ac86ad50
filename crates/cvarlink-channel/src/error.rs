/// Errors that can occur on the command channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The command exceeds the channel's length budget.
    #[error("command too long ({len} chars, max {max})")]
    TooLong { len: usize, max: usize },

    /// The command contains a line break, which would split it in two.
    #[error("command contains a line break at offset {offset}")]
    ContainsLineBreak { offset: usize },

    /// The command contains a raw double quote.
    #[error("command contains a raw quote at offset {offset}")]
    ContainsQuote { offset: usize },

    /// The target selector is empty or contains whitespace.
    #[error("invalid target selector: {0:?}")]
    InvalidTarget(String),

    /// A percent escape sequence could not be decoded.
    #[error("malformed escape sequence at offset {offset}")]
    MalformedEscape { offset: usize },

    /// Unescaped bytes are not valid UTF-8 where text was expected.
    #[error("unescaped text is not valid UTF-8")]
    InvalidUtf8,

    /// A received line did not follow the `<context> <command>` layout.
    #[error("malformed command line {line}: {reason}")]
    MalformedLine { line: usize, reason: &'static str },

    /// An I/O error occurred on the underlying stream.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying stream accepted zero bytes.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
