use cvarlink_channel::ChannelError;

/// Errors that can occur while encoding a document into a chain.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A `<` was never closed by a matching `>`.
    #[error("unterminated tag starting at offset {offset}")]
    UnterminatedTag { offset: usize },

    /// A single tag cannot fit into an empty record.
    #[error("tag too large for any record ({len} chars, capacity {capacity}): {preview}")]
    TagTooLong {
        preview: String,
        len: usize,
        capacity: usize,
    },

    /// A single script command cannot fit into an empty record.
    #[error("command too large for any record ({len} chars, capacity {capacity}): {preview}")]
    CommandTooLong {
        preview: String,
        len: usize,
        capacity: usize,
    },

    /// A script has unbalanced braces or a misplaced block.
    #[error("malformed script at line {line}: {reason}")]
    MalformedScript { line: usize, reason: &'static str },

    /// A function shell does not fit a record even with its body moved out.
    #[error("function {name} does not fit a record even with its body moved out")]
    FunctionTooLarge { name: String },

    /// Two functions of one script share a name.
    #[error("function {0} defined more than once")]
    DuplicateFunction(String),

    /// The record overhead leaves no room for content.
    #[error("record {record} has no capacity left (max {max_len}, overhead {overhead})")]
    NoCapacity {
        record: String,
        max_len: usize,
        overhead: usize,
    },

    /// A rendered `.cfg` line exceeds the console limit.
    #[error("generated line for {name} too long ({len} chars, max {max})")]
    LineTooLong { name: String, len: usize, max: usize },

    /// The chain base name is not usable as a cvar name.
    #[error("invalid chain base name: {0:?}")]
    InvalidBaseName(String),

    /// A `.cfg` line could not be parsed.
    #[error("malformed cfg line {line}: {reason}")]
    MalformedCfg { line: usize, reason: &'static str },

    /// A chain violates a structural invariant.
    #[error("broken chain: {0}")]
    BrokenChain(String),

    /// Escaping or validation failed at the channel layer.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

pub type Result<T> = std::result::Result<T, EncodeError>;

/// Shorten long text for error messages.
pub(crate) fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 120;
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    out.push_str("...");
    out
}
