use crate::error::{ChannelError, Result};

/// Maximum length of a single console command, in characters.
pub const MAX_COMMAND_LEN: usize = 255;

/// A command delivered by the channel, tagged with the context it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCommand {
    /// Originating context (peer identity, client slot, ...).
    pub context: String,
    /// The command text as delivered.
    pub text: String,
}

impl ReceivedCommand {
    /// Create a new received command.
    pub fn new(context: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            text: text.into(),
        }
    }
}

/// Check that `command` can travel as a single console command.
///
/// Length is counted in characters, not bytes.
pub fn validate_command(command: &str, max_len: usize) -> Result<()> {
    let mut len = 0usize;
    for (offset, c) in command.char_indices() {
        match c {
            '\n' | '\r' => return Err(ChannelError::ContainsLineBreak { offset }),
            '"' => return Err(ChannelError::ContainsQuote { offset }),
            _ => len += 1,
        }
    }
    if len > max_len {
        return Err(ChannelError::TooLong { len, max: max_len });
    }
    Ok(())
}

/// Check that `target` is a usable target selector: non-empty, no whitespace.
pub fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() || target.chars().any(char::is_whitespace) {
        return Err(ChannelError::InvalidTarget(target.to_string()));
    }
    Ok(())
}
