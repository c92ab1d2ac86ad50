//! Line-oriented command channel abstraction.
//!
//! The game console only accepts short, single-line commands: at most
//! [`MAX_COMMAND_LEN`] characters, no embedded line breaks, no raw quotes
//! inside a quoted argument. This crate provides:
//! - Command validation against those limits
//! - Percent escaping compatible with `sp_sc_cvar_unescape`
//! - The [`CommandChannel`] / [`CommandSource`] collaborator traits
//! - A line-based stream channel and an in-memory loopback channel
//!
//! This is the lowest layer of cvarlink. The encoder and the chunk transport
//! both build on the types provided here.

pub mod command;
pub mod error;
pub mod escape;
pub mod line;
pub mod memory;
pub mod traits;

pub use command::{validate_command, validate_target, ReceivedCommand, MAX_COMMAND_LEN};
pub use error::{ChannelError, Result};
pub use escape::{
    escape, escape_str, escape_with, escaped_len, escaped_len_with, unescape, unescape_str,
    Unescaper,
};
pub use line::{LineChannel, LineSource};
pub use memory::{MemoryChannel, MemorySource};
pub use traits::{CommandChannel, CommandSource};
