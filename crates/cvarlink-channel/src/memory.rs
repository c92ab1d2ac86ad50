use std::collections::VecDeque;

use crate::command::{validate_command, validate_target, ReceivedCommand, MAX_COMMAND_LEN};
use crate::error::Result;
use crate::traits::{CommandChannel, CommandSource};

/// In-memory command channel that records every issued command.
///
/// Used for loopback transfers and tests.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    max_command_len: usize,
    sent: Vec<(String, String)>,
    fail_next: usize,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    /// Create an empty channel with the default console limit.
    pub fn new() -> Self {
        Self::with_max_len(MAX_COMMAND_LEN)
    }

    /// Create an empty channel with an explicit command length limit.
    pub fn with_max_len(max_command_len: usize) -> Self {
        Self {
            max_command_len,
            sent: Vec::new(),
            fail_next: 0,
        }
    }

    /// Make the next `count` sends fail with an I/O error.
    pub fn fail_next(&mut self, count: usize) {
        self.fail_next = count;
    }

    /// Recorded `(target, command)` pairs, in issue order.
    pub fn sent(&self) -> &[(String, String)] {
        &self.sent
    }

    /// Recorded commands only, in issue order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.sent.iter().map(|(_, command)| command.as_str())
    }

    /// Replay the recorded commands as if they arrived from `context`.
    pub fn into_source(self, context: &str) -> MemorySource {
        MemorySource::new(
            self.sent
                .into_iter()
                .map(|(_, text)| ReceivedCommand::new(context, text)),
        )
    }
}

impl CommandChannel for MemoryChannel {
    fn send_command(&mut self, target: &str, command: &str) -> Result<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(std::io::Error::other("injected send failure").into());
        }
        validate_target(target)?;
        validate_command(command, self.max_command_len)?;
        self.sent.push((target.to_string(), command.to_string()));
        Ok(())
    }

    fn max_command_len(&self) -> usize {
        self.max_command_len
    }
}

/// In-memory command source that yields a fixed queue of commands.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    queue: VecDeque<ReceivedCommand>,
}

impl MemorySource {
    /// Create a source that yields `commands` in order.
    pub fn new(commands: impl IntoIterator<Item = ReceivedCommand>) -> Self {
        Self {
            queue: commands.into_iter().collect(),
        }
    }

    /// Queue another command at the end.
    pub fn push(&mut self, command: ReceivedCommand) {
        self.queue.push_back(command);
    }

    /// Number of commands not yet received.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl CommandSource for MemorySource {
    fn recv_command(&mut self) -> Result<Option<ReceivedCommand>> {
        Ok(self.queue.pop_front())
    }
}
