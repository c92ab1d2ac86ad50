use std::io::{BufRead, ErrorKind, Write};

use tracing::{debug, trace};

use crate::command::{validate_command, validate_target, ReceivedCommand, MAX_COMMAND_LEN};
use crate::error::{ChannelError, Result};
use crate::traits::{CommandChannel, CommandSource};

/// Writes commands as `<target> <command>\n` lines to any `Write` stream.
///
/// This is the form consumed by console relays and by [`LineSource`].
pub struct LineChannel<W> {
    inner: W,
    max_command_len: usize,
    line: String,
    sent: usize,
}

impl<W: Write> LineChannel<W> {
    /// Create a line channel with the default console limit.
    pub fn new(inner: W) -> Self {
        Self::with_max_len(inner, MAX_COMMAND_LEN)
    }

    /// Create a line channel with an explicit command length limit.
    pub fn with_max_len(inner: W, max_command_len: usize) -> Self {
        Self {
            inner,
            max_command_len,
            line: String::with_capacity(max_command_len + 64),
            sent: 0,
        }
    }

    /// Number of commands written so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the channel and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_line(&mut self) -> Result<()> {
        let bytes = self.line.as_bytes();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(ChannelError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(ChannelError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(ChannelError::Io(err)),
            }
        }
    }
}

impl<W: Write> CommandChannel for LineChannel<W> {
    fn send_command(&mut self, target: &str, command: &str) -> Result<()> {
        validate_target(target)?;
        validate_command(command, self.max_command_len)?;

        self.line.clear();
        self.line.push_str(target);
        self.line.push(' ');
        self.line.push_str(command);
        self.line.push('\n');
        self.write_line()?;

        self.sent += 1;
        trace!(target, len = command.len(), "command written");
        Ok(())
    }

    fn max_command_len(&self) -> usize {
        self.max_command_len
    }
}

/// Reads `<context> <command>` lines from any `BufRead` stream.
///
/// Blank lines and lines starting with `//` are skipped. The command part is
/// everything after the first space and may itself contain spaces.
pub struct LineSource<R> {
    inner: R,
    buf: String,
    line_no: usize,
}

impl<R: BufRead> LineSource<R> {
    /// Create a new line source.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: String::new(),
            line_no: 0,
        }
    }

    /// Number of lines consumed so far (including skipped ones).
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> CommandSource for LineSource<R> {
    fn recv_command(&mut self) -> Result<Option<ReceivedCommand>> {
        loop {
            self.buf.clear();
            let read = match self.inner.read_line(&mut self.buf) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ChannelError::Io(err)),
            };
            if read == 0 {
                debug!(lines = self.line_no, "line source exhausted");
                return Ok(None);
            }
            self.line_no += 1;

            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() || line.starts_with("//") {
                continue;
            }

            let Some((context, text)) = line.split_once(' ') else {
                return Err(ChannelError::MalformedLine {
                    line: self.line_no,
                    reason: "expected `<context> <command>`",
                });
            };
            if context.is_empty() {
                return Err(ChannelError::MalformedLine {
                    line: self.line_no,
                    reason: "empty context",
                });
            }
            return Ok(Some(ReceivedCommand::new(context, text)));
        }
    }
}
