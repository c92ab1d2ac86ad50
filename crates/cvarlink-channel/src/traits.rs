use crate::command::ReceivedCommand;
use crate::error::Result;

/// Outbound side of the console: "send one short command to a target".
///
/// Implementations must reject commands that violate the channel limits
/// instead of truncating them. A successful return means the command was
/// issued; the channel offers no acknowledgement beyond that.
pub trait CommandChannel {
    /// Issue a single command addressed to `target`.
    fn send_command(&mut self, target: &str, command: &str) -> Result<()>;

    /// Maximum command length accepted by this channel, in characters.
    fn max_command_len(&self) -> usize;
}

/// Inbound side of the console: "deliver one short command with its
/// originating context".
pub trait CommandSource {
    /// Receive the next command. Returns `Ok(None)` at end of stream.
    fn recv_command(&mut self) -> Result<Option<ReceivedCommand>>;
}

impl<C: CommandChannel + ?Sized> CommandChannel for &mut C {
    fn send_command(&mut self, target: &str, command: &str) -> Result<()> {
        (**self).send_command(target, command)
    }

    fn max_command_len(&self) -> usize {
        (**self).max_command_len()
    }
}

impl<S: CommandSource + ?Sized> CommandSource for &mut S {
    fn recv_command(&mut self) -> Result<Option<ReceivedCommand>> {
        (**self).recv_command()
    }
}

impl<C: CommandChannel + ?Sized> CommandChannel for Box<C> {
    fn send_command(&mut self, target: &str, command: &str) -> Result<()> {
        (**self).send_command(target, command)
    }

    fn max_command_len(&self) -> usize {
        (**self).max_command_len()
    }
}
