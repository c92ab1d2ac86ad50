use std::time::Duration;

use cvarlink_channel::{validate_target, ChannelError, CommandChannel, MAX_COMMAND_LEN};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::kind::{Framing, PayloadKind};
use crate::pacer::{CancelToken, Pacer, ThreadPacer};
use crate::plan::TransferPlan;

/// Default requested chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Default delay between two commands.
pub const DEFAULT_PACE: Duration = Duration::from_millis(100);

/// Retry of failed channel send calls.
///
/// The protocol has no acknowledgements, so this only covers local send
/// failures (I/O errors). Validation failures are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per command, including the first. Default: 1.
    pub max_attempts: u32,
    /// Delay before each retry. Default: none.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::default()
    }

    /// Up to `max_attempts` attempts separated by `backoff`.
    pub fn attempts(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// Configuration for planning and sending transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Requested chunk size in escaped characters. Default: 64.
    pub chunk_size: usize,
    /// Delay between commands. Default: 100 ms.
    pub pace: Duration,
    /// Chunk framing. Default: plain.
    pub framing: Framing,
    /// Send the terminal marker after the last chunk. Default: true.
    pub end_marker: bool,
    /// Retry of failed send calls.
    pub retry: RetryPolicy,
    /// Channel command limit the first chunk must fit. Default: 255.
    pub max_command_len: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pace: DEFAULT_PACE,
            framing: Framing::Plain,
            end_marker: true,
            retry: RetryPolicy::default(),
            max_command_len: MAX_COMMAND_LEN,
        }
    }
}

/// Outcome of one send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Commands issued, end marker included.
    pub commands_sent: usize,
    /// Data chunks issued.
    pub chunks_sent: usize,
    /// Escaped data characters issued.
    pub bytes_sent: usize,
    /// Failed send calls that were retried.
    pub retries: usize,
    /// Whether the terminal marker was issued.
    pub end_marker_sent: bool,
    /// Whether the send stopped early on request.
    pub cancelled: bool,
}

impl SendReport {
    pub(crate) fn record(&mut self, plan: &TransferPlan, index: usize) {
        self.commands_sent += 1;
        match plan.data_chunks().get(index) {
            Some(data) => {
                self.chunks_sent += 1;
                self.bytes_sent += data.len();
            }
            None => self.end_marker_sent = true,
        }
    }
}

pub(crate) fn is_retryable(err: &ChannelError) -> bool {
    matches!(err, ChannelError::Io(_))
}

/// Sends planned transfers one command at a time.
///
/// Commands are strictly sequential: command `i + 1` is issued only after the
/// send call for command `i` has returned, with `pace` between them.
pub struct ChunkSender<C, P = ThreadPacer> {
    channel: C,
    pacer: P,
    config: SenderConfig,
}

impl<C: CommandChannel> ChunkSender<C, ThreadPacer> {
    /// Create a sender that sleeps the current thread between commands.
    pub fn new(channel: C, config: SenderConfig) -> Self {
        Self::with_pacer(channel, ThreadPacer, config)
    }
}

impl<C: CommandChannel, P: Pacer> ChunkSender<C, P> {
    /// Create a sender with an explicit pacer.
    pub fn with_pacer(channel: C, pacer: P, config: SenderConfig) -> Self {
        Self {
            channel,
            pacer,
            config,
        }
    }

    /// Plan a transfer sized for this sender's channel.
    pub fn plan(&self, payload: &[u8], kind: PayloadKind) -> Result<TransferPlan> {
        let config = SenderConfig {
            max_command_len: self
                .config
                .max_command_len
                .min(self.channel.max_command_len()),
            ..self.config.clone()
        };
        TransferPlan::new(payload, kind, &config)
    }

    /// Plan and send a payload without cancellation.
    pub fn send_payload(
        &mut self,
        payload: &[u8],
        kind: PayloadKind,
        target: &str,
    ) -> Result<SendReport> {
        let plan = self.plan(payload, kind)?;
        self.send(&plan, target, &CancelToken::new())
    }

    /// Send every command of `plan` to `target`.
    ///
    /// Cancellation is checked before each command; a cancelled send returns
    /// `Ok` with `cancelled` set.
    pub fn send(
        &mut self,
        plan: &TransferPlan,
        target: &str,
        cancel: &CancelToken,
    ) -> Result<SendReport> {
        validate_target(target)?;
        info!(
            target,
            kind = %plan.kind(),
            chunks = plan.chunk_count(),
            chunk_size = plan.chunk_size(),
            "sending transfer"
        );

        let mut report = SendReport::default();
        for index in 0..plan.command_count() {
            if index > 0 {
                self.pacer.pause(self.config.pace);
            }
            if cancel.is_cancelled() {
                warn!(
                    target,
                    sent = report.commands_sent,
                    remaining = plan.command_count() - index,
                    "transfer cancelled"
                );
                report.cancelled = true;
                break;
            }
            let Some(command) = plan.command(index) else {
                break;
            };
            report.retries += self.issue(target, &command)?;
            report.record(plan, index);
            debug!(target, index, len = command.len(), "chunk issued");
        }

        if !report.cancelled {
            info!(target, commands = report.commands_sent, "transfer sent");
        }
        Ok(report)
    }

    /// Issue one command, retrying per policy. Returns the number of retries.
    fn issue(&mut self, target: &str, command: &str) -> Result<usize> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match self.channel.send_command(target, command) {
                Ok(()) => return Ok((attempt - 1) as usize),
                Err(err) if attempt < max_attempts && is_retryable(&err) => {
                    warn!(target, attempt, error = %err, "command send failed, retrying");
                    self.pacer.pause(self.config.retry.backoff);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Current sender configuration.
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Borrow the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutably borrow the underlying channel.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Consume the sender and return the channel.
    pub fn into_inner(self) -> C {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use cvarlink_channel::MemoryChannel;

    use super::*;
    use crate::error::TransportError;
    use crate::header::END_MARKER;
    use crate::pacer::NoPacer;

    #[derive(Default)]
    struct RecordingPacer {
        pauses: Vec<Duration>,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl Pacer for RecordingPacer {
        fn pause(&mut self, delay: Duration) {
            self.pauses.push(delay);
            if let Some((after, token)) = &self.cancel_after {
                if self.pauses.len() >= *after {
                    token.cancel();
                }
            }
        }
    }

    fn sender(channel: MemoryChannel) -> ChunkSender<MemoryChannel, NoPacer> {
        ChunkSender::with_pacer(channel, NoPacer, SenderConfig::default())
    }

    #[test]
    fn sends_every_command_in_order() {
        let mut sender = sender(MemoryChannel::new());
        let payload = vec![b'p'; 130];
        let report = sender
            .send_payload(&payload, PayloadKind::MenuDocument, "srv")
            .unwrap();

        assert_eq!(report.commands_sent, 4);
        assert_eq!(report.chunks_sent, 3);
        assert_eq!(report.bytes_sent, 130);
        assert!(report.end_marker_sent);
        assert!(!report.cancelled);

        let channel = sender.into_inner();
        let commands: Vec<_> = channel.commands().collect();
        assert!(commands[0].starts_with("#!m!"));
        assert_eq!(commands[3], END_MARKER);
        assert!(channel.sent().iter().all(|(target, _)| target == "srv"));
    }

    #[test]
    fn paces_between_commands_only() {
        let mut pacer = RecordingPacer::default();
        let mut sender =
            ChunkSender::with_pacer(MemoryChannel::new(), &mut pacer, SenderConfig::default());
        sender
            .send_payload(&[b'a'; 130], PayloadKind::ScriptFragment, "srv")
            .unwrap();
        drop(sender);
        assert_eq!(pacer.pauses, vec![DEFAULT_PACE; 3]);
    }

    #[test]
    fn cancel_before_start_sends_nothing() {
        let mut sender = sender(MemoryChannel::new());
        let plan = sender.plan(b"abc", PayloadKind::MenuDocument).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let report = sender.send(&plan, "srv", &token).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.commands_sent, 0);
        assert!(sender.channel().sent().is_empty());
    }

    #[test]
    fn cancel_mid_transfer_stops_further_sends() {
        let token = CancelToken::new();
        let pacer = RecordingPacer {
            pauses: Vec::new(),
            cancel_after: Some((2, token.clone())),
        };
        let config = SenderConfig {
            chunk_size: 10,
            ..SenderConfig::default()
        };
        let mut sender = ChunkSender::with_pacer(MemoryChannel::new(), pacer, config);
        let plan = sender.plan(&[b'a'; 100], PayloadKind::MenuDocument).unwrap();
        let report = sender.send(&plan, "srv", &token).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.commands_sent, 2);
        assert!(!report.end_marker_sent);
    }

    #[test]
    fn retries_local_send_failures() {
        let mut channel = MemoryChannel::new();
        channel.fail_next(2);
        let config = SenderConfig {
            retry: RetryPolicy::attempts(3, Duration::from_millis(5)),
            ..SenderConfig::default()
        };
        let mut sender = ChunkSender::with_pacer(channel, NoPacer, config);
        let report = sender
            .send_payload(b"hello", PayloadKind::MenuDocument, "srv")
            .unwrap();
        assert_eq!(report.retries, 2);
        assert_eq!(report.commands_sent, 2);
    }

    #[test]
    fn failure_without_retry_is_reported() {
        let mut channel = MemoryChannel::new();
        channel.fail_next(1);
        let mut sender = sender(channel);
        let err = sender
            .send_payload(b"hello", PayloadKind::MenuDocument, "srv")
            .unwrap_err();
        assert!(matches!(err, TransportError::Channel(ChannelError::Io(_))));
    }

    #[test]
    fn plan_respects_channel_limit() {
        let sender = sender(MemoryChannel::with_max_len(40));
        let plan = sender.plan(&[b'a'; 100], PayloadKind::MenuDocument).unwrap();
        assert_eq!(plan.chunk_size(), 36);
        assert!(plan.commands().iter().all(|c| c.len() <= 40));
    }

    #[test]
    fn rejects_invalid_target() {
        let mut sender = sender(MemoryChannel::new());
        assert!(matches!(
            sender.send_payload(b"x", PayloadKind::MenuDocument, "two words"),
            Err(TransportError::Channel(ChannelError::InvalidTarget(_)))
        ));
    }
}
