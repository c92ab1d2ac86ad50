use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::header::{classify, split_sequence, Header, WireCommand};
use crate::kind::{Framing, PayloadKind};
use crate::session::{Session, SessionRegistry};
use crate::sink::{CompletedTransfer, DiscardReason, TransferSink};

/// Default maximum accumulated payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// When an open transfer counts as complete.
///
/// The terminal marker finalizes a transfer under every policy; the policy
/// adds the condition used when the sender does not send one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Only the terminal marker completes a transfer.
    #[default]
    TerminalMarker,
    /// Complete once this many payload bytes have arrived.
    ExpectedLength(usize),
    /// Complete transfers idle for this long, via [`Receiver::reap_idle`].
    IdleTimeout(Duration),
}

/// Configuration for the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub completion: CompletionPolicy,
    /// Maximum accumulated payload per transfer. Default: 16 MiB.
    pub max_payload: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            completion: CompletionPolicy::default(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// What happened to one incoming command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// A header opened a new transfer.
    Started { kind: PayloadKind },
    /// Data was appended to an open transfer.
    Appended { bytes: usize },
    /// A sequenced chunk that was already received; ignored.
    Duplicate,
    /// No open transfer for this context; ignored.
    Dropped,
    /// The transfer completed.
    Finalized(CompletedTransfer),
}

enum Step {
    Appended(Vec<u8>),
    Duplicate,
}

/// Reassembles transfers from incoming commands.
///
/// Session state lives in a [`SessionRegistry`] passed into every call, so
/// one receiver can serve any number of sending contexts.
pub struct Receiver<S> {
    sink: S,
    config: ReceiverConfig,
}

impl<S: TransferSink> Receiver<S> {
    pub fn new(sink: S, config: ReceiverConfig) -> Self {
        Self { sink, config }
    }

    /// Handle one command from `context` received at `now`.
    ///
    /// Decoding failures, sequence gaps and oversized payloads discard the
    /// open transfer of that context and are returned as errors.
    pub fn on_chunk_received(
        &mut self,
        registry: &mut SessionRegistry,
        context: &str,
        raw: &str,
        now: Instant,
    ) -> Result<ChunkOutcome> {
        match classify(raw)? {
            WireCommand::Start { header, rest } => self.start(registry, context, header, rest, now),
            WireCommand::Data(data) => self.data(registry, context, data, now),
            WireCommand::End => match self.finalize(registry, context, now)? {
                Some(transfer) => Ok(ChunkOutcome::Finalized(transfer)),
                None => {
                    warn!(context, "end marker without open transfer, dropped");
                    Ok(ChunkOutcome::Dropped)
                }
            },
        }
    }

    fn start(
        &mut self,
        registry: &mut SessionRegistry,
        context: &str,
        header: Header,
        rest: &str,
        now: Instant,
    ) -> Result<ChunkOutcome> {
        let session = Session::new(header.kind, header.framing, now);
        if let Some(previous) = registry.open(context, session) {
            warn!(
                context,
                discarded_bytes = previous.buf.len(),
                discarded_chunks = previous.chunks,
                "new header during transfer, previous transfer discarded"
            );
            self.sink.on_discard(context, DiscardReason::Restarted);
        }
        info!(context, kind = %header.kind, framing = ?header.framing, "transfer started");
        self.sink.on_start(context, header.kind)?;

        self.apply(registry, context, rest, now)?;
        match self.complete_if_due(registry, context, now)? {
            Some(transfer) => Ok(ChunkOutcome::Finalized(transfer)),
            None => Ok(ChunkOutcome::Started { kind: header.kind }),
        }
    }

    fn data(
        &mut self,
        registry: &mut SessionRegistry,
        context: &str,
        data: &str,
        now: Instant,
    ) -> Result<ChunkOutcome> {
        match self.apply(registry, context, data, now)? {
            None => {
                warn!(context, len = data.len(), "chunk without open transfer, dropped");
                Ok(ChunkOutcome::Dropped)
            }
            Some(Step::Duplicate) => Ok(ChunkOutcome::Duplicate),
            Some(Step::Appended(bytes)) => match self.complete_if_due(registry, context, now)? {
                Some(transfer) => Ok(ChunkOutcome::Finalized(transfer)),
                None => Ok(ChunkOutcome::Appended { bytes: bytes.len() }),
            },
        }
    }

    /// Absorb one chunk into the open session and apply its data.
    fn apply(
        &mut self,
        registry: &mut SessionRegistry,
        context: &str,
        data: &str,
        now: Instant,
    ) -> Result<Option<Step>> {
        let Some(session) = registry.session_mut(context) else {
            return Ok(None);
        };
        match absorb(session, data, self.config.max_payload, now) {
            Ok(Step::Appended(bytes)) => {
                if !bytes.is_empty() {
                    self.sink.on_data(context, &bytes)?;
                }
                Ok(Some(Step::Appended(bytes)))
            }
            Ok(Step::Duplicate) => {
                debug!(context, "duplicate chunk ignored");
                Ok(Some(Step::Duplicate))
            }
            Err((reason, err)) => {
                self.discard(registry, context, reason);
                Err(err)
            }
        }
    }

    fn complete_if_due(
        &mut self,
        registry: &mut SessionRegistry,
        context: &str,
        now: Instant,
    ) -> Result<Option<CompletedTransfer>> {
        match (self.config.completion, registry.buffered(context)) {
            (CompletionPolicy::ExpectedLength(expected), Some(bytes)) if bytes >= expected => {
                self.finalize(registry, context, now)
            }
            _ => Ok(None),
        }
    }

    /// Finalize the open transfer of `context`, if any.
    ///
    /// Used internally by every completion policy, and directly by callers
    /// that learn about completion out of band. The context is marked
    /// finalized only once the sink has accepted the transfer; if the sink
    /// fails, the session stays open and finalizing can be retried. A
    /// transfer that ends inside an escape sequence is discarded.
    pub fn finalize(
        &mut self,
        registry: &mut SessionRegistry,
        context: &str,
        now: Instant,
    ) -> Result<Option<CompletedTransfer>> {
        let truncated = registry
            .session_mut(context)
            .map(|session| session.decoder.finish());
        if let Some(Err(err)) = truncated {
            self.discard(registry, context, DiscardReason::Malformed);
            return Err(err.into());
        }

        let Some(mut session) = registry.finish(context, now) else {
            return Ok(None);
        };
        let transfer = CompletedTransfer {
            context: context.to_string(),
            kind: session.kind,
            payload: std::mem::take(&mut session.buf).freeze(),
            chunks: session.chunks,
            elapsed: now.saturating_duration_since(session.started),
        };
        if let Err(err) = self.sink.on_complete(&transfer) {
            warn!(context, error = %err, "sink rejected transfer, session kept open");
            session.buf = BytesMut::from(transfer.payload.as_ref());
            registry.restore(context, session);
            return Err(err);
        }
        info!(
            context,
            kind = %transfer.kind,
            bytes = transfer.payload.len(),
            chunks = transfer.chunks,
            "transfer complete"
        );
        Ok(Some(transfer))
    }

    /// Finalize transfers idle past the [`CompletionPolicy::IdleTimeout`].
    ///
    /// Does nothing under other policies.
    pub fn reap_idle(
        &mut self,
        registry: &mut SessionRegistry,
        now: Instant,
    ) -> Result<Vec<CompletedTransfer>> {
        match self.config.completion {
            CompletionPolicy::IdleTimeout(timeout) => self.reap_idle_after(registry, timeout, now),
            _ => Ok(Vec::new()),
        }
    }

    /// Finalize transfers idle for at least `timeout`, whatever the policy.
    pub fn reap_idle_after(
        &mut self,
        registry: &mut SessionRegistry,
        timeout: Duration,
        now: Instant,
    ) -> Result<Vec<CompletedTransfer>> {
        let mut completed = Vec::new();
        for context in registry.idle_contexts(timeout, now) {
            if let Some(transfer) = self.finalize(registry, &context, now)? {
                completed.push(transfer);
            }
        }
        Ok(completed)
    }

    fn discard(&mut self, registry: &mut SessionRegistry, context: &str, reason: DiscardReason) {
        if let Some(session) = registry.discard(context) {
            warn!(
                context,
                %reason,
                discarded_bytes = session.buf.len(),
                "transfer discarded"
            );
            self.sink.on_discard(context, reason);
        }
    }

    /// Current receiver configuration.
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the receiver and return the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

fn absorb(
    session: &mut Session,
    data: &str,
    max_payload: usize,
    now: Instant,
) -> std::result::Result<Step, (DiscardReason, TransportError)> {
    let data = match session.framing {
        Framing::Plain => data,
        Framing::Sequenced => {
            let (seq, rest) = split_sequence(data).map_err(|e| (DiscardReason::Malformed, e))?;
            if seq != session.next_seq {
                let behind = session.next_seq.wrapping_sub(seq);
                if behind <= u16::MAX / 2 {
                    return Ok(Step::Duplicate);
                }
                return Err((
                    DiscardReason::SequenceGap,
                    TransportError::SequenceGap {
                        expected: session.next_seq,
                        found: seq,
                    },
                ));
            }
            session.next_seq = session.next_seq.wrapping_add(1);
            rest
        }
    };

    let bytes = session
        .decoder
        .feed(data)
        .map_err(|e| (DiscardReason::Malformed, e.into()))?;
    let size = session.buf.len() + bytes.len();
    if size > max_payload {
        return Err((
            DiscardReason::TooLarge,
            TransportError::PayloadTooLarge {
                size,
                max: max_payload,
            },
        ));
    }
    session.buf.extend_from_slice(&bytes);
    session.chunks += 1;
    session.last_activity = now;
    Ok(Step::Appended(bytes))
}
