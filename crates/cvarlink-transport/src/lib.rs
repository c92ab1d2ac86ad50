//! Chunked transport over a length-limited command channel.
//!
//! A payload is percent-escaped and split into chunks of at most 250
//! characters. The first chunk carries a 4-character type header (`#!m!`,
//! `#!f!`, ...), chunks are issued one at a time with a pacing delay, and an
//! optional terminal marker (`#!.!`) closes the transfer.
//!
//! The receiving side keeps one session per sending context in an explicit
//! [`SessionRegistry`], applies each chunk on arrival through a
//! [`TransferSink`], and finalizes transfers according to a configurable
//! [`CompletionPolicy`]. Optional sequenced framing detects duplicated and
//! missing chunks.

pub mod error;
pub mod header;
pub mod kind;
pub mod pacer;
pub mod plan;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod sink;

#[cfg(feature = "async")]
pub mod async_send;

pub use error::{Result, TransportError};
pub use header::{Header, END_MARKER, HEADER_LEN, MAX_CHUNK_LEN};
pub use kind::{Framing, PayloadKind};
pub use pacer::{CancelToken, NoPacer, Pacer, ThreadPacer};
pub use plan::{clamp_chunk_size, reassemble, split_payload, wire_len, TransferPlan};
pub use receiver::{ChunkOutcome, CompletionPolicy, Receiver, ReceiverConfig, DEFAULT_MAX_PAYLOAD};
pub use sender::{
    ChunkSender, RetryPolicy, SendReport, SenderConfig, DEFAULT_CHUNK_SIZE, DEFAULT_PACE,
};
pub use session::{SessionProgress, SessionRegistry, SessionState};
pub use sink::{CompletedTransfer, DirectorySink, DiscardReason, MemorySink, TransferSink};

#[cfg(feature = "async")]
pub use async_send::{spawn_send, SendHandle};
