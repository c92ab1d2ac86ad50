//! Destinations for received transfer data.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tracing::info;

use crate::error::Result;
use crate::kind::PayloadKind;

/// A fully received transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransfer {
    /// Sending context the transfer arrived from.
    pub context: String,
    pub kind: PayloadKind,
    /// Reconstructed payload, header stripped.
    pub payload: Bytes,
    /// Data chunks received.
    pub chunks: usize,
    /// Time from header to completion.
    pub elapsed: Duration,
}

/// Why an open transfer was dropped without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A new header arrived for the same context.
    Restarted,
    /// Sequenced framing detected a missing chunk.
    SequenceGap,
    /// The payload grew past the configured maximum.
    TooLarge,
    /// A chunk could not be decoded.
    Malformed,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiscardReason::Restarted => "restarted",
            DiscardReason::SequenceGap => "sequence gap",
            DiscardReason::TooLarge => "too large",
            DiscardReason::Malformed => "malformed chunk",
        })
    }
}

/// Receives transfer events from a [`Receiver`](crate::Receiver).
///
/// Chunk data is handed over on arrival through [`on_data`](Self::on_data);
/// the assembled payload follows in [`on_complete`](Self::on_complete).
pub trait TransferSink {
    /// A header opened a new transfer.
    fn on_start(&mut self, _context: &str, _kind: PayloadKind) -> Result<()> {
        Ok(())
    }

    /// Unescaped data of one chunk, applied immediately.
    fn on_data(&mut self, _context: &str, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    /// A transfer completed.
    fn on_complete(&mut self, transfer: &CompletedTransfer) -> Result<()>;

    /// An open transfer was dropped.
    fn on_discard(&mut self, _context: &str, _reason: DiscardReason) {}
}

impl<S: TransferSink + ?Sized> TransferSink for &mut S {
    fn on_start(&mut self, context: &str, kind: PayloadKind) -> Result<()> {
        (**self).on_start(context, kind)
    }

    fn on_data(&mut self, context: &str, data: &[u8]) -> Result<()> {
        (**self).on_data(context, data)
    }

    fn on_complete(&mut self, transfer: &CompletedTransfer) -> Result<()> {
        (**self).on_complete(transfer)
    }

    fn on_discard(&mut self, context: &str, reason: DiscardReason) {
        (**self).on_discard(context, reason);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Started transfers, in order.
    pub started: Vec<(String, PayloadKind)>,
    /// Bytes applied on arrival, per context.
    pub applied: HashMap<String, Vec<u8>>,
    /// Completed transfers, in order.
    pub completed: Vec<CompletedTransfer>,
    /// Discarded transfers, in order.
    pub discarded: Vec<(String, DiscardReason)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransferSink for MemorySink {
    fn on_start(&mut self, context: &str, kind: PayloadKind) -> Result<()> {
        self.started.push((context.to_string(), kind));
        self.applied.insert(context.to_string(), Vec::new());
        Ok(())
    }

    fn on_data(&mut self, context: &str, data: &[u8]) -> Result<()> {
        self.applied
            .entry(context.to_string())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn on_complete(&mut self, transfer: &CompletedTransfer) -> Result<()> {
        self.completed.push(transfer.clone());
        Ok(())
    }

    fn on_discard(&mut self, context: &str, reason: DiscardReason) {
        self.discarded.push((context.to_string(), reason));
    }
}

/// Writes each completed transfer to `<dir>/<context>-<n>.<ext>`.
///
/// `n` counts completed transfers per context, starting at 1. The extension
/// follows the payload kind (`cfg` or `rfm`).
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    counters: HashMap<String, usize>,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            counters: HashMap::new(),
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl TransferSink for DirectorySink {
    fn on_complete(&mut self, transfer: &CompletedTransfer) -> Result<()> {
        let stem = file_stem(&transfer.context);
        let counter = self.counters.entry(stem.clone()).or_insert(0);
        *counter += 1;
        let path = self
            .dir
            .join(format!("{stem}-{counter}.{}", transfer.kind.extension()));
        std::fs::write(&path, &transfer.payload)?;
        info!(
            context = %transfer.context,
            path = %path.display(),
            bytes = transfer.payload.len(),
            "transfer written"
        );
        self.written.push(path);
        Ok(())
    }
}

/// Context reduced to filename-safe characters.
fn file_stem(context: &str) -> String {
    let stem: String = context
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "transfer".to_string()
    } else {
        stem.to_string()
    }
}
