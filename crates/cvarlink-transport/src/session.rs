//! Receiver-side session state, keyed by sending context.
//!
//! The registry is plain data owned by the caller and passed into every
//! receiver call. Sessions of different contexts never interact.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use cvarlink_channel::Unescaper;

use crate::kind::{Framing, PayloadKind};

/// Open accumulation state for one transfer.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) kind: PayloadKind,
    pub(crate) framing: Framing,
    pub(crate) buf: BytesMut,
    /// Holds an escape sequence cut off at the end of the last chunk.
    pub(crate) decoder: Unescaper,
    pub(crate) chunks: usize,
    pub(crate) next_seq: u16,
    pub(crate) started: Instant,
    pub(crate) last_activity: Instant,
}

impl Session {
    pub(crate) fn new(kind: PayloadKind, framing: Framing, now: Instant) -> Self {
        Self {
            kind,
            framing,
            buf: BytesMut::new(),
            decoder: Unescaper::new(),
            chunks: 0,
            next_seq: 0,
            started: now,
            last_activity: now,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Slot {
    Receiving(Session),
    Finalized {
        kind: PayloadKind,
        bytes: usize,
        chunks: usize,
        at: Instant,
    },
}

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A transfer is being accumulated.
    Receiving,
    /// The last transfer completed; the next header starts a new one.
    Finalized,
}

/// Progress snapshot of one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub context: String,
    pub state: SessionState,
    pub kind: PayloadKind,
    /// Payload bytes accumulated (or delivered, once finalized).
    pub bytes: usize,
    /// Data chunks received.
    pub chunks: usize,
    /// Time since the last chunk (or since finalization).
    pub idle: Duration,
}

/// Session state for every sending context seen so far.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: HashMap<String, Slot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress of `context`, if it has been seen.
    pub fn progress(&self, context: &str, now: Instant) -> Option<SessionProgress> {
        self.slots
            .get(context)
            .map(|slot| snapshot(context, slot, now))
    }

    /// Progress of every known context, sorted by context.
    pub fn iter_progress(&self, now: Instant) -> Vec<SessionProgress> {
        let mut all: Vec<_> = self
            .slots
            .iter()
            .map(|(context, slot)| snapshot(context, slot, now))
            .collect();
        all.sort_by(|a, b| a.context.cmp(&b.context));
        all
    }

    /// Whether `context` has an open transfer.
    pub fn is_receiving(&self, context: &str) -> bool {
        matches!(self.slots.get(context), Some(Slot::Receiving(_)))
    }

    /// Number of open transfers.
    pub fn open_sessions(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Receiving(_)))
            .count()
    }

    /// Forget `context` entirely. Returns whether it was known.
    pub fn remove(&mut self, context: &str) -> bool {
        self.slots.remove(context).is_some()
    }

    /// Forget every finalized context.
    pub fn clear_finalized(&mut self) {
        self.slots
            .retain(|_, slot| matches!(slot, Slot::Receiving(_)));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn open(&mut self, context: &str, session: Session) -> Option<Session> {
        match self.slots.insert(context.to_string(), Slot::Receiving(session)) {
            Some(Slot::Receiving(previous)) => Some(previous),
            _ => None,
        }
    }

    /// Bytes accumulated by the open session of `context`.
    pub(crate) fn buffered(&self, context: &str) -> Option<usize> {
        match self.slots.get(context) {
            Some(Slot::Receiving(session)) => Some(session.buf.len()),
            _ => None,
        }
    }

    pub(crate) fn session_mut(&mut self, context: &str) -> Option<&mut Session> {
        match self.slots.get_mut(context) {
            Some(Slot::Receiving(session)) => Some(session),
            _ => None,
        }
    }

    /// Close the open session of `context`, leaving a finalized marker.
    pub(crate) fn finish(&mut self, context: &str, now: Instant) -> Option<Session> {
        let slot = self.slots.get_mut(context)?;
        let Slot::Receiving(session) = slot else {
            return None;
        };
        let marker = Slot::Finalized {
            kind: session.kind,
            bytes: session.buf.len(),
            chunks: session.chunks,
            at: now,
        };
        match std::mem::replace(slot, marker) {
            Slot::Receiving(session) => Some(session),
            Slot::Finalized { .. } => None,
        }
    }

    /// Put back a session taken by [`finish`](Self::finish), reopening `context`.
    pub(crate) fn restore(&mut self, context: &str, session: Session) {
        self.slots
            .insert(context.to_string(), Slot::Receiving(session));
    }

    /// Drop the open session of `context` without finalizing it.
    pub(crate) fn discard(&mut self, context: &str) -> Option<Session> {
        if !self.is_receiving(context) {
            return None;
        }
        match self.slots.remove(context) {
            Some(Slot::Receiving(session)) => Some(session),
            _ => None,
        }
    }

    /// Contexts whose open session has been idle for at least `timeout`.
    pub(crate) fn idle_contexts(&self, timeout: Duration, now: Instant) -> Vec<String> {
        let mut idle: Vec<_> = self
            .slots
            .iter()
            .filter_map(|(context, slot)| match slot {
                Slot::Receiving(session)
                    if now.saturating_duration_since(session.last_activity) >= timeout =>
                {
                    Some(context.clone())
                }
                _ => None,
            })
            .collect();
        idle.sort();
        idle
    }
}

fn snapshot(context: &str, slot: &Slot, now: Instant) -> SessionProgress {
    match slot {
        Slot::Receiving(session) => SessionProgress {
            context: context.to_string(),
            state: SessionState::Receiving,
            kind: session.kind,
            bytes: session.buf.len(),
            chunks: session.chunks,
            idle: now.saturating_duration_since(session.last_activity),
        },
        Slot::Finalized {
            kind,
            bytes,
            chunks,
            at,
        } => SessionProgress {
            context: context.to_string(),
            state: SessionState::Finalized,
            kind: *kind,
            bytes: *bytes,
            chunks: *chunks,
            idle: now.saturating_duration_since(*at),
        },
    }
}
