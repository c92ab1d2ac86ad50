//! Wire codec for transfer commands.
//!
//! Wire format of the first command of a transfer:
//! ```text
//! ┌────────┬──────┬─────────┬────────────┬──────────────────────┐
//! │ "#!"   │ kind │ framing │ seq (4 hex)│ escaped data         │
//! │        │ f/m  │ ! / +   │ if "+"     │ (<= chunk_size chars)│
//! └────────┴──────┴─────────┴────────────┴──────────────────────┘
//! ```
//! Later commands carry only the optional sequence number and data. A
//! transfer may end with the bare [`END_MARKER`]. Escaped data never contains
//! `#`, so any command starting with `#!` is control traffic.

use crate::error::{Result, TransportError};
use crate::kind::{Framing, PayloadKind};

/// Prefix shared by headers and the end marker.
pub const HEADER_PREFIX: &str = "#!";

/// Fixed width of the type header.
pub const HEADER_LEN: usize = 4;

/// Width of a sequence number in sequenced framing.
pub const SEQ_LEN: usize = 4;

/// Terminal marker command.
pub const END_MARKER: &str = "#!.!";

/// Hard ceiling on chunk data length.
pub const MAX_CHUNK_LEN: usize = 250;

/// Type header carried by the first chunk of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    pub kind: PayloadKind,
    pub framing: Framing,
}

impl Header {
    pub fn new(kind: PayloadKind, framing: Framing) -> Self {
        Self { kind, framing }
    }

    /// The 4-character header text.
    pub fn encode(&self) -> String {
        format!("{HEADER_PREFIX}{}{}", self.kind.code(), self.framing.code())
    }
}

/// Characters added to the first chunk on top of its data.
pub fn framing_overhead(framing: Framing) -> usize {
    match framing {
        Framing::Plain => HEADER_LEN,
        Framing::Sequenced => HEADER_LEN + SEQ_LEN,
    }
}

/// A classified incoming command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCommand<'a> {
    /// First chunk of a transfer; `rest` follows the header.
    Start { header: Header, rest: &'a str },
    /// The terminal marker.
    End,
    /// A continuation chunk.
    Data(&'a str),
}

/// Classify a raw command.
pub fn classify(raw: &str) -> Result<WireCommand<'_>> {
    if raw == END_MARKER {
        return Ok(WireCommand::End);
    }
    let Some(rest) = raw.strip_prefix(HEADER_PREFIX) else {
        return Ok(WireCommand::Data(raw));
    };

    let codes = rest.as_bytes();
    let kind = codes
        .first()
        .and_then(|&b| PayloadKind::from_code(char::from(b)));
    let framing = codes.get(1).and_then(|&b| Framing::from_code(char::from(b)));
    match (kind, framing) {
        (Some(kind), Some(framing)) => Ok(WireCommand::Start {
            header: Header::new(kind, framing),
            rest: &rest[2..],
        }),
        _ => Err(TransportError::InvalidHeader(
            raw.chars().take(HEADER_LEN + SEQ_LEN).collect(),
        )),
    }
}

/// Encode a sequence number.
pub fn encode_sequence(seq: u16) -> String {
    format!("{seq:04X}")
}

/// Split a leading sequence number off a sequenced chunk.
pub fn split_sequence(raw: &str) -> Result<(u16, &str)> {
    let malformed = || TransportError::MalformedSequence(raw.chars().take(SEQ_LEN).collect());
    let digits = raw.get(..SEQ_LEN).ok_or_else(malformed)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    let seq = u16::from_str_radix(digits, 16).map_err(|_| malformed())?;
    Ok((seq, &raw[SEQ_LEN..]))
}

/// Build one wire command from its parts.
pub fn encode_chunk(header: Option<Header>, seq: Option<u16>, data: &str) -> String {
    let mut out = String::with_capacity(HEADER_LEN + SEQ_LEN + data.len());
    if let Some(header) = header {
        out.push_str(&header.encode());
    }
    if let Some(seq) = seq {
        out.push_str(&encode_sequence(seq));
    }
    out.push_str(data);
    out
}
