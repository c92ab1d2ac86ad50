//! Splitting payloads into wire chunks.
//!
//! Payload bytes are percent-escaped before splitting, so every chunk is
//! printable single-line text. The escaped stream is cut at any character,
//! which may leave a `%XX` escape divided between two chunks; the receiver
//! carries the unfinished escape over. `#` is escaped as well, which keeps
//! data from ever looking like a header.

use cvarlink_channel::{escape_with, escaped_len_with, Unescaper};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::header::{encode_chunk, framing_overhead, Header, END_MARKER, MAX_CHUNK_LEN};
use crate::kind::{Framing, PayloadKind};
use crate::sender::SenderConfig;

/// Bytes escaped on the wire on top of the channel's own set.
pub(crate) const WIRE_RESERVED: &[u8] = b"#";

/// Escaped wire length of `payload`.
pub fn wire_len(payload: &[u8]) -> usize {
    escaped_len_with(payload, WIRE_RESERVED)
}

/// Effective chunk size for a request.
///
/// Requests above [`MAX_CHUNK_LEN`] are reduced to it, and further to what
/// still fits a `max_command_len` command once the framing overhead of the
/// first chunk is added. Smaller requests pass through unchanged.
pub fn clamp_chunk_size(requested: usize, framing: Framing, max_command_len: usize) -> Result<usize> {
    let ceiling = MAX_CHUNK_LEN.min(max_command_len.saturating_sub(framing_overhead(framing)));
    if requested == 0 || ceiling == 0 {
        return Err(TransportError::InvalidChunkSize(requested));
    }
    Ok(requested.min(ceiling))
}

/// Split a payload into escaped data chunks of at most `chunk_size` chars.
///
/// An empty payload yields no chunks.
pub fn split_payload(payload: &[u8], chunk_size: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(TransportError::InvalidChunkSize(chunk_size));
    }

    let wire = escape_with(payload, WIRE_RESERVED);
    let mut chunks = Vec::with_capacity(wire.len() / chunk_size + 1);
    let mut rest = wire.as_str();
    while !rest.is_empty() {
        // Escaped text is ASCII, so every byte offset is a char boundary.
        let (head, tail) = rest.split_at(chunk_size.min(rest.len()));
        chunks.push(head.to_string());
        rest = tail;
    }
    Ok(chunks)
}

/// Concatenate and unescape data chunks.
pub fn reassemble<S: AsRef<str>>(chunks: &[S]) -> Result<Vec<u8>> {
    let mut decoder = Unescaper::new();
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(decoder.feed(chunk.as_ref())?);
    }
    decoder.finish()?;
    Ok(out)
}

/// A payload split into the exact commands that will be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    kind: PayloadKind,
    framing: Framing,
    chunk_size: usize,
    payload_len: usize,
    data: Vec<String>,
    end_marker: bool,
}

impl TransferPlan {
    /// Plan a transfer of `payload` using the chunking options in `config`.
    pub fn new(payload: &[u8], kind: PayloadKind, config: &SenderConfig) -> Result<Self> {
        let chunk_size = clamp_chunk_size(config.chunk_size, config.framing, config.max_command_len)?;
        if chunk_size != config.chunk_size {
            debug!(
                requested = config.chunk_size,
                effective = chunk_size,
                "chunk size clamped"
            );
        }

        let mut data = split_payload(payload, chunk_size)?;
        if data.is_empty() {
            // The header alone still opens (and with the marker, closes) a session.
            data.push(String::new());
        }

        Ok(Self {
            kind,
            framing: config.framing,
            chunk_size,
            payload_len: payload.len(),
            data,
            end_marker: config.end_marker,
        })
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Effective chunk size after clamping.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Unescaped payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub fn header(&self) -> Header {
        Header::new(self.kind, self.framing)
    }

    /// Escaped data of each chunk, without framing.
    pub fn data_chunks(&self) -> &[String] {
        &self.data
    }

    /// Number of data chunks.
    pub fn chunk_count(&self) -> usize {
        self.data.len()
    }

    pub fn has_end_marker(&self) -> bool {
        self.end_marker
    }

    /// Number of commands including the end marker.
    pub fn command_count(&self) -> usize {
        self.data.len() + usize::from(self.end_marker)
    }

    /// Wire text of command `index`.
    pub fn command(&self, index: usize) -> Option<String> {
        if let Some(data) = self.data.get(index) {
            let header = (index == 0).then(|| self.header());
            let seq = match self.framing {
                Framing::Plain => None,
                Framing::Sequenced => Some(index as u16),
            };
            return Some(encode_chunk(header, seq, data));
        }
        (self.end_marker && index == self.data.len()).then(|| END_MARKER.to_string())
    }

    /// All wire commands, in send order.
    pub fn commands(&self) -> Vec<String> {
        (0..self.command_count())
            .filter_map(|i| self.command(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(chunk_size: usize) -> SenderConfig {
        SenderConfig {
            chunk_size,
            ..SenderConfig::default()
        }
    }

    #[test]
    fn splits_130_bytes_into_64_64_2() {
        let payload = vec![b'x'; 130];
        let plan = TransferPlan::new(&payload, PayloadKind::MenuDocument, &config(64)).unwrap();
        let lens: Vec<_> = plan.data_chunks().iter().map(String::len).collect();
        assert_eq!(lens, vec![64, 64, 2]);

        let commands = plan.commands();
        assert_eq!(commands.len(), 4);
        assert!(commands[0].starts_with("#!m!"));
        assert_eq!(commands[0].len(), 68);
        assert!(!commands[1].starts_with("#!"));
        assert_eq!(commands[3], END_MARKER);
        assert_eq!(reassemble(plan.data_chunks()).unwrap(), payload);
    }

    #[test]
    fn single_byte_payload_is_one_header_chunk() {
        let plan = TransferPlan::new(b"z", PayloadKind::ScriptFragment, &config(64)).unwrap();
        assert_eq!(plan.chunk_count(), 1);
        assert_eq!(plan.command(0).unwrap(), "#!f!z");
    }

    #[test]
    fn empty_payload_still_sends_header() {
        let plan = TransferPlan::new(b"", PayloadKind::MenuDocument, &config(64)).unwrap();
        assert_eq!(plan.commands(), vec!["#!m!".to_string(), END_MARKER.to_string()]);
    }

    #[test]
    fn oversized_request_is_clamped() {
        let payload = vec![b'a'; 2000];
        let plan = TransferPlan::new(&payload, PayloadKind::MenuDocument, &config(9000)).unwrap();
        assert_eq!(plan.chunk_size(), MAX_CHUNK_LEN);
        assert!(plan.data_chunks().iter().all(|c| c.len() <= MAX_CHUNK_LEN));
        assert!(plan.commands().iter().all(|c| c.len() <= 255));
    }

    #[test]
    fn sequenced_framing_leaves_room_for_sequence() {
        let cfg = SenderConfig {
            chunk_size: 9000,
            framing: Framing::Sequenced,
            ..SenderConfig::default()
        };
        let plan = TransferPlan::new(&[b'a'; 600], PayloadKind::MenuDocument, &cfg).unwrap();
        assert_eq!(plan.chunk_size(), 247);
        assert_eq!(plan.command(0).unwrap()[..8].to_string(), "#!m+0000");
        assert_eq!(plan.command(1).unwrap()[..4].to_string(), "0001");
        assert!(plan.commands().iter().all(|c| c.len() <= 255));
    }

    #[test]
    fn small_requests_pass_through() {
        assert_eq!(clamp_chunk_size(1, Framing::Plain, 255).unwrap(), 1);
        assert_eq!(clamp_chunk_size(250, Framing::Plain, 255).unwrap(), 250);
        assert!(matches!(
            clamp_chunk_size(0, Framing::Plain, 255),
            Err(TransportError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn escapes_may_straddle_chunks() {
        let chunks = split_payload(b"a\"b%c#d\n", 4).unwrap();
        assert_eq!(chunks, vec!["a%22", "b%25", "c%23", "d%0A"]);

        let chunks = split_payload(b"say \"hi\"", 2).unwrap();
        assert_eq!(chunks, vec!["sa", "y ", "%2", "2h", "i%", "22"]);
        assert_eq!(reassemble(&chunks).unwrap(), b"say \"hi\"");
    }

    #[test]
    fn single_char_chunks_carry_any_payload() {
        for payload in ["say \"hi\"", "h\u{e9}llo", "50%", "#tag"] {
            let chunks = split_payload(payload.as_bytes(), 1).unwrap();
            assert!(chunks.iter().all(|c| c.len() == 1 && c != "#"));
            assert_eq!(reassemble(&chunks).unwrap(), payload.as_bytes());
        }
        let plan = TransferPlan::new(b"\"", PayloadKind::MenuDocument, &config(1)).unwrap();
        assert_eq!(
            plan.commands(),
            vec!["#!m!%", "2", "2", END_MARKER]
        );
    }

    #[test]
    fn reassemble_rejects_truncated_escape() {
        assert!(matches!(
            reassemble(&["ab", "%2"]),
            Err(TransportError::Channel(_))
        ));
    }

    #[test]
    fn no_end_marker_when_disabled() {
        let cfg = SenderConfig {
            end_marker: false,
            ..SenderConfig::default()
        };
        let plan = TransferPlan::new(b"abc", PayloadKind::MenuDocument, &cfg).unwrap();
        assert_eq!(plan.commands(), vec!["#!m!abc".to_string()]);
    }

    proptest! {
        #[test]
        fn split_then_reassemble_is_identity(
            payload in prop::collection::vec(any::<u8>(), 0..2048),
            n in 1usize..=250,
        ) {
            let chunks = split_payload(&payload, n).unwrap();
            prop_assert!(chunks.iter().all(|c| c.len() <= n && !c.contains('#')));
            prop_assert_eq!(reassemble(&chunks).unwrap(), payload);
        }

        #[test]
        fn plain_text_splits_at_any_size(
            payload in "[a-zA-Z0-9 .,:;<>/=!?]{0,1024}",
            n in 1usize..=250,
        ) {
            let chunks = split_payload(payload.as_bytes(), n).unwrap();
            prop_assert!(chunks.iter().all(|c| c.len() <= n));
            prop_assert_eq!(reassemble(&chunks).unwrap(), payload.into_bytes());
        }
    }
}
