//! Greedy packing of a token stream into a chain of bounded records.
//!
//! Tags are atomic and placed whole into exactly one record. Text is split at
//! character boundaries wherever the current record fills up. Each record
//! reserves room for the directive naming its successor, so closing a record
//! never pushes it over the bound.

use tracing::debug;

use crate::chain::{Chain, Record};
use crate::config::{EncoderConfig, RecordLayout};
use crate::error::{preview, EncodeError, Result};
use crate::naming::ChainNaming;
use crate::token::{strip_wrapper, tokenize, Token};

/// Encode a markup document into a chain.
///
/// The outer wrapper tag named by `config.wrapper` is discarded first. An
/// empty document yields an empty chain. On failure no partial chain is
/// returned.
///
/// Every record reserves room for the link to its successor. The default
/// [`LinkStyle::Include`](crate::LinkStyle::Include) costs 17 characters for
/// `<includecvar c_1>`, so a very small `max_len` such as 20 leaves no room
/// for a tag and fails with [`EncodeError::TagTooLong`]. Pair small bounds
/// with a short `LinkStyle::Custom` through [`EncoderConfig::with_link`].
pub fn encode(document: &str, naming: &ChainNaming, config: &EncoderConfig) -> Result<Chain> {
    let tokens = strip_wrapper(tokenize(document)?, &config.wrapper);
    let chain = encode_tokens(&tokens, naming, config)?;
    debug!(
        base = %naming.base,
        records = chain.len(),
        max_len = config.max_len,
        "document encoded"
    );
    Ok(chain)
}

/// Pack an already tokenized stream into a chain.
pub fn encode_tokens(
    tokens: &[Token<'_>],
    naming: &ChainNaming,
    config: &EncoderConfig,
) -> Result<Chain> {
    if tokens.iter().all(|t| t.as_str().is_empty()) {
        return Ok(Chain::default());
    }

    let mut packer = Packer::new(naming, config)?;
    for token in tokens {
        match *token {
            Token::Tag(raw) => packer.push_tag(raw)?,
            Token::Text(text) => packer.push_text(text)?,
        }
    }
    Ok(packer.finish())
}

struct Packer<'a> {
    naming: &'a ChainNaming,
    config: &'a EncoderConfig,
    records: Vec<Record>,
    body: String,
    used: usize,
    capacity: usize,
}

impl<'a> Packer<'a> {
    fn new(naming: &'a ChainNaming, config: &'a EncoderConfig) -> Result<Self> {
        let capacity = capacity_for(naming, config, 0)?;
        Ok(Self {
            naming,
            config,
            records: Vec::new(),
            body: String::new(),
            used: 0,
            capacity,
        })
    }

    fn layout(&self) -> RecordLayout {
        self.config.layout
    }

    fn index(&self) -> usize {
        self.records.len()
    }

    fn push_tag(&mut self, tag: &str) -> Result<()> {
        let cost = self.layout().measure(tag);
        if self.used + cost > self.capacity && !self.body.is_empty() {
            self.close()?;
        }
        if self.used + cost > self.capacity {
            return Err(EncodeError::TagTooLong {
                preview: preview(tag),
                len: cost,
                capacity: self.capacity,
            });
        }
        self.body.push_str(tag);
        self.used += cost;
        Ok(())
    }

    fn push_text(&mut self, mut text: &str) -> Result<()> {
        while !text.is_empty() {
            let (split, cost) = fit_prefix(text, self.capacity - self.used, self.layout());
            if split == 0 {
                if self.body.is_empty() {
                    return Err(self.no_capacity());
                }
                self.close()?;
                continue;
            }
            self.body.push_str(&text[..split]);
            self.used += cost;
            text = &text[split..];
        }
        Ok(())
    }

    /// Close the current record with a link to the next one.
    fn close(&mut self) -> Result<()> {
        let index = self.index();
        let body = std::mem::take(&mut self.body);
        self.records.push(Record::linked(
            self.naming.id(index),
            body,
            self.config.link,
            self.naming.id(index + 1),
        ));
        self.used = 0;
        self.capacity = capacity_for(self.naming, self.config, index + 1)?;
        Ok(())
    }

    fn no_capacity(&self) -> EncodeError {
        EncodeError::NoCapacity {
            record: self.naming.id(self.index()),
            max_len: self.config.max_len,
            overhead: self.config.max_len - self.capacity,
        }
    }

    fn finish(mut self) -> Chain {
        if !self.body.is_empty() {
            let id = self.naming.id(self.index());
            self.records.push(Record::terminal(id, self.body));
        }
        Chain::new(self.records)
    }
}

/// Content capacity of record `index` once its overhead and the directive to
/// record `index + 1` are reserved.
fn capacity_for(naming: &ChainNaming, config: &EncoderConfig, index: usize) -> Result<usize> {
    let layout = config.layout;
    let overhead = layout.overhead(&naming.id(index))
        + layout.measure(&config.link.directive(&naming.id(index + 1)));
    match config.max_len.checked_sub(overhead) {
        Some(capacity) if capacity > 0 => Ok(capacity),
        _ => Err(EncodeError::NoCapacity {
            record: naming.id(index),
            max_len: config.max_len,
            overhead,
        }),
    }
}

/// Longest prefix of `text` measuring at most `room`, as `(byte_len, cost)`.
fn fit_prefix(text: &str, room: usize, layout: RecordLayout) -> (usize, usize) {
    let mut cost = 0;
    for (at, c) in text.char_indices() {
        let next = layout.char_cost(c);
        if cost + next > room {
            return (at, cost);
        }
        cost += next;
    }
    (text.len(), cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::LinkStyle;
    use proptest::prelude::*;

    const COMPACT: LinkStyle = LinkStyle::Custom {
        prefix: "<+",
        suffix: ">",
    };

    fn naming() -> ChainNaming {
        ChainNaming::new("c").unwrap()
    }

    #[test]
    fn short_document_is_single_terminal_record() {
        let chain = encode("<stm><text>Hi</text></stm>", &naming(), &EncoderConfig::default())
            .unwrap();
        assert_eq!(chain.len(), 1);
        let record = &chain.records()[0];
        assert_eq!(record.id(), "c_0");
        assert_eq!(record.content(), "<text>Hi</text>");
        assert!(record.is_terminal());
    }

    #[test]
    fn hello_world_at_twenty_chars() {
        let document = "<stm><text>Hello world this is a test</text></stm>";
        let config = EncoderConfig::new(20).with_link(COMPACT);
        let chain = encode(document, &naming(), &config).unwrap();

        assert!(chain.len() > 1);
        for record in chain.records() {
            assert!(record.content().chars().count() <= 20, "{record:?}");
        }
        let last = chain.records().len() - 1;
        for (i, record) in chain.records().iter().enumerate() {
            if i == last {
                assert!(record.is_terminal());
            } else {
                let directive = COMPACT.directive(&naming().id(i + 1));
                assert!(record.content().ends_with(&directive));
            }
        }
        let holders = |tag: &str| {
            chain
                .records()
                .iter()
                .filter(|r| r.body().contains(tag))
                .count()
        };
        assert_eq!(holders("<text>"), 1);
        assert_eq!(holders("</text>"), 1);
        assert_eq!(
            chain.reassemble().unwrap(),
            "<text>Hello world this is a test</text>"
        );
        chain.verify(20, RecordLayout::Bare).unwrap();
    }

    #[test]
    fn default_link_leaves_no_room_at_twenty_chars() {
        let document = "<stm><text>Hello world this is a test</text></stm>";
        let err = encode(document, &naming(), &EncoderConfig::new(20)).unwrap_err();
        match err {
            EncodeError::TagTooLong { len, capacity, .. } => {
                assert_eq!(len, 6);
                assert_eq!(capacity, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn tag_is_moved_whole_to_next_record() {
        let config = EncoderConfig::new(30);
        // capacity per record: 30 - len("<includecvar c_1>") = 13
        let chain = encode("0123456789<abcdef>", &naming(), &config).unwrap();
        assert_eq!(chain.records()[0].body(), "0123456789");
        assert_eq!(chain.records()[1].body(), "<abcdef>");
    }

    #[test]
    fn oversized_tag_fails_without_partial_chain() {
        let config = EncoderConfig::new(30);
        let err = encode("ok <a-very-long-tag-name>", &naming(), &config).unwrap_err();
        match err {
            EncodeError::TagTooLong { len, capacity, .. } => {
                assert_eq!(len, 22);
                assert_eq!(capacity, 13);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unterminated_tag_fails() {
        assert!(matches!(
            encode("<text>hi</text", &naming(), &EncoderConfig::default()),
            Err(EncodeError::UnterminatedTag { .. })
        ));
    }

    #[test]
    fn empty_document_yields_empty_chain() {
        let chain = encode("<stm></stm>", &naming(), &EncoderConfig::new(1)).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn no_room_beside_directive() {
        let err = encode("text", &naming(), &EncoderConfig::new(17)).unwrap_err();
        assert!(matches!(err, EncodeError::NoCapacity { overhead: 17, .. }));
    }

    #[test]
    fn escaped_layout_never_splits_escapes() {
        let config = EncoderConfig::for_cfg(40);
        let document = "\"quoted\" 100% ünïcode\nline two";
        let chain = encode(document, &naming(), &config).unwrap();
        chain.verify(40, RecordLayout::CfgSet).unwrap();
        assert_eq!(chain.reassemble().unwrap(), document);
    }

    #[test]
    fn numbering_follows_policy() {
        let naming = ChainNaming::new("m").unwrap().with_bare_first(true);
        let chain = encode("abcdefghij", &naming, &EncoderConfig::new(20)).unwrap();
        let ids: Vec<_> = chain.records().iter().map(|r| r.id()).collect();
        assert_eq!(ids[0], "m");
        assert_eq!(ids[1], "m_1");
        assert_eq!(chain.records()[0].next(), Some("m_1"));
    }

    /// Config whose wrapper name never matches generated tags.
    fn unwrapped(max_len: usize) -> EncoderConfig {
        EncoderConfig {
            wrapper: "wrap0".to_string(),
            ..EncoderConfig::new(max_len)
        }
    }

    fn document() -> impl Strategy<Value = String> {
        let piece = prop_oneof![
            "[a-zA-Z0-9 .,!?]{1,30}",
            "<[a-z]{1,8}( [a-z0-9=]{1,10})?>",
            "</[a-z]{1,8}>",
        ];
        prop::collection::vec(piece, 0..40).prop_map(|pieces| pieces.concat())
    }

    proptest! {
        #[test]
        fn records_are_bounded_and_reassemble(doc in document(), max_len in 40usize..300) {
            let chain = encode(&doc, &naming(), &unwrapped(max_len)).unwrap();
            for record in chain.records() {
                prop_assert!(record.content().chars().count() <= max_len);
            }
            chain.verify(max_len, RecordLayout::Bare).unwrap();
            prop_assert_eq!(chain.reassemble().unwrap(), doc);
        }

        #[test]
        fn tags_land_whole_in_one_record(doc in document(), max_len in 40usize..120) {
            let chain = encode(&doc, &naming(), &unwrapped(max_len)).unwrap();
            let tags: usize = tokenize(&doc).unwrap().iter().filter(|t| t.is_tag()).count();
            let placed: usize = chain
                .records()
                .iter()
                .map(|r| tokenize(r.body()).unwrap().iter().filter(|t| t.is_tag()).count())
                .sum();
            prop_assert_eq!(tags, placed);
        }

        #[test]
        fn oversized_tag_is_rejected(prefix in "[a-z ]{0,50}", name in "[a-z]{30,60}") {
            let doc = format!("{prefix}<{name}>");
            let result = encode(&doc, &naming(), &EncoderConfig::new(40));
            prop_assert!(
                matches!(result, Err(EncodeError::TagTooLong { .. })),
                "unexpected result: {:?}",
                result
            );
        }
    }
}
