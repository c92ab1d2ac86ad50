use cvarlink_channel::{escaped_len, MAX_COMMAND_LEN};

use crate::chain::LinkStyle;
use crate::token::DEFAULT_WRAPPER;

/// How a record's size is measured against the length budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordLayout {
    /// Count the characters of the record content itself.
    #[default]
    Bare,
    /// Count the percent-escaped content plus the `set NAME ""` wrapper the
    /// record is stored in, so every generated `.cfg` line fits the console.
    CfgSet,
}

impl RecordLayout {
    /// Measured size of `text`.
    pub fn measure(self, text: &str) -> usize {
        match self {
            RecordLayout::Bare => text.chars().count(),
            RecordLayout::CfgSet => escaped_len(text.as_bytes()),
        }
    }

    /// Measured size of a single character.
    pub fn char_cost(self, c: char) -> usize {
        match self {
            RecordLayout::Bare => 1,
            RecordLayout::CfgSet => {
                let mut buf = [0u8; 4];
                escaped_len(c.encode_utf8(&mut buf).as_bytes())
            }
        }
    }

    /// Fixed per-record overhead for a record named `id`.
    pub fn overhead(self, id: &str) -> usize {
        match self {
            RecordLayout::Bare => 0,
            // set {id} ""
            RecordLayout::CfgSet => 4 + id.len() + 3,
        }
    }
}

/// Configuration for the markup encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Maximum measured record size. Default: 255.
    pub max_len: usize,
    /// How records are measured.
    pub layout: RecordLayout,
    /// Continuation directive syntax.
    pub link: LinkStyle,
    /// Name of the outer wrapper tag to strip. Default: `stm`.
    pub wrapper: String,
}

impl EncoderConfig {
    /// Bare records of at most `max_len` characters.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            ..Self::default()
        }
    }

    /// Records stored as `set NAME "VALUE"` lines of at most `max_line` chars.
    pub fn for_cfg(max_line: usize) -> Self {
        Self {
            max_len: max_line,
            layout: RecordLayout::CfgSet,
            ..Self::default()
        }
    }

    /// Override the continuation directive syntax.
    pub fn with_link(mut self, link: LinkStyle) -> Self {
        self.link = link;
        self
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_len: MAX_COMMAND_LEN,
            layout: RecordLayout::Bare,
            link: LinkStyle::Include,
            wrapper: DEFAULT_WRAPPER.to_string(),
        }
    }
}
