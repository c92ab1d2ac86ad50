//! Payload kinds and chunk framing modes.
//!
//! Each kind and framing mode has a one-character wire code carried in the
//! transfer header.

use std::fmt;

/// What a transfer carries. Fixed at send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// A console script fragment (`.cfg` text).
    ScriptFragment,
    /// A menu document (`.rfm` markup or its chained records).
    MenuDocument,
}

impl PayloadKind {
    /// All kinds, in code order.
    pub const ALL: [PayloadKind; 2] = [PayloadKind::ScriptFragment, PayloadKind::MenuDocument];

    /// Wire code.
    pub fn code(self) -> char {
        match self {
            PayloadKind::ScriptFragment => 'f',
            PayloadKind::MenuDocument => 'm',
        }
    }

    /// Kind for a wire code.
    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            PayloadKind::ScriptFragment => "script",
            PayloadKind::MenuDocument => "menu",
        }
    }

    /// File extension used when a completed transfer is persisted.
    pub fn extension(self) -> &'static str {
        match self {
            PayloadKind::ScriptFragment => "cfg",
            PayloadKind::MenuDocument => "rfm",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How chunks after the header are framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Framing {
    /// Bare data; ordering is trusted to the channel.
    #[default]
    Plain,
    /// Every chunk carries a 4-hex-digit sequence number.
    Sequenced,
}

impl Framing {
    /// Wire code.
    pub fn code(self) -> char {
        match self {
            Framing::Plain => '!',
            Framing::Sequenced => '+',
        }
    }

    /// Framing for a wire code.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            '!' => Some(Framing::Plain),
            '+' => Some(Framing::Sequenced),
            _ => None,
        }
    }
}
