//! Chains of bounded records linked by continuation directives.

use std::collections::{HashMap, HashSet};

use crate::config::RecordLayout;
use crate::error::{EncodeError, Result};
use crate::naming::validate_name;

/// Syntax of the continuation directive appended to non-terminal records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStyle {
    /// Menu include tag: `<includecvar NEXT>`.
    #[default]
    Include,
    /// Script execution: `; sp_sc_exec_cvar NEXT`. Record bodies are
    /// rejoined with `; `.
    Exec,
    /// Arbitrary `{prefix}NEXT{suffix}` directive.
    Custom {
        prefix: &'static str,
        suffix: &'static str,
    },
}

const INCLUDE_PREFIX: &str = "<includecvar ";
const INCLUDE_SUFFIX: &str = ">";
const EXEC_PREFIX: &str = "; sp_sc_exec_cvar ";

impl LinkStyle {
    fn parts(self) -> (&'static str, &'static str) {
        match self {
            LinkStyle::Include => (INCLUDE_PREFIX, INCLUDE_SUFFIX),
            LinkStyle::Exec => (EXEC_PREFIX, ""),
            LinkStyle::Custom { prefix, suffix } => (prefix, suffix),
        }
    }

    /// Directive naming `next`.
    pub fn directive(self, next: &str) -> String {
        let (prefix, suffix) = self.parts();
        format!("{prefix}{next}{suffix}")
    }

    /// Text that replaces a directive when bodies are rejoined.
    pub fn joiner(self) -> &'static str {
        match self {
            LinkStyle::Exec => "; ",
            LinkStyle::Include | LinkStyle::Custom { .. } => "",
        }
    }

    /// Split trailing directive off `content`, yielding `(body, next)`.
    pub fn split(self, content: &str) -> Option<(&str, &str)> {
        let (prefix, suffix) = self.parts();
        let rest = content.strip_suffix(suffix)?;
        let at = rest.rfind(prefix)?;
        let next = &rest[at + prefix.len()..];
        validate_name(next).ok()?;
        Some((&rest[..at], next))
    }
}

/// One bounded record of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    id: String,
    content: String,
    body_len: usize,
    link: Option<(LinkStyle, String)>,
}

impl Record {
    /// Terminal record: content is the body, no directive.
    pub fn terminal(id: impl Into<String>, body: impl Into<String>) -> Self {
        let content = body.into();
        Self {
            id: id.into(),
            body_len: content.len(),
            content,
            link: None,
        }
    }

    /// Record whose content is `body` followed by the directive naming `next`.
    pub fn linked(
        id: impl Into<String>,
        body: impl Into<String>,
        style: LinkStyle,
        next: impl Into<String>,
    ) -> Self {
        let mut content = body.into();
        let body_len = content.len();
        let next = next.into();
        content.push_str(&style.directive(&next));
        Self {
            id: id.into(),
            content,
            body_len,
            link: Some((style, next)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full record text, directive included.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Record text without the directive.
    pub fn body(&self) -> &str {
        &self.content[..self.body_len]
    }

    /// Identifier of the next record, if this record is not terminal.
    pub fn next(&self) -> Option<&str> {
        self.link.as_ref().map(|(_, next)| next.as_str())
    }

    pub fn link_style(&self) -> Option<LinkStyle> {
        self.link.as_ref().map(|(style, _)| *style)
    }

    pub fn is_terminal(&self) -> bool {
        self.link.is_none()
    }
}

/// Ordered chain of records produced from one document.
///
/// The first record is the entry point. Following directives from it visits
/// every record once and ends at the terminal record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    records: Vec<Record>,
}

impl Chain {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Rebuild a chain from stored `(id, content)` pairs.
    ///
    /// A trailing directive is treated as a link only when it names another
    /// record of the same set; otherwise the content is kept as body.
    pub fn from_stored(entries: Vec<(String, String)>) -> Self {
        let ids: HashSet<&str> = entries.iter().map(|(id, _)| id.as_str()).collect();
        let records = entries
            .iter()
            .map(|(id, content)| {
                let link = [LinkStyle::Include, LinkStyle::Exec]
                    .into_iter()
                    .find_map(|style| {
                        style
                            .split(content)
                            .filter(|(_, next)| *next != id.as_str() && ids.contains(next))
                            .map(|(body, next)| (style, body, next))
                    });
                match link {
                    Some((style, body, next)) => Record::linked(id, body, style, next),
                    None => Record::terminal(id, content.as_str()),
                }
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// The first record.
    pub fn entry(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Check record bounds and link structure.
    pub fn verify(&self, max_len: usize, layout: RecordLayout) -> Result<()> {
        for record in &self.records {
            let len = layout.measure(&record.content) + layout.overhead(&record.id);
            if len > max_len {
                return Err(EncodeError::BrokenChain(format!(
                    "record {} measures {len}, max {max_len}",
                    record.id
                )));
            }
        }

        self.walk().map(|_| ())
    }

    /// Concatenate record bodies in link order, restoring the original text.
    pub fn reassemble(&self) -> Result<String> {
        let mut out = String::new();
        for record in self.walk()? {
            out.push_str(record.body());
            if let Some(style) = record.link_style() {
                out.push_str(style.joiner());
            }
        }
        Ok(out)
    }

    /// Records in link order from the entry point.
    fn walk(&self) -> Result<Vec<&Record>> {
        let Some(entry) = self.entry() else {
            return Ok(Vec::new());
        };

        let mut index: HashMap<&str, &Record> = HashMap::with_capacity(self.records.len());
        for record in &self.records {
            if index.insert(record.id.as_str(), record).is_some() {
                return Err(EncodeError::BrokenChain(format!(
                    "duplicate record id {}",
                    record.id
                )));
            }
        }

        let mut visited = HashSet::with_capacity(self.records.len());
        let mut order = Vec::with_capacity(self.records.len());
        let mut current = entry;
        loop {
            if !visited.insert(current.id.as_str()) {
                return Err(EncodeError::BrokenChain(format!(
                    "cycle at record {}",
                    current.id
                )));
            }
            order.push(current);
            let Some(next) = current.next() else {
                break;
            };
            current = index.get(next).copied().ok_or_else(|| {
                EncodeError::BrokenChain(format!("{} links to missing record {next}", current.id))
            })?;
        }

        if order.len() != self.records.len() {
            return Err(EncodeError::BrokenChain(format!(
                "{} of {} records unreachable from {}",
                self.records.len() - order.len(),
                self.records.len(),
                entry.id
            )));
        }
        Ok(order)
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
