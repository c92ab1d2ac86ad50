//! Packing of `; `-separated console command strings into exec chains.

use cvarlink_channel::MAX_COMMAND_LEN;
use tracing::debug;

use crate::chain::{Chain, LinkStyle, Record};
use crate::config::RecordLayout;
use crate::error::{preview, EncodeError, Result};
use crate::naming::ChainNaming;

const SEPARATOR: &str = "; ";

/// Configuration for [`pack_commands`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptPackerConfig {
    /// Maximum measured record size. Default: 255.
    pub max_len: usize,
    /// How records are measured. Default: escaped `set` lines.
    pub layout: RecordLayout,
}

impl Default for ScriptPackerConfig {
    fn default() -> Self {
        Self {
            max_len: MAX_COMMAND_LEN,
            layout: RecordLayout::CfgSet,
        }
    }
}

/// Split a command string on `; ` separators that are not inside quotes.
pub fn split_commands(script: &str) -> Vec<&str> {
    let bytes = script.as_bytes();
    let mut parts = Vec::new();
    let mut in_quote = false;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quote = !in_quote,
            b';' if !in_quote && bytes.get(i + 1) == Some(&b' ') => {
                parts.push(&script[start..i]);
                start = i + SEPARATOR.len();
                i = start;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&script[start..]);
    parts.retain(|p| !p.is_empty());
    parts
}

/// Pack a command string into records linked by `; sp_sc_exec_cvar NEXT`.
///
/// Commands are atomic. After greedy packing, the last two records are merged
/// when their combined content fits a terminal record.
pub fn pack_commands(
    script: &str,
    naming: &ChainNaming,
    config: &ScriptPackerConfig,
) -> Result<Chain> {
    let parts = split_commands(script);
    let layout = config.layout;
    let sep_cost = layout.measure(SEPARATOR);
    let terminal_cap = |index: usize| {
        config
            .max_len
            .saturating_sub(layout.overhead(&naming.id(index)))
    };
    let linked_cap = |index: usize| {
        terminal_cap(index)
            .saturating_sub(layout.measure(&LinkStyle::Exec.directive(&naming.id(index + 1))))
    };

    let mut groups: Vec<(Vec<&str>, usize)> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut used = 0usize;

    for (n, &part) in parts.iter().enumerate() {
        let cost = layout.measure(part);
        if !current.is_empty() {
            if used + sep_cost + cost <= linked_cap(groups.len()) {
                current.push(part);
                used += sep_cost + cost;
                continue;
            }
            groups.push((std::mem::take(&mut current), used));
        }

        let index = groups.len();
        let cap = if n + 1 == parts.len() {
            terminal_cap(index)
        } else {
            linked_cap(index)
        };
        if cost > cap {
            return Err(EncodeError::CommandTooLong {
                preview: preview(part),
                len: cost,
                capacity: cap,
            });
        }
        current.push(part);
        used = cost;
    }
    if !current.is_empty() {
        groups.push((current, used));
    }

    if groups.len() > 1 {
        let last = groups.len() - 1;
        let merged = groups[last - 1].1 + sep_cost + groups[last].1;
        if merged <= terminal_cap(last - 1) {
            if let Some((tail, _)) = groups.pop() {
                let (head, size) = &mut groups[last - 1];
                head.extend(tail);
                *size = merged;
            }
        }
    }

    let count = groups.len();
    let records = groups
        .into_iter()
        .enumerate()
        .map(|(i, (commands, _))| {
            let body = commands.join(SEPARATOR);
            if i + 1 < count {
                Record::linked(naming.id(i), body, LinkStyle::Exec, naming.id(i + 1))
            } else {
                Record::terminal(naming.id(i), body)
            }
        })
        .collect();
    let chain = Chain::new(records);
    debug!(
        base = %naming.base,
        commands = parts.len(),
        records = chain.len(),
        "script packed"
    );
    Ok(chain)
}
