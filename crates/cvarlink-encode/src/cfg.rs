//! `.cfg` rendering and parsing.
//!
//! Each record is stored as a percent-escaped `set` line followed by an
//! in-place `sp_sc_cvar_unescape`, so quotes and newlines survive the
//! console's single-line, quote-delimited command syntax.

use std::collections::HashSet;

use cvarlink_channel::{escape_str, unescape_str, MAX_COMMAND_LEN};

use crate::chain::{Chain, Record};
use crate::error::{EncodeError, Result};
use crate::function::PackedScript;
use crate::naming::validate_name;

/// How the generated file tells the reader to start the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryPoint {
    /// Menu chains: `<includecvar ENTRY>` inside a menu document.
    #[default]
    Include,
    /// Script chains: `sp_sc_exec_cvar ENTRY`.
    Exec,
    /// Function shells: an `sp_sc_func_load_cvar ENTRY` command per function.
    FuncLoad,
}

/// Options for [`render_cfg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgOptions {
    /// Maximum length of a generated line. Default: 255.
    pub max_line: usize,
    /// Entry point hint appended after the records.
    pub entry: EntryPoint,
    /// Optional source label written into the header.
    pub source: Option<String>,
}

impl Default for CfgOptions {
    fn default() -> Self {
        Self {
            max_line: MAX_COMMAND_LEN,
            entry: EntryPoint::Include,
            source: None,
        }
    }
}

/// Render a chain as `.cfg` text.
pub fn render_cfg(chain: &Chain, options: &CfgOptions) -> Result<String> {
    let entries: Vec<&str> = chain.entry().map(Record::id).into_iter().collect();
    render(chain.iter(), &entries, options)
}

/// Render packed scripts as one `.cfg` file.
///
/// Records of every script are written in order, followed by one entry
/// point per script. Record names must be unique across the file.
pub fn render_scripts_cfg(scripts: &[PackedScript], options: &CfgOptions) -> Result<String> {
    let entries: Vec<&str> = scripts.iter().filter_map(PackedScript::entry).collect();
    render(scripts.iter().flat_map(|s| s.records()), &entries, options)
}

fn render<'a>(
    records: impl Iterator<Item = &'a Record>,
    entries: &[&str],
    options: &CfgOptions,
) -> Result<String> {
    let mut lines = vec![
        "//--- Generated by cvarlink ---//".to_string(),
        "// This file is auto-generated. Do not edit manually.".to_string(),
    ];
    if let Some(source) = &options.source {
        lines.push(format!("// Source: {source}"));
    }
    lines.push(String::new());

    let mut seen = HashSet::new();
    for record in records {
        let name = record.id();
        if !seen.insert(name) {
            return Err(EncodeError::BrokenChain(format!("duplicate record id {name}")));
        }
        let set = format!("set {name} \"{}\"", escape_str(record.content()));
        let len = set.chars().count();
        if len > options.max_line {
            return Err(EncodeError::LineTooLong {
                name: name.to_string(),
                len,
                max: options.max_line,
            });
        }
        lines.push(set);
        lines.push(format!("sp_sc_cvar_unescape {name} {name}"));
        lines.push(String::new());
    }

    if !entries.is_empty() {
        lines.push("// --- Entry Points ---".to_string());
        match options.entry {
            EntryPoint::Include => {
                lines.push("// Inside an outer <stm> ... </stm> menu, use:".to_string());
                lines.extend(entries.iter().map(|id| format!("//   <includecvar {id}>")));
            }
            EntryPoint::Exec => {
                lines.push("// Run with:".to_string());
                lines.extend(entries.iter().map(|id| format!("//   sp_sc_exec_cvar {id}")));
            }
            EntryPoint::FuncLoad => {
                lines.push("// Loads the functions; run again after editing.".to_string());
                lines.extend(entries.iter().map(|id| format!("sp_sc_func_load_cvar {id}")));
            }
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

/// Parse the `set` lines of a `.cfg` file back into a chain.
///
/// Records keep file order; the first one is the entry point. Comments,
/// blank lines and other commands are ignored.
pub fn parse_cfg(text: &str) -> Result<Chain> {
    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix("set ") else {
            continue;
        };
        let (name, value) = rest
            .trim_start()
            .split_once(' ')
            .ok_or(EncodeError::MalformedCfg {
                line,
                reason: "missing value",
            })?;
        if validate_name(name).is_err() {
            return Err(EncodeError::MalformedCfg {
                line,
                reason: "invalid cvar name",
            });
        }
        let value = value.trim();
        let quoted = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .ok_or(EncodeError::MalformedCfg {
                line,
                reason: "value not quoted",
            })?;
        let content = unescape_str(quoted).map_err(|_| EncodeError::MalformedCfg {
            line,
            reason: "malformed escape",
        })?;
        entries.push((name.to_string(), content));
    }
    Ok(Chain::from_stored(entries))
}
