use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use cvarlink_encode::{Record, RecordLayout};
use cvarlink_transport::{CompletedTransfer, SendReport, SessionProgress};
use serde::Serialize;

const SCHEMA_BASE: &str = "https://schemas.3leaps.dev/cvarlink/cli/v1";

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn schema_id(name: &str) -> String {
    format!("{SCHEMA_BASE}/{name}.schema.json")
}

/// One chain record as shown by `encode`, `pack-script` and `inspect`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    pub id: String,
    /// Measured size under the layout the chain was checked with.
    pub size: usize,
    pub next: Option<String>,
    pub preview: String,
}

impl RecordRow {
    pub fn rows<'a>(records: impl IntoIterator<Item = &'a Record>, layout: RecordLayout) -> Vec<Self> {
        records
            .into_iter()
            .map(|record| RecordRow {
                id: record.id().to_string(),
                size: layout.measure(record.content()) + layout.overhead(record.id()),
                next: record.next().map(str::to_string),
                preview: preview(record.body(), 40),
            })
            .collect()
    }
}

#[derive(Serialize)]
pub struct ChainOutput<'a> {
    pub schema_id: String,
    pub source: &'a str,
    pub output: Option<&'a str>,
    pub entry: Option<&'a str>,
    pub valid: bool,
    pub error: Option<String>,
    pub records: Vec<RecordRow>,
}

pub fn print_chain(out: &ChainOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CVAR", "SIZE", "NEXT", "CONTENT"]);
            for row in &out.records {
                table.add_row(vec![
                    row.id.clone(),
                    row.size.to_string(),
                    row.next.clone().unwrap_or_else(|| "-".to_string()),
                    row.preview.clone(),
                ]);
            }
            println!("{table}");
            print_chain_footer(out);
        }
        OutputFormat::Pretty => {
            for row in &out.records {
                println!(
                    "cvar={} size={} next={}",
                    row.id,
                    row.size,
                    row.next.as_deref().unwrap_or("-")
                );
            }
            print_chain_footer(out);
        }
        OutputFormat::Raw => {
            for row in &out.records {
                println!("{}", row.id);
            }
        }
    }
}

fn print_chain_footer(out: &ChainOutput<'_>) {
    println!(
        "{} records, entry {}",
        out.records.len(),
        out.entry.unwrap_or("-")
    );
    if let Some(path) = out.output {
        println!("written to {path}");
    }
    if let Some(error) = &out.error {
        println!("INVALID: {error}");
    }
}

#[derive(Serialize)]
pub struct SendOutput<'a> {
    pub schema_id: String,
    pub target: &'a str,
    pub kind: &'static str,
    pub chunk_size: usize,
    pub payload_len: usize,
    pub commands_sent: usize,
    pub chunks_sent: usize,
    pub bytes_sent: usize,
    pub retries: usize,
    pub end_marker_sent: bool,
    pub cancelled: bool,
}

impl<'a> SendOutput<'a> {
    pub fn new(
        target: &'a str,
        kind: &'static str,
        chunk_size: usize,
        payload_len: usize,
        report: &SendReport,
    ) -> Self {
        Self {
            schema_id: schema_id("send-report"),
            target,
            kind,
            chunk_size,
            payload_len,
            commands_sent: report.commands_sent,
            chunks_sent: report.chunks_sent,
            bytes_sent: report.bytes_sent,
            retries: report.retries,
            end_marker_sent: report.end_marker_sent,
            cancelled: report.cancelled,
        }
    }
}

pub fn print_send_report(out: &SendOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TARGET", "KIND", "COMMANDS", "CHUNKS", "BYTES", "STATUS"])
                .add_row(vec![
                    out.target.to_string(),
                    out.kind.to_string(),
                    out.commands_sent.to_string(),
                    out.chunks_sent.to_string(),
                    out.bytes_sent.to_string(),
                    send_status(out).to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "target={} kind={} commands={} chunks={} bytes={} retries={} status={}",
                out.target,
                out.kind,
                out.commands_sent,
                out.chunks_sent,
                out.bytes_sent,
                out.retries,
                send_status(out)
            );
        }
        OutputFormat::Raw => println!("{}", out.commands_sent),
    }
}

fn send_status(out: &SendOutput<'_>) -> &'static str {
    if out.cancelled {
        "cancelled"
    } else {
        "sent"
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TransferRow {
    pub context: String,
    pub kind: &'static str,
    pub bytes: usize,
    pub chunks: usize,
    pub path: Option<String>,
}

impl TransferRow {
    pub fn new(transfer: &CompletedTransfer, path: Option<String>) -> Self {
        Self {
            context: transfer.context.clone(),
            kind: transfer.kind.name(),
            bytes: transfer.payload.len(),
            chunks: transfer.chunks,
            path,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PendingRow {
    pub context: String,
    pub kind: &'static str,
    pub bytes: usize,
    pub chunks: usize,
}

impl From<&SessionProgress> for PendingRow {
    fn from(progress: &SessionProgress) -> Self {
        Self {
            context: progress.context.clone(),
            kind: progress.kind.name(),
            bytes: progress.bytes,
            chunks: progress.chunks,
        }
    }
}

#[derive(Serialize)]
pub struct ReceiveOutput {
    pub schema_id: String,
    pub commands: usize,
    pub rejected: usize,
    pub completed: Vec<TransferRow>,
    pub incomplete: Vec<PendingRow>,
}

pub fn print_receive_summary(out: &ReceiveOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CONTEXT", "KIND", "BYTES", "CHUNKS", "STATUS", "FILE"]);
            for row in &out.completed {
                table.add_row(vec![
                    row.context.clone(),
                    row.kind.to_string(),
                    row.bytes.to_string(),
                    row.chunks.to_string(),
                    "complete".to_string(),
                    row.path.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
            for row in &out.incomplete {
                table.add_row(vec![
                    row.context.clone(),
                    row.kind.to_string(),
                    row.bytes.to_string(),
                    row.chunks.to_string(),
                    "incomplete".to_string(),
                    "-".to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &out.completed {
                println!(
                    "context={} kind={} bytes={} chunks={} file={}",
                    row.context,
                    row.kind,
                    row.bytes,
                    row.chunks,
                    row.path.as_deref().unwrap_or("-")
                );
            }
            for row in &out.incomplete {
                println!(
                    "context={} kind={} bytes={} chunks={} incomplete",
                    row.context, row.kind, row.bytes, row.chunks
                );
            }
        }
        OutputFormat::Raw => {
            for row in &out.completed {
                if let Some(path) = &row.path {
                    println!("{path}");
                }
            }
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        return flat;
    }
    let mut out: String = flat.chars().take(max).collect();
    out.push_str("...");
    out
}
