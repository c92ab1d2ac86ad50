use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use cvarlink_channel::MAX_COMMAND_LEN;
use cvarlink_transport::{PayloadKind, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod encode;
pub mod envinfo;
pub mod inspect;
pub mod pack_script;
pub mod receive;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a markup document (.rfm) into a chained-cvar .cfg file.
    Encode(EncodeArgs),
    /// Pack a console script or its functions into a loadable .cfg file.
    PackScript(PackScriptArgs),
    /// Parse a generated .cfg file and check its chain.
    Inspect(InspectArgs),
    /// Emit the chunk commands that transfer a file, one `<target> <command>` line each.
    Send(SendArgs),
    /// Reassemble transfers from `<context> <command>` lines.
    Receive(ReceiveArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::PackScript(args) => pack_script::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Receive(args) => receive::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Markup document to encode.
    pub input: PathBuf,
    /// Output .cfg path. Default: the input path with a .cfg extension.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
    /// Maximum length of a generated line.
    #[arg(long, default_value_t = MAX_COMMAND_LEN)]
    pub max_len: usize,
    /// Chain base name. Default: derived from the input file name.
    #[arg(long)]
    pub base: Option<String>,
    /// Outer wrapper tag to strip.
    #[arg(long, default_value = cvarlink_encode::DEFAULT_WRAPPER)]
    pub wrapper: String,
}

#[derive(Args, Debug)]
pub struct PackScriptArgs {
    /// Script file: `function NAME { ... }` blocks, or plain commands with
    /// one or more `; `-separated commands per line.
    pub input: PathBuf,
    /// Output .cfg path. Default: the input path with a .cfg extension.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
    /// Chain base name for scripts without functions. Default: derived from
    /// the input file name.
    #[arg(long)]
    pub base: Option<String>,
    /// Maximum length of a generated line.
    #[arg(long, default_value_t = MAX_COMMAND_LEN)]
    pub max_len: usize,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Generated .cfg file.
    pub input: PathBuf,
    /// Line length the chain must respect.
    #[arg(long, default_value_t = MAX_COMMAND_LEN)]
    pub max_len: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Menu,
    Script,
}

impl From<KindArg> for PayloadKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Menu => PayloadKind::MenuDocument,
            KindArg::Script => PayloadKind::ScriptFragment,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// File to transfer.
    pub input: PathBuf,
    /// Target selector the commands are addressed to.
    #[arg(long, short = 't')]
    pub target: String,
    /// Payload kind. Default: from the input extension (.cfg is a script, anything else a menu).
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,
    /// Requested chunk size in escaped characters.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Delay between commands (e.g. 100ms, 1s, 0).
    #[arg(long, default_value = "100ms")]
    pub pace: String,
    /// Prefix data chunks with sequence numbers.
    #[arg(long)]
    pub sequenced: bool,
    /// Do not send the terminal marker.
    #[arg(long)]
    pub no_end_marker: bool,
    /// Maximum command length accepted by the console.
    #[arg(long, default_value_t = MAX_COMMAND_LEN)]
    pub max_len: usize,
    /// Write command lines to this file instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CompletionArg {
    /// Only the terminal marker completes a transfer.
    Marker,
    /// Transfers idle for `--idle` complete.
    Idle,
    /// Transfers complete after `--expect` bytes.
    Length,
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// File of `<context> <command>` lines. Default: stdin.
    pub input: Option<PathBuf>,
    /// Directory completed payloads are written to.
    #[arg(long)]
    pub out_dir: PathBuf,
    /// When a transfer counts as complete.
    #[arg(long, value_enum, default_value = "marker")]
    pub completion: CompletionArg,
    /// Idle time that completes a transfer under `--completion idle`.
    #[arg(long, default_value = "2s")]
    pub idle: String,
    /// Payload length that completes a transfer under `--completion length`.
    #[arg(long, required_if_eq("completion", "length"))]
    pub expect: Option<usize>,
    /// Maximum accumulated payload per transfer, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}

/// Parse `150ms`, `2s` or a bare number of seconds. Zero is rejected.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Like [`parse_duration`], but `0` (with or without unit) means no delay.
pub fn parse_pace(input: &str) -> CliResult<Duration> {
    match input.trim() {
        "0" | "0s" | "0ms" => Ok(Duration::ZERO),
        other => parse_duration(other),
    }
}

pub fn read_text(path: &Path) -> CliResult<String> {
    std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
}

pub fn write_text(path: &Path, text: &str) -> CliResult<()> {
    std::fs::write(path, text)
        .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))
}

/// `input` with its extension replaced by `.cfg`.
pub fn default_cfg_path(input: &Path) -> PathBuf {
    input.with_extension("cfg")
}

/// File name used to seed generated chain names.
pub fn seed_label(input: &Path) -> String {
    input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string())
}
