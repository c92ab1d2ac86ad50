use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use cvarlink_channel::LineChannel;
use cvarlink_transport::{CancelToken, ChunkSender, Framing, PayloadKind, SenderConfig};
use tracing::info;

use crate::cmd::{parse_pace, KindArg, SendArgs};
use crate::exit::{io_error, transport_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS};
use crate::output::{print_send_report, OutputFormat, SendOutput};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = std::fs::read(&args.input)
        .map_err(|err| io_error(&format!("failed reading {}", args.input.display()), err))?;
    let kind = resolve_kind(args.kind, &args.input);
    let config = SenderConfig {
        chunk_size: args.chunk_size,
        pace: parse_pace(&args.pace)?,
        framing: if args.sequenced {
            Framing::Sequenced
        } else {
            Framing::Plain
        },
        end_marker: !args.no_end_marker,
        max_command_len: args.max_len,
        ..SenderConfig::default()
    };

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|err| {
            io_error(&format!("failed creating {}", path.display()), err)
        })?)),
        None => Box::new(io::stdout().lock()),
    };
    let channel = LineChannel::with_max_len(writer, args.max_len);
    let mut sender = ChunkSender::new(channel, config);
    let plan = sender
        .plan(&payload, kind)
        .map_err(|err| transport_error("plan failed", err))?;

    let cancel = CancelToken::new();
    install_ctrlc_handler(cancel.clone())?;
    let report = sender
        .send(&plan, &args.target, &cancel)
        .map_err(|err| transport_error("send failed", err))?;

    info!(
        target = %args.target,
        commands = report.commands_sent,
        bytes = report.bytes_sent,
        cancelled = report.cancelled,
        "send finished"
    );
    // Chunk lines own stdout unless they went to a file.
    if args.output.is_some() {
        print_send_report(
            &SendOutput::new(
                &args.target,
                kind.name(),
                plan.chunk_size(),
                plan.payload_len(),
                &report,
            ),
            format,
        );
    }

    Ok(if report.cancelled { INTERRUPTED } else { SUCCESS })
}

/// Explicit kind, else `.cfg` files are scripts and everything else a menu.
fn resolve_kind(kind: Option<KindArg>, input: &Path) -> PayloadKind {
    if let Some(kind) = kind {
        return kind.into();
    }
    match input.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(PayloadKind::ScriptFragment.extension()) => {
            PayloadKind::ScriptFragment
        }
        _ => PayloadKind::MenuDocument,
    }
}

fn install_ctrlc_handler(cancel: CancelToken) -> CliResult<()> {
    ctrlc::set_handler(move || cancel.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_extension() {
        assert_eq!(
            resolve_kind(None, Path::new("autoexec.cfg")),
            PayloadKind::ScriptFragment
        );
        assert_eq!(
            resolve_kind(None, Path::new("main.rfm")),
            PayloadKind::MenuDocument
        );
        assert_eq!(resolve_kind(None, Path::new("notes")), PayloadKind::MenuDocument);
    }

    #[test]
    fn explicit_kind_wins() {
        assert_eq!(
            resolve_kind(Some(KindArg::Menu), Path::new("x.cfg")),
            PayloadKind::MenuDocument
        );
    }
}
