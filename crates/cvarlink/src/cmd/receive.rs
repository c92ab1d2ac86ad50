use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::time::{Duration, Instant};

use cvarlink_channel::{ChannelError, CommandSource, LineSource};
use cvarlink_transport::{
    ChunkOutcome, CompletedTransfer, CompletionPolicy, DirectorySink, Receiver, ReceiverConfig,
    SessionRegistry, SessionState, TransportError,
};
use tracing::{debug, warn};

use crate::cmd::{parse_duration, CompletionArg, ReceiveArgs};
use crate::exit::{channel_error, io_error, transport_error, CliResult, FAILURE, SUCCESS};
use crate::output::{
    print_receive_summary, schema_id, OutputFormat, PendingRow, ReceiveOutput, TransferRow,
};

/// Reads command lines until end of input.
///
/// Under `--completion idle` every transfer still open at end of input is
/// finalized; under the other policies it is reported as incomplete and the
/// exit code is non-zero.
pub fn run(args: ReceiveArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ReceiverConfig {
        completion: completion_policy(&args)?,
        max_payload: args.max_payload,
    };
    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path).map_err(|err| {
            io_error(&format!("failed opening {}", path.display()), err)
        })?)),
        None => Box::new(io::stdin().lock()),
    };
    let sink = DirectorySink::new(&args.out_dir)
        .map_err(|err| transport_error("output directory unusable", err))?;

    let mut source = LineSource::new(input);
    let mut receiver = Receiver::new(sink, config);
    let mut registry = SessionRegistry::new();
    let mut completed: Vec<CompletedTransfer> = Vec::new();
    let mut commands = 0usize;
    let mut rejected = 0usize;

    loop {
        let command = match source.recv_command() {
            Ok(Some(command)) => command,
            Ok(None) => break,
            Err(ChannelError::MalformedLine { line, reason }) => {
                warn!(line, reason, "input line skipped");
                rejected += 1;
                continue;
            }
            Err(err) => return Err(channel_error("read failed", err)),
        };
        commands += 1;
        let now = Instant::now();

        match receiver.on_chunk_received(&mut registry, &command.context, &command.text, now) {
            Ok(outcome) => {
                debug!(context = %command.context, ?outcome, "command handled");
                if let ChunkOutcome::Finalized(transfer) = outcome {
                    completed.push(transfer);
                }
            }
            Err(err) if is_fatal(&err) => return Err(transport_error("receive failed", err)),
            Err(err) => {
                warn!(context = %command.context, error = %err, "command rejected");
                rejected += 1;
            }
        }
        completed.extend(
            receiver
                .reap_idle(&mut registry, now)
                .map_err(|err| transport_error("receive failed", err))?,
        );
    }

    let now = Instant::now();
    if matches!(config.completion, CompletionPolicy::IdleTimeout(_)) {
        completed.extend(
            receiver
                .reap_idle_after(&mut registry, Duration::ZERO, now)
                .map_err(|err| transport_error("receive failed", err))?,
        );
    }
    let incomplete: Vec<PendingRow> = registry
        .iter_progress(now)
        .iter()
        .filter(|progress| progress.state == SessionState::Receiving)
        .map(PendingRow::from)
        .collect();
    for row in &incomplete {
        warn!(context = %row.context, bytes = row.bytes, "transfer incomplete at end of input");
    }

    let written = receiver.sink().written();
    let output = ReceiveOutput {
        schema_id: schema_id("receive-summary"),
        commands,
        rejected,
        completed: completed
            .iter()
            .enumerate()
            .map(|(i, transfer)| {
                TransferRow::new(transfer, written.get(i).map(|p| p.display().to_string()))
            })
            .collect(),
        incomplete,
    };
    print_receive_summary(&output, format);

    Ok(if output.incomplete.is_empty() {
        SUCCESS
    } else {
        FAILURE
    })
}

fn completion_policy(args: &ReceiveArgs) -> CliResult<CompletionPolicy> {
    Ok(match args.completion {
        CompletionArg::Marker => CompletionPolicy::TerminalMarker,
        CompletionArg::Idle => CompletionPolicy::IdleTimeout(parse_duration(&args.idle)?),
        CompletionArg::Length => CompletionPolicy::ExpectedLength(args.expect.unwrap_or(0)),
    })
}

/// Local failures end the command; protocol errors only affect one transfer.
fn is_fatal(err: &TransportError) -> bool {
    matches!(
        err,
        TransportError::Io(_)
            | TransportError::Sink(_)
            | TransportError::Channel(ChannelError::Io(_))
    )
}
