//! Cooperative sending on tokio.
//!
//! The pacing delay is the only suspension point; other tasks keep running
//! while a transfer waits between commands.

use std::time::Duration;

use cvarlink_channel::{validate_target, CommandChannel};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::plan::TransferPlan;
use crate::sender::{is_retryable, RetryPolicy, SendReport, SenderConfig};

/// Handle to a transfer running on a tokio task.
pub struct SendHandle<C> {
    cancel: CancellationToken,
    task: JoinHandle<(C, Result<SendReport>)>,
}

impl<C> SendHandle<C> {
    /// Stop before the next command. A pending pause is cut short.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this transfer.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the transfer to end; returns the channel and the report.
    pub async fn wait(self) -> Result<(C, SendReport)> {
        let (channel, result) = self
            .task
            .await
            .map_err(|err| TransportError::TaskFailed(err.to_string()))?;
        result.map(|report| (channel, report))
    }
}

/// Send `plan` to `target` on a new tokio task.
///
/// Must be called from within a tokio runtime. Pacing and retries follow
/// `config`.
pub fn spawn_send<C>(
    channel: C,
    plan: TransferPlan,
    target: impl Into<String>,
    config: SenderConfig,
) -> SendHandle<C>
where
    C: CommandChannel + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let target = target.into();
    let task = tokio::spawn(async move {
        let mut channel = channel;
        let result = run(&mut channel, &plan, &target, &config, &token).await;
        (channel, result)
    });
    SendHandle { cancel, task }
}

async fn run<C: CommandChannel>(
    channel: &mut C,
    plan: &TransferPlan,
    target: &str,
    config: &SenderConfig,
    token: &CancellationToken,
) -> Result<SendReport> {
    validate_target(target)?;
    info!(
        target,
        kind = %plan.kind(),
        chunks = plan.chunk_count(),
        chunk_size = plan.chunk_size(),
        "sending transfer"
    );

    let mut report = SendReport::default();
    for index in 0..plan.command_count() {
        if index > 0 {
            pause(config.pace, token).await;
        }
        if token.is_cancelled() {
            warn!(
                target,
                sent = report.commands_sent,
                remaining = plan.command_count() - index,
                "transfer cancelled"
            );
            report.cancelled = true;
            break;
        }
        let Some(command) = plan.command(index) else {
            break;
        };
        report.retries += issue(channel, target, &command, config.retry, token).await?;
        report.record(plan, index);
        debug!(target, index, len = command.len(), "chunk issued");
    }

    if !report.cancelled {
        info!(target, commands = report.commands_sent, "transfer sent");
    }
    Ok(report)
}

async fn issue<C: CommandChannel>(
    channel: &mut C,
    target: &str,
    command: &str,
    retry: RetryPolicy,
    token: &CancellationToken,
) -> Result<usize> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match channel.send_command(target, command) {
            Ok(()) => return Ok((attempt - 1) as usize),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                warn!(target, attempt, error = %err, "command send failed, retrying");
                pause(retry.backoff, token).await;
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Sleep for `delay` or until cancelled, whichever comes first.
async fn pause(delay: Duration, token: &CancellationToken) {
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        () = token.cancelled() => {}
        () = tokio::time::sleep(delay) => {}
    }
}
