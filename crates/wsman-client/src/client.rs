//! The client facade: one call from connection parameters and a
//! command to captured stdout/stderr and an exit code.
//!
//! Orchestration order: validate → connect → open → encode → run →
//! collect → release. Release runs on every path once the shell
//! opened; its failures ride along as secondary diagnostics and never
//! replace the primary outcome.

use thiserror::Error;
use tracing::debug;

use wsman_core::command::{encode, CommandInput};
use wsman_core::WsmanError;

use crate::config::ConnectionParams;
use crate::output::{OutputCollector, PartialOutput};
use crate::session::ShellSession;
use crate::transport::{Exchange, HttpTransport};

/// Outcome of a completed remote command.
///
/// A nonzero `exit_code` is data, not an error — the caller decides
/// what to do with it.
#[derive(Debug)]
pub struct ExecResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    /// Non-fatal errors recorded while releasing remote resources.
    pub cleanup_errors: Vec<WsmanError>,
}

/// A failed execution.
///
/// Output-collection failures carry whatever was received before the
/// failure; earlier-stage failures (configuration, connection, open,
/// submit) carry none because nothing had been produced yet.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecFailure {
    pub error: WsmanError,
    pub partial: Option<PartialOutput>,
    pub cleanup_errors: Vec<WsmanError>,
}

impl ExecFailure {
    fn bare(error: WsmanError) -> Self {
        Self {
            error,
            partial: None,
            cleanup_errors: Vec::new(),
        }
    }
}

/// Execute one command against the endpoint described by `params`.
///
/// Validates the parameters before any network I/O, connects, and
/// drives a full shell session with guaranteed release.
pub async fn execute(
    params: &ConnectionParams,
    input: &CommandInput,
    restricted: bool,
) -> Result<ExecResult, ExecFailure> {
    params.validate().map_err(ExecFailure::bare)?;
    let transport = HttpTransport::connect(params)
        .await
        .map_err(ExecFailure::bare)?;
    execute_over(&transport, params, input, restricted).await
}

/// Like [`execute`], over a caller-supplied transport.
pub async fn execute_over<T: Exchange>(
    transport: &T,
    params: &ConnectionParams,
    input: &CommandInput,
    restricted: bool,
) -> Result<ExecResult, ExecFailure> {
    let mut session = ShellSession::new(transport, params);

    // Open failure leaves no server-side state behind.
    session.open().await.map_err(ExecFailure::bare)?;

    let encoded = encode(input, restricted);
    debug!(restricted, "submitting command");

    let mut collector = OutputCollector::new();
    let primary = run_and_collect(&mut session, &encoded, &mut collector).await;

    // From here on the shell exists: release unconditionally.
    let cleanup_errors = session.release().await;

    match primary {
        Ok(()) => match collector.finish() {
            Ok(output) => Ok(ExecResult {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.exit_code,
                cleanup_errors,
            }),
            // Collect returned without the server ever reporting Done;
            // treat it as a collection failure with the bytes we have.
            Err(partial) => Err(ExecFailure {
                error: WsmanError::OutputCollection(
                    "command never signalled completion".into(),
                ),
                partial: Some(partial),
                cleanup_errors,
            }),
        },
        Err(error) => {
            let partial = match &error {
                WsmanError::OutputCollection(_) | WsmanError::Timeout => {
                    Some(collector.into_partial())
                }
                _ => None,
            };
            Err(ExecFailure {
                error,
                partial,
                cleanup_errors,
            })
        }
    }
}

async fn run_and_collect<T: Exchange>(
    session: &mut ShellSession<'_, T>,
    encoded: &str,
    collector: &mut OutputCollector,
) -> Result<(), WsmanError> {
    session.run(encoded).await?;
    session.collect(collector).await
}
