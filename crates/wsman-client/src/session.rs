//! The remote shell session state machine.
//!
//! One session drives one shell and at most one command through
//! `Unopened → Open → CommandRunning → CommandDone → CleanedUp →
//! Closed`. Once `open` has succeeded, `release` must run on every
//! exit path; it signals the command and deletes the shell
//! best-effort, returning failures as data instead of propagating
//! them over the primary outcome.

use tracing::{debug, info, warn};

use wsman_core::envelope::{
    extract_command_id, extract_shell_id, parse_receive, EnvelopeBuilder,
};
use wsman_core::{WsmanError, WsmanResult};

use crate::config::ConnectionParams;
use crate::output::OutputCollector;
use crate::transport::Exchange;

/// Server-assigned shell identifier, valid from open until close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellHandle(String);

impl ShellHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Server-assigned command identifier, scoped to one shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHandle(String);

impl CommandHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a `ShellSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
    CommandRunning,
    CommandDone,
    CleanedUp,
    Closed,
}

/// A remote shell session over an exchange-capable transport.
pub struct ShellSession<'t, T: Exchange> {
    transport: &'t T,
    builder: EnvelopeBuilder,
    state: SessionState,
    shell: Option<ShellHandle>,
    command: Option<CommandHandle>,
}

impl<'t, T: Exchange> ShellSession<'t, T> {
    pub fn new(transport: &'t T, params: &ConnectionParams) -> Self {
        Self {
            transport,
            builder: EnvelopeBuilder::new(
                &params.endpoint,
                params.max_envelope_size,
                params.timeout.as_secs(),
            ),
            state: SessionState::Unopened,
            shell: None,
            command: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn shell(&self) -> Option<&ShellHandle> {
        self.shell.as_ref()
    }

    /// Request a new remote shell. On failure no server-side state
    /// exists, so there is nothing to clean up.
    pub async fn open(&mut self) -> WsmanResult<&ShellHandle> {
        if self.state != SessionState::Unopened {
            return Err(WsmanError::ShellOpen(format!(
                "session already used (state: {:?})",
                self.state
            )));
        }

        let response = self
            .transport
            .exchange(self.builder.create_shell())
            .await
            .map_err(|e| e.at_stage(WsmanError::ShellOpen))?;
        let shell_id = extract_shell_id(&response)
            .map_err(|e| e.at_stage(WsmanError::ShellOpen))?;

        info!(shell_id = %shell_id, "opened remote shell");
        self.state = SessionState::Open;
        Ok(self.shell.insert(ShellHandle(shell_id)))
    }

    /// Submit an encoded command line under the open shell. On
    /// failure the shell itself is still open and must be released by
    /// the caller's cleanup path.
    pub async fn run(&mut self, encoded_command: &str) -> WsmanResult<&CommandHandle> {
        let shell = match (&self.shell, self.state) {
            (Some(shell), SessionState::Open) => shell,
            _ => {
                return Err(WsmanError::CommandSubmit(format!(
                    "no open shell to run under (state: {:?})",
                    self.state
                )))
            }
        };

        let envelope = self.builder.command(shell.as_str(), encoded_command);
        let response = self
            .transport
            .exchange(envelope)
            .await
            .map_err(|e| e.at_stage(WsmanError::CommandSubmit))?;
        let command_id = extract_command_id(&response)
            .map_err(|e| e.at_stage(WsmanError::CommandSubmit))?;

        debug!(command_id = %command_id, "command submitted");
        self.state = SessionState::CommandRunning;
        Ok(self.command.insert(CommandHandle(command_id)))
    }

    /// Poll for output until the server reports the command finished,
    /// folding every chunk into the collector as it arrives.
    ///
    /// This is the only long-blocking operation in the client; each
    /// poll may block up to the configured timeout. A transport
    /// failure mid-poll surfaces as `OutputCollection` (timeouts keep
    /// their identity) and everything collected so far stays in the
    /// collector for the caller to report alongside the error.
    pub async fn collect(&mut self, collector: &mut OutputCollector) -> WsmanResult<()> {
        let (shell, command) = match (&self.shell, &self.command, self.state) {
            (Some(shell), Some(command), SessionState::CommandRunning) => (shell, command),
            _ => {
                return Err(WsmanError::OutputCollection(format!(
                    "no running command to collect from (state: {:?})",
                    self.state
                )))
            }
        };

        while !collector.is_done() {
            let envelope = self.builder.receive(shell.as_str(), command.as_str());
            let response = self.transport.exchange(envelope).await.map_err(|e| match e {
                WsmanError::Timeout => WsmanError::Timeout,
                other => WsmanError::OutputCollection(other.to_string()),
            })?;
            let chunk = parse_receive(&response)
                .map_err(|e| e.at_stage(WsmanError::OutputCollection))?;
            collector.absorb(chunk);
        }

        self.state = SessionState::CommandDone;
        Ok(())
    }

    /// Release command and shell resources, best-effort and
    /// unconditionally once `open` has succeeded.
    ///
    /// Failures are returned as data; a leaked remote resource is
    /// preferred over masking the primary result.
    pub async fn release(&mut self) -> Vec<WsmanError> {
        let mut errors = Vec::new();

        if let Some(err) = self.cleanup_command().await {
            warn!("command cleanup failed: {err}");
            errors.push(err);
        }
        if let Some(err) = self.close_shell().await {
            warn!("shell close failed: {err}");
            errors.push(err);
        }

        errors
    }

    /// Signal the command so the server frees its resources. No-op if
    /// no command was ever submitted.
    async fn cleanup_command(&mut self) -> Option<WsmanError> {
        let (shell, command) = match (&self.shell, self.command.take()) {
            (Some(shell), Some(command)) => (shell.clone(), command),
            _ => return None,
        };

        self.state = SessionState::CleanedUp;
        let envelope = self
            .builder
            .signal_terminate(shell.as_str(), command.as_str());
        match self.transport.exchange(envelope).await {
            Ok(_) => {
                debug!(command_id = %command.as_str(), "command cleaned up");
                None
            }
            Err(e) => Some(WsmanError::Cleanup(format!(
                "terminate signal for command {} failed: {e}",
                command.as_str()
            ))),
        }
    }

    /// Delete the shell. No-op if the shell never opened; the handle
    /// is invalid afterwards.
    async fn close_shell(&mut self) -> Option<WsmanError> {
        let shell = self.shell.take()?;

        self.state = SessionState::Closed;
        let envelope = self.builder.delete_shell(shell.as_str());
        match self.transport.exchange(envelope).await {
            Ok(_) => {
                info!(shell_id = %shell.as_str(), "closed remote shell");
                None
            }
            Err(e) => Some(WsmanError::Cleanup(format!(
                "delete of shell {} failed: {e}",
                shell.as_str()
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Canned server responses shared by the session and facade tests.

    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine;

    pub fn shell_created(id: &str) -> String {
        format!("<rsp:Shell><rsp:ShellId>{id}</rsp:ShellId></rsp:Shell>")
    }

    pub fn command_started(id: &str) -> String {
        format!("<rsp:CommandResponse><rsp:CommandId>{id}</rsp:CommandId></rsp:CommandResponse>")
    }

    pub fn receive_chunk(stdout: &[u8], stderr: &[u8]) -> String {
        format!(
            "<rsp:ReceiveResponse>\
             <rsp:Stream Name=\"stdout\" CommandId=\"C\">{}</rsp:Stream>\
             <rsp:Stream Name=\"stderr\" CommandId=\"C\">{}</rsp:Stream>\
             </rsp:ReceiveResponse>",
            BASE64_STANDARD.encode(stdout),
            BASE64_STANDARD.encode(stderr),
        )
    }

    pub fn receive_done(exit_code: i32) -> String {
        format!(
            "<rsp:ReceiveResponse>\
             <rsp:CommandState CommandId=\"C\" State=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done\">\
             <rsp:ExitCode>{exit_code}</rsp:ExitCode>\
             </rsp:CommandState>\
             </rsp:ReceiveResponse>"
        )
    }

    pub fn empty_ok() -> String {
        "<s:Envelope><s:Body/></s:Envelope>".to_string()
    }

    /// How many sent envelopes carry the given WS-Man action URI.
    pub fn count_action(sent: &[String], action_suffix: &str) -> usize {
        sent.iter().filter(|e| e.contains(action_suffix)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::config::{ConnectionParams, TransportMode};
    use crate::transport::mock::MockExchange;

    fn params() -> ConnectionParams {
        let mut p = ConnectionParams::new("http://host:5985/wsman", TransportMode::Plaintext);
        p.username = Some("admin".into());
        p.password = Some("pw".into());
        p
    }

    #[tokio::test]
    async fn happy_path_walks_all_states() {
        let mock = MockExchange::new();
        mock.push_ok(shell_created("S-1"));
        mock.push_ok(command_started("C-1"));
        mock.push_ok(receive_chunk(b"ok\n", b""));
        mock.push_ok(receive_done(0));
        mock.push_ok(empty_ok()); // signal
        mock.push_ok(empty_ok()); // delete

        let p = params();
        let mut session = ShellSession::new(&mock, &p);
        assert_eq!(session.state(), SessionState::Unopened);

        session.open().await.unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.shell().unwrap().as_str(), "S-1");

        session.run("echo hi").await.unwrap();
        assert_eq!(session.state(), SessionState::CommandRunning);

        let mut collector = OutputCollector::new();
        session.collect(&mut collector).await.unwrap();
        assert_eq!(session.state(), SessionState::CommandDone);

        let errors = session.release().await;
        assert!(errors.is_empty());
        assert_eq!(session.state(), SessionState::Closed);

        let output = collector.finish().unwrap();
        assert_eq!(output.stdout, b"ok\n");
        assert_eq!(output.exit_code, 0);

        // Signal precedes delete, one each.
        let sent = mock.sent();
        assert_eq!(count_action(&sent, "shell/Signal"), 1);
        assert_eq!(count_action(&sent, "transfer/Delete"), 1);
        let signal_pos = sent.iter().position(|e| e.contains("shell/Signal")).unwrap();
        let delete_pos = sent.iter().position(|e| e.contains("transfer/Delete")).unwrap();
        assert!(signal_pos < delete_pos);
    }

    #[tokio::test]
    async fn open_failure_leaves_nothing_to_release() {
        let mock = MockExchange::new();
        mock.push_err(WsmanError::Fault("HTTP 500: shell quota".into()));

        let p = params();
        let mut session = ShellSession::new(&mock, &p);
        let err = session.open().await.unwrap_err();
        assert!(matches!(err, WsmanError::ShellOpen(_)));
        assert_eq!(session.state(), SessionState::Unopened);

        assert!(session.release().await.is_empty());
        assert_eq!(mock.sent().len(), 1);
    }

    #[tokio::test]
    async fn run_failure_still_closes_shell() {
        let mock = MockExchange::new();
        mock.push_ok(shell_created("S-1"));
        mock.push_err(WsmanError::Fault("HTTP 400: bad command".into()));
        mock.push_ok(empty_ok()); // delete

        let p = params();
        let mut session = ShellSession::new(&mock, &p);
        session.open().await.unwrap();
        let err = session.run("bad").await.unwrap_err();
        assert!(matches!(err, WsmanError::CommandSubmit(_)));

        let errors = session.release().await;
        assert!(errors.is_empty());

        // No command to signal, but the shell delete still went out.
        let sent = mock.sent();
        assert_eq!(count_action(&sent, "shell/Signal"), 0);
        assert_eq!(count_action(&sent, "transfer/Delete"), 1);
    }

    #[tokio::test]
    async fn collect_failure_wraps_transport_error_and_keeps_partial() {
        let mock = MockExchange::new();
        mock.push_ok(shell_created("S-1"));
        mock.push_ok(command_started("C-1"));
        mock.push_ok(receive_chunk(b"chunk1 ", b""));
        mock.push_ok(receive_chunk(b"chunk2", b""));
        mock.push_err(WsmanError::Connection("peer reset".into()));

        let p = params();
        let mut session = ShellSession::new(&mock, &p);
        session.open().await.unwrap();
        session.run("long-job").await.unwrap();

        let mut collector = OutputCollector::new();
        let err = session.collect(&mut collector).await.unwrap_err();
        assert!(matches!(err, WsmanError::OutputCollection(_)));

        let partial = collector.into_partial();
        assert_eq!(partial.stdout, b"chunk1 chunk2");
    }

    #[tokio::test]
    async fn release_reports_cleanup_errors_but_attempts_both() {
        let mock = MockExchange::new();
        mock.push_ok(shell_created("S-1"));
        mock.push_ok(command_started("C-1"));
        mock.push_ok(receive_done(0));
        mock.push_err(WsmanError::Fault("HTTP 500".into())); // signal fails
        mock.push_err(WsmanError::Fault("HTTP 500".into())); // delete fails

        let p = params();
        let mut session = ShellSession::new(&mock, &p);
        session.open().await.unwrap();
        session.run("x").await.unwrap();
        let mut collector = OutputCollector::new();
        session.collect(&mut collector).await.unwrap();

        let errors = session.release().await;
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, WsmanError::Cleanup(_))));
        assert_eq!(session.state(), SessionState::Closed);

        // Both cleanup steps were attempted despite the failures.
        let sent = mock.sent();
        assert_eq!(count_action(&sent, "shell/Signal"), 1);
        assert_eq!(count_action(&sent, "transfer/Delete"), 1);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let mock = MockExchange::new();
        mock.push_ok(shell_created("S-1"));
        mock.push_ok(empty_ok()); // delete

        let p = params();
        let mut session = ShellSession::new(&mock, &p);
        session.open().await.unwrap();

        assert!(session.release().await.is_empty());
        assert!(session.release().await.is_empty());
        assert_eq!(count_action(&mock.sent(), "transfer/Delete"), 1);
    }

    #[tokio::test]
    async fn run_without_open_is_rejected() {
        let mock = MockExchange::new();
        let p = params();
        let mut session = ShellSession::new(&mock, &p);
        let err = session.run("echo hi").await.unwrap_err();
        assert!(matches!(err, WsmanError::CommandSubmit(_)));
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn reopen_is_rejected() {
        let mock = MockExchange::new();
        mock.push_ok(shell_created("S-1"));

        let p = params();
        let mut session = ShellSession::new(&mock, &p);
        session.open().await.unwrap();
        let err = session.open().await.unwrap_err();
        assert!(matches!(err, WsmanError::ShellOpen(_)));
    }

    #[tokio::test]
    async fn timeout_mid_poll_keeps_identity() {
        let mock = MockExchange::new();
        mock.push_ok(shell_created("S-1"));
        mock.push_ok(command_started("C-1"));
        mock.push_err(WsmanError::Timeout);

        let p = params();
        let mut session = ShellSession::new(&mock, &p);
        session.open().await.unwrap();
        session.run("slow").await.unwrap();

        let mut collector = OutputCollector::new();
        let err = session.collect(&mut collector).await.unwrap_err();
        assert!(matches!(err, WsmanError::Timeout));
    }
}
