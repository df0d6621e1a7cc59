use thiserror::Error;

/// Errors produced by the WS-Management client layers.
///
/// Each variant marks the stage at which an operation failed, so the
/// caller can tell a refused connection from a refused shell, and a
/// mid-poll transport failure from a cleanup hiccup. `Cleanup` errors
/// are recorded as secondary diagnostics and never replace a primary
/// result.
#[derive(Debug, Error)]
pub enum WsmanError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("shell open failed: {0}")]
    ShellOpen(String),

    #[error("command submit failed: {0}")]
    CommandSubmit(String),

    #[error("output collection failed: {0}")]
    OutputCollection(String),

    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error("malformed server response: {0}")]
    Envelope(String),

    #[error("wsman fault: {0}")]
    Fault(String),

    #[error("operation timed out")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WsmanError {
    /// Reclassify a transport-level `Fault` into the stage-specific
    /// variant produced by `wrap`. Network-level errors (`Connection`,
    /// `Timeout`) keep their identity.
    pub fn at_stage(self, wrap: fn(String) -> WsmanError) -> WsmanError {
        match self {
            WsmanError::Fault(msg) | WsmanError::Envelope(msg) => wrap(msg),
            other => other,
        }
    }
}

pub type WsmanResult<T> = Result<T, WsmanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_reclassified_to_stage() {
        let e = WsmanError::Fault("500 oops".into()).at_stage(WsmanError::ShellOpen);
        assert!(matches!(e, WsmanError::ShellOpen(_)));
    }

    #[test]
    fn connection_error_keeps_identity() {
        let e = WsmanError::Connection("refused".into()).at_stage(WsmanError::CommandSubmit);
        assert!(matches!(e, WsmanError::Connection(_)));
    }
}
