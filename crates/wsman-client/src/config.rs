//! Connection parameters for one client invocation.
//!
//! Immutable once constructed and validated; owned by a single
//! `execute` call. The long default timeout exists because remote
//! commands routinely outlive ordinary network timeouts.

use std::path::PathBuf;
use std::time::Duration;

use wsman_core::{WsmanError, WsmanResult};

/// Default per-operation timeout (one hour). A field on the params
/// rather than process-wide state, so concurrent invocations with
/// different timeouts cannot interfere.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default WS-Man MaxEnvelopeSize advertised to the server.
pub const DEFAULT_MAX_ENVELOPE_SIZE: u32 = 153600;

/// How the transport authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Username/password basic auth over an unencrypted channel.
    /// Transport security, if any, is the caller's responsibility.
    Plaintext,
    /// Mutual TLS with a client certificate/key pair; no credential
    /// exchange on the wire.
    Certificate,
}

/// Parameters for connecting to a WS-Man endpoint.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Endpoint URL, e.g. `http://host:5985/wsman`.
    pub endpoint: String,
    pub transport: TransportMode,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cert_pem_path: Option<PathBuf>,
    pub cert_key_pem_path: Option<PathBuf>,
    /// Applied to every request issued under these params.
    pub timeout: Duration,
    pub max_envelope_size: u32,
}

impl ConnectionParams {
    pub fn new(endpoint: impl Into<String>, transport: TransportMode) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            username: None,
            password: None,
            cert_pem_path: None,
            cert_key_pem_path: None,
            timeout: DEFAULT_TIMEOUT,
            max_envelope_size: DEFAULT_MAX_ENVELOPE_SIZE,
        }
    }

    /// Whether both halves of the certificate pair are present.
    pub fn has_cert_pair(&self) -> bool {
        self.cert_pem_path.is_some() && self.cert_key_pem_path.is_some()
    }

    /// Check the parameter invariants before any network I/O.
    ///
    /// `Certificate` mode requires both certificate fields. `Plaintext`
    /// mode requires a username and either a password or a full
    /// certificate pair to fall back on.
    pub fn validate(&self) -> WsmanResult<()> {
        if self.endpoint.is_empty() {
            return Err(WsmanError::Config("endpoint URL is required".into()));
        }

        match self.transport {
            TransportMode::Certificate => {
                if !self.has_cert_pair() {
                    return Err(WsmanError::Config(
                        "certificate transport requires both a certificate and a key path".into(),
                    ));
                }
            }
            TransportMode::Plaintext => {
                if self.username.is_none() {
                    return Err(WsmanError::Config(
                        "plaintext transport requires a username".into(),
                    ));
                }
                if self.password.is_none() && !self.has_cert_pair() {
                    return Err(WsmanError::Config(
                        "plaintext transport requires a password or a certificate pair".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_mode_needs_both_halves() {
        let mut params =
            ConnectionParams::new("https://host:5986/wsman", TransportMode::Certificate);
        params.cert_pem_path = Some("client.pem".into());
        let err = params.validate().unwrap_err();
        assert!(matches!(err, WsmanError::Config(_)));

        params.cert_key_pem_path = Some("client.key".into());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn plaintext_mode_needs_username() {
        let mut params = ConnectionParams::new("http://host:5985/wsman", TransportMode::Plaintext);
        params.password = Some("pw".into());
        assert!(matches!(
            params.validate(),
            Err(WsmanError::Config(_))
        ));
    }

    #[test]
    fn plaintext_password_or_cert_pair() {
        let mut params = ConnectionParams::new("http://host:5985/wsman", TransportMode::Plaintext);
        params.username = Some("admin".into());
        assert!(params.validate().is_err());

        params.password = Some("pw".into());
        assert!(params.validate().is_ok());

        params.password = None;
        params.cert_pem_path = Some("client.pem".into());
        params.cert_key_pem_path = Some("client.key".into());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn empty_endpoint_rejected() {
        let params = ConnectionParams::new("", TransportMode::Plaintext);
        assert!(matches!(params.validate(), Err(WsmanError::Config(_))));
    }

    #[test]
    fn default_timeout_is_one_hour() {
        let params = ConnectionParams::new("http://host:5985/wsman", TransportMode::Plaintext);
        assert_eq!(params.timeout, Duration::from_secs(3600));
    }
}
