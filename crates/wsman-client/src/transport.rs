//! HTTP transport for SOAP envelope exchange.
//!
//! The session layer only sees the `Exchange` capability: submit one
//! envelope, get one response body back. The concrete transport posts
//! to the WS-Man endpoint with either basic auth (plaintext mode) or a
//! TLS client identity (certificate mode).

use reqwest::StatusCode;
use tracing::debug;

use wsman_core::envelope::EnvelopeBuilder;
use wsman_core::{WsmanError, WsmanResult};

use crate::config::{ConnectionParams, TransportMode};

/// Longest response-body excerpt carried inside an error message.
const FAULT_SNIPPET_LEN: usize = 512;

/// A request/response exchange against a WS-Man endpoint.
///
/// Implemented by `HttpTransport` for real use; tests drive the
/// session layer through scripted implementations.
#[allow(async_fn_in_trait)]
pub trait Exchange {
    /// Submit one SOAP envelope and return the response body.
    async fn exchange(&self, envelope: String) -> WsmanResult<String>;
}

/// Transport bound to one endpoint with one authentication mode.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    basic_auth: Option<(String, Option<String>)>,
}

impl HttpTransport {
    /// Build the transport from validated parameters and verify the
    /// endpoint is reachable and accepts our credentials.
    ///
    /// The probe is a WS-Man Get against the CIM schema resource; it
    /// touches no shell state, so a failure here leaves nothing to
    /// clean up. Failures are not retried.
    pub async fn connect(params: &ConnectionParams) -> WsmanResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(params.timeout);

        let use_identity = match params.transport {
            TransportMode::Certificate => true,
            // Plaintext falls back to the certificate pair when no
            // password was supplied.
            TransportMode::Plaintext => params.password.is_none() && params.has_cert_pair(),
        };

        if use_identity {
            builder = builder
                .use_rustls_tls()
                .identity(load_identity(params)?);
        }

        let client = builder.build().map_err(|e| {
            WsmanError::Connection(format!("failed to build HTTP client: {e}"))
        })?;

        let basic_auth = match params.transport {
            TransportMode::Plaintext => params
                .username
                .clone()
                .map(|user| (user, params.password.clone())),
            TransportMode::Certificate => None,
        };

        let transport = Self {
            client,
            endpoint: params.endpoint.clone(),
            basic_auth,
        };

        let probe = EnvelopeBuilder::new(
            &params.endpoint,
            params.max_envelope_size,
            params.timeout.as_secs(),
        )
        .identify();
        transport
            .exchange(probe)
            .await
            .map_err(|e| e.at_stage(WsmanError::Connection))?;

        debug!(endpoint = %params.endpoint, "wsman endpoint reachable");
        Ok(transport)
    }
}

/// Load the client certificate/key pair as a single PEM identity.
fn load_identity(params: &ConnectionParams) -> WsmanResult<reqwest::Identity> {
    let (cert, key) = match (&params.cert_pem_path, &params.cert_key_pem_path) {
        (Some(cert), Some(key)) => (cert, key),
        _ => {
            return Err(WsmanError::Config(
                "certificate transport requires both a certificate and a key path".into(),
            ))
        }
    };

    let mut pem = std::fs::read(cert).map_err(|e| {
        WsmanError::Config(format!("cannot read certificate {}: {e}", cert.display()))
    })?;
    pem.extend(std::fs::read(key).map_err(|e| {
        WsmanError::Config(format!("cannot read certificate key {}: {e}", key.display()))
    })?);

    reqwest::Identity::from_pem(&pem)
        .map_err(|e| WsmanError::Config(format!("invalid certificate pair: {e}")))
}

impl Exchange for HttpTransport {
    async fn exchange(&self, envelope: String) -> WsmanResult<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/soap+xml;charset=UTF-8")
            .body(envelope);

        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, password.as_deref());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                WsmanError::Timeout
            } else {
                WsmanError::Connection(format!("request to {} failed: {e}", self.endpoint))
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(WsmanError::Connection(format!(
                "authentication rejected by {} (HTTP {status})",
                self.endpoint
            )));
        }

        let body = response.text().await.map_err(|e| {
            WsmanError::Connection(format!("failed to read response body: {e}"))
        })?;

        if !status.is_success() {
            let snippet: String = body.chars().take(FAULT_SNIPPET_LEN).collect();
            return Err(WsmanError::Fault(format!("HTTP {status}: {snippet}")));
        }

        Ok(body)
    }
}
