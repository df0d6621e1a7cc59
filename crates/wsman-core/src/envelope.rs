//! WS-Management SOAP envelope construction and response parsing.
//!
//! Covers the subset of WS-Man the client needs against the
//! windows/shell resource: Identify, Create (shell), Command, Receive,
//! Signal (terminate), and Delete (shell). Responses are parsed by
//! tag scanning; stream payloads arrive base64-encoded and are decoded
//! to raw bytes here.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use uuid::Uuid;

use crate::error::{WsmanError, WsmanResult};

const SOAP_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const WSA_NS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
const WSMAN_NS: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
const SHELL_NS: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell";

const ANONYMOUS_ADDRESS: &str =
    "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

/// Resource URI for the cmd shell processor.
pub const SHELL_RESOURCE_URI: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";

const ACTION_GET: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Get";
const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
const ACTION_COMMAND: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
const ACTION_RECEIVE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
const ACTION_SIGNAL: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal";

const SIGNAL_TERMINATE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";
const COMMAND_STATE_DONE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done";

/// One Receive response: decoded stream bytes, plus the exit status
/// once the server reports the command finished.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiveChunk {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub done: bool,
}

/// Builds the SOAP envelopes for one endpoint.
///
/// Every envelope gets a fresh `uuid:` MessageID. The operation
/// timeout is advertised to the server in ISO-8601 duration form.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    endpoint: String,
    max_envelope_size: u32,
    operation_timeout_secs: u64,
}

impl EnvelopeBuilder {
    pub fn new(endpoint: &str, max_envelope_size: u32, operation_timeout_secs: u64) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            max_envelope_size,
            operation_timeout_secs,
        }
    }

    fn header(&self, action: &str, resource_uri: &str, selector: Option<&str>) -> String {
        let selector_set = match selector {
            Some(shell_id) => format!(
                "\n    <w:SelectorSet>\n      <w:Selector Name=\"ShellId\">{}</w:Selector>\n    </w:SelectorSet>",
                xml_escape(shell_id)
            ),
            None => String::new(),
        };

        format!(
            r#"<s:Header>
    <a:To>{}</a:To>
    <w:ResourceURI s:mustUnderstand="true">{}</w:ResourceURI>
    <a:ReplyTo>
      <a:Address s:mustUnderstand="true">{ANONYMOUS_ADDRESS}</a:Address>
    </a:ReplyTo>
    <a:Action s:mustUnderstand="true">{}</a:Action>
    <a:MessageID>uuid:{}</a:MessageID>
    <w:MaxEnvelopeSize s:mustUnderstand="true">{}</w:MaxEnvelopeSize>
    <w:OperationTimeout>PT{}S</w:OperationTimeout>{}
  </s:Header>"#,
            xml_escape(&self.endpoint),
            resource_uri,
            action,
            Uuid::new_v4(),
            self.max_envelope_size,
            self.operation_timeout_secs,
            selector_set,
        )
    }

    fn envelope(&self, header: String, body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <s:Envelope xmlns:s=\"{SOAP_ENV_NS}\" xmlns:a=\"{WSA_NS}\" \
             xmlns:w=\"{WSMAN_NS}\" xmlns:rsp=\"{SHELL_NS}\">\n  {header}\n  {body}\n</s:Envelope>"
        )
    }

    /// Probe envelope used to verify reachability and credentials
    /// before any shell state exists on the server.
    pub fn identify(&self) -> String {
        let header = self.header(
            ACTION_GET,
            "http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/*",
            None,
        );
        self.envelope(header, "<s:Body/>")
    }

    /// Request a new remote shell with stdout/stderr output streams.
    pub fn create_shell(&self) -> String {
        let header = self.header(ACTION_CREATE, SHELL_RESOURCE_URI, None);
        let body = "<s:Body>\n    <rsp:Shell>\n      <rsp:InputStreams>stdin</rsp:InputStreams>\n      <rsp:OutputStreams>stdout stderr</rsp:OutputStreams>\n    </rsp:Shell>\n  </s:Body>";
        self.envelope(header, body)
    }

    /// Submit a command line under an open shell.
    pub fn command(&self, shell_id: &str, command: &str) -> String {
        let header = self.header(ACTION_COMMAND, SHELL_RESOURCE_URI, Some(shell_id));
        let body = format!(
            "<s:Body>\n    <rsp:CommandLine>\n      <rsp:Command>{}</rsp:Command>\n    </rsp:CommandLine>\n  </s:Body>",
            xml_escape(command)
        );
        self.envelope(header, &body)
    }

    /// Poll for the next chunk of stdout/stderr for a running command.
    pub fn receive(&self, shell_id: &str, command_id: &str) -> String {
        let header = self.header(ACTION_RECEIVE, SHELL_RESOURCE_URI, Some(shell_id));
        let body = format!(
            "<s:Body>\n    <rsp:Receive>\n      <rsp:DesiredStream CommandId=\"{}\">stdout stderr</rsp:DesiredStream>\n    </rsp:Receive>\n  </s:Body>",
            xml_escape(command_id)
        );
        self.envelope(header, &body)
    }

    /// Signal a finished command so the server releases its resources.
    pub fn signal_terminate(&self, shell_id: &str, command_id: &str) -> String {
        let header = self.header(ACTION_SIGNAL, SHELL_RESOURCE_URI, Some(shell_id));
        let body = format!(
            "<s:Body>\n    <rsp:Signal CommandId=\"{}\">\n      <rsp:Code>{SIGNAL_TERMINATE}</rsp:Code>\n    </rsp:Signal>\n  </s:Body>",
            xml_escape(command_id)
        );
        self.envelope(header, &body)
    }

    /// Delete the shell itself.
    pub fn delete_shell(&self, shell_id: &str) -> String {
        let header = self.header(ACTION_DELETE, SHELL_RESOURCE_URI, Some(shell_id));
        self.envelope(header, "<s:Body/>")
    }
}

/// Extract the ShellId from a Create response.
pub fn extract_shell_id(response: &str) -> WsmanResult<String> {
    if let Some(id) = extract_between(response, "<rsp:ShellId>", "</rsp:ShellId>") {
        return Ok(id.to_string());
    }
    // Some servers only echo the ID back as a selector.
    if let Some(rest) = response.split("Selector Name=\"ShellId\">").nth(1) {
        if let Some(end) = rest.find("</") {
            return Ok(rest[..end].to_string());
        }
    }
    Err(WsmanError::Envelope(
        "create response carried no ShellId".into(),
    ))
}

/// Extract the CommandId from a Command response.
pub fn extract_command_id(response: &str) -> WsmanResult<String> {
    extract_between(response, "<rsp:CommandId>", "</rsp:CommandId>")
        .map(str::to_string)
        .ok_or_else(|| WsmanError::Envelope("command response carried no CommandId".into()))
}

/// Parse a Receive response into decoded stream bytes plus completion
/// state. Stream elements are appended in document order, preserving
/// the server's interleaving within each stream.
pub fn parse_receive(response: &str) -> WsmanResult<ReceiveChunk> {
    let mut chunk = ReceiveChunk {
        done: response.contains(COMMAND_STATE_DONE),
        ..Default::default()
    };

    for (name, payload) in stream_elements(response) {
        let decoded = BASE64_STANDARD.decode(payload.trim()).map_err(|e| {
            WsmanError::Envelope(format!("invalid base64 in {name} stream: {e}"))
        })?;
        match name {
            "stdout" => chunk.stdout.extend_from_slice(&decoded),
            "stderr" => chunk.stderr.extend_from_slice(&decoded),
            _ => {}
        }
    }

    if let Some(code) = extract_between(response, "<rsp:ExitCode>", "</rsp:ExitCode>") {
        let parsed = code.trim().parse::<i32>().map_err(|_| {
            WsmanError::Envelope(format!("unparsable exit code: {code:?}"))
        })?;
        chunk.exit_code = Some(parsed);
    }

    Ok(chunk)
}

/// Iterate `<rsp:Stream Name="...">payload</rsp:Stream>` elements in
/// document order, skipping self-closing (empty) elements.
fn stream_elements(response: &str) -> impl Iterator<Item = (&str, &str)> {
    let mut rest = response;
    std::iter::from_fn(move || {
        loop {
            let start = rest.find("<rsp:Stream ")?;
            let tag_rest = &rest[start..];
            let tag_end = tag_rest.find('>')?;
            let tag = &tag_rest[..tag_end + 1];

            let name = extract_between(tag, "Name=\"", "\"").unwrap_or("");
            let is_stdout_or_err = name == "stdout" || name == "stderr";

            if tag.ends_with("/>") {
                // Self-closing stream element: no payload.
                rest = &tag_rest[tag_end + 1..];
                continue;
            }

            let content = &tag_rest[tag_end + 1..];
            let close = content.find("</rsp:Stream>")?;
            let payload = &content[..close];
            rest = &content[close + "</rsp:Stream>".len()..];

            if is_stdout_or_err {
                return Some((name, payload));
            }
        }
    })
}

fn extract_between<'a>(haystack: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = haystack.find(open)? + open.len();
    let end = haystack[start..].find(close)?;
    Some(&haystack[start..start + end])
}

/// Escape text for inclusion in XML element content or attributes.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
