//! Command encoding for remote execution.
//!
//! A command arrives either as a full command line or as an ordered
//! token list, and is optionally rewritten into the encoded form that
//! `powershell.exe` accepts non-interactively: the command line is
//! prefixed with a progress-suppression directive, encoded as
//! UTF-16LE, base64'd, and wrapped in an `-EncodedCommand` invocation.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

/// Directive prepended in restricted mode so progress records don't
/// pollute the error stream.
const PROGRESS_SUPPRESS: &str = "$ProgressPreference = \"SilentlyContinue\"; ";

/// A command to run remotely: either a literal command line or an
/// ordered list of tokens joined with single spaces.
///
/// Tokens are not quoted or escaped — that is the caller's
/// responsibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandInput {
    Raw(String),
    Tokens(Vec<String>),
}

impl CommandInput {
    /// The literal command line before any restricted-mode rewriting.
    pub fn command_line(&self) -> String {
        match self {
            CommandInput::Raw(s) => s.clone(),
            CommandInput::Tokens(tokens) => tokens.join(" "),
        }
    }
}

impl From<&str> for CommandInput {
    fn from(s: &str) -> Self {
        CommandInput::Raw(s.to_string())
    }
}

impl From<Vec<String>> for CommandInput {
    fn from(tokens: Vec<String>) -> Self {
        CommandInput::Tokens(tokens)
    }
}

/// Produce the literal string to submit to the remote shell.
///
/// With `restricted` unset this is the identity transform on the
/// joined command line. With it set, the command is wrapped for the
/// restricted PowerShell host. Pure and deterministic.
pub fn encode(input: &CommandInput, restricted: bool) -> String {
    let command = input.command_line();
    if !restricted {
        return command;
    }

    let script = format!("{PROGRESS_SUPPRESS}{command}");
    let b64 = BASE64_STANDARD.encode(utf16le_bytes(&script));
    format!(
        "powershell.exe -ExecutionPolicy RemoteSigned -NonInteractive -EncodedCommand {b64}"
    )
}

/// Encode a string as UTF-16LE bytes (the encoding `-EncodedCommand`
/// expects under the base64).
fn utf16le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}
