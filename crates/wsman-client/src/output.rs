//! Accumulation of command output across Receive polls.
//!
//! Bytes are appended in arrival order within each stream; nothing is
//! reordered across polls. The finished output only becomes available
//! once the server has reported command completion — until then only
//! the partial form can be extracted, for attaching to errors.

use wsman_core::envelope::ReceiveChunk;

/// Output of a completed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

/// Output gathered before a failure interrupted collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Accumulates stdout/stderr bytes and the eventual exit status.
#[derive(Debug, Default)]
pub struct OutputCollector {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
    done: bool,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one Receive response into the accumulated state.
    pub fn absorb(&mut self, chunk: ReceiveChunk) {
        self.stdout.extend_from_slice(&chunk.stdout);
        self.stderr.extend_from_slice(&chunk.stderr);
        if let Some(code) = chunk.exit_code {
            self.exit_code = Some(code);
        }
        if chunk.done {
            self.done = true;
        }
    }

    /// Whether the server has reported the command finished.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The completed output, or the partial bytes back if the command
    /// never signalled completion.
    pub fn finish(self) -> Result<ExecOutput, PartialOutput> {
        if !self.done {
            return Err(self.into_partial());
        }
        Ok(ExecOutput {
            stdout: self.stdout,
            stderr: self.stderr,
            // Servers that omit the exit code on a Done state are
            // treated as reporting success.
            exit_code: self.exit_code.unwrap_or(0),
        })
    }

    /// Surrender whatever has been collected, completion or not.
    pub fn into_partial(self) -> PartialOutput {
        PartialOutput {
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}
