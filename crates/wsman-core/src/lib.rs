//! wsman-core: Shared protocol library for the WS-Management client.
//!
//! Provides SOAP envelope construction and response parsing for the
//! windows/shell resource, the command encoder (including the encoded
//! PowerShell invocation form), and the error taxonomy shared by the
//! client and CLI crates. This crate performs no network I/O.

pub mod command;
pub mod envelope;
pub mod error;

// Re-export commonly used items at crate root.
pub use command::{encode, CommandInput};
pub use envelope::{EnvelopeBuilder, ReceiveChunk};
pub use error::{WsmanError, WsmanResult};
