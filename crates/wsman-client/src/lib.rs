//! wsman-client: WS-Management remote command execution client.
//!
//! Connects to a WS-Man endpoint over plaintext basic-auth HTTP or
//! certificate-authenticated HTTPS, opens a remote shell, runs one
//! command, collects its stdout/stderr streams and exit status, and
//! releases the shell and command resources on every exit path.
//!
//! # Quick Start
//!
//! ```no_run
//! use wsman_client::{execute, ConnectionParams, TransportMode};
//! use wsman_core::CommandInput;
//!
//! # async fn example() {
//! let mut params = ConnectionParams::new("http://host:5985/wsman", TransportMode::Plaintext);
//! params.username = Some("admin".into());
//! params.password = Some("secret".into());
//!
//! match execute(&params, &CommandInput::Raw("ipconfig /all".into()), false).await {
//!     Ok(result) => println!("exit {}", result.exit_code),
//!     Err(failure) => eprintln!("failed: {}", failure.error),
//! }
//! # }
//! ```

pub mod client;
pub mod config;
pub mod output;
pub mod session;
pub mod transport;

// Re-export primary public types.
pub use client::{execute, execute_over, ExecFailure, ExecResult};
pub use config::{ConnectionParams, TransportMode, DEFAULT_TIMEOUT};
pub use output::{ExecOutput, OutputCollector, PartialOutput};
pub use session::{CommandHandle, SessionState, ShellHandle, ShellSession};
pub use transport::{Exchange, HttpTransport};

// Re-export wsman-core error types for convenience.
pub use wsman_core::{WsmanError, WsmanResult};
