//! wsman — remote command execution over WS-Management.
//!
//! Runs one command on a remote host through an authenticated shell
//! session, forwards its stdout/stderr, and exits with the remote
//! command's exit code. Client-side failures exit with a distinct
//! code so callers can tell "remote command failed" from "could not
//! run it at all".

use std::io::Write;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use tracing::{error, warn};

use wsman_client::{execute, ConnectionParams, TransportMode};
use wsman_core::CommandInput;

/// Process exit code for failures of the client itself, as opposed to
/// a nonzero exit of the remote command.
const EXIT_CLIENT_FAILURE: i32 = 255;

/// wsman — WS-Management remote command client
#[derive(Parser)]
#[command(
    name = "wsman",
    version,
    about = "Run a command on a remote host over WS-Management"
)]
struct Cli {
    /// Endpoint URL, e.g. http://host:5985/wsman
    #[arg(short = 'U', long = "url")]
    url: String,

    /// Username for basic authentication
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Password for basic authentication
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Client certificate PEM path (enables certificate transport
    /// when the key is also given)
    #[arg(short = 'k', long = "cert")]
    cert_pem: Option<PathBuf>,

    /// Client certificate key PEM path
    #[arg(short = 'K', long = "cert-key")]
    cert_key_pem: Option<PathBuf>,

    /// Wrap the command for the restricted PowerShell host
    /// (-EncodedCommand)
    #[arg(short = 'P', long = "powershell")]
    powershell: bool,

    /// Per-operation timeout in seconds
    #[arg(long, default_value_t = 3600)]
    timeout: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Command and its arguments to run remotely
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("wsman=debug,wsman_cli=debug,wsman_client=debug,wsman_core=debug")
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("wsman=warn,wsman_cli=warn")
            .with_target(false)
            .init();
    }

    match run(cli).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("{e:#}");
            eprintln!("wsman: {e:#}");
            std::process::exit(EXIT_CLIENT_FAILURE);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let params = build_params(&cli);
    let input = CommandInput::Tokens(cli.command);

    match execute(&params, &input, cli.powershell).await {
        Ok(result) => {
            for err in &result.cleanup_errors {
                warn!("{err}");
            }
            forward(&result.stdout, &result.stderr);
            Ok(result.exit_code)
        }
        Err(failure) => {
            for err in &failure.cleanup_errors {
                warn!("{err}");
            }
            if let Some(partial) = &failure.partial {
                forward(&partial.stdout, &partial.stderr);
            }
            Err(anyhow!(failure.error))
        }
    }
}

/// Derive connection parameters from the flags. A full certificate
/// pair selects certificate transport; otherwise plaintext.
fn build_params(cli: &Cli) -> ConnectionParams {
    let have_certs = cli.cert_pem.is_some() && cli.cert_key_pem.is_some();
    let mode = if have_certs {
        TransportMode::Certificate
    } else {
        TransportMode::Plaintext
    };

    if have_certs && cli.url.starts_with("http://") {
        warn!("certificate transport over a non-TLS endpoint URL");
    }

    let mut params = ConnectionParams::new(cli.url.clone(), mode);
    params.username = cli.username.clone();
    params.password = cli.password.clone();
    params.cert_pem_path = cli.cert_pem.clone();
    params.cert_key_pem_path = cli.cert_key_pem.clone();
    params.timeout = std::time::Duration::from_secs(cli.timeout);
    params
}

/// Forward collected remote streams to our own, stderr first as the
/// remote command's diagnostics, then stdout.
fn forward(stdout: &[u8], stderr: &[u8]) {
    let _ = std::io::stderr().write_all(stderr);
    let _ = std::io::stdout().write_all(stdout);
    let _ = std::io::stdout().flush();
}
