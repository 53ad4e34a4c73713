//! Parses the command line arguments and initializes logging.
//!
//! Basic usage, talking to a target over a serial port:
//!
//! ```text
//! dbgstackd --stack ascii,term,arq,segment=512,crc16 serial /dev/ttyUSB0
//! ```
//!
//! or against a target run as a subprocess, with debug output to stdout:
//!
//! ```text
//! dbgstackd --log process -- ./target-under-test --debug-stdio
//! ```

use clap::{Parser, Subcommand};

/// Stores the command line arguments.
#[derive(Parser)]
#[command(name = "dbgstackd", about = "Embedded Debugger protocol stack bridge")]
pub struct Args {
    /// Stack description, top-down: `layer[=arg](,layer[=arg])*`.
    #[arg(short, long, default_value = "ascii,term,arq,segment=512,crc16")]
    pub stack: String,

    /// Bridge bind address; `*` binds every interface.
    #[arg(long, default_value = "*")]
    pub addr: String,

    /// Bridge listen port.
    #[arg(short, long, default_value_t = dbgstack_bridge::DEFAULT_PORT)]
    pub port: u16,

    /// Retransmit / activity-timeout interval, in seconds.
    #[arg(long, default_value_t = 1.0)]
    pub timeout: f64,

    /// Boot-noise suppression window, in seconds. 0 disables it.
    #[arg(long, default_value_t = 0.0)]
    pub boot_drop: f64,

    /// Per-request deadline on the bridge, in seconds. 0 disables it, so a
    /// request waits on its reply for as long as the stack below keeps
    /// retransmitting.
    #[arg(long, default_value_t = 0.0)]
    pub request_deadline: f64,

    /// Enable debug-level logging to stdout.
    #[arg(short, long)]
    pub log: bool,

    #[command(subcommand)]
    pub transport: Transport,
}

/// Which byte-stream transport the bottom of the stack talks to.
#[derive(Subcommand)]
pub enum Transport {
    /// This process's own stdin/stdout.
    Stdio,
    /// A physical serial port.
    Serial {
        path: String,
        #[arg(long, default_value_t = 115_200)]
        baud: u32,
    },
    /// A child process's stdio pipe.
    Process {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// Initializes the global `tracing` subscriber. Only called once, before
/// any layer/bridge/adapter activity, so every `tracing::debug!`/`error!`
/// emitted by the stack engine lands on stdout.
pub fn initialize_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .without_time()
        .init();
}
