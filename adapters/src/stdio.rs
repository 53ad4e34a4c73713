//! This process's own stdin/stdout as a transport — useful when the
//! engine itself is run as the subprocess another tool talks to.

use tokio::io::{self, Join, Stdin, Stdout};

/// This process's stdin (read half) joined with its stdout (write half)
/// into a single `AsyncRead + AsyncWrite` transport.
pub fn stdio_transport() -> Join<Stdin, Stdout> {
    io::join(io::stdin(), io::stdout())
}
