//! Runs the debug target as a child process and exposes its stdio pipe as
//! a transport — a target reached by subprocess plumbing rather than a
//! physical link.

use std::io;
use std::process::Stdio;
use tokio::io::Join;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Spawns `command` with piped stdin/stdout, returning the running child
/// (so the caller can wait on it or kill it) and the joined pipe pair as a
/// single transport.
pub fn spawn_process(mut command: Command) -> io::Result<(Child, Join<ChildStdout, ChildStdin>)> {
    command.stdin(Stdio::piped()).stdout(Stdio::piped());
    let mut child = command.spawn()?;
    let stdout = child.stdout.take().expect("stdout was requested as piped");
    let stdin = child.stdin.take().expect("stdin was requested as piped");
    Ok((child, tokio::io::join(stdout, stdin)))
}
