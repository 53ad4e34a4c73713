//! Pumps bytes between an owned transport and the bottom of a [`Stack`].
//!
//! The chain is exclusive-access: at most one `encode` and one `decode`
//! in flight at a time. Rather than
//! giving the adapter sole ownership of the stack (which would leave the
//! bridge crate's request/reply handler and timeout scheduler with no way
//! to call `encode`/`timeout`), `spawn` wraps the stack in a `tokio::sync::
//! Mutex` and hands the shared handle back to the caller — every caller
//! that wants to drive the stack (reader task here, bridge, scheduler)
//! takes the same lock, so at most one of them is inside the chain at once.

use dbgstack_core::error::TransportError;
use dbgstack_core::{Message, Stack};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Owns the reader/writer tasks pumping bytes between a transport and a
/// stack.
pub struct Adapter {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Adapter {
    /// Spawns the reader and writer tasks for `transport` against `stack`,
    /// returning the adapter handle plus the shared, lockable stack so a
    /// bridge and scheduler can drive `encode`/`timeout` on the same
    /// instance.
    ///
    /// `boot_drop` is the boot-noise window: inbound bytes
    /// received before it elapses are discarded rather than decoded, and
    /// outbound bytes the stack produces during that window are held and
    /// flushed once it elapses, rather than going out over a transport
    /// that's still spewing a reset banner. Pass [`Duration::ZERO`] to
    /// disable both behaviors.
    pub fn spawn<T>(transport: T, mut stack: Stack, boot_drop: Duration) -> (Self, Arc<Mutex<Stack>>)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let (down_tx, down_rx) = mpsc::unbounded_channel::<Message>();

        stack.set_down(move |data| {
            let _ = down_tx.send(data);
        });
        let stack = Arc::new(Mutex::new(stack));

        let writer = tokio::spawn(writer_loop(write_half, down_rx, boot_drop));
        let reader = tokio::spawn(reader_loop(read_half, stack.clone(), boot_drop));

        (Self { reader, writer }, stack)
    }

    /// Waits for both the reader and writer tasks to finish, which happens
    /// exactly once, at transport EOF or a read/write error.
    pub async fn join(self) -> TransportError {
        let _ = self.reader.await;
        let _ = self.writer.await;
        TransportError::Disconnected
    }
}

async fn reader_loop<R: AsyncRead + Unpin>(
    mut read_half: R,
    stack: Arc<Mutex<Stack>>,
    boot_drop: Duration,
) {
    let deadline = tokio::time::Instant::now() + boot_drop;
    let mut buf = [0u8; 4096];
    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("adapter transport reached EOF");
                break;
            }
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(%err, "adapter transport read error");
                break;
            }
        };
        if tokio::time::Instant::now() < deadline {
            tracing::trace!(bytes = n, "dropping inbound boot noise");
            continue;
        }
        let data = Message::new(buf[..n].to_vec());
        stack.lock().await.decode(data);
    }
    stack.lock().await.close();
}

async fn writer_loop<W: AsyncWrite + Unpin>(
    mut write_half: W,
    mut down_rx: mpsc::UnboundedReceiver<Message>,
    boot_drop: Duration,
) {
    if boot_drop.is_zero() {
        while let Some(message) = down_rx.recv().await {
            if write_bytes(&mut write_half, &message).await.is_err() {
                return;
            }
        }
        return;
    }

    let sleep = tokio::time::sleep(boot_drop);
    tokio::pin!(sleep);
    let mut held = Vec::new();

    loop {
        tokio::select! {
            () = &mut sleep, if !sleep.is_elapsed() => {
                tracing::debug!(held = held.len(), "boot window elapsed, flushing held frames");
                for message in held.drain(..) {
                    if write_bytes(&mut write_half, &message).await.is_err() {
                        return;
                    }
                }
            }
            received = down_rx.recv() => {
                match received {
                    None => return,
                    Some(message) if !sleep.is_elapsed() => held.push(message),
                    Some(message) => {
                        if write_bytes(&mut write_half, &message).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn write_bytes<W: AsyncWrite + Unpin>(write_half: &mut W, message: &Message) -> std::io::Result<()> {
    write_half.write_all(&message.to_vec()).await?;
    write_half.flush().await
}
