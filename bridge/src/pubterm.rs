//! The `pubterm` layer variant is a sibling PUB socket
//! that republishes every non-debug byte the `term` layer would otherwise
//! send to stdout/stderr, so external tooling (a log viewer, a second
//! terminal) can tail a target's ordinary console output.
//!
//! The Python original uses a genuine ZeroMQ PUB socket; neither this
//! crate's teacher nor any other example in the pack depends on a
//! message-queue crate, so this is a plain TCP broadcast: any number of
//! clients may connect to the side-channel port and each receives its own
//! copy of every published chunk, fed from a `tokio::sync::broadcast`
//! channel (see `SPEC_FULL.md`'s "Supplemented features").

use dbgstack_core::error::StackBuildError;
use dbgstack_core::layers::terminal::TerminalLayer;
use dbgstack_core::{Layer, LayerRegistry};
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// The broadcast side-channel a `pubterm` layer's non-debug bytes are fed
/// into, plus the TCP server that republishes them to connected clients.
#[derive(Clone)]
pub struct PubTerminal {
    tx: broadcast::Sender<Vec<u8>>,
}

impl PubTerminal {
    /// Creates the broadcast channel the `pubterm` layer constructor
    /// closure below will wire every `TerminalLayer` instance into. This
    /// exists independently of the TCP listener so the registry entry and
    /// the bind can happen in either order.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self { tx }
    }

    /// Registers `pubterm` in `registry`, producing `TerminalLayer`s whose
    /// non-debug output is republished on this channel instead of going to
    /// stdout/stderr.
    pub fn register(&self, registry: &LayerRegistry) {
        let handle = self.clone();
        registry.register("pubterm", move |arg| {
            let mut layer = TerminalLayer::from_arg(arg).map_err(|e| match e {
                StackBuildError::InvalidArgument { reason, .. } => StackBuildError::InvalidArgument {
                    layer: "pubterm".into(),
                    reason,
                },
                other => other,
            })?;
            let tx = handle.tx.clone();
            layer.set_non_debug_sink(move |bytes| {
                let _ = tx.send(bytes.to_vec());
            });
            Ok(Box::new(layer) as Box<dyn Layer>)
        });
    }

    /// Binds the TCP side-channel and spawns the accept loop that forwards
    /// published bytes to every connected client.
    pub async fn listen(&self, addr: &str, port: u16, shutdown: dbgstack_core::Shutdown) -> io::Result<PubTerminalServer> {
        let listener = TcpListener::bind((crate::bridge::resolve_addr(addr), port)).await?;
        let local_addr = listener.local_addr()?;
        let tx = self.tx.clone();
        let handle = tokio::spawn(accept_loop(listener, tx, shutdown));
        Ok(PubTerminalServer { local_addr, handle })
    }
}

impl Default for PubTerminal {
    fn default() -> Self {
        Self::new()
    }
}

/// A running `pubterm` TCP side-channel.
pub struct PubTerminalServer {
    local_addr: std::net::SocketAddr,
    handle: JoinHandle<()>,
}

impl PubTerminalServer {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn accept_loop(listener: TcpListener, tx: broadcast::Sender<Vec<u8>>, shutdown: dbgstack_core::Shutdown) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        tracing::debug!(%peer, "pubterm client connected");
                        tokio::spawn(forward_loop(socket, tx.subscribe()));
                    }
                    Err(err) => {
                        tracing::debug!(%err, "pubterm accept error");
                    }
                }
            }
            _ = shutdown.wait_for_shutdown() => {
                tracing::debug!("pubterm listener shutting down");
                break;
            }
        }
    }
}

async fn forward_loop(mut socket: tokio::net::TcpStream, mut rx: broadcast::Receiver<Vec<u8>>) {
    use tokio::io::AsyncWriteExt;
    loop {
        match rx.recv().await {
            Ok(bytes) => {
                if socket.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "pubterm subscriber lagged, dropping frames");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbgstack_core::registry::build_stack;
    use dbgstack_core::Shutdown;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn published_bytes_reach_connected_clients() {
        let pubterm = PubTerminal::new();
        let registry = LayerRegistry::with_builtins();
        pubterm.register(&registry);

        let shutdown = Shutdown::new();
        let server = pubterm.listen("127.0.0.1", 0, shutdown.clone()).await.unwrap();
        let addr = server.local_addr();

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        // Give the accept loop a moment to subscribe before publishing.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let stack = build_stack("pubterm", &registry).unwrap();
        let leaves = stack.leaves();
        assert_eq!(leaves.len(), 1);

        pubterm.tx.send(b"hello console".to_vec()).unwrap();

        let mut buf = [0u8; 32];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello console");

        shutdown.shut_down();
        server.join().await;
    }
}
