//! `dbgstack-adapters`: stream adapters that feed bytes from
//! a transport — a serial port, a child process's stdio, or this
//! process's own stdin/stdout — into a [`dbgstack_core::Stack`]'s
//! `decode`, and carry the stack's `encode`/`timeout` output back out.
//!
//! [`Adapter::spawn`] is the single entry point: it takes any
//! `AsyncRead + AsyncWrite` transport (the [`process`], [`serial`], and
//! [`stdio`] modules build the concrete ones this crate ships) and a bare
//! [`dbgstack_core::Stack`], and returns both a handle to the pump tasks
//! and a `Arc<Mutex<Stack>>` so a bridge and timeout scheduler elsewhere
//! can keep driving the same stack.

mod driver;
pub mod process;
pub mod serial;
pub mod stdio;

pub use driver::Adapter;
