//! `dbgstack-bridge`: the pieces that sit above a bare
//! [`dbgstack_core::Stack`] and make it useful as a running service — the
//! TCP request/reply bridge, the per-stack timeout scheduler, and the
//! `pubterm` side-channel.

pub mod bridge;
pub mod pubterm;
pub mod scheduler;

pub use bridge::{Bridge, DEFAULT_PORT};
pub use pubterm::{PubTerminal, PubTerminalServer};
pub use scheduler::{Scheduler, DEFAULT_INTERVAL};
