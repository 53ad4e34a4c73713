//! `dbgstack-core`: the layered, byte-oriented protocol stack engine that
//! brokers debug traffic between a host and an embedded target.
//!
//! A [`Stack`] is an ordered composition of [`Layer`]s, application end
//! first. Payloads travel down through `encode` (application toward the
//! physical transport) and up through `decode` (physical toward
//! application); an out-of-band `timeout` signal drives retransmission.
//! This crate is pure and synchronous: it owns no sockets, threads, or
//! async runtime. Transport I/O (`dbgstack-adapters`), the TCP request/
//! reply endpoint (`dbgstack-bridge`), and the CLI (`dbgstack-cli`) are
//! separate crates that drive a `Stack` built here.
//!
//! # Organization
//! - [`message`] is the byte-rope type layers pass between each other.
//! - [`layer`] defines the [`Layer`] trait every component implements;
//!   [`layers`] holds the concrete layers (`ascii`, `term`, `segment`,
//!   `arq`, `crc8`/`crc16`/`crc32`, `loop`, `raw`).
//! - [`stack`] composes layers into a [`Stack`], which is itself a `Layer`
//!   and can be nested.
//! - [`registry`] parses the textual stack description grammar and builds
//!   a `Stack` from a [`LayerRegistry`](registry::LayerRegistry).
//! - [`seq`] is the variable-length ARQ sequence number codec.
//! - [`error`] holds the error taxonomy; [`shutdown`] the cancellation
//!   token shared with the async crates.

pub mod error;
pub mod layer;
pub mod layers;
pub mod message;
pub mod registry;
pub mod seq;
pub mod shutdown;

pub use layer::Layer;
pub use message::Message;
pub use registry::{build_stack, LayerRegistry};
pub use shutdown::{ExitStatus, Shutdown};
pub use stack::Stack;

pub mod stack;
