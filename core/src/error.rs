//! Error types for the stack engine.
//!
//! Following the error taxonomy this engine implements: lossy lower layers
//! (bad CRC, truncated sequence headers, duplicate or
//! out-of-order frames) never produce an `Err` — they are corrected by ARQ
//! and only logged at `tracing::debug!`. Only misconfiguration (composer
//! construction, invalid arguments) and genuinely fatal protocol violations
//! (a request too large for the sequence space) surface as `Result::Err`.

use std::fmt;

/// Fatal conditions raised while building a [`Stack`](crate::stack::Stack)
/// from a textual description.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StackBuildError {
    /// A token in the description named a layer type the registry doesn't
    /// know about.
    #[error("unknown layer type {0:?}")]
    UnknownLayerType(String),

    /// A token was empty (e.g. a stray leading/trailing comma, or `=arg`
    /// with no name before the `=`).
    #[error("missing layer type")]
    MissingLayerType,

    /// A layer constructor rejected its argument (e.g. a non-numeric
    /// `segment=` MTU, or a negative MTU).
    #[error("invalid argument for layer {layer:?}: {reason}")]
    InvalidArgument { layer: String, reason: String },
}

/// Fatal conditions raised by a running layer.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum LayerError {
    /// An ARQ request grew large enough to wrap its 27-bit sequence space
    /// back around to its own starting sequence number. The request cannot
    /// be disambiguated from a retransmit of itself and cannot be sent.
    #[error("request too large for the ARQ sequence space")]
    RequestTooLarge,
}

/// Reported once to whichever task is waiting on a stream adapter or bridge
/// connection when its transport goes away.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,
}

/// Reported to a pending bridge reply when it is cancelled by `close()`
/// before a reply arrived.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    #[error("operation cancelled")]
    OperationCancelled,
    #[error("retransmit timeout reached the configured deadline")]
    Timeout,
}

/// A malformed ARQ sequence header. Dropped silently by the layer itself;
/// exposed here only so the codec can be unit-tested in isolation from the
/// layer that swallows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedSeqHeader;

impl fmt::Display for MalformedSeqHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed ARQ sequence header")
    }
}

impl std::error::Error for MalformedSeqHeader {}
