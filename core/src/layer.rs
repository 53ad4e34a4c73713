//! The [`Layer`] trait: the one abstraction every component in this engine
//! implements.

use crate::message::Message;
use std::time::Instant;

/// A sink a layer's `encode`/`decode`/`timeout` implementation calls, zero
/// or more times, to hand a transformed packet to whatever sits below (on
/// `encode`/`timeout`) or above (on `decode`) it in the stack.
///
/// A layer never holds a reference to its neighbour directly — see the
/// module doc on [`crate::stack`] for why.
pub type Sink<'a> = dyn FnMut(Message) + 'a;

/// A single node in a [`Stack`](crate::stack::Stack)'s chain.
///
/// Layers are composed vertically: an *application end* (top) and a
/// *physical end* (bottom). A datagram travels down through `encode`
/// (application toward physical) and up through `decode` (physical toward
/// application). A [`Stack`](crate::stack::Stack) owns a `Vec<Box<dyn
/// Layer>>` and drives calls between neighbours itself by handing each
/// layer a callback for "the rest of the chain in this direction", rather
/// than having layers hold `up`/`down` back-references to each other. That
/// sidesteps the reference cycle a hand-linked doubly-traversable chain
/// would need in safe Rust, while every individual layer implementation
/// still reads exactly the same way: transform, then call `down`/`up`.
pub trait Layer: Send + 'static {
    /// Accepts application-side bytes, transforms them, and calls `down`
    /// zero or more times with the wire-side packet(s) to hand to the next
    /// layer. `down_mtu` is the effective MTU of everything below this
    /// layer (`None` meaning no known limit); most layers ignore it except
    /// to shrink it for the layer above.
    fn encode(&mut self, data: Message, down_mtu: Option<usize>, down: &mut Sink<'_>);

    /// Accepts wire-side bytes received from below and calls `up` zero or
    /// more times with the reassembled application-side packet(s).
    fn decode(&mut self, data: Message, up: &mut Sink<'_>);

    /// The effective MTU this layer presents upward, given the MTU of
    /// everything below it. The default forwards it unchanged.
    fn mtu(&self, down_mtu: Option<usize>) -> Option<usize> {
        down_mtu
    }

    /// Maintenance tick, fired by the timeout scheduler when the stack has
    /// been idle too long. `down_mtu`/`down` are as in [`Layer::encode`];
    /// most layers ignore both and keep the default no-op. A layer that
    /// owns retransmit state (ARQ) re-emits its retained frames through
    /// `down`; a layer with a reassembly buffer made stale by the coming
    /// retransmit (segmentation) clears it.
    fn timeout(&mut self, down_mtu: Option<usize>, down: &mut Sink<'_>) {
        let _ = (down_mtu, down);
    }

    /// Called once by the stack right after a full `decode` call has
    /// returned (not during it), giving a layer that reacted to what it
    /// just decoded by wanting to *send* something — ARQ, retransmitting
    /// its pending request once a reset handshake completes — a point to
    /// do so without reentering the `decode` call that is still live
    /// further down the stack at the moment the triggering condition is
    /// observed. `down_mtu`/`down` are as in [`Layer::encode`]; the default
    /// does nothing.
    fn flush(&mut self, down_mtu: Option<usize>, down: &mut Sink<'_>) {
        let _ = (down_mtu, down);
    }

    /// The instant of this layer's last `encode`/`decode` activity, or
    /// `None` if it has never been touched. [`Stack::last_activity`]
    /// (`crate::stack::Stack`) takes the max across every layer instead of
    /// each layer separately tracking the chain below it — seen once per
    /// stack is enough; see the "Activity clock vs timer" design note.
    fn last_activity(&self) -> Option<Instant> {
        None
    }

    /// Releases any resources this layer owns. The default does nothing.
    fn close(&mut self) {}

    /// Support for downcasting a boxed layer back to its concrete type,
    /// used by [`crate::stack::Stack::leaves`] to recognise and flatten a
    /// nested stack. Every implementor gets this for free.
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
