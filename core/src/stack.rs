//! Composition of a sequence of [`Layer`]s into one.
//!
//! A stack never lets its layers hold references to each other. Instead,
//! whenever the stack drives an `encode`/`decode`/`timeout` call it builds
//! a fresh closure chain on the stack (via [`std::slice::split_first_mut`]/
//! [`std::slice::split_last_mut`]) that hands each layer "the rest of the
//! chain" as a callback. This keeps every concrete layer's code a direct
//! "transform, then call down/up" without needing unsafe back-pointers or
//! an arena of indices.

use crate::layer::{Layer, Sink};
use crate::message::Message;
use std::time::Instant;

/// An ordered composition of layers, application end first.
///
/// A `Stack` is itself a [`Layer`], so it can be nested inside a larger
/// stack.
///
/// Like a bare layer, a top-level stack carries its own `up`/`down`
/// boundary sinks rather than taking a callback on every call:
/// `set_up` wires the application-facing decode target, `set_down` the
/// physical-facing encode target. Both default to a no-op. A `Stack` used
/// as a nested layer ignores its own stored sinks entirely — the outer
/// stack supplies the real `up`/`down` for that call instead.
pub struct Stack {
    layers: Vec<Box<dyn Layer>>,
    up: Box<dyn FnMut(Message) + Send>,
    down: Box<dyn FnMut(Message) + Send>,
}

impl Stack {
    /// Builds a stack from already-constructed layers, application layer
    /// (`L[0]`) first, physical layer (`L[n-1]`) last. An empty `layers`
    /// list is legal and behaves as a single transparent pass-through
    /// layer.
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Self {
        Self {
            layers,
            up: Box::new(|_| {}),
            down: Box::new(|_| {}),
        }
    }

    /// Sets the sink that receives application-side bytes delivered by
    /// `decode`.
    pub fn set_up(&mut self, f: impl FnMut(Message) + Send + 'static) {
        self.up = Box::new(f);
    }

    /// Sets the sink that receives physical-side bytes produced by
    /// `encode` and by retransmits fired from `timeout`.
    pub fn set_down(&mut self, f: impl FnMut(Message) + Send + 'static) {
        self.down = Box::new(f);
    }

    /// The number of layers directly in this stack (not counting layers
    /// nested inside a sub-stack).
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Sends a payload down through the stack, to the sink set by
    /// [`Stack::set_down`].
    pub fn encode(&mut self, data: Message) {
        let Stack { layers, down, .. } = self;
        let mtus = mtu_chain(layers, None);
        drive_encode(layers, &mtus, data, &mut |d| down(d));
    }

    /// Delivers a wire-side packet up through the stack, to the sink set by
    /// [`Stack::set_up`]. Once delivery completes, gives every layer a
    /// chance to react by sending something of its own (see [`Layer::flush`]
    /// on why this cannot happen synchronously inside `decode` itself).
    pub fn decode(&mut self, data: Message) {
        let Stack { layers, up, .. } = self;
        drive_decode(layers, data, &mut |d| up(d));

        let Stack { layers, down, .. } = self;
        let mtus = mtu_chain(layers, None);
        drive_flush(layers, &mtus, &mut |d| down(d));
    }

    /// Fires a maintenance tick. Any retransmitted bytes go to the sink set
    /// by [`Stack::set_down`].
    pub fn timeout(&mut self) {
        let Stack { layers, down, .. } = self;
        let mtus = mtu_chain(layers, None);
        drive_timeout(layers, &mtus, &mut |d| down(d));
    }

    /// The effective MTU of the whole stack, or `None` if no layer in the
    /// chain declares a limit.
    pub fn mtu(&self) -> Option<usize> {
        Layer::mtu(self, None)
    }

    /// The instant of the most recent activity anywhere in the stack, or
    /// `None` if nothing has happened yet.
    pub fn last_activity_instant(&self) -> Option<Instant> {
        Layer::last_activity(self)
    }

    /// Releases every layer's resources, top to bottom.
    pub fn close(&mut self) {
        Layer::close(self)
    }

    /// Iterates over the leaf layers of this stack in top-down order,
    /// flattening any nested stacks.
    pub fn leaves(&self) -> Vec<&dyn Layer> {
        let mut out = Vec::new();
        for layer in &self.layers {
            match layer.as_any().downcast_ref::<Stack>() {
                Some(nested) => out.extend(nested.leaves()),
                None => out.push(layer.as_ref() as &dyn Layer),
            }
        }
        out
    }
}

impl<'s> IntoIterator for &'s Stack {
    type Item = &'s dyn Layer;
    type IntoIter = std::vec::IntoIter<&'s dyn Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.leaves().into_iter()
    }
}

impl Layer for Stack {
    fn encode(&mut self, data: Message, down_mtu: Option<usize>, down: &mut Sink<'_>) {
        let mtus = mtu_chain(&self.layers, down_mtu);
        drive_encode(&mut self.layers, &mtus, data, down);
    }

    fn decode(&mut self, data: Message, up: &mut Sink<'_>) {
        drive_decode(&mut self.layers, data, up);
    }

    fn mtu(&self, down_mtu: Option<usize>) -> Option<usize> {
        fold_mtu(&self.layers, down_mtu)
    }

    fn timeout(&mut self, down_mtu: Option<usize>, down: &mut Sink<'_>) {
        let mtus = mtu_chain(&self.layers, down_mtu);
        drive_timeout(&mut self.layers, &mtus, down);
    }

    fn flush(&mut self, down_mtu: Option<usize>, down: &mut Sink<'_>) {
        let mtus = mtu_chain(&self.layers, down_mtu);
        drive_flush(&mut self.layers, &mtus, down);
    }

    fn last_activity(&self) -> Option<Instant> {
        self.layers.iter().filter_map(|l| l.last_activity()).max()
    }

    fn close(&mut self) {
        for layer in &mut self.layers {
            layer.close();
        }
    }
}

/// Folds `seed` (the MTU below the bottom layer) up through every layer,
/// bottom to top, producing the MTU the whole chain presents at its top.
fn fold_mtu(layers: &[Box<dyn Layer>], seed: Option<usize>) -> Option<usize> {
    let mut acc = seed;
    for layer in layers.iter().rev() {
        acc = layer.mtu(acc);
    }
    acc
}

/// Computes, for every layer in `layers`, the MTU visible to it as its
/// `down_mtu` argument (i.e. the MTU of the chain strictly below it, with
/// `seed` as the MTU below the bottom-most layer).
fn mtu_chain(layers: &[Box<dyn Layer>], seed: Option<usize>) -> Vec<Option<usize>> {
    let mut result = vec![None; layers.len()];
    let mut acc = seed;
    for i in (0..layers.len()).rev() {
        result[i] = acc;
        acc = layers[i].mtu(acc);
    }
    result
}

fn drive_encode(
    layers: &mut [Box<dyn Layer>],
    mtus: &[Option<usize>],
    data: Message,
    sink: &mut Sink<'_>,
) {
    match layers.split_first_mut() {
        None => sink(data),
        Some((first, rest)) => {
            let down_mtu = mtus[0];
            let rest_mtus = &mtus[1..];
            first.encode(data, down_mtu, &mut |d| drive_encode(rest, rest_mtus, d, sink));
        }
    }
}

fn drive_decode(layers: &mut [Box<dyn Layer>], data: Message, sink: &mut Sink<'_>) {
    match layers.split_last_mut() {
        None => sink(data),
        Some((last, rest)) => {
            last.decode(data, &mut |d| drive_decode(rest, d, sink));
        }
    }
}

fn drive_timeout(layers: &mut [Box<dyn Layer>], mtus: &[Option<usize>], sink: &mut Sink<'_>) {
    if let Some((first, rest)) = layers.split_first_mut() {
        let down_mtu = mtus[0];
        let rest_mtus = &mtus[1..];
        first.timeout(down_mtu, &mut |d| drive_encode(rest, rest_mtus, d, sink));
        drive_timeout(rest, rest_mtus, sink);
    }
}

fn drive_flush(layers: &mut [Box<dyn Layer>], mtus: &[Option<usize>], sink: &mut Sink<'_>) {
    if let Some((first, rest)) = layers.split_first_mut() {
        let down_mtu = mtus[0];
        let rest_mtus = &mtus[1..];
        first.flush(down_mtu, &mut |d| drive_encode(rest, rest_mtus, d, sink));
        drive_flush(rest, rest_mtus, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::raw::RawLayer;

    #[test]
    fn empty_stack_is_transparent() {
        let mut stack = Stack::new(Vec::new());
        let mut out = None;
        stack.set_down(|d| out = Some(d));
        stack.encode(Message::new(b"hi"));
        assert_eq!(out.unwrap(), Message::new(b"hi"));
    }

    #[test]
    fn single_raw_layer_round_trips() {
        let mut stack = Stack::new(vec![Box::new(RawLayer::new())]);
        let mut wire = None;
        stack.set_down(|d| wire = Some(d));
        stack.encode(Message::new(b"payload"));
        let wire = wire.take().unwrap();

        let mut up = None;
        stack.set_up(|d| up = Some(d));
        stack.decode(wire);
        assert_eq!(up.unwrap(), Message::new(b"payload"));
    }

    #[test]
    fn mtu_is_none_with_no_limiting_layer() {
        let stack = Stack::new(vec![Box::new(RawLayer::new())]);
        assert_eq!(stack.mtu(), None);
    }

    #[test]
    fn nested_stack_flattens_in_leaves() {
        let inner = Stack::new(vec![Box::new(RawLayer::new()), Box::new(RawLayer::new())]);
        let outer = Stack::new(vec![Box::new(inner), Box::new(RawLayer::new())]);
        assert_eq!(outer.leaves().len(), 3);
    }
}
