//! The `raw` layer is a pure pass-through, used as an explicit no-op
//! terminator.

use crate::layer::{Layer, Sink};
use crate::message::Message;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct RawLayer {
    last_activity: Option<Instant>,
}

impl RawLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructor entry point for the layer registry; `raw` takes no
    /// argument.
    pub fn from_arg(arg: Option<&str>) -> Result<Self, crate::error::StackBuildError> {
        if arg.is_some() {
            return Err(crate::error::StackBuildError::InvalidArgument {
                layer: "raw".into(),
                reason: "does not take an argument".into(),
            });
        }
        Ok(Self::new())
    }
}

impl Layer for RawLayer {
    fn encode(&mut self, data: Message, _down_mtu: Option<usize>, down: &mut Sink<'_>) {
        self.last_activity = Some(Instant::now());
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
    fn passes_bytes_through_unchanged() {
        let mut layer = RawLayer::new();
        let mut out = None;
        layer.encode(Message::new(b"abc"), None, &mut |d| out = Some(d));
        assert_eq!(out.unwrap(), Message::new(b"abc"));
    }
}
