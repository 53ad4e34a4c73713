//! The `arq` layer is a minimal automatic-repeat-request layer providing
//! reliable, in-order delivery over an otherwise lossy or
//! reordering transport, using the variable-length sequence header in
//! [`crate::seq`].
//!
//! Every outbound chunk is tagged with a strictly increasing sequence
//! number; the far end only accepts the next expected number in order and
//! silently drops anything else, relying on the timeout scheduler to
//! trigger a retransmit of the whole in-flight request. A fresh link
//! (or one that lost synchronization) is re-established with a reset frame
//! — a single `0x80` byte — before the first real request goes out.

use crate::error::{LayerError, StackBuildError};
use crate::layer::{Layer, Sink};
use crate::message::Message;
use crate::seq::{self, RESET_FLAG};
use std::time::Instant;

#[derive(Debug)]
pub struct ArqLayer {
    /// A request is in flight, awaiting its matching reply.
    req: bool,
    /// The chunks of the current in-flight request, kept so they can be
    /// replayed verbatim on retransmit.
    request: Vec<Message>,
    /// A reset handshake has not yet been sent on this layer.
    reset: bool,
    /// Waiting for the far end to echo our reset frame back.
    syncing: bool,
    /// Set by `decode` the instant a pending sync completes; consumed (and
    /// cleared) by the next `flush`, which is the earliest safe point to
    /// re-send — see [`Layer::flush`].
    just_synced: bool,
    decode_seq: u32,
    decode_seq_start: u32,
    encode_seq: u32,
    encode_seq_start: u32,
    last_activity: Option<Instant>,
    last_error: Option<LayerError>,
}

impl Default for ArqLayer {
    fn default() -> Self {
        Self {
            req: false,
            request: Vec::new(),
            reset: true,
            syncing: false,
            just_synced: false,
            decode_seq: 1,
            decode_seq_start: 1,
            encode_seq: 0,
            encode_seq_start: 0,
            last_activity: None,
            last_error: None,
        }
    }
}

impl ArqLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_arg(arg: Option<&str>) -> Result<Self, StackBuildError> {
        if arg.is_some() {
            return Err(StackBuildError::InvalidArgument {
                layer: "arq".into(),
                reason: "does not take an argument".into(),
            });
        }
        Ok(Self::new())
    }

    /// The last fatal condition observed (currently: sequence space
    /// exhaustion mid-request), if any. Cleared by [`ArqLayer::reset`].
    pub fn last_error(&self) -> Option<LayerError> {
        self.last_error
    }

    /// Forces the next `encode` to re-run the reset handshake, e.g. after
    /// the caller detects the physical link bounced.
    pub fn reset(&mut self) {
        self.reset = true;
        self.request.clear();
    }

    fn send_reset(&mut self, down: &mut Sink<'_>) {
        if self.syncing {
            return;
        }
        self.syncing = true;
        self.encode_seq = 0;
        down(Message::new(vec![RESET_FLAG]));
    }

    fn retransmit(&mut self, down: &mut Sink<'_>) {
        tracing::debug!("arq retransmit");
        if !self.req {
            self.decode_seq = self.decode_seq_start;
        }
        if self.syncing {
            down(Message::new(vec![RESET_FLAG]));
        } else {
            for frame in self.request.clone() {
                down(frame);
            }
        }
    }
}

impl Layer for ArqLayer {
    fn encode(&mut self, data: Message, _down_mtu: Option<usize>, down: &mut Sink<'_>) {
        self.last_activity = Some(Instant::now());
        if self.reset {
            self.reset = false;
            self.send_reset(down);
        }

        if !self.req {
            self.request.clear();
            self.encode_seq_start = self.encode_seq;
        }
        self.req = true;
        self.encode_seq = seq::next_seq(self.encode_seq);

        // A request that needs more chunks than the sequence space has
        // values would wrap back onto itself, making a retransmit
        // ambiguous. In practice this means the caller picked an MTU far
        // too small for the request; surface it rather than silently
        // corrupt the stream.
        if self.encode_seq == self.encode_seq_start {
            self.last_error = Some(LayerError::RequestTooLarge);
            tracing::error!("arq request exceeded the sequence space; dropping chunk");
            return;
        }

        let mut framed = Message::new(seq::encode_seq(self.encode_seq));
        framed.concatenate(data);
        self.request.push(framed.clone());
        if !self.syncing {
            down(framed);
        }
    }

    fn decode(&mut self, data: Message, up: &mut Sink<'_>) {
        if data.is_empty() {
            return;
        }
        self.last_activity = Some(Instant::now());

        let bytes = data.to_vec();
        let (received_seq, used) = match seq::decode_seq(&bytes) {
            Ok(v) => v,
            Err(_) => {
                tracing::debug!("malformed arq sequence header, dropped");
                return;
            }
        };
        let is_reset = bytes[0] & RESET_FLAG != 0;
        if is_reset {
            self.decode_seq = received_seq;
        }

        if self.req {
            self.req = false;
            self.decode_seq_start = self.decode_seq;
        }

        if received_seq == self.decode_seq {
            self.decode_seq = seq::next_seq(self.decode_seq);
            let msg = &bytes[used..];
            if !msg.is_empty() {
                up(Message::new(msg.to_vec()));
            }
        } else {
            tracing::debug!(expected = self.decode_seq, got = received_seq, "unexpected arq sequence, dropped");
        }

        if self.syncing && bytes[0] == RESET_FLAG {
            self.syncing = false;
            self.just_synced = true;
        }
    }

    fn flush(&mut self, _down_mtu: Option<usize>, down: &mut Sink<'_>) {
        if std::mem::take(&mut self.just_synced) {
            for frame in self.request.clone() {
                down(frame);
            }
        }
    }

    fn timeout(&mut self, _down_mtu: Option<usize>, down: &mut Sink<'_>) {
        self.retransmit(down);
    }

    fn mtu(&self, down_mtu: Option<usize>) -> Option<usize> {
        match down_mtu {
            None | Some(0) => None,
            Some(m) => Some(m.saturating_sub(4).max(1)),
        }
    }

    fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_encode_only_sends_the_reset_handshake() {
        // The very first encode triggers the reset handshake; the request
        // itself is queued, not sent, until the far end acks the reset
        // (see `sync_ack_flushes_pending_request_without_reentering_decode`).
        let mut layer = ArqLayer::new();
        let mut frames = Vec::new();
        layer.encode(Message::new(b"hi"), None, &mut |d| frames.push(d.to_vec()));
        assert_eq!(frames, vec![vec![RESET_FLAG]]);
        assert!(layer.syncing);
    }

    #[test]
    fn decode_delivers_in_order_and_drops_unexpected_seq() {
        let mut layer = ArqLayer::new();
        layer.decode_seq = 5;
        let mut out = Vec::new();
        layer.decode(Message::new(vec![0x07, 1, 2, 3]), &mut |d| out.push(d.to_vec()));
        assert!(out.is_empty());
        layer.decode(Message::new(vec![0x05, b'x']), &mut |d| out.push(d.to_vec()));
        assert_eq!(out, vec![vec![b'x']]);
        assert_eq!(layer.decode_seq, 6);
    }

    #[test]
    fn timeout_retransmits_pending_request() {
        let mut layer = ArqLayer::new();
        let mut sent = Vec::new();
        layer.encode(Message::new(b"hi"), None, &mut |d| sent.push(d.to_vec()));

        let mut retransmitted = Vec::new();
        layer.timeout(None, &mut |d| retransmitted.push(d.to_vec()));
        // Still syncing (reset not yet acked): only the reset frame goes out again.
        assert_eq!(retransmitted, vec![vec![RESET_FLAG]]);
    }

    #[test]
    fn sync_ack_flushes_pending_request_without_reentering_decode() {
        let mut layer = ArqLayer::new();
        layer.encode(Message::new(b"hi"), None, &mut |_| {});
        assert!(layer.syncing);

        layer.decode(Message::new(vec![RESET_FLAG]), &mut |_| {});
        assert!(!layer.syncing);

        let mut flushed = Vec::new();
        layer.flush(None, &mut |d| flushed.push(d.to_vec()));
        assert_eq!(flushed, vec![vec![0x01, b'h', b'i']]);
    }

    #[test]
    fn mtu_reserves_four_header_bytes() {
        let layer = ArqLayer::new();
        assert_eq!(layer.mtu(Some(10)), Some(6));
        assert_eq!(layer.mtu(None), None);
    }
}
