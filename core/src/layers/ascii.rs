//! Escapes non-printable bytes so the wire stream is safe to carry over a
//! pure terminal transport.
//!
//! Every control byte below `0x20` is escaped as `0x7F, byte | 0x40`; every
//! other byte passes through unchanged, except `0x7F` itself, which escapes
//! to `0x7F, 0x7F` (a literal repeat rather than OR-ing in `0x40`). Decode's
//! inverse: seeing `0x7F` begins an escape; the following byte is either
//! `0x7F` (a literal DEL) or `byte & 0x3F` (a control byte).

use crate::error::StackBuildError;
use crate::layer::{Layer, Sink};
use crate::message::Message;
use std::time::Instant;

const ESCAPE: u8 = 0x7F;

fn needs_escape(byte: u8) -> bool {
    byte < 0x20 || byte == ESCAPE
}

#[derive(Debug, Default)]
pub struct AsciiEscapeLayer {
    last_activity: Option<Instant>,
    /// Set mid-message when `decode` sees a trailing, unpaired escape byte;
    /// the following call's first byte completes the pair.
    pending_escape: bool,
}

impl AsciiEscapeLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_arg(arg: Option<&str>) -> Result<Self, StackBuildError> {
        if arg.is_some() {
            return Err(StackBuildError::InvalidArgument {
                layer: "ascii".into(),
                reason: "does not take an argument".into(),
            });
        }
        Ok(Self::new())
    }
}

impl Layer for AsciiEscapeLayer {
    fn encode(&mut self, data: Message, _down_mtu: Option<usize>, down: &mut Sink<'_>) {
        self.last_activity = Some(Instant::now());
        let mut out = Vec::with_capacity(data.len());
        for byte in data.iter() {
            if byte == ESCAPE {
                out.push(ESCAPE);
                out.push(ESCAPE);
            } else if needs_escape(byte) {
                out.push(ESCAPE);
                out.push(byte | 0x40);
            } else {
                out.push(byte);
            }
        }
        down(Message::new(out));
    }

    fn decode(&mut self, data: Message, up: &mut Sink<'_>) {
        self.last_activity = Some(Instant::now());
        let mut out = Vec::with_capacity(data.len());
        for byte in data.iter() {
            if self.pending_escape {
                self.pending_escape = false;
                if byte == ESCAPE {
                    out.push(ESCAPE);
                } else {
                    out.push(byte & 0x3f);
                }
            } else if byte == ESCAPE {
                self.pending_escape = true;
            } else {
                out.push(byte);
            }
        }
        up(Message::new(out));
    }

    fn mtu(&self, down_mtu: Option<usize>) -> Option<usize> {
        // Worst case every byte doubles; halve and never go below 1 so a
        // one-byte MTU below us doesn't collapse to zero above us.
        down_mtu.map(|mtu| (mtu / 2).max(1))
    }

    fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_once(bytes: &[u8]) -> Vec<u8> {
        let mut layer = AsciiEscapeLayer::new();
        let mut out = None;
        layer.encode(Message::new(bytes), None, &mut |d| out = Some(d));
        out.unwrap().to_vec()
    }

    fn decode_once(bytes: &[u8]) -> Vec<u8> {
        let mut layer = AsciiEscapeLayer::new();
        let mut out = None;
        layer.decode(Message::new(bytes), &mut |d| out = Some(d));
        out.unwrap().to_vec()
    }

    #[test]
    fn printable_bytes_pass_through() {
        assert_eq!(encode_once(b"Hello"), b"Hello");
    }

    #[test]
    fn control_bytes_are_escaped() {
        assert_eq!(encode_once(&[0x01]), vec![0x7F, 0x41]);
        assert_eq!(encode_once(&[0x00]), vec![0x7F, 0x40]);
    }

    #[test]
    fn del_escapes_itself() {
        // DEL repeats itself rather than OR-ing in 0x40 like an ordinary
        // control byte, so a bare 0x7F after the escape prefix can be told
        // apart from an escaped DEL unambiguously.
        assert_eq!(encode_once(&[0x7F]), vec![0x7F, 0x7F]);
    }

    #[test]
    fn decode_distinguishes_escaped_del_from_escaped_control_byte() {
        assert_eq!(decode_once(&[0x7F, 0x7F]), vec![0x7F]);
        assert_eq!(decode_once(&[0x7F, 0x41]), vec![0x01]);
    }

    #[test]
    fn round_trips_every_byte() {
        let all: Vec<u8> = (0..=255u8).collect();
        let wire = encode_once(&all);
        assert_eq!(decode_once(&wire), all);
    }

    #[test]
    fn escape_split_across_two_decode_calls_still_joins() {
        let mut layer = AsciiEscapeLayer::new();
        let mut out = Vec::new();
        layer.decode(Message::new(&[0x7F][..]), &mut |d| out.extend(d.to_vec()));
        assert!(out.is_empty());
        layer.decode(Message::new(&[0x41][..]), &mut |d| out.extend(d.to_vec()));
        assert_eq!(out, vec![0x01]);
    }

    #[test]
    fn mtu_halves_and_floors_at_one() {
        let layer = AsciiEscapeLayer::new();
        assert_eq!(layer.mtu(Some(10)), Some(5));
        assert_eq!(layer.mtu(Some(1)), Some(1));
        assert_eq!(layer.mtu(None), None);
    }
}
