//! The `term` layer wraps debug messages in an ANSI
//! APC/ST escape frame (`ESC _ ... ESC \`) so they can share a terminal with
//! ordinary human-readable output. Bytes outside a frame are "non-debug
//! data" and are routed to a side sink (by default, standard output/error)
//! rather than up the stack.

use crate::error::StackBuildError;
use crate::layer::{Layer, Sink};
use crate::message::Message;
use std::io::Write;
use std::time::Instant;

const START: [u8; 2] = [0x1b, b'_']; // ESC _  (APC)
const END: [u8; 2] = [0x1b, b'\\']; // ESC \  (ST)

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Where non-debug bytes (outside an APC/ST frame) get written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fd {
    Stdout,
    Stderr,
}

impl Fd {
    fn write(self, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        match self {
            Fd::Stdout => {
                let mut out = std::io::stdout();
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            Fd::Stderr => {
                let mut err = std::io::stderr();
                let _ = err.write_all(text.as_bytes());
                let _ = err.flush();
            }
        }
    }
}

/// `term(=fd)`, `fd` one of `1` (stdout, default) or `2` (stderr).
///
/// Matches the Python original's constructor default of suppressing
/// whatever noise arrives before the first `encode` call — a target that
/// has just been reset tends to spew a boot banner on its console before it
/// starts speaking the debug protocol, and that banner should not be
/// mistaken for a malformed frame.
pub struct TerminalLayer {
    fd: Fd,
    buffer: Vec<u8>,
    in_msg: bool,
    ignore_escape: bool,
    last_activity: Option<Instant>,
    /// Overrides where non-debug bytes go, in place of `fd`. The `bridge`
    /// crate's `pubterm` variant installs one of these to also broadcast
    /// the bytes over its side-channel socket; test code installs one to
    /// observe what would otherwise go straight to stdout/stderr.
    non_debug_sink: Option<Box<dyn FnMut(&[u8]) + Send>>,
}

impl std::fmt::Debug for TerminalLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalLayer")
            .field("fd", &self.fd)
            .field("buffer", &self.buffer)
            .field("in_msg", &self.in_msg)
            .field("ignore_escape", &self.ignore_escape)
            .field("last_activity", &self.last_activity)
            .finish()
    }
}

impl TerminalLayer {
    pub fn new(fd_out: bool, ignore_until_first_encode: bool) -> Self {
        Self {
            fd: if fd_out { Fd::Stdout } else { Fd::Stderr },
            buffer: Vec::new(),
            in_msg: false,
            ignore_escape: ignore_until_first_encode,
            last_activity: None,
            non_debug_sink: None,
        }
    }

    /// Installs a callback that receives every chunk of non-debug bytes
    /// instead of the configured file descriptor.
    pub fn set_non_debug_sink(&mut self, sink: impl FnMut(&[u8]) + Send + 'static) {
        self.non_debug_sink = Some(Box::new(sink));
    }

    pub fn from_arg(arg: Option<&str>) -> Result<Self, StackBuildError> {
        let fd = match arg {
            None | Some("1") => true,
            Some("2") => false,
            Some(other) => {
                return Err(StackBuildError::InvalidArgument {
                    layer: "term".into(),
                    reason: format!("unknown file descriptor {other:?}, expected 1 or 2"),
                })
            }
        };
        Ok(Self::new(fd, true))
    }

    /// Routes bytes that fell outside an APC/ST frame. The default writes
    /// them to the configured file descriptor; `pubterm` (built by the
    /// bridge crate) overrides this to also broadcast them.
    fn non_debug_data(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        match &mut self.non_debug_sink {
            Some(sink) => sink(data),
            None => self.fd.write(data),
        }
    }

    /// Pushes non-debug bytes down the stack without framing them as a
    /// debug message, used to relay data the target itself is echoing back,
    /// such as local command-line editing.
    pub fn inject(&mut self, data: Message, down: &mut Sink<'_>) {
        down(data);
    }
}

impl Layer for TerminalLayer {
    fn encode(&mut self, data: Message, _down_mtu: Option<usize>, down: &mut Sink<'_>) {
        self.last_activity = Some(Instant::now());
        self.ignore_escape = false;
        let mut framed = Message::new(&START[..]);
        framed.concatenate(data);
        framed.trailer(&END[..]);
        down(framed);
    }

    fn decode(&mut self, data: Message, up: &mut Sink<'_>) {
        if data.is_empty() {
            return;
        }
        self.last_activity = Some(Instant::now());

        if self.ignore_escape && !self.in_msg {
            let bytes = data.to_vec();
            self.non_debug_data(&bytes);
            return;
        }

        self.buffer.extend(data.iter());

        // A trailing lone ESC might be the start of a frame marker; wait
        // for the next call to disambiguate rather than misreading it.
        if self.buffer.last() == Some(&START[0]) {
            return;
        }

        loop {
            if !self.in_msg {
                match find(&self.buffer, &START) {
                    None => {
                        let rest = std::mem::take(&mut self.buffer);
                        self.non_debug_data(&rest);
                        return;
                    }
                    Some(pos) => {
                        let (before, after_marker) = self.buffer.split_at(pos);
                        let before = before.to_vec();
                        let after = after_marker[START.len()..].to_vec();
                        self.non_debug_data(&before);
                        self.buffer = after;
                        self.in_msg = true;
                    }
                }
            } else {
                match find(&self.buffer, &END) {
                    None => return,
                    Some(pos) => {
                        let msg: Vec<u8> = self.buffer[..pos]
                            .iter()
                            .copied()
                            .filter(|&b| b != b'\r')
                            .collect();
                        self.buffer = self.buffer[pos + END.len()..].to_vec();
                        self.in_msg = false;
                        up(Message::new(msg));
                    }
                }
            }
        }
    }

    fn mtu(&self, down_mtu: Option<usize>) -> Option<usize> {
        match down_mtu {
            None | Some(0) => None,
            Some(mtu) => Some(mtu.saturating_sub(START.len() + END.len()).max(1)),
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
    fn encode_wraps_in_apc_st() {
        let mut layer = TerminalLayer::new(true, true);
        let mut out = None;
        layer.encode(Message::new(b"hi"), None, &mut |d| out = Some(d));
        assert_eq!(out.unwrap().to_vec(), b"\x1b_hi\x1b\\".to_vec());
    }

    #[test]
    fn decode_extracts_frame_and_drops_noise_before_it() {
        let mut layer = TerminalLayer::new(true, false);
        let mut out = None;
        layer.decode(Message::new(b"boot noise\x1b_hi\x1b\\".to_vec()), &mut |d| out = Some(d));
        assert_eq!(out.unwrap().to_vec(), b"hi".to_vec());
    }

    #[test]
    fn non_debug_bytes_interleave_with_debug_frame_s2() {
        // Spec §8 S1/S2: decode("out1" + APC "msg" ST + "out2") delivers
        // "out1" then "out2" to the non-debug sink and "msg" upward.
        let mut layer = TerminalLayer::new(true, false);
        let non_debug = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let nd = non_debug.clone();
        layer.set_non_debug_sink(move |bytes| nd.lock().unwrap().push(bytes.to_vec()));

        let mut up = Vec::new();
        let mut wire = b"out1".to_vec();
        wire.extend_from_slice(&START);
        wire.extend_from_slice(b"msg");
        wire.extend_from_slice(&END);
        wire.extend_from_slice(b"out2");
        layer.decode(Message::new(wire), &mut |d| up.push(d.to_vec()));

        assert_eq!(up, vec![b"msg".to_vec()]);
        assert_eq!(*non_debug.lock().unwrap(), vec![b"out1".to_vec(), b"out2".to_vec()]);
    }

    #[test]
    fn ignores_everything_until_first_encode() {
        let mut layer = TerminalLayer::new(true, true);
        let mut out = None;
        layer.decode(Message::new(b"\x1b_hi\x1b\\".to_vec()), &mut |d| out = Some(d));
        assert!(out.is_none());

        layer.encode(Message::new(b"go"), None, &mut |_| {});
        layer.decode(Message::new(b"\x1b_hi\x1b\\".to_vec()), &mut |d| out = Some(d));
        assert_eq!(out.unwrap().to_vec(), b"hi".to_vec());
    }

    #[test]
    fn strips_carriage_returns_inside_frame() {
        let mut layer = TerminalLayer::new(true, false);
        let mut out = None;
        layer.decode(Message::new(b"\x1b_hi\r\x1b\\".to_vec()), &mut |d| out = Some(d));
        assert_eq!(out.unwrap().to_vec(), b"hi".to_vec());
    }

    #[test]
    fn split_across_calls_still_extracts() {
        let mut layer = TerminalLayer::new(true, false);
        let mut out = None;
        layer.decode(Message::new(b"\x1b_h".to_vec()), &mut |d| out = Some(d));
        assert!(out.is_none());
        layer.decode(Message::new(b"i\x1b\\".to_vec()), &mut |d| out = Some(d));
        assert_eq!(out.unwrap().to_vec(), b"hi".to_vec());
    }

    #[test]
    fn mtu_subtracts_frame_overhead() {
        let layer = TerminalLayer::new(true, true);
        assert_eq!(layer.mtu(Some(10)), Some(6));
        assert_eq!(layer.mtu(Some(1)), Some(1));
        assert_eq!(layer.mtu(None), None);
    }
}
