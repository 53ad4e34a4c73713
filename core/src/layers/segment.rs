//! The `segment` layer splits outgoing data into chunks no
//! larger than the MTU below it, marking every chunk but the last with a
//! continuation byte (`C`, `0x43`) and the last with an end byte (`E`,
//! `0x45`), and reassembles them back on decode.
//!
//! Segmentation absorbs the MTU of everything below it and always reports
//! `None` upward: whatever sits above `segment` never needs to chunk on its
//! own account.

use crate::error::StackBuildError;
use crate::layer::{Layer, Sink};
use crate::message::Message;
use std::time::Instant;

const CONT: u8 = b'C';
const END: u8 = b'E';

#[derive(Debug, Default)]
pub struct SegmentationLayer {
    /// Overrides the down MTU as the chunk size, when given explicitly.
    explicit_mtu: Option<usize>,
    buffer: Vec<u8>,
    last_activity: Option<Instant>,
}

impl SegmentationLayer {
    pub fn new(explicit_mtu: Option<usize>) -> Self {
        Self {
            explicit_mtu,
            buffer: Vec::new(),
            last_activity: None,
        }
    }

    pub fn from_arg(arg: Option<&str>) -> Result<Self, StackBuildError> {
        let mtu = match arg {
            None => None,
            Some(s) => {
                let n: usize = s.parse().map_err(|_| StackBuildError::InvalidArgument {
                    layer: "segment".into(),
                    reason: format!("{s:?} is not a positive integer"),
                })?;
                if n == 0 {
                    return Err(StackBuildError::InvalidArgument {
                        layer: "segment".into(),
                        reason: "mtu must be greater than zero".into(),
                    });
                }
                Some(n)
            }
        };
        Ok(Self::new(mtu))
    }
}

impl Layer for SegmentationLayer {
    fn encode(&mut self, data: Message, down_mtu: Option<usize>, down: &mut Sink<'_>) {
        self.last_activity = Some(Instant::now());
        let bytes = data.to_vec();
        let mtu = self.explicit_mtu.or(down_mtu);

        let Some(mtu) = mtu else {
            let mut framed = Message::new(bytes);
            framed.trailer([END]);
            down(framed);
            return;
        };
        let mtu = mtu.max(1).saturating_sub(1).max(1);

        if bytes.is_empty() {
            down(Message::new(vec![END]));
            return;
        }
        let mut i = 0;
        while i < bytes.len() {
            let end = (i + mtu).min(bytes.len());
            let last = end >= bytes.len();
            let mut chunk = Message::new(bytes[i..end].to_vec());
            chunk.trailer([if last { END } else { CONT }]);
            down(chunk);
            i = end;
        }
    }

    fn decode(&mut self, data: Message, up: &mut Sink<'_>) {
        self.last_activity = Some(Instant::now());
        let mut bytes = data.to_vec();
        let Some(&marker) = bytes.last() else { return };
        bytes.pop();
        self.buffer.extend(bytes);
        if marker == END {
            let reassembled = std::mem::take(&mut self.buffer);
            up(Message::new(reassembled));
        }
    }

    fn mtu(&self, _down_mtu: Option<usize>) -> Option<usize> {
        None
    }

    fn timeout(&mut self, _down_mtu: Option<usize>, _down: &mut Sink<'_>) {
        // The ARQ layer below is about to retransmit; whatever we were
        // reassembling no longer corresponds to what will arrive next.
        self.buffer.clear();
    }

    fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }
}
