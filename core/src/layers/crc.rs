//! The `crc8`, `crc16`, and `crc32` integrity layers append a trailing
//! checksum on encode, verify and strip it on decode, silently dropping
//! anything that fails the check.
//!
//! These use the target firmware's exact CRC parameters rather than any
//! "standard" catalogued CRC (CRC-32 happens to coincide with the familiar
//! CRC-32/ISO-HDLC; CRC-8 and CRC-16 do not match common presets), so they
//! are defined here as [`crc::Algorithm`]s instead of picked from
//! [`crc::CRC_16_*`]-style constants.

use crate::error::StackBuildError;
use crate::layer::{Layer, Sink};
use crate::message::Message;
use crc::{Algorithm, Crc};
use std::time::Instant;

const CRC8_ALG: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0xa6,
    init: 0xff,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0x00,
    residue: 0x00,
};

const CRC16_ALG: Algorithm<u16> = Algorithm {
    width: 16,
    poly: 0xbaad,
    init: 0xffff,
    refin: false,
    refout: false,
    xorout: 0x0000,
    check: 0x0000,
    residue: 0x0000,
};

const CRC32_ALG: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04c1_1db7,
    init: 0xffff_ffff,
    refin: true,
    refout: true,
    xorout: 0xffff_ffff,
    check: 0x0000_0000,
    residue: 0x0000_0000,
};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC8_ALG);
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC16_ALG);
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC32_ALG);

/// MTU is clamped to 256 bytes so an 8 or 16 bit CRC still detects the
/// multi-bit error bursts it was chosen for; a longer frame erodes that
/// guarantee.
fn clamped_mtu(down_mtu: Option<usize>, trailer_len: usize, cap: Option<usize>) -> Option<usize> {
    match down_mtu {
        None | Some(0) => cap,
        Some(m) => {
            let shrunk = m.saturating_sub(trailer_len).max(1);
            Some(match cap {
                Some(cap) => shrunk.min(cap),
                None => shrunk,
            })
        }
    }
}

fn no_arg(layer: &'static str, arg: Option<&str>) -> Result<(), StackBuildError> {
    if arg.is_some() {
        return Err(StackBuildError::InvalidArgument {
            layer: layer.into(),
            reason: "does not take an argument".into(),
        });
    }
    Ok(())
}

macro_rules! crc_layer {
    ($name:ident, $layer_name:literal, $trailer_len:expr, $mtu_cap:expr, $encode_trailer:expr, $check:expr) => {
        #[derive(Debug, Default)]
        pub struct $name {
            last_activity: Option<Instant>,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn from_arg(arg: Option<&str>) -> Result<Self, StackBuildError> {
                no_arg($layer_name, arg)?;
                Ok(Self::new())
            }
        }

        impl Layer for $name {
            fn encode(&mut self, data: Message, _down_mtu: Option<usize>, down: &mut Sink<'_>) {
                self.last_activity = Some(Instant::now());
                let bytes = data.to_vec();
                let trailer = $encode_trailer(&bytes);
                let mut framed = Message::new(bytes);
                framed.trailer(trailer);
                down(framed);
            }

            fn decode(&mut self, data: Message, up: &mut Sink<'_>) {
                self.last_activity = Some(Instant::now());
                let bytes = data.to_vec();
                if bytes.len() < $trailer_len {
                    tracing::debug!(layer = $layer_name, "frame shorter than trailer, dropped");
                    return;
                }
                let (body, trailer) = bytes.split_at(bytes.len() - $trailer_len);
                if !$check(body, trailer) {
                    tracing::debug!(layer = $layer_name, "invalid checksum, dropped");
                    return;
                }
                up(Message::new(body.to_vec()));
            }

            fn mtu(&self, down_mtu: Option<usize>) -> Option<usize> {
                clamped_mtu(down_mtu, $trailer_len, $mtu_cap)
            }

            fn last_activity(&self) -> Option<Instant> {
                self.last_activity
            }
        }
    };
}

crc_layer!(
    Crc8Layer,
    "crc8",
    1,
    Some(256),
    |bytes: &[u8]| vec![CRC8.checksum(bytes)],
    |body: &[u8], trailer: &[u8]| CRC8.checksum(body) == trailer[0]
);

crc_layer!(
    Crc16Layer,
    "crc16",
    2,
    Some(256),
    |bytes: &[u8]| CRC16.checksum(bytes).to_be_bytes().to_vec(),
    |body: &[u8], trailer: &[u8]| CRC16.checksum(body).to_be_bytes() == trailer
);

crc_layer!(
    Crc32Layer,
    "crc32",
    4,
    None,
    |bytes: &[u8]| CRC32.checksum(bytes).to_be_bytes().to_vec(),
    |body: &[u8], trailer: &[u8]| CRC32.checksum(body).to_be_bytes() == trailer
);
