//! Concrete [`crate::layer::Layer`] implementations, one module per wire
//! name recognised by [`crate::registry`].

pub mod arq;
pub mod ascii;
pub mod crc;
pub mod loopback;
pub mod raw;
pub mod segment;
pub mod terminal;
