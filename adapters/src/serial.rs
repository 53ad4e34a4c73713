//! Wraps a physical serial port as a transport, using a short read
//! timeout for responsive shutdown, adapted from a blocking `serialport`
//! API to the async transport the rest of this crate expects.

use std::io;
use std::time::Duration;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Opens `path` at `baud_rate` for async use.
pub fn open_serial(path: &str, baud_rate: u32) -> io::Result<SerialStream> {
    tokio_serial::new(path, baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native_async()
}
