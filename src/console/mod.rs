pub mod crc;
pub mod decoder;
pub mod session;

#[cfg(test)]
pub(crate) mod fixtures;

use serialport::{DataBits, SerialPort};
use std::time::Duration;

pub use session::{Session, SessionError};

/// Length of one LOOP live-data frame, trailing checksum included
pub const FRAME_LEN: usize = 99;

// Every read and write on the console is bounded by this
const PORT_TIMEOUT: Duration = Duration::from_millis(1200);

/// Open and configure the serial channel handed to a `Session`
pub fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, serialport::Error> {
    serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .timeout(PORT_TIMEOUT)
        .open()
}
