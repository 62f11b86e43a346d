/// Frame integrity check for the console's live-data records
use crc::{Crc, CRC_16_XMODEM};

// CRC16-CCITT: poly 0x1021, init 0x0000, no reflection, no final XOR
const CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Compute the CRC16-CCITT of a buffer
pub fn checksum(data: &[u8]) -> u16 {
    CCITT.checksum(data)
}

/// Check a frame that carries its own checksum in the last two bytes
///
/// The console appends the CRC most-significant byte first, so running the
/// CRC over payload plus checksum yields zero for an intact frame.
pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}
