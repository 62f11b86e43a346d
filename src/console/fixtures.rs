/// Test doubles for the console: synthetic frames and a scripted serial port
use std::collections::VecDeque;
use std::io::{self, Read, Write};

use crate::console::crc::checksum;
use crate::console::session::ACK;
use crate::console::FRAME_LEN;

fn put16(frame: &mut [u8], offset: usize, value: i16) {
    frame[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// A LOOP frame with known field values and a valid trailing checksum
///
/// The frame is synthetic: it is assembled from chosen field values and
/// sealed with a checksum computed by `crc::checksum`, not captured from a
/// console. The checksum itself is pinned independently by the CRC-16/XMODEM
/// check value test in `crc.rs`.
pub(crate) fn golden_frame() -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0..3].copy_from_slice(b"LOO");
    frame[3] = (-20i8) as u8;
    frame[4] = 0;
    put16(&mut frame, 5, 0x0131);
    put16(&mut frame, 7, 29921);
    put16(&mut frame, 9, 712);
    frame[11] = 38;
    put16(&mut frame, 12, -45);
    frame[14] = 6;
    frame[15] = 200;
    put16(&mut frame, 16, 225);
    frame[33] = 81;
    put16(&mut frame, 41, 14);
    frame[43] = 2;
    put16(&mut frame, 44, 312);
    put16(&mut frame, 46, 27);
    put16(&mut frame, 48, 0x0821);
    put16(&mut frame, 50, 9);
    put16(&mut frame, 52, 120);
    put16(&mut frame, 54, 1104);
    put16(&mut frame, 56, 3);
    put16(&mut frame, 58, 80);
    put16(&mut frame, 60, 950);
    frame[70] = 0;
    frame[71] = 4;
    put16(&mut frame, 72, 0x0102);
    frame[86] = 0;
    put16(&mut frame, 87, 799);
    frame[89] = 6;
    frame[90] = 44;
    put16(&mut frame, 91, 642);
    put16(&mut frame, 93, 1958);
    frame[95] = b'\n';
    frame[96] = b'\r';

    reseal(&mut frame);
    frame
}

/// Recompute the trailing checksum after a frame has been edited
pub(crate) fn reseal(frame: &mut [u8; FRAME_LEN]) {
    let crc = checksum(&frame[..FRAME_LEN - 2]);
    frame[FRAME_LEN - 2..].copy_from_slice(&crc.to_be_bytes());
}

/// The console's reply to a LOOP query: two ACK bytes, then the frame
pub(crate) fn acked(frame: &[u8]) -> Vec<u8> {
    let mut reply = vec![b'\n', ACK];
    reply.extend_from_slice(frame);
    reply
}

/// In-memory console: each write releases the next scripted reply,
/// and reading an empty buffer times out like a real port
#[derive(Default)]
pub(crate) struct ScriptedPort {
    pub(crate) replies: VecDeque<Vec<u8>>,
    pub(crate) pending: VecDeque<u8>,
    pub(crate) written: Vec<u8>,
    pub(crate) writes: usize,
    pub(crate) fail_writes: bool,
}

impl ScriptedPort {
    pub(crate) fn replying(replies: &[&[u8]]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_vec()).collect(),
            ..Default::default()
        }
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "port closed"));
        }
        self.written.extend_from_slice(buf);
        self.writes += 1;
        if let Some(reply) = self.replies.pop_front() {
            self.pending.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
