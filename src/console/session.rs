/// Request/response exchange with the weather console
use log::{debug, info, warn};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::console::{crc, decoder, FRAME_LEN};
use crate::models::Observation;

// Wire protocol constants
const WAKE_PROBE: &[u8] = b"\n";
const WAKE_REPLY: &[u8] = b"\r\n";
const LOOP_COMMAND: &[u8] = b"LOOP 1\n";
pub(crate) const ACK: u8 = 0x06;
const ACK_LEN: usize = 2;

const WAKE_ATTEMPTS: usize = 3;
const WAKE_BACKOFF: Duration = Duration::from_millis(1200);
// Upper bound on a wake reply line so a chattering line cannot stall us
const MAX_LINE_LEN: usize = 64;

/// Protocol-level reasons a poll produced no frame
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("console did not wake up after {attempts} attempts")]
    WakeFailed { attempts: usize },
    #[error("console did not acknowledge the query, received {received:02x?}")]
    NotAcknowledged { received: Vec<u8> },
    #[error("frame truncated, received {received} of {expected} bytes")]
    ShortFrame { received: usize, expected: usize },
    #[error("frame checksum mismatch (residue {residue:#06x})")]
    ChecksumMismatch { residue: u16 },
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where the session is in the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Waking,
    Querying,
    ReadingAck,
    ReadingPayload,
    Validating,
    Done,
    Failed,
}

/// Drives one console over an exclusively owned serial channel
///
/// The channel must already be opened and configured with a read timeout;
/// a read that times out is treated as "no more data".
pub struct Session<P> {
    port: P,
    state: SessionState,
    wake_backoff: Duration,
}

impl<P: Read + Write> Session<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            state: SessionState::Idle,
            wake_backoff: WAKE_BACKOFF,
        }
    }

    /// Override the pause between wake attempts
    pub fn with_wake_backoff(mut self, backoff: Duration) -> Self {
        self.wake_backoff = backoff;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Give the channel back, closing the session
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Run one full exchange and decode the returned frame
    ///
    /// Frames that fail the checksum are discarded without decoding. A
    /// returned observation may still carry `valid == false` if individual
    /// fields could not be decoded.
    pub fn poll(&mut self) -> Result<Observation, SessionError> {
        self.transition(SessionState::Idle);

        match self.exchange() {
            Ok(observation) => {
                self.transition(SessionState::Done);
                Ok(observation)
            }
            Err(e) => {
                match &e {
                    SessionError::WakeFailed { .. } => warn!("Initialization failed: {}", e),
                    SessionError::NotAcknowledged { .. } => warn!("Query rejected: {}", e),
                    SessionError::ShortFrame { .. } => warn!("Frame read timed out: {}", e),
                    SessionError::ChecksumMismatch { .. } => warn!("Frame discarded: {}", e),
                    SessionError::Io(_) => warn!("Serial channel failure: {}", e),
                }
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    fn exchange(&mut self) -> Result<Observation, SessionError> {
        self.transition(SessionState::Waking);
        self.wake()?;

        self.transition(SessionState::Querying);
        self.send(LOOP_COMMAND)?;

        self.transition(SessionState::ReadingAck);
        let ack = self.read_up_to(ACK_LEN)?;
        if ack.len() < ACK_LEN || ack[ACK_LEN - 1] != ACK {
            return Err(SessionError::NotAcknowledged { received: ack });
        }
        info!("Console acknowledged LOOP query");

        self.transition(SessionState::ReadingPayload);
        let frame = self.read_up_to(FRAME_LEN)?;
        if frame.len() < FRAME_LEN {
            return Err(SessionError::ShortFrame {
                received: frame.len(),
                expected: FRAME_LEN,
            });
        }

        self.transition(SessionState::Validating);
        if !crc::verify(&frame) {
            return Err(SessionError::ChecksumMismatch {
                residue: crc::checksum(&frame),
            });
        }
        debug!("Frame checksum valid: {:02x?}", frame);

        Ok(decoder::decode(&frame))
    }

    fn wake(&mut self) -> Result<(), SessionError> {
        for attempt in 1..=WAKE_ATTEMPTS {
            self.send(WAKE_PROBE)?;
            let line = self.read_line()?;

            if line == WAKE_REPLY {
                info!("Communication established on attempt {}", attempt);
                return Ok(());
            }

            info!(
                "Wake attempt {} of {} failed, received {:02x?}",
                attempt, WAKE_ATTEMPTS, line
            );
            thread::sleep(self.wake_backoff);
        }

        Err(SessionError::WakeFailed {
            attempts: WAKE_ATTEMPTS,
        })
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    /// Read until `\n`, a timeout, or the line limit
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        while line.len() < MAX_LINE_LEN {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(line)
    }

    /// Read up to `len` bytes, stopping early on a timeout
    fn read_up_to(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        buf.truncate(filled);
        Ok(buf)
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
