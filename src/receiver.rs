//! Receive assembler
//!
//! Collects received bytes into a fixed frame buffer until a frame is complete:
//!
//! 1. Frame ends with the terminator `\r\n`
//! 2. Frame ends with the send prompt `> `
//! 3. A `+IPD` frame received its full announced payload
//! 4. The watchdog forced a flush
//!
//! A `+IPD` frame is held open until its payload is complete, as the payload may contain a terminator.
use crate::parser::{find, IpdHeader, IPD_PREFIX};

const TERMINATOR: &[u8] = b"\r\n";
const PROMPT: &[u8] = b"> ";

/// Result of a frame completion check
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FrameState {
    /// More bytes are expected
    Incomplete,
    /// Frame is empty or just a terminator, buffer was reset
    Discarded,
    /// Frame is ready for parsing
    Complete,
}

/// Frame buffer of the receive path
pub(crate) struct Receiver<const RX_SIZE: usize> {
    buffer: [u8; RX_SIZE],

    /// Fill length, wraps at RX_SIZE
    length: usize,

    /// Frame length at which a started `+IPD` payload is complete
    payload_end: Option<usize>,
}

impl<const RX_SIZE: usize> Receiver<RX_SIZE> {
    pub(crate) const fn new() -> Self {
        Self {
            buffer: [0x0; RX_SIZE],
            length: 0,
            payload_end: None,
        }
    }

    /// Appends a byte. On overflow the index wraps and previously buffered bytes get overwritten.
    pub(crate) fn push(&mut self, byte: u8) {
        self.buffer[self.length] = byte;
        self.length = (self.length + 1) % RX_SIZE;

        if self.length == 0 {
            warn!("Receive buffer overflow, {} bytes discarded", RX_SIZE);
            self.payload_end = None;
        }
    }

    /// Checks whether the buffered bytes form a complete frame. Called after every pushed byte.
    pub(crate) fn poll(&mut self) -> FrameState {
        if self.length < TERMINATOR.len() {
            return FrameState::Incomplete;
        }

        if self.frame() == TERMINATOR {
            self.reset();
            return FrameState::Discarded;
        }

        // Header of socket data is complete once its colon arrived
        if self.payload_end.is_none() && self.buffer[self.length - 1] == b':' {
            if let Some(IpdHeader::Complete { length, .. }) = self.ipd_header() {
                // Payload exceeding the buffer gets truncated
                self.payload_end = Some(self.length.saturating_add(length).min(RX_SIZE - 1));
            }
        }

        if let Some(end) = self.payload_end {
            return match self.length >= end {
                true => FrameState::Complete,
                false => FrameState::Incomplete,
            };
        }

        let frame = self.frame();
        if !frame.ends_with(TERMINATOR) && !frame.ends_with(PROMPT) {
            return FrameState::Incomplete;
        }

        match self.ipd_header() {
            Some(IpdHeader::Incomplete) => FrameState::Incomplete,
            _ => FrameState::Complete,
        }
    }

    /// Completes the pending frame, used on watchdog expiry.
    ///
    /// Text frames get a synthetic terminator. Socket data is completed as received, so the
    /// terminator never ends up in the payload.
    pub(crate) fn force(&mut self) -> FrameState {
        if self.length == 0 {
            self.reset();
            return FrameState::Discarded;
        }

        if self.payload_end.is_none() {
            // A full buffer gets its tail overwritten instead of wrapping around
            self.length = self.length.min(RX_SIZE - 1 - TERMINATOR.len());
            TERMINATOR.iter().for_each(|byte| self.push(*byte));
        }

        if self.frame() == TERMINATOR {
            self.reset();
            return FrameState::Discarded;
        }

        FrameState::Complete
    }

    /// Currently buffered bytes
    pub(crate) fn frame(&self) -> &[u8] {
        &self.buffer[..self.length]
    }

    /// Empties the buffer
    pub(crate) fn reset(&mut self) {
        self.length = 0;
        self.payload_end = None;
    }

    /// Parses the `+IPD` header of the current frame, None if the frame contains no socket data
    fn ipd_header(&self) -> Option<IpdHeader> {
        let frame = self.frame();
        let header_start = find(frame, IPD_PREFIX)? + IPD_PREFIX.len();

        Some(IpdHeader::parse(&frame[header_start..]))
    }
}
