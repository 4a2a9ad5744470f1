//! Byte-at-a-time frame parser.
//!
//! Accumulates the raw frame in an owned scratch buffer and, once the CRC
//! checks out, pushes everything but the CRC byte into the byte queue.
//! Corrupt or out-of-range frames are dropped silently: the parser simply
//! resynchronizes on the next sentinel.

use std::sync::Arc;
use tracing::trace;

use super::crc::crc8;
use super::frame::{decode_length, HEADER_SIZE, MIN_LENGTH, SENTINEL};
use crate::fifo::ByteQueue;
use crate::MAX_FRAME;

/// Parser position within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for the sentinel byte.
    Header,
    /// Length byte 0 (most significant).
    Length0,
    Length1,
    Length2,
    /// Length byte 3; the length is validated here.
    Length3,
    /// Command opcode.
    Command,
    /// Payload bytes.
    Data,
    /// Trailing checksum.
    Crc,
}

/// Frame parser feeding a [`ByteQueue`].
pub struct FrameParser {
    state: ParseState,
    buffer: Vec<u8>,
    cursor: usize,
    length: usize,
    queue: Arc<ByteQueue>,
}

impl FrameParser {
    /// Creates a parser with a [`MAX_FRAME`] scratch buffer.
    pub fn new(queue: Arc<ByteQueue>) -> Self {
        Self::with_max_frame(queue, MAX_FRAME)
    }

    /// Creates a parser with a custom scratch buffer size.
    pub fn with_max_frame(queue: Arc<ByteQueue>, max_frame: usize) -> Self {
        Self {
            state: ParseState::Header,
            buffer: vec![0; max_frame],
            cursor: 0,
            length: 0,
            queue,
        }
    }

    /// Current state.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Scratch buffer size.
    pub fn max_frame(&self) -> usize {
        self.buffer.len()
    }

    /// Returns to `Header` with an empty cursor.
    pub fn reset(&mut self) {
        self.state = ParseState::Header;
        self.cursor = 0;
        self.length = 0;
    }

    fn store(&mut self, byte: u8) {
        self.buffer[self.cursor] = byte;
        self.cursor += 1;
    }

    /// Feeds one received byte.
    pub fn receive_byte(&mut self, byte: u8) {
        match self.state {
            ParseState::Header => {
                self.cursor = 0;
                if byte == SENTINEL {
                    self.store(byte);
                    self.state = ParseState::Length0;
                }
            }
            ParseState::Length0 => {
                self.store(byte);
                self.state = ParseState::Length1;
            }
            ParseState::Length1 => {
                self.store(byte);
                self.state = ParseState::Length2;
            }
            ParseState::Length2 => {
                self.store(byte);
                self.state = ParseState::Length3;
            }
            ParseState::Length3 => {
                self.store(byte);
                let length = decode_length(&self.buffer[..HEADER_SIZE]);
                if length >= MIN_LENGTH && length < self.max_frame() - HEADER_SIZE {
                    self.length = length;
                    self.state = ParseState::Command;
                } else {
                    trace!("Dropping frame with length {}", length);
                    self.reset();
                }
            }
            ParseState::Command => {
                self.store(byte);
                self.state = ParseState::Data;
            }
            ParseState::Data => {
                let last = self.cursor == self.length + 4;
                self.store(byte);
                if last {
                    self.state = ParseState::Crc;
                }
            }
            ParseState::Crc => {
                let end = self.length + HEADER_SIZE;
                self.store(byte);
                let crc = crc8(0, &self.buffer[..end]);
                if crc == byte {
                    self.queue.put(&self.buffer[..end]);
                    trace!("Queued frame, length {}", self.length);
                } else {
                    trace!("CRC mismatch: computed {:#04x}, got {:#04x}", crc, byte);
                }
                self.reset();
            }
        }
    }

    /// Feeds a run of received bytes in order.
    pub fn receive(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.receive_byte(byte);
        }
    }
}
