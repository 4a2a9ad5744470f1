//! Wire protocol: checksum, frame layout and the byte-at-a-time parser.
//!
//! Frame structure (length is big-endian and counts command + payload):
//! - Sentinel byte: 0x58
//! - Length: 4 bytes
//! - Command opcode: 1 byte
//! - Payload: length - 1 bytes
//! - CRC-8 over every preceding byte

pub mod crc;
mod frame;
mod parser;

pub use crc::crc8;
pub use frame::{
    decode_length, encode_frame, Opcode, ACK, FEL_MAGIC, HEADER_SIZE, MIN_LENGTH, SENTINEL,
};
pub use parser::{FrameParser, ParseState};
