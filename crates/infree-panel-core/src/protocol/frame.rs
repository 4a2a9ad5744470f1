//! Frame layout, opcodes and host-side encoding.

use super::crc::crc8;
use crate::{Error, Result, MAX_FRAME};

/// Frame start marker.
pub const SENTINEL: u8 = 0x58;

/// Acknowledgement byte sent back after a command succeeds.
pub const ACK: u8 = 0x58;

/// Sentinel plus the 4-byte length field.
pub const HEADER_SIZE: usize = 5;

/// Smallest length (command + payload) the parser accepts.
pub const MIN_LENGTH: usize = 3;

/// Literal payload guarding the reboot-to-bootloader command.
pub const FEL_MAGIC: [u8; 3] = *b"FEL";

/// Command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Set the backlight level (payload: one byte, 0-255).
    SetBrightness = 0x01,
    /// Fill the screen with an opaque colour (payload: R, G, B).
    ClearScreen = 0x02,
    /// Decode and centre a JPEG stream.
    BlitJpg = 0x03,
    /// Decode and centre a PNG stream.
    BlitPng = 0x04,
    /// Reboot into FEL mode (payload: "FEL").
    RebootToFel = 0xFE,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0x01 => Ok(Opcode::SetBrightness),
            0x02 => Ok(Opcode::ClearScreen),
            0x03 => Ok(Opcode::BlitJpg),
            0x04 => Ok(Opcode::BlitPng),
            0xFE => Ok(Opcode::RebootToFel),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Opcode::SetBrightness => write!(f, "set-brightness"),
            Opcode::ClearScreen => write!(f, "clear-screen"),
            Opcode::BlitJpg => write!(f, "blit-jpg"),
            Opcode::BlitPng => write!(f, "blit-png"),
            Opcode::RebootToFel => write!(f, "reboot-to-fel"),
        }
    }
}

/// Decodes the big-endian length field from a frame header.
///
/// `header` must hold at least [`HEADER_SIZE`] bytes; byte 0 is the sentinel.
pub fn decode_length(header: &[u8]) -> usize {
    u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize
}

/// Builds a complete wire frame for `opcode` with `body` as payload.
///
/// Short bodies are zero-padded so the frame reaches [`MIN_LENGTH`].
pub fn encode_frame(opcode: Opcode, body: &[u8]) -> Result<Vec<u8>> {
    let length = (1 + body.len()).max(MIN_LENGTH);
    let max = MAX_FRAME - HEADER_SIZE;
    if length >= max {
        return Err(Error::FrameTooLarge { len: length, max });
    }

    let mut frame = Vec::with_capacity(length + HEADER_SIZE + 1);
    frame.push(SENTINEL);
    frame.extend_from_slice(&(length as u32).to_be_bytes());
    frame.push(opcode as u8);
    frame.extend_from_slice(body);
    frame.resize(HEADER_SIZE + length, 0);

    let crc = crc8(0, &frame);
    frame.push(crc);
    Ok(frame)
}
