//! Command decoding from a queued payload.

use thiserror::Error;

use crate::display::{ImageKind, Rgb};
use crate::protocol::{Opcode, FEL_MAGIC};

/// A validated command borrowing its data from the payload buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    SetBrightness(u8),
    ClearScreen(Rgb),
    Blit { kind: ImageKind, data: &'a [u8] },
    RebootToFel,
}

/// Why a payload was not turned into a command.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty payload")]
    Empty,

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("malformed {0} payload ({1} bytes)")]
    Malformed(Opcode, usize),
}

impl<'a> Command<'a> {
    /// Decodes `payload`, where `payload[0]` is the opcode.
    ///
    /// Trailing bytes beyond what a command needs are ignored, since short
    /// commands are padded up to the minimum frame length.
    pub fn parse(payload: &'a [u8]) -> Result<Self, CommandError> {
        let (&first, body) = payload.split_first().ok_or(CommandError::Empty)?;
        let opcode = Opcode::try_from(first).map_err(CommandError::UnknownOpcode)?;
        let malformed = CommandError::Malformed(opcode, payload.len());

        match opcode {
            Opcode::SetBrightness => body
                .first()
                .map(|&level| Command::SetBrightness(level))
                .ok_or(malformed),
            Opcode::ClearScreen => match body {
                [r, g, b, ..] => Ok(Command::ClearScreen(Rgb::new(*r, *g, *b))),
                _ => Err(malformed),
            },
            Opcode::BlitJpg | Opcode::BlitPng if body.is_empty() => Err(malformed),
            Opcode::BlitJpg => Ok(Command::Blit {
                kind: ImageKind::Jpeg,
                data: body,
            }),
            Opcode::BlitPng => Ok(Command::Blit {
                kind: ImageKind::Png,
                data: body,
            }),
            Opcode::RebootToFel if body.starts_with(&FEL_MAGIC) => Ok(Command::RebootToFel),
            Opcode::RebootToFel => Err(malformed),
        }
    }

    /// Opcode this command was decoded from.
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::SetBrightness(_) => Opcode::SetBrightness,
            Command::ClearScreen(_) => Opcode::ClearScreen,
            Command::Blit {
                kind: ImageKind::Jpeg,
                ..
            } => Opcode::BlitJpg,
            Command::Blit {
                kind: ImageKind::Png,
                ..
            } => Opcode::BlitPng,
            Command::RebootToFel => Opcode::RebootToFel,
        }
    }
}

/// Maps a 0-255 level onto the 0..=1000 backlight scale.
pub fn brightness_value(level: u8) -> u32 {
    u32::from(level) * 1000 / 255
}
