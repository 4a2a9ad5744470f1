//! infree Panel Core Library
//!
//! Implements the device side of the infree USB command channel: the
//! byte-at-a-time frame parser, the bounded byte queue between ingestion and
//! dispatch, and the dispatch loop that drives the backlight and display.
//! Also carries the host side of the link used by the control tool.

pub mod device;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod fifo;
pub mod link;
pub mod protocol;

pub use device::{Backlight, Lifecycle, Screen, Transport};
pub use dispatch::Dispatcher;
pub use display::{Framebuffer, ImageKind, Rgb, Surface};
pub use error::{Error, Result};
pub use fifo::ByteQueue;
pub use link::PanelLink;
pub use protocol::{FrameParser, Opcode};

/// Largest legal frame, and the size of both scratch buffers.
pub const MAX_FRAME: usize = 2 * 1024 * 1024;

/// Default byte queue capacity (room for two maximum frames).
pub const QUEUE_CAPACITY: usize = 2 * MAX_FRAME;

/// Default screen dimensions.
pub const SCREEN_WIDTH: u32 = 320;
pub const SCREEN_HEIGHT: u32 = 240;
