//! Command dispatch loop.
//!
//! Drains `{header, payload}` pairs from the byte queue, decodes the opcode
//! and drives the collaborators. Every failure is local: a bad header resets
//! the queue, a bad command or an undecodable image is skipped, and in all
//! of those cases the host simply sees no acknowledgement.

mod command;

pub use command::{brightness_value, Command, CommandError};

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::device::{Backlight, Lifecycle, Screen, Transport};
use crate::display::{centered_origin, decode, ImageKind};
use crate::fifo::ByteQueue;
use crate::protocol::{decode_length, HEADER_SIZE, SENTINEL};
use crate::{Error, Result, MAX_FRAME};

/// Outcome of one dispatch iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No complete frame buffered yet.
    Idle,
    /// A frame was consumed without acknowledgement.
    Ignored,
    /// A command ran and the host was acknowledged.
    Acknowledged,
}

/// Frame-level read position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Header,
    /// Header consumed; `generation` is the queue generation it was read in.
    Payload { length: usize, generation: u64 },
}

/// The dispatch task and the collaborators it owns.
pub struct Dispatcher<T, B, S, L> {
    queue: Arc<ByteQueue>,
    scratch: Vec<u8>,
    pending: Pending,
    transport: T,
    backlight: B,
    screen: S,
    lifecycle: L,
}

impl<T, B, S, L> Dispatcher<T, B, S, L>
where
    T: Transport,
    B: Backlight,
    S: Screen,
    L: Lifecycle,
{
    /// Creates a dispatcher with a [`MAX_FRAME`] payload buffer.
    pub fn new(
        queue: Arc<ByteQueue>,
        transport: T,
        backlight: B,
        screen: S,
        lifecycle: L,
    ) -> Self {
        Self::with_max_frame(queue, transport, backlight, screen, lifecycle, MAX_FRAME)
    }

    /// Creates a dispatcher with a custom payload buffer size.
    pub fn with_max_frame(
        queue: Arc<ByteQueue>,
        transport: T,
        backlight: B,
        screen: S,
        lifecycle: L,
        max_frame: usize,
    ) -> Self {
        Self {
            queue,
            scratch: vec![0; max_frame],
            pending: Pending::Header,
            transport,
            backlight,
            screen,
            lifecycle,
        }
    }

    /// Runs forever, yielding to the scheduler after every iteration.
    pub async fn run(mut self) {
        info!("Dispatch loop started");
        loop {
            if self.step() == Step::Idle {
                self.queue.readable().await;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Processes at most one frame.
    pub fn step(&mut self) -> Step {
        match self.poll_frame() {
            Some(length) => self.execute(length),
            None => Step::Idle,
        }
    }

    /// Moves the next complete payload into the scratch buffer.
    ///
    /// A header whose payload has not fully arrived is remembered, so the
    /// next call resumes with the payload read. If the queue was reset in
    /// between, the remembered header is stale and is dropped.
    fn poll_frame(&mut self) -> Option<usize> {
        let (length, generation) = match self.pending {
            Pending::Payload { length, generation } => (length, generation),
            Pending::Header => {
                let mut header = [0u8; HEADER_SIZE];
                let (got, generation) = self.queue.get_marked(&mut header);
                if got == 0 {
                    return None;
                }
                let length = decode_length(&header);
                if header[0] != SENTINEL
                    || length == 0
                    || length >= self.scratch.len()
                    || length > self.queue.capacity()
                {
                    warn!("Bad frame header {:02X?}, resetting queue", header);
                    self.queue.reset();
                    return None;
                }
                self.pending = Pending::Payload { length, generation };
                (length, generation)
            }
        };

        match self.queue.get_since(&mut self.scratch[..length], generation) {
            None => {
                debug!("Queue reset under a pending {} byte frame", length);
                self.pending = Pending::Header;
                self.poll_frame()
            }
            Some(0) => None,
            Some(_) => {
                self.pending = Pending::Header;
                Some(length)
            }
        }
    }

    fn execute(&mut self, length: usize) -> Step {
        let command = match Command::parse(&self.scratch[..length]) {
            Ok(command) => command,
            Err(e) => {
                debug!("Ignoring frame: {}", e);
                return Step::Ignored;
            }
        };
        let opcode = command.opcode();
        debug!("Dispatching {} ({} bytes)", opcode, length);

        let result = match command {
            Command::SetBrightness(level) => {
                self.backlight.set_brightness(brightness_value(level))
            }
            Command::ClearScreen(color) => {
                self.screen.clear(color);
                self.screen.present()
            }
            Command::Blit { kind, data } => blit(&mut self.screen, kind, data),
            Command::RebootToFel => {
                if let Err(e) = self.transport.acknowledge() {
                    warn!("Failed to acknowledge {}: {}", opcode, e);
                }
                info!("Rebooting into FEL mode");
                self.lifecycle.reboot_to_bootloader()
            }
        };

        match result {
            Ok(()) => match self.transport.acknowledge() {
                Ok(()) => Step::Acknowledged,
                Err(e) => {
                    warn!("Failed to acknowledge {}: {}", opcode, e);
                    Step::Ignored
                }
            },
            Err(Error::Image(e)) => {
                debug!("Dropping {}: {}", opcode, e);
                Step::Ignored
            }
            Err(e) => {
                warn!("{} failed: {}", opcode, e);
                Step::Ignored
            }
        }
    }
}

/// Decodes an image, centres it on the screen and presents it.
fn blit<S: Screen>(screen: &mut S, kind: ImageKind, data: &[u8]) -> Result<()> {
    let surface = decode(data, kind)?;
    let (x, y) = centered_origin(screen.size(), surface.dimensions());
    screen.blit(&surface, x, y);
    screen.present()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{Rgb, Surface};
    use crate::protocol::{encode_frame, FrameParser, Opcode};
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Ack,
        Brightness(u32),
        Clear(Rgb),
        Blit { size: (u32, u32), x: i32, y: i32 },
        Present,
        Reboot,
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    struct Mock {
        log: Log,
        fail_present: bool,
    }

    impl Mock {
        fn record(&self, event: Event) {
            self.log.lock().unwrap().push(event);
        }
    }

    impl Transport for Mock {
        fn acknowledge(&mut self) -> Result<()> {
            self.record(Event::Ack);
            Ok(())
        }
    }

    impl Backlight for Mock {
        fn set_brightness(&mut self, value: u32) -> Result<()> {
            self.record(Event::Brightness(value));
            Ok(())
        }
    }

    impl Screen for Mock {
        fn size(&self) -> (u32, u32) {
            (320, 240)
        }

        fn clear(&mut self, color: Rgb) {
            self.record(Event::Clear(color));
        }

        fn blit(&mut self, surface: &Surface, x: i32, y: i32) {
            self.record(Event::Blit {
                size: surface.dimensions(),
                x,
                y,
            });
        }

        fn present(&mut self) -> Result<()> {
            if self.fail_present {
                return Err(Error::Io(std::io::Error::other("panel gone")));
            }
            self.record(Event::Present);
            Ok(())
        }
    }

    impl Lifecycle for Mock {
        fn reboot_to_bootloader(&mut self) -> ! {
            self.record(Event::Reboot);
            panic!("rebooted");
        }
    }

    struct Rig {
        log: Log,
        queue: Arc<ByteQueue>,
        parser: FrameParser,
        dispatcher: Dispatcher<Mock, Mock, Mock, Mock>,
    }

    impl Rig {
        fn new() -> Self {
            Self::with_present_failure(false)
        }

        fn with_present_failure(fail_present: bool) -> Self {
            let log = Log::default();
            let mock = || Mock {
                log: log.clone(),
                fail_present,
            };
            let queue = Arc::new(ByteQueue::new(4096));
            let parser = FrameParser::with_max_frame(queue.clone(), 1024);
            let dispatcher =
                Dispatcher::with_max_frame(queue.clone(), mock(), mock(), mock(), mock(), 1024);
            Self {
                log,
                queue,
                parser,
                dispatcher,
            }
        }

        fn send(&mut self, opcode: Opcode, body: &[u8]) {
            let frame = encode_frame(opcode, body).unwrap();
            self.parser.receive(&frame);
        }

        fn events(&self) -> Vec<Event> {
            self.log.lock().unwrap().clone()
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = Surface::from_pixel(width, height, Rgba([1, 2, 3, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_brightness_end_to_end() {
        let mut rig = Rig::new();
        rig.parser
            .receive(&[0x58, 0x00, 0x00, 0x00, 0x03, 0x01, 0x80, 0x00, 0x3b]);

        assert_eq!(rig.dispatcher.step(), Step::Acknowledged);
        assert_eq!(rig.dispatcher.step(), Step::Idle);
        assert_eq!(rig.events(), vec![Event::Brightness(501), Event::Ack]);
    }

    #[test]
    fn test_clear_then_brightness_back_to_back() {
        let mut rig = Rig::new();
        let mut stream = encode_frame(Opcode::ClearScreen, &[0xFF, 0x00, 0x00]).unwrap();
        stream.extend(encode_frame(Opcode::SetBrightness, &[0xFF]).unwrap());
        rig.parser.receive(&stream);

        assert_eq!(rig.dispatcher.step(), Step::Acknowledged);
        assert_eq!(rig.dispatcher.step(), Step::Acknowledged);
        assert_eq!(rig.dispatcher.step(), Step::Idle);
        assert_eq!(
            rig.events(),
            vec![
                Event::Clear(Rgb::new(0xFF, 0, 0)),
                Event::Present,
                Event::Ack,
                Event::Brightness(1000),
                Event::Ack,
            ]
        );
    }

    #[test]
    fn test_blit_png_centered() {
        let mut rig = Rig::new();
        rig.send(Opcode::BlitPng, &png(100, 50));

        assert_eq!(rig.dispatcher.step(), Step::Acknowledged);
        assert_eq!(
            rig.events(),
            vec![
                Event::Blit {
                    size: (100, 50),
                    x: 110,
                    y: 95
                },
                Event::Present,
                Event::Ack,
            ]
        );
    }

    #[test]
    fn test_corrupt_image_ignored() {
        let mut rig = Rig::new();
        rig.send(Opcode::BlitPng, b"definitely not a png");
        rig.send(Opcode::BlitJpg, &png(4, 4));

        assert_eq!(rig.dispatcher.step(), Step::Ignored);
        assert_eq!(rig.dispatcher.step(), Step::Ignored);
        assert!(rig.events().is_empty());
    }

    #[test]
    fn test_unknown_and_malformed_ignored() {
        let mut rig = Rig::new();
        rig.parser.receive(&{
            let mut frame = vec![0x58, 0, 0, 0, 3, 0x42, 1, 2];
            frame.push(crate::protocol::crc8(0, &frame));
            frame
        });
        rig.send(Opcode::ClearScreen, &[0xFF, 0x00]);
        rig.send(Opcode::RebootToFel, b"FEX");

        assert_eq!(rig.dispatcher.step(), Step::Ignored);
        assert_eq!(rig.dispatcher.step(), Step::Ignored);
        assert_eq!(rig.dispatcher.step(), Step::Ignored);
        assert!(rig.events().is_empty());
    }

    #[test]
    fn test_collaborator_failure_not_acknowledged() {
        let mut rig = Rig::with_present_failure(true);
        rig.send(Opcode::ClearScreen, &[1, 2, 3]);

        assert_eq!(rig.dispatcher.step(), Step::Ignored);
        assert_eq!(rig.events(), vec![Event::Clear(Rgb::new(1, 2, 3))]);
    }

    #[test]
    fn test_reboot_acknowledges_first() {
        let mut rig = Rig::new();
        rig.send(Opcode::RebootToFel, b"FEL");

        let result = catch_unwind(AssertUnwindSafe(|| rig.dispatcher.step()));
        assert!(result.is_err());
        assert_eq!(rig.events(), vec![Event::Ack, Event::Reboot]);
    }

    #[test]
    fn test_payload_arrives_later() {
        let mut rig = Rig::new();
        let frame = encode_frame(Opcode::SetBrightness, &[0x33]).unwrap();
        let queued = &frame[..frame.len() - 1];

        rig.queue.put(&queued[..HEADER_SIZE]);
        assert_eq!(rig.dispatcher.step(), Step::Idle);
        rig.queue.put(&queued[HEADER_SIZE..HEADER_SIZE + 1]);
        assert_eq!(rig.dispatcher.step(), Step::Idle);
        rig.queue.put(&queued[HEADER_SIZE + 1..]);
        assert_eq!(rig.dispatcher.step(), Step::Acknowledged);
        assert_eq!(rig.events(), vec![Event::Brightness(200), Event::Ack]);
    }

    #[test]
    fn test_overflow_drops_pending_header() {
        let log = Log::default();
        let mock = || Mock {
            log: log.clone(),
            fail_present: false,
        };
        let queue = Arc::new(ByteQueue::new(64));
        let mut parser = FrameParser::with_max_frame(queue.clone(), 64);
        let mut dispatcher =
            Dispatcher::with_max_frame(queue.clone(), mock(), mock(), mock(), mock(), 64);

        // Header of a 40 byte frame arrives, its payload never does
        let cut = encode_frame(Opcode::BlitPng, &[0xAA; 39]).unwrap();
        queue.put(&cut[..HEADER_SIZE + 10]);
        assert_eq!(dispatcher.step(), Step::Idle);

        // Enough new traffic to overflow the queue
        queue.put(&[0x00; 60]);
        for level in [0x33, 0xFF] {
            parser.receive(&encode_frame(Opcode::SetBrightness, &[level]).unwrap());
        }

        let mut steps = Vec::new();
        loop {
            match dispatcher.step() {
                Step::Idle => break,
                step => steps.push(step),
            }
        }
        assert_eq!(steps, vec![Step::Acknowledged, Step::Acknowledged]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Brightness(200),
                Event::Ack,
                Event::Brightness(1000),
                Event::Ack,
            ]
        );
    }

    #[test]
    fn test_bad_header_resets_queue() {
        let mut rig = Rig::new();
        for header in [
            [0x58, 0, 0, 0, 0],
            [0x58, 0, 0, 0x04, 0x00],
            [0x58, 0xFF, 0xFF, 0xFF, 0xFF],
            [0x57, 0, 0, 0, 3],
        ] {
            rig.queue.put(&header);
            rig.queue.put(&[0x01, 0x02, 0x03]);
            assert_eq!(rig.dispatcher.step(), Step::Idle);
            assert!(rig.queue.is_empty(), "header {:02X?}", header);
        }

        rig.send(Opcode::SetBrightness, &[0]);
        assert_eq!(rig.dispatcher.step(), Step::Acknowledged);
    }

    #[tokio::test]
    async fn test_run_loop_processes_frames() {
        let log = Log::default();
        let mock = || Mock {
            log: log.clone(),
            fail_present: false,
        };
        let queue = Arc::new(ByteQueue::new(4096));
        let mut parser = FrameParser::with_max_frame(queue.clone(), 1024);
        let dispatcher =
            Dispatcher::with_max_frame(queue.clone(), mock(), mock(), mock(), mock(), 1024);
        let handle = tokio::spawn(dispatcher.run());

        parser.receive(&encode_frame(Opcode::SetBrightness, &[0x80]).unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;
        parser.receive(&encode_frame(Opcode::ClearScreen, &[0, 0, 0]).unwrap());

        let expected = vec![
            Event::Brightness(501),
            Event::Ack,
            Event::Clear(Rgb::new(0, 0, 0)),
            Event::Present,
            Event::Ack,
        ];
        tokio::time::timeout(Duration::from_secs(2), async {
            while log.lock().unwrap().len() < expected.len() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("dispatch loop stalled");

        assert_eq!(*log.lock().unwrap(), expected);
        handle.abort();
    }
}
