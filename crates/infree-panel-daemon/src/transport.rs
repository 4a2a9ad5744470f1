//! USB gadget serial transport.
//!
//! The port is split in two: a receive task feeds every incoming byte to the
//! frame parser, and a writer task drains acknowledgements queued by
//! [`SerialAck`]. [`AckFlush`] lets a caller wait until every queued
//! acknowledgement has left the writer.

use anyhow::{Context, Result};
use infree_panel_core::protocol::{FrameParser, ACK};
use infree_panel_core::{link, ByteQueue, Transport};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialStream;
use tracing::{debug, info, warn};

use crate::config::{ProtocolConfig, TransportConfig};

/// Pending acknowledgements the writer has not flushed yet.
const ACK_BACKLOG: usize = 64;

/// Read chunk size for the receive task.
const READ_CHUNK: usize = 4096;

/// Both halves of the opened port plus the acknowledgement channel.
pub struct SerialTransport {
    reader: ReadHalf<SerialStream>,
    writer: WriteHalf<SerialStream>,
    acks: AckChannel,
}

impl SerialTransport {
    /// Opens the configured device.
    pub fn open(config: &TransportConfig) -> Result<Self> {
        let port = link::open_port(&config.device, config.baud)
            .with_context(|| format!("Failed to open transport {}", config.device))?;
        info!("Transport open on {}", config.device);

        let (reader, writer) = tokio::io::split(port);
        Ok(Self {
            reader,
            writer,
            acks: AckChannel::new(),
        })
    }

    /// Returns the acknowledgement handle given to the dispatcher.
    pub fn ack(&self) -> SerialAck {
        self.acks.sender()
    }

    /// Returns a handle that waits for queued acknowledgements to go out.
    pub fn flush_handle(&self) -> AckFlush {
        self.acks.flush_handle()
    }

    /// Spawns the receive and writer tasks.
    pub fn spawn(self, queue: Arc<ByteQueue>, protocol: &ProtocolConfig) {
        let parser = FrameParser::with_max_frame(queue, protocol.max_frame);
        tokio::spawn(receive_loop(self.reader, parser));
        tokio::spawn(self.acks.write_loop(self.writer));
    }
}

/// Feeds the parser until the port closes.
async fn receive_loop<R: AsyncRead + Unpin>(mut reader: R, mut parser: FrameParser) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                warn!("Transport closed by host");
                break;
            }
            Ok(n) => parser.receive(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Transport read failed: {}", e);
                break;
            }
        }
    }
}

/// Counts of acknowledgements queued and written, shared by both ends.
struct AckCounters {
    queued: AtomicU64,
    written: watch::Sender<u64>,
}

/// Acknowledgement channel between the dispatcher and the writer task.
pub struct AckChannel {
    tx: mpsc::Sender<u8>,
    rx: mpsc::Receiver<u8>,
    counters: Arc<AckCounters>,
}

impl AckChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(ACK_BACKLOG);
        let (written, _) = watch::channel(0);
        Self {
            tx,
            rx,
            counters: Arc::new(AckCounters {
                queued: AtomicU64::new(0),
                written,
            }),
        }
    }

    pub fn sender(&self) -> SerialAck {
        SerialAck {
            tx: self.tx.clone(),
            counters: self.counters.clone(),
        }
    }

    pub fn flush_handle(&self) -> AckFlush {
        AckFlush {
            counters: self.counters.clone(),
            written: self.counters.written.subscribe(),
        }
    }

    /// Writes queued acknowledgements to the host.
    ///
    /// Every byte counts as written once the write attempt finishes, failed
    /// or not, so a waiter on [`AckFlush`] is never left hanging.
    pub async fn write_loop<W: AsyncWrite + Unpin>(self, mut writer: W) {
        let Self {
            tx,
            mut rx,
            counters,
        } = self;
        drop(tx);

        while let Some(byte) = rx.recv().await {
            let result = async {
                writer.write_all(&[byte]).await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = result {
                warn!("Failed to send acknowledgement: {}", e);
            }
            counters.written.send_modify(|n| *n += 1);
        }
        debug!("Acknowledgement channel closed");
    }
}

/// [`Transport`] handle that hands the ack byte to the writer task.
#[derive(Clone)]
pub struct SerialAck {
    tx: mpsc::Sender<u8>,
    counters: Arc<AckCounters>,
}

impl Transport for SerialAck {
    fn acknowledge(&mut self) -> infree_panel_core::Result<()> {
        self.tx
            .try_send(ACK)
            .map_err(|e| io::Error::new(io::ErrorKind::WouldBlock, e.to_string()))?;
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Waits for the writer task to catch up with queued acknowledgements.
pub struct AckFlush {
    counters: Arc<AckCounters>,
    written: watch::Receiver<u64>,
}

impl AckFlush {
    /// Waits until every ack queued so far has been written.
    ///
    /// Returns `false` if `timeout` expires or the writer task is gone.
    pub async fn wait(&mut self, timeout: Duration) -> bool {
        let target = self.counters.queued.load(Ordering::SeqCst);
        let caught_up = self.written.wait_for(|&written| written >= target);
        matches!(tokio::time::timeout(timeout, caught_up).await, Ok(Ok(_)))
    }

    /// Blocking form of [`wait`](Self::wait) for synchronous callers on a
    /// multi-threaded runtime.
    ///
    /// The calling worker hands its queued tasks to the other workers first,
    /// so the writer task can run while this thread blocks.
    pub fn wait_blocking(&mut self, timeout: Duration) -> bool {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.wait(timeout))
        })
    }
}
