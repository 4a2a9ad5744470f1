//! Host side of the command channel over a serial port.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info};

use crate::protocol::{encode_frame, Opcode, ACK};
use crate::{Error, Result};

/// Default line rate. CDC-ACM gadgets ignore it; real UARTs do not.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Opens a serial port as 8N1, mapping a missing device to
/// [`Error::PortNotFound`].
pub fn open_port(path: &str, baud: u32) -> Result<SerialStream> {
    tokio_serial::new(path, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()
        .map_err(|e| {
            // Gadget ttys come and go with the cable; report that plainly
            if std::path::Path::new(path).exists() {
                Error::Serial(e)
            } else {
                Error::PortNotFound(path.to_string())
            }
        })
}

/// Connection from the host to a panel.
pub struct PanelLink {
    port: SerialStream,
    port_path: String,
}

impl PanelLink {
    /// Opens the serial port the panel is attached to.
    pub fn open(port_path: &str, baud: u32) -> Result<Self> {
        let port = open_port(port_path, baud)?;
        info!("Opened {} at {} baud", port_path, baud);
        Ok(Self {
            port,
            port_path: port_path.to_string(),
        })
    }

    /// Returns the port path.
    pub fn port_path(&self) -> &str {
        &self.port_path
    }

    /// Encodes and sends one command, then waits for its acknowledgement.
    pub async fn send(&mut self, opcode: Opcode, body: &[u8], timeout: Duration) -> Result<()> {
        let frame = encode_frame(opcode, body)?;
        debug!("Sending {} frame ({} bytes)", opcode, frame.len());
        self.send_frame(&frame, timeout).await
    }

    /// Writes a pre-encoded frame and waits for the ack byte.
    ///
    /// Bytes other than the ack are skipped. The device sends nothing at all
    /// for a frame it rejected, so a missing ack ends in
    /// [`Error::AckTimeout`].
    pub async fn send_frame(&mut self, frame: &[u8], timeout: Duration) -> Result<()> {
        self.port.write_all(frame).await?;
        self.port.flush().await?;

        let port = &mut self.port;
        let wait = async {
            loop {
                let byte = port.read_u8().await?;
                if byte == ACK {
                    return Ok::<_, Error>(());
                }
                debug!("Skipping stray byte {:#04x}", byte);
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::AckTimeout(timeout)),
        }
    }

    /// Reads whatever the device sent.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.port.read(buf).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        // open_native_async registers with the reactor, so enter a runtime.
        let _guard = runtime.enter();
        match PanelLink::open("/dev/does-not-exist-infree", DEFAULT_BAUD) {
            Err(Error::PortNotFound(path)) => assert_eq!(path, "/dev/does-not-exist-infree"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opened a missing port"),
        }
    }
}
