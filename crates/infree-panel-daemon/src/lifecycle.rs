//! Reboot into FEL and the hardware watchdog.

use infree_panel_core::Lifecycle;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::LifecycleConfig;
use crate::transport::AckFlush;

/// Upper bound on waiting for the ack to reach the host before rebooting.
const ACK_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Runs the configured reboot command.
pub struct PanelLifecycle {
    reboot_command: Vec<String>,
    acks: AckFlush,
}

impl PanelLifecycle {
    pub fn new(config: &LifecycleConfig, acks: AckFlush) -> Self {
        Self {
            reboot_command: config.reboot_command.clone(),
            acks,
        }
    }
}

impl Lifecycle for PanelLifecycle {
    fn reboot_to_bootloader(&mut self) -> ! {
        if !self.acks.wait_blocking(ACK_FLUSH_TIMEOUT) {
            warn!("Acknowledgement not flushed before reboot");
        }

        let Some((program, args)) = self.reboot_command.split_first() else {
            error!("No reboot command configured");
            std::process::exit(1);
        };

        info!("Rebooting to FEL: {}", self.reboot_command.join(" "));
        match Command::new(program).args(args).status() {
            Ok(status) if status.success() => std::process::exit(0),
            Ok(status) => {
                error!("Reboot command exited with {}", status);
                std::process::exit(1)
            }
            Err(e) => {
                error!("Failed to run reboot command: {}", e);
                std::process::exit(1)
            }
        }
    }
}

/// Linux watchdog device kept alive by periodic writes.
pub struct Watchdog {
    device: File,
}

impl Watchdog {
    /// Opens the watchdog device. The timer starts on open.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let device = std::fs::OpenOptions::new().write(true).open(path)?;
        info!("Watchdog armed on {}", path.display());
        Ok(Self { device })
    }

    /// Feeds the watchdog once.
    pub fn feed(&mut self) -> std::io::Result<()> {
        self.device.write_all(b"\0")?;
        self.device.flush()
    }
}

/// Feeds the watchdog every `interval` for the life of the process.
pub async fn watchdog_loop(mut watchdog: Watchdog, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut consecutive_errors: u32 = 0;

    loop {
        ticker.tick().await;
        match watchdog.feed() {
            Ok(()) => consecutive_errors = 0,
            Err(e) => {
                consecutive_errors += 1;
                // Log the first failure and then every 60th
                if consecutive_errors % 60 == 1 {
                    warn!(
                        "Watchdog feed failed ({} consecutive): {}",
                        consecutive_errors, e
                    );
                }
            }
        }
    }
}
