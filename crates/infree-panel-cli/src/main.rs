//! infree Panel Control Tool
//!
//! Host CLI that sends framed commands to the panel over its USB serial port.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use infree_panel_core::display::parse_hex_color;
use infree_panel_core::link::DEFAULT_BAUD;
use infree_panel_core::protocol::FEL_MAGIC;
use infree_panel_core::{Opcode, PanelLink, Rgb};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "infreepanelctl")]
#[command(about = "Control tool for the infree panel")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Serial port the panel is attached to
    #[arg(long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Line rate
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Acknowledgement timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set backlight brightness
    Brightness {
        /// Level from 0 to 255
        level: u8,
    },
    /// Clear the display to a solid color
    Clear {
        /// Color in hex format (e.g., #FF0000 for red)
        #[arg(long, default_value = "#000000")]
        color: String,
    },
    /// Show a JPEG image, centred
    Jpg {
        /// Image file
        file: PathBuf,
    },
    /// Show a PNG image, centred
    Png {
        /// Image file
        file: PathBuf,
    },
    /// Reboot the panel into the FEL bootloader
    Fel,
    /// Print raw bytes received from the panel
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut link = PanelLink::open(&cli.port, cli.baud)
        .with_context(|| format!("Failed to open {}. Is the panel connected?", cli.port))?;
    let timeout = Duration::from_millis(cli.timeout);

    match cli.command {
        Commands::Brightness { level } => {
            link.send(Opcode::SetBrightness, &[level], timeout).await?;
            println!("Brightness set to: {}", level);
        }
        Commands::Clear { color } => {
            let rgb = parse_hex_color(&color)?;
            link.send(Opcode::ClearScreen, &clear_body(rgb), timeout).await?;
            println!("Display cleared to: {}", rgb);
        }
        Commands::Jpg { file } => send_image(&mut link, Opcode::BlitJpg, &file, timeout).await?,
        Commands::Png { file } => send_image(&mut link, Opcode::BlitPng, &file, timeout).await?,
        Commands::Fel => {
            link.send(Opcode::RebootToFel, &FEL_MAGIC, timeout).await?;
            println!("Panel rebooting to FEL");
        }
        Commands::Monitor => monitor(&mut link).await?,
    }

    Ok(())
}

/// CLEAR_SCREEN body: one byte per channel.
fn clear_body(color: Rgb) -> [u8; 3] {
    [color.r, color.g, color.b]
}

async fn send_image(
    link: &mut PanelLink,
    opcode: Opcode,
    file: &Path,
    timeout: Duration,
) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    if data.is_empty() {
        anyhow::bail!("{} is empty", file.display());
    }
    link.send(opcode, &data, timeout).await?;
    println!("Sent {} ({} bytes)", file.display(), data.len());
    Ok(())
}

async fn monitor(link: &mut PanelLink) -> Result<()> {
    println!("Monitoring {} (Ctrl-C to stop)", link.port_path());
    let mut buf = [0u8; 256];
    loop {
        let n = link.read(&mut buf).await?;
        if n == 0 {
            println!("Port closed");
            return Ok(());
        }
        let hex: Vec<String> = buf[..n].iter().map(|b| format!("{:02x}", b)).collect();
        println!("{}", hex.join(" "));
    }
}
