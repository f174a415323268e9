//! UART Link
//!
//! Command-line front end for the `uart_link` frame transport. Useful for
//! poking a board by hand and for checking a wired loopback.
//!
//! # Usage
//!
//! ```bash
//! # List available serial ports (requires serial feature)
//! uart-link ports
//!
//! # Send a frame, no reply expected
//! uart-link -p /dev/ttyUSB0 send 01 02 03
//!
//! # Send a frame and read back a reply of the same length
//! uart-link -p /dev/ttyUSB0 --timeout-ms 100 xfer 0102ff
//!
//! # Header-prefixed frame (1 head byte, 2 data bytes by default)
//! uart-link -p /dev/ttyUSB0 hex 0x02 0x1234
//!
//! # Self-test on a device with TX wired to RX
//! uart-link -p /dev/ttyUSB0 loopback --count 10
//!
//! # Everything from a file
//! uart-link --config board.toml xfer 00 00 00
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use uart_link::{ChannelConfig, SerialChannel};

/// UART Link
///
/// Send and receive raw frames over a USB-to-serial bridge
#[derive(Parser)]
#[command(name = "uart-link")]
#[command(version)]
#[command(about = "Raw frame transport over a USB-to-serial link")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Channel configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial device path (e.g., /dev/ttyUSB0)
    #[arg(short, long, global = true)]
    port: Option<PathBuf>,

    /// Baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Transmit buffer size in bytes
    #[arg(long, global = true)]
    buffer_size: Option<usize>,

    /// Poll for replies for up to this many milliseconds
    #[arg(short, long, global = true)]
    timeout_ms: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    #[cfg(feature = "serial")]
    Ports {
        /// Only show USB-to-UART bridges
        #[arg(long)]
        bridges: bool,
    },

    /// Send a frame without reading a reply
    Send {
        /// Frame bytes in hex (e.g., "01 02 ff" or "0102ff")
        #[arg(required = true)]
        bytes: Vec<String>,
    },

    /// Send a frame and read back a reply
    Xfer {
        /// Frame bytes in hex
        #[arg(required = true)]
        bytes: Vec<String>,

        /// Terminate the frame with LF and read the reply up to LF
        #[arg(long)]
        lf: bool,

        /// Reply buffer size for --lf
        #[arg(long, default_value_t = 256)]
        max_reply: usize,
    },

    /// Send a header-prefixed frame and read back a reply of the same length
    Hex {
        /// Header value (decimal or 0x-prefixed)
        head: String,

        /// Data value (decimal or 0x-prefixed)
        data: String,
    },

    /// Check a device whose TX is wired to its RX
    Loopback {
        /// Test frame in hex
        #[arg(short, long, default_value = "010203")]
        frame: String,

        /// Number of round trips
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        #[cfg(feature = "serial")]
        Commands::Ports { bridges } => print_ports(bridges),
        Commands::Send { ref bytes } => {
            let frame = parse_hex_bytes(bytes)?;
            let mut channel = open_channel(&cli)?;
            handle_send(&mut channel, &frame)
        }
        Commands::Xfer {
            ref bytes,
            lf,
            max_reply,
        } => {
            let frame = parse_hex_bytes(bytes)?;
            let mut channel = open_channel(&cli)?;
            handle_xfer(&mut channel, &frame, lf, max_reply)
        }
        Commands::Hex { ref head, ref data } => {
            let head = parse_int(head)?;
            let data = parse_int(data)?;
            let mut channel = open_channel(&cli)?;
            handle_hex(&mut channel, head, data)
        }
        Commands::Loopback { ref frame, count } => {
            let frame = parse_hex_bytes(std::slice::from_ref(frame))?;
            let mut channel = open_channel(&cli)?;
            handle_loopback(&mut channel, &frame, count, cli.timeout_ms.unwrap_or(100))
        }
    }
}

/// Merge the config file (if any) with command-line overrides
fn channel_config(cli: &Cli) -> Result<ChannelConfig> {
    let mut config = match (&cli.config, &cli.port) {
        (Some(path), _) => ChannelConfig::from_file(path)?,
        (None, Some(port)) => ChannelConfig::new(port),
        (None, None) => bail!("No serial port given. Use -p <PORT> or --config <FILE>"),
    };

    if let Some(port) = &cli.port {
        config.device = port.clone();
    }
    if let Some(baud) = cli.baud {
        config = config.with_baud_rate(baud)?;
    }
    if let Some(size) = cli.buffer_size {
        config = config.with_buffer_size(size);
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_poll_timeout(Duration::from_millis(ms));
    }

    Ok(config)
}

fn open_channel(cli: &Cli) -> Result<SerialChannel> {
    let config = channel_config(cli)?;
    let channel = SerialChannel::open_with(&config)
        .with_context(|| format!("Failed to open {}", config.device.display()))?;

    println!(
        "{} Connected to {} ({})",
        "[OK]".green().bold(),
        config.device.display().to_string().white().bold(),
        config.line_config()
    );
    Ok(channel)
}

fn handle_send(channel: &mut SerialChannel, frame: &[u8]) -> Result<()> {
    let written = channel.write_without_feedback(frame, frame.len())?;
    print_frame("[TX]".cyan().bold(), &frame[..written]);
    report_short("write", written, frame.len());
    channel.close()?;
    Ok(())
}

fn handle_xfer(channel: &mut SerialChannel, frame: &[u8], lf: bool, max_reply: usize) -> Result<()> {
    let mut reply = vec![0u8; if lf { max_reply } else { frame.len() }];

    let read = if lf {
        channel.write_with_feedback_lf(frame, frame.len(), &mut reply)?
    } else {
        channel.write_with_feedback(frame, frame.len(), &mut reply)?
    };

    print_frame("[TX]".cyan().bold(), frame);
    print_frame("[RX]".green().bold(), &reply[..read]);
    if !lf {
        report_short("read", read, frame.len());
    }
    channel.close()?;
    Ok(())
}

fn handle_hex(channel: &mut SerialChannel, head: u64, data: u64) -> Result<()> {
    let layout = channel.frame_layout();
    let frame = layout.encode(head, data)?;
    let mut reply = vec![0u8; layout.frame_len()];

    let read = channel.write_with_feedback_hex(head, data, &mut reply)?;

    print_frame("[TX]".cyan().bold(), &frame);
    print_frame("[RX]".green().bold(), &reply[..read]);
    report_short("read", read, reply.len());
    channel.close()?;
    Ok(())
}

fn handle_loopback(
    channel: &mut SerialChannel,
    frame: &[u8],
    count: u32,
    timeout_ms: u64,
) -> Result<()> {
    let timeout = Duration::from_millis(timeout_ms);
    let mut reply = vec![0u8; frame.len()];
    let mut failures = 0u32;

    for round in 1..=count {
        reply.fill(0);
        channel.write_without_feedback(frame, frame.len())?;
        let read = channel.read_exact_within(&mut reply, timeout)?;

        if read == frame.len() && reply == frame {
            println!("{} round {}: {}", "[OK]".green().bold(), round, hex_string(&reply));
        } else {
            failures += 1;
            println!(
                "{} round {}: expected {}, got {}",
                "[FAIL]".red().bold(),
                round,
                hex_string(frame),
                hex_string(&reply[..read])
            );
        }
    }

    channel.close()?;

    if failures > 0 {
        bail!("{} of {} loopback rounds failed", failures, count);
    }
    println!("\n{}", format!("All {} loopback rounds passed", count).green().bold());
    Ok(())
}

#[cfg(feature = "serial")]
fn print_ports(bridges_only: bool) -> Result<()> {
    let ports = if bridges_only {
        uart_link::ports::detect_uart_bridges()?
    } else {
        uart_link::ports::list_ports()?
    };

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("  Is the board plugged in? Try: ls -la /dev/ttyUSB* /dev/ttyACM*");
        return Ok(());
    }

    for port in ports {
        let bridge = port
            .bridge()
            .map(|b| format!("[{}]", b).green().bold().to_string())
            .unwrap_or_default();

        match port.usb {
            Some(usb) => println!(
                "{:<16} {:04x}:{:04x} {} {}",
                port.path.white().bold(),
                usb.vid,
                usb.pid,
                bridge,
                usb.product.as_deref().unwrap_or("")
            ),
            None => println!("{:<16} {}", port.path.white().bold(), "(not USB)".dimmed()),
        }
    }
    Ok(())
}

fn print_frame(tag: colored::ColoredString, bytes: &[u8]) {
    println!("{} {} byte(s): {}", tag, bytes.len(), hex_string(bytes));
}

fn report_short(what: &str, got: usize, wanted: usize) {
    if got < wanted {
        println!(
            "{} Short {}: {} of {} bytes",
            "[WARNING]".yellow().bold(),
            what,
            got,
            wanted
        );
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse hex byte arguments, either one per argument or run together
fn parse_hex_bytes(args: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    for arg in args {
        let digits: String = arg
            .split_whitespace()
            .map(|s| s.trim_start_matches("0x"))
            .collect();

        if digits.len() % 2 != 0 {
            bail!("Odd number of hex digits in '{}'", arg);
        }

        for pair in digits.as_bytes().chunks(2) {
            let pair = std::str::from_utf8(pair).context("Invalid hex")?;
            let byte = u8::from_str_radix(pair, 16)
                .with_context(|| format!("Invalid hex byte '{}' in '{}'", pair, arg))?;
            out.push(byte);
        }
    }

    Ok(out)
}

/// Parse a decimal or 0x-prefixed integer
fn parse_int(s: &str) -> Result<u64> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    value.with_context(|| format!("Invalid number: {}", s))
}
