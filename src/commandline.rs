use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::time::Duration;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Read input registers (function 0x04)
    Read {
        /// First register address (decimal or 0x prefixed hex)
        #[arg(value_parser = maybe_hex::<u16>)]
        register: u16,
        /// Number of registers to read
        #[arg(default_value = "1")]
        count: u16,
    },
    /// Read holding registers (function 0x03)
    ReadHolding {
        /// First register address (decimal or 0x prefixed hex)
        #[arg(value_parser = maybe_hex::<u16>)]
        register: u16,
        /// Number of registers to read
        #[arg(default_value = "1")]
        count: u16,
    },
    /// Write a single holding register (function 0x06)
    Write {
        /// Register address (decimal or 0x prefixed hex)
        #[arg(value_parser = maybe_hex::<u16>)]
        register: u16,
        /// The value to write
        #[arg(value_parser = maybe_hex::<u16>)]
        value: u16,
    },
    /// Write consecutive holding registers (function 0x10)
    WriteMultiple {
        /// First register address (decimal or 0x prefixed hex)
        #[arg(value_parser = maybe_hex::<u16>)]
        register: u16,
        /// The values to write, one per register
        #[arg(value_parser = maybe_hex::<u16>, required = true, num_args = 1..)]
        values: Vec<u16>,
    },
    /// Show the state of IN_1, IN_2, OUT_1 and OUT_2
    ReadIo,
    /// Drive OUT_1 and OUT_2
    WriteIo {
        /// Set OUT_1 high. If this flag is not present, it will be set low.
        #[clap(long, action)]
        out1: bool,
        /// Set OUT_2 high. If this flag is not present, it will be set low.
        #[clap(long, action)]
        out2: bool,
    },
    /// Move to an absolute angle
    MoveAbsolute {
        /// Acceleration
        #[arg(long, default_value = "2")]
        acceleration: u16,
        /// Speed
        #[arg(long, default_value = "100")]
        speed: u16,
        /// Target angle, negative values are allowed
        #[arg(allow_negative_numbers = true)]
        angle: i32,
    },
}

const fn about_text() -> &'static str {
    "mks servo modbus command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// YAML file with link settings, command line options take precedence
    #[arg(short, long)]
    pub config: Option<String>,

    /// Serial port device path (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Baud rate of the RS485 link
    #[arg(short, long)]
    pub baud_rate: Option<u32>,

    /// Modbus device address (0 broadcasts writes)
    #[arg(short, long, value_parser = maybe_hex::<u8>)]
    pub address: Option<u8>,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Response timeout (e.g., "500ms", "1s", "2s 500ms")
    #[arg(value_parser = humantime::parse_duration, long)]
    pub timeout: Option<Duration>,

    // Some USB - RS485 dongles requires at least 10ms to switch between TX and RX, so use a save delay between frames
    /// Delay between frames (e.g., "15ms", "50ms")
    /// (useful for some serial adapters that need time to switch between TX/RX)
    #[arg(value_parser = humantime::parse_duration, long)]
    pub delay: Option<Duration>,

    /// Print results as JSON
    #[arg(long, action)]
    pub json: bool,
}
