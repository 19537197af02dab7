//! CLI argument parsing

use crate::programmers;
use clap::Parser;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "picflash")]
#[command(author, version, about = "PIC programmer for ArduPIC adapters", long_about = None)]
pub struct Cli {
    /// HEX image file
    #[arg(required_unless_present_any = ["list_programmers", "list_chips"])]
    pub file: Option<PathBuf>,

    /// Only verify the device against the image (no erase, no write)
    #[arg(short = 'v', long)]
    pub verify: bool,

    /// Read the device (not supported by the ArduPIC protocol)
    #[arg(short, long, conflicts_with = "verify")]
    pub read: bool,

    /// Target microcontroller
    #[arg(short = 'p', long, default_value = "16f54")]
    pub cpu: String,

    /// Programmer, optionally with parameters (e.g. ardupic:dev=/dev/ttyUSB0,baud=19200)
    #[arg(short = 'P', long, default_value = "ardupic", help = programmer_help())]
    pub programmer: String,

    /// Serial port (overrides the programmer's dev= parameter)
    #[arg(short = 'f', long)]
    pub port: Option<String>,

    /// Baud rate (overrides the programmer's baud= parameter)
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Read timeout in milliseconds (overrides the programmer's timeout= parameter)
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Reject HEX records with a bad checksum
    #[arg(long)]
    pub strict_checksum: bool,

    #[command(flatten)]
    pub timing: TimingArgs,

    /// List available programmers and exit
    #[arg(long)]
    pub list_programmers: bool,

    /// List supported chips and exit
    #[arg(long)]
    pub list_chips: bool,

    /// Verbosity level (--verbose, --verbose --verbose)
    #[arg(long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Adapter delays, in adapter firmware units (hex with 0x prefix, or decimal)
#[derive(clap::Args, Debug, Clone)]
pub struct TimingArgs {
    /// Delay after ordinary command bytes
    #[arg(long, default_value = "1", value_parser = parse_hex_u32)]
    pub cmd_delay: u32,

    /// Programming pulse length
    #[arg(long, default_value = "2000", value_parser = parse_hex_u32)]
    pub prog_delay: u32,

    /// Discharge delay after programming
    #[arg(long, default_value = "10", value_parser = parse_hex_u32)]
    pub discharge_delay: u32,

    /// Bulk erase delay
    #[arg(long, default_value = "10000", value_parser = parse_hex_u32)]
    pub erase_delay: u32,
}
