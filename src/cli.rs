//! CLI argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rsmt")]
#[command(
    author,
    version,
    about = "Manufacturing customization tool for CP210x USB bridges",
    long_about = "Programs, verifies and locks batches of CP210x USB-to-UART bridges \
                  from a customization script. Exactly one configuration file option \
                  selects the operation."
)]
pub struct Cli {
    /// Verbosity level (-v, -vv); also echoes the configuration as it is parsed
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of devices expected in the batch
    #[arg(long, value_name = "N")]
    pub device_count: Option<u32>,

    /// Program devices, without verifying
    #[arg(long, value_name = "FILE")]
    pub set_config: Option<PathBuf>,

    /// Verify unlocked devices
    #[arg(long, value_name = "FILE")]
    pub verify_config: Option<PathBuf>,

    /// Verify devices, accepting locked ones
    #[arg(long, value_name = "FILE")]
    pub verify_locked_config: Option<PathBuf>,

    /// Program, reset, then verify devices
    #[arg(long, value_name = "FILE")]
    pub set_and_verify_config: Option<PathBuf>,

    /// Reset every device matching the configuration
    #[arg(long, value_name = "FILE")]
    pub reset: Option<PathBuf>,

    /// List every device matching the configuration
    #[arg(long, value_name = "FILE")]
    pub list: Option<PathBuf>,

    /// Parse a configuration and print it in canonical form
    #[arg(long, value_name = "FILE")]
    pub check_config: Option<PathBuf>,

    /// Serial numbers: `{ s1 s2 ... }` or `GUID`
    #[arg(long, value_name = "SERIAL", action = clap::ArgAction::Append)]
    pub serial_nums: Vec<String>,

    /// Lock devices after a successful verification (irreversible)
    #[arg(long)]
    pub lock: bool,

    /// Timing and retry limits (TOML)
    #[arg(long, value_name = "FILE")]
    pub timing: Option<PathBuf>,

    /// Rehearse against N emulated blank devices instead of USB
    #[arg(long, value_name = "N")]
    pub dummy: Option<usize>,
}
