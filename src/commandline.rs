use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::time::Duration;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Run the unattended test station: poll, classify and report packs until interrupted
    Monitor {
        /// Interval between poll cycles (e.g., "10s", "1m")
        #[clap(long, short, value_parser = humantime::parse_duration, default_value = "10s")]
        interval: Duration,
        /// Wait before rescanning when no serial port is present (e.g., "2s")
        #[clap(long, value_parser = humantime::parse_duration, default_value = "2s")]
        rescan_delay: Duration,
        /// Wait before reopening the same port as the previous cycle (e.g., "1s")
        #[clap(long, value_parser = humantime::parse_duration, default_value = "1s")]
        settle_delay: Duration,
        /// YAML file overriding individual pass/fail limits
        #[clap(long, short)]
        thresholds: Option<String>,
    },
    /// Read one full telemetry sample from the connected pack and print it
    Sample {
        /// Print the sample as JSON instead of the human readable report
        #[clap(long, short, action)]
        json: bool,
    },
    /// Send a single poll command and print the raw reply bytes
    Raw {
        /// Command name (e.g., "soc", "serial-number", "cell-voltages")
        command: String,
    },
    /// List detectable serial ports
    Ports,
}

const fn about_text() -> &'static str {
    "BMU battery pack diagnostic station"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Serial port device path (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows).
    /// The first detected port is used when omitted.
    #[arg(short, long)]
    pub device: Option<String>,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Timeout for serial I/O operations (e.g., "500ms", "1s", "2s 500ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "1s")]
    pub timeout: Duration,

    // Some USB serial adapters need time to switch between TX and RX
    /// Delay between consecutive poll commands (e.g., "50ms", "100ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "50ms")]
    pub delay: Duration,
}
