use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::{ops::Deref, panic};

mod commandline;
mod monitor;
mod operator;

use bmubench_lib::classify::Thresholds;
use bmubench_lib::protocol::Command;
use bmubench_lib::serialport::{available_ports, first_available_port, BmuPort};
use bmubench_lib::telemetry;
use commandline::{CliArgs, CliCommands};

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn connect(args: &CliArgs) -> Result<BmuPort> {
    let device = match &args.device {
        Some(device) => device.clone(),
        None => first_available_port()?
            .context("No serial port detected, specify one with --device")?,
    };
    info!("Using serial port '{device}'");
    let mut port = BmuPort::open(&device, args.timeout)
        .with_context(|| format!("Cannot open serial port '{device}'"))?;
    port.set_delay(args.delay);
    Ok(port)
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    match &args.command {
        CliCommands::Monitor {
            interval,
            rescan_delay,
            settle_delay,
            thresholds,
        } => {
            let thresholds = match thresholds {
                Some(path) => monitor::load_thresholds(path)?,
                None => Thresholds::default(),
            };
            monitor::run(monitor::MonitorOptions {
                device: args.device.clone(),
                timeout: args.timeout,
                delay: args.delay,
                interval: *interval,
                rescan_delay: *rescan_delay,
                settle_delay: *settle_delay,
                thresholds,
            })?
        }
        CliCommands::Sample { json } => {
            let mut port = connect(&args)?;
            let sample =
                telemetry::read_sample(&mut port).with_context(|| "Cannot read sample")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&sample)?);
            } else {
                operator::print_sample(&sample);
            }
        }
        CliCommands::Raw { command } => {
            let command = Command::from_name(command)?;
            let mut port = connect(&args)?;
            let rx_buffer = telemetry::read_raw(&mut port, command)
                .with_context(|| format!("Cannot read {command}"))?;
            println!("{command}: {rx_buffer:02X?}");
        }
        CliCommands::Ports => {
            let ports = available_ports()?;
            if ports.is_empty() {
                println!("No serial ports detected");
            } else {
                for port in ports {
                    println!("{port}");
                }
            }
        }
    }

    Ok(())
}
