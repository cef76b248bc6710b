use anyhow::{Context, Result};
use bmubench_lib::classify::{classify, Thresholds};
use bmubench_lib::registry::DefectRegistry;
use bmubench_lib::serialport::{first_available_port, BmuPort};
use bmubench_lib::telemetry;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::operator;

#[derive(Debug)]
pub struct MonitorOptions {
    pub device: Option<String>,
    pub timeout: Duration,
    pub delay: Duration,
    pub interval: Duration,
    pub rescan_delay: Duration,
    pub settle_delay: Duration,
    pub thresholds: Thresholds,
}

pub fn load_thresholds(config_file_path: &str) -> Result<Thresholds> {
    log::debug!("Loading thresholds file from {config_file_path:?}");
    let config_file = std::fs::File::open(config_file_path)
        .with_context(|| format!("Cannot open thresholds file {config_file_path:?}"))?;
    let thresholds: Thresholds = serde_yaml::from_reader(&config_file)
        .with_context(|| format!("Cannot read thresholds from file: {config_file_path:?}"))?;
    Ok(thresholds)
}

pub fn run(options: MonitorOptions) -> Result<()> {
    info!(
        "Starting monitor mode: device={:?}, interval={:?}, thresholds={:?}",
        options.device, options.interval, options.thresholds
    );
    let registry = Arc::new(DefectRegistry::new());
    operator::spawn_query_worker(Arc::clone(&registry));

    let mut previous_port: Option<String> = None;
    loop {
        let port = match current_port(&options) {
            Ok(Some(port)) => port,
            Ok(None) => {
                info!(
                    "No serial port detected, rescanning in {:?}",
                    options.rescan_delay
                );
                std::thread::sleep(options.rescan_delay);
                continue;
            }
            Err(error) => {
                warn!("Cannot enumerate serial ports: {error}");
                std::thread::sleep(options.rescan_delay);
                continue;
            }
        };
        if previous_port.as_deref() == Some(port.as_str()) {
            // the operator may still be swapping packs on the same adapter
            std::thread::sleep(options.settle_delay);
        }
        run_cycle(&port, &options, &registry);
        previous_port = Some(port);
        std::thread::sleep(options.interval);
    }
}

fn current_port(options: &MonitorOptions) -> Result<Option<String>> {
    match &options.device {
        Some(device) => Ok(Some(device.clone())),
        None => Ok(first_available_port()?),
    }
}

/// One poll cycle. Every failure is logged and abandons the cycle,
/// the registry only changes once a sample classifies cleanly.
fn run_cycle(port: &str, options: &MonitorOptions, registry: &DefectRegistry) {
    let mut link = match BmuPort::open(port, options.timeout) {
        Ok(link) => link,
        Err(error) => {
            warn!("Cannot open serial port '{port}': {error}");
            return;
        }
    };
    link.set_delay(options.delay);

    let sample = match telemetry::read_sample(&mut link) {
        Ok(sample) => sample,
        Err(error) => {
            warn!("Failed read on '{port}': {error}");
            return;
        }
    };
    let classification = match classify(&sample, &options.thresholds) {
        Ok(classification) => classification,
        Err(error) => {
            warn!("Sample from SN {} rejected: {error}", sample.serial_number);
            return;
        }
    };

    let unit_index = registry.record(&sample.serial_number, &classification);
    operator::emit_alert(classification.verdict);
    operator::report_cycle(unit_index, &sample, &classification);
}

#[cfg(test)]
mod tests {

    use super::*;
    use std::io::Write;

    #[test]
    fn load_thresholds_test() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "min_charged_pack_mv: 12000").unwrap();
        let thresholds = load_thresholds(file.path().to_str().unwrap()).unwrap();
        assert_eq!(thresholds.min_charged_pack_mv, 12_000);
        // unset limits fall back to their defaults
        assert_eq!(thresholds.max_cell_delta_mv, 100);
    }

    #[test]
    fn load_thresholds_missing_file_test() {
        assert!(load_thresholds("/nonexistent/thresholds.yaml").is_err());
    }
}
