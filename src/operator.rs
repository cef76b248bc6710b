use bmubench_lib::classify::{Classification, Verdict};
use bmubench_lib::registry::{DefectRegistry, RegistrySnapshot};
use bmubench_lib::telemetry::TelemetrySample;
use log::warn;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

const BELL_GAP: Duration = Duration::from_millis(200);

/// One bell for a pass, two bells for a fail.
pub fn emit_alert(verdict: Verdict) {
    let rings = match verdict {
        Verdict::Pass => 1,
        Verdict::Fail => 2,
    };
    let mut stdout = std::io::stdout();
    for ring in 0..rings {
        if ring > 0 {
            std::thread::sleep(BELL_GAP);
        }
        if let Err(error) = stdout.write_all(b"\x07").and_then(|()| stdout.flush()) {
            warn!("Cannot ring terminal bell: {error}");
            break;
        }
    }
}

pub fn report_cycle(unit_index: usize, sample: &TelemetrySample, classification: &Classification) {
    let stamp = chrono::Local::now().format("%H:%M:%S");
    if classification.is_pass() {
        println!(
            "{stamp} [{unit_index}] SN {} SoC {}% (Abs {}%) PASS",
            sample.serial_number, sample.soc, sample.abs_soc
        );
    } else {
        let symptom = classification
            .symptom
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unspecified".to_string());
        println!(
            "{stamp} [{unit_index}] SN {} SoC {}% (Abs {}%) {:.2}V delta {}mV <<<< FAIL: {symptom} >>>>",
            sample.serial_number,
            sample.soc,
            sample.abs_soc,
            sample.pack_voltage(),
            sample.cell_delta_mv()
        );
    }
}

pub fn print_summary(snapshot: &RegistrySnapshot) {
    println!(
        "--- Session summary at {} ---",
        chrono::Local::now().format("%H:%M:%S")
    );
    println!("Tested units: {}", snapshot.tested_units);
    println!("Defective units: {}", snapshot.defects.len());
    for record in &snapshot.defects {
        let symptoms: Vec<String> = record.symptoms.iter().map(ToString::to_string).collect();
        println!("  SN {}: {}", record.serial_number, symptoms.join(", "));
    }
    println!("--------------------------");
}

pub fn print_sample(sample: &TelemetrySample) {
    println!("Serial number:      {}", sample.serial_number);
    println!("Hardware version:   {}", sample.hardware_version);
    println!("Bootloader version: {}", sample.bootloader_version);
    println!("Firmware version:   {}", sample.firmware_version);
    println!("SoC:                {}% (Abs {}%)", sample.soc, sample.abs_soc);
    println!(
        "Cell voltages:      {}/{}/{} mV (delta {} mV)",
        sample.cells_mv[0],
        sample.cells_mv[1],
        sample.cells_mv[2],
        sample.cell_delta_mv()
    );
    println!("Pack voltage:       {:.3} V", sample.pack_voltage());
    println!("Temperature:        {:.2} °C", sample.temperature());
    println!("Health:             {}%", sample.health);
    println!(
        "Capacity:           design {} mAh, actual {} mAh, remaining {} mAh",
        sample.design_capacity_mah, sample.actual_capacity_mah, sample.remaining_capacity_mah
    );
    if sample.pd_voltage_mv == 0 && sample.pd_current_ma == 0 {
        println!("PD output:          not attached");
    } else {
        println!(
            "PD output:          {} mV / {} mA ({:.1} W)",
            sample.pd_voltage_mv,
            sample.pd_current_ma,
            sample.pd_power_w()
        );
    }
}

/// Prints the session summary whenever the operator presses enter.
/// The worker ends at end of input, the monitor keeps running without it.
pub fn spawn_query_worker(registry: Arc<DefectRegistry>) {
    let spawned = std::thread::Builder::new()
        .name("query".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            let mut line = String::new();
            loop {
                line.clear();
                match input.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => print_summary(&registry.snapshot()),
                    Err(error) => {
                        warn!("Cannot read operator input: {error}");
                        break;
                    }
                }
            }
        });
    if let Err(error) = spawned {
        warn!("Cannot start query worker: {error}");
    }
}
