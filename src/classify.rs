use crate::telemetry::TelemetrySample;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pass/fail limits for pack acceptance.
///
/// Defaults are the production bench constants. A partial YAML override
/// file may replace individual limits, untouched fields keep their default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum pack voltage of a charged pack, millivolts.
    pub min_charged_pack_mv: u32,
    /// Cell voltage at or above which the pack counts as charged, millivolts.
    pub min_charged_cell_mv: u16,
    /// Maximum |SoC - AbsSoC| / SoC before the two gauges disagree.
    pub max_soc_difference_ratio: f32,
    /// Maximum cell spread of a charged pack, millivolts.
    pub max_cell_delta_charged_mv: u16,
    /// Maximum cell spread otherwise, millivolts.
    pub max_cell_delta_mv: u16,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_charged_pack_mv: 12_400,
            min_charged_cell_mv: 4_150,
            max_soc_difference_ratio: 0.05,
            max_cell_delta_charged_mv: 10,
            max_cell_delta_mv: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
}

/// Why a pack failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symptom {
    /// Pack voltage below the charged minimum.
    AbnormalVoltage,
    /// SoC and AbsSoC disagree beyond the allowed ratio.
    AbnormalAbsSoc,
    /// Cell spread beyond the allowed delta, carries the observed cells.
    ImbalancedCells { cells_mv: [u16; 3] },
}

impl fmt::Display for Symptom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Symptom::AbnormalVoltage => write!(f, "Abnormal Voltage"),
            Symptom::AbnormalAbsSoc => write!(f, "Abnormal Abs_SoC"),
            Symptom::ImbalancedCells { cells_mv } => write!(
                f,
                "Imbalanced Cells Voltage: {}/{}/{} mV",
                cells_mv[0], cells_mv[1], cells_mv[2]
            ),
        }
    }
}

/// Verdict for one poll cycle plus the symptom selected on fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub verdict: Verdict,
    pub symptom: Option<Symptom>,
}

impl Classification {
    fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            symptom: None,
        }
    }

    fn fail(symptom: Symptom) -> Self {
        Self {
            verdict: Verdict::Fail,
            symptom: Some(symptom),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Classifies one sample against the bench limits.
///
/// A pack counts as charged when SoC reads 99 or 100 percent or any cell
/// is at the charged cell voltage. The checks run in a fixed priority
/// order and the first failing check selects the symptom: pack voltage
/// (charged packs only), then gauge consistency, then cell spread. The
/// spread limit is tighter for charged packs. Later checks never overwrite
/// an earlier symptom.
///
/// Fails with [`Error::InvalidSample`] when SoC is zero, the gauge
/// consistency ratio is undefined there.
pub fn classify(
    sample: &TelemetrySample,
    thresholds: &Thresholds,
) -> std::result::Result<Classification, Error> {
    if sample.soc == 0 {
        return Err(Error::InvalidSample);
    }
    let cell_delta = sample.cell_delta_mv();
    let soc_difference_ratio =
        (f32::from(sample.soc) - f32::from(sample.abs_soc)).abs() / f32::from(sample.soc);

    let charged = (99..=100).contains(&sample.soc)
        || sample.max_cell_mv() >= thresholds.min_charged_cell_mv;

    if charged {
        if sample.pack_voltage_mv < thresholds.min_charged_pack_mv {
            return Ok(Classification::fail(Symptom::AbnormalVoltage));
        }
        if soc_difference_ratio > thresholds.max_soc_difference_ratio {
            return Ok(Classification::fail(Symptom::AbnormalAbsSoc));
        }
        if cell_delta > thresholds.max_cell_delta_charged_mv {
            return Ok(Classification::fail(Symptom::ImbalancedCells {
                cells_mv: sample.cells_mv,
            }));
        }
    } else {
        if soc_difference_ratio > thresholds.max_soc_difference_ratio {
            return Ok(Classification::fail(Symptom::AbnormalAbsSoc));
        }
        if cell_delta > thresholds.max_cell_delta_mv {
            return Ok(Classification::fail(Symptom::ImbalancedCells {
                cells_mv: sample.cells_mv,
            }));
        }
    }
    Ok(Classification::pass())
}

#[cfg(test)]
mod tests {

    use super::*;

    fn sample(soc: u8, abs_soc: u8, cells_mv: [u16; 3]) -> TelemetrySample {
        TelemetrySample {
            soc,
            abs_soc,
            serial_number: "BP2407-00123   ".to_string(),
            hardware_version: "1.4".to_string(),
            bootloader_version: "BL2.0".to_string(),
            firmware_version: "4.1.7".to_string(),
            pack_voltage_mv: cells_mv.iter().map(|mv| u32::from(*mv)).sum(),
            cells_mv,
            temperature_centi_c: 2315,
            health: 98,
            design_capacity_mah: 3500,
            actual_capacity_mah: 3410,
            remaining_capacity_mah: 3377,
            pd_voltage_mv: 0,
            pd_current_ma: 0,
        }
    }

    #[test]
    fn charged_pass_test() {
        // ratio |99-103|/99 is about 0.0404, delta 8 mV, pack above 12.4 V
        let mut s = sample(99, 103, [4100, 4105, 4108]);
        s.pack_voltage_mv = 12_500;
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.verdict, Verdict::Pass);
        assert_eq!(result.symptom, None);
    }

    #[test]
    fn undercharged_gauge_mismatch_test() {
        // ratio |80-70|/80 = 0.125
        let s = sample(80, 70, [3800, 3700, 3750]);
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.verdict, Verdict::Fail);
        assert_eq!(result.symptom, Some(Symptom::AbnormalAbsSoc));
        assert_eq!(result.symptom.unwrap().to_string(), "Abnormal Abs_SoC");
    }

    #[test]
    fn charged_imbalance_test() {
        // charged through the cell criterion, voltage and ratio fine,
        // delta 70 mV over the 10 mV charged limit
        let mut s = sample(100, 100, [4160, 4170, 4100]);
        s.pack_voltage_mv = 12_430;
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.verdict, Verdict::Fail);
        assert_eq!(
            result.symptom.unwrap().to_string(),
            "Imbalanced Cells Voltage: 4160/4170/4100 mV"
        );
    }

    #[test]
    fn charged_by_cell_voltage_test() {
        // SoC below 99 but one cell at the charged level puts the pack in
        // the charged branch, where a 30 mV spread already fails
        let s = sample(90, 90, [4150, 4120, 4130]);
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.verdict, Verdict::Fail);
        assert_eq!(
            result.symptom,
            Some(Symptom::ImbalancedCells {
                cells_mv: [4150, 4120, 4130]
            })
        );
        // the same spread is fine for an undercharged pack
        let s = sample(90, 90, [4149, 4119, 4129]);
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[test]
    fn symptom_priority_test() {
        // every charged check fails, the voltage symptom wins
        let mut s = sample(100, 80, [4160, 4170, 4100]);
        s.pack_voltage_mv = 12_000;
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.symptom, Some(Symptom::AbnormalVoltage));

        // voltage fine, ratio and delta both bad, the ratio symptom wins
        let mut s = sample(100, 80, [4160, 4170, 4100]);
        s.pack_voltage_mv = 12_500;
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.symptom, Some(Symptom::AbnormalAbsSoc));
    }

    #[test]
    fn boundary_ratio_test() {
        // exactly 0.05 still passes
        let mut s = sample(100, 105, [4100, 4102, 4104]);
        s.pack_voltage_mv = 12_500;
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.verdict, Verdict::Pass);
        // one percent point past it fails
        let mut s = sample(100, 106, [4100, 4102, 4104]);
        s.pack_voltage_mv = 12_500;
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.symptom, Some(Symptom::AbnormalAbsSoc));
    }

    #[test]
    fn boundary_delta_test() {
        // charged limit: 10 mV passes, 11 mV fails
        let mut s = sample(99, 99, [4100, 4105, 4110]);
        s.pack_voltage_mv = 12_500;
        assert!(classify(&s, &Thresholds::default()).unwrap().is_pass());
        let mut s = sample(99, 99, [4100, 4105, 4111]);
        s.pack_voltage_mv = 12_500;
        assert!(!classify(&s, &Thresholds::default()).unwrap().is_pass());

        // general limit: 100 mV passes, 101 mV fails
        let s = sample(80, 80, [3800, 3750, 3700]);
        assert!(classify(&s, &Thresholds::default()).unwrap().is_pass());
        let s = sample(80, 80, [3801, 3750, 3700]);
        assert!(!classify(&s, &Thresholds::default()).unwrap().is_pass());
    }

    #[test]
    fn charged_voltage_check_test() {
        // charged pack right at 12.4 V passes, just below fails
        let mut s = sample(100, 100, [4100, 4102, 4104]);
        s.pack_voltage_mv = 12_400;
        assert!(classify(&s, &Thresholds::default()).unwrap().is_pass());
        s.pack_voltage_mv = 12_399;
        let result = classify(&s, &Thresholds::default()).unwrap();
        assert_eq!(result.symptom, Some(Symptom::AbnormalVoltage));
        // undercharged packs skip the voltage check entirely
        let s = sample(50, 50, [3300, 3310, 3320]);
        assert!(classify(&s, &Thresholds::default()).unwrap().is_pass());
    }

    #[test]
    fn invalid_sample_test() {
        let s = sample(0, 50, [3800, 3800, 3800]);
        assert!(matches!(
            classify(&s, &Thresholds::default()),
            Err(Error::InvalidSample)
        ));
    }

    #[test]
    fn thresholds_partial_yaml_test() {
        let thresholds: Thresholds = serde_yaml::from_str("max_cell_delta_mv: 150").unwrap();
        assert_eq!(thresholds.max_cell_delta_mv, 150);
        // untouched limits keep their defaults
        assert_eq!(thresholds.min_charged_pack_mv, 12_400);
        assert_eq!(thresholds.min_charged_cell_mv, 4_150);
        assert_eq!(thresholds.max_cell_delta_charged_mv, 10);
    }
}
