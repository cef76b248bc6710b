use crate::classify::{Classification, Symptom};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One defective pack and everything observed wrong with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectRecord {
    pub serial_number: String,
    /// Symptoms in observation order, repeated failures are kept.
    pub symptoms: Vec<Symptom>,
}

/// Point-in-time copy of the session state, detached from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Number of distinct packs seen this session.
    pub tested_units: usize,
    pub defects: Vec<DefectRecord>,
}

#[derive(Debug, Default)]
struct SessionState {
    /// Serial numbers in first-seen order, the position is the unit index.
    units: Vec<String>,
    defects: Vec<DefectRecord>,
}

/// Session-scoped record of tested packs and their defects.
///
/// A serial number is listed in [`RegistrySnapshot::defects`] exactly when
/// its most recent classification was a fail. A later pass clears the
/// record, a later fail appends its symptom.
#[derive(Debug, Default)]
pub struct DefectRegistry {
    state: Mutex<SessionState>,
}

impl DefectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one classification into the session and returns the 1-based
    /// unit index of the pack, stable for the whole session.
    pub fn record(&self, serial_number: &str, classification: &Classification) -> usize {
        let mut state = self.state.lock().expect("defect registry lock poisoned");
        let unit_index = match state.units.iter().position(|unit| unit == serial_number) {
            Some(position) => position + 1,
            None => {
                state.units.push(serial_number.to_string());
                state.units.len()
            }
        };
        if classification.is_pass() {
            state
                .defects
                .retain(|record| record.serial_number != serial_number);
        } else {
            let symptoms: Vec<Symptom> = classification.symptom.iter().cloned().collect();
            match state
                .defects
                .iter_mut()
                .find(|record| record.serial_number == serial_number)
            {
                Some(record) => record.symptoms.extend(symptoms),
                None => state.defects.push(DefectRecord {
                    serial_number: serial_number.to_string(),
                    symptoms,
                }),
            }
        }
        unit_index
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock().expect("defect registry lock poisoned");
        RegistrySnapshot {
            tested_units: state.units.len(),
            defects: state.defects.clone(),
        }
    }
}
