use crate::protocol::{self, Command};
use crate::Error;
use serde::{Deserialize, Serialize};

/// One blocking request/response exchange with a BMU.
///
/// Implementations send the 8-byte request frame and collect up to
/// `reply_size` bytes of the response window. Returning fewer bytes than
/// requested is not an error at this level: an empty window models a device
/// that did not answer before the read timeout, a short window a truncated
/// reply. Both become typed errors during decoding.
pub trait Transport {
    fn exchange(
        &mut self,
        request: [u8; protocol::REQUEST_LENGTH],
        reply_size: usize,
    ) -> std::result::Result<Vec<u8>, Error>;
}

/// Telemetry of one battery pack, decoded from one full catalog poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub soc: u8,
    /// Absolute state of charge, may report past 100 percent.
    pub abs_soc: u8,
    pub serial_number: String,
    pub hardware_version: String,
    pub bootloader_version: String,
    pub firmware_version: String,
    pub cells_mv: [u16; 3],
    /// Pack voltage, sum of the cell voltages at assembly time.
    pub pack_voltage_mv: u32,
    /// Pack temperature in 0.01 degree Celsius units.
    pub temperature_centi_c: i32,
    pub health: u16,
    pub design_capacity_mah: u16,
    pub actual_capacity_mah: u16,
    pub remaining_capacity_mah: u16,
    /// 0 when no PD source is attached.
    pub pd_voltage_mv: u32,
    /// 0 when no PD source is attached.
    pub pd_current_ma: u32,
}

impl TelemetrySample {
    pub fn max_cell_mv(&self) -> u16 {
        self.cells_mv[0].max(self.cells_mv[1]).max(self.cells_mv[2])
    }

    pub fn min_cell_mv(&self) -> u16 {
        self.cells_mv[0].min(self.cells_mv[1]).min(self.cells_mv[2])
    }

    /// Spread between the highest and the lowest cell.
    pub fn cell_delta_mv(&self) -> u16 {
        self.max_cell_mv() - self.min_cell_mv()
    }

    pub fn pack_voltage(&self) -> f32 {
        self.pack_voltage_mv as f32 / 1000.0
    }

    pub fn temperature(&self) -> f32 {
        self.temperature_centi_c as f32 / 100.0
    }

    /// PD rail power in watts, 0.0 when no PD source is attached.
    pub fn pd_power_w(&self) -> f32 {
        (u64::from(self.pd_voltage_mv) * u64::from(self.pd_current_ma)) as f32 / 1_000_000.0
    }
}

/// Polls every catalog command in order and assembles the decoded fields.
///
/// A command without any response fails the whole sample with
/// [`Error::IncompleteSample`]; decode failures propagate as they are. A
/// partial sample is never returned. Retrying is the caller's policy, one
/// call performs exactly one pass over the catalog.
pub fn read_sample<T: Transport + ?Sized>(
    link: &mut T,
) -> std::result::Result<TelemetrySample, Error> {
    let soc = protocol::decode_soc(&fetch(link, Command::Soc)?)?;
    let abs_soc = protocol::decode_abs_soc(&fetch(link, Command::AbsSoc)?)?;
    let serial_number = protocol::decode_serial_number(&fetch(link, Command::SerialNumber)?)?;
    let hardware_version =
        protocol::decode_hardware_version(&fetch(link, Command::HardwareVersion)?)?;
    let bootloader_version =
        protocol::decode_bootloader_version(&fetch(link, Command::BootloaderVersion)?)?;
    let firmware_version =
        protocol::decode_firmware_version(&fetch(link, Command::FirmwareVersion)?)?;
    let pd = protocol::decode_pd_output(&fetch(link, Command::PdOutput)?)?;
    let temperature_centi_c = protocol::decode_temperature(&fetch(link, Command::Temperature)?)?;
    let health = protocol::decode_health(&fetch(link, Command::Health)?)?;
    let design_capacity_mah =
        protocol::decode_design_capacity(&fetch(link, Command::DesignCapacity)?)?;
    let actual_capacity_mah =
        protocol::decode_actual_capacity(&fetch(link, Command::ActualCapacity)?)?;
    let remaining_capacity_mah =
        protocol::decode_remaining_capacity(&fetch(link, Command::RemainingCapacity)?)?;
    let cells_mv = protocol::decode_cell_voltages(&fetch(link, Command::CellVoltages)?)?;

    Ok(TelemetrySample {
        soc,
        abs_soc,
        serial_number,
        hardware_version,
        bootloader_version,
        firmware_version,
        pack_voltage_mv: cells_mv.iter().map(|mv| u32::from(*mv)).sum(),
        cells_mv,
        temperature_centi_c,
        health,
        design_capacity_mah,
        actual_capacity_mah,
        remaining_capacity_mah,
        pd_voltage_mv: pd.voltage_mv,
        pd_current_ma: pd.current_ma,
    })
}

/// Sends one catalog command and returns the full raw response window.
pub fn read_raw<T: Transport + ?Sized>(
    link: &mut T,
    command: Command,
) -> std::result::Result<Vec<u8>, Error> {
    let rx_buffer = link.exchange(command.request(), protocol::MAX_REPLY_LENGTH)?;
    if rx_buffer.is_empty() {
        log::warn!("No response to {}", command);
        return Err(Error::IncompleteSample(command.name()));
    }
    Ok(rx_buffer)
}

fn fetch<T: Transport + ?Sized>(
    link: &mut T,
    command: Command,
) -> std::result::Result<Vec<u8>, Error> {
    let rx_buffer = link.exchange(command.request(), command.reply_size())?;
    if rx_buffer.is_empty() {
        log::warn!("No response to {}", command);
        return Err(Error::IncompleteSample(command.name()));
    }
    Ok(rx_buffer)
}

#[cfg(test)]
mod tests {

    use super::*;
    use std::collections::HashMap;

    /// Plays back canned replies per field-id and records the order of
    /// requests it saw.
    struct ScriptedLink {
        replies: HashMap<u8, Vec<u8>>,
        requested: Vec<u8>,
    }

    impl ScriptedLink {
        fn new(replies: HashMap<u8, Vec<u8>>) -> Self {
            Self {
                replies,
                requested: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedLink {
        fn exchange(
            &mut self,
            request: [u8; protocol::REQUEST_LENGTH],
            reply_size: usize,
        ) -> std::result::Result<Vec<u8>, Error> {
            assert_eq!(request[0], 0xA1);
            assert!(reply_size <= protocol::MAX_REPLY_LENGTH);
            self.requested.push(request[2]);
            Ok(self.replies.get(&request[2]).cloned().unwrap_or_default())
        }
    }

    fn reply(fill: impl FnOnce(&mut [u8])) -> Vec<u8> {
        let mut rx_buffer = vec![0u8; 64];
        fill(&mut rx_buffer);
        rx_buffer
    }

    fn healthy_pack() -> HashMap<u8, Vec<u8>> {
        let mut replies = HashMap::new();
        replies.insert(
            Command::Soc.field_id(),
            reply(|rx| rx[1] = 99),
        );
        replies.insert(
            Command::AbsSoc.field_id(),
            reply(|rx| rx[1] = 103),
        );
        replies.insert(
            Command::SerialNumber.field_id(),
            reply(|rx| rx[6..21].copy_from_slice(b"BP2407-00123   ")),
        );
        replies.insert(
            Command::HardwareVersion.field_id(),
            reply(|rx| rx[2..5].copy_from_slice(b"1.4")),
        );
        replies.insert(
            Command::BootloaderVersion.field_id(),
            reply(|rx| rx[7..12].copy_from_slice(b"BL2.0")),
        );
        replies.insert(
            Command::FirmwareVersion.field_id(),
            reply(|rx| rx[12..17].copy_from_slice(b"4.1.7")),
        );
        replies.insert(
            Command::PdOutput.field_id(),
            reply(|rx| {
                rx[16..20].copy_from_slice(&9000_u32.to_le_bytes());
                rx[20..24].copy_from_slice(&1500_u32.to_le_bytes());
            }),
        );
        replies.insert(
            Command::Temperature.field_id(),
            reply(|rx| rx[1..5].copy_from_slice(&2315_i32.to_le_bytes())),
        );
        replies.insert(
            Command::Health.field_id(),
            reply(|rx| rx[1..3].copy_from_slice(&98_u16.to_le_bytes())),
        );
        replies.insert(
            Command::DesignCapacity.field_id(),
            reply(|rx| rx[1..3].copy_from_slice(&3500_u16.to_le_bytes())),
        );
        replies.insert(
            Command::ActualCapacity.field_id(),
            reply(|rx| rx[1..3].copy_from_slice(&3410_u16.to_le_bytes())),
        );
        replies.insert(
            Command::RemainingCapacity.field_id(),
            reply(|rx| rx[1..3].copy_from_slice(&3377_u16.to_le_bytes())),
        );
        replies.insert(
            Command::CellVoltages.field_id(),
            reply(|rx| {
                rx[1..3].copy_from_slice(&4100_u16.to_le_bytes());
                rx[3..5].copy_from_slice(&4105_u16.to_le_bytes());
                rx[5..7].copy_from_slice(&4108_u16.to_le_bytes());
            }),
        );
        replies
    }

    #[test]
    fn read_sample_test() {
        let mut link = ScriptedLink::new(healthy_pack());
        let sample = read_sample(&mut link).unwrap();
        assert_eq!(sample.soc, 99);
        assert_eq!(sample.abs_soc, 103);
        assert_eq!(sample.serial_number, "BP2407-00123   ");
        assert_eq!(sample.hardware_version, "1.4");
        assert_eq!(sample.bootloader_version, "BL2.0");
        assert_eq!(sample.firmware_version, "4.1.7");
        assert_eq!(sample.cells_mv, [4100, 4105, 4108]);
        assert_eq!(sample.pack_voltage_mv, 12313);
        assert_eq!(sample.temperature_centi_c, 2315);
        assert_eq!(sample.health, 98);
        assert_eq!(sample.design_capacity_mah, 3500);
        assert_eq!(sample.actual_capacity_mah, 3410);
        assert_eq!(sample.remaining_capacity_mah, 3377);
        assert_eq!(sample.pd_voltage_mv, 9000);
        assert_eq!(sample.pd_current_ma, 1500);
    }

    #[test]
    fn catalog_order_test() {
        let mut link = ScriptedLink::new(healthy_pack());
        read_sample(&mut link).unwrap();
        let expected: Vec<u8> = Command::CATALOG
            .into_iter()
            .map(Command::field_id)
            .collect();
        assert_eq!(link.requested, expected);
    }

    #[test]
    fn missing_reply_fails_sample_test() {
        let mut replies = healthy_pack();
        replies.remove(&Command::Health.field_id());
        let mut link = ScriptedLink::new(replies);
        assert!(matches!(
            read_sample(&mut link),
            Err(Error::IncompleteSample("health"))
        ));
    }

    #[test]
    fn truncated_reply_fails_sample_test() {
        let mut replies = healthy_pack();
        replies.insert(Command::SerialNumber.field_id(), vec![0xA1; 10]);
        let mut link = ScriptedLink::new(replies);
        assert!(matches!(
            read_sample(&mut link),
            Err(Error::ShortReply {
                command: "serial-number",
                ..
            })
        ));
    }

    #[test]
    fn pd_sentinel_in_sample_test() {
        let mut replies = healthy_pack();
        replies.insert(
            Command::PdOutput.field_id(),
            reply(|rx| rx[16..24].fill(0xFF)),
        );
        let mut link = ScriptedLink::new(replies);
        let sample = read_sample(&mut link).unwrap();
        assert_eq!(sample.pd_voltage_mv, 0);
        assert_eq!(sample.pd_current_ma, 0);
        assert_eq!(sample.pd_power_w(), 0.0);
    }

    #[test]
    fn derived_values_test() {
        let mut link = ScriptedLink::new(healthy_pack());
        let sample = read_sample(&mut link).unwrap();
        assert_eq!(sample.max_cell_mv(), 4108);
        assert_eq!(sample.min_cell_mv(), 4100);
        assert_eq!(sample.cell_delta_mv(), 8);
        assert!((sample.pack_voltage() - 12.313).abs() < 1e-4);
        assert!((sample.temperature() - 23.15).abs() < 1e-4);
        assert!((sample.pd_power_w() - 13.5).abs() < 1e-4);
    }
}
