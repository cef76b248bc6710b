use crate::Error;
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Range};

// Give the BMU time to turn the line around between two exchanges.
pub const MINIMUM_DELAY: std::time::Duration = std::time::Duration::from_millis(5);

pub const REQUEST_LENGTH: usize = 8;
/// Upper bound on the response window for any catalog command.
pub const MAX_REPLY_LENGTH: usize = 128;

const FRAME_START: u8 = 0xA1;
const FRAME_UNIT: u8 = 0x01;
const FRAME_TAIL: [u8; 5] = [0x03, 0x01, 0x00, 0x40, 0x00];

// Field layouts, as byte offsets into the raw reply.
const PERCENT_OFFSET: usize = 1;
const HARDWARE_VERSION_RANGE: Range<usize> = 2..5;
const SERIAL_NUMBER_RANGE: Range<usize> = 6..21;
const BOOTLOADER_VERSION_RANGE: Range<usize> = 7..12;
const FIRMWARE_VERSION_RANGE: Range<usize> = 12..17;
const TEMPERATURE_RANGE: Range<usize> = 1..5;
// Health and the capacity counters share one two-byte layout.
const WORD_RANGE: Range<usize> = 1..3;
const CELL_VOLTAGES_RANGE: Range<usize> = 1..7;
const PD_VOLTAGE_RANGE: Range<usize> = 16..20;
const PD_CURRENT_RANGE: Range<usize> = 20..24;

/// Telemetry commands understood by the BMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Soc,
    AbsSoc,
    SerialNumber,
    HardwareVersion,
    BootloaderVersion,
    FirmwareVersion,
    PdOutput,
    Temperature,
    Health,
    DesignCapacity,
    ActualCapacity,
    RemainingCapacity,
    CellVoltages,
}

impl Command {
    /// The full catalog, in polling order.
    pub const CATALOG: [Command; 13] = [
        Command::Soc,
        Command::AbsSoc,
        Command::SerialNumber,
        Command::HardwareVersion,
        Command::BootloaderVersion,
        Command::FirmwareVersion,
        Command::PdOutput,
        Command::Temperature,
        Command::Health,
        Command::DesignCapacity,
        Command::ActualCapacity,
        Command::RemainingCapacity,
        Command::CellVoltages,
    ];

    pub fn field_id(self) -> u8 {
        match self {
            Command::Soc => 0xE0,
            Command::AbsSoc => 0xED,
            Command::SerialNumber => 0xD3,
            Command::HardwareVersion => 0xD4,
            Command::BootloaderVersion => 0xD5,
            Command::FirmwareVersion => 0xD6,
            Command::PdOutput => 0xC4,
            Command::Temperature => 0xE1,
            Command::Health => 0xE4,
            Command::DesignCapacity => 0xEB,
            Command::ActualCapacity => 0xEC,
            Command::RemainingCapacity => 0xEE,
            Command::CellVoltages => 0xEF,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Soc => "soc",
            Command::AbsSoc => "abs-soc",
            Command::SerialNumber => "serial-number",
            Command::HardwareVersion => "hardware-version",
            Command::BootloaderVersion => "bootloader-version",
            Command::FirmwareVersion => "firmware-version",
            Command::PdOutput => "pd-output",
            Command::Temperature => "temperature",
            Command::Health => "health",
            Command::DesignCapacity => "design-capacity",
            Command::ActualCapacity => "actual-capacity",
            Command::RemainingCapacity => "remaining-capacity",
            Command::CellVoltages => "cell-voltages",
        }
    }

    pub fn from_name(name: &str) -> std::result::Result<Self, Error> {
        Self::CATALOG
            .into_iter()
            .find(|command| command.name() == name)
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))
    }

    pub fn request(self) -> [u8; REQUEST_LENGTH] {
        let mut tx_buffer = [0; REQUEST_LENGTH];
        tx_buffer[0] = FRAME_START;
        tx_buffer[1] = FRAME_UNIT;
        tx_buffer[2] = self.field_id();
        tx_buffer[3..].copy_from_slice(&FRAME_TAIL);
        tx_buffer
    }

    /// Bytes of the reply needed to decode this command's field.
    pub fn reply_size(self) -> usize {
        match self {
            Command::Soc | Command::AbsSoc => PERCENT_OFFSET + 1,
            Command::SerialNumber => SERIAL_NUMBER_RANGE.end,
            Command::HardwareVersion => HARDWARE_VERSION_RANGE.end,
            Command::BootloaderVersion => BOOTLOADER_VERSION_RANGE.end,
            Command::FirmwareVersion => FIRMWARE_VERSION_RANGE.end,
            Command::PdOutput => PD_CURRENT_RANGE.end,
            Command::Temperature => TEMPERATURE_RANGE.end,
            Command::Health
            | Command::DesignCapacity
            | Command::ActualCapacity
            | Command::RemainingCapacity => WORD_RANGE.end,
            Command::CellVoltages => CELL_VOLTAGES_RANGE.end,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn validate_len(
    command: Command,
    rx_buffer: &[u8],
    reply_size: usize,
) -> std::result::Result<(), Error> {
    if rx_buffer.len() < reply_size {
        log::warn!(
            "Invalid reply size for {} - required={} received={}",
            command,
            reply_size,
            rx_buffer.len()
        );
        return Err(Error::ShortReply {
            command: command.name(),
            required: reply_size,
            received: rx_buffer.len(),
        });
    }
    Ok(())
}

fn le_u16(rx_buffer: &[u8], range: Range<usize>) -> u16 {
    u16::from_le_bytes([rx_buffer[range.start], rx_buffer[range.start + 1]])
}

fn le_u32(rx_buffer: &[u8], range: Range<usize>) -> u32 {
    u32::from_le_bytes([
        rx_buffer[range.start],
        rx_buffer[range.start + 1],
        rx_buffer[range.start + 2],
        rx_buffer[range.start + 3],
    ])
}

fn ascii_field(
    command: Command,
    rx_buffer: &[u8],
    range: Range<usize>,
) -> std::result::Result<String, Error> {
    validate_len(command, rx_buffer, range.end)?;
    let raw = &rx_buffer[range];
    if !raw.is_ascii() {
        log::warn!("Non-ASCII bytes in {} field: {:02X?}", command, raw);
        return Err(Error::NonAsciiField {
            command: command.name(),
        });
    }
    Ok(String::from_utf8_lossy(raw).into_owned())
}

fn word_field(command: Command, rx_buffer: &[u8]) -> std::result::Result<u16, Error> {
    validate_len(command, rx_buffer, WORD_RANGE.end)?;
    Ok(le_u16(rx_buffer, WORD_RANGE))
}

pub fn decode_soc(rx_buffer: &[u8]) -> std::result::Result<u8, Error> {
    validate_len(Command::Soc, rx_buffer, Command::Soc.reply_size())?;
    Ok(rx_buffer[PERCENT_OFFSET])
}

pub fn decode_abs_soc(rx_buffer: &[u8]) -> std::result::Result<u8, Error> {
    validate_len(Command::AbsSoc, rx_buffer, Command::AbsSoc.reply_size())?;
    Ok(rx_buffer[PERCENT_OFFSET])
}

pub fn decode_serial_number(rx_buffer: &[u8]) -> std::result::Result<String, Error> {
    ascii_field(Command::SerialNumber, rx_buffer, SERIAL_NUMBER_RANGE)
}

pub fn decode_hardware_version(rx_buffer: &[u8]) -> std::result::Result<String, Error> {
    ascii_field(Command::HardwareVersion, rx_buffer, HARDWARE_VERSION_RANGE)
}

pub fn decode_bootloader_version(rx_buffer: &[u8]) -> std::result::Result<String, Error> {
    ascii_field(
        Command::BootloaderVersion,
        rx_buffer,
        BOOTLOADER_VERSION_RANGE,
    )
}

pub fn decode_firmware_version(rx_buffer: &[u8]) -> std::result::Result<String, Error> {
    ascii_field(Command::FirmwareVersion, rx_buffer, FIRMWARE_VERSION_RANGE)
}

/// Pack temperature in 0.01 degree Celsius units.
pub fn decode_temperature(rx_buffer: &[u8]) -> std::result::Result<i32, Error> {
    validate_len(
        Command::Temperature,
        rx_buffer,
        Command::Temperature.reply_size(),
    )?;
    Ok(le_u32(rx_buffer, TEMPERATURE_RANGE) as i32)
}

pub fn decode_health(rx_buffer: &[u8]) -> std::result::Result<u16, Error> {
    word_field(Command::Health, rx_buffer)
}

pub fn decode_design_capacity(rx_buffer: &[u8]) -> std::result::Result<u16, Error> {
    word_field(Command::DesignCapacity, rx_buffer)
}

pub fn decode_actual_capacity(rx_buffer: &[u8]) -> std::result::Result<u16, Error> {
    word_field(Command::ActualCapacity, rx_buffer)
}

pub fn decode_remaining_capacity(rx_buffer: &[u8]) -> std::result::Result<u16, Error> {
    word_field(Command::RemainingCapacity, rx_buffer)
}

/// Individual cell voltages in millivolts.
pub fn decode_cell_voltages(rx_buffer: &[u8]) -> std::result::Result<[u16; 3], Error> {
    validate_len(
        Command::CellVoltages,
        rx_buffer,
        Command::CellVoltages.reply_size(),
    )?;
    Ok([
        le_u16(rx_buffer, 1..3),
        le_u16(rx_buffer, 3..5),
        le_u16(rx_buffer, 5..7),
    ])
}

/// USB power-delivery rail readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdOutput {
    pub voltage_mv: u32,
    pub current_ma: u32,
}

pub fn decode_pd_output(rx_buffer: &[u8]) -> std::result::Result<PdOutput, Error> {
    validate_len(
        Command::PdOutput,
        rx_buffer,
        Command::PdOutput.reply_size(),
    )?;
    // All-ones in either range means no PD source is attached.
    let voltage = &rx_buffer[PD_VOLTAGE_RANGE];
    let current = &rx_buffer[PD_CURRENT_RANGE];
    if voltage.iter().all(|b| *b == 0xFF) || current.iter().all(|b| *b == 0xFF) {
        log::trace!("PD sentinel observed, rail not attached");
        return Ok(PdOutput {
            voltage_mv: 0,
            current_ma: 0,
        });
    }
    Ok(PdOutput {
        voltage_mv: le_u32(rx_buffer, PD_VOLTAGE_RANGE),
        current_ma: le_u32(rx_buffer, PD_CURRENT_RANGE),
    })
}
