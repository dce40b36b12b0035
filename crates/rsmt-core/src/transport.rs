//! Transport collaborator traits
//!
//! The engine never talks to USB directly. A [`Transport`] enumerates and
//! opens devices; each opened [`Device`] exposes byte-level get/set access to
//! the customizable fields. Dropping a device closes it.
//!
//! Field payloads are the device's wire image with one exception: scalar
//! 16-bit values (`Vid`, `Pid`, `DeviceVersion`, `FlushBufferConfig`) are
//! carried as two little-endian bytes and single-byte values as one byte.
//! Strings are carried as ASCII bytes or UTF-16LE code units depending on the
//! requested [`StringEncoding`], without descriptor header.

use std::time::Duration;

use crate::error::TransportError;
use crate::types::VidPid;

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// How a string field is exchanged with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringEncoding {
    /// One byte per character
    Ascii,
    /// UTF-16LE code units
    Unicode,
}

/// Customizable field identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// USB vendor id
    Vid,
    /// USB product id
    Pid,
    /// 1 if self powered, 0 if bus powered
    PowerMode,
    /// bMaxPower (2 mA units)
    MaxPower,
    /// bcdDevice
    DeviceVersion,
    /// Serial number string
    SerialNumber(StringEncoding),
    /// Product string
    ProductString(StringEncoding),
    /// Manufacturer string
    ManufacturerString(StringEncoding),
    /// Per-interface string
    InterfaceString(u8, StringEncoding),
    /// Flush buffer configuration word
    FlushBufferConfig,
    /// ECI/SCI device mode pair
    DeviceMode,
    /// 32-entry baud rate table
    BaudRateConfig,
    /// Single interface GPIO configuration
    PortConfig,
    /// Dual interface GPIO configuration
    DualPortConfig,
    /// Quad interface GPIO configuration
    QuadPortConfig,
    /// CP2102N raw configuration blob
    Config,
    /// Lock byte; non-zero once locked
    LockValue,
}

/// One opened device
///
/// Handles are closed when dropped.
pub trait Device {
    /// Part number byte reported by the device
    fn part_number(&self) -> TransportResult<u8>;

    /// Currently enumerated VID/PID
    fn vid_pid(&self) -> TransportResult<VidPid>;

    /// Read a field
    fn get_field(&self, field: Field) -> TransportResult<Vec<u8>>;

    /// Write a field
    fn set_field(&self, field: Field, data: &[u8]) -> TransportResult<()>;

    /// Soft reset (USB disconnect/reconnect)
    fn reset(&self) -> TransportResult<()>;

    /// Raw lock query based on [`Field::LockValue`]
    fn is_locked(&self) -> TransportResult<bool> {
        let value = self.get_field(Field::LockValue)?;
        Ok(value.first().is_some_and(|&b| b != 0))
    }
}

/// Device enumeration
pub trait Transport {
    /// Device handle type
    type Device: Device;

    /// Number of devices currently enumerated under `filter`
    fn count_devices(&self, filter: VidPid) -> TransportResult<u32>;

    /// Open the `index`th device enumerated under `filter`
    fn open(&self, filter: VidPid, index: u32) -> TransportResult<Self::Device>;
}

/// Blocking delay provider
pub trait Delay {
    /// Sleep for the given duration
    fn delay(&mut self, duration: Duration);
}

/// [`Delay`] backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Encode a 16-bit scalar field payload
pub fn encode_u16(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// Decode a 16-bit scalar field payload
pub fn decode_u16(field: Field, data: &[u8]) -> TransportResult<u16> {
    match data {
        [lo, hi] => Ok(u16::from_le_bytes([*lo, *hi])),
        _ => Err(TransportError::InvalidResponse {
            field,
            message: format!("expected 2 bytes, got {}", data.len()),
        }),
    }
}

/// Decode a single-byte field payload
pub fn decode_u8(field: Field, data: &[u8]) -> TransportResult<u8> {
    match data {
        [b] => Ok(*b),
        _ => Err(TransportError::InvalidResponse {
            field,
            message: format!("expected 1 byte, got {}", data.len()),
        }),
    }
}
