//! CP210x USB protocol constants and helpers
//!
//! Customization writes are vendor OUT requests with bRequest 0xFF and a
//! wValue selecting the field. Scalar values travel in wIndex with no data
//! stage; tables, strings and the CP2102N image travel in the data stage.
//! Identity fields are read back from the standard descriptors.

use bitflags::bitflags;
use rsmt_core::{Field, StringEncoding};

/// Timeout for every control transfer
pub const USB_TIMEOUT_MS: u64 = 1000;

/// Interface claimed on every part
pub const CONTROL_INTERFACE: u8 = 0;

/// Vendor request used for all customization traffic
pub const CP210X_VENDOR_REQUEST: u8 = 0xFF;

// wValue selectors
pub const REG_VID: u16 = 0x3701;
pub const REG_PID: u16 = 0x3702;
pub const REG_PRODUCT_STRING: u16 = 0x3703;
pub const REG_SERIAL_NUMBER: u16 = 0x3704;
pub const REG_POWER_ATTRIBUTES: u16 = 0x3705;
pub const REG_MAX_POWER: u16 = 0x3706;
pub const REG_DEVICE_VERSION: u16 = 0x3707;
pub const REG_BAUD_CONFIG: u16 = 0x3709;
pub const REG_LOCK_VALUE: u16 = 0x370A;
pub const REG_PART_NUMBER: u16 = 0x370B;
pub const REG_PORT_CONFIG: u16 = 0x370C;
pub const REG_FLUSH_BUFFER_CONFIG: u16 = 0x370D;
pub const REG_DEVICE_MODE: u16 = 0x370E;
pub const REG_CP2102N_CONFIG: u16 = 0x370F;
pub const REG_MANUFACTURER_STRING: u16 = 0x3714;
pub const REG_INTERFACE_STRING: u16 = 0x3715;
/// wValue of the CP2102N configuration read
pub const REG_CP2102N_CONFIG_READ: u16 = 0x000E;

// Standard requests
pub const USB_REQUEST_GET_DESCRIPTOR: u8 = 0x06;
pub const USB_DESCRIPTOR_DEVICE: u8 = 0x01;
pub const USB_DESCRIPTOR_CONFIGURATION: u8 = 0x02;
pub const USB_DESCRIPTOR_STRING: u8 = 0x03;
pub const USB_DESCRIPTOR_INTERFACE: u8 = 0x04;
/// US English
pub const USB_LANGID: u16 = 0x0409;

pub const DEVICE_DESCRIPTOR_LEN: usize = 18;
pub const CONFIG_DESCRIPTOR_LEN: usize = 9;
pub const MAX_DESCRIPTOR_LEN: usize = 255;

// Offsets in the device descriptor
pub const DEVICE_ID_VENDOR: usize = 8;
pub const DEVICE_ID_PRODUCT: usize = 10;
pub const DEVICE_BCD_DEVICE: usize = 12;
pub const DEVICE_I_MANUFACTURER: usize = 14;
pub const DEVICE_I_PRODUCT: usize = 15;
pub const DEVICE_I_SERIAL: usize = 16;

// Offsets in the configuration descriptor
pub const CONFIG_TOTAL_LENGTH: usize = 2;
pub const CONFIG_ATTRIBUTES: usize = 7;
pub const CONFIG_MAX_POWER: usize = 8;

bitflags! {
    /// bmAttributes of the configuration descriptor
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigAttributes: u8 {
        /// Must always be set
        const RESERVED_ONE = 0x80;
        /// Device has its own power source
        const SELF_POWERED = 0x40;
        /// Device can wake the host
        const REMOTE_WAKEUP = 0x20;
    }
}

impl ConfigAttributes {
    /// Attributes written for a `PowerMode` value
    pub fn from_power_mode(self_powered: bool) -> Self {
        if self_powered {
            Self::RESERVED_ONE | Self::SELF_POWERED
        } else {
            Self::RESERVED_ONE
        }
    }
}

/// wValue used to write `field`
pub fn write_register(field: Field) -> u16 {
    match field {
        Field::Vid => REG_VID,
        Field::Pid => REG_PID,
        Field::PowerMode => REG_POWER_ATTRIBUTES,
        Field::MaxPower => REG_MAX_POWER,
        Field::DeviceVersion => REG_DEVICE_VERSION,
        Field::SerialNumber(_) => REG_SERIAL_NUMBER,
        Field::ProductString(_) => REG_PRODUCT_STRING,
        Field::ManufacturerString(_) => REG_MANUFACTURER_STRING,
        Field::InterfaceString(_, _) => REG_INTERFACE_STRING,
        Field::FlushBufferConfig => REG_FLUSH_BUFFER_CONFIG,
        Field::DeviceMode => REG_DEVICE_MODE,
        Field::BaudRateConfig => REG_BAUD_CONFIG,
        Field::PortConfig | Field::DualPortConfig | Field::QuadPortConfig => REG_PORT_CONFIG,
        Field::Config => REG_CP2102N_CONFIG,
        Field::LockValue => REG_LOCK_VALUE,
    }
}

/// Build a USB string descriptor from a field payload
///
/// ASCII payloads are widened to UTF-16LE. Returns `None` if the result
/// does not fit in a descriptor.
pub fn string_descriptor(encoding: StringEncoding, data: &[u8]) -> Option<Vec<u8>> {
    let mut desc = vec![0, USB_DESCRIPTOR_STRING];
    match encoding {
        StringEncoding::Ascii => desc.extend(data.iter().flat_map(|&b| [b, 0])),
        StringEncoding::Unicode => desc.extend_from_slice(data),
    }
    desc[0] = u8::try_from(desc.len()).ok()?;
    Some(desc)
}

/// Extract a field payload from a USB string descriptor
pub fn string_payload(encoding: StringEncoding, desc: &[u8]) -> Vec<u8> {
    let len = desc.first().map_or(0, |&l| usize::from(l)).min(desc.len());
    let body = desc.get(2..len).unwrap_or_default();
    match encoding {
        StringEncoding::Ascii => body.chunks(2).map(|c| c[0]).collect(),
        StringEncoding::Unicode => body.to_vec(),
    }
}

/// Find the iInterface string index of `interface` in a full configuration descriptor
pub fn interface_string_index(config: &[u8], interface: u8) -> Option<u8> {
    let mut rest = config;
    while let [len, kind, ..] = rest {
        let len = usize::from(*len);
        if len < 2 || len > rest.len() {
            break;
        }
        if *kind == USB_DESCRIPTOR_INTERFACE && len >= 9 && rest[2] == interface && rest[3] == 0 {
            return Some(rest[8]).filter(|&i| i != 0);
        }
        rest = &rest[len..];
    }
    None
}
