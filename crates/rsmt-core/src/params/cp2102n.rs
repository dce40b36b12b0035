//! CP2102N raw configuration blob
//!
//! The CP2102N keeps all customizable data in a single 678-byte image:
//!
//! | offset | size | contents |
//! |--------|------|----------|
//! | 0      | 2    | configSize (little-endian, 0x02A6) |
//! | 2      | 1    | configVersion (1) |
//! | 3      | 1    | enableBootloader |
//! | 4      | 1    | enableConfigUpdate (0xFF = unlocked) |
//! | 59     | 131  | manufacturer string descriptor |
//! | 190    | 259  | product string descriptor |
//! | 449    | 131  | serial number string descriptor |
//! | 676    | 2    | Fletcher-16 checksum (big-endian) over bytes 0..676 |
//!
//! String regions hold a big-endian 16-bit length, the descriptor type byte
//! 0x03 and the UTF-16LE payload including a terminating zero unit.

use crate::error::{Error, Result};
use crate::grammar::{Reader, Writer};
use crate::transport::{Device, Field};

/// Size of the configuration image
pub const CONFIG_SIZE: usize = 0x2A6;
/// Only supported layout version
pub const CONFIG_VERSION: u8 = 1;
/// `enableConfigUpdate` value of an unlocked part
pub const CONFIG_UNLOCKED: u8 = 0xFF;

const VERSION_OFFSET: usize = 2;
const CONFIG_UPDATE_OFFSET: usize = 4;
const CHECKSUM_OFFSET: usize = CONFIG_SIZE - 2;
const USB_STRING_DESCRIPTOR: u8 = 0x03;

/// Fletcher-16 as computed by the CP2102N firmware
///
/// Both sums start at 0xFF and are folded every 20 bytes, which keeps
/// them within 16 bits.
pub fn fletcher16(data: &[u8]) -> u16 {
    let mut sum1: u16 = 0xff;
    let mut sum2: u16 = 0xff;

    for block in data.chunks(20) {
        for &b in block {
            sum1 += u16::from(b);
            sum2 += sum1;
        }
        sum1 = (sum1 & 0xff) + (sum1 >> 8);
        sum2 = (sum2 & 0xff) + (sum2 >> 8);
    }
    sum1 = (sum1 & 0xff) + (sum1 >> 8);
    sum2 = (sum2 & 0xff) + (sum2 >> 8);

    (sum2 << 8) | sum1
}

/// String descriptor slot inside the blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbString {
    /// Manufacturer
    Manufacturer,
    /// Product
    Product,
    /// Serial number
    SerialNumber,
}

impl UsbString {
    /// Offset and size of the region
    const fn region(self) -> (usize, usize) {
        match self {
            Self::Manufacturer => (59, 131),
            Self::Product => (190, 259),
            Self::SerialNumber => (449, 131),
        }
    }
}

/// A complete CP2102N configuration image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cp2102nConfig {
    raw: Vec<u8>,
}

impl Cp2102nConfig {
    /// Validate an image taken from configuration text
    ///
    /// The image must describe an unlocked part; locking is only done
    /// through the explicit lock step.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        if raw.len() != CONFIG_SIZE {
            return Err(Error::Usage(format!(
                "CP2102N Config must be {} bytes, got {}",
                CONFIG_SIZE,
                raw.len()
            )));
        }
        let config = Self { raw };
        if config.version() != CONFIG_VERSION {
            return Err(Error::Usage(
                "CP2102N Config::configVersion is invalid".into(),
            ));
        }
        if usize::from(config.config_size()) != CONFIG_SIZE {
            return Err(Error::Usage("CP2102N Config::configSize is invalid".into()));
        }
        if config.raw[CONFIG_UPDATE_OFFSET] != CONFIG_UNLOCKED {
            return Err(Error::Usage(
                "CP2102N Config::enableConfigUpdate attempts to lock, use --lock instead".into(),
            ));
        }
        Ok(config)
    }

    /// Factory-blank image: valid header, empty strings, correct checksum
    pub fn blank() -> Self {
        let mut raw = vec![0u8; CONFIG_SIZE];
        raw[..2].copy_from_slice(&(CONFIG_SIZE as u16).to_le_bytes());
        raw[VERSION_OFFSET] = CONFIG_VERSION;
        raw[CONFIG_UPDATE_OFFSET] = CONFIG_UNLOCKED;
        let mut config = Self { raw };
        config.update_checksum();
        config
    }

    /// Raw image
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// `configSize` header field
    pub fn config_size(&self) -> u16 {
        u16::from_le_bytes([self.raw[0], self.raw[1]])
    }

    /// `configVersion` header field
    pub fn version(&self) -> u8 {
        self.raw[VERSION_OFFSET]
    }

    /// Whether `enableConfigUpdate` is cleared
    pub fn is_locked(&self) -> bool {
        self.raw[CONFIG_UPDATE_OFFSET] != CONFIG_UNLOCKED
    }

    /// Checksum stored in the trailing slot
    pub fn stored_checksum(&self) -> u16 {
        u16::from_be_bytes([self.raw[CHECKSUM_OFFSET], self.raw[CHECKSUM_OFFSET + 1]])
    }

    /// Checksum computed over the image
    pub fn checksum(&self) -> u16 {
        fletcher16(&self.raw[..CHECKSUM_OFFSET])
    }

    fn update_checksum(&mut self) {
        let sum = self.checksum();
        self.raw[CHECKSUM_OFFSET..].copy_from_slice(&sum.to_be_bytes());
    }

    /// Copy with the lock byte forced to the unlocked value
    pub fn with_lock_normalized(&self) -> Self {
        let mut copy = self.clone();
        copy.raw[CONFIG_UPDATE_OFFSET] = CONFIG_UNLOCKED;
        copy
    }

    /// Compare with an image read back from a device
    ///
    /// The lock byte is normalized on both sides since a locked device
    /// legitimately differs there.
    pub fn matches(&self, device_image: &[u8]) -> bool {
        if device_image.len() != CONFIG_SIZE {
            return false;
        }
        let mut normalized = device_image.to_vec();
        normalized[CONFIG_UPDATE_OFFSET] = CONFIG_UNLOCKED;
        normalized == self.with_lock_normalized().raw
    }

    /// Replace a string descriptor and refresh the checksum
    pub fn set_usb_string(&mut self, which: UsbString, value: &str) -> Result<()> {
        let (offset, size) = which.region();
        let units: Vec<u16> = value.encode_utf16().collect();
        let desc_len = (units.len() + 1) * 2;
        if desc_len + 3 > size {
            return Err(Error::Usage("USB String Descriptor is too large.".into()));
        }

        let region = &mut self.raw[offset..offset + size];
        region.fill(0);
        region[..2].copy_from_slice(&(desc_len as u16).to_be_bytes());
        region[2] = USB_STRING_DESCRIPTOR;
        for (i, unit) in units.iter().enumerate() {
            region[3 + i * 2..5 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }

        self.update_checksum();
        Ok(())
    }

    /// Decode a string descriptor, if the region holds a valid one
    pub fn usb_string(&self, which: UsbString) -> Option<String> {
        let (offset, size) = which.region();
        let region = &self.raw[offset..offset + size];
        let desc_len = usize::from(u16::from_be_bytes([region[0], region[1]]));
        if region[2] != USB_STRING_DESCRIPTOR || desc_len < 2 || desc_len + 3 > size {
            return None;
        }
        let units: Vec<u16> = region[3..3 + desc_len - 2]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16(&units).ok()
    }

    /// Parse the value part of a `Config { ... }` block
    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self> {
        let raw = r.read_byte_array_exact(CONFIG_SIZE)?;
        Self::from_bytes(raw)
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        w.byte_array(&self.raw);
    }
}

/// Validate an image read back from a device and return its lock state
pub fn decode_lock_state(raw: &[u8]) -> Result<bool> {
    if raw.len() <= CONFIG_UPDATE_OFFSET {
        return Err(Error::Customization(
            "CP2102N returned invalid config size".into(),
        ));
    }
    if raw[VERSION_OFFSET] != CONFIG_VERSION {
        return Err(Error::Customization(
            "CP2102N returned unknown config version".into(),
        ));
    }
    if usize::from(u16::from_le_bytes([raw[0], raw[1]])) <= CONFIG_UPDATE_OFFSET {
        return Err(Error::Customization(
            "CP2102N returned invalid config size".into(),
        ));
    }
    Ok(raw[CONFIG_UPDATE_OFFSET] != CONFIG_UNLOCKED)
}

/// Lock state of a CP2102N, derived from its configuration image
pub fn is_locked<D: Device>(device: &D) -> Result<bool> {
    let raw = device.get_field(Field::Config)?;
    decode_lock_state(&raw)
}

/// Clear `enableConfigUpdate` and confirm the device committed the image
pub fn lock<D: Device>(device: &D) -> Result<()> {
    let mut raw = device.get_field(Field::Config)?;
    if raw.len() <= CONFIG_UPDATE_OFFSET {
        return Err(Error::Customization(
            "CP2102N returned invalid config size".into(),
        ));
    }
    raw[CONFIG_UPDATE_OFFSET] = 0;
    device.set_field(Field::Config, &raw)?;

    let committed = device.get_field(Field::Config)?;
    if committed != raw {
        return Err(Error::Customization(
            "CP2102N config verification failed after locking".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fletcher16_empty() {
        // No data: only the final fold of the 0xFF seeds
        assert_eq!(fletcher16(&[]), 0xffff);
    }

    #[test]
    fn test_fletcher16_known_values() {
        // sum1 = 0xff + 1 = 0x100 -> 0x01, sum2 = 0xff + 0x100 = 0x1ff -> 0x100 -> 0x01
        assert_eq!(fletcher16(&[0x01]), 0x0101);
        assert_eq!(fletcher16(&[0x00; 40]), fletcher16(&[0x00; 40]));
    }

    #[test]
    fn test_fletcher16_detects_single_byte_change() {
        let mut data = vec![0x5au8; 100];
        let before = fletcher16(&data);
        data[57] ^= 0x01;
        assert_ne!(before, fletcher16(&data));
    }

    #[test]
    fn test_fletcher16_large_input_does_not_overflow() {
        let data = vec![0xffu8; CONFIG_SIZE];
        let _ = fletcher16(&data);
    }

    #[test]
    fn test_blank_is_valid() {
        let blank = Cp2102nConfig::blank();
        assert_eq!(blank.as_bytes().len(), CONFIG_SIZE);
        assert_eq!(blank.config_size(), 0x02a6);
        assert_eq!(blank.as_bytes()[0], 0xa6);
        assert_eq!(blank.version(), CONFIG_VERSION);
        assert!(!blank.is_locked());
        assert_eq!(blank.stored_checksum(), blank.checksum());
        assert!(Cp2102nConfig::from_bytes(blank.as_bytes().to_vec()).is_ok());
    }

    #[test]
    fn test_from_bytes_rejects_bad_header() {
        let mut raw = Cp2102nConfig::blank().as_bytes().to_vec();
        raw[VERSION_OFFSET] = 2;
        let err = Cp2102nConfig::from_bytes(raw).unwrap_err();
        assert!(err.to_string().contains("configVersion"));

        let mut raw = Cp2102nConfig::blank().as_bytes().to_vec();
        raw[0] = 0;
        let err = Cp2102nConfig::from_bytes(raw).unwrap_err();
        assert!(err.to_string().contains("configSize"));

        let mut raw = Cp2102nConfig::blank().as_bytes().to_vec();
        raw[CONFIG_UPDATE_OFFSET] = 0;
        let err = Cp2102nConfig::from_bytes(raw).unwrap_err();
        assert!(err.to_string().contains("use --lock instead"));

        assert!(Cp2102nConfig::from_bytes(vec![0; 10]).is_err());
    }

    #[test]
    fn test_set_usb_string_layout() {
        let mut config = Cp2102nConfig::blank();
        config.set_usb_string(UsbString::SerialNumber, "AB").unwrap();

        let raw = config.as_bytes();
        // (2 units + terminator) * 2 bytes
        assert_eq!(&raw[449..452], &[0x00, 0x06, 0x03]);
        assert_eq!(&raw[452..458], &[b'A', 0, b'B', 0, 0, 0]);
        assert!(raw[458..449 + 131].iter().all(|&b| b == 0));
        assert_eq!(config.stored_checksum(), config.checksum());
        assert_eq!(
            config.usb_string(UsbString::SerialNumber).as_deref(),
            Some("AB")
        );
    }

    #[test]
    fn test_set_usb_string_clears_previous_value() {
        let mut config = Cp2102nConfig::blank();
        config
            .set_usb_string(UsbString::Product, "A much longer product name")
            .unwrap();
        config.set_usb_string(UsbString::Product, "X").unwrap();
        assert_eq!(config.usb_string(UsbString::Product).as_deref(), Some("X"));
        assert!(config.as_bytes()[190 + 7..190 + 259].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_set_usb_string_changes_checksum() {
        let mut config = Cp2102nConfig::blank();
        let before = config.stored_checksum();
        config.set_usb_string(UsbString::Manufacturer, "ACME").unwrap();
        assert_ne!(before, config.stored_checksum());
    }

    #[test]
    fn test_set_usb_string_too_large() {
        let mut config = Cp2102nConfig::blank();
        // 63 units: (63 + 1) * 2 + 3 = 131 fits exactly
        assert!(config
            .set_usb_string(UsbString::SerialNumber, &"9".repeat(63))
            .is_ok());
        let err = config
            .set_usb_string(UsbString::SerialNumber, &"9".repeat(64))
            .unwrap_err();
        assert_eq!(err.to_string(), "USB String Descriptor is too large.");
    }

    #[test]
    fn test_lock_normalization() {
        let config = Cp2102nConfig::blank();
        let mut locked = config.clone();
        locked.raw[CONFIG_UPDATE_OFFSET] = 0;
        assert!(locked.is_locked());
        assert_ne!(locked, config);
        assert_eq!(locked.with_lock_normalized(), config);
        assert!(config.matches(locked.as_bytes()));
        assert!(!config.matches(&locked.as_bytes()[1..]));

        let mut other = locked.raw.clone();
        other[100] ^= 0xff;
        assert!(!config.matches(&other));
    }

    #[test]
    fn test_decode_lock_state() {
        let blank = Cp2102nConfig::blank();
        assert!(!decode_lock_state(blank.as_bytes()).unwrap());

        let mut raw = blank.as_bytes().to_vec();
        raw[CONFIG_UPDATE_OFFSET] = 0;
        assert!(decode_lock_state(&raw).unwrap());

        raw[VERSION_OFFSET] = 9;
        assert!(decode_lock_state(&raw).is_err());
        assert!(decode_lock_state(&[0xa6, 0x02]).is_err());
    }
}
