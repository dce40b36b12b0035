//! Emulation of a single CP210x part

use std::collections::HashMap;

use rsmt_core::params::cp2102n::{Cp2102nConfig, CONFIG_SIZE};
use rsmt_core::params::{
    BaudRateConfig, Block, DeviceMode, DualPortConfig, FlushBufferConfig, PortConfig,
    QuadPortConfig, UsbString,
};
use rsmt_core::transport::{decode_u16, decode_u8, encode_u16};
use rsmt_core::{Family, Field, PartNumber, StringEncoding, TransportError, TransportResult, VidPid};

/// Offset of `enableConfigUpdate` in the CP2102N image
const CP2102N_LOCK_OFFSET: usize = 4;

/// Identity of an emulated part
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Part number byte the chip reports
    pub part: PartNumber,
    /// VID/PID the chip enumerates with
    pub vid_pid: VidPid,
    /// Initial product string (ASCII)
    pub product: String,
    /// Initial serial number (ASCII)
    pub serial: String,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            part: PartNumber::Cp2102,
            vid_pid: VidPid::new(0x10c4, 0xea60),
            product: "CP2102 USB to UART Bridge Controller".into(),
            serial: "0001".into(),
        }
    }
}

/// A string as last written, in the encoding it was written with
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredString {
    encoding: StringEncoding,
    bytes: Vec<u8>,
}

impl StoredString {
    fn ascii(text: &str) -> Self {
        Self {
            encoding: StringEncoding::Ascii,
            bytes: text.as_bytes().to_vec(),
        }
    }

    /// Read back in `encoding`, converting like the firmware does
    fn read(&self, encoding: StringEncoding) -> Vec<u8> {
        match (self.encoding, encoding) {
            (a, b) if a == b => self.bytes.clone(),
            (StringEncoding::Ascii, StringEncoding::Unicode) => {
                self.bytes.iter().flat_map(|&b| [b, 0]).collect()
            }
            (_, _) => self.bytes.chunks(2).map(|c| c[0]).collect(),
        }
    }
}

/// Emulated CP210x part
///
/// Field semantics follow the real parts where it matters to the engine:
/// VID/PID writes only show after a reset, the power mode reads back as
/// 0/1, a locked part rejects every write, and the CP2102N keeps its USB
/// strings inside the configuration image.
#[derive(Debug, Clone)]
pub struct DummyChip {
    part: PartNumber,
    vid_pid: VidPid,
    pending_vid: Option<u16>,
    pending_pid: Option<u16>,
    power_mode: u8,
    max_power: u8,
    device_version: u16,
    strings: HashMap<Field, StoredString>,
    blocks: HashMap<Field, Vec<u8>>,
    lock_value: u8,
    /// Lock byte stored regardless of the value written
    lock_commit: Option<u8>,
    /// CP2102N only; stored with the lock byte normalized
    config: Option<Cp2102nConfig>,
    config_locked: bool,
    failing_reads: u32,
    failing_writes: u32,
    resets: u32,
}

impl DummyChip {
    /// Create a blank chip with the given identity
    pub fn new(config: DummyConfig) -> Self {
        let mut chip = Self {
            part: config.part,
            vid_pid: config.vid_pid,
            pending_vid: None,
            pending_pid: None,
            power_mode: 0,
            max_power: 0x32,
            device_version: 0x0100,
            strings: HashMap::new(),
            blocks: HashMap::new(),
            lock_value: 0,
            lock_commit: None,
            config: None,
            config_locked: false,
            failing_reads: 0,
            failing_writes: 0,
            resets: 0,
        };
        if config.part.family() == Family::Cp2102n {
            let mut image = Cp2102nConfig::blank();
            // Strings too long for the image are left blank
            let _ = image.set_usb_string(UsbString::Product, &config.product);
            let _ = image.set_usb_string(UsbString::SerialNumber, &config.serial);
            chip.config = Some(image);
        } else {
            chip.strings.insert(
                Field::ProductString(StringEncoding::Ascii),
                StoredString::ascii(&config.product),
            );
            chip.strings.insert(
                Field::SerialNumber(StringEncoding::Ascii),
                StoredString::ascii(&config.serial),
            );
        }
        chip
    }

    /// Blank chip of `part` enumerating as `vid_pid`
    pub fn blank(part: PartNumber, vid_pid: VidPid) -> Self {
        Self::new(DummyConfig {
            part,
            vid_pid,
            ..DummyConfig::default()
        })
    }

    /// Part number
    pub fn part(&self) -> PartNumber {
        self.part
    }

    /// VID/PID the chip currently enumerates with
    pub fn vid_pid(&self) -> VidPid {
        self.vid_pid
    }

    /// Whether the customizable area is locked
    pub fn is_locked(&self) -> bool {
        match self.part.family() {
            Family::Cp2102n => self.config_locked,
            _ => self.lock_value != 0,
        }
    }

    /// Number of resets seen so far
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Mark the chip as locked
    pub fn locked(mut self) -> Self {
        match self.part.family() {
            Family::Cp2102n => self.config_locked = true,
            _ => self.lock_value = 0xF0,
        }
        self
    }

    /// Store `value` whenever the lock byte is written, whatever was requested
    pub fn commits_lock_as(mut self, value: u8) -> Self {
        self.lock_commit = Some(value);
        self
    }

    /// Fail the next `count` field reads
    pub fn fail_reads(&mut self, count: u32) {
        self.failing_reads = count;
    }

    /// Fail the next `count` field writes
    pub fn fail_writes(&mut self, count: u32) {
        self.failing_writes = count;
    }

    /// Whether the part has `field` at all
    pub fn supports(&self, field: Field) -> bool {
        let family = self.part.family();
        match field {
            Field::Vid
            | Field::Pid
            | Field::PowerMode
            | Field::MaxPower
            | Field::DeviceVersion
            | Field::SerialNumber(_)
            | Field::ProductString(_) => true,
            Field::ManufacturerString(_) => matches!(family, Family::Cp2108 | Family::Cp2102n),
            Field::InterfaceString(i, _) => match family {
                Family::Cp2105 => i < 2,
                Family::Cp2108 => i < 4,
                _ => false,
            },
            Field::FlushBufferConfig => {
                matches!(family, Family::Cp2104 | Family::Cp2105 | Family::Cp2108)
            }
            Field::DeviceMode | Field::DualPortConfig => family == Family::Cp2105,
            Field::BaudRateConfig => {
                matches!(family, Family::Cp2102 | Family::Cp2103 | Family::Cp2109)
            }
            Field::PortConfig => matches!(family, Family::Cp2103 | Family::Cp2104),
            Field::QuadPortConfig => family == Family::Cp2108,
            Field::Config => family == Family::Cp2102n,
            Field::LockValue => family != Family::Cp2102n,
        }
    }

    /// Read a field the way [`rsmt_core::Device::get_field`] does
    pub fn get_field(&mut self, field: Field) -> TransportResult<Vec<u8>> {
        if !self.supports(field) {
            return Err(TransportError::Unsupported(field));
        }
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(TransportError::Transfer {
                operation: "get_field",
                message: "injected failure".into(),
            });
        }

        let value = match field {
            Field::Vid => encode_u16(self.vid_pid.vid),
            Field::Pid => encode_u16(self.vid_pid.pid),
            Field::PowerMode => vec![self.power_mode],
            Field::MaxPower => vec![self.max_power],
            Field::DeviceVersion => encode_u16(self.device_version),
            Field::LockValue => vec![self.lock_value],
            Field::Config => self.config_image(),
            Field::SerialNumber(enc) | Field::ProductString(enc) | Field::ManufacturerString(enc)
                if self.config.is_some() =>
            {
                self.config_string(field, enc)
            }
            Field::SerialNumber(enc)
            | Field::ProductString(enc)
            | Field::ManufacturerString(enc)
            | Field::InterfaceString(_, enc) => self
                .strings
                .get(&ascii_key(field))
                .map(|s| s.read(enc))
                .unwrap_or_default(),
            _ => self
                .blocks
                .get(&field)
                .cloned()
                .unwrap_or_else(|| vec![0; block_size(field)]),
        };
        Ok(value)
    }

    /// Write a field the way [`rsmt_core::Device::set_field`] does
    pub fn set_field(&mut self, field: Field, data: &[u8]) -> TransportResult<()> {
        if !self.supports(field) {
            return Err(TransportError::Unsupported(field));
        }
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(transfer_error("injected failure"));
        }
        if self.is_locked() {
            return Err(transfer_error("device is locked"));
        }

        match field {
            Field::Vid => self.pending_vid = Some(decode_u16(field, data)?),
            Field::Pid => self.pending_pid = Some(decode_u16(field, data)?),
            Field::PowerMode => self.power_mode = u8::from(decode_u8(field, data)? != 0),
            Field::MaxPower => self.max_power = decode_u8(field, data)?,
            Field::DeviceVersion => self.device_version = decode_u16(field, data)?,
            Field::LockValue => {
                let requested = decode_u8(field, data)?;
                self.lock_value = self.lock_commit.unwrap_or(requested);
            }
            Field::Config => self.write_config(data)?,
            Field::SerialNumber(enc) | Field::ProductString(enc) | Field::ManufacturerString(enc)
                if self.config.is_some() =>
            {
                self.write_config_string(field, enc, data)?
            }
            Field::SerialNumber(encoding)
            | Field::ProductString(encoding)
            | Field::ManufacturerString(encoding)
            | Field::InterfaceString(_, encoding) => {
                self.strings.insert(
                    ascii_key(field),
                    StoredString {
                        encoding,
                        bytes: data.to_vec(),
                    },
                );
            }
            _ => {
                let size = block_size(field);
                if data.len() != size {
                    return Err(transfer_error(format!(
                        "{:?} expects {} bytes, got {}",
                        field,
                        size,
                        data.len()
                    )));
                }
                self.blocks.insert(field, data.to_vec());
            }
        }
        log::trace!("dummy {} set {:?}", self.part, field);
        Ok(())
    }

    /// Re-enumerate, applying a pending VID/PID change
    pub fn reset(&mut self) {
        if let Some(vid) = self.pending_vid.take() {
            self.vid_pid.vid = vid;
        }
        if let Some(pid) = self.pending_pid.take() {
            self.vid_pid.pid = pid;
        }
        self.resets += 1;
    }

    fn config_image(&self) -> Vec<u8> {
        let Some(config) = &self.config else {
            return Vec::new();
        };
        let mut raw = config.as_bytes().to_vec();
        if self.config_locked {
            raw[CP2102N_LOCK_OFFSET] = 0;
        }
        raw
    }

    fn write_config(&mut self, data: &[u8]) -> TransportResult<()> {
        if data.len() != CONFIG_SIZE {
            return Err(transfer_error(format!(
                "config image must be {} bytes, got {}",
                CONFIG_SIZE,
                data.len()
            )));
        }
        let mut raw = data.to_vec();
        let locking = raw[CP2102N_LOCK_OFFSET] != 0xFF;
        raw[CP2102N_LOCK_OFFSET] = 0xFF;
        let image = Cp2102nConfig::from_bytes(raw)
            .map_err(|e| transfer_error(format!("rejected config image: {}", e)))?;
        self.config = Some(image);
        self.config_locked = locking;
        Ok(())
    }

    fn config_string(&self, field: Field, encoding: StringEncoding) -> Vec<u8> {
        let text = match (&self.config, usb_string(field)) {
            (Some(config), Some(which)) => config.usb_string(which).unwrap_or_default(),
            _ => String::new(),
        };
        match encoding {
            StringEncoding::Ascii => text.into_bytes(),
            StringEncoding::Unicode => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }

    fn write_config_string(
        &mut self,
        field: Field,
        encoding: StringEncoding,
        data: &[u8],
    ) -> TransportResult<()> {
        let text = match encoding {
            StringEncoding::Ascii => String::from_utf8_lossy(data).into_owned(),
            StringEncoding::Unicode => {
                let units: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
        };
        if let (Some(config), Some(which)) = (self.config.as_mut(), usb_string(field)) {
            config
                .set_usb_string(which, &text)
                .map_err(|e| transfer_error(e.to_string()))?;
        }
        Ok(())
    }
}

fn transfer_error(message: impl Into<String>) -> TransportError {
    TransportError::Transfer {
        operation: "set_field",
        message: message.into(),
    }
}

/// Strings are stored once regardless of the encoding they are accessed with
fn ascii_key(field: Field) -> Field {
    const A: StringEncoding = StringEncoding::Ascii;
    match field {
        Field::SerialNumber(_) => Field::SerialNumber(A),
        Field::ProductString(_) => Field::ProductString(A),
        Field::ManufacturerString(_) => Field::ManufacturerString(A),
        Field::InterfaceString(i, _) => Field::InterfaceString(i, A),
        other => other,
    }
}

fn usb_string(field: Field) -> Option<UsbString> {
    match field {
        Field::SerialNumber(_) => Some(UsbString::SerialNumber),
        Field::ProductString(_) => Some(UsbString::Product),
        Field::ManufacturerString(_) => Some(UsbString::Manufacturer),
        _ => None,
    }
}

fn block_size(field: Field) -> usize {
    match field {
        Field::FlushBufferConfig => FlushBufferConfig::SIZE,
        Field::DeviceMode => DeviceMode::SIZE,
        Field::BaudRateConfig => BaudRateConfig::SIZE,
        Field::PortConfig => PortConfig::SIZE,
        Field::DualPortConfig => DualPortConfig::SIZE,
        Field::QuadPortConfig => QuadPortConfig::SIZE,
        _ => 0,
    }
}
