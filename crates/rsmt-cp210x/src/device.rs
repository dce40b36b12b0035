//! CP210x device implementation
//!
//! This module provides [`Cp210x`], one opened part implementing
//! [`rsmt_core::Device`], and [`UsbTransport`], which enumerates parts by
//! VID/PID and implements [`rsmt_core::Transport`].

use std::time::Duration;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{DeviceInfo, Interface, MaybeFuture};
use rsmt_core::params::cp2102n::CONFIG_SIZE;
use rsmt_core::params::{
    BaudRateConfig, Block, DeviceMode, DualPortConfig, FlushBufferConfig, PortConfig,
    QuadPortConfig,
};
use rsmt_core::transport::{decode_u16, decode_u8};
use rsmt_core::{Device, Field, StringEncoding, Transport, TransportResult, VidPid};

use crate::error::{Cp210xError, Result};
use crate::protocol::*;

fn timeout() -> Duration {
    Duration::from_millis(USB_TIMEOUT_MS)
}

/// An opened CP210x part
///
/// The control interface stays claimed until the value is dropped.
pub struct Cp210x {
    device: nusb::Device,
    interface: Interface,
    vid_pid: VidPid,
}

impl Cp210x {
    /// Open a part found during enumeration and claim its control interface
    pub fn open(info: &DeviceInfo) -> Result<Self> {
        log::debug!(
            "Opening CP210x {:04x}:{:04x} at bus {} address {}",
            info.vendor_id(),
            info.product_id(),
            info.busnum(),
            info.device_address()
        );

        let device = info
            .open()
            .wait()
            .map_err(|e| Cp210xError::OpenFailed(e.to_string()))?;
        let interface = device
            .detach_and_claim_interface(CONTROL_INTERFACE)
            .wait()
            .map_err(|e| Cp210xError::ClaimFailed(e.to_string()))?;

        Ok(Self {
            device,
            interface,
            vid_pid: VidPid::new(info.vendor_id(), info.product_id()),
        })
    }

    /// Vendor OUT request
    fn vendor_out(&self, value: u16, index: u16, data: &[u8]) -> Result<()> {
        log::trace!(
            "vendor OUT wValue={:#06x} wIndex={:#06x} len={}",
            value,
            index,
            data.len()
        );
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: CP210X_VENDOR_REQUEST,
                    value,
                    index,
                    data,
                },
                timeout(),
            )
            .wait()
            .map_err(|e| Cp210xError::TransferFailed {
                operation: "vendor write",
                message: e.to_string(),
            })
    }

    /// Vendor IN request
    fn vendor_in(&self, value: u16, length: usize) -> Result<Vec<u8>> {
        log::trace!("vendor IN wValue={:#06x} len={}", value, length);
        self.interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: CP210X_VENDOR_REQUEST,
                    value,
                    index: 0,
                    length: length as u16,
                },
                timeout(),
            )
            .wait()
            .map_err(|e| Cp210xError::TransferFailed {
                operation: "vendor read",
                message: e.to_string(),
            })
    }

    /// Standard GET_DESCRIPTOR, bypassing any cached copy
    fn get_descriptor(&self, kind: u8, index: u8, language: u16, length: usize) -> Result<Vec<u8>> {
        self.interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Standard,
                    recipient: Recipient::Device,
                    request: USB_REQUEST_GET_DESCRIPTOR,
                    value: u16::from(kind) << 8 | u16::from(index),
                    index: language,
                    length: length as u16,
                },
                timeout(),
            )
            .wait()
            .map_err(|e| Cp210xError::TransferFailed {
                operation: "get descriptor",
                message: e.to_string(),
            })
    }

    fn read_exact(&self, field: Field, value: u16, length: usize) -> Result<Vec<u8>> {
        let data = self.vendor_in(value, length)?;
        if data.len() != length {
            return Err(Cp210xError::InvalidResponse {
                field,
                message: format!("expected {} bytes, got {}", length, data.len()),
            });
        }
        Ok(data)
    }

    fn device_descriptor(&self, field: Field) -> Result<Vec<u8>> {
        let desc = self.get_descriptor(USB_DESCRIPTOR_DEVICE, 0, 0, DEVICE_DESCRIPTOR_LEN)?;
        if desc.len() < DEVICE_DESCRIPTOR_LEN {
            return Err(Cp210xError::InvalidResponse {
                field,
                message: "short device descriptor".into(),
            });
        }
        Ok(desc)
    }

    fn config_descriptor(&self, field: Field, full: bool) -> Result<Vec<u8>> {
        let desc = self.get_descriptor(USB_DESCRIPTOR_CONFIGURATION, 0, 0, CONFIG_DESCRIPTOR_LEN)?;
        if desc.len() < CONFIG_DESCRIPTOR_LEN {
            return Err(Cp210xError::InvalidResponse {
                field,
                message: "short configuration descriptor".into(),
            });
        }
        if !full {
            return Ok(desc);
        }
        let total = u16::from_le_bytes([desc[CONFIG_TOTAL_LENGTH], desc[CONFIG_TOTAL_LENGTH + 1]]);
        self.get_descriptor(USB_DESCRIPTOR_CONFIGURATION, 0, 0, usize::from(total))
    }

    /// Read string descriptor `index`; index 0 means no string
    fn read_string(&self, index: u8, encoding: StringEncoding) -> Result<Vec<u8>> {
        if index == 0 {
            return Ok(Vec::new());
        }
        let desc = self.get_descriptor(USB_DESCRIPTOR_STRING, index, USB_LANGID, MAX_DESCRIPTOR_LEN)?;
        Ok(string_payload(encoding, &desc))
    }

    fn read_field(&self, field: Field) -> Result<Vec<u8>> {
        match field {
            Field::Vid => {
                let d = self.device_descriptor(field)?;
                Ok(d[DEVICE_ID_VENDOR..DEVICE_ID_VENDOR + 2].to_vec())
            }
            Field::Pid => {
                let d = self.device_descriptor(field)?;
                Ok(d[DEVICE_ID_PRODUCT..DEVICE_ID_PRODUCT + 2].to_vec())
            }
            Field::DeviceVersion => {
                let d = self.device_descriptor(field)?;
                Ok(d[DEVICE_BCD_DEVICE..DEVICE_BCD_DEVICE + 2].to_vec())
            }
            Field::PowerMode => {
                let c = self.config_descriptor(field, false)?;
                let attributes = ConfigAttributes::from_bits_retain(c[CONFIG_ATTRIBUTES]);
                Ok(vec![u8::from(attributes.contains(ConfigAttributes::SELF_POWERED))])
            }
            Field::MaxPower => {
                let c = self.config_descriptor(field, false)?;
                Ok(vec![c[CONFIG_MAX_POWER]])
            }
            Field::SerialNumber(enc) => {
                let d = self.device_descriptor(field)?;
                self.read_string(d[DEVICE_I_SERIAL], enc)
            }
            Field::ProductString(enc) => {
                let d = self.device_descriptor(field)?;
                self.read_string(d[DEVICE_I_PRODUCT], enc)
            }
            Field::ManufacturerString(enc) => {
                let d = self.device_descriptor(field)?;
                self.read_string(d[DEVICE_I_MANUFACTURER], enc)
            }
            Field::InterfaceString(ifc, enc) => {
                let c = self.config_descriptor(field, true)?;
                let index = interface_string_index(&c, ifc).unwrap_or(0);
                self.read_string(index, enc)
            }
            Field::FlushBufferConfig => {
                self.read_exact(field, REG_FLUSH_BUFFER_CONFIG, FlushBufferConfig::SIZE)
            }
            Field::DeviceMode => self.read_exact(field, REG_DEVICE_MODE, DeviceMode::SIZE),
            Field::BaudRateConfig => {
                self.read_exact(field, REG_BAUD_CONFIG, BaudRateConfig::SIZE)
            }
            Field::PortConfig => self.read_exact(field, REG_PORT_CONFIG, PortConfig::SIZE),
            Field::DualPortConfig => {
                self.read_exact(field, REG_PORT_CONFIG, DualPortConfig::SIZE)
            }
            Field::QuadPortConfig => {
                self.read_exact(field, REG_PORT_CONFIG, QuadPortConfig::SIZE)
            }
            Field::Config => self.read_exact(field, REG_CP2102N_CONFIG_READ, CONFIG_SIZE),
            Field::LockValue => self.read_exact(field, REG_LOCK_VALUE, 1),
        }
    }

    fn write_field(&self, field: Field, data: &[u8]) -> Result<()> {
        let reg = write_register(field);
        match field {
            Field::Vid | Field::Pid | Field::DeviceVersion | Field::FlushBufferConfig => {
                self.vendor_out(reg, decode_u16(field, data).map_err(invalid(field))?, &[])
            }
            Field::MaxPower | Field::LockValue => {
                let value = decode_u8(field, data).map_err(invalid(field))?;
                self.vendor_out(reg, u16::from(value), &[])
            }
            Field::PowerMode => {
                let self_powered = decode_u8(field, data).map_err(invalid(field))? != 0;
                let attributes = ConfigAttributes::from_power_mode(self_powered);
                self.vendor_out(reg, u16::from(attributes.bits()), &[])
            }
            Field::DeviceMode => match data {
                [eci, sci] => self.vendor_out(reg, u16::from_le_bytes([*eci, *sci]), &[]),
                _ => Err(Cp210xError::InvalidValue {
                    field,
                    message: format!("expected 2 bytes, got {}", data.len()),
                }),
            },
            Field::SerialNumber(enc) | Field::ProductString(enc) | Field::ManufacturerString(enc) => {
                let desc = string_descriptor(enc, data).ok_or_else(too_long(field))?;
                self.vendor_out(reg, 0, &desc)
            }
            Field::InterfaceString(ifc, enc) => {
                let desc = string_descriptor(enc, data).ok_or_else(too_long(field))?;
                self.vendor_out(reg, u16::from(ifc), &desc)
            }
            Field::BaudRateConfig
            | Field::PortConfig
            | Field::DualPortConfig
            | Field::QuadPortConfig
            | Field::Config => self.vendor_out(reg, 0, data),
        }
    }
}

fn invalid(field: Field) -> impl Fn(rsmt_core::TransportError) -> Cp210xError {
    move |e| Cp210xError::InvalidValue {
        field,
        message: e.to_string(),
    }
}

fn too_long(field: Field) -> impl Fn() -> Cp210xError {
    move || Cp210xError::InvalidValue {
        field,
        message: "string does not fit in a USB descriptor".into(),
    }
}

impl Device for Cp210x {
    fn part_number(&self) -> TransportResult<u8> {
        let data = self.vendor_in(REG_PART_NUMBER, 1)?;
        data.first().copied().ok_or_else(|| {
            Cp210xError::TransferFailed {
                operation: "part number read",
                message: "empty response".into(),
            }
            .into()
        })
    }

    fn vid_pid(&self) -> TransportResult<VidPid> {
        let d = self.device_descriptor(Field::Vid)?;
        Ok(VidPid::new(
            u16::from_le_bytes([d[DEVICE_ID_VENDOR], d[DEVICE_ID_VENDOR + 1]]),
            u16::from_le_bytes([d[DEVICE_ID_PRODUCT], d[DEVICE_ID_PRODUCT + 1]]),
        ))
    }

    fn get_field(&self, field: Field) -> TransportResult<Vec<u8>> {
        Ok(self.read_field(field)?)
    }

    fn set_field(&self, field: Field, data: &[u8]) -> TransportResult<()> {
        log::debug!("{}: writing {:?} ({} bytes)", self.vid_pid, field, data.len());
        Ok(self.write_field(field, data)?)
    }

    fn reset(&self) -> TransportResult<()> {
        log::debug!("{}: USB reset", self.vid_pid);
        self.device
            .reset()
            .wait()
            .map_err(|e| Cp210xError::TransferFailed {
                operation: "reset",
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// Enumerates CP210x parts over USB
#[derive(Debug, Default, Clone, Copy)]
pub struct UsbTransport;

impl UsbTransport {
    /// Create a transport over the system's USB buses
    pub fn new() -> Self {
        Self
    }

    fn matching(&self, filter: VidPid) -> Result<Vec<DeviceInfo>> {
        Ok(nusb::list_devices()
            .wait()
            .map_err(|e| Cp210xError::OpenFailed(e.to_string()))?
            .filter(|d| d.vendor_id() == filter.vid && d.product_id() == filter.pid)
            .collect())
    }
}

impl Transport for UsbTransport {
    type Device = Cp210x;

    fn count_devices(&self, filter: VidPid) -> TransportResult<u32> {
        Ok(self.matching(filter)?.len() as u32)
    }

    fn open(&self, filter: VidPid, index: u32) -> TransportResult<Cp210x> {
        let devices = self.matching(filter)?;
        let info = devices
            .get(index as usize)
            .ok_or(Cp210xError::DeviceNotFound(index))?;
        Ok(Cp210x::open(info)?)
    }
}
