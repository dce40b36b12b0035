//! Filtered set of opened devices
//!
//! A [`DeviceSet`] owns every handle it opened. Handles are closed when the
//! set is dropped, and a failed [`DeviceSet::build`] closes whatever it had
//! already opened before returning the error.

use std::fmt;

use crate::error::{Error, Result};
use crate::params::cp2102n;
use crate::transport::{Device, Field, StringEncoding, Transport};
use crate::types::{Family, PartNumber, VidPid};

/// Lock byte written to non-CP2102N parts
pub const LOCK_VALUE: u8 = 0xF0;

/// An opened device whose identity has been checked
pub struct DeviceHandle<D> {
    device: D,
    part: PartNumber,
    vid_pid: VidPid,
}

impl<D: Device> DeviceHandle<D> {
    /// Part number read when the device was opened
    pub fn part(&self) -> PartNumber {
        self.part
    }

    /// VID/PID read when the device was opened
    pub fn vid_pid(&self) -> VidPid {
        self.vid_pid
    }

    /// Underlying transport device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Whether the device's customizable area is locked
    pub fn is_locked(&self) -> Result<bool> {
        match self.part.family() {
            Family::Cp2102n => cp2102n::is_locked(&self.device),
            _ => Ok(self.device.is_locked()?),
        }
    }

    /// Permanently lock the device, then confirm the lock took effect
    pub fn lock(&self) -> Result<()> {
        log::debug!("locking {} at {}", self.part, self.vid_pid);
        match self.part.family() {
            Family::Cp2102n => cp2102n::lock(&self.device),
            _ => {
                self.device.set_field(Field::LockValue, &[LOCK_VALUE])?;
                let committed = self.device.get_field(Field::LockValue)?;
                if committed != [LOCK_VALUE] {
                    log::warn!(
                        "{}: wrote lock value {:#04x}, read back {:02x?}",
                        self.vid_pid,
                        LOCK_VALUE,
                        committed
                    );
                    return Err(Error::Customization(
                        "lock value verification failed after locking".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Soft reset; the device re-enumerates afterwards
    pub fn reset(&self) -> Result<()> {
        log::debug!("resetting {} at {}", self.part, self.vid_pid);
        self.device.reset()?;
        Ok(())
    }

    /// Identity summary for listings
    pub fn info(&self) -> Result<DeviceInfo> {
        let product = self
            .device
            .get_field(Field::ProductString(StringEncoding::Ascii))?;
        let serial = self
            .device
            .get_field(Field::SerialNumber(StringEncoding::Ascii))?;
        Ok(DeviceInfo {
            vid_pid: self.device.vid_pid()?,
            product: String::from_utf8_lossy(&product).into_owned(),
            serial: String::from_utf8_lossy(&serial).into_owned(),
        })
    }
}

/// One line of a device listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Current VID/PID
    pub vid_pid: VidPid,
    /// Product string
    pub product: String,
    /// Serial number
    pub serial: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VID: {:04x} PID: {:04x} Prod Str: {} Ser #: {}",
            self.vid_pid.vid, self.vid_pid.pid, self.product, self.serial
        )
    }
}

/// Devices of one part number currently enumerated under one VID/PID
pub struct DeviceSet<D> {
    devices: Vec<DeviceHandle<D>>,
}

impl<D: Device> DeviceSet<D> {
    /// Open every device under `filter` that reports `part` and `filter`
    ///
    /// Devices that do not match are closed and skipped. Unless
    /// `allow_locked` is set, a matching locked device fails the build.
    pub fn build<T>(transport: &T, part: PartNumber, filter: VidPid, allow_locked: bool) -> Result<Self>
    where
        T: Transport<Device = D>,
    {
        let count = transport.count_devices(filter)?;
        log::debug!("{} device(s) enumerated under {}", count, filter);

        let mut devices = Vec::new();
        for index in 0..count {
            let device = transport.open(filter, index)?;
            let part_byte = device.part_number()?;
            let vid_pid = device.vid_pid()?;

            let matching = PartNumber::from_byte(part_byte) == Some(part) && vid_pid == filter;
            if !matching {
                log::debug!(
                    "skipping device {}: part {:#04x} at {}",
                    index,
                    part_byte,
                    vid_pid
                );
                continue;
            }

            let handle = DeviceHandle {
                device,
                part,
                vid_pid,
            };
            if !allow_locked && handle.is_locked()? {
                return Err(Error::Customization("Locked device found".into()));
            }
            devices.push(handle);
        }

        Ok(Self { devices })
    }

    /// Number of devices in the set
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device at `index`
    pub fn get(&self, index: usize) -> Option<&DeviceHandle<D>> {
        self.devices.get(index)
    }

    /// Iterate in enumeration order
    pub fn iter(&self) -> impl Iterator<Item = &DeviceHandle<D>> {
        self.devices.iter()
    }

    /// Listing lines for every device
    pub fn describe(&self) -> Result<Vec<DeviceInfo>> {
        self.devices.iter().map(DeviceHandle::info).collect()
    }
}
