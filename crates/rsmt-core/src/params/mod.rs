//! Customization parameter model
//!
//! A configuration is parsed into a [`Customization`]: the header filter
//! (part number and VID/PID of the devices to work on) plus [`Params`], the
//! common parameters and one [`FamilyParams`] variant selected by the part
//! number. Every parameter is optional; only the ones present in the text
//! are programmed and verified.

pub mod cp2102n;
pub mod fields;

use std::path::Path;

use crate::error::{Error, Result};
use crate::grammar::{Reader, Writer};
use crate::serial::SerialNumberSet;
use crate::transport::{decode_u16, decode_u8, Device, Field, StringEncoding};
use crate::types::{Family, PartNumber, VidPid};

pub use cp2102n::{Cp2102nConfig, UsbString};
pub use fields::{
    BaudConfig, BaudRateConfig, Block, DeviceMode, DualPortConfig, FlushBufferConfig, PortConfig,
    QuadPortConfig, QuadPortState, StringValue,
};

use fields::{program_block, read_block, read_once, verify_block, write_block};

/// A parsed configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customization {
    /// Part number of the devices to customize
    pub part: PartNumber,
    /// VID/PID the devices currently enumerate with
    pub filter: VidPid,
    /// Parameters to program and verify
    pub params: Params,
}

impl Customization {
    /// Parse configuration text
    ///
    /// With `echo` set, every consumed token is logged under `rsmt::grammar`.
    pub fn parse(text: &str, echo: bool) -> Result<Self> {
        let mut r = Reader::new(text).with_echo(echo);

        r.read_keyword("FilterPartNumByte")?;
        let part_byte: u8 = r.read_braced(|r| r.read_parm())?;
        let part = PartNumber::from_byte(part_byte).ok_or_else(|| r.error("Unsupported PartNum"))?;

        r.read_keyword("FilterVidPid")?;
        let filter = r.read_braced(|r| Ok(VidPid::new(r.read_parm()?, r.read_parm()?)))?;

        let mut params = Params::new(part.family());
        while let Some(token) = r.next_word() {
            params.read_parm(token.text, &mut r)?;
        }

        log::debug!("parsed {} configuration for {}", part, filter);
        Ok(Self {
            part,
            filter,
            params,
        })
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path, echo: bool) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, echo)
    }

    /// VID/PID the devices enumerate with once programmed
    pub fn target_filter(&self) -> VidPid {
        self.params.common.vid_pid.unwrap_or(self.filter)
    }

    /// Render in canonical form
    pub fn to_text(&self) -> String {
        let mut w = Writer::new();
        w.block("FilterPartNumByte", |w| w.parm(self.part.as_byte()));
        w.block("FilterVidPid", |w| {
            w.parm(self.filter.vid);
            w.parm(self.filter.pid);
        });
        self.params.write(&mut w);
        w.finish()
    }
}

/// Parameters common to every family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonParams {
    /// New VID/PID
    pub vid_pid: Option<VidPid>,
    /// Self powered (1) or bus powered (0)
    pub power_mode: Option<u8>,
    /// bMaxPower
    pub max_power: Option<u8>,
    /// bcdDevice
    pub device_version: Option<u16>,
    /// Product string
    pub product_string: Option<StringValue>,
}

impl CommonParams {
    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool> {
        match keyword {
            "VidPid" => read_once(&mut self.vid_pid, keyword, r, |r| {
                Ok(VidPid::new(r.read_parm()?, r.read_parm()?))
            })?,
            "PowerMode" => read_once(&mut self.power_mode, keyword, r, |r| r.read_parm())?,
            "MaxPower" => read_once(&mut self.max_power, keyword, r, |r| r.read_parm())?,
            "DeviceVersion" => read_once(&mut self.device_version, keyword, r, |r| r.read_parm())?,
            _ => {
                return StringValue::read_slot(&mut self.product_string, keyword, "ProductString", "", r)
            }
        }
        Ok(true)
    }

    fn write(&self, w: &mut Writer) {
        if let Some(vp) = self.vid_pid {
            w.block("VidPid", |w| {
                w.parm(vp.vid);
                w.parm(vp.pid);
            });
        }
        if let Some(v) = self.power_mode {
            w.block("PowerMode", |w| w.parm(v));
        }
        if let Some(v) = self.max_power {
            w.block("MaxPower", |w| w.parm(v));
        }
        if let Some(v) = self.device_version {
            w.block("DeviceVersion", |w| w.parm(v));
        }
        StringValue::write_slot(&self.product_string, "ProductString", "", w);
    }

    fn program<D: Device>(&self, dev: &D, serial: Option<&[u8]>) -> Result<()> {
        if let Some(serial) = serial {
            log::debug!("writing serial number {}", String::from_utf8_lossy(serial));
            dev.set_field(Field::SerialNumber(StringEncoding::Ascii), serial)?;
        }
        if let Some(s) = &self.product_string {
            s.program(dev, Field::ProductString(s.encoding))?;
        }
        if let Some(vp) = self.vid_pid {
            log::debug!("writing VID/PID {}", vp);
            dev.set_field(Field::Vid, &vp.vid.to_le_bytes())?;
            dev.set_field(Field::Pid, &vp.pid.to_le_bytes())?;
        }
        if let Some(v) = self.power_mode {
            dev.set_field(Field::PowerMode, &[v])?;
        }
        if let Some(v) = self.max_power {
            dev.set_field(Field::MaxPower, &[v])?;
        }
        if let Some(v) = self.device_version {
            dev.set_field(Field::DeviceVersion, &v.to_le_bytes())?;
        }
        Ok(())
    }

    /// Verify and return the serial number consumed from `serials`, if any
    fn verify<D: Device>(&self, dev: &D, serials: &mut SerialNumberSet) -> Result<Option<Vec<u8>>> {
        let mut matched = None;
        if !serials.is_empty() {
            let serial = dev.get_field(Field::SerialNumber(StringEncoding::Ascii))?;
            if !serials.find_and_erase(&serial) {
                log::debug!(
                    "serial number {} not in the expected set",
                    String::from_utf8_lossy(&serial)
                );
                return Err(Error::VerifyFailed {
                    field: "serial number",
                });
            }
            matched = Some(serial);
        }
        if let Some(vp) = self.vid_pid {
            if dev.vid_pid()? != vp {
                return Err(Error::VerifyFailed { field: "VidPid" });
            }
        }
        if let Some(v) = self.power_mode {
            if decode_u8(Field::PowerMode, &dev.get_field(Field::PowerMode)?)? != v {
                return Err(Error::VerifyFailed { field: "PowerMode" });
            }
        }
        if let Some(v) = self.max_power {
            if decode_u8(Field::MaxPower, &dev.get_field(Field::MaxPower)?)? != v {
                return Err(Error::VerifyFailed { field: "MaxPower" });
            }
        }
        if let Some(v) = self.device_version {
            if decode_u16(Field::DeviceVersion, &dev.get_field(Field::DeviceVersion)?)? != v {
                return Err(Error::VerifyFailed {
                    field: "DeviceVersion",
                });
            }
        }
        if let Some(s) = &self.product_string {
            s.verify(dev, Field::ProductString(s.encoding), "ProductString")?;
        }
        Ok(matched)
    }
}

/// Family-specific parameter set
trait Extension {
    /// Try to read `keyword`; `Ok(false)` if it is not one of ours
    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool>;

    fn write(&self, w: &mut Writer);

    fn program<D: Device>(&self, dev: &D) -> Result<()>;

    fn verify<D: Device>(&self, dev: &D) -> Result<()>;
}

/// Numbered interface strings of multi-interface parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceStrings(pub Vec<Option<StringValue>>);

impl InterfaceStrings {
    /// No strings specified for `count` interfaces
    pub fn new(count: usize) -> Self {
        Self(vec![None; count])
    }

    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool> {
        for (i, slot) in self.0.iter_mut().enumerate() {
            if StringValue::read_slot(slot, keyword, "InterfaceString", &i.to_string(), r)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn write(&self, w: &mut Writer) {
        for (i, slot) in self.0.iter().enumerate() {
            StringValue::write_slot(slot, "InterfaceString", &i.to_string(), w);
        }
    }

    fn program<D: Device>(&self, dev: &D) -> Result<()> {
        for (i, slot) in self.0.iter().enumerate() {
            if let Some(s) = slot {
                s.program(dev, Field::InterfaceString(i as u8, s.encoding))?;
            }
        }
        Ok(())
    }

    fn verify<D: Device>(&self, dev: &D) -> Result<()> {
        for (i, slot) in self.0.iter().enumerate() {
            if let Some(s) = slot {
                s.verify(dev, Field::InterfaceString(i as u8, s.encoding), "InterfaceString")?;
            }
        }
        Ok(())
    }
}

/// CP2102 and CP2109: baud rate table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaudRateParams {
    /// Baud rate aliasing table
    pub baud_rate_config: Option<BaudRateConfig>,
}

impl Extension for BaudRateParams {
    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool> {
        read_block(&mut self.baud_rate_config, keyword, r)
    }

    fn write(&self, w: &mut Writer) {
        write_block(&self.baud_rate_config, w);
    }

    fn program<D: Device>(&self, dev: &D) -> Result<()> {
        program_block(&self.baud_rate_config, dev)
    }

    fn verify<D: Device>(&self, dev: &D) -> Result<()> {
        verify_block(&self.baud_rate_config, dev)
    }
}

/// CP2103: baud rate table and GPIO configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cp2103Params {
    /// Baud rate aliasing table
    pub baud_rate_config: Option<BaudRateConfig>,
    /// GPIO configuration
    pub port_config: Option<PortConfig>,
}

impl Extension for Cp2103Params {
    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool> {
        Ok(read_block(&mut self.port_config, keyword, r)?
            || read_block(&mut self.baud_rate_config, keyword, r)?)
    }

    fn write(&self, w: &mut Writer) {
        write_block(&self.baud_rate_config, w);
        write_block(&self.port_config, w);
    }

    fn program<D: Device>(&self, dev: &D) -> Result<()> {
        program_block(&self.baud_rate_config, dev)?;
        program_block(&self.port_config, dev)
    }

    fn verify<D: Device>(&self, dev: &D) -> Result<()> {
        verify_block(&self.baud_rate_config, dev)?;
        verify_block(&self.port_config, dev)
    }
}

/// CP2104: GPIO configuration and flush behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cp2104Params {
    /// GPIO configuration
    pub port_config: Option<PortConfig>,
    /// Buffer flush behaviour
    pub flush_buffer_config: Option<FlushBufferConfig>,
}

impl Extension for Cp2104Params {
    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool> {
        Ok(read_block(&mut self.port_config, keyword, r)?
            || read_block(&mut self.flush_buffer_config, keyword, r)?)
    }

    fn write(&self, w: &mut Writer) {
        write_block(&self.port_config, w);
        write_block(&self.flush_buffer_config, w);
    }

    fn program<D: Device>(&self, dev: &D) -> Result<()> {
        program_block(&self.port_config, dev)?;
        program_block(&self.flush_buffer_config, dev)
    }

    fn verify<D: Device>(&self, dev: &D) -> Result<()> {
        verify_block(&self.port_config, dev)?;
        verify_block(&self.flush_buffer_config, dev)
    }
}

/// CP2105: dual interface parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cp2105Params {
    /// Buffer flush behaviour
    pub flush_buffer_config: Option<FlushBufferConfig>,
    /// ECI/SCI modes
    pub device_mode: Option<DeviceMode>,
    /// GPIO configuration
    pub dual_port_config: Option<DualPortConfig>,
    /// Interface strings 0 and 1
    pub interface_strings: InterfaceStrings,
}

impl Default for Cp2105Params {
    fn default() -> Self {
        Self {
            flush_buffer_config: None,
            device_mode: None,
            dual_port_config: None,
            interface_strings: InterfaceStrings::new(2),
        }
    }
}

impl Extension for Cp2105Params {
    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool> {
        Ok(read_block(&mut self.flush_buffer_config, keyword, r)?
            || read_block(&mut self.device_mode, keyword, r)?
            || read_block(&mut self.dual_port_config, keyword, r)?
            || self.interface_strings.read_parm(keyword, r)?)
    }

    fn write(&self, w: &mut Writer) {
        write_block(&self.flush_buffer_config, w);
        write_block(&self.device_mode, w);
        write_block(&self.dual_port_config, w);
        self.interface_strings.write(w);
    }

    fn program<D: Device>(&self, dev: &D) -> Result<()> {
        program_block(&self.flush_buffer_config, dev)?;
        program_block(&self.device_mode, dev)?;
        program_block(&self.dual_port_config, dev)?;
        self.interface_strings.program(dev)
    }

    fn verify<D: Device>(&self, dev: &D) -> Result<()> {
        verify_block(&self.flush_buffer_config, dev)?;
        verify_block(&self.device_mode, dev)?;
        verify_block(&self.dual_port_config, dev)?;
        self.interface_strings.verify(dev)
    }
}

/// CP2108: quad interface parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cp2108Params {
    /// Buffer flush behaviour
    pub flush_buffer_config: Option<FlushBufferConfig>,
    /// Manufacturer string
    pub manufacturer_string: Option<StringValue>,
    /// GPIO configuration
    pub quad_port_config: Option<QuadPortConfig>,
    /// Interface strings 0 to 3
    pub interface_strings: InterfaceStrings,
}

impl Default for Cp2108Params {
    fn default() -> Self {
        Self {
            flush_buffer_config: None,
            manufacturer_string: None,
            quad_port_config: None,
            interface_strings: InterfaceStrings::new(4),
        }
    }
}

impl Extension for Cp2108Params {
    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool> {
        Ok(read_block(&mut self.flush_buffer_config, keyword, r)?
            || StringValue::read_slot(
                &mut self.manufacturer_string,
                keyword,
                "ManufacturerString",
                "",
                r,
            )?
            || read_block(&mut self.quad_port_config, keyword, r)?
            || self.interface_strings.read_parm(keyword, r)?)
    }

    fn write(&self, w: &mut Writer) {
        write_block(&self.flush_buffer_config, w);
        StringValue::write_slot(&self.manufacturer_string, "ManufacturerString", "", w);
        write_block(&self.quad_port_config, w);
        self.interface_strings.write(w);
    }

    fn program<D: Device>(&self, dev: &D) -> Result<()> {
        program_block(&self.flush_buffer_config, dev)?;
        if let Some(s) = &self.manufacturer_string {
            s.program(dev, Field::ManufacturerString(s.encoding))?;
        }
        program_block(&self.quad_port_config, dev)?;
        self.interface_strings.program(dev)
    }

    fn verify<D: Device>(&self, dev: &D) -> Result<()> {
        verify_block(&self.flush_buffer_config, dev)?;
        if let Some(s) = &self.manufacturer_string {
            s.verify(dev, Field::ManufacturerString(s.encoding), "ManufacturerString")?;
        }
        verify_block(&self.quad_port_config, dev)?;
        self.interface_strings.verify(dev)
    }
}

/// CP2102N: the raw configuration image
///
/// Serial numbers are not written separately; they are embedded into a
/// per-device copy of the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cp2102nParams {
    /// Full configuration image
    pub config: Option<Cp2102nConfig>,
}

impl Cp2102nParams {
    fn image_for(&self, serial: Option<&[u8]>) -> Result<Option<Cp2102nConfig>> {
        let Some(config) = &self.config else {
            if serial.is_some() {
                return Err(Error::Usage(
                    "CP2102N serial numbers can only be programmed through a Config block".into(),
                ));
            }
            return Ok(None);
        };
        let mut image = config.clone();
        if let Some(serial) = serial {
            image.set_usb_string(UsbString::SerialNumber, &String::from_utf8_lossy(serial))?;
        }
        Ok(Some(image))
    }

    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool> {
        if keyword != "Config" {
            return Ok(false);
        }
        read_once(&mut self.config, keyword, r, Cp2102nConfig::read)?;
        Ok(true)
    }

    fn write(&self, w: &mut Writer) {
        if let Some(config) = &self.config {
            w.block("Config", |w| config.write(w));
        }
    }

    fn program<D: Device>(&self, dev: &D, serial: Option<&[u8]>) -> Result<()> {
        if let Some(image) = self.image_for(serial)? {
            log::debug!("writing CP2102N config, checksum {:04x}", image.stored_checksum());
            dev.set_field(Field::Config, image.as_bytes())?;
        }
        Ok(())
    }

    fn verify<D: Device>(&self, dev: &D, serial: Option<&[u8]>) -> Result<()> {
        if let Some(expected) = self.image_for(serial)? {
            let actual = dev.get_field(Field::Config)?;
            if !expected.matches(&actual) {
                return Err(Error::VerifyFailed { field: "Config" });
            }
        }
        Ok(())
    }
}

/// Family-specific parameters, one variant per parameter set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyParams {
    /// CP2101 has no extensions
    Cp2101,
    /// CP2102
    Cp2102(BaudRateParams),
    /// CP2102N
    Cp2102n(Cp2102nParams),
    /// CP2103
    Cp2103(Cp2103Params),
    /// CP2104
    Cp2104(Cp2104Params),
    /// CP2105
    Cp2105(Cp2105Params),
    /// CP2108
    Cp2108(Cp2108Params),
    /// CP2109
    Cp2109(BaudRateParams),
}

impl FamilyParams {
    /// Empty parameter set for `family`
    pub fn new(family: Family) -> Self {
        match family {
            Family::Cp2101 => Self::Cp2101,
            Family::Cp2102 => Self::Cp2102(BaudRateParams::default()),
            Family::Cp2102n => Self::Cp2102n(Cp2102nParams::default()),
            Family::Cp2103 => Self::Cp2103(Cp2103Params::default()),
            Family::Cp2104 => Self::Cp2104(Cp2104Params::default()),
            Family::Cp2105 => Self::Cp2105(Cp2105Params::default()),
            Family::Cp2108 => Self::Cp2108(Cp2108Params::default()),
            Family::Cp2109 => Self::Cp2109(BaudRateParams::default()),
        }
    }

    /// Family this parameter set belongs to
    pub fn family(&self) -> Family {
        match self {
            Self::Cp2101 => Family::Cp2101,
            Self::Cp2102(_) => Family::Cp2102,
            Self::Cp2102n(_) => Family::Cp2102n,
            Self::Cp2103(_) => Family::Cp2103,
            Self::Cp2104(_) => Family::Cp2104,
            Self::Cp2105(_) => Family::Cp2105,
            Self::Cp2108(_) => Family::Cp2108,
            Self::Cp2109(_) => Family::Cp2109,
        }
    }

    fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<bool> {
        match self {
            Self::Cp2101 => Ok(false),
            Self::Cp2102(p) | Self::Cp2109(p) => p.read_parm(keyword, r),
            Self::Cp2102n(p) => p.read_parm(keyword, r),
            Self::Cp2103(p) => p.read_parm(keyword, r),
            Self::Cp2104(p) => p.read_parm(keyword, r),
            Self::Cp2105(p) => p.read_parm(keyword, r),
            Self::Cp2108(p) => p.read_parm(keyword, r),
        }
    }

    fn write(&self, w: &mut Writer) {
        match self {
            Self::Cp2101 => {}
            Self::Cp2102(p) | Self::Cp2109(p) => p.write(w),
            Self::Cp2102n(p) => p.write(w),
            Self::Cp2103(p) => p.write(w),
            Self::Cp2104(p) => p.write(w),
            Self::Cp2105(p) => p.write(w),
            Self::Cp2108(p) => p.write(w),
        }
    }
}

/// Everything a configuration asks to program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Parameters every family has
    pub common: CommonParams,
    /// Family-specific parameters
    pub family: FamilyParams,
}

impl Params {
    /// Nothing specified
    pub fn new(family: Family) -> Self {
        Self {
            common: CommonParams::default(),
            family: FamilyParams::new(family),
        }
    }

    /// Dispatch one `Keyword { ... }` block
    pub fn read_parm(&mut self, keyword: &str, r: &mut Reader<'_>) -> Result<()> {
        if self.family.read_parm(keyword, r)? || self.common.read_parm(keyword, r)? {
            return Ok(());
        }
        Err(r.error(format!("unknown customization parameter {}", keyword)))
    }

    /// Render every specified parameter
    pub fn write(&self, w: &mut Writer) {
        self.common.write(w);
        self.family.write(w);
    }

    /// Reject serial numbers this parameter set cannot program
    ///
    /// Runs before any device is touched.
    pub fn check_serials(&self, serials: &SerialNumberSet) -> Result<()> {
        if let FamilyParams::Cp2102n(p) = &self.family {
            for serial in serials.iter() {
                p.image_for(Some(serial))?;
            }
        }
        Ok(())
    }

    /// Write every specified parameter, and `serial` if given
    pub fn program<D: Device>(&self, dev: &D, serial: Option<&[u8]>) -> Result<()> {
        match &self.family {
            FamilyParams::Cp2102n(p) => {
                self.common.program(dev, None)?;
                p.program(dev, serial)
            }
            FamilyParams::Cp2101 => self.common.program(dev, serial),
            FamilyParams::Cp2102(p) | FamilyParams::Cp2109(p) => {
                self.common.program(dev, serial)?;
                p.program(dev)
            }
            FamilyParams::Cp2103(p) => {
                self.common.program(dev, serial)?;
                p.program(dev)
            }
            FamilyParams::Cp2104(p) => {
                self.common.program(dev, serial)?;
                p.program(dev)
            }
            FamilyParams::Cp2105(p) => {
                self.common.program(dev, serial)?;
                p.program(dev)
            }
            FamilyParams::Cp2108(p) => {
                self.common.program(dev, serial)?;
                p.program(dev)
            }
        }
    }

    /// Read back every specified parameter
    ///
    /// When `serials` is non-empty the device's serial number must be one of
    /// its entries, which is then removed.
    pub fn verify<D: Device>(&self, dev: &D, serials: &mut SerialNumberSet) -> Result<()> {
        let matched = self.common.verify(dev, serials)?;
        match &self.family {
            FamilyParams::Cp2101 => Ok(()),
            FamilyParams::Cp2102(p) | FamilyParams::Cp2109(p) => p.verify(dev),
            FamilyParams::Cp2102n(p) => p.verify(dev, matched.as_deref()),
            FamilyParams::Cp2103(p) => p.verify(dev),
            FamilyParams::Cp2104(p) => p.verify(dev),
            FamilyParams::Cp2105(p) => p.verify(dev),
            FamilyParams::Cp2108(p) => p.verify(dev),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    const HEADER_2102: &str = "FilterPartNumByte { { 02 } }\nFilterVidPid { { 10c4 } { ea60 } }\n";

    #[test]
    fn test_parse_header_only() {
        let c = Customization::parse(HEADER_2102, false).unwrap();
        assert_eq!(c.part, PartNumber::Cp2102);
        assert_eq!(c.filter, VidPid::new(0x10c4, 0xea60));
        assert_eq!(c.params, Params::new(Family::Cp2102));
        assert_eq!(c.target_filter(), c.filter);
    }

    #[test]
    fn test_parse_common_params() {
        let text = format!(
            "{}VidPid {{ {{ 10c4 }} {{ ea61 }} }}\nPowerMode {{ {{ 01 }} }}\n\
             MaxPower {{ {{ 32 }} }}\nDeviceVersion {{ {{ 0100 }} }}\n\
             ProductStringAscii {{ {{ 57 49 44 47 45 54 31 }} }}\n",
            HEADER_2102
        );
        let c = Customization::parse(&text, false).unwrap();
        let common = &c.params.common;
        assert_eq!(common.vid_pid, Some(VidPid::new(0x10c4, 0xea61)));
        assert_eq!(common.power_mode, Some(1));
        assert_eq!(common.max_power, Some(0x32));
        assert_eq!(common.device_version, Some(0x0100));
        assert_eq!(common.product_string, Some(StringValue::ascii("WIDGET1")));
        assert_eq!(c.target_filter(), VidPid::new(0x10c4, 0xea61));
    }

    #[test]
    fn test_to_text_round_trip() {
        let text = format!(
            "{}VidPid {{ {{ 10c4 }} {{ ea61 }} }}\nProductStringUnicode {{ {{ 41 00 }} }}\n",
            HEADER_2102
        );
        let c = Customization::parse(&text, false).unwrap();
        let rendered = c.to_text();
        assert_eq!(rendered, text);
        assert_eq!(Customization::parse(&rendered, false).unwrap(), c);
    }

    #[test]
    fn test_unknown_keyword() {
        let text = format!("{}QuadPortConfig {{ }}", HEADER_2102);
        let err = Customization::parse(&text, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(
            err.to_string(),
            "unknown customization parameter QuadPortConfig at line 3, column 1"
        );
    }

    #[test]
    fn test_duplicate_keyword() {
        let text = format!("{}MaxPower {{ {{ 32 }} }} MaxPower {{ {{ 32 }} }}", HEADER_2102);
        let err = Customization::parse(&text, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().starts_with("multiple occurrence of MaxPower"));
    }

    #[test]
    fn test_unsupported_part_number() {
        let err = Customization::parse("FilterPartNumByte { { 06 } }", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().starts_with("Unsupported PartNum"));
    }

    #[test]
    fn test_missing_header() {
        let err = Customization::parse("VidPid { { 10c4 } { ea60 } }", false).unwrap_err();
        assert!(err.to_string().starts_with("expected FilterPartNumByte"));
    }

    #[test]
    fn test_interface_strings_by_family() {
        let text = "FilterPartNumByte { { 05 } }\nFilterVidPid { { 10c4 } { ea70 } }\n\
                    InterfaceStringAscii1 { { 41 } }\nDeviceMode { { 01 } { 00 } }\n";
        let c = Customization::parse(text, false).unwrap();
        let FamilyParams::Cp2105(p) = &c.params.family else {
            panic!("wrong family");
        };
        assert_eq!(p.interface_strings.0[1], Some(StringValue::ascii("A")));
        assert!(p.interface_strings.0[0].is_none());
        assert_eq!(p.device_mode, Some(DeviceMode { eci: 1, sci: 0 }));

        // CP2105 has two interfaces only
        let text = "FilterPartNumByte { { 05 } }\nFilterVidPid { { 10c4 } { ea70 } }\n\
                    InterfaceStringAscii2 { { 41 } }\n";
        assert!(Customization::parse(text, false).is_err());
    }

    #[test]
    fn test_manufacturer_string_cp2108_only() {
        let body = "ManufacturerStringAscii { { 41 43 4d 45 } }\n";
        let ok = format!("FilterPartNumByte {{ {{ 08 }} }}\nFilterVidPid {{ {{ 10c4 }} {{ ea71 }} }}\n{}", body);
        assert!(Customization::parse(&ok, false).is_ok());
        let bad = format!("{}{}", HEADER_2102, body);
        assert!(Customization::parse(&bad, false).is_err());
    }

    #[test]
    fn test_cp2102n_config_block() {
        let blank = Cp2102nConfig::blank();
        let mut w = Writer::new();
        w.block("Config", |w| blank.write(w));
        let text = format!(
            "FilterPartNumByte {{ {{ 20 }} }}\nFilterVidPid {{ {{ 10c4 }} {{ ea60 }} }}\n{}",
            w.finish()
        );
        let c = Customization::parse(&text, false).unwrap();
        assert_eq!(c.part.family(), Family::Cp2102n);
        assert_eq!(
            c.params.family,
            FamilyParams::Cp2102n(Cp2102nParams {
                config: Some(blank)
            })
        );
        assert_eq!(c.to_text(), text);
    }

    #[test]
    fn test_cp2102n_serials_need_config() {
        let params = Params::new(Family::Cp2102n);
        let serials = SerialNumberSet::from_list(vec![b"1".to_vec()]).unwrap();
        let err = params.check_serials(&serials).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(params.check_serials(&SerialNumberSet::new()).is_ok());
    }

    #[test]
    fn test_cp2102n_serial_too_long() {
        let mut params = Params::new(Family::Cp2102n);
        params.family = FamilyParams::Cp2102n(Cp2102nParams {
            config: Some(Cp2102nConfig::blank()),
        });
        let serials = SerialNumberSet::from_list(vec![vec![b'7'; 64]]).unwrap();
        let err = params.check_serials(&serials).unwrap_err();
        assert_eq!(err.to_string(), "USB String Descriptor is too large.");
    }
}
