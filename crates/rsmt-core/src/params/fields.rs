//! Typed parameter values shared by the family parameter sets
//!
//! Structured values implement [`Block`], which ties together their text
//! form (the contents of a `Keyword { ... }` block), their wire payload and
//! the name reported when verification fails.

use std::fmt;

use crate::error::{Error, Result, TransportError};
use crate::grammar::{Reader, Writer};
use crate::transport::{Device, Field, StringEncoding, TransportResult};

/// Maximum length of a string parameter in bytes
pub const MAX_STRING_LEN: usize = 255;

/// Number of entries in a baud rate table
pub const NUM_BAUD_CONFIGS: usize = 32;

/// A structured parameter value
pub trait Block: Sized + Clone + PartialEq + fmt::Debug {
    /// Keyword introducing the block; also names verification failures
    const KEYWORD: &'static str;
    /// Field carrying the value
    const FIELD: Field;
    /// Wire payload size in bytes
    const SIZE: usize;

    /// Parse the block contents (between the outer braces)
    fn read(r: &mut Reader<'_>) -> Result<Self>;

    /// Render the block contents
    fn write(&self, w: &mut Writer);

    /// Wire payload
    fn encode(&self) -> Vec<u8>;

    /// Decode a payload of exactly [`Self::SIZE`] bytes
    fn decode(data: &[u8]) -> Self;
}

fn decode_block<T: Block>(data: &[u8]) -> TransportResult<T> {
    if data.len() != T::SIZE {
        return Err(TransportError::InvalidResponse {
            field: T::FIELD,
            message: format!("expected {} bytes, got {}", T::SIZE, data.len()),
        });
    }
    Ok(T::decode(data))
}

/// Fill a parameter slot from its block, rejecting a second occurrence
pub(crate) fn read_once<T>(
    slot: &mut Option<T>,
    keyword: &str,
    r: &mut Reader<'_>,
    read: impl FnOnce(&mut Reader<'_>) -> Result<T>,
) -> Result<()> {
    if slot.is_some() {
        return Err(r.error(format!("multiple occurrence of {}", keyword)));
    }
    *slot = Some(r.read_braced(read)?);
    Ok(())
}

/// Read a [`Block`] parameter if `keyword` names it
pub(crate) fn read_block<T: Block>(
    slot: &mut Option<T>,
    keyword: &str,
    r: &mut Reader<'_>,
) -> Result<bool> {
    if keyword != T::KEYWORD {
        return Ok(false);
    }
    read_once(slot, keyword, r, T::read)?;
    Ok(true)
}

pub(crate) fn write_block<T: Block>(slot: &Option<T>, w: &mut Writer) {
    if let Some(value) = slot {
        w.block(T::KEYWORD, |w| value.write(w));
    }
}

pub(crate) fn program_block<T: Block, D: Device>(slot: &Option<T>, dev: &D) -> Result<()> {
    if let Some(value) = slot {
        log::debug!("writing {}", T::KEYWORD);
        dev.set_field(T::FIELD, &value.encode())?;
    }
    Ok(())
}

pub(crate) fn verify_block<T: Block, D: Device>(slot: &Option<T>, dev: &D) -> Result<()> {
    if let Some(expected) = slot {
        let actual: T = decode_block(&dev.get_field(T::FIELD)?)?;
        if actual != *expected {
            log::debug!("{}: expected {:?}, device has {:?}", T::KEYWORD, expected, actual);
            return Err(Error::VerifyFailed {
                field: T::KEYWORD,
            });
        }
    }
    Ok(())
}

fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// A string parameter in either encoding
///
/// `bytes` holds the text exactly as it appears in the configuration: one
/// byte per character for ASCII, UTF-16LE code units for Unicode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringValue {
    /// Encoding selected by the keyword
    pub encoding: StringEncoding,
    /// Raw string bytes
    pub bytes: Vec<u8>,
}

impl StringValue {
    /// ASCII string value
    pub fn ascii(text: &str) -> Self {
        Self {
            encoding: StringEncoding::Ascii,
            bytes: text.as_bytes().to_vec(),
        }
    }

    /// Unicode string value
    pub fn unicode(text: &str) -> Self {
        Self {
            encoding: StringEncoding::Unicode,
            bytes: text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }

    /// Match `keyword` against `<prefix>Ascii<suffix>` and `<prefix>Unicode<suffix>`
    pub(crate) fn match_keyword(keyword: &str, prefix: &str, suffix: &str) -> Option<StringEncoding> {
        let rest = keyword.strip_prefix(prefix)?;
        let rest_ascii = rest.strip_prefix("Ascii");
        let rest_unicode = rest.strip_prefix("Unicode");
        match (rest_ascii, rest_unicode) {
            (Some(s), _) if s == suffix => Some(StringEncoding::Ascii),
            (_, Some(s)) if s == suffix => Some(StringEncoding::Unicode),
            _ => None,
        }
    }

    /// Read a string block if `keyword` names one for `prefix`/`suffix`
    pub(crate) fn read_slot(
        slot: &mut Option<Self>,
        keyword: &str,
        prefix: &str,
        suffix: &str,
        r: &mut Reader<'_>,
    ) -> Result<bool> {
        let Some(encoding) = Self::match_keyword(keyword, prefix, suffix) else {
            return Ok(false);
        };
        read_once(slot, keyword, r, |r| {
            let bytes = r.read_byte_array(MAX_STRING_LEN)?;
            Ok(Self { encoding, bytes })
        })?;
        Ok(true)
    }

    pub(crate) fn write_slot(slot: &Option<Self>, prefix: &str, suffix: &str, w: &mut Writer) {
        if let Some(value) = slot {
            let encoding = match value.encoding {
                StringEncoding::Ascii => "Ascii",
                StringEncoding::Unicode => "Unicode",
            };
            w.block(&format!("{}{}{}", prefix, encoding, suffix), |w| {
                w.byte_array(&value.bytes)
            });
        }
    }

    pub(crate) fn program<D: Device>(&self, dev: &D, field: Field) -> Result<()> {
        log::debug!("writing {:?}", field);
        dev.set_field(field, &self.bytes)?;
        Ok(())
    }

    pub(crate) fn verify<D: Device>(&self, dev: &D, field: Field, name: &'static str) -> Result<()> {
        if dev.get_field(field)? != self.bytes {
            return Err(Error::VerifyFailed { field: name });
        }
        Ok(())
    }
}

/// Flush buffer configuration word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushBufferConfig(pub u16);

impl Block for FlushBufferConfig {
    const KEYWORD: &'static str = "FlushBufferConfig";
    const FIELD: Field = Field::FlushBufferConfig;
    const SIZE: usize = 2;

    fn read(r: &mut Reader<'_>) -> Result<Self> {
        r.read_parm().map(Self)
    }

    fn write(&self, w: &mut Writer) {
        w.parm(self.0);
    }

    fn encode(&self) -> Vec<u8> {
        self.0.to_le_bytes().to_vec()
    }

    fn decode(data: &[u8]) -> Self {
        Self(u16::from_le_bytes([data[0], data[1]]))
    }
}

/// ECI/SCI interface modes of a dual-interface part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMode {
    /// Enhanced communications interface mode
    pub eci: u8,
    /// Standard communications interface mode
    pub sci: u8,
}

impl Block for DeviceMode {
    const KEYWORD: &'static str = "DeviceMode";
    const FIELD: Field = Field::DeviceMode;
    const SIZE: usize = 2;

    fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            eci: r.read_parm()?,
            sci: r.read_parm()?,
        })
    }

    fn write(&self, w: &mut Writer) {
        w.parm(self.eci);
        w.parm(self.sci);
    }

    fn encode(&self) -> Vec<u8> {
        vec![self.eci, self.sci]
    }

    fn decode(data: &[u8]) -> Self {
        Self {
            eci: data[0],
            sci: data[1],
        }
    }
}

/// One entry of the baud rate aliasing table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaudConfig {
    /// Baud rate generator reload value
    pub baud_gen: u16,
    /// Timer 0 reload value
    pub timer0_reload: u16,
    /// Timer prescaler
    pub prescaler: u8,
    /// Requested rate this entry applies to
    pub baud_rate: u32,
}

impl BaudConfig {
    const SIZE: usize = 10;
}

/// 32-entry baud rate table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaudRateConfig(pub [BaudConfig; NUM_BAUD_CONFIGS]);

impl Block for BaudRateConfig {
    const KEYWORD: &'static str = "BaudRateConfig";
    const FIELD: Field = Field::BaudRateConfig;
    const SIZE: usize = BaudConfig::SIZE * NUM_BAUD_CONFIGS;

    fn read(r: &mut Reader<'_>) -> Result<Self> {
        r.read_braced(|r| {
            let mut table = [BaudConfig::default(); NUM_BAUD_CONFIGS];
            for entry in &mut table {
                entry.baud_gen = r.read_hex()?;
                entry.timer0_reload = r.read_hex()?;
                entry.prescaler = r.read_hex()?;
                entry.baud_rate = r.read_hex()?;
            }
            Ok(Self(table))
        })
    }

    fn write(&self, w: &mut Writer) {
        w.braced(|w| {
            for entry in &self.0 {
                w.hex(entry.baud_gen);
                w.hex(entry.timer0_reload);
                w.hex(entry.prescaler);
                w.hex(entry.baud_rate);
            }
        });
    }

    // Per entry: BaudGen (BE), Timer0Reload (BE), Prescaler, pad, BaudRate (LE)
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        for entry in &self.0 {
            out.extend_from_slice(&entry.baud_gen.to_be_bytes());
            out.extend_from_slice(&entry.timer0_reload.to_be_bytes());
            out.push(entry.prescaler);
            out.push(0);
            out.extend_from_slice(&entry.baud_rate.to_le_bytes());
        }
        out
    }

    fn decode(data: &[u8]) -> Self {
        let mut table = [BaudConfig::default(); NUM_BAUD_CONFIGS];
        for (entry, raw) in table.iter_mut().zip(data.chunks_exact(BaudConfig::SIZE)) {
            *entry = BaudConfig {
                baud_gen: be16(raw, 0),
                timer0_reload: be16(raw, 2),
                prescaler: raw[4],
                baud_rate: u32::from_le_bytes([raw[6], raw[7], raw[8], raw[9]]),
            };
        }
        Self(table)
    }
}

/// GPIO configuration of a single-interface part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Push-pull/open-drain mode bits
    pub mode: u16,
    /// Latch value after reset
    pub reset_latch: u16,
    /// Latch value during suspend
    pub suspend_latch: u16,
    /// Enhanced function bits
    pub enhanced_fxn: u8,
}

impl Block for PortConfig {
    const KEYWORD: &'static str = "PortConfig";
    const FIELD: Field = Field::PortConfig;
    const SIZE: usize = 7;

    fn read(r: &mut Reader<'_>) -> Result<Self> {
        r.read_braced(|r| {
            Ok(Self {
                mode: r.read_hex()?,
                reset_latch: r.read_hex()?,
                suspend_latch: r.read_hex()?,
                enhanced_fxn: r.read_hex()?,
            })
        })
    }

    fn write(&self, w: &mut Writer) {
        w.braced(|w| {
            w.hex(self.mode);
            w.hex(self.reset_latch);
            w.hex(self.suspend_latch);
            w.hex(self.enhanced_fxn);
        });
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.mode.to_be_bytes());
        out.extend_from_slice(&self.reset_latch.to_be_bytes());
        out.extend_from_slice(&self.suspend_latch.to_be_bytes());
        out.push(self.enhanced_fxn);
        out
    }

    fn decode(data: &[u8]) -> Self {
        Self {
            mode: be16(data, 0),
            reset_latch: be16(data, 2),
            suspend_latch: be16(data, 4),
            enhanced_fxn: data[6],
        }
    }
}

/// GPIO configuration of a dual-interface part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualPortConfig {
    /// Push-pull/open-drain mode bits
    pub mode: u16,
    /// Latch value after reset
    pub reset_latch: u16,
    /// Latch value during suspend
    pub suspend_latch: u16,
    /// Enhanced functions of the ECI interface
    pub enhanced_fxn_eci: u8,
    /// Enhanced functions of the SCI interface
    pub enhanced_fxn_sci: u8,
    /// Device-wide enhanced functions
    pub enhanced_fxn_device: u8,
}

impl Block for DualPortConfig {
    const KEYWORD: &'static str = "DualPortConfig";
    const FIELD: Field = Field::DualPortConfig;
    const SIZE: usize = 9;

    fn read(r: &mut Reader<'_>) -> Result<Self> {
        r.read_braced(|r| {
            Ok(Self {
                mode: r.read_hex()?,
                reset_latch: r.read_hex()?,
                suspend_latch: r.read_hex()?,
                enhanced_fxn_eci: r.read_hex()?,
                enhanced_fxn_sci: r.read_hex()?,
                enhanced_fxn_device: r.read_hex()?,
            })
        })
    }

    fn write(&self, w: &mut Writer) {
        w.braced(|w| {
            w.hex(self.mode);
            w.hex(self.reset_latch);
            w.hex(self.suspend_latch);
            w.hex(self.enhanced_fxn_eci);
            w.hex(self.enhanced_fxn_sci);
            w.hex(self.enhanced_fxn_device);
        });
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.mode.to_be_bytes());
        out.extend_from_slice(&self.reset_latch.to_be_bytes());
        out.extend_from_slice(&self.suspend_latch.to_be_bytes());
        out.extend_from_slice(&[
            self.enhanced_fxn_eci,
            self.enhanced_fxn_sci,
            self.enhanced_fxn_device,
        ]);
        out
    }

    fn decode(data: &[u8]) -> Self {
        Self {
            mode: be16(data, 0),
            reset_latch: be16(data, 2),
            suspend_latch: be16(data, 4),
            enhanced_fxn_eci: data[6],
            enhanced_fxn_sci: data[7],
            enhanced_fxn_device: data[8],
        }
    }
}

/// Port state of a quad-interface part (pins PB0..PB4)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadPortState {
    /// Mode per port bank
    pub mode: [u16; 5],
    /// Low power setting per port bank
    pub low_power: [u16; 5],
    /// Latch value per port bank
    pub latch: [u16; 5],
}

impl QuadPortState {
    const SIZE: usize = 30;

    fn words(&self) -> impl Iterator<Item = u16> + '_ {
        self.mode
            .iter()
            .chain(&self.low_power)
            .chain(&self.latch)
            .copied()
    }

    fn read(r: &mut Reader<'_>) -> Result<Self> {
        let mut state = Self::default();
        for word in state
            .mode
            .iter_mut()
            .chain(&mut state.low_power)
            .chain(&mut state.latch)
        {
            *word = r.read_hex()?;
        }
        Ok(state)
    }

    fn decode(data: &[u8]) -> Self {
        let mut state = Self::default();
        let words = state
            .mode
            .iter_mut()
            .chain(&mut state.low_power)
            .chain(&mut state.latch);
        for (i, word) in words.enumerate() {
            *word = be16(data, i * 2);
        }
        state
    }
}

/// GPIO configuration of a quad-interface part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadPortConfig {
    /// State applied after reset
    pub reset_latch: QuadPortState,
    /// State applied during suspend
    pub suspend_latch: QuadPortState,
    /// Inter-packet delay per interface
    pub ip_delay: [u8; 4],
    /// Enhanced functions per interface
    pub enhanced_fxn_ifc: [u8; 4],
    /// Device-wide enhanced functions
    pub enhanced_fxn_device: u8,
    /// External clock frequency per interface
    pub ext_clk_freq: [u8; 4],
}

impl Block for QuadPortConfig {
    const KEYWORD: &'static str = "QuadPortConfig";
    const FIELD: Field = Field::QuadPortConfig;
    const SIZE: usize = QuadPortState::SIZE * 2 + 13;

    fn read(r: &mut Reader<'_>) -> Result<Self> {
        r.read_braced(|r| {
            let mut cfg = Self {
                reset_latch: QuadPortState::read(r)?,
                suspend_latch: QuadPortState::read(r)?,
                ..Self::default()
            };
            for b in cfg.ip_delay.iter_mut().chain(&mut cfg.enhanced_fxn_ifc) {
                *b = r.read_hex()?;
            }
            cfg.enhanced_fxn_device = r.read_hex()?;
            for b in &mut cfg.ext_clk_freq {
                *b = r.read_hex()?;
            }
            Ok(cfg)
        })
    }

    fn write(&self, w: &mut Writer) {
        w.braced(|w| {
            for word in self.reset_latch.words().chain(self.suspend_latch.words()) {
                w.hex(word);
            }
            for &b in self.ip_delay.iter().chain(&self.enhanced_fxn_ifc) {
                w.hex(b);
            }
            w.hex(self.enhanced_fxn_device);
            for &b in &self.ext_clk_freq {
                w.hex(b);
            }
        });
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        for word in self.reset_latch.words().chain(self.suspend_latch.words()) {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out.extend_from_slice(&self.ip_delay);
        out.extend_from_slice(&self.enhanced_fxn_ifc);
        out.push(self.enhanced_fxn_device);
        out.extend_from_slice(&self.ext_clk_freq);
        out
    }

    fn decode(data: &[u8]) -> Self {
        let tail = &data[QuadPortState::SIZE * 2..];
        let mut cfg = Self {
            reset_latch: QuadPortState::decode(&data[..QuadPortState::SIZE]),
            suspend_latch: QuadPortState::decode(&data[QuadPortState::SIZE..]),
            enhanced_fxn_device: tail[8],
            ..Self::default()
        };
        cfg.ip_delay.copy_from_slice(&tail[0..4]);
        cfg.enhanced_fxn_ifc.copy_from_slice(&tail[4..8]);
        cfg.ext_clk_freq.copy_from_slice(&tail[9..13]);
        cfg
    }
}
