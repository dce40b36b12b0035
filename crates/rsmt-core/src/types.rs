//! Device identity types

use std::fmt;

/// USB vendor/product id pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VidPid {
    /// Vendor id
    pub vid: u16,
    /// Product id
    pub pid: u16,
}

impl VidPid {
    /// Create a new VID/PID pair
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

impl fmt::Display for VidPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Part number byte reported by a CP210x device
///
/// The three CP2102N packages report distinct part numbers but share one
/// parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartNumber {
    /// CP2101
    Cp2101,
    /// CP2102
    Cp2102,
    /// CP2103
    Cp2103,
    /// CP2104
    Cp2104,
    /// CP2105
    Cp2105,
    /// CP2108
    Cp2108,
    /// CP2109
    Cp2109,
    /// CP2102N in QFN28
    Cp2102nQfn28,
    /// CP2102N in QFN24
    Cp2102nQfn24,
    /// CP2102N in QFN20
    Cp2102nQfn20,
}

impl PartNumber {
    /// All supported part numbers
    pub const ALL: [PartNumber; 10] = [
        Self::Cp2101,
        Self::Cp2102,
        Self::Cp2103,
        Self::Cp2104,
        Self::Cp2105,
        Self::Cp2108,
        Self::Cp2109,
        Self::Cp2102nQfn28,
        Self::Cp2102nQfn24,
        Self::Cp2102nQfn20,
    ];

    /// Decode a part number byte
    pub fn from_byte(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_byte() == value)
    }

    /// Raw part number byte
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Cp2101 => 0x01,
            Self::Cp2102 => 0x02,
            Self::Cp2103 => 0x03,
            Self::Cp2104 => 0x04,
            Self::Cp2105 => 0x05,
            Self::Cp2108 => 0x08,
            Self::Cp2109 => 0x09,
            Self::Cp2102nQfn28 => 0x20,
            Self::Cp2102nQfn24 => 0x21,
            Self::Cp2102nQfn20 => 0x22,
        }
    }

    /// Parameter family this part belongs to
    pub const fn family(self) -> Family {
        match self {
            Self::Cp2101 => Family::Cp2101,
            Self::Cp2102 => Family::Cp2102,
            Self::Cp2103 => Family::Cp2103,
            Self::Cp2104 => Family::Cp2104,
            Self::Cp2105 => Family::Cp2105,
            Self::Cp2108 => Family::Cp2108,
            Self::Cp2109 => Family::Cp2109,
            Self::Cp2102nQfn28 | Self::Cp2102nQfn24 | Self::Cp2102nQfn20 => Family::Cp2102n,
        }
    }
}

impl fmt::Display for PartNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cp2102nQfn28 => write!(f, "CP2102N (QFN28)"),
            Self::Cp2102nQfn24 => write!(f, "CP2102N (QFN24)"),
            Self::Cp2102nQfn20 => write!(f, "CP2102N (QFN20)"),
            other => write!(f, "{}", other.family()),
        }
    }
}

/// Chip family; selects the customizable parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// CP2101
    Cp2101,
    /// CP2102
    Cp2102,
    /// CP2102N (raw config blob)
    Cp2102n,
    /// CP2103
    Cp2103,
    /// CP2104
    Cp2104,
    /// CP2105 (dual interface)
    Cp2105,
    /// CP2108 (quad interface)
    Cp2108,
    /// CP2109
    Cp2109,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cp2101 => "CP2101",
            Self::Cp2102 => "CP2102",
            Self::Cp2102n => "CP2102N",
            Self::Cp2103 => "CP2103",
            Self::Cp2104 => "CP2104",
            Self::Cp2105 => "CP2105",
            Self::Cp2108 => "CP2108",
            Self::Cp2109 => "CP2109",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_number_round_trip() {
        for part in PartNumber::ALL {
            assert_eq!(PartNumber::from_byte(part.as_byte()), Some(part));
        }
        assert_eq!(PartNumber::from_byte(0x06), None);
    }

    #[test]
    fn test_cp2102n_packages_share_family() {
        assert_eq!(PartNumber::Cp2102nQfn20.family(), Family::Cp2102n);
        assert_eq!(PartNumber::Cp2102nQfn28.family(), Family::Cp2102n);
        assert_eq!(PartNumber::Cp2105.family(), Family::Cp2105);
    }

    #[test]
    fn test_vid_pid_display() {
        assert_eq!(VidPid::new(0x10c4, 0xea60).to_string(), "10c4:ea60");
    }
}
