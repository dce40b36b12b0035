//! Serial number bookkeeping
//!
//! A [`SerialNumberSet`] is built once per run from the command line. During
//! programming, entry `i` goes to device `i`; during verification each
//! device's serial number is removed from a copy of the set, which must end
//! up empty.

use crate::error::{Error, Result};

/// Where serial numbers come from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SerialSource {
    /// Serial numbers are neither programmed nor verified
    #[default]
    None,
    /// Explicit list given on the command line
    List(Vec<String>),
    /// Generate a random unique identifier per device
    Generate,
}

impl SerialSource {
    /// Interpret the words following `--serial-nums`
    ///
    /// Accepts `{ s1 s2 ... }` (braces as separate words) or `GUID`.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let invalid = || Error::Usage("Invalid serial number command line option".into());
        let words: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        match words.as_slice() {
            ["GUID"] => Ok(Self::Generate),
            ["{", list @ .., "}"] => {
                if list.iter().any(|s| *s == "{" || *s == "}") {
                    return Err(invalid());
                }
                Ok(Self::List(list.iter().map(|s| s.to_string()).collect()))
            }
            _ => Err(invalid()),
        }
    }
}

/// Pool of distinct serial numbers for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialNumberSet {
    serials: Vec<Vec<u8>>,
}

impl SerialNumberSet {
    /// Empty set (serial numbers not in use)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the set for a run over `count` devices
    ///
    /// Generation is only legal when the run programs devices.
    pub fn from_source(source: &SerialSource, may_generate: bool, count: u32) -> Result<Self> {
        match source {
            SerialSource::None => Ok(Self::new()),
            SerialSource::List(list) => {
                if list.len() != count as usize {
                    return Err(Error::Usage(
                        "Serial number count is different from --device-count".into(),
                    ));
                }
                Self::from_list(list.iter().map(|s| s.as_bytes().to_vec()).collect())
            }
            SerialSource::Generate => {
                if !may_generate {
                    return Err(Error::Usage("GUID option is illegal".into()));
                }
                Self::generate(count)
            }
        }
    }

    /// Literal list; duplicates are rejected
    pub fn from_list(serials: Vec<Vec<u8>>) -> Result<Self> {
        for (i, a) in serials.iter().enumerate() {
            if serials[i + 1..].contains(a) {
                return Err(Error::Usage("Identical serial numbers".into()));
            }
        }
        Ok(Self { serials })
    }

    /// `count` random identifiers, each 32 lowercase hex digits
    pub fn generate(count: u32) -> Result<Self> {
        let serials = (0..count)
            .map(|_| uuid::Uuid::new_v4().simple().to_string().into_bytes())
            .collect();
        Self::from_list(serials)
    }

    /// Number of remaining entries
    pub fn len(&self) -> usize {
        self.serials.len()
    }

    /// Whether no entries remain
    pub fn is_empty(&self) -> bool {
        self.serials.is_empty()
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.serials.get(index).map(Vec::as_slice)
    }

    /// Iterate over the entries in order
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.serials.iter().map(Vec::as_slice)
    }

    /// Remove `candidate` if present
    pub fn find_and_erase(&mut self, candidate: &[u8]) -> bool {
        match self.serials.iter().position(|s| s == candidate) {
            Some(pos) => {
                self.serials.remove(pos);
                true
            }
            None => false,
        }
    }
}
