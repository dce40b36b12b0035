//! rsmt-core - CP210x manufacturing customization engine
//!
//! This crate reads customization scripts, models the per-family parameter
//! sets of the CP210x USB-to-UART bridges and drives the
//! program, reset, verify and lock sequence over a batch of devices.
//!
//! USB access is abstracted behind the [`Transport`] and [`Device`] traits;
//! see the `rsmt-cp210x` crate for the hardware backend and `rsmt-dummy` for
//! an in-memory bench.

pub mod device_set;
pub mod error;
pub mod grammar;
pub mod job;
pub mod params;
pub mod serial;
pub mod timing;
pub mod transport;
pub mod types;

pub use device_set::{DeviceHandle, DeviceInfo, DeviceSet};
pub use error::{Error, ErrorKind, Position, Result, TransportError};
pub use job::{Command, Job, JobProgress, JobRequest, NoProgress};
pub use params::{Customization, FamilyParams, Params};
pub use serial::{SerialNumberSet, SerialSource};
pub use timing::Timing;
pub use transport::{Delay, Device, Field, StdDelay, StringEncoding, Transport, TransportResult};
pub use types::{Family, PartNumber, VidPid};
