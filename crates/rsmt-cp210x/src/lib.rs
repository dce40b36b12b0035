//! rsmt-cp210x - USB backend for CP210x customization
//!
//! Implements [`rsmt_core::Transport`] and [`rsmt_core::Device`] on top of
//! `nusb` control transfers.
//!
//! # Example
//!
//! ```no_run
//! use rsmt_core::{Transport, VidPid};
//! use rsmt_cp210x::UsbTransport;
//!
//! let transport = UsbTransport::new();
//! let count = transport.count_devices(VidPid::new(0x10c4, 0xea60))?;
//! println!("{} devices", count);
//! # Ok::<(), rsmt_core::TransportError>(())
//! ```

mod device;
mod error;
pub mod protocol;

pub use device::{Cp210x, UsbTransport};
pub use error::{Cp210xError, Result};
