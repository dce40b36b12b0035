//! rsmt-dummy - In-memory CP210x bench for testing
//!
//! This crate provides a [`Transport`] over a set of emulated CP210x parts.
//! It's useful for testing the customization engine and for rehearsing a
//! configuration without real hardware.
//!
//! ```
//! use rsmt_core::{Device, Field, StringEncoding, Transport, VidPid, PartNumber};
//! use rsmt_dummy::{DummyBench, DummyChip};
//!
//! let filter = VidPid::new(0x10c4, 0xea60);
//! let bench = DummyBench::new();
//! bench.attach(DummyChip::blank(PartNumber::Cp2102, filter));
//!
//! assert_eq!(bench.count_devices(filter).unwrap(), 1);
//! let dev = bench.open(filter, 0).unwrap();
//! dev.set_field(Field::ProductString(StringEncoding::Ascii), b"WIDGET").unwrap();
//! ```

mod chip;

pub use chip::{DummyChip, DummyConfig};

use std::cell::RefCell;
use std::rc::Rc;

use rsmt_core::{Device, Field, Transport, TransportError, TransportResult, VidPid};

#[derive(Debug)]
struct Slot {
    chip: DummyChip,
    /// Remaining enumeration polls before the chip shows up again
    offline_polls: u32,
    /// Bumped on every reset; stale handles stop working
    generation: u32,
}

#[derive(Debug, Default)]
struct BenchState {
    slots: Vec<Slot>,
    offline_after_reset: u32,
    failing_opens: u32,
    open_handles: usize,
    total_opens: usize,
}

impl BenchState {
    /// Slot index of the `index`th online chip under `filter`
    fn find(&self, filter: VidPid, index: u32) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.offline_polls == 0 && s.chip.vid_pid() == filter)
            .nth(index as usize)
            .map(|(i, _)| i)
    }
}

/// A bench of emulated devices
///
/// Cloning the bench shares the devices, so a test can keep one clone for
/// inspection while the engine works through another.
#[derive(Debug, Clone, Default)]
pub struct DummyBench {
    state: Rc<RefCell<BenchState>>,
}

impl DummyBench {
    /// Empty bench
    pub fn new() -> Self {
        Self::default()
    }

    /// Bench with `count` blank chips of one part under one VID/PID
    ///
    /// Serial numbers are numbered from 1.
    pub fn with_blank_chips(part: rsmt_core::PartNumber, vid_pid: VidPid, count: usize) -> Self {
        let bench = Self::new();
        for i in 0..count {
            bench.attach(DummyChip::new(DummyConfig {
                part,
                vid_pid,
                serial: format!("{:04}", i + 1),
                ..DummyConfig::default()
            }));
        }
        bench
    }

    /// Plug in a chip; returns its slot index
    pub fn attach(&self, chip: DummyChip) -> usize {
        let mut state = self.state.borrow_mut();
        state.slots.push(Slot {
            chip,
            offline_polls: 0,
            generation: 0,
        });
        state.slots.len() - 1
    }

    /// Number of chips on the bench, online or not
    pub fn len(&self) -> usize {
        self.state.borrow().slots.len()
    }

    /// Whether no chip is attached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the chip in `slot`
    pub fn chip(&self, slot: usize) -> Option<DummyChip> {
        self.state.borrow().slots.get(slot).map(|s| s.chip.clone())
    }

    /// Modify the chip in `slot` in place
    pub fn with_chip<R>(&self, slot: usize, f: impl FnOnce(&mut DummyChip) -> R) -> Option<R> {
        self.state
            .borrow_mut()
            .slots
            .get_mut(slot)
            .map(|s| f(&mut s.chip))
    }

    /// Keep reset chips off the bus for `polls` enumeration polls
    pub fn set_reenumeration_delay(&self, polls: u32) {
        self.state.borrow_mut().offline_after_reset = polls;
    }

    /// Fail the next `count` open attempts
    pub fn fail_opens(&self, count: u32) {
        self.state.borrow_mut().failing_opens = count;
    }

    /// Handles currently open
    pub fn open_handles(&self) -> usize {
        self.state.borrow().open_handles
    }

    /// Handles opened since the bench was created
    pub fn total_opens(&self) -> usize {
        self.state.borrow().total_opens
    }
}

impl Transport for DummyBench {
    type Device = DummyDevice;

    fn count_devices(&self, filter: VidPid) -> TransportResult<u32> {
        let mut state = self.state.borrow_mut();
        let mut count = 0;
        // An offline chip only advances when polled under the VID/PID it returns with
        for slot in state.slots.iter_mut().filter(|s| s.chip.vid_pid() == filter) {
            if slot.offline_polls > 0 {
                slot.offline_polls -= 1;
            } else {
                count += 1;
            }
        }
        Ok(count)
    }

    fn open(&self, filter: VidPid, index: u32) -> TransportResult<DummyDevice> {
        let mut state = self.state.borrow_mut();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(TransportError::Open("injected failure".into()));
        }
        let slot = state
            .find(filter, index)
            .ok_or(TransportError::NotFound { index })?;
        let generation = state.slots[slot].generation;
        state.open_handles += 1;
        state.total_opens += 1;
        log::trace!("dummy open {} #{} -> slot {}", filter, index, slot);
        Ok(DummyDevice {
            state: Rc::clone(&self.state),
            slot,
            generation,
        })
    }
}

/// An open handle to one emulated chip
#[derive(Debug)]
pub struct DummyDevice {
    state: Rc<RefCell<BenchState>>,
    slot: usize,
    generation: u32,
}

impl DummyDevice {
    fn with_chip<R>(
        &self,
        f: impl FnOnce(&mut DummyChip) -> TransportResult<R>,
    ) -> TransportResult<R> {
        let mut state = self.state.borrow_mut();
        let slot = &mut state.slots[self.slot];
        if slot.generation != self.generation {
            return Err(TransportError::Transfer {
                operation: "control transfer",
                message: "device was reset".into(),
            });
        }
        f(&mut slot.chip)
    }
}

impl Device for DummyDevice {
    fn part_number(&self) -> TransportResult<u8> {
        self.with_chip(|chip| Ok(chip.part().as_byte()))
    }

    fn vid_pid(&self) -> TransportResult<VidPid> {
        self.with_chip(|chip| Ok(chip.vid_pid()))
    }

    fn get_field(&self, field: Field) -> TransportResult<Vec<u8>> {
        self.with_chip(|chip| chip.get_field(field))
    }

    fn set_field(&self, field: Field, data: &[u8]) -> TransportResult<()> {
        self.with_chip(|chip| chip.set_field(field, data))
    }

    fn reset(&self) -> TransportResult<()> {
        self.with_chip(|chip| {
            chip.reset();
            Ok(())
        })?;
        let mut state = self.state.borrow_mut();
        let delay = state.offline_after_reset;
        let slot = &mut state.slots[self.slot];
        slot.generation += 1;
        slot.offline_polls = delay;
        Ok(())
    }
}

impl Drop for DummyDevice {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}
