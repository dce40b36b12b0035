//! Program / reset / verify / lock orchestration
//!
//! A [`Job`] pairs a parsed [`Customization`] with a [`Transport`] and runs
//! one [`Command`]:
//!
//! 1. program every device found under the original VID/PID (fatal on any
//!    error, never retried),
//! 2. reset them and wait until they re-enumerate,
//! 3. verify every device under the new VID/PID, retrying transient
//!    failures,
//! 4. optionally lock them.

use std::time::Duration;

use crate::device_set::{DeviceInfo, DeviceSet};
use crate::error::{Error, Result};
use crate::params::Customization;
use crate::serial::{SerialNumberSet, SerialSource};
use crate::timing::Timing;
use crate::transport::{Delay, StdDelay, Transport};
use crate::types::VidPid;

/// What the invocation asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Soft reset every matching device
    Reset,
    /// Print every matching device
    List,
    /// Program only
    SetConfig,
    /// Verify unlocked devices only
    VerifyConfig,
    /// Verify, accepting locked devices
    VerifyLockedConfig,
    /// Program, reset, then verify
    SetAndVerifyConfig,
}

impl Command {
    /// Whether devices get programmed
    pub fn programs(self) -> bool {
        matches!(self, Self::SetConfig | Self::SetAndVerifyConfig)
    }

    /// Whether devices get verified
    pub fn verifies(self) -> bool {
        matches!(
            self,
            Self::VerifyConfig | Self::VerifyLockedConfig | Self::SetAndVerifyConfig
        )
    }
}

/// Options of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Operation to perform
    pub command: Command,
    /// Expected number of devices; required unless resetting or listing
    pub device_count: Option<u32>,
    /// Serial numbers to program and/or verify
    pub serials: SerialSource,
    /// Lock devices after a successful verification
    pub lock: bool,
}

impl JobRequest {
    /// Request without serial numbers or locking
    pub fn new(command: Command, device_count: Option<u32>) -> Self {
        Self {
            command,
            device_count,
            serials: SerialSource::None,
            lock: false,
        }
    }
}

/// Progress callbacks
pub trait JobProgress {
    /// Devices under the filters were reset
    fn reset_done(&mut self, count: usize);

    /// Listing of every matching device
    fn listing(&mut self, devices: &[DeviceInfo]);

    /// Serial numbers about to be programmed
    fn serial_numbers(&mut self, serials: &SerialNumberSet);

    /// Programming finished
    fn programmed(&mut self, count: usize);

    /// Still waiting for devices to re-enumerate
    fn waiting(&mut self, found: u32, needed: u32);

    /// All devices are back; pausing before verification
    fn settling(&mut self, duration: Duration);

    /// Verification finished
    fn verified(&mut self, count: usize);

    /// Locking finished
    fn locked(&mut self, count: usize);

    /// A verification attempt failed and will be retried
    fn retrying(&mut self, error: &Error);
}

/// A no-op progress reporter
pub struct NoProgress;

impl JobProgress for NoProgress {
    fn reset_done(&mut self, _count: usize) {}
    fn listing(&mut self, _devices: &[DeviceInfo]) {}
    fn serial_numbers(&mut self, _serials: &SerialNumberSet) {}
    fn programmed(&mut self, _count: usize) {}
    fn waiting(&mut self, _found: u32, _needed: u32) {}
    fn settling(&mut self, _duration: Duration) {}
    fn verified(&mut self, _count: usize) {}
    fn locked(&mut self, _count: usize) {}
    fn retrying(&mut self, _error: &Error) {}
}

/// Parameters of the verification loop
struct VerifyPlan {
    /// Devices were just reset and must re-enumerate first
    wait_for_reset: bool,
    allow_locked: bool,
    lock: bool,
    count: u32,
    /// Devices under either filter before anything was reset
    start_count: u32,
}

/// One customization run
pub struct Job<'a, T: Transport> {
    transport: &'a T,
    customization: &'a Customization,
    timing: Timing,
    delay: Box<dyn Delay + 'a>,
}

impl<'a, T: Transport> Job<'a, T> {
    /// Job with default timing and real sleeps
    pub fn new(transport: &'a T, customization: &'a Customization) -> Self {
        Self {
            transport,
            customization,
            timing: Timing::default(),
            delay: Box::new(StdDelay),
        }
    }

    /// Override delays and retry bounds
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Replace the sleep implementation
    pub fn with_delay(mut self, delay: impl Delay + 'a) -> Self {
        self.delay = Box::new(delay);
        self
    }

    fn old_filter(&self) -> VidPid {
        self.customization.filter
    }

    fn new_filter(&self) -> VidPid {
        self.customization.target_filter()
    }

    /// Filters to visit: the original one, then the new one if it differs
    fn filters(&self) -> Vec<VidPid> {
        let (old, new) = (self.old_filter(), self.new_filter());
        if old == new {
            vec![old]
        } else {
            vec![old, new]
        }
    }

    fn build_set(&self, filter: VidPid, allow_locked: bool) -> Result<DeviceSet<T::Device>> {
        DeviceSet::build(self.transport, self.customization.part, filter, allow_locked)
    }

    /// Devices enumerated under either filter
    fn total_count(&self) -> Result<u32> {
        let mut total = 0;
        for filter in self.filters() {
            total += self.transport.count_devices(filter)?;
        }
        Ok(total)
    }

    /// Execute `request`
    pub fn run(&mut self, request: &JobRequest, progress: &mut dyn JobProgress) -> Result<()> {
        match request.command {
            Command::Reset => self.reset_all(progress),
            Command::List => self.list_all(progress),
            _ => self.customize(request, progress),
        }
    }

    fn reset_all(&mut self, progress: &mut dyn JobProgress) -> Result<()> {
        let mut count = 0;
        for filter in self.filters() {
            let set = self.build_set(filter, true)?;
            for dev in set.iter() {
                dev.reset()?;
            }
            log::info!("reset {} device(s) under {}", set.len(), filter);
            count += set.len();
        }
        progress.reset_done(count);
        Ok(())
    }

    fn list_all(&mut self, progress: &mut dyn JobProgress) -> Result<()> {
        let mut devices = Vec::new();
        for filter in self.filters() {
            let set = self.build_set(filter, true)?;
            devices.extend(set.describe()?);
        }
        progress.listing(&devices);
        Ok(())
    }

    fn customize(&mut self, request: &JobRequest, progress: &mut dyn JobProgress) -> Result<()> {
        let program = request.command.programs();
        let verify = request.command.verifies();
        if request.lock && !verify {
            return Err(Error::Usage(
                "--lock must be combined with one of \"verify\" commands".into(),
            ));
        }
        let count = match request.device_count {
            Some(n) if n > 0 => n,
            _ => {
                return Err(Error::Usage(
                    "Invalid or missing --device-count command line option".into(),
                ))
            }
        };
        let serials = SerialNumberSet::from_source(&request.serials, program, count)?;
        if program {
            self.customization.params.check_serials(&serials)?;
        }

        let start_count = self.total_count()?;
        log::debug!("{} device(s) present before starting", start_count);

        if program {
            self.program_all(count, &serials, verify, progress)?;
        }
        if verify {
            let plan = VerifyPlan {
                wait_for_reset: program,
                // Locked devices are only acceptable when merely checking a locked batch
                allow_locked: !program
                    && !request.lock
                    && request.command == Command::VerifyLockedConfig,
                lock: request.lock,
                count,
                start_count,
            };
            self.verify_until_done(&plan, &serials, progress)?;
        }
        Ok(())
    }

    fn program_all(
        &mut self,
        count: u32,
        serials: &SerialNumberSet,
        reset: bool,
        progress: &mut dyn JobProgress,
    ) -> Result<()> {
        log::info!("programming devices under {}", self.old_filter());
        let set = self.build_set(self.old_filter(), false)?;
        if set.len() != count as usize {
            return Err(Error::Customization(format!(
                "programming step: expected {} devices, found {}",
                count,
                set.len()
            )));
        }
        if !serials.is_empty() {
            progress.serial_numbers(serials);
        }
        for (i, dev) in set.iter().enumerate() {
            self.customization
                .params
                .program(dev.device(), serials.get(i))?;
        }
        if reset {
            for dev in set.iter() {
                dev.reset()?;
            }
        }
        progress.programmed(set.len());
        Ok(())
    }

    fn verify_until_done(
        &mut self,
        plan: &VerifyPlan,
        serials: &SerialNumberSet,
        progress: &mut dyn JobProgress,
    ) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut result = Ok(());
            if plan.wait_for_reset {
                result = self.wait_for_devices(plan.start_count, progress);
            }
            let result = result.and_then(|()| self.verify_pass(plan, serials, progress));

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    log::warn!("verification attempt {} failed: {}", attempt, e);
                    if self
                        .timing
                        .max_verify_attempts
                        .is_some_and(|max| attempt >= max)
                    {
                        return Err(e);
                    }
                    progress.retrying(&e);
                    self.delay.delay(self.timing.retry_delay());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn wait_for_devices(&mut self, expected: u32, progress: &mut dyn JobProgress) -> Result<()> {
        let mut polls = 0u32;
        loop {
            let found = self.total_count()?;
            if found == expected {
                progress.settling(self.timing.settle());
                self.delay.delay(self.timing.settle());
                return Ok(());
            }
            polls += 1;
            if self.timing.max_wait_polls.is_some_and(|max| polls >= max) {
                return Err(Error::Customization(
                    "devices failed to re-enumerate after reset".into(),
                ));
            }
            progress.waiting(found, expected);
            self.delay.delay(self.timing.poll_interval());
        }
    }

    fn verify_pass(
        &mut self,
        plan: &VerifyPlan,
        serials: &SerialNumberSet,
        progress: &mut dyn JobProgress,
    ) -> Result<()> {
        log::info!("verifying devices under {}", self.new_filter());
        let set = self.build_set(self.new_filter(), plan.allow_locked)?;
        if set.len() != plan.count as usize {
            return Err(Error::Customization(format!(
                "verification step: expected {} devices, found {}",
                plan.count,
                set.len()
            )));
        }

        let mut remaining = serials.clone();
        for dev in set.iter() {
            self.customization.params.verify(dev.device(), &mut remaining)?;
        }
        if !remaining.is_empty() {
            return Err(Error::Internal(format!(
                "{} serial number(s) left after verification",
                remaining.len()
            )));
        }
        progress.verified(set.len());

        if plan.lock {
            for dev in set.iter() {
                dev.lock()?;
            }
            progress.locked(set.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::{Device, Field, TransportResult};
    use crate::ErrorKind;

    struct NoDevice;

    impl Device for NoDevice {
        fn part_number(&self) -> TransportResult<u8> {
            unreachable!()
        }
        fn vid_pid(&self) -> TransportResult<VidPid> {
            unreachable!()
        }
        fn get_field(&self, _field: Field) -> TransportResult<Vec<u8>> {
            unreachable!()
        }
        fn set_field(&self, _field: Field, _data: &[u8]) -> TransportResult<()> {
            unreachable!()
        }
        fn reset(&self) -> TransportResult<()> {
            unreachable!()
        }
    }

    /// Bus with nothing attached
    struct EmptyBus;

    impl Transport for EmptyBus {
        type Device = NoDevice;

        fn count_devices(&self, _filter: VidPid) -> TransportResult<u32> {
            Ok(0)
        }

        fn open(&self, _filter: VidPid, index: u32) -> TransportResult<NoDevice> {
            Err(TransportError::NotFound { index })
        }
    }

    fn customization() -> Customization {
        Customization::parse(
            "FilterPartNumByte { { 01 } } FilterVidPid { { 10c4 } { ea60 } }",
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_command_flags() {
        assert!(Command::SetAndVerifyConfig.programs());
        assert!(Command::SetAndVerifyConfig.verifies());
        assert!(!Command::VerifyLockedConfig.programs());
        assert!(Command::VerifyLockedConfig.verifies());
        assert!(!Command::SetConfig.verifies());
        assert!(!Command::Reset.programs());
    }

    #[test]
    fn test_lock_requires_verify() {
        let c = customization();
        let mut request = JobRequest::new(Command::SetConfig, Some(1));
        request.lock = true;
        let err = Job::new(&EmptyBus, &c)
            .run(&request, &mut NoProgress)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.to_string().starts_with("--lock must be combined"));
    }

    #[test]
    fn test_device_count_required() {
        let c = customization();
        for count in [None, Some(0)] {
            let request = JobRequest::new(Command::VerifyConfig, count);
            let err = Job::new(&EmptyBus, &c)
                .run(&request, &mut NoProgress)
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                "Invalid or missing --device-count command line option"
            );
        }
    }

    #[test]
    fn test_program_count_mismatch_is_fatal() {
        let c = customization();
        let request = JobRequest::new(Command::SetConfig, Some(2));
        let err = Job::new(&EmptyBus, &c)
            .run(&request, &mut NoProgress)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "programming step: expected 2 devices, found 0"
        );
    }

    #[test]
    fn test_reset_and_list_need_no_count() {
        let c = customization();
        let mut job = Job::new(&EmptyBus, &c);
        job.run(&JobRequest::new(Command::Reset, None), &mut NoProgress)
            .unwrap();
        job.run(&JobRequest::new(Command::List, None), &mut NoProgress)
            .unwrap();
    }
}
