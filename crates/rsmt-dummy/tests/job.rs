//! End-to-end runs of the orchestrator against the emulated bench

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rsmt_core::{
    Command, Customization, Delay, DeviceInfo, Error, ErrorKind, Job, JobProgress, JobRequest,
    PartNumber, SerialNumberSet, SerialSource, Timing, VidPid,
};
use rsmt_dummy::{DummyBench, DummyChip};

const OLD: VidPid = VidPid::new(0x10c4, 0xea60);
const NEW: VidPid = VidPid::new(0x1234, 0x5678);

/// Records requested sleeps instead of sleeping
#[derive(Clone, Default)]
struct FakeDelay(Rc<RefCell<Vec<Duration>>>);

impl Delay for FakeDelay {
    fn delay(&mut self, duration: Duration) {
        self.0.borrow_mut().push(duration);
    }
}

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    serials: Vec<String>,
    listing: Vec<DeviceInfo>,
}

impl JobProgress for Recorder {
    fn reset_done(&mut self, count: usize) {
        self.events.push(format!("reset {}", count));
    }
    fn listing(&mut self, devices: &[DeviceInfo]) {
        self.listing = devices.to_vec();
    }
    fn serial_numbers(&mut self, serials: &SerialNumberSet) {
        self.serials = serials
            .iter()
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();
    }
    fn programmed(&mut self, count: usize) {
        self.events.push(format!("programmed {}", count));
    }
    fn waiting(&mut self, found: u32, needed: u32) {
        self.events.push(format!("waiting {}/{}", found, needed));
    }
    fn settling(&mut self, _duration: Duration) {
        self.events.push("settling".into());
    }
    fn verified(&mut self, count: usize) {
        self.events.push(format!("verified {}", count));
    }
    fn locked(&mut self, count: usize) {
        self.events.push(format!("locked {}", count));
    }
    fn retrying(&mut self, error: &Error) {
        self.events.push(format!("retrying: {}", error));
    }
}

fn timing() -> Timing {
    Timing {
        poll_interval_ms: 1,
        settle_ms: 2,
        retry_delay_ms: 3,
        max_verify_attempts: Some(5),
        max_wait_polls: Some(50),
    }
}

fn config(part: u8, body: &str) -> Customization {
    Customization::parse(
        &format!(
            "FilterPartNumByte {{ {{ {:02x} }} }} FilterVidPid {{ {{ 10c4 }} {{ ea60 }} }} {}",
            part, body
        ),
        false,
    )
    .unwrap()
}

/// ProductStringAscii "WIDGET1" and a VID/PID change
fn widget_config() -> Customization {
    config(
        0x02,
        "VidPid { { 1234 } { 5678 } } ProductStringAscii { { 57 49 44 47 45 54 31 } }",
    )
}

fn run(
    bench: &DummyBench,
    c: &Customization,
    request: &JobRequest,
    timing: Timing,
) -> (rsmt_core::Result<()>, Recorder, Vec<Duration>) {
    let delay = FakeDelay::default();
    let mut progress = Recorder::default();
    let result = Job::new(bench, c)
        .with_timing(timing)
        .with_delay(delay.clone())
        .run(request, &mut progress);
    let sleeps = delay.0.borrow().clone();
    (result, progress, sleeps)
}

fn serial_list(serials: &[&str]) -> SerialSource {
    SerialSource::List(serials.iter().map(|s| s.to_string()).collect())
}

#[test]
fn test_program_verify_lock() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 2);
    let c = widget_config();
    let mut request = JobRequest::new(Command::SetAndVerifyConfig, Some(2));
    request.serials = serial_list(&["SN-A", "SN-B"]);
    request.lock = true;

    let (result, progress, sleeps) = run(&bench, &c, &request, timing());
    result.unwrap();
    assert_eq!(
        progress.events,
        ["programmed 2", "settling", "verified 2", "locked 2"]
    );
    assert_eq!(progress.serials, ["SN-A", "SN-B"]);
    assert_eq!(sleeps, [Duration::from_millis(2)]);

    for slot in 0..2 {
        let chip = bench.chip(slot).unwrap();
        assert_eq!(chip.vid_pid(), NEW);
        assert!(chip.is_locked());
        assert_eq!(chip.resets(), 1);
    }
    assert_eq!(bench.open_handles(), 0);
}

#[test]
fn test_waits_for_reenumeration() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 1);
    bench.set_reenumeration_delay(4);
    let c = widget_config();
    let request = JobRequest::new(Command::SetAndVerifyConfig, Some(1));

    let (result, progress, sleeps) = run(&bench, &c, &request, timing());
    result.unwrap();
    // Both filters are queried per round but the delay advances once per round
    assert_eq!(
        progress.events,
        [
            "programmed 1",
            "waiting 0/1",
            "waiting 0/1",
            "waiting 0/1",
            "waiting 0/1",
            "settling",
            "verified 1"
        ]
    );
    assert_eq!(
        sleeps,
        [
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(2)
        ]
    );
}

#[test]
fn test_wait_is_bounded() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 1);
    bench.set_reenumeration_delay(1000);
    let c = widget_config();
    let request = JobRequest::new(Command::SetAndVerifyConfig, Some(1));
    let timing = Timing {
        max_wait_polls: Some(3),
        max_verify_attempts: Some(1),
        ..timing()
    };

    let (result, _, _) = run(&bench, &c, &request, timing);
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Customization);
    assert_eq!(
        err.to_string(),
        "devices failed to re-enumerate after reset"
    );
}

#[test]
fn test_transient_failure_is_retried() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 1);
    let c = config(0x02, "MaxPower { { 32 } }");
    bench.with_chip(0, |chip| chip.fail_reads(1));

    let request = JobRequest::new(Command::VerifyConfig, Some(1));
    let (result, progress, sleeps) = run(&bench, &c, &request, timing());
    result.unwrap();
    assert_eq!(progress.events.len(), 2);
    assert!(progress.events[0].starts_with("retrying: "));
    assert_eq!(progress.events[1], "verified 1");
    assert_eq!(sleeps, [Duration::from_millis(3)]);
}

#[test]
fn test_mismatch_retried_until_bound() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 1);
    let c = config(0x02, "MaxPower { { 7f } }");
    let request = JobRequest::new(Command::VerifyConfig, Some(1));
    let timing = Timing {
        max_verify_attempts: Some(3),
        ..timing()
    };

    let (result, progress, sleeps) = run(&bench, &c, &request, timing);
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Failed MaxPower verification");
    assert_eq!(progress.events.len(), 2);
    assert_eq!(sleeps.len(), 2);
}

#[test]
fn test_verify_count_mismatch_is_retried() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 1);
    let c = config(0x02, "");
    let request = JobRequest::new(Command::VerifyConfig, Some(2));
    let timing = Timing {
        max_verify_attempts: Some(2),
        ..timing()
    };

    let (result, progress, _) = run(&bench, &c, &request, timing);
    assert_eq!(
        result.unwrap_err().to_string(),
        "verification step: expected 2 devices, found 1"
    );
    assert_eq!(
        progress.events,
        ["retrying: verification step: expected 2 devices, found 1"]
    );
}

#[test]
fn test_program_count_mismatch_touches_nothing() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 2);
    let c = widget_config();
    let request = JobRequest::new(Command::SetAndVerifyConfig, Some(3));

    let (result, progress, sleeps) = run(&bench, &c, &request, timing());
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Customization);
    assert!(progress.events.is_empty());
    assert!(sleeps.is_empty());
    for slot in 0..2 {
        let chip = bench.chip(slot).unwrap();
        assert_eq!(chip.vid_pid(), OLD);
        assert_eq!(chip.resets(), 0);
    }
}

#[test]
fn test_locked_device_during_programming_is_fatal() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 1);
    bench.attach(DummyChip::blank(PartNumber::Cp2102, OLD).locked());
    let c = widget_config();
    let request = JobRequest::new(Command::SetAndVerifyConfig, Some(2));

    let (result, progress, _) = run(&bench, &c, &request, timing());
    assert_eq!(result.unwrap_err().to_string(), "Locked device found");
    assert!(progress.events.is_empty());
    assert_eq!(bench.open_handles(), 0);
}

#[test]
fn test_verify_locked_config_accepts_locked_devices() {
    let bench = DummyBench::new();
    bench.attach(DummyChip::blank(PartNumber::Cp2104, OLD).locked());
    let c = config(0x04, "");

    let request = JobRequest::new(Command::VerifyLockedConfig, Some(1));
    let (result, _, _) = run(&bench, &c, &request, timing());
    result.unwrap();

    let request = JobRequest::new(Command::VerifyConfig, Some(1));
    let timing = Timing {
        max_verify_attempts: Some(1),
        ..timing()
    };
    let (result, _, _) = run(&bench, &c, &request, timing);
    assert_eq!(result.unwrap_err().to_string(), "Locked device found");
}

#[test]
fn test_verify_locked_config_with_lock_rejects_locked_devices() {
    let bench = DummyBench::new();
    bench.attach(DummyChip::blank(PartNumber::Cp2104, OLD).locked());
    let c = config(0x04, "");

    let mut request = JobRequest::new(Command::VerifyLockedConfig, Some(1));
    request.lock = true;
    let timing = Timing {
        max_verify_attempts: Some(1),
        ..timing()
    };
    let (result, _, _) = run(&bench, &c, &request, timing);
    assert_eq!(result.unwrap_err().to_string(), "Locked device found");
}

#[test]
fn test_generated_serials() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2104, OLD, 3);
    let c = config(0x04, "FlushBufferConfig { { 0003 } }");
    let mut request = JobRequest::new(Command::SetAndVerifyConfig, Some(3));
    request.serials = SerialSource::Generate;

    let (result, progress, _) = run(&bench, &c, &request, timing());
    result.unwrap();
    assert_eq!(progress.serials.len(), 3);
    for (slot, serial) in progress.serials.iter().enumerate() {
        assert_eq!(serial.len(), 32);
        assert!(serial.chars().all(|ch| ch.is_ascii_hexdigit()));
        let dev_serial = bench.with_chip(slot, |chip| {
            chip.get_field(rsmt_core::Field::SerialNumber(
                rsmt_core::StringEncoding::Ascii,
            ))
        });
        assert_eq!(dev_serial.unwrap().unwrap(), serial.as_bytes());
    }
}

#[test]
fn test_generated_serials_illegal_without_programming() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2104, OLD, 1);
    let c = config(0x04, "");
    let mut request = JobRequest::new(Command::VerifyConfig, Some(1));
    request.serials = SerialSource::Generate;

    let (result, _, _) = run(&bench, &c, &request, timing());
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(bench.total_opens(), 0);
}

#[test]
fn test_serial_list_must_match_count() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 2);
    let c = widget_config();
    let mut request = JobRequest::new(Command::SetAndVerifyConfig, Some(2));
    request.serials = serial_list(&["AA"]);
    let (result, _, _) = run(&bench, &c, &request, timing());
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Usage);

    request.serials = serial_list(&["AA", "AA"]);
    let (result, _, _) = run(&bench, &c, &request, timing());
    assert_eq!(
        result.unwrap_err().to_string(),
        "Identical serial numbers"
    );
    assert_eq!(bench.total_opens(), 0);
}

#[test]
fn test_cp2102n_program_verify_lock() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102nQfn24, OLD, 2);
    let image = rsmt_core::params::Cp2102nConfig::blank();
    let bytes: String = image
        .as_bytes()
        .iter()
        .map(|b| format!("{:02x} ", b))
        .collect();
    let c = config(0x21, &format!("Config {{ {{ {}}} }}", bytes));
    let mut request = JobRequest::new(Command::SetAndVerifyConfig, Some(2));
    request.serials = serial_list(&["N1", "N2"]);
    request.lock = true;

    let (result, progress, _) = run(&bench, &c, &request, timing());
    result.unwrap();
    assert_eq!(
        progress.events,
        ["programmed 2", "settling", "verified 2", "locked 2"]
    );
    assert!(bench.chip(0).unwrap().is_locked());
    assert!(bench.chip(1).unwrap().is_locked());

    // The locked batch still verifies when locked devices are accepted
    let mut request = JobRequest::new(Command::VerifyLockedConfig, Some(2));
    request.serials = serial_list(&["N2", "N1"]);
    let (result, _, _) = run(&bench, &c, &request, timing());
    result.unwrap();
}

#[test]
fn test_cp2102n_serials_need_config() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102nQfn28, OLD, 1);
    let c = config(0x20, "");
    let mut request = JobRequest::new(Command::SetConfig, Some(1));
    request.serials = serial_list(&["N1"]);

    let (result, _, _) = run(&bench, &c, &request, timing());
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(bench.total_opens(), 0);
}

#[test]
fn test_set_config_does_not_reset() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 1);
    let c = widget_config();
    let request = JobRequest::new(Command::SetConfig, Some(1));

    let (result, progress, _) = run(&bench, &c, &request, timing());
    result.unwrap();
    assert_eq!(progress.events, ["programmed 1"]);
    assert_eq!(bench.chip(0).unwrap().resets(), 0);
    assert_eq!(bench.chip(0).unwrap().vid_pid(), OLD);
}

#[test]
fn test_list_and_reset_visit_both_filters() {
    let bench = DummyBench::with_blank_chips(PartNumber::Cp2102, OLD, 1);
    bench.attach(DummyChip::blank(PartNumber::Cp2102, NEW));
    bench.attach(DummyChip::blank(PartNumber::Cp2104, OLD));
    let c = widget_config();

    let (result, progress, _) = run(&bench, &c, &JobRequest::new(Command::List, None), timing());
    result.unwrap();
    let vid_pids: Vec<VidPid> = progress.listing.iter().map(|d| d.vid_pid).collect();
    assert_eq!(vid_pids, [OLD, NEW]);

    let (result, progress, _) = run(&bench, &c, &JobRequest::new(Command::Reset, None), timing());
    result.unwrap();
    assert_eq!(progress.events, ["reset 2"]);
    assert_eq!(bench.chip(2).unwrap().resets(), 0);
    assert_eq!(bench.open_handles(), 0);
}
