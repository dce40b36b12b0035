//! Console progress reporting

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rsmt_core::{DeviceInfo, Error, JobProgress, SerialNumberSet};

/// Prints job milestones to stdout, with a spinner while devices re-enumerate
#[derive(Default)]
pub struct ConsoleProgress {
    spinner: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn spinner(&mut self) -> &ProgressBar {
        self.spinner.get_or_insert_with(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        })
    }

    fn clear_spinner(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

impl JobProgress for ConsoleProgress {
    fn reset_done(&mut self, count: usize) {
        println!("reset {} devices: OK", count);
    }

    fn listing(&mut self, devices: &[DeviceInfo]) {
        println!("--- devices ---");
        for device in devices {
            println!("{}", device);
        }
    }

    fn serial_numbers(&mut self, serials: &SerialNumberSet) {
        println!("--- new serial numbers ---");
        for serial in serials.iter() {
            println!("{}", String::from_utf8_lossy(serial));
        }
    }

    fn programmed(&mut self, count: usize) {
        println!("programmed {} devices: OK", count);
    }

    fn waiting(&mut self, found: u32, needed: u32) {
        self.spinner().set_message(format!(
            "waiting for devices to re-enumerate ({}/{})",
            found, needed
        ));
    }

    fn settling(&mut self, duration: Duration) {
        self.spinner()
            .set_message(format!("settling for {} ms", duration.as_millis()));
        self.spinner().tick();
    }

    fn verified(&mut self, count: usize) {
        self.clear_spinner();
        println!("verified {} devices: OK", count);
    }

    fn locked(&mut self, count: usize) {
        println!("locked {} devices: OK", count);
    }

    fn retrying(&mut self, error: &Error) {
        self.clear_spinner();
        log::debug!("verification failed: {}", error);
        println!("Retrying verification...");
    }
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        self.clear_spinner();
    }
}
