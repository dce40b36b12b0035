//! rsmt - manufacturing customization for CP210x USB bridges
//!
//! Reads a customization script and programs, verifies and locks a batch of
//! CP210x parts. The engine lives in `rsmt-core`; this binary selects the
//! operation from the command line, picks a transport and reports progress.
//!
//! # Transports
//!
//! - **USB** (default, `usb` feature) - real parts through `rsmt-cp210x`
//! - **Dummy** (`--dummy N`) - N emulated blank parts matching the
//!   configuration's filter, for rehearsing a run without hardware

mod cli;
mod commands;

use clap::{CommandFactory, Parser};
use cli::Cli;
use commands::Operation;
use rsmt_core::{Customization, Error, ErrorKind, JobRequest, Result, Timing};
use rsmt_dummy::DummyBench;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse_from(commands::expand_serial_args(std::env::args()));

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(&cli) {
        report(&e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let echo = cli.verbose > 0;
    let (command, path) = match commands::select_operation(cli)? {
        Operation::Check(path) => return commands::cmd_check(&path, echo),
        Operation::Job(command, path) => (command, path),
    };

    let request = commands::job_request(cli, command)?;
    let timing = match &cli.timing {
        Some(path) => Timing::from_toml_file(path)?,
        None => Timing::default(),
    };
    let customization = Customization::load(&path, echo)?;

    match cli.dummy {
        Some(count) => {
            log::info!(
                "using {} emulated {} devices at {}",
                count,
                customization.part,
                customization.filter
            );
            let bench = DummyBench::with_blank_chips(customization.part, customization.filter, count);
            commands::run_job(&bench, &customization, &request, timing)
        }
        None => run_usb(&customization, &request, timing),
    }
}

#[cfg(feature = "usb")]
fn run_usb(customization: &Customization, request: &JobRequest, timing: Timing) -> Result<()> {
    let transport = rsmt_cp210x::UsbTransport::new();
    commands::run_job(&transport, customization, request, timing)
}

#[cfg(not(feature = "usb"))]
fn run_usb(_customization: &Customization, _request: &JobRequest, _timing: Timing) -> Result<()> {
    Err(Error::Usage(
        "built without USB support; use --dummy <N> to rehearse".into(),
    ))
}

fn report(e: &Error) {
    match e.kind() {
        ErrorKind::Usage => {
            eprintln!("ERROR: {}", e);
            eprintln!();
            let _ = Cli::command().print_help();
        }
        ErrorKind::Syntax => eprintln!("ERROR: syntax: {}", e),
        ErrorKind::Customization => eprintln!("ERROR: Manufacturing process: {}", e),
        ErrorKind::Transport => eprintln!("ERROR: library: {}", e),
        ErrorKind::Internal => eprintln!("ERROR: {}", e),
    }
}
