//! CLI command implementations
//!
//! Every invocation names exactly one configuration file. The option it is
//! given to selects either a [`Job`] command or the offline configuration
//! check.

mod check;
mod progress;

use std::path::PathBuf;

use rsmt_core::{
    Command, Customization, Error, Job, JobRequest, Result, SerialSource, Timing, Transport,
};

use crate::cli::Cli;

pub use check::cmd_check;
pub use progress::ConsoleProgress;

/// What the configuration file option asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Parse and print the configuration
    Check(PathBuf),
    /// Run a job against devices
    Job(Command, PathBuf),
}

/// Pick the operation from the configuration file options
pub fn select_operation(cli: &Cli) -> Result<Operation> {
    let candidates = [
        (Command::SetConfig, &cli.set_config),
        (Command::VerifyConfig, &cli.verify_config),
        (Command::VerifyLockedConfig, &cli.verify_locked_config),
        (Command::SetAndVerifyConfig, &cli.set_and_verify_config),
        (Command::Reset, &cli.reset),
        (Command::List, &cli.list),
    ];
    let mut selected: Vec<Operation> = candidates
        .into_iter()
        .filter_map(|(command, path)| path.clone().map(|p| Operation::Job(command, p)))
        .collect();
    if let Some(path) = &cli.check_config {
        selected.push(Operation::Check(path.clone()));
    }

    match selected.len() {
        1 => Ok(selected.remove(0)),
        _ => Err(Error::Usage(
            "command line must specify 1 configuration file".into(),
        )),
    }
}

/// Rewrite `--serial-nums { s1 s2 ... }` into one attached value per word
///
/// Every word up to the closing brace belongs to the list, including words
/// that look like options.
pub fn expand_serial_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    let mut out = Vec::new();
    let mut args = args.into_iter().peekable();
    while let Some(arg) = args.next() {
        if arg != "--serial-nums" || args.peek().map(String::as_str) != Some("{") {
            out.push(arg);
            continue;
        }
        for word in args.by_ref() {
            let closing = word == "}";
            out.push(format!("--serial-nums={}", word));
            if closing {
                break;
            }
        }
    }
    out
}

/// Build the job request for `command` from the remaining options
pub fn job_request(cli: &Cli, command: Command) -> Result<JobRequest> {
    let serials = if cli.serial_nums.is_empty() {
        SerialSource::None
    } else {
        SerialSource::from_args(&cli.serial_nums)?
    };
    Ok(JobRequest {
        command,
        device_count: cli.device_count,
        serials,
        lock: cli.lock,
    })
}

/// Run `request` over `transport`, printing progress to the console
pub fn run_job<T: Transport>(
    transport: &T,
    customization: &Customization,
    request: &JobRequest,
    timing: Timing,
) -> Result<()> {
    log::info!(
        "{} devices under {}: {:?}",
        customization.part,
        customization.filter,
        request.command
    );
    let mut progress = ConsoleProgress::new();
    Job::new(transport, customization)
        .with_timing(timing)
        .run(request, &mut progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("rsmt")
            .chain(args.iter().copied())
            .map(String::from);
        Cli::try_parse_from(expand_serial_args(argv)).unwrap()
    }

    #[test]
    fn test_single_config_file_required() {
        let err = select_operation(&parse(&["--device-count", "2"])).unwrap_err();
        assert_eq!(err.to_string(), "command line must specify 1 configuration file");

        let cli = parse(&["--set-config", "a.txt", "--verify-config", "b.txt"]);
        assert!(select_operation(&cli).is_err());
    }

    #[test]
    fn test_operation_selected_by_option() {
        let cli = parse(&["--set-and-verify-config", "cfg.txt", "--device-count", "4"]);
        assert_eq!(
            select_operation(&cli).unwrap(),
            Operation::Job(Command::SetAndVerifyConfig, PathBuf::from("cfg.txt"))
        );

        let cli = parse(&["--check-config", "cfg.txt"]);
        assert_eq!(
            select_operation(&cli).unwrap(),
            Operation::Check(PathBuf::from("cfg.txt"))
        );
    }

    #[test]
    fn test_serial_list_and_lock() {
        let cli = parse(&[
            "--verify-config",
            "cfg.txt",
            "--device-count",
            "2",
            "--serial-nums",
            "{",
            "A1",
            "A2",
            "}",
            "--lock",
        ]);
        let request = job_request(&cli, Command::VerifyConfig).unwrap();
        assert_eq!(request.device_count, Some(2));
        assert!(request.lock);
        assert_eq!(
            request.serials,
            SerialSource::List(vec!["A1".into(), "A2".into()])
        );
    }

    #[test]
    fn test_serial_list_accepts_option_like_words() {
        let cli = parse(&[
            "--set-and-verify-config",
            "cfg.txt",
            "--serial-nums",
            "{",
            "-7",
            "--B",
            "}",
            "--lock",
            "--device-count",
            "2",
        ]);
        let request = job_request(&cli, Command::SetAndVerifyConfig).unwrap();
        assert_eq!(
            request.serials,
            SerialSource::List(vec!["-7".into(), "--B".into()])
        );
        assert!(request.lock);
        assert_eq!(request.device_count, Some(2));
    }

    #[test]
    fn test_serial_guid() {
        let cli = parse(&["--set-config", "cfg.txt", "--serial-nums", "GUID"]);
        let request = job_request(&cli, Command::SetConfig).unwrap();
        assert_eq!(request.serials, SerialSource::Generate);
    }

    #[test]
    fn test_serial_list_needs_braces() {
        let cli = parse(&["--set-config", "cfg.txt", "--serial-nums", "A1"]);
        let err = job_request(&cli, Command::SetConfig).unwrap_err();
        assert_eq!(err.kind(), rsmt_core::ErrorKind::Usage);
    }
}
