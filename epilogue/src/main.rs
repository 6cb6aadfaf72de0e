//! `epilogue`
//!
//! Sends one job to a laser engraver, described by a JSON job ticket.

use std::{path::PathBuf, process::ExitCode};

use epilogue::{print_job, JobTicket};
use log::error;

/// Loads the ticket named on the command line and runs the job.
fn main() -> ExitCode {
    env_logger::init();

    let Some(ticket_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: epilogue <ticket.json>");
        return ExitCode::from(2);
    };

    let result = JobTicket::load(&ticket_path).and_then(|ticket| print_job(&ticket));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
