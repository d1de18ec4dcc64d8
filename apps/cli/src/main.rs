//! formpipe CLI: batch-fill PDF forms from spreadsheet rows.
//!
//! Reads one record per spreadsheet, maps it through a field template, hands
//! it to an external form-filling tool and files the results away.

mod commands;

use std::process::ExitCode;

use clap::Parser;

use commands::Cli;

fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: failed to install error reporter: {e}");
    }
    let cli = Cli::parse();

    match commands::run(cli) {
        Ok(code) => code,
        Err(report) => {
            eprintln!("Error: {report:?}");
            ExitCode::from(commands::exit_status_for(&report))
        }
    }
}
