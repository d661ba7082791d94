//! `proofreader` binary: serve a proofreading session or run the simulator.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Builder;

use proofreader::cli::args::ProofreaderArgs;
use proofreader::cli::commands::execute_command;

fn main() -> ExitCode {
    let args = ProofreaderArgs::parse();

    Builder::new()
        .filter_level(args.log_level())
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    match execute_command(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("proofreader: {e}");
            ExitCode::FAILURE
        }
    }
}
