use crate::cli::cli;
use colored::Colorize;
use log::LevelFilter;
use std::process::ExitCode;

mod cli;
mod config;
mod error;
mod install;
mod launch;
mod preset;
mod setup;
mod templates;
mod utils;

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .format_timestamp(None)
        .format_target(false)
        .init();

    match cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("\n{} {}", "Exiting:".bright_red().bold(), err);
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                println!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
