//! picflash - a PIC programmer for ArduPIC serial adapters
//!
//! Loads an Intel HEX image, checks it against the target chip and writes
//! (or with `--verify` only checks) it through an ArduPIC adapter.
//!
//! # Architecture
//!
//! - `picflash-core` parses HEX images and describes supported chips
//! - `picflash-ardupic` speaks the adapter's line protocol over any
//!   [`Transport`](picflash_ardupic::Transport)
//! - `picflash-dummy` emulates an adapter with a chip attached, for testing
//!   without hardware

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::Cli;
use commands::program::{self, IndicatifProgress};
use picflash_ardupic::{ArduPic, ArduPicError};
use picflash_core::{Chip, HexOptions};
use programmers::SerialOverrides;

/// Default log filter for a `--verbose` count; `RUST_LOG` still wins
fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn logger_builder(env: env_logger::Env<'_>, verbose: u8) -> env_logger::Builder {
    env_logger::Builder::from_env(env.default_filter_or(default_log_filter(verbose)))
}

fn main() {
    let cli = Cli::parse();

    // Initialize logger at the requested verbosity
    logger_builder(env_logger::Env::default(), cli.verbose).init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.list_programmers {
        commands::list_programmers();
        return Ok(());
    }
    if cli.list_chips {
        commands::list_chips();
        return Ok(());
    }
    if cli.read {
        return Err(ArduPicError::ReadNotSupported.into());
    }

    let chip = Chip::find(&cli.cpu)?;
    let path = cli.file.as_deref().ok_or("no HEX file given")?;
    let options = HexOptions::default().with_strict_checksum(cli.strict_checksum);
    let image = program::load_image(path, chip, options)?;
    let timing = program::timing_from_args(&cli.timing)?;

    let overrides = SerialOverrides {
        port: cli.port.clone(),
        baud: cli.baud,
        timeout_ms: cli.timeout,
    };
    let transport = programmers::open_programmer(&cli.programmer, &overrides)?;
    let mut pic = ArduPic::with_timing(transport, timing);

    log::info!(
        "{} pic{} ({} words)",
        if cli.verify { "Verifying" } else { "Programming" },
        chip.name,
        image.word_count() + 1
    );

    let mut progress = IndicatifProgress::new();
    if let Err(e) = program::run_program(&mut pic, &image, cli.verify, &mut progress) {
        progress.abandon();
        return Err(e.into());
    }

    println!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Log, Metadata};

    fn test_logger(verbose: u8) -> env_logger::Logger {
        // Read the filter from a variable nobody sets so RUST_LOG cannot interfere
        let env = env_logger::Env::default().filter("PICFLASH_TEST_UNSET_LOG");
        logger_builder(env, verbose).build()
    }

    fn enabled(logger: &env_logger::Logger, level: Level) -> bool {
        let metadata = Metadata::builder()
            .level(level)
            .target("picflash_ardupic::device")
            .build();
        logger.enabled(&metadata)
    }

    #[test]
    fn test_default_is_info() {
        let logger = test_logger(0);
        assert_eq!(logger.filter(), LevelFilter::Info);
        assert!(enabled(&logger, Level::Info));
        assert!(!enabled(&logger, Level::Debug));
    }

    #[test]
    fn test_verbose_enables_debug() {
        let logger = test_logger(1);
        assert_eq!(logger.filter(), LevelFilter::Debug);
        assert!(enabled(&logger, Level::Debug));
        assert!(!enabled(&logger, Level::Trace));
    }

    #[test]
    fn test_double_verbose_enables_trace() {
        let logger = test_logger(2);
        assert_eq!(logger.filter(), LevelFilter::Trace);
        assert!(enabled(&logger, Level::Trace));
    }
}
