//! Logging setup using the `log` facade and `env_logger` backend.
//!
//! Level precedence:
//!
//! 1. `RUST_LOG`, if set
//! 2. `--quiet` (errors only) or `-v`/`-vv` (debug/trace)
//! 3. info
//!
//! Per-file problems are logged at warn, state transitions (deletions,
//! restores, sweeps, batch completions) at info, per-file decisions at
//! debug and trace.
//!
//! ```rust,no_run
//! use safedupe::logging::init_logging;
//!
//! init_logging(1, false);
//! log::debug!("visible with -v");
//! ```

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Initialize logging from the CLI verbosity flags.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = env::var("RUST_LOG").is_ok();
    let level = determine_level(verbose, quiet);

    let mut builder = Builder::new();
    if from_env {
        builder.parse_default_env();
    } else {
        // Dependencies (ignore, jwalk) stay at warn even with -vv.
        builder
            .filter_level(level.min(LevelFilter::Warn))
            .filter_module(CRATE, level);
    }
    configure_format(&mut builder, verbose);

    if builder.try_init().is_err() {
        return;
    }
    if from_env {
        log::debug!("Logging initialized from RUST_LOG");
    } else {
        log::debug!("Logging initialized at level: {:?}", level);
    }
}

const CRATE: &str = env!("CARGO_PKG_NAME");

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Level and message; `-v` adds a timestamp and the emitting module.
fn configure_format(builder: &mut Builder, verbose: u8) {
    builder.format(move |buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        if verbose == 0 {
            return writeln!(buf, "{style}{level:<5}{style:#} {}", record.args());
        }
        let module = record
            .module_path()
            .map_or("?", |m| m.strip_prefix("safedupe::").unwrap_or(m));
        let timestamp = buf.timestamp_millis();
        writeln!(
            buf,
            "{timestamp} {style}{level:<5}{style:#} {module}: {}",
            record.args()
        )
    });
}
