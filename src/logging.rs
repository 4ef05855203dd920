//! Logger initialization for the binaries.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initializes the logger with elapsed time in each message.
///
/// The level is Info if `verbose` is set and Warn otherwise; `RUST_LOG` overrides it.
/// Messages go to stderr as `[HH:MM:SS] LEVEL: message`.
/// Calling this again has no effect.
pub fn init_logger(verbose: bool) {
    START_TIME.get_or_init(Instant::now);

    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            let elapsed = START_TIME.get_or_init(Instant::now).elapsed().as_secs();
            writeln!(
                buf,
                "[{:02}:{:02}:{:02}] {}: {}",
                elapsed / 3600,
                (elapsed % 3600) / 60,
                elapsed % 60,
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .try_init();
}
