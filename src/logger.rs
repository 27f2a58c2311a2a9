use std::io::Write;
use std::sync::OnceLock;

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::console::Style;

struct ChoreLogger;

impl Log for ChoreLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let sty = Style::new();
        let tag = match record.level() {
            Level::Error => sty.red("error"),
            Level::Warn => sty.yellow("warning"),
            Level::Info => sty.blue("notice"),
            Level::Debug | Level::Trace => sty.dim("debug"),
        };

        eprintln!("{tag}: {}", record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Initialize the global logger at the given level.
///
/// The logger is installed once per process; later calls only adjust the
/// level. A `RUST_LOG` level filter in the environment overrides `level`.
pub fn init(level: LevelFilter) {
    INSTALLED.get_or_init(|| {
        let _ = log::set_boxed_logger(Box::new(ChoreLogger));
    });

    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(level);
    log::set_max_level(filter);
}

/// Map verbose/quiet flags to a level filter. Verbose wins over quiet.
#[must_use]
pub fn level_for(verbose: bool, quiet: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else if quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_flags() {
        assert_eq!(level_for(false, false), LevelFilter::Info);
        assert_eq!(level_for(true, false), LevelFilter::Debug);
        assert_eq!(level_for(false, true), LevelFilter::Error);
        assert_eq!(level_for(true, true), LevelFilter::Debug);
    }
}
