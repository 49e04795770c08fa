use log::{Level, LevelFilter};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let tag = match record.level() {
            Level::Error => "Error",
            Level::Warn => "Warn",
            Level::Info => "Info",
            Level::Debug => "Debug",
            Level::Trace => "Trace",
        };

        eprintln!("[{}] {}", tag, record.args());
    }

    fn flush(&self) {}
}

/// Maps the number of `-d` flags to a level filter.
pub fn level(occurrences: u8) -> LevelFilter {
    match occurrences {
        0 => LevelFilter::Off,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init(filter: LevelFilter) {
    // Result is ignored since the binary calls init at most once.
    let _ = log::set_logger(&LOGGER).map(|_| log::set_max_level(filter));
}
