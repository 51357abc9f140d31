use chrono::prelude::*;
use log::{LevelFilter, Metadata, Record};

const CRATE_NAME: &str = "tagindex";
const TARGET_PREFIX: &str = "tagindex::";

/// Module part of a record target, or `None` for other crates.
fn module_of(target: &str) -> Option<&str> {
    if target == CRATE_NAME {
        Some("main")
    } else {
        target.strip_prefix(TARGET_PREFIX)
    }
}

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Some(module) = module_of(record.target()) {
            eprintln!(
                "{} {:05} [{}] {}",
                Local::now().format("%F %T"),
                record.level(),
                module,
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;

/// Installs the stderr logger. Calling it twice is harmless, the second
/// registration is ignored.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
