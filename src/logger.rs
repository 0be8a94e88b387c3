use std::io::Write;

use chrono::prelude::*;
use log::{LevelFilter, Metadata, Record, SetLoggerError};

const TARGET: &str = "addon_index";

pub struct Logger;

static LOGGER: Logger = Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with(TARGET)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut target = record.target();
        if target.starts_with("addon_index::") {
            target = &target[TARGET.len() + 2..];
        }

        let stderr = std::io::stderr();
        let mut out = stderr.lock();

        let _ = writeln!(
            out,
            "{} {:<5} [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            target,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);

    Ok(())
}
