//! `log` facade wired to the console (and therefore to serial).

use log::{LevelFilter, Log, Metadata, Record};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        crate::console::print_fmt(format_args!(
            "[{:>5}] {}\n",
            record.level(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

/// Install the logger. Called once, right after the console is up.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}
