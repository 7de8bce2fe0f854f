use core::fmt::Write;

use ksync::SpinLock;
use log::{Level, Log, Metadata, Record, SetLoggerError};

pub struct KernelLogger<W> {
    pub initial_log_level: Level,
    console: SpinLock<Option<W>>,
}

impl<W: Write + Send> KernelLogger<W> {
    pub const fn new(max_log_level: Level) -> Self {
        Self {
            initial_log_level: max_log_level,
            console: SpinLock::new(None),
        }
    }

    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self).map(|_| log::set_max_level(self.initial_log_level.to_level_filter()))
    }

    /// Start writing records to `console`, returning the previously attached console if there was one
    pub fn attach_console(&self, console: W) -> Option<W> {
        self.console.lock().replace(console)
    }

    pub fn detach_console(&self) -> Option<W> {
        self.console.lock().take()
    }

    /// Run `f` on the attached console, e.g. to reconfigure it once more is known about the hardware
    pub fn with_console<R>(&self, f: impl FnOnce(&mut W) -> R) -> Option<R> {
        self.console.lock().as_mut().map(f)
    }

    pub fn has_console(&self) -> bool {
        self.console.lock().is_some()
    }

    fn write_record(&self, record: &Record) {
        // a trap handler may interrupt a context that is currently logging, dropping the record is the only
        // option that can not deadlock
        let Some(mut console) = self.console.try_lock() else {
            return;
        };
        if let Some(console) = console.as_mut() {
            // there is nowhere to report a failing console to
            let _ = write!(
                console,
                "{:<5} {}: {}\r\n",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }
}

impl<W: Write + Send> Log for KernelLogger<W> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.write_record(record)
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use std::string::String;

    fn record_to(logger: &KernelLogger<String>, level: Level, message: core::fmt::Arguments) {
        logger.write_record(
            &Record::builder()
                .level(level)
                .target("console_boot::boot")
                .args(message)
                .build(),
        );
    }

    #[test]
    fn records_before_attach_are_dropped() {
        let logger = KernelLogger::<String>::new(Level::Info);
        record_to(&logger, Level::Info, format_args!("lost"));
        assert!(!logger.has_console());

        logger.attach_console(String::new());
        record_to(&logger, Level::Info, format_args!("Got TL_CLK: {}", 33_330_000));
        assert_eq!(
            logger.detach_console().unwrap(),
            "INFO  console_boot::boot: Got TL_CLK: 33330000\r\n"
        );
    }

    #[test]
    fn record_is_dropped_while_console_is_busy() {
        let logger = KernelLogger::<String>::new(Level::Info);
        logger.attach_console(String::new());
        {
            let _busy = logger.console.try_lock().unwrap();
            record_to(&logger, Level::Error, format_args!("from trap"));
        }
        assert_eq!(logger.detach_console().unwrap(), "");
    }

    #[test]
    fn attached_console_can_be_reconfigured() {
        let logger = KernelLogger::<String>::new(Level::Info);
        assert_eq!(logger.with_console(|console| console.len()), None);
        logger.attach_console(String::from("boot"));
        assert_eq!(logger.with_console(|console| console.len()), Some(4));
    }
}
