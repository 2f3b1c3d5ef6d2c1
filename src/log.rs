use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::sync::RwLock;

/// Default sink, drops every record until a real logger is installed.
struct NopLogger;

impl Log for NopLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        false
    }

    fn log(&self, _: &Record) {}

    fn flush(&self) {}
}

/// Logger switch for embedding frontends.
///
/// The engine logs through the `log` facade with `target: "debugger"`, a
/// frontend decides where records go by installing its own sink at runtime
/// (and may replace it later, for example when a UI takes over the terminal).
pub struct SwitchableLogger {
    sink: RwLock<Box<dyn Log>>,
}

pub static LOGGER_SWITCHER: Lazy<SwitchableLogger> = Lazy::new(|| SwitchableLogger {
    sink: RwLock::new(Box::new(NopLogger)),
});

impl SwitchableLogger {
    /// Register this switcher as the global logger. Must be called once,
    /// before any other logger is installed.
    pub fn init(&'static self) {
        log::set_logger(self).expect("infallible");
        log::set_max_level(LevelFilter::Off);
    }

    /// Replace the current sink and reset the global maximum log level.
    pub fn switch<L: Log + 'static>(&self, sink: L, level_filter: LevelFilter) {
        *self.sink.write().expect("poisoned") = Box::new(sink);
        log::set_max_level(level_filter);
    }
}

impl Log for SwitchableLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.sink.read().expect("poisoned").enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.sink.read().expect("poisoned").log(record)
    }

    fn flush(&self) {
        self.sink.read().expect("poisoned").flush()
    }
}
