use std::io::Write as _;
use std::sync::OnceLock;

static LOG_FILTER: OnceLock<env_filter::Filter> = OnceLock::new();

/// Initialize a simple stderr logger, mostly for tests.
///
/// `RUST_LOG` is used if set, otherwise `default_filter` is used, for example
/// `"pistonite_athread=debug"`. The syntax is the same as
/// [`env_logger`](https://docs.rs/env_logger/latest/env_logger/#enabling-logging).
///
/// Only the first call takes effect. If another logger is already installed,
/// this does nothing.
pub fn log_init(default_filter: &str) {
    let spec = match std::env::var("RUST_LOG") {
        Ok(value) if !value.is_empty() => value,
        _ => default_filter.to_string(),
    };
    let mut builder = env_filter::Builder::new();
    let filter = builder.parse(&spec).build();
    let log_level = filter.filter();
    if LOG_FILTER.set(filter).is_err() {
        return;
    }

    struct LogImpl;
    impl log::Log for LogImpl {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            match LOG_FILTER.get() {
                Some(filter) => filter.enabled(metadata),
                None => false,
            }
        }

        fn log(&self, record: &log::Record) {
            let Some(filter) = LOG_FILTER.get() else {
                return;
            };
            if !filter.matches(record) {
                return;
            }
            let thread = std::thread::current();
            let thread = thread.name().unwrap_or("<unnamed>");
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(
                stderr,
                "[{:<5}] [{thread}] {}",
                record.level(),
                record.args()
            );
        }

        fn flush(&self) {
            let _ = std::io::stderr().flush();
        }
    }

    if log::set_logger(&LogImpl).is_ok() {
        log::set_max_level(log_level);
    }
}
