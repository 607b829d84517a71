//! Utility functions and macros for debugging

/// Debugging macro that prints the current time (ms since the epoch) and the thread name,
/// along with the provided message. Integrates with the tracing framework.
#[macro_export]
macro_rules! tdbg {
    ($($arg:tt)*) => {{
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        tracing::debug!("[{:>13} ms][{}] {}", ms, std::thread::current().name().unwrap_or("unnamed"), format_args!($($arg)*));
    }};
}
