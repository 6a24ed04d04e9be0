//! Lifecycle log lines in the `YYYY-MM-DD HH:MM:SS [MODULE] Message` format.
//!
//! Per-request and per-frame logging goes through `tracing`; `wlog!` is for
//! the few startup and shutdown lines that must reach stderr even when no
//! subscriber is installed.

#[macro_export]
macro_rules! wlog {
    ($module:expr, $($arg:tt)*) => {{
        eprintln!("{}", $crate::util::logging::format_line(chrono::Local::now(), $module, &format!($($arg)*)));
    }};
}

/// Standardized module identifiers
pub const MAIN: &str = "MAIN";
pub const COMPOSITOR: &str = "COMPOSITOR";
pub const RUNTIME: &str = "RUNTIME";

pub fn format_line<Tz>(now: chrono::DateTime<Tz>, module: &str, message: &str) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{} [{}] {}", now.format("%Y-%m-%d %H:%M:%S"), module, message)
}
