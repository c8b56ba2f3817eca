//! CLI command implementations

pub mod config;
pub mod simulate;

use std::time::Duration;

/// Render a delay for tables; `Duration::MAX` reads as unbounded.
pub(crate) fn format_duration(duration: Duration) -> String {
    if duration == Duration::MAX {
        "unbounded".to_string()
    } else if duration.as_millis() < 10_000 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
