//! Terminal output helpers.

use console::style;
use std::fmt::Display;
use std::time::Duration;

/// Print a section heading
pub fn heading(text: &str) {
    println!("{}", style(text).bold());
}

/// Print an indented `name: value` line
pub fn field(name: &str, value: impl Display) {
    println!("  {:<16} {}", style(format!("{name}:")).dim(), value);
}

/// Print a success line
pub fn success(text: impl Display) {
    println!("{} {}", style("ok").green().bold(), text);
}

/// Print a failure line
pub fn failure(text: impl Display) {
    println!("{} {}", style("failed").red().bold(), text);
}

/// Format a duration using the largest whole unit
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs % DAY == 0 {
        format!("{}d", secs / DAY)
    } else if secs % HOUR == 0 {
        format!("{}h", secs / HOUR)
    } else if secs % MINUTE == 0 {
        format!("{}m", secs / MINUTE)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(15 * 60)), "15m");
        assert_eq!(format_duration(Duration::from_secs(2 * 3600)), "2h");
        assert_eq!(format_duration(Duration::from_secs(5 * 86_400)), "5d");
    }
}
