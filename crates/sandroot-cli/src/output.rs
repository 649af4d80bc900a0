//! Human-facing progress lines on stderr.

use std::time::Duration;

const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Prints a right-aligned action word followed by its detail.
#[allow(clippy::print_stderr)]
pub fn status(action: &str, detail: &str) {
    eprintln!("{BOLD}{GREEN}{action:>10}{RESET} {detail}");
}

/// Formats an optional byte count, e.g. "12.5 MiB" or "unknown size".
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_size(bytes: Option<u64>) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    let Some(bytes) = bytes else {
        return "unknown size".to_owned();
    };
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Formats an elapsed duration with millisecond precision below a minute.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}.{:03}s", elapsed.subsec_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_handles_unknown() {
        assert_eq!(format_size(None), "unknown size");
    }

    #[test]
    fn format_size_scales_units() {
        assert_eq!(format_size(Some(512)), "512 B");
        assert_eq!(format_size(Some(2048)), "2.0 KiB");
        assert_eq!(format_size(Some(134_217_728)), "128.0 MiB");
        assert_eq!(format_size(Some(3 * 1024 * 1024 * 1024)), "3.0 GiB");
    }

    #[test]
    fn format_elapsed_switches_to_minutes() {
        assert_eq!(format_elapsed(Duration::from_millis(1_250)), "1.250s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m05s");
    }
}
