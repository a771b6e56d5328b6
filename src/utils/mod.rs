//! Shared utilities.

pub mod decimal;

use chrono::Local;

/// Human-readable duration like "45s", "2m 30s" or "1h 15m".
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let (m, s) = (secs / 60, secs % 60);
        if s == 0 {
            format!("{m}m")
        } else {
            format!("{m}m {s}s")
        }
    } else {
        let (h, rem) = (secs / 3600, secs % 3600);
        let m = rem / 60;
        if m == 0 {
            format!("{h}h")
        } else {
            format!("{h}h {m}m")
        }
    }
}

/// Log line for timed waits, with the local wall-clock time of the next run.
pub fn wait_msg(secs: u64) -> String {
    let until = Local::now() + chrono::Duration::seconds(secs as i64);
    format!(
        "Sleeping for {}, next run at {}",
        format_duration(secs),
        until.format("%H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(60), "1m");
        assert_eq!(format_duration(150), "2m 30s");
        assert_eq!(format_duration(3600), "1h");
        assert_eq!(format_duration(4500), "1h 15m");
    }

    #[test]
    fn test_wait_msg_mentions_duration() {
        assert!(wait_msg(90).contains("1m 30s"));
    }
}
