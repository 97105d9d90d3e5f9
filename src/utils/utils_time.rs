use std::time::{Duration, SystemTime, UNIX_EPOCH};
use chrono::{DateTime, Utc};

/// Milliseconds since the unix epoch.
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn format_time(ts: u64) -> String {
    let d = UNIX_EPOCH + Duration::from_millis(ts);
    let datetime = DateTime::<Utc>::from(d);
    datetime.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_epoch() {
        assert_eq!(format_time(0), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_clock_moves_forward() {
        let a = current_time_ms();
        std::thread::sleep(Duration::from_millis(5));
        let b = current_time_ms();
        assert!(b >= a + 5);
    }
}
