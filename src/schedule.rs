use std::str::FromStr;

use chrono::{DateTime, Duration, Local};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use cron::Schedule;

/// Parse a five-field cron expression from the layout file. The cron crate
/// wants a seconds field, so one is prepended.
pub fn parse(expr: &str) -> Result<Schedule> {
    Schedule::from_str(&format!("0 {expr}"))
        .map_err(|e| eyre!("invalid cron expression '{expr}': {e}"))
}

/// Check whether a schedule is due at `now`.
///
/// The next fire time is anchored at `now - offset` rather than `now`:
/// anchored at `now` the next fire would always be strictly in the future and
/// nothing would ever come due. With the offset equal to the poll tick (one
/// minute) the top of each period registers as due on exactly one tick.
/// The first check after startup passes a whole day to force a catch-up poll.
pub fn is_due(schedule: &Schedule, now: DateTime<Local>, offset: Duration) -> bool {
    schedule
        .after(&(now - offset))
        .next()
        .is_some_and(|next| next <= now)
}

/// The offset used on every regular poll tick
pub fn tick_offset() -> Duration {
    Duration::minutes(1)
}

/// The offset used for the forced poll right after startup
pub fn startup_offset() -> Duration {
    Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32, sec: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, hour, min, sec).unwrap()
    }

    #[test]
    fn test_startup_offset_always_due() {
        // any schedule fires within a day, so the catch-up poll hits everything
        for expr in ["*/5 * * * *", "0 0 * * *", "30 14 * * *"] {
            let schedule = parse(expr).unwrap();
            assert!(
                is_due(&schedule, at(3, 7, 12), startup_offset()),
                "{expr} not due at startup"
            );
        }
    }

    #[test]
    fn test_due_exactly_once_per_period() {
        let schedule = parse("*/5 * * * *").unwrap();

        // the boundary tick registers as due
        assert!(is_due(&schedule, at(10, 5, 0), tick_offset()));
        // repeating the same check does not change the answer
        assert!(is_due(&schedule, at(10, 5, 0), tick_offset()));
        // the following ticks inside the period do not fire again
        assert!(!is_due(&schedule, at(10, 6, 0), tick_offset()));
        assert!(!is_due(&schedule, at(10, 9, 0), tick_offset()));
        // the next period boundary fires
        assert!(is_due(&schedule, at(10, 10, 0), tick_offset()));
    }

    #[test]
    fn test_not_due_between_periods() {
        let schedule = parse("0 0 * * *").unwrap();
        assert!(!is_due(&schedule, at(10, 2, 0), tick_offset()));
    }

    #[test]
    fn test_invalid_expression_rejected() {
        assert!(parse("not a cron line").is_err());
        assert!(parse("*/5 * * *").is_err());
    }
}
