use chrono::{DateTime, DurationRound, TimeDelta, Utc};

pub type Timestamp = DateTime<Utc>;
pub type Timeframe = TimeDelta;

/// Granularity of the tick series.
pub const TIMESTAMP_UNIT: TimeDelta = TimeDelta::minutes(1);

pub fn now() -> Timestamp {
    Utc::now()
}

/// Truncates a timestamp to the start of its minute.
pub fn floor_to_minute(ts: Timestamp) -> Timestamp {
    ts.duration_trunc(TIMESTAMP_UNIT).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn floors_seconds_and_subseconds() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap() + TimeDelta::milliseconds(789);
        let floored = floor_to_minute(ts);
        assert_eq!(floored, Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 0).unwrap());
    }

    #[test]
    fn already_rounded_is_unchanged() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(floor_to_minute(ts), ts);
    }
}
