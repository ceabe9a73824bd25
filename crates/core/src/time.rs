use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, TracegraphError};

/// Accepts RFC3339 timestamps or a relative duration such as `15m` meaning
/// "that long before `now`".
pub fn parse_time_or_relative(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        return Ok(now
            - chrono::Duration::from_std(duration).map_err(|e| {
                TracegraphError::Parse(format!("failed to parse duration to chrono: {e}"))
            })?);
    }

    Err(TracegraphError::Parse(format!(
        "expected RFC3339 time or duration, got {input}"
    )))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| TracegraphError::Parse(format!("invalid duration {input}: {e}")))
}
