use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeError {
    #[error("Invalid time of day: {0}")]
    InvalidHourMinute(String),

    #[error("Local time {0} does not exist in zone {1}")]
    NonexistentLocalTime(String, Tz),
}

/// Parse a wall-clock "HH:MM" string (unpadded hours accepted).
pub fn parse_hour_minute(value: &str) -> Result<NaiveTime, TimeError> {
    let invalid = || TimeError::InvalidHourMinute(value.to_string());

    let (hour_part, minute_part) = value.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour_part.parse().map_err(|_| invalid())?;
    let minute: u32 = minute_part.parse().map_err(|_| invalid())?;

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Combine a calendar date and "HH:MM" time of day, both read in the
/// operational timezone, into an absolute instant.
///
/// DST folds resolve to the earlier offset; a time inside a spring-forward
/// gap is rejected rather than shifted.
pub fn to_instant(date: NaiveDate, hour_minute: &str, tz: Tz) -> Result<DateTime<Utc>, TimeError> {
    let time = parse_hour_minute(hour_minute)?;
    let local = date.and_time(time);

    let resolved = match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => return Err(TimeError::NonexistentLocalTime(local.to_string(), tz)),
    };

    Ok(resolved.with_timezone(&Utc))
}

/// Midnight of the given calendar day in the operational timezone,
/// expressed as an absolute instant. This is the canonical `date` value
/// stored on appointments.
pub fn day_instant(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, TimeError> {
    to_instant(date, "00:00", tz)
}

/// Inverse of `to_instant`: the calendar date and zero-padded "HH:MM"
/// wall-clock time of the instant in the operational timezone.
pub fn to_display(instant: DateTime<Utc>, tz: Tz) -> (NaiveDate, String) {
    let local = instant.with_timezone(&tz);
    (local.date_naive(), local.format("%H:%M").to_string())
}

/// Hour of day of an instant in the operational timezone. Slot collision
/// checks bucket scheduled appointments by this value.
pub fn local_hour(instant: DateTime<Utc>, tz: Tz) -> u32 {
    instant.with_timezone(&tz).hour()
}
