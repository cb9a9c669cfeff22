//! Date and time parsing for literal cell input.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse ISO-like dates (`2024-03-01`, `2024-03-01 08:30`, `03/01/2024`).
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    // Cheap reject before trying every format.
    if trimmed.len() < 8 || !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Parse `H:MM` or `H:MM:SS` (hours unbounded, optional leading `-`).
pub fn parse_duration(text: &str) -> Option<TimeDelta> {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let parts: Vec<&str> = body.split(':').collect();
    if !(2..=3).contains(&parts.len())
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let hours: i64 = parts[0].parse().ok()?;
    let minutes: i64 = parts[1].parse().ok()?;
    let seconds: i64 = match parts.get(2) {
        Some(s) => s.parse().ok()?,
        None => 0,
    };
    if minutes >= 60 || seconds >= 60 || parts[1].len() != 2 {
        return None;
    }
    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?;
    TimeDelta::try_seconds(if negative { -total } else { total })
}

/// Build a date from possibly out-of-range month/day parts, rolling over the
/// way spreadsheet DATE() does (month 13 is January of the next year).
pub fn date_from_parts(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    let months = year.checked_mul(12)?.checked_add(month - 1)?;
    let y = i32::try_from(months.div_euclid(12)).ok()?;
    let m = u32::try_from(months.rem_euclid(12) + 1).ok()?;
    let first = NaiveDate::from_ymd_opt(y, m, 1)?;
    first.checked_add_signed(TimeDelta::try_days(day - 1)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_forms() {
        let d = parse_datetime("2024-03-01").unwrap();
        assert_eq!(d.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let dt = parse_datetime("2024-03-01 08:30").unwrap();
        assert_eq!(dt.time(), NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert!(parse_datetime("12345").is_none());
        assert!(parse_datetime("hello world").is_none());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1:30"), TimeDelta::try_minutes(90));
        assert_eq!(parse_duration("-0:00:05"), TimeDelta::try_seconds(-5));
        assert_eq!(parse_duration("36:00:00"), TimeDelta::try_hours(36));
        assert!(parse_duration("1:5").is_none());
        assert!(parse_duration("1:75").is_none());
        assert!(parse_duration("a:00").is_none());
    }

    #[test]
    fn test_date_from_parts_rolls_over() {
        assert_eq!(
            date_from_parts(2023, 13, 1),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(
            date_from_parts(2024, 3, 0),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }
}
