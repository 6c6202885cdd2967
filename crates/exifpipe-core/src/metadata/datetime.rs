//! EXIF timestamp parsing and the timezone offset-less values are read in.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Patterns carrying an explicit UTC offset, tried first.
const OFFSET_PATTERNS: &[&str] = &["%Y:%m:%d %H:%M:%S%.f%:z", "%Y:%m:%d %H:%M:%S%:z"];

/// Offset-less patterns, interpreted in the configured timezone.
const NAIVE_PATTERNS: &[&str] = &["%Y:%m:%d %H:%M:%S%.f", "%Y:%m:%d %H:%M:%S"];

/// Zone used for timestamps that carry no offset of their own.
///
/// Named and local zones are resolved per timestamp, so a summer photo and
/// a winter photo get their own daylight-saving offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
    Local,
    Fixed(FixedOffset),
    Named(Tz),
}

impl Timezone {
    pub fn utc() -> Self {
        Timezone::Fixed(Utc.fix())
    }

    /// Parse "local", "UTC", a "+HH:MM" / "-HHMM" offset, or an IANA zone
    /// name such as "Asia/Singapore".
    pub fn parse(tz: &str) -> Option<Self> {
        let tz = tz.trim();
        match tz.to_ascii_lowercase().as_str() {
            "" | "local" => return Some(Timezone::Local),
            "utc" | "z" => return Some(Self::utc()),
            _ => {}
        }
        if tz.starts_with(['+', '-']) {
            return parse_offset(tz).map(Timezone::Fixed);
        }
        tz.parse::<Tz>().ok().map(Timezone::Named)
    }

    /// Place a wall-clock time in this zone. An ambiguous time takes the
    /// earlier instant; a time skipped by a DST jump has none.
    pub fn localize(&self, naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            Timezone::Local => Local
                .from_local_datetime(naive)
                .earliest()
                .map(|ts| ts.with_timezone(&ts.offset().fix())),
            Timezone::Fixed(offset) => offset.from_local_datetime(naive).single(),
            Timezone::Named(tz) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|ts| ts.with_timezone(&ts.offset().fix())),
        }
    }
}

/// "+HH:MM" or "-HHMM".
fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let (sign, rest) = match tz.as_bytes().first() {
        Some(b'+') => (1, &tz[1..]),
        Some(b'-') => (-1, &tz[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parse an EXIF-style `YYYY:MM:DD HH:MM:SS[.fff][+HH:MM]` timestamp.
///
/// The first matching pattern wins. Values without an offset are placed in
/// `zone`. A trailing `Z` is read as `+00:00`.
pub fn parse_timestamp(value: &str, zone: &Timezone) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    let zulu;
    let value = match value.strip_suffix('Z') {
        Some(rest) => {
            zulu = format!("{rest}+00:00");
            zulu.as_str()
        }
        None => value,
    };

    for pattern in OFFSET_PATTERNS {
        if let Ok(ts) = DateTime::parse_from_str(value, pattern) {
            return Some(ts);
        }
    }
    for pattern in NAIVE_PATTERNS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, pattern) {
            return zone.localize(&naive);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn utc() -> Timezone {
        Timezone::utc()
    }

    fn offset_hours(ts: DateTime<FixedOffset>) -> i32 {
        ts.offset().local_minus_utc() / 3600
    }

    #[test]
    fn test_plain_exif_timestamp_uses_configured_zone() {
        let nine = Timezone::parse("+09:00").unwrap();
        let ts = parse_timestamp("2020:01:01 10:00:00", &nine).unwrap();
        assert_eq!(offset_hours(ts), 9);
        assert_eq!((ts.year(), ts.hour()), (2020, 10));
    }

    #[test]
    fn test_fractional_seconds_and_offset() {
        let ts = parse_timestamp("2021:06:30 23:59:58.25+02:00", &utc()).unwrap();
        assert_eq!(offset_hours(ts), 2);
        assert_eq!(ts.nanosecond(), 250_000_000);

        let ts = parse_timestamp("2021:06:30 23:59:58.5", &utc()).unwrap();
        assert_eq!(ts.nanosecond(), 500_000_000);
    }

    #[test]
    fn test_offset_without_fraction_and_zulu() {
        let ts = parse_timestamp("2021:06:30 12:00:00-05:00", &utc()).unwrap();
        assert_eq!(offset_hours(ts), -5);

        let ts = parse_timestamp("2021:06:30 12:00:00Z", &utc()).unwrap();
        assert_eq!(offset_hours(ts), 0);
    }

    #[test]
    fn test_unparseable_values() {
        assert!(parse_timestamp("0000:00:00 00:00:00", &utc()).is_none());
        assert!(parse_timestamp("2020-01-01", &utc()).is_none());
        assert!(parse_timestamp("yesterday", &utc()).is_none());
    }

    #[test]
    fn test_timezone_parse_variants() {
        assert_eq!(Timezone::parse("UTC"), Some(utc()));
        assert_eq!(Timezone::parse("local"), Some(Timezone::Local));
        assert_eq!(Timezone::parse(""), Some(Timezone::Local));
        assert_eq!(
            Timezone::parse("-0530"),
            FixedOffset::east_opt(-(5 * 3600 + 30 * 60)).map(Timezone::Fixed)
        );
        assert_eq!(
            Timezone::parse("Asia/Singapore"),
            Some(Timezone::Named(chrono_tz::Asia::Singapore))
        );
        assert!(Timezone::parse("+9").is_none());
        assert!(Timezone::parse("Mars/Olympus_Mons").is_none());
    }

    #[test]
    fn test_named_zone_resolves_offset_per_date() {
        let new_york = Timezone::parse("America/New_York").unwrap();
        let winter = parse_timestamp("2020:01:15 12:00:00", &new_york).unwrap();
        let summer = parse_timestamp("2020:07:15 12:00:00", &new_york).unwrap();
        assert_eq!(offset_hours(winter), -5);
        assert_eq!(offset_hours(summer), -4);
        assert_eq!(summer.hour(), 12);

        let singapore = Timezone::parse("Asia/Singapore").unwrap();
        let ts = parse_timestamp("2020:01:01 10:00:00", &singapore).unwrap();
        assert_eq!(offset_hours(ts), 8);
    }

    #[test]
    fn test_skipped_wall_clock_time_has_no_instant() {
        let new_york = Timezone::parse("America/New_York").unwrap();
        assert!(parse_timestamp("2020:03:08 02:30:00", &new_york).is_none());
        let fold = parse_timestamp("2020:11:01 01:30:00", &new_york).unwrap();
        assert_eq!(offset_hours(fold), -4);
    }
}
