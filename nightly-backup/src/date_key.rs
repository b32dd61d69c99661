//! Date stamps embedded in run directory and container names.
//!
//! A key is `YYMMDD` followed by the lowercase English weekday abbreviation,
//! e.g. `231106mon`. It is independent of the process locale.

use chrono::{Datelike, NaiveDate, Weekday};
use std::fmt;

/// Length of a rendered key (`YYMMDDwww`)
pub const DATE_KEY_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Parse a complete key. The weekday must match the date.
    pub fn parse(key: &str) -> Option<Self> {
        if key.len() != DATE_KEY_LEN || !key.is_ascii() {
            return None;
        }
        let (digits, weekday) = key.split_at(6);
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(digits, "%y%m%d").ok()?;
        if weekday_abbrev(date.weekday()) != weekday {
            return None;
        }
        Some(Self(date))
    }

    /// Parse the key a name ends with, e.g. `nightly-231106mon`.
    pub fn parse_suffix(name: &str) -> Option<Self> {
        if name.len() < DATE_KEY_LEN || !name.is_char_boundary(name.len() - DATE_KEY_LEN) {
            return None;
        }
        Self::parse(&name[name.len() - DATE_KEY_LEN..])
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.0.format("%y%m%d"),
            weekday_abbrev(self.0.weekday())
        )
    }
}

fn weekday_abbrev(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_key() {
        let key = DateKey::new(NaiveDate::from_ymd_opt(2023, 11, 6).unwrap());
        assert_eq!(key.to_string(), "231106mon");
    }

    #[test]
    fn test_parse_roundtrip_and_rejects() {
        let key = DateKey::parse("231106mon").unwrap();
        assert_eq!(key.date(), NaiveDate::from_ymd_opt(2023, 11, 6).unwrap());

        // wrong weekday, bad date, wrong shape
        assert!(DateKey::parse("231106tue").is_none());
        assert!(DateKey::parse("231306mon").is_none());
        assert!(DateKey::parse("23110mon").is_none());
        assert!(DateKey::parse("231106MON").is_none());
    }

    #[test]
    fn test_parse_suffix() {
        assert!(DateKey::parse_suffix("231106mon").is_some());
        assert!(DateKey::parse_suffix("host-231106mon").is_some());
        assert!(DateKey::parse_suffix("lost+found").is_none());
        assert!(DateKey::parse_suffix("mon").is_none());
        assert!(DateKey::parse_suffix("äöü231106mon").is_some());
    }
}
