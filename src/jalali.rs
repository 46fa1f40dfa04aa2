//! Persian (Jalali) calendar conversion.
//!
//! Year starts are computed from the table of break years of the 33-year
//! cycle; months 1-6 have 31 days, 7-11 have 30, Esfand has 29 or 30.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use std::fmt;

const BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

/// Tehran standard time, +03:30.
pub const TEHRAN_OFFSET_MINUTES: i32 = 210;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JalaliDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

struct YearInfo {
    /// 0 for a leap year.
    leap: i32,
    gregorian_year: i32,
    /// Day of March on which Farvardin 1 falls.
    march: i32,
}

fn year_info(jy: i32) -> Option<YearInfo> {
    if jy < BREAKS[0] || jy >= BREAKS[BREAKS.len() - 1] {
        return None;
    }

    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = BREAKS[0];
    let mut jump = 0;
    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += (jump / 33) * 8 + (jump % 33) / 4;
        jp = jm;
    }

    let mut n = jy - jp;
    leap_j += (n / 33) * 8 + ((n % 33) + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - ((gy / 100 + 1) * 3) / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + ((jump + 4) / 33) * 33;
    }
    let mut leap = (((n + 1) % 33) - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Some(YearInfo {
        leap,
        gregorian_year: gy,
        march,
    })
}

fn year_start(jy: i32) -> Option<NaiveDate> {
    let info = year_info(jy)?;
    NaiveDate::from_ymd_opt(info.gregorian_year, 3, info.march as u32)
}

pub fn is_leap_year(jy: i32) -> bool {
    year_info(jy).is_some_and(|info| info.leap == 0)
}

pub fn month_length(jy: i32, month: u32) -> u32 {
    match month {
        1..=6 => 31,
        7..=11 => 30,
        12 if is_leap_year(jy) => 30,
        _ => 29,
    }
}

impl JalaliDate {
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        year_info(year)?;
        if !(1..=12).contains(&month) || day == 0 || day > month_length(year, month) {
            return None;
        }
        Some(Self { year, month, day })
    }

    pub fn from_gregorian(date: NaiveDate) -> Option<Self> {
        let mut year = date.year() - 621;
        let mut start = year_start(year)?;
        if date < start {
            year -= 1;
            start = year_start(year)?;
        }

        let mut offset = (date - start).num_days() as u32;
        let (month, day) = if offset < 186 {
            (1 + offset / 31, 1 + offset % 31)
        } else {
            offset -= 186;
            (7 + offset / 30, 1 + offset % 30)
        };
        Some(Self { year, month, day })
    }

    #[cfg(test)]
    pub fn to_gregorian(self) -> Option<NaiveDate> {
        let start = year_start(self.year)?;
        let offset = if self.month <= 6 {
            (self.month - 1) * 31
        } else {
            186 + (self.month - 7) * 30
        } + self.day
            - 1;
        start.checked_add_days(chrono::Days::new(u64::from(offset)))
    }

    /// Calendar day of a timestamp as seen from `offset`.
    pub fn from_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>, offset: FixedOffset) -> Option<Self> {
        Self::from_gregorian(ts.with_timezone(&offset).date_naive())
    }

    /// Parses `YYYY/MM/DD`, accepting Persian and Arabic-Indic digits.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize_digits(raw.trim());
        let mut parts = normalized.split('/');
        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        let day = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Self::new(year, month, day)
    }
}

impl fmt::Display for JalaliDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

/// Maps Persian (U+06F0..) and Arabic-Indic (U+0660..) digits to ASCII.
pub fn normalize_digits(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            other => other,
        })
        .collect()
}

pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}
