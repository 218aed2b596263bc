use bstr::{BStr, BString, ByteSlice, ByteVec};
use chrono::Local;

use crate::error::UtilError;
use crate::Result;

/// A git timestamp: seconds since the epoch plus the recorded timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitDate {
    /// Seconds since Unix epoch.
    pub timestamp: i64,
    /// Timezone offset in minutes from UTC (e.g. -300 for EST).
    pub tz_offset: i32,
}

/// Convert git's `+HHMM` decimal form to minutes (-0530 → -330).
fn tz_decimal_to_minutes(tz: i32) -> i32 {
    let sign = if tz < 0 { -1 } else { 1 };
    let abs = tz.unsigned_abs() as i32;
    sign * ((abs / 100) * 60 + abs % 100)
}

/// Convert minutes back to the `+HHMM` decimal form (-330 → -530).
fn minutes_to_tz_decimal(minutes: i32) -> i32 {
    let sign = if minutes < 0 { -1 } else { 1 };
    let abs = minutes.unsigned_abs() as i32;
    sign * ((abs / 60) * 100 + abs % 60)
}

impl GitDate {
    pub fn new(timestamp: i64, tz_offset_minutes: i32) -> Self {
        Self {
            timestamp,
            tz_offset: tz_offset_minutes,
        }
    }

    /// The current time in the local timezone.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            timestamp: now.timestamp(),
            tz_offset: now.offset().local_minus_utc() / 60,
        }
    }

    /// Parse git's raw form: `"<seconds> <+|->HHMM"`.
    pub fn parse_raw(input: &str) -> Result<Self> {
        let input = input.trim();
        let (ts_str, tz_str) = input
            .split_once(' ')
            .ok_or_else(|| UtilError::DateParse(format!("missing timezone in {input:?}")))?;

        let timestamp: i64 = ts_str
            .parse()
            .map_err(|_| UtilError::DateParse(format!("bad timestamp {ts_str:?}")))?;

        let tz_str = tz_str.trim();
        if tz_str.len() != 5 || !(tz_str.starts_with('+') || tz_str.starts_with('-')) {
            return Err(UtilError::DateParse(format!("bad timezone {tz_str:?}")));
        }
        let tz_decimal: i32 = tz_str
            .parse()
            .map_err(|_| UtilError::DateParse(format!("bad timezone {tz_str:?}")))?;

        Ok(Self {
            timestamp,
            tz_offset: tz_decimal_to_minutes(tz_decimal),
        })
    }

    /// Format in git's raw form: `"<seconds> <+|->HHMM"`.
    pub fn to_raw(&self) -> String {
        format!(
            "{} {:+05}",
            self.timestamp,
            minutes_to_tz_decimal(self.tz_offset)
        )
    }
}

/// An author/committer/tagger identity with timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub date: GitDate,
}

impl Signature {
    /// Parse git's identity line: `Name <email> timestamp tz`.
    pub fn parse(input: &BStr) -> Result<Self> {
        let input = input.as_bytes();

        let gt_pos = input
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or_else(|| UtilError::DateParse("missing '>' in signature".into()))?;
        let lt_pos = input[..gt_pos]
            .iter()
            .rposition(|&b| b == b'<')
            .ok_or_else(|| UtilError::DateParse("missing '<' in signature".into()))?;

        let name = input[..lt_pos].trim();
        let email = &input[lt_pos + 1..gt_pos];

        let date_str = std::str::from_utf8(input[gt_pos + 1..].trim())
            .map_err(|_| UtilError::DateParse("non-UTF-8 date in signature".into()))?;
        let date = GitDate::parse_raw(date_str)?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            date,
        })
    }

    /// Serialize in git's canonical form: `Name <email> timestamp tz`.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::new(Vec::new());
        out.push_str(&self.name);
        out.push_str(b" <");
        out.push_str(&self.email);
        out.push_str(b"> ");
        out.push_str(self.date.to_raw().as_bytes());
        out
    }
}
