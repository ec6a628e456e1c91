//! Device time codec
//!
//! Terminals pack timestamps into a u32 using a fixed 31-day month and
//! 372-day year counted from 2000:
//!
//! ```text
//! ((years_since_2000 * 12 + month_index) * 31 + day - 1) * 86400
//!     + (hour * 60 + minute) * 60 + second
//! ```
//!
//! Real-time pushes use a six-byte compact form instead:
//! `yy mm dd HH MM SS` with a 1-based month.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Error, Result};

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;
const EPOCH_YEAR: i32 = 2000;

/// Timestamp in the device's field layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceTime {
    pub year: i32,
    /// 1-based
    pub month: u8,
    /// 1..=31 on every month
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DeviceTime {
    /// Decode a packed u32 timestamp
    ///
    /// # Examples
    ///
    /// ```
    /// use zkclock_types::DeviceTime;
    ///
    /// let t = DeviceTime::decode(0);
    /// assert_eq!((t.year, t.month, t.day), (2000, 1, 1));
    /// ```
    pub fn decode(value: u32) -> Self {
        let mut rest = value;

        let second = (rest % 60) as u8;
        rest /= 60;
        let minute = (rest % 60) as u8;
        rest /= 60;
        let hour = (rest % 24) as u8;
        rest /= 24;
        let day = (rest % 31) as u8 + 1;
        rest /= 31;
        let month = (rest % 12) as u8 + 1;
        rest /= 12;

        Self {
            year: EPOCH_YEAR + rest as i32,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Pack into the u32 form; inverse of [`DeviceTime::decode`]
    pub fn encode(&self) -> Result<u32> {
        self.validate()?;

        let years = (self.year - EPOCH_YEAR) as u64;
        let days = (years * 12 + (self.month as u64 - 1)) * 31 + (self.day as u64 - 1);
        let secs = (self.hour as u64 * 60 + self.minute as u64) * 60 + self.second as u64;
        let value = days * SECONDS_PER_DAY as u64 + secs;

        u32::try_from(value).map_err(|_| Error::InvalidTime(format!("{} does not fit in u32", self)))
    }

    /// Decode the six-byte compact form used by real-time events
    pub fn from_compact(bytes: &[u8]) -> Result<Self> {
        crate::error::ensure_len("compact time", bytes, 6)?;

        let time = Self {
            year: EPOCH_YEAR + bytes[0] as i32,
            month: bytes[1],
            day: bytes[2],
            hour: bytes[3],
            minute: bytes[4],
            second: bytes[5],
        };
        if !(1..=12).contains(&time.month) || time.hour > 23 || time.minute > 59 || time.second > 59 {
            return Err(Error::InvalidTime(format!("compact bytes {:02x?}", &bytes[..6])));
        }
        Ok(time)
    }

    /// Convert to a calendar date-time
    ///
    /// Days beyond the end of the month roll into the next month, so
    /// day 31 of a 30-day month becomes the first of the following one.
    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        let first = NaiveDate::from_ymd_opt(self.year, self.month as u32, 1)
            .ok_or_else(|| Error::InvalidTime(self.to_string()))?;
        let date = first
            .checked_add_signed(Duration::days(self.day as i64 - 1))
            .ok_or_else(|| Error::InvalidTime(self.to_string()))?;
        let time = NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
            .ok_or_else(|| Error::InvalidTime(self.to_string()))?;

        Ok(date.and_time(time))
    }

    fn validate(&self) -> Result<()> {
        let in_range = self.year >= EPOCH_YEAR
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60;
        if !in_range {
            return Err(Error::InvalidTime(self.to_string()));
        }
        Ok(())
    }
}

impl TryFrom<NaiveDateTime> for DeviceTime {
    type Error = Error;

    fn try_from(dt: NaiveDateTime) -> Result<Self> {
        let time = Self {
            year: dt.year(),
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        };
        time.validate()?;
        Ok(time)
    }
}

impl fmt::Display for DeviceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Decode a packed timestamp straight to a calendar date-time
pub fn decode_time(value: u32) -> Result<NaiveDateTime> {
    DeviceTime::decode(value).to_datetime()
}

/// Pack a calendar date-time
pub fn encode_time(dt: NaiveDateTime) -> Result<u32> {
    DeviceTime::try_from(dt)?.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn datetime(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_decode_known_value() {
        let value = encode_time(datetime(2023, 6, 15, 8, 30, 45)).unwrap();
        assert_eq!(value, ((23 * 12 + 5) * 31 + 14) * 86400 + (8 * 60 + 30) * 60 + 45);
        assert_eq!(decode_time(value).unwrap(), datetime(2023, 6, 15, 8, 30, 45));
    }

    #[test]
    fn test_day_overflow_rolls_into_next_month() {
        let time = DeviceTime {
            year: 2024,
            month: 4,
            day: 31,
            hour: 12,
            minute: 0,
            second: 0,
        };
        assert_eq!(time.to_datetime().unwrap(), datetime(2024, 5, 1, 12, 0, 0));
    }

    #[test]
    fn test_february_overflow() {
        let time = DeviceTime::decode(((23 * 12 + 1) * 31 + 29) * 86400);
        assert_eq!((time.month, time.day), (2, 30));
        assert_eq!(time.to_datetime().unwrap(), datetime(2023, 3, 2, 0, 0, 0));
    }

    #[test]
    fn test_from_compact() {
        let time = DeviceTime::from_compact(&[24, 3, 9, 17, 5, 59]).unwrap();
        assert_eq!(time.to_datetime().unwrap(), datetime(2024, 3, 9, 17, 5, 59));
    }

    #[test]
    fn test_from_compact_rejects_bad_month() {
        assert!(matches!(
            DeviceTime::from_compact(&[24, 0, 9, 17, 5, 59]),
            Err(Error::InvalidTime(_))
        ));
        assert!(matches!(
            DeviceTime::from_compact(&[24, 1]),
            Err(Error::RecordTooShort { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_years_before_epoch() {
        assert!(encode_time(datetime(1999, 12, 31, 23, 59, 59)).is_err());
    }

    proptest! {
        #[test]
        fn prop_encode_inverts_decode(value in any::<u32>()) {
            prop_assert_eq!(DeviceTime::decode(value).encode().unwrap(), value);
        }

        #[test]
        fn prop_decode_is_idempotent_on_scheme(
            year in 2000i32..2100,
            month in 1u8..=12,
            day in 1u8..=31,
            hour in 0u8..24,
            minute in 0u8..60,
            second in 0u8..60,
        ) {
            let time = DeviceTime { year, month, day, hour, minute, second };
            prop_assert_eq!(DeviceTime::decode(time.encode().unwrap()), time);
        }
    }
}
