//! Hour buckets and billing periods

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

use crate::error::ValidationError;

/// Fail unless `ts` has no minutes, seconds or sub-second part
pub fn ensure_hour_aligned(ts: DateTime<Utc>) -> Result<(), ValidationError> {
    if ts.minute() != 0 || ts.second() != 0 || ts.nanosecond() != 0 {
        return Err(ValidationError::UnalignedTimestamp(ts));
    }
    Ok(())
}

/// Calendar decomposition of an hour bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HourBucket {
    pub timestamp: DateTime<Utc>,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
}

impl HourBucket {
    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        Self {
            timestamp: ts,
            year: ts.year(),
            month: ts.month() as i32,
            day: ts.day() as i32,
            hour: ts.hour() as i32,
        }
    }
}

/// Hour starts in `[from, until)`
pub fn hours(from: DateTime<Utc>, until: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> {
    std::iter::successors(Some(from), |ts| Some(*ts + Duration::hours(1)))
        .take_while(move |ts| *ts < until)
}

/// A calendar month in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BillingMonth {
    pub year: i32,
    pub month: u32,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidMonth(month));
        }
        Ok(Self { year, month })
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the month
    pub fn last_day(&self) -> NaiveDate {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// UTC midnight starting the first day
    pub fn period_start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.first_day().and_time(NaiveTime::default()))
    }

    /// UTC midnight starting the last day
    pub fn period_end(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.last_day().and_time(NaiveTime::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_alignment() {
        let base = Utc.with_ymd_and_hms(2020, 1, 23, 17, 0, 0).unwrap();
        assert!(ensure_hour_aligned(base).is_ok());
        for d in [
            Duration::minutes(1),
            Duration::seconds(1),
            Duration::nanoseconds(1),
        ] {
            assert!(ensure_hour_aligned(base + d).is_err());
        }
    }

    #[test]
    fn test_hour_bucket() {
        let ts = Utc.with_ymd_and_hms(2021, 12, 31, 23, 0, 0).unwrap();
        let bucket = HourBucket::from_timestamp(ts);
        assert_eq!((bucket.year, bucket.month, bucket.day, bucket.hour), (2021, 12, 31, 23));
    }

    #[test]
    fn test_hours_half_open() {
        let base = Utc.with_ymd_and_hms(2020, 1, 23, 17, 0, 0).unwrap();
        let all: Vec<_> = hours(base, base + Duration::hours(3)).collect();
        assert_eq!(all, vec![base, base + Duration::hours(1), base + Duration::hours(2)]);
        assert_eq!(hours(base, base).count(), 0);
    }

    #[test]
    fn test_billing_month_bounds() {
        let dec = BillingMonth::new(2021, 12).unwrap();
        assert_eq!(dec.period_start(), Utc.with_ymd_and_hms(2021, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(dec.period_end(), Utc.with_ymd_and_hms(2021, 12, 31, 0, 0, 0).unwrap());

        let feb = BillingMonth::new(2024, 2).unwrap();
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        assert!(BillingMonth::new(2024, 13).is_err());
        assert!(BillingMonth::new(2024, 0).is_err());
    }
}
