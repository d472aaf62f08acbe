use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time span covered by one partition file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Month,
    Day,
}

/// Address of one partition: a location and a calendar month or day
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub location_id: String,
    pub year: i32,
    pub month: u32,
    pub day: Option<u32>,
}

impl PartitionKey {
    pub fn for_date(
        location_id: impl Into<String>,
        date: NaiveDate,
        granularity: Granularity,
    ) -> Self {
        let day = match granularity {
            Granularity::Month => None,
            Granularity::Day => Some(date.day()),
        };

        Self {
            location_id: location_id.into(),
            year: date.year(),
            month: date.month(),
            day,
        }
    }

    pub fn granularity(&self) -> Granularity {
        if self.day.is_some() {
            Granularity::Day
        } else {
            Granularity::Month
        }
    }

    /// `YYYYMM` for month partitions, `YYYYMMDD` for day partitions
    pub fn period_stamp(&self) -> String {
        match self.day {
            Some(day) => format!("{:04}{:02}{:02}", self.year, self.month, day),
            None => format!("{:04}{:02}", self.year, self.month),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.day {
            Some(day) => write!(
                f,
                "{}/{:04}-{:02}-{:02}",
                self.location_id, self.year, self.month, day
            ),
            None => write!(f, "{}/{:04}-{:02}", self.location_id, self.year, self.month),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_month_key_ignores_day() {
        let a = PartitionKey::for_date("Koga", date(2026, 1, 3), Granularity::Month);
        let b = PartitionKey::for_date("Koga", date(2026, 1, 28), Granularity::Month);
        assert_eq!(a, b);
        assert_eq!(a.period_stamp(), "202601");
        assert_eq!(a.to_string(), "Koga/2026-01");
    }

    #[test]
    fn test_day_key() {
        let key = PartitionKey::for_date("Koga", date(2026, 1, 9), Granularity::Day);
        assert_eq!(key.day, Some(9));
        assert_eq!(key.granularity(), Granularity::Day);
        assert_eq!(key.period_stamp(), "20260109");
        assert_eq!(key.to_string(), "Koga/2026-01-09");
    }
}
