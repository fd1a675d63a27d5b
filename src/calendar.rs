//! Day-count and maturity helpers.
//!
//! FX option maturities use actual/365.

use crate::errors::{EngineError, EngineResult};
use chrono::{Datelike, NaiveDate, Weekday};

/// Calendar days from `start` to `end`. Errors if `end` precedes `start`.
pub fn days_to_maturity(start: NaiveDate, end: NaiveDate) -> EngineResult<i64> {
    let days = (end - start).num_days();
    if days < 0 {
        return Err(EngineError::invalid_input(format!(
            "payment date {end} is before invoice date {start}"
        )));
    }
    Ok(days)
}

/// Time to maturity in years, actual/365.
pub fn time_to_maturity(start: NaiveDate, end: NaiveDate) -> EngineResult<f64> {
    Ok(days_to_maturity(start, end)? as f64 / 365.0)
}

/// Standard FX maturity tenor.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub enum MaturityBucket {
    Overnight,
    OneWeek,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    /// Longer than a year, in years
    Years(f64),
}

impl MaturityBucket {
    pub fn from_days(days: i64) -> Self {
        match days {
            d if d <= 1 => Self::Overnight,
            d if d <= 7 => Self::OneWeek,
            d if d <= 30 => Self::OneMonth,
            d if d <= 90 => Self::ThreeMonths,
            d if d <= 180 => Self::SixMonths,
            d if d <= 365 => Self::OneYear,
            d => Self::Years(d as f64 / 365.0),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Overnight => "O/N".into(),
            Self::OneWeek => "1W".into(),
            Self::OneMonth => "1M".into(),
            Self::ThreeMonths => "3M".into(),
            Self::SixMonths => "6M".into(),
            Self::OneYear => "1Y".into(),
            Self::Years(y) => format!("{y:.1}Y"),
        }
    }
}

#[inline]
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Weekdays in [start, end], both ends included.
pub fn trading_days(start: NaiveDate, end: NaiveDate) -> usize {
    let span = (end - start).num_days() + 1;
    if span <= 0 {
        return 0;
    }
    let first = start.weekday().num_days_from_monday() as i64;
    let tail = (0..span % 7).filter(|i| (first + i) % 7 < 5).count() as i64;
    (span / 7 * 5 + tail) as usize
}
