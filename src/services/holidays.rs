//! Holiday gate: regional holiday calendar and the holiday-eve early close

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{
    config::SchedulingConfig,
    error::{AppError, AppResult},
};

/// Answers holiday questions for one configured region
#[cfg_attr(test, mockall::automock)]
pub trait HolidayGate: Send + Sync {
    /// Calendar date of `instant` in the region
    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate;

    fn is_holiday(&self, date: NaiveDate) -> bool;

    fn is_day_before_holiday(&self, date: NaiveDate) -> bool;

    /// Early closing instant when `instant` falls on the eve of a holiday
    fn pre_holiday_cutoff_utc(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// Early closing instant of a regional date that is the eve of a holiday
    fn pre_holiday_cutoff_on(&self, date: NaiveDate) -> Option<DateTime<Utc>>;
}

/// Holiday calendar built from configuration
pub struct CalendarHolidayGate {
    region: Tz,
    cutoff: NaiveTime,
    dates: HashSet<NaiveDate>,
    /// (month, day) pairs observed every year
    recurring: HashSet<(u32, u32)>,
}

impl CalendarHolidayGate {
    pub fn new(region: Tz, cutoff: NaiveTime, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            region,
            cutoff,
            dates: dates.into_iter().collect(),
            recurring: HashSet::new(),
        }
    }

    pub fn with_recurring(mut self, days: impl IntoIterator<Item = (u32, u32)>) -> Self {
        self.recurring.extend(days);
        self
    }

    pub fn from_config(config: &SchedulingConfig) -> AppResult<Self> {
        let region = config
            .region_tz()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let cutoff = config
            .cutoff_time()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let dates = config
            .holidays
            .iter()
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d")
                    .map_err(|_| AppError::Validation(format!("Invalid holiday date: {}", d)))
            })
            .collect::<AppResult<Vec<_>>>()?;

        let recurring = config
            .recurring_holidays
            .iter()
            .map(|d| parse_month_day(d))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self::new(region, cutoff, dates).with_recurring(recurring))
    }
}

fn parse_month_day(s: &str) -> AppResult<(u32, u32)> {
    let invalid = || AppError::Validation(format!("Invalid recurring holiday (use MM-DD): {}", s));
    let (m, d) = s.split_once('-').ok_or_else(invalid)?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    let day: u32 = d.parse().map_err(|_| invalid())?;
    // 2024 is a leap year, so Feb 29 is accepted
    NaiveDate::from_ymd_opt(2024, month, day).ok_or_else(invalid)?;
    Ok((month, day))
}

impl HolidayGate for CalendarHolidayGate {
    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.region).date_naive()
    }

    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date) || self.recurring.contains(&(date.month(), date.day()))
    }

    fn is_day_before_holiday(&self, date: NaiveDate) -> bool {
        self.is_holiday(date + Duration::days(1))
    }

    fn pre_holiday_cutoff_utc(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.pre_holiday_cutoff_on(self.local_date(instant))
    }

    fn pre_holiday_cutoff_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        if !self.is_day_before_holiday(date) {
            return None;
        }
        self.region
            .from_local_datetime(&date.and_time(self.cutoff))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }
}
