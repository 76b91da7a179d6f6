//! Working-hours resolver

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::models::{Owner, TimeWindow, WorkingHours};

/// Resolves the weekly hours of one owner, interpreted in one timezone.
///
/// No record for a day means the owner is closed that day.
#[derive(Debug, Clone)]
pub struct WorkingHoursResolver {
    owner: Owner,
    tz: Tz,
    records: Vec<WorkingHours>,
}

impl WorkingHoursResolver {
    pub fn new(owner: Owner, tz: Tz, records: Vec<WorkingHours>) -> Self {
        let records = records.into_iter().filter(|r| r.owner == owner).collect();
        Self { owner, tz, records }
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Active record for `weekday` on the local `date`.
    ///
    /// When several records qualify, the most recently created wins.
    pub fn resolve(&self, weekday: Weekday, date: NaiveDate) -> Option<&WorkingHours> {
        self.records
            .iter()
            .filter(|r| r.weekday == weekday && r.applies_on(date))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
    }

    /// Record in force for a local date
    pub fn for_date(&self, date: NaiveDate) -> Option<&WorkingHours> {
        self.resolve(date.weekday(), date)
    }

    /// Local calendar date of an instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Whether the whole window falls inside the hours of its local day
    pub fn is_within(&self, window: &TimeWindow) -> bool {
        let start = window.start.with_timezone(&self.tz).naive_local();
        let end = window.end.with_timezone(&self.tz).naive_local();
        match self.for_date(start.date()) {
            Some(hours) => hours.admits(start, end),
            None => false,
        }
    }
}
