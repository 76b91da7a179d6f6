//! Working hours for businesses and staff

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::Serialize;
use utoipa::ToSchema;

use super::enums::Owner;

/// Weekly opening window of one owner for one weekday
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkingHours {
    pub id: i32,
    #[schema(value_type = Object)]
    pub owner: Owner,
    #[schema(value_type = String, example = "Mon")]
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub break_start_time: Option<NaiveTime>,
    pub break_end_time: Option<NaiveTime>,
    pub is_active: bool,
    /// First local date the record applies to
    pub effective_from: Option<NaiveDate>,
    /// Last local date the record applies to (inclusive)
    pub effective_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl WorkingHours {
    /// Whether the record is live on the given local date
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.is_active
            && self.effective_from.map_or(true, |from| date >= from)
            && self.effective_until.map_or(true, |until| date <= until)
    }

    pub fn break_times(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.break_start_time, self.break_end_time) {
            (Some(s), Some(e)) if e > s => Some((s, e)),
            _ => None,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// Whether a local `[start, end)` window fits inside these hours.
    ///
    /// The window must stay on a single local date and must not overlap the
    /// break.
    pub fn admits(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        if start.date() != end.date() {
            return false;
        }
        let (s, e) = (start.time(), end.time());
        if s < self.start_time || e > self.end_time {
            return false;
        }
        match self.break_times() {
            Some((bs, be)) => !(s < be && bs < e),
            None => true,
        }
    }
}
