//! Staff and business time off

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    enums::{Owner, TimeOffStatus, TimeOffType},
    time_window::TimeWindow,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimeOff {
    pub id: i32,
    pub uuid: Uuid,
    #[schema(value_type = Object)]
    pub owner: Owner,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    #[serde(rename = "type")]
    pub time_off_type: TimeOffType,
    pub status: TimeOffStatus,
    pub reason: Option<String>,
    pub is_all_day: bool,
    /// Free-form recurrence marker, not expanded by the engine
    pub recurrence_rule: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TimeOff {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_datetime,
            end: self.end_datetime,
        }
    }

    /// Only approved time off removes availability
    pub fn blocks(&self, window: &TimeWindow) -> bool {
        self.status == TimeOffStatus::Approved && self.window().overlaps(window)
    }
}
