//! Time-bounded availability exceptions for staff

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::enums::{OverrideEffect, OverrideType};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailabilityOverride {
    pub id: i32,
    pub uuid: Uuid,
    pub staff_id: i32,
    #[serde(rename = "type")]
    pub override_type: OverrideType,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub is_active: bool,
    pub allow_new_bookings: bool,
    pub max_concurrent_appointments: Option<i32>,
    pub title: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityOverride {
    /// Half-open point check
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.is_active && self.start_datetime <= instant && instant < self.end_datetime
    }

    /// Effect imposed at a covered instant. An override that stops new
    /// bookings is unavailable whatever its type.
    pub fn effect(&self) -> OverrideEffect {
        if !self.allow_new_bookings {
            return OverrideEffect::Unavailable;
        }
        match self.override_type {
            OverrideType::Available | OverrideType::CustomHours => OverrideEffect::Available,
            OverrideType::Unavailable => OverrideEffect::Unavailable,
        }
    }
}
