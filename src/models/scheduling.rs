//! Scheduling queries and computed results (slots, conflicts, schedules)

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{
    availability_override::AvailabilityOverride,
    enums::{AvailabilityStatus, ConflictType},
    time_off::TimeOff,
    time_window::TimeWindow,
};

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// A candidate appointment window produced by the availability calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Slot {
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub status: AvailabilityStatus,
    pub staff_uuid: Uuid,
    pub service_uuid: Option<Uuid>,
    /// Reasons the slot is unavailable, in evaluation order
    pub conflicts: Vec<ConflictType>,
    pub metadata: SlotMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SlotMetadata {
    pub duration_minutes: i64,
    /// Instant the calculation treated as "now"
    pub computed_at: DateTime<Utc>,
}

impl Slot {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_datetime,
            end: self.end_datetime,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == AvailabilityStatus::Available
    }
}

/// Staff availability query
#[derive(Debug, Clone, Deserialize, Validate, IntoParams, ToSchema)]
pub struct StaffAvailabilityQuery {
    pub staff_uuid: Uuid,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    /// When set, slots are sized to the service's total duration
    pub service_uuid: Option<Uuid>,
    #[serde(default)]
    pub include_busy_slots: bool,
    #[serde(default = "default_slot_duration")]
    #[validate(range(min = 5, max = 480))]
    pub slot_duration_minutes: i64,
}

fn default_slot_duration() -> i64 {
    15
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// One reason a proposed appointment cannot be booked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SchedulingConflict {
    pub conflict_type: ConflictType,
    pub message: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub conflicting_entity_uuid: Option<Uuid>,
    /// error, warning or info
    pub severity: String,
}

impl SchedulingConflict {
    pub fn error(conflict_type: ConflictType, message: impl Into<String>, window: &TimeWindow) -> Self {
        Self {
            conflict_type,
            message: message.into(),
            start_datetime: window.start,
            end_datetime: window.end,
            conflicting_entity_uuid: None,
            severity: "error".to_string(),
        }
    }

    pub fn with_entity(mut self, uuid: Uuid) -> Self {
        self.conflicting_entity_uuid = Some(uuid);
        self
    }
}

/// Validate one exact proposed appointment
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AppointmentValidationRequest {
    pub staff_uuid: Uuid,
    pub service_uuid: Uuid,
    pub requested_datetime: DateTime<Utc>,
    pub customer_uuid: Option<Uuid>,
    #[serde(default)]
    pub addon_uuids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub conflicts: Vec<SchedulingConflict>,
    pub alternative_slots: Vec<Slot>,
    pub total_duration_minutes: i64,
    pub estimated_end_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Business hours
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
pub struct BusinessHoursQuery {
    pub business_uuid: Uuid,
    /// Local date (YYYY-MM-DD)
    pub date: NaiveDate,
    #[serde(default = "default_true")]
    pub include_breaks: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BusinessHours {
    pub is_open: bool,
    pub weekday: String,
    pub is_holiday: bool,
    /// Early closing instant on the eve of a holiday
    pub pre_holiday_cutoff: Option<DateTime<Utc>>,
    pub hours: Option<OpeningHours>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OpeningHours {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
    #[serde(rename = "break", skip_serializing_if = "Option::is_none")]
    pub break_time: Option<BreakHours>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BreakHours {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

// ---------------------------------------------------------------------------
// Staff schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
pub struct StaffScheduleQuery {
    /// First local date (YYYY-MM-DD)
    pub start_date: NaiveDate,
    /// Last local date, inclusive (YYYY-MM-DD)
    pub end_date: NaiveDate,
    #[serde(default = "default_true")]
    pub include_appointments: bool,
    #[serde(default = "default_true")]
    pub include_time_off: bool,
    #[serde(default = "default_true")]
    pub include_availability_overrides: bool,
}

/// Resolved working hours for one date
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduledDay {
    pub date: NaiveDate,
    pub weekday: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub break_start_time: Option<NaiveTime>,
    pub break_end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduledAppointment {
    pub uuid: Uuid,
    pub scheduled_datetime: DateTime<Utc>,
    pub estimated_end_datetime: DateTime<Utc>,
    pub status: super::enums::AppointmentStatus,
    pub service_id: i32,
    pub customer_id: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StaffSchedule {
    pub staff_uuid: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub working_hours: Vec<ScheduledDay>,
    pub time_off: Vec<TimeOff>,
    pub availability_overrides: Vec<AvailabilityOverride>,
    pub appointments: Vec<ScheduledAppointment>,
}

// ---------------------------------------------------------------------------
// Out-of-band slot lock
// ---------------------------------------------------------------------------

/// Reserve a (business, staff, start) slot before an appointment exists
#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
pub struct SlotLockRequest {
    pub staff_uuid: Uuid,
    pub start_datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SlotLockResponse {
    pub key: String,
    pub locked: bool,
    /// Session currently holding the slot, if any
    pub holder: Option<String>,
}
