//! Appointment model, status state machine and row-level slot lock

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{
    enums::{AppointmentStatus, CancellationReason},
    time_window::TimeWindow,
};
use crate::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// Appointment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Appointment {
    pub id: i32,
    pub uuid: Uuid,
    pub business_id: i32,
    pub customer_id: i32,
    pub staff_id: i32,
    pub service_id: i32,

    pub scheduled_datetime: DateTime<Utc>,
    /// Always `scheduled_datetime + duration_minutes`
    pub estimated_end_datetime: DateTime<Utc>,
    pub actual_start_datetime: Option<DateTime<Utc>>,
    pub actual_end_datetime: Option<DateTime<Utc>>,
    /// Service total duration plus add-on extra minutes
    pub duration_minutes: i32,

    pub status: AppointmentStatus,
    pub previous_status: Option<AppointmentStatus>,
    pub status_changed_at: Option<DateTime<Utc>>,

    pub booking_source: String,
    pub total_price: Decimal,
    pub deposit_required: bool,
    pub deposit_amount: Option<Decimal>,

    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by_staff_id: Option<i32>,
    pub cancellation_reason: Option<CancellationReason>,
    pub cancellation_notes: Option<String>,
    pub cancellation_fee: Option<Decimal>,
    pub no_show_fee: Option<Decimal>,

    pub reschedule_count: i32,
    pub rescheduled_from_datetime: Option<DateTime<Utc>>,

    pub customer_notes: Option<String>,
    pub internal_notes: Option<String>,

    pub slot_locked: bool,
    pub slot_locked_at: Option<DateTime<Utc>>,
    pub slot_lock_expires_at: Option<DateTime<Utc>>,
    pub locked_by_session_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.scheduled_datetime,
            end: self.estimated_end_datetime,
        }
    }

    /// Whether this appointment still occupies the staff member's time
    pub fn blocks_time(&self) -> bool {
        self.status.blocks_time()
    }

    /// Move to `next`, stamping the timestamps the new status implies.
    ///
    /// Fee and reason bookkeeping is left to the caller, which knows the
    /// business policy.
    pub fn transition_to(&mut self, next: AppointmentStatus, now: DateTime<Utc>) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                current: self.status,
                requested: next,
            });
        }

        self.previous_status = Some(self.status);
        self.status = next;
        self.status_changed_at = Some(now);

        match next {
            AppointmentStatus::Cancelled => self.cancelled_at = Some(now),
            AppointmentStatus::InProgress => self.actual_start_datetime = Some(now),
            AppointmentStatus::Completed => self.actual_end_datetime = Some(now),
            _ => {}
        }
        Ok(())
    }

    /// Move the appointment in place to a new start
    pub fn reschedule_to(&mut self, new_start: DateTime<Utc>, note: &str) {
        self.rescheduled_from_datetime = Some(self.scheduled_datetime);
        self.reschedule_count += 1;
        self.scheduled_datetime = new_start;
        self.estimated_end_datetime = new_start + Duration::minutes(self.duration_minutes as i64);
        self.internal_notes = Some(match self.internal_notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
            _ => note.to_string(),
        });
    }

    // ---- Cancellation policy ----

    /// Assess a cancellation made at `at`.
    ///
    /// Notice is counted in whole elapsed hours. A cancellation whose notice
    /// is at most `window_hours` is still allowed but charged
    /// `fee_percent` of the total price.
    pub fn assess_cancellation(
        &self,
        at: DateTime<Utc>,
        window_hours: i64,
        fee_percent: Decimal,
    ) -> CancellationPolicyResponse {
        let window_ends_at = self.scheduled_datetime - Duration::hours(window_hours);

        if self.status.is_terminal() {
            return CancellationPolicyResponse {
                can_cancel: false,
                reason: format!("Appointment cannot be cancelled in status {}", self.status),
                cancellation_fee: None,
                cancellation_window_ends_at: window_ends_at,
            };
        }

        let notice_hours = (self.scheduled_datetime - at).num_hours();
        if notice_hours <= window_hours {
            let fee = (self.total_price * fee_percent / Decimal::ONE_HUNDRED).round_dp(2);
            CancellationPolicyResponse {
                can_cancel: true,
                reason: "Appointment is within the cancellation window, a late fee applies".to_string(),
                cancellation_fee: Some(fee),
                cancellation_window_ends_at: window_ends_at,
            }
        } else {
            CancellationPolicyResponse {
                can_cancel: true,
                reason: "Appointment can be cancelled".to_string(),
                cancellation_fee: None,
                cancellation_window_ends_at: window_ends_at,
            }
        }
    }

    // ---- Row-level slot lock ----

    /// Live lock holder at `now`, ignoring expired locks
    pub fn lock_holder(&self, now: DateTime<Utc>) -> Option<&str> {
        if !self.is_slot_locked(now) {
            return None;
        }
        self.locked_by_session_id.as_deref()
    }

    /// Pure check: an expired lock reads as unlocked but is left in place
    pub fn is_slot_locked(&self, now: DateTime<Utc>) -> bool {
        self.slot_locked && self.slot_lock_expires_at.map_or(true, |exp| exp > now)
    }

    /// Whether the row carries a lock that has run out
    pub fn has_expired_lock(&self, now: DateTime<Utc>) -> bool {
        self.slot_locked && self.slot_lock_expires_at.is_some_and(|exp| exp <= now)
    }

    /// Take the lock for `session_id`.
    ///
    /// Succeeds when the row is unlocked, its lock has expired, or the same
    /// session already holds it (which extends the lock).
    pub fn lock_slot(&mut self, session_id: &str, ttl: Duration, now: DateTime<Utc>) -> bool {
        if let Some(holder) = self.lock_holder(now) {
            if holder != session_id {
                return false;
            }
        }
        self.slot_locked = true;
        self.slot_locked_at = Some(now);
        self.slot_lock_expires_at = Some(now + ttl);
        self.locked_by_session_id = Some(session_id.to_string());
        true
    }

    /// Release the lock. Without a session id this is a forced unlock.
    pub fn unlock_slot(&mut self, session_id: Option<&str>) -> bool {
        if let Some(session) = session_id {
            if self.locked_by_session_id.as_deref() != Some(session) {
                return false;
            }
        }
        self.clear_lock();
        true
    }

    pub fn clear_lock(&mut self) {
        self.slot_locked = false;
        self.slot_locked_at = None;
        self.slot_lock_expires_at = None;
        self.locked_by_session_id = None;
    }
}

// ---------------------------------------------------------------------------
// Persistence input
// ---------------------------------------------------------------------------

/// Add-on line copied onto the appointment at booking time
#[derive(Debug, Clone)]
pub struct AppointmentAddonLine {
    pub addon_id: i32,
    pub addon_name: String,
    pub addon_price: Decimal,
    pub addon_duration_minutes: i32,
}

/// Fully resolved appointment ready to be inserted
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub business_id: i32,
    pub customer_id: i32,
    pub staff_id: i32,
    pub service_id: i32,
    pub scheduled_datetime: DateTime<Utc>,
    pub estimated_end_datetime: DateTime<Utc>,
    pub duration_minutes: i32,
    pub booking_source: String,
    pub total_price: Decimal,
    pub deposit_required: bool,
    pub deposit_amount: Option<Decimal>,
    pub customer_notes: Option<String>,
    pub internal_notes: Option<String>,
    pub addons: Vec<AppointmentAddonLine>,
}

impl NewAppointment {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.scheduled_datetime,
            end: self.estimated_end_datetime,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

/// Book an appointment
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateAppointmentRequest {
    pub staff_uuid: Uuid,
    pub service_uuid: Uuid,
    pub customer_uuid: Uuid,
    pub scheduled_datetime: DateTime<Utc>,
    #[serde(default)]
    pub addon_uuids: Vec<Uuid>,
    /// admin, online, phone, walk_in
    #[validate(length(min = 1, max = 50))]
    pub booking_source: Option<String>,
    #[validate(length(max = 2000))]
    pub customer_notes: Option<String>,
    #[validate(length(max = 2000))]
    pub internal_notes: Option<String>,
}

/// Move an appointment to a new start time
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RescheduleRequest {
    pub new_scheduled_datetime: DateTime<Utc>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Request a status change
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct StatusTransitionRequest {
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<CancellationReason>,
    #[validate(length(max = 2000))]
    pub cancellation_notes: Option<String>,
    /// Explicit fee, replacing the policy fee
    pub cancellation_fee: Option<Decimal>,
    /// Explicit fee, replacing the business no-show fee
    pub no_show_fee: Option<Decimal>,
    /// Staff member performing the change
    pub staff_id: Option<i32>,
}

impl StatusTransitionRequest {
    pub fn to(status: AppointmentStatus) -> Self {
        Self {
            status,
            cancellation_reason: None,
            cancellation_notes: None,
            cancellation_fee: None,
            no_show_fee: None,
            staff_id: None,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct CancellationPolicyQuery {
    /// Evaluate the policy as of this instant (defaults to now)
    pub current_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CancellationPolicyResponse {
    pub can_cancel: bool,
    pub reason: String,
    pub cancellation_fee: Option<Decimal>,
    pub cancellation_window_ends_at: DateTime<Utc>,
}

/// Check a staff member's calendar for overlapping appointments
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ConflictCheckRequest {
    pub staff_uuid: Uuid,
    pub scheduled_datetime: DateTime<Utc>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: i32,
    pub exclude_appointment_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConflictingAppointment {
    pub uuid: Uuid,
    pub scheduled_datetime: DateTime<Utc>,
    pub estimated_end_datetime: DateTime<Utc>,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicts: Vec<ConflictingAppointment>,
    pub alternative_slots: Vec<DateTime<Utc>>,
}

/// Row-lock request; the session comes from the `X-Session-Id` header
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct AppointmentLockRequest {
    #[validate(range(min = 1, max = 60))]
    pub lock_duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AppointmentLockStatus {
    pub appointment_uuid: Uuid,
    pub locked: bool,
    pub locked_by_session_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AppointmentLockStatus {
    pub fn of(appointment: &Appointment, now: DateTime<Utc>) -> Self {
        let locked = appointment.is_slot_locked(now);
        Self {
            appointment_uuid: appointment.uuid,
            locked,
            locked_by_session_id: if locked { appointment.locked_by_session_id.clone() } else { None },
            expires_at: if locked { appointment.slot_lock_expires_at } else { None },
        }
    }
}
