//! Availability, validation and schedule endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::scheduling::{
        AppointmentValidationRequest, BusinessHours, BusinessHoursQuery, Slot,
        SlotLockRequest, SlotLockResponse, StaffAvailabilityQuery, StaffSchedule,
        StaffScheduleQuery, ValidationResult,
    },
};

use super::{MaybeSessionId, SessionId};

/// Bookable time slots for a staff member
#[utoipa::path(
    get,
    path = "/scheduling/staff/availability",
    tag = "scheduling",
    params(StaffAvailabilityQuery),
    responses(
        (status = 200, description = "Slots in chronological order", body = Vec<Slot>),
        (status = 400, description = "Invalid range or slot duration")
    )
)]
pub async fn get_staff_availability(
    State(state): State<crate::AppState>,
    Query(query): Query<StaffAvailabilityQuery>,
) -> AppResult<Json<Vec<Slot>>> {
    query.validate()?;
    let slots = state.services.scheduling.get_staff_availability(&query).await?;
    Ok(Json(slots))
}

/// Check one proposed appointment against every scheduling rule
#[utoipa::path(
    post,
    path = "/scheduling/appointments/validate",
    tag = "scheduling",
    request_body = AppointmentValidationRequest,
    responses(
        (status = 200, description = "Validation result with alternatives", body = ValidationResult)
    )
)]
pub async fn validate_appointment(
    State(state): State<crate::AppState>,
    Json(request): Json<AppointmentValidationRequest>,
) -> AppResult<Json<ValidationResult>> {
    request.validate()?;
    let result = state.services.scheduling.validate_appointment(&request).await?;
    Ok(Json(result))
}

/// Opening hours of a business on a local date
#[utoipa::path(
    get,
    path = "/scheduling/business-hours",
    tag = "scheduling",
    params(BusinessHoursQuery),
    responses(
        (status = 200, description = "Business hours", body = BusinessHours),
        (status = 404, description = "Business not found")
    )
)]
pub async fn get_business_hours(
    State(state): State<crate::AppState>,
    Query(query): Query<BusinessHoursQuery>,
) -> AppResult<Json<BusinessHours>> {
    let hours = state.services.scheduling.get_business_hours(&query).await?;
    Ok(Json(hours))
}

/// Resolved schedule of a staff member over a date range
#[utoipa::path(
    get,
    path = "/scheduling/staff/{uuid}/schedule",
    tag = "scheduling",
    params(
        ("uuid" = Uuid, Path, description = "Staff member UUID"),
        StaffScheduleQuery
    ),
    responses(
        (status = 200, description = "Staff schedule", body = StaffSchedule),
        (status = 404, description = "Staff member not found"),
        (status = 400, description = "Invalid date range")
    )
)]
pub async fn get_staff_schedule(
    State(state): State<crate::AppState>,
    Path(staff_uuid): Path<Uuid>,
    Query(query): Query<StaffScheduleQuery>,
) -> AppResult<Json<StaffSchedule>> {
    let schedule = state
        .services
        .scheduling
        .get_staff_schedule(staff_uuid, &query)
        .await?;
    Ok(Json(schedule))
}

/// Reserve a slot for the calling session while it completes a booking
#[utoipa::path(
    post,
    path = "/scheduling/slot-locks",
    tag = "scheduling",
    params(("X-Session-Id" = String, Header, description = "Booking session")),
    request_body = SlotLockRequest,
    responses(
        (status = 201, description = "Slot reserved", body = SlotLockResponse),
        (status = 423, description = "Slot held by another session")
    )
)]
pub async fn lock_slot(
    State(state): State<crate::AppState>,
    SessionId(session_id): SessionId,
    Json(request): Json<SlotLockRequest>,
) -> AppResult<(StatusCode, Json<SlotLockResponse>)> {
    let (acquired, response) = state
        .services
        .scheduling
        .lock_slot(&request, &session_id)
        .await?;
    if !acquired {
        return Err(AppError::LockContention);
    }
    Ok((StatusCode::CREATED, Json(response)))
}

/// Release a slot reservation
#[utoipa::path(
    delete,
    path = "/scheduling/slot-locks",
    tag = "scheduling",
    params(("X-Session-Id" = Option<String>, Header, description = "Holder session; omit to force")),
    request_body = SlotLockRequest,
    responses(
        (status = 200, description = "Slot released", body = SlotLockResponse),
        (status = 423, description = "Slot held by another session")
    )
)]
pub async fn unlock_slot(
    State(state): State<crate::AppState>,
    MaybeSessionId(session_id): MaybeSessionId,
    Json(request): Json<SlotLockRequest>,
) -> AppResult<Json<SlotLockResponse>> {
    let (released, response) = state
        .services
        .scheduling
        .unlock_slot(&request, session_id.as_deref())
        .await?;
    // Nothing to release is fine; a live foreign holder is not
    if !released && response.holder.is_some() {
        return Err(AppError::LockContention);
    }
    Ok(Json(response))
}

/// Current holder of a slot reservation
#[utoipa::path(
    get,
    path = "/scheduling/slot-locks/status",
    tag = "scheduling",
    params(SlotLockRequest),
    responses(
        (status = 200, description = "Reservation status", body = SlotLockResponse)
    )
)]
pub async fn slot_lock_status(
    State(state): State<crate::AppState>,
    Query(request): Query<SlotLockRequest>,
) -> AppResult<Json<SlotLockResponse>> {
    let status = state.services.scheduling.slot_lock_status(&request).await?;
    Ok(Json(status))
}
