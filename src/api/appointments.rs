//! Appointment booking, lifecycle and row-lock endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        appointment::{
            AppointmentLockRequest, AppointmentLockStatus, CancellationPolicyQuery,
            CancellationPolicyResponse, ConflictCheckRequest, ConflictCheckResponse,
            CreateAppointmentRequest, RescheduleRequest, StatusTransitionRequest,
        },
        Appointment,
    },
};

use super::{MaybeSessionId, SessionId};

/// Book an appointment
#[utoipa::path(
    post,
    path = "/appointments",
    tag = "appointments",
    params(("X-Session-Id" = Option<String>, Header, description = "Booking session")),
    request_body = CreateAppointmentRequest,
    responses(
        (status = 201, description = "Appointment booked", body = Appointment),
        (status = 404, description = "Staff, service or customer not found"),
        (status = 409, description = "Requested time is not available"),
        (status = 423, description = "Slot reserved by another session")
    )
)]
pub async fn create_appointment(
    State(state): State<crate::AppState>,
    MaybeSessionId(session_id): MaybeSessionId,
    Json(request): Json<CreateAppointmentRequest>,
) -> AppResult<(StatusCode, Json<Appointment>)> {
    request.validate()?;
    let appointment = state
        .services
        .appointments
        .create(request, session_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// Get appointment by UUID
#[utoipa::path(
    get,
    path = "/appointments/{uuid}",
    tag = "appointments",
    params(("uuid" = Uuid, Path, description = "Appointment UUID")),
    responses(
        (status = 200, description = "Appointment", body = Appointment),
        (status = 404, description = "Appointment not found")
    )
)]
pub async fn get_appointment(
    State(state): State<crate::AppState>,
    Path(uuid): Path<Uuid>,
) -> AppResult<Json<Appointment>> {
    let appointment = state.services.appointments.get(uuid).await?;
    Ok(Json(appointment))
}

/// Move an appointment to a new start time
#[utoipa::path(
    post,
    path = "/appointments/{uuid}/reschedule",
    tag = "appointments",
    params(
        ("uuid" = Uuid, Path, description = "Appointment UUID"),
        ("X-Session-Id" = Option<String>, Header, description = "Booking session")
    ),
    request_body = RescheduleRequest,
    responses(
        (status = 200, description = "Appointment rescheduled", body = Appointment),
        (status = 404, description = "Appointment not found"),
        (status = 409, description = "New time is not available"),
        (status = 423, description = "Target slot reserved by another session"),
        (status = 422, description = "Appointment can no longer be rescheduled")
    )
)]
pub async fn reschedule_appointment(
    State(state): State<crate::AppState>,
    Path(uuid): Path<Uuid>,
    MaybeSessionId(session_id): MaybeSessionId,
    Json(request): Json<RescheduleRequest>,
) -> AppResult<Json<Appointment>> {
    request.validate()?;
    let appointment = state
        .services
        .appointments
        .reschedule(uuid, request, session_id.as_deref())
        .await?;
    Ok(Json(appointment))
}

/// Change appointment status
#[utoipa::path(
    post,
    path = "/appointments/{uuid}/status",
    tag = "appointments",
    params(("uuid" = Uuid, Path, description = "Appointment UUID")),
    request_body = StatusTransitionRequest,
    responses(
        (status = 200, description = "Status changed", body = Appointment),
        (status = 404, description = "Appointment not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn transition_status(
    State(state): State<crate::AppState>,
    Path(uuid): Path<Uuid>,
    Json(request): Json<StatusTransitionRequest>,
) -> AppResult<Json<Appointment>> {
    request.validate()?;
    let appointment = state
        .services
        .appointments
        .transition_status(uuid, request)
        .await?;
    Ok(Json(appointment))
}

/// Whether an appointment can be cancelled and what it would cost
#[utoipa::path(
    get,
    path = "/appointments/{uuid}/cancellation-policy",
    tag = "appointments",
    params(
        ("uuid" = Uuid, Path, description = "Appointment UUID"),
        CancellationPolicyQuery
    ),
    responses(
        (status = 200, description = "Cancellation policy", body = CancellationPolicyResponse),
        (status = 404, description = "Appointment not found")
    )
)]
pub async fn cancellation_policy(
    State(state): State<crate::AppState>,
    Path(uuid): Path<Uuid>,
    Query(query): Query<CancellationPolicyQuery>,
) -> AppResult<Json<CancellationPolicyResponse>> {
    let policy = state
        .services
        .appointments
        .cancellation_policy(uuid, query.current_time)
        .await?;
    Ok(Json(policy))
}

/// Overlapping appointments for a proposed time
#[utoipa::path(
    post,
    path = "/appointments/conflicts",
    tag = "appointments",
    request_body = ConflictCheckRequest,
    responses(
        (status = 200, description = "Conflicts and alternative starts", body = ConflictCheckResponse),
        (status = 404, description = "Staff member not found")
    )
)]
pub async fn check_conflicts(
    State(state): State<crate::AppState>,
    Json(request): Json<ConflictCheckRequest>,
) -> AppResult<Json<ConflictCheckResponse>> {
    request.validate()?;
    let response = state.services.appointments.check_conflicts(&request).await?;
    Ok(Json(response))
}

/// Lock an appointment for the calling session
#[utoipa::path(
    post,
    path = "/appointments/{uuid}/lock",
    tag = "appointments",
    params(
        ("uuid" = Uuid, Path, description = "Appointment UUID"),
        ("X-Session-Id" = String, Header, description = "Booking session")
    ),
    request_body = AppointmentLockRequest,
    responses(
        (status = 200, description = "Lock held by this session", body = AppointmentLockStatus),
        (status = 404, description = "Appointment not found"),
        (status = 423, description = "Locked by another session")
    )
)]
pub async fn lock_appointment(
    State(state): State<crate::AppState>,
    Path(uuid): Path<Uuid>,
    SessionId(session_id): SessionId,
    request: Option<Json<AppointmentLockRequest>>,
) -> AppResult<Json<AppointmentLockStatus>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let (acquired, status) = state
        .services
        .appointments
        .lock(uuid, &session_id, request.lock_duration_minutes)
        .await?;
    if !acquired {
        return Err(AppError::LockContention);
    }
    Ok(Json(status))
}

/// Release an appointment lock; without a session header this forces the unlock
#[utoipa::path(
    delete,
    path = "/appointments/{uuid}/lock",
    tag = "appointments",
    params(
        ("uuid" = Uuid, Path, description = "Appointment UUID"),
        ("X-Session-Id" = Option<String>, Header, description = "Holder session")
    ),
    responses(
        (status = 200, description = "Lock released", body = AppointmentLockStatus),
        (status = 404, description = "Appointment not found"),
        (status = 423, description = "Locked by another session")
    )
)]
pub async fn unlock_appointment(
    State(state): State<crate::AppState>,
    Path(uuid): Path<Uuid>,
    MaybeSessionId(session_id): MaybeSessionId,
) -> AppResult<Json<AppointmentLockStatus>> {
    let (released, status) = state
        .services
        .appointments
        .unlock(uuid, session_id.as_deref())
        .await?;
    if !released && status.locked {
        return Err(AppError::LockContention);
    }
    Ok(Json(status))
}

/// Current row lock of an appointment
#[utoipa::path(
    get,
    path = "/appointments/{uuid}/lock",
    tag = "appointments",
    params(("uuid" = Uuid, Path, description = "Appointment UUID")),
    responses(
        (status = 200, description = "Lock status", body = AppointmentLockStatus),
        (status = 404, description = "Appointment not found")
    )
)]
pub async fn lock_status(
    State(state): State<crate::AppState>,
    Path(uuid): Path<Uuid>,
) -> AppResult<Json<AppointmentLockStatus>> {
    let status = state.services.appointments.lock_status(uuid).await?;
    Ok(Json(status))
}
