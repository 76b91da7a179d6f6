//! API handlers for the scheduling REST endpoints

pub mod appointments;
pub mod health;
pub mod openapi;
pub mod scheduling;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, AppState};

/// Header carrying the caller's booking session
pub const SESSION_HEADER: &str = "x-session-id";

/// Booking session id, required
pub struct SessionId(pub String);

/// Booking session id, when the caller sent one
pub struct MaybeSessionId(pub Option<String>);

fn read_session(parts: &Parts) -> Result<Option<String>, AppError> {
    match parts.headers.get(SESSION_HEADER) {
        None => Ok(None),
        Some(value) => {
            let session = value
                .to_str()
                .map_err(|_| AppError::BadRequest("Invalid X-Session-Id header".to_string()))?
                .trim();
            if session.is_empty() || session.len() > 128 {
                return Err(AppError::BadRequest("Invalid X-Session-Id header".to_string()));
            }
            Ok(Some(session.to_string()))
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        read_session(parts)?
            .map(SessionId)
            .ok_or_else(|| AppError::BadRequest("Missing X-Session-Id header".to_string()))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeSessionId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSessionId(read_session(parts)?))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Scheduling
        .route("/scheduling/staff/availability", get(scheduling::get_staff_availability))
        .route("/scheduling/appointments/validate", post(scheduling::validate_appointment))
        .route("/scheduling/business-hours", get(scheduling::get_business_hours))
        .route("/scheduling/staff/:uuid/schedule", get(scheduling::get_staff_schedule))
        .route(
            "/scheduling/slot-locks",
            post(scheduling::lock_slot).delete(scheduling::unlock_slot),
        )
        .route("/scheduling/slot-locks/status", get(scheduling::slot_lock_status))
        // Appointments
        .route("/appointments", post(appointments::create_appointment))
        .route("/appointments/conflicts", post(appointments::check_conflicts))
        .route("/appointments/:uuid", get(appointments::get_appointment))
        .route("/appointments/:uuid/reschedule", post(appointments::reschedule_appointment))
        .route("/appointments/:uuid/status", post(appointments::transition_status))
        .route(
            "/appointments/:uuid/cancellation-policy",
            get(appointments::cancellation_policy),
        )
        .route(
            "/appointments/:uuid/lock",
            post(appointments::lock_appointment)
                .delete(appointments::unlock_appointment)
                .get(appointments::lock_status),
        )
        .with_state(state);

    // OpenAPI documentation
    let openapi = openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
