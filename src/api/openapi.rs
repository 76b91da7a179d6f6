//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{appointments, health, scheduling};
use crate::models::{appointment, enums, scheduling as schedule_models};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Slotbook API",
        version = "1.0.0",
        description = "Appointment scheduling and availability REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Scheduling
        scheduling::get_staff_availability,
        scheduling::validate_appointment,
        scheduling::get_business_hours,
        scheduling::get_staff_schedule,
        scheduling::lock_slot,
        scheduling::unlock_slot,
        scheduling::slot_lock_status,
        // Appointments
        appointments::create_appointment,
        appointments::get_appointment,
        appointments::reschedule_appointment,
        appointments::transition_status,
        appointments::cancellation_policy,
        appointments::check_conflicts,
        appointments::lock_appointment,
        appointments::unlock_appointment,
        appointments::lock_status,
    ),
    components(
        schemas(
            // Scheduling
            schedule_models::Slot,
            schedule_models::SlotMetadata,
            schedule_models::SchedulingConflict,
            schedule_models::AppointmentValidationRequest,
            schedule_models::ValidationResult,
            schedule_models::BusinessHours,
            schedule_models::OpeningHours,
            schedule_models::BreakHours,
            schedule_models::ScheduledDay,
            schedule_models::ScheduledAppointment,
            schedule_models::StaffSchedule,
            schedule_models::SlotLockRequest,
            schedule_models::SlotLockResponse,
            crate::models::TimeOff,
            crate::models::AvailabilityOverride,
            // Appointments
            crate::models::Appointment,
            appointment::CreateAppointmentRequest,
            appointment::RescheduleRequest,
            appointment::StatusTransitionRequest,
            appointment::CancellationPolicyResponse,
            appointment::ConflictCheckRequest,
            appointment::ConflictingAppointment,
            appointment::ConflictCheckResponse,
            appointment::AppointmentLockRequest,
            appointment::AppointmentLockStatus,
            // Enums
            enums::AppointmentStatus,
            enums::CancellationReason,
            enums::AvailabilityStatus,
            enums::ConflictType,
            enums::TimeOffStatus,
            enums::TimeOffType,
            enums::OverrideType,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "scheduling", description = "Availability, validation and staff schedules"),
        (name = "appointments", description = "Appointment lifecycle and locks")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
