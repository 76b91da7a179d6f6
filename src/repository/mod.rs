//! Repository layer: storage ports consumed by the engine and their
//! PostgreSQL implementations

pub mod appointments;
pub mod scheduling;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        appointment::NewAppointment, Appointment, AppointmentStatus, AvailabilityOverride, Business, Customer,
        Owner, Service, ServiceAddon, Staff, TimeOff, TimeWindow, WorkingHours,
    },
};

/// Read-only lookups the scheduling engine needs
#[async_trait]
pub trait SchedulingRepository: Send + Sync {
    async fn find_business_by_id(&self, id: i32) -> AppResult<Option<Business>>;
    async fn find_business_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Business>>;
    async fn find_staff_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Staff>>;
    async fn find_staff_by_id(&self, id: i32) -> AppResult<Option<Staff>>;
    async fn find_service_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Service>>;
    async fn find_service_by_id(&self, id: i32) -> AppResult<Option<Service>>;
    async fn find_customer_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Customer>>;

    /// Active add-ons of `service_id` among `uuids`
    async fn find_addons(&self, service_id: i32, uuids: &[Uuid]) -> AppResult<Vec<ServiceAddon>>;

    /// Every working-hours record of an owner, newest first
    async fn working_hours(&self, owner: Owner) -> AppResult<Vec<WorkingHours>>;

    /// Approved time off of a staff member overlapping `window`
    async fn approved_time_off(&self, staff_id: i32, window: TimeWindow) -> AppResult<Vec<TimeOff>>;

    /// Active overrides of a staff member overlapping `window`, newest first
    async fn active_overrides(
        &self,
        staff_id: i32,
        window: TimeWindow,
    ) -> AppResult<Vec<AvailabilityOverride>>;

    /// Tentative, confirmed and in-progress appointments overlapping `window`
    async fn non_cancelled_appointments(
        &self,
        staff_id: i32,
        window: TimeWindow,
    ) -> AppResult<Vec<Appointment>>;
}

/// Appointment writes
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn find_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Appointment>>;

    /// Insert unless another blocking appointment of the same staff member
    /// overlaps. The overlap check and the insert share one transaction.
    async fn insert_if_free(&self, new: &NewAppointment) -> AppResult<Appointment>;

    /// Persist a moved appointment with the same write-time overlap check,
    /// ignoring the appointment itself
    async fn save_rescheduled(&self, appointment: &Appointment) -> AppResult<Appointment>;

    /// Persist status and cancellation fields only while the stored status
    /// is still `expected`. A move into `no_show` bumps the customer's
    /// no-show counter in the same transaction. `None` when the status
    /// changed underneath.
    async fn save_transition(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> AppResult<Option<Appointment>>;

    /// Take the row lock for `session_id` when the row is unlocked, its lock
    /// expired at `now`, or the session already holds it. `None` on contention.
    async fn try_lock(
        &self,
        id: i32,
        session_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Option<Appointment>>;

    /// Clear the row lock when `session_id` holds it, or unconditionally
    /// without a session. `None` when another session holds it.
    async fn release_lock(&self, id: i32, session_id: Option<&str>) -> AppResult<Option<Appointment>>;

    /// Clear every row lock that expired before `now`; returns the count
    async fn reap_expired_locks(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub scheduling: scheduling::PgSchedulingRepository,
    pub appointments: appointments::PgAppointmentRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            scheduling: scheduling::PgSchedulingRepository::new(pool.clone()),
            appointments: appointments::PgAppointmentRepository::new(pool.clone()),
            pool,
        }
    }
}
