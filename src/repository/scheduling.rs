//! Scheduling lookups (businesses, staff, services, hours, exceptions)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{types::Json, FromRow, Pool, Postgres};
use uuid::Uuid;

use super::SchedulingRepository;
use crate::{
    error::{AppError, AppResult},
    models::{
        enums::{weekday_from_i16, OverrideType, TimeOffStatus, TimeOffType},
        Appointment, AvailabilityOverride, Business, BusinessPolicy, Customer, Owner, Service,
        ServiceAddon, Staff, TimeOff, TimeWindow, WorkingHours,
    },
};

fn corrupt(table: &str, id: i32, e: String) -> AppError {
    AppError::Internal(format!("Corrupt {} row {}: {}", table, id, e))
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct BusinessRow {
    id: i32,
    uuid: Uuid,
    name: String,
    timezone: String,
    policy: Option<Json<BusinessPolicy>>,
}

impl From<BusinessRow> for Business {
    fn from(row: BusinessRow) -> Self {
        Business {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            timezone: row.timezone,
            policy: row.policy.map(|p| p.0).unwrap_or_default(),
        }
    }
}

#[derive(FromRow)]
struct StaffRow {
    id: i32,
    uuid: Uuid,
    business_id: i32,
    name: String,
    is_active: bool,
    is_bookable: bool,
}

#[derive(FromRow)]
struct CustomerRow {
    id: i32,
    uuid: Uuid,
    business_id: i32,
    name: String,
    no_show_count: i32,
}

#[derive(FromRow)]
struct ServiceRow {
    id: i32,
    uuid: Uuid,
    business_id: i32,
    name: String,
    duration_minutes: i32,
    buffer_before_minutes: i32,
    buffer_after_minutes: i32,
    price: Decimal,
    is_active: bool,
    min_lead_time_hours: Option<i32>,
    max_advance_booking_days: Option<i32>,
}

#[derive(FromRow)]
struct AddonRow {
    id: i32,
    uuid: Uuid,
    service_id: i32,
    name: String,
    extra_duration_minutes: i32,
    price: Decimal,
    is_active: bool,
}

#[derive(FromRow)]
struct WorkingHoursRow {
    id: i32,
    owner_type: String,
    owner_id: i32,
    weekday: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
    break_start_time: Option<NaiveTime>,
    break_end_time: Option<NaiveTime>,
    is_active: bool,
    effective_from: Option<NaiveDate>,
    effective_until: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl From<StaffRow> for Staff {
    fn from(r: StaffRow) -> Self {
        Staff {
            id: r.id,
            uuid: r.uuid,
            business_id: r.business_id,
            name: r.name,
            is_active: r.is_active,
            is_bookable: r.is_bookable,
        }
    }
}

impl From<ServiceRow> for Service {
    fn from(r: ServiceRow) -> Self {
        Service {
            id: r.id,
            uuid: r.uuid,
            business_id: r.business_id,
            name: r.name,
            duration_minutes: r.duration_minutes,
            buffer_before_minutes: r.buffer_before_minutes,
            buffer_after_minutes: r.buffer_after_minutes,
            price: r.price,
            is_active: r.is_active,
            min_lead_time_hours: r.min_lead_time_hours,
            max_advance_booking_days: r.max_advance_booking_days,
        }
    }
}

impl TryFrom<WorkingHoursRow> for WorkingHours {
    type Error = AppError;

    fn try_from(row: WorkingHoursRow) -> AppResult<Self> {
        Ok(WorkingHours {
            id: row.id,
            owner: Owner::from_parts(&row.owner_type, row.owner_id)
                .map_err(|e| corrupt("working_hours", row.id, e))?,
            weekday: weekday_from_i16(row.weekday).map_err(|e| corrupt("working_hours", row.id, e))?,
            start_time: row.start_time,
            end_time: row.end_time,
            break_start_time: row.break_start_time,
            break_end_time: row.break_end_time,
            is_active: row.is_active,
            effective_from: row.effective_from,
            effective_until: row.effective_until,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct TimeOffRow {
    id: i32,
    uuid: Uuid,
    owner_type: String,
    owner_id: i32,
    start_datetime: DateTime<Utc>,
    end_datetime: DateTime<Utc>,
    time_off_type: TimeOffType,
    status: TimeOffStatus,
    reason: Option<String>,
    is_all_day: bool,
    recurrence_rule: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TimeOffRow> for TimeOff {
    type Error = AppError;

    fn try_from(row: TimeOffRow) -> AppResult<Self> {
        Ok(TimeOff {
            id: row.id,
            uuid: row.uuid,
            owner: Owner::from_parts(&row.owner_type, row.owner_id)
                .map_err(|e| corrupt("time_off", row.id, e))?,
            start_datetime: row.start_datetime,
            end_datetime: row.end_datetime,
            time_off_type: row.time_off_type,
            status: row.status,
            reason: row.reason,
            is_all_day: row.is_all_day,
            recurrence_rule: row.recurrence_rule,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct OverrideRow {
    id: i32,
    uuid: Uuid,
    staff_id: i32,
    override_type: OverrideType,
    start_datetime: DateTime<Utc>,
    end_datetime: DateTime<Utc>,
    is_active: bool,
    allow_new_bookings: bool,
    max_concurrent_appointments: Option<i32>,
    title: Option<String>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<OverrideRow> for AvailabilityOverride {
    fn from(row: OverrideRow) -> Self {
        AvailabilityOverride {
            id: row.id,
            uuid: row.uuid,
            staff_id: row.staff_id,
            override_type: row.override_type,
            start_datetime: row.start_datetime,
            end_datetime: row.end_datetime,
            is_active: row.is_active,
            allow_new_bookings: row.allow_new_bookings,
            max_concurrent_appointments: row.max_concurrent_appointments,
            title: row.title,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgSchedulingRepository {
    pool: Pool<Postgres>,
}

impl PgSchedulingRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchedulingRepository for PgSchedulingRepository {
    async fn find_business_by_id(&self, id: i32) -> AppResult<Option<Business>> {
        let row = sqlx::query_as::<_, BusinessRow>(
            "SELECT id, uuid, name, timezone, policy FROM businesses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Business::from))
    }

    async fn find_business_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Business>> {
        let row = sqlx::query_as::<_, BusinessRow>(
            "SELECT id, uuid, name, timezone, policy FROM businesses WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Business::from))
    }

    async fn find_staff_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Staff>> {
        let row = sqlx::query_as::<_, StaffRow>(
            "SELECT id, uuid, business_id, name, is_active, is_bookable FROM staff WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Staff::from))
    }

    async fn find_staff_by_id(&self, id: i32) -> AppResult<Option<Staff>> {
        let row = sqlx::query_as::<_, StaffRow>(
            "SELECT id, uuid, business_id, name, is_active, is_bookable FROM staff WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Staff::from))
    }

    async fn find_service_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            SELECT id, uuid, business_id, name, duration_minutes,
                   buffer_before_minutes, buffer_after_minutes, price, is_active,
                   min_lead_time_hours, max_advance_booking_days
            FROM services
            WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Service::from))
    }

    async fn find_service_by_id(&self, id: i32) -> AppResult<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            SELECT id, uuid, business_id, name, duration_minutes,
                   buffer_before_minutes, buffer_after_minutes, price, is_active,
                   min_lead_time_hours, max_advance_booking_days
            FROM services
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Service::from))
    }

    async fn find_customer_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, uuid, business_id, name, no_show_count FROM customers WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Customer {
            id: r.id,
            uuid: r.uuid,
            business_id: r.business_id,
            name: r.name,
            no_show_count: r.no_show_count,
        }))
    }

    async fn find_addons(&self, service_id: i32, uuids: &[Uuid]) -> AppResult<Vec<ServiceAddon>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, AddonRow>(
            r#"
            SELECT id, uuid, service_id, name, extra_duration_minutes, price, is_active
            FROM service_addons
            WHERE service_id = $1 AND uuid = ANY($2) AND is_active
            ORDER BY id
            "#,
        )
        .bind(service_id)
        .bind(uuids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ServiceAddon {
                id: r.id,
                uuid: r.uuid,
                service_id: r.service_id,
                name: r.name,
                extra_duration_minutes: r.extra_duration_minutes,
                price: r.price,
                is_active: r.is_active,
            })
            .collect())
    }

    async fn working_hours(&self, owner: Owner) -> AppResult<Vec<WorkingHours>> {
        let rows = sqlx::query_as::<_, WorkingHoursRow>(
            r#"
            SELECT * FROM working_hours
            WHERE owner_type = $1 AND owner_id = $2
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner.kind())
        .bind(owner.id())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkingHours::try_from).collect()
    }

    async fn approved_time_off(&self, staff_id: i32, window: TimeWindow) -> AppResult<Vec<TimeOff>> {
        let rows = sqlx::query_as::<_, TimeOffRow>(
            r#"
            SELECT * FROM time_off
            WHERE owner_type = 'staff' AND owner_id = $1
              AND status = 'approved'
              AND start_datetime < $3 AND end_datetime > $2
            ORDER BY start_datetime
            "#,
        )
        .bind(staff_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TimeOff::try_from).collect()
    }

    async fn active_overrides(
        &self,
        staff_id: i32,
        window: TimeWindow,
    ) -> AppResult<Vec<AvailabilityOverride>> {
        let rows = sqlx::query_as::<_, OverrideRow>(
            r#"
            SELECT * FROM availability_overrides
            WHERE staff_id = $1 AND is_active
              AND start_datetime < $3 AND end_datetime > $2
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(staff_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AvailabilityOverride::from).collect())
    }

    async fn non_cancelled_appointments(
        &self,
        staff_id: i32,
        window: TimeWindow,
    ) -> AppResult<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT * FROM appointments
            WHERE staff_id = $1
              AND status IN ('tentative', 'confirmed', 'in_progress')
              AND scheduled_datetime < $3 AND estimated_end_datetime > $2
            ORDER BY scheduled_datetime
            "#,
        )
        .bind(staff_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
