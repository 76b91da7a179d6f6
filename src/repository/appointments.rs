//! Appointments repository: transactional inserts and state updates

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use super::AppointmentRepository;
use crate::{
    error::{AppError, AppResult},
    models::{
        appointment::NewAppointment, Appointment, AppointmentStatus, ConflictType, SchedulingConflict, TimeWindow,
    },
};

/// Advisory lock namespace for per-staff booking serialization
const STAFF_BOOKING_LOCK: i32 = 7_001;

#[derive(Clone)]
pub struct PgAppointmentRepository {
    pool: Pool<Postgres>,
}

impl PgAppointmentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Serialize bookings of one staff member for the rest of `tx`, then
    /// fail if a blocking appointment overlaps `window`.
    async fn ensure_free(
        tx: &mut Transaction<'_, Postgres>,
        staff_id: i32,
        window: TimeWindow,
        exclude_id: Option<i32>,
    ) -> AppResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(STAFF_BOOKING_LOCK)
            .bind(staff_id)
            .execute(&mut **tx)
            .await?;

        let clashing: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT uuid FROM appointments
            WHERE staff_id = $1
              AND status IN ('tentative', 'confirmed', 'in_progress')
              AND scheduled_datetime < $3 AND estimated_end_datetime > $2
              AND ($4::int IS NULL OR id <> $4)
            "#,
        )
        .bind(staff_id)
        .bind(window.start)
        .bind(window.end)
        .bind(exclude_id)
        .fetch_all(&mut **tx)
        .await?;

        if clashing.is_empty() {
            return Ok(());
        }

        let conflicts = clashing
            .into_iter()
            .map(|(uuid,)| {
                SchedulingConflict::error(
                    ConflictType::ExistingAppointment,
                    "Slot was booked by a concurrent request",
                    &window,
                )
                .with_entity(uuid)
            })
            .collect();
        Err(AppError::SchedulingConflict(conflicts))
    }
}

#[async_trait]
impl AppointmentRepository for PgAppointmentRepository {
    async fn find_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Appointment>> {
        let row = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_if_free(&self, new: &NewAppointment) -> AppResult<Appointment> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_free(&mut tx, new.staff_id, new.window(), None).await?;

        let appointment = sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointments (
                uuid, business_id, customer_id, staff_id, service_id,
                scheduled_datetime, estimated_end_datetime, duration_minutes,
                status, status_changed_at, booking_source, total_price,
                deposit_required, deposit_amount, customer_notes, internal_notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'tentative', NOW(), $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.business_id)
        .bind(new.customer_id)
        .bind(new.staff_id)
        .bind(new.service_id)
        .bind(new.scheduled_datetime)
        .bind(new.estimated_end_datetime)
        .bind(new.duration_minutes)
        .bind(&new.booking_source)
        .bind(new.total_price)
        .bind(new.deposit_required)
        .bind(new.deposit_amount)
        .bind(&new.customer_notes)
        .bind(&new.internal_notes)
        .fetch_one(&mut *tx)
        .await?;

        for addon in &new.addons {
            sqlx::query(
                r#"
                INSERT INTO appointment_addons
                    (appointment_id, addon_id, addon_name, addon_price, addon_duration_minutes, quantity)
                VALUES ($1, $2, $3, $4, $5, 1)
                "#,
            )
            .bind(appointment.id)
            .bind(addon.addon_id)
            .bind(&addon.addon_name)
            .bind(addon.addon_price)
            .bind(addon.addon_duration_minutes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(appointment)
    }

    async fn save_rescheduled(&self, appointment: &Appointment) -> AppResult<Appointment> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_free(&mut tx, appointment.staff_id, appointment.window(), Some(appointment.id))
            .await?;

        let saved = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments SET
                scheduled_datetime = $2,
                estimated_end_datetime = $3,
                reschedule_count = $4,
                rescheduled_from_datetime = $5,
                internal_notes = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(appointment.id)
        .bind(appointment.scheduled_datetime)
        .bind(appointment.estimated_end_datetime)
        .bind(appointment.reschedule_count)
        .bind(appointment.rescheduled_from_datetime)
        .bind(&appointment.internal_notes)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Appointment {} not found", appointment.uuid)))?;

        tx.commit().await?;
        Ok(saved)
    }

    async fn save_transition(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> AppResult<Option<Appointment>> {
        let mut tx = self.pool.begin().await?;

        let saved = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments SET
                status = $3,
                previous_status = $4,
                status_changed_at = $5,
                actual_start_datetime = $6,
                actual_end_datetime = $7,
                cancelled_at = $8,
                cancelled_by_staff_id = $9,
                cancellation_reason = $10,
                cancellation_notes = $11,
                cancellation_fee = $12,
                no_show_fee = $13,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(appointment.id)
        .bind(expected)
        .bind(appointment.status)
        .bind(appointment.previous_status)
        .bind(appointment.status_changed_at)
        .bind(appointment.actual_start_datetime)
        .bind(appointment.actual_end_datetime)
        .bind(appointment.cancelled_at)
        .bind(appointment.cancelled_by_staff_id)
        .bind(appointment.cancellation_reason)
        .bind(&appointment.cancellation_notes)
        .bind(appointment.cancellation_fee)
        .bind(appointment.no_show_fee)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(saved) = saved else {
            return Ok(None);
        };

        if saved.status == AppointmentStatus::NoShow {
            let result = sqlx::query(
                "UPDATE customers SET no_show_count = no_show_count + 1 WHERE id = $1",
            )
            .bind(saved.customer_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotFound(format!("Customer {} not found", saved.customer_id)));
            }
        }

        tx.commit().await?;
        Ok(Some(saved))
    }

    async fn try_lock(
        &self,
        id: i32,
        session_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Option<Appointment>> {
        let row = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments SET
                slot_locked = TRUE,
                slot_locked_at = $3,
                slot_lock_expires_at = $4,
                locked_by_session_id = $2,
                updated_at = NOW()
            WHERE id = $1
              AND (NOT slot_locked
                   OR slot_lock_expires_at <= $3
                   OR locked_by_session_id = $2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(session_id)
        .bind(now)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn release_lock(&self, id: i32, session_id: Option<&str>) -> AppResult<Option<Appointment>> {
        let row = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments SET
                slot_locked = FALSE,
                slot_locked_at = NULL,
                slot_lock_expires_at = NULL,
                locked_by_session_id = NULL,
                updated_at = NOW()
            WHERE id = $1 AND ($2::text IS NULL OR locked_by_session_id = $2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn reap_expired_locks(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE appointments SET
                slot_locked = FALSE,
                slot_locked_at = NULL,
                slot_lock_expires_at = NULL,
                locked_by_session_id = NULL
            WHERE slot_locked AND slot_lock_expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
