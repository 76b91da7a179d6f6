//! Appointment lifecycle: booking, rescheduling, status changes and row locks

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    availability::{AvailabilityCalculator, BookingContext},
    clock::Clock,
    conflicts::ConflictValidator,
    locks::SlotLockManager,
};
use crate::{
    config::SchedulingConfig,
    error::{AppError, AppResult},
    models::{
        appointment::{
            AppointmentAddonLine, AppointmentLockStatus, CancellationPolicyResponse,
            ConflictCheckRequest, ConflictCheckResponse, ConflictingAppointment,
            CreateAppointmentRequest, NewAppointment, RescheduleRequest, StatusTransitionRequest,
        },
        scheduling::AppointmentValidationRequest,
        Appointment, AppointmentStatus, Business, TimeWindow,
    },
    repository::{AppointmentRepository, SchedulingRepository},
};

#[derive(Clone)]
pub struct AppointmentService {
    repo: Arc<dyn SchedulingRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    calculator: AvailabilityCalculator,
    validator: ConflictValidator,
    locks: SlotLockManager,
    clock: Arc<dyn Clock>,
    default_cancellation_window_hours: i64,
    late_cancellation_fee_percent: Decimal,
    row_lock_ttl_minutes: i64,
    conflict_check_alternatives: usize,
}

impl AppointmentService {
    pub fn new(
        repo: Arc<dyn SchedulingRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        calculator: AvailabilityCalculator,
        validator: ConflictValidator,
        locks: SlotLockManager,
        clock: Arc<dyn Clock>,
        config: &SchedulingConfig,
    ) -> Self {
        Self {
            repo,
            appointments,
            calculator,
            validator,
            locks,
            clock,
            default_cancellation_window_hours: config.default_cancellation_window_hours,
            late_cancellation_fee_percent: config.late_cancellation_fee_percent,
            row_lock_ttl_minutes: config.row_lock_ttl_minutes,
            conflict_check_alternatives: config.conflict_check_alternatives,
        }
    }

    pub async fn get(&self, uuid: Uuid) -> AppResult<Appointment> {
        self.appointments
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Appointment {} not found", uuid)))
    }

    async fn business(&self, id: i32) -> AppResult<Business> {
        self.repo
            .find_business_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Business {} not found", id)))
    }

    // ---- Booking ----

    /// Book an appointment. The slot is validated, the out-of-band key lock
    /// is honored, and the insert re-checks overlaps in its own transaction.
    pub async fn create(
        &self,
        request: CreateAppointmentRequest,
        session_id: Option<&str>,
    ) -> AppResult<Appointment> {
        let staff = self
            .repo
            .find_staff_by_uuid(request.staff_uuid)
            .await?
            .filter(|s| s.accepts_bookings())
            .ok_or_else(|| AppError::NotFound("Staff member not found".to_string()))?;
        let service = self
            .repo
            .find_service_by_uuid(request.service_uuid)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;
        let customer = self
            .repo
            .find_customer_by_uuid(request.customer_uuid)
            .await?
            .ok_or_else(|| AppError::NotFound("Customer not found".to_string()))?;

        if service.business_id != staff.business_id || customer.business_id != staff.business_id {
            return Err(AppError::BadRequest(
                "Staff member, service and customer must belong to the same business".to_string(),
            ));
        }

        let requested: HashSet<Uuid> = request.addon_uuids.iter().copied().collect();
        let addons = if requested.is_empty() {
            Vec::new()
        } else {
            self.repo.find_addons(service.id, &request.addon_uuids).await?
        };
        if addons.len() != requested.len() {
            return Err(AppError::BadRequest(
                "One or more add-ons do not belong to the service".to_string(),
            ));
        }

        let validation = self
            .validator
            .validate_excluding(
                &AppointmentValidationRequest {
                    staff_uuid: staff.uuid,
                    service_uuid: service.uuid,
                    requested_datetime: request.scheduled_datetime,
                    customer_uuid: Some(customer.uuid),
                    addon_uuids: request.addon_uuids.clone(),
                },
                None,
            )
            .await?;
        if !validation.result.is_valid {
            return Err(AppError::SchedulingConflict(validation.result.conflicts));
        }
        let business = match validation.context {
            Some((ctx, _)) => ctx.business,
            None => self.business(staff.business_id).await?,
        };

        let key = SlotLockManager::key(business.id, staff.id, request.scheduled_datetime);
        let holder = self.locks.holder(&key).await?;
        if let Some(holder) = &holder {
            if Some(holder.as_str()) != session_id {
                return Err(AppError::LockContention);
            }
        }

        let duration = validation.result.total_duration_minutes;
        let total_price = service.price + addons.iter().map(|a| a.price).sum::<Decimal>();
        let deposit_amount = business.policy.deposit_required.then(|| {
            let pct = business.policy.deposit_percentage.unwrap_or(Decimal::ZERO);
            (total_price * pct / Decimal::ONE_HUNDRED).round_dp(2)
        });

        let new = NewAppointment {
            business_id: business.id,
            customer_id: customer.id,
            staff_id: staff.id,
            service_id: service.id,
            scheduled_datetime: request.scheduled_datetime,
            estimated_end_datetime: request.scheduled_datetime + Duration::minutes(duration),
            duration_minutes: duration as i32,
            booking_source: request.booking_source.unwrap_or_else(|| "admin".to_string()),
            total_price,
            deposit_required: business.policy.deposit_required,
            deposit_amount,
            customer_notes: request.customer_notes,
            internal_notes: request.internal_notes,
            addons: addons
                .iter()
                .map(|a| AppointmentAddonLine {
                    addon_id: a.id,
                    addon_name: a.name.clone(),
                    addon_price: a.price,
                    addon_duration_minutes: a.extra_duration_minutes,
                })
                .collect(),
        };
        let mut appointment = self.appointments.insert_if_free(&new).await?;

        if holder.is_some() {
            self.locks.unlock(&key, session_id).await?;
        }
        if let Some(session) = session_id {
            let now = self.clock.now();
            let expires_at = now + Duration::minutes(self.row_lock_ttl_minutes);
            if let Some(locked) = self
                .appointments
                .try_lock(appointment.id, session, now, expires_at)
                .await?
            {
                appointment = locked;
            }
        }

        tracing::info!(
            appointment_uuid = %appointment.uuid,
            staff_uuid = %staff.uuid,
            start = %appointment.scheduled_datetime,
            "Appointment booked"
        );
        Ok(appointment)
    }

    // ---- Reschedule ----

    /// Move an appointment in place. A key lock on the target slot held by
    /// another session blocks the move, as it blocks a new booking.
    pub async fn reschedule(
        &self,
        uuid: Uuid,
        request: RescheduleRequest,
        session_id: Option<&str>,
    ) -> AppResult<Appointment> {
        let mut appointment = self.get(uuid).await?;
        if appointment.status.is_terminal() {
            return Err(AppError::BusinessRule(format!(
                "Cannot reschedule an appointment in status {}",
                appointment.status
            )));
        }

        let staff = self
            .repo
            .find_staff_by_id(appointment.staff_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Staff member not found".to_string()))?;
        let service = self
            .repo
            .find_service_by_id(appointment.service_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;
        let business = self.business(appointment.business_id).await?;
        let ctx = BookingContext {
            business,
            staff,
            service: Some(service.clone()),
        };

        let result = self
            .validator
            .validate_for(
                &ctx,
                &service,
                request.new_scheduled_datetime,
                appointment.duration_minutes as i64,
                Some(appointment.id),
            )
            .await?;
        if !result.is_valid {
            return Err(AppError::SchedulingConflict(result.conflicts));
        }

        let key = SlotLockManager::key(
            appointment.business_id,
            appointment.staff_id,
            request.new_scheduled_datetime,
        );
        let holder = self.locks.holder(&key).await?;
        if let Some(holder) = &holder {
            if Some(holder.as_str()) != session_id {
                return Err(AppError::LockContention);
            }
        }

        let from = appointment.scheduled_datetime;
        let note = format!(
            "Rescheduled: {}",
            request.reason.as_deref().unwrap_or("No reason provided")
        );
        appointment.reschedule_to(request.new_scheduled_datetime, &note);
        let saved = self.appointments.save_rescheduled(&appointment).await?;
        if holder.is_some() {
            self.locks.unlock(&key, session_id).await?;
        }

        tracing::info!(
            appointment_uuid = %uuid,
            %from,
            to = %saved.scheduled_datetime,
            "Appointment rescheduled"
        );
        Ok(saved)
    }

    // ---- Status ----

    pub async fn transition_status(
        &self,
        uuid: Uuid,
        request: StatusTransitionRequest,
    ) -> AppResult<Appointment> {
        let mut appointment = self.get(uuid).await?;
        let now = self.clock.now();
        let previous = appointment.status;

        match request.status {
            AppointmentStatus::Cancelled => {
                let business = self.business(appointment.business_id).await?;
                let assessment = self.assess(&appointment, &business, now);
                appointment.transition_to(AppointmentStatus::Cancelled, now)?;
                appointment.cancelled_by_staff_id = request.staff_id;
                appointment.cancellation_reason = request.cancellation_reason;
                appointment.cancellation_notes = request.cancellation_notes;
                appointment.cancellation_fee = request.cancellation_fee.or(assessment.cancellation_fee);
            }
            AppointmentStatus::NoShow => {
                let business = self.business(appointment.business_id).await?;
                appointment.transition_to(AppointmentStatus::NoShow, now)?;
                appointment.no_show_fee = request.no_show_fee.or(business.policy.no_show_fee);
            }
            next => appointment.transition_to(next, now)?,
        }

        // Compare-and-set on the status read above; a concurrent change wins
        let Some(saved) = self.appointments.save_transition(&appointment, previous).await? else {
            let current = self.get(uuid).await?;
            return Err(AppError::InvalidTransition {
                current: current.status,
                requested: request.status,
            });
        };
        tracing::info!(
            appointment_uuid = %uuid,
            from = %previous,
            to = %saved.status,
            "Appointment status changed"
        );
        Ok(saved)
    }

    fn assess(&self, appointment: &Appointment, business: &Business, at: DateTime<Utc>) -> CancellationPolicyResponse {
        let window_hours = business
            .policy
            .cancellation_window_hours
            .map(i64::from)
            .unwrap_or(self.default_cancellation_window_hours);
        appointment.assess_cancellation(at, window_hours, self.late_cancellation_fee_percent)
    }

    pub async fn cancellation_policy(
        &self,
        uuid: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> AppResult<CancellationPolicyResponse> {
        let appointment = self.get(uuid).await?;
        let business = self.business(appointment.business_id).await?;
        Ok(self.assess(&appointment, &business, at.unwrap_or_else(|| self.clock.now())))
    }

    // ---- Conflicts ----

    pub async fn check_conflicts(&self, request: &ConflictCheckRequest) -> AppResult<ConflictCheckResponse> {
        let staff = self
            .repo
            .find_staff_by_uuid(request.staff_uuid)
            .await?
            .ok_or_else(|| AppError::NotFound("Staff member not found".to_string()))?;
        let exclude = match request.exclude_appointment_uuid {
            Some(uuid) => Some(self.get(uuid).await?.id),
            None => None,
        };

        let duration = request.duration_minutes as i64;
        let window = TimeWindow::from_duration(request.scheduled_datetime, duration);
        let conflicts: Vec<ConflictingAppointment> = self
            .repo
            .non_cancelled_appointments(staff.id, window)
            .await?
            .into_iter()
            .filter(|a| a.blocks_time() && Some(a.id) != exclude && a.window().overlaps(&window))
            .map(|a| ConflictingAppointment {
                uuid: a.uuid,
                scheduled_datetime: a.scheduled_datetime,
                estimated_end_datetime: a.estimated_end_datetime,
                status: a.status,
            })
            .collect();

        let alternative_slots = if conflicts.is_empty() {
            Vec::new()
        } else {
            match self.calculator.context(staff.uuid, None).await? {
                Some(ctx) => {
                    self.validator
                        .alternative_starts(
                            &ctx,
                            request.scheduled_datetime,
                            duration,
                            exclude,
                            self.conflict_check_alternatives,
                        )
                        .await?
                }
                None => Vec::new(),
            }
        };

        Ok(ConflictCheckResponse {
            has_conflict: !conflicts.is_empty(),
            conflicts,
            alternative_slots,
        })
    }

    // ---- Row locks ----

    /// Lock the appointment row for a session; `false` when another live
    /// session holds it
    pub async fn lock(
        &self,
        uuid: Uuid,
        session_id: &str,
        ttl_minutes: Option<i64>,
    ) -> AppResult<(bool, AppointmentLockStatus)> {
        let appointment = self.get(uuid).await?;
        let now = self.clock.now();
        let ttl = Duration::minutes(ttl_minutes.unwrap_or(self.row_lock_ttl_minutes));

        match self
            .appointments
            .try_lock(appointment.id, session_id, now, now + ttl)
            .await?
        {
            Some(saved) => {
                tracing::info!(appointment_uuid = %uuid, session_id, "Appointment slot locked");
                Ok((true, AppointmentLockStatus::of(&saved, now)))
            }
            None => {
                let current = self.get(uuid).await?;
                Ok((false, AppointmentLockStatus::of(&current, now)))
            }
        }
    }

    /// Release the row lock; without a session this is a forced unlock
    pub async fn unlock(
        &self,
        uuid: Uuid,
        session_id: Option<&str>,
    ) -> AppResult<(bool, AppointmentLockStatus)> {
        let appointment = self.get(uuid).await?;
        let now = self.clock.now();
        match self.appointments.release_lock(appointment.id, session_id).await? {
            Some(saved) => Ok((true, AppointmentLockStatus::of(&saved, now))),
            None => {
                let current = self.get(uuid).await?;
                Ok((false, AppointmentLockStatus::of(&current, now)))
            }
        }
    }

    pub async fn lock_status(&self, uuid: Uuid) -> AppResult<AppointmentLockStatus> {
        let appointment = self.get(uuid).await?;
        Ok(AppointmentLockStatus::of(&appointment, self.clock.now()))
    }

    pub async fn reap_expired_locks(&self) -> AppResult<u64> {
        self.appointments.reap_expired_locks(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::CancellationReason;
    use crate::models::{BusinessPolicy, ConflictType};
    use crate::services::{
        clock::FixedClock,
        locks::MemoryLockStore,
        test_support::{monday, Fixture},
    };

    fn service_for(fx: &Fixture) -> (AppointmentService, SlotLockManager) {
        let locks = SlotLockManager::new(Arc::new(MemoryLockStore::new()), 5);
        let svc = AppointmentService::new(
            fx.store.clone(),
            fx.store.clone(),
            fx.calculator(),
            fx.validator(),
            locks.clone(),
            Arc::new(FixedClock(fx.now)),
            &fx.config(),
        );
        (svc, locks)
    }

    fn booking(fx: &Fixture, start: DateTime<Utc>) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            staff_uuid: fx.staff.uuid,
            service_uuid: fx.service.uuid,
            customer_uuid: fx.customer.uuid,
            scheduled_datetime: start,
            addon_uuids: Vec::new(),
            booking_source: Some("online".to_string()),
            customer_notes: None,
            internal_notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_books_tentative_and_row_locks_session() {
        let mut fx = Fixture::standard();
        let addon = fx.add_addon(15, Decimal::new(1000, 2));
        let (svc, _) = service_for(&fx);
        let mut req = booking(&fx, fx.local(monday(), 9, 0));
        req.addon_uuids = vec![addon.uuid];

        let appt = svc.create(req, Some("s1")).await.unwrap();
        assert_eq!(appt.status, AppointmentStatus::Tentative);
        assert_eq!(appt.duration_minutes, 75);
        assert_eq!(appt.estimated_end_datetime, fx.local(monday(), 10, 15));
        assert_eq!(appt.total_price, Decimal::new(9000, 2));
        assert_eq!(appt.locked_by_session_id.as_deref(), Some("s1"));
        assert_eq!(
            appt.slot_lock_expires_at,
            Some(fx.now + Duration::minutes(15))
        );
    }

    #[tokio::test]
    async fn test_second_booking_of_same_slot_is_rejected() {
        let fx = Fixture::standard();
        let (svc, _) = service_for(&fx);
        svc.create(booking(&fx, fx.local(monday(), 9, 0)), None).await.unwrap();

        let err = svc
            .create(booking(&fx, fx.local(monday(), 9, 30)), None)
            .await
            .unwrap_err();
        match err {
            AppError::SchedulingConflict(conflicts) => {
                assert!(conflicts
                    .iter()
                    .any(|c| c.conflict_type == ConflictType::ExistingAppointment));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fx.store.appointment_count(), 1);
    }

    #[tokio::test]
    async fn test_key_lock_held_by_other_session() {
        let fx = Fixture::standard();
        let (svc, locks) = service_for(&fx);
        let start = fx.local(monday(), 9, 0);
        let key = SlotLockManager::key(fx.business.id, fx.staff.id, start);
        assert!(locks.lock(&key, "s1").await.unwrap());

        let err = svc.create(booking(&fx, start), Some("s2")).await.unwrap_err();
        assert!(matches!(err, AppError::LockContention));

        // The holder may book, which releases the key
        svc.create(booking(&fx, start), Some("s1")).await.unwrap();
        assert!(locks.holder(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_addon_is_rejected() {
        let fx = Fixture::standard();
        let (svc, _) = service_for(&fx);
        let mut req = booking(&fx, fx.local(monday(), 9, 0));
        req.addon_uuids = vec![Uuid::new_v4()];
        let err = svc.create(req, None).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_deposit_follows_policy() {
        let mut fx = Fixture::standard();
        fx.set_policy(BusinessPolicy {
            deposit_required: true,
            deposit_percentage: Some(Decimal::from(25)),
            ..BusinessPolicy::default()
        });
        let (svc, _) = service_for(&fx);
        let appt = svc.create(booking(&fx, fx.local(monday(), 13, 0)), None).await.unwrap();
        assert!(appt.deposit_required);
        assert_eq!(appt.deposit_amount, Some(Decimal::new(2000, 2)));
    }

    #[tokio::test]
    async fn test_reschedule_moves_in_place() {
        let mut fx = Fixture::standard();
        let appt = fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Confirmed);
        let (svc, _) = service_for(&fx);

        // Overlaps its own old slot, which is ignored
        let moved = svc
            .reschedule(
                appt.uuid,
                RescheduleRequest {
                    new_scheduled_datetime: fx.local(monday(), 9, 30),
                    reason: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(moved.scheduled_datetime, fx.local(monday(), 9, 30));
        assert_eq!(moved.estimated_end_datetime, fx.local(monday(), 10, 30));
        assert_eq!(moved.rescheduled_from_datetime, Some(fx.local(monday(), 9, 0)));
        assert_eq!(moved.reschedule_count, 1);
        assert_eq!(moved.internal_notes.as_deref(), Some("Rescheduled: No reason provided"));
        assert_eq!(moved.status, AppointmentStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_reschedule_terminal_is_refused() {
        let mut fx = Fixture::standard();
        let appt = fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Completed);
        let (svc, _) = service_for(&fx);
        let err = svc
            .reschedule(
                appt.uuid,
                RescheduleRequest {
                    new_scheduled_datetime: fx.local(monday(), 14, 0),
                    reason: Some("late".to_string()),
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn test_reschedule_into_key_locked_slot() {
        let mut fx = Fixture::standard();
        let appt = fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Confirmed);
        let (svc, locks) = service_for(&fx);
        let target = fx.local(monday(), 14, 0);
        let key = SlotLockManager::key(fx.business.id, fx.staff.id, target);
        assert!(locks.lock(&key, "s1").await.unwrap());

        let request = RescheduleRequest {
            new_scheduled_datetime: target,
            reason: None,
        };
        let err = svc
            .reschedule(appt.uuid, request.clone(), Some("s2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LockContention));
        let err = svc.reschedule(appt.uuid, request.clone(), None).await.unwrap_err();
        assert!(matches!(err, AppError::LockContention));
        assert_eq!(
            fx.store.appointment(appt.uuid).unwrap().scheduled_datetime,
            fx.local(monday(), 9, 0)
        );

        // The holder may move there, which releases the key
        let moved = svc.reschedule(appt.uuid, request, Some("s1")).await.unwrap();
        assert_eq!(moved.scheduled_datetime, target);
        assert!(locks.holder(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_late_cancellation_charges_fee() {
        let mut fx = Fixture::standard();
        // Appointment 2 hours from now, inside the 24 hour window
        let start = fx.now + Duration::hours(2);
        let appt = fx.add_appointment(start, 60, AppointmentStatus::Confirmed);
        let (svc, _) = service_for(&fx);

        let mut req = StatusTransitionRequest::to(AppointmentStatus::Cancelled);
        req.cancellation_reason = Some(CancellationReason::CustomerRequest);
        req.staff_id = Some(fx.staff.id);
        let cancelled = svc.transition_status(appt.uuid, req).await.unwrap();

        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.previous_status, Some(AppointmentStatus::Confirmed));
        assert_eq!(cancelled.cancelled_at, Some(fx.now));
        assert_eq!(cancelled.cancelled_by_staff_id, Some(fx.staff.id));
        assert_eq!(cancelled.cancellation_fee, Some(Decimal::new(4000, 2)));
    }

    #[tokio::test]
    async fn test_explicit_fee_replaces_policy_fee() {
        let mut fx = Fixture::standard();
        let appt = fx.add_appointment(fx.now + Duration::hours(2), 60, AppointmentStatus::Tentative);
        let (svc, _) = service_for(&fx);
        let mut req = StatusTransitionRequest::to(AppointmentStatus::Cancelled);
        req.cancellation_fee = Some(Decimal::ZERO);
        let cancelled = svc.transition_status(appt.uuid, req).await.unwrap();
        assert_eq!(cancelled.cancellation_fee, Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_no_show_counts_against_customer() {
        let mut fx = Fixture::standard();
        let appt = fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Confirmed);
        let (svc, _) = service_for(&fx);

        let updated = svc
            .transition_status(appt.uuid, StatusTransitionRequest::to(AppointmentStatus::NoShow))
            .await
            .unwrap();
        assert_eq!(updated.no_show_fee, Some(Decimal::new(2500, 2)));
        assert_eq!(fx.store.customer(fx.customer.id).unwrap().no_show_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_no_show_counts_once() {
        let mut fx = Fixture::standard();
        let appt = fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Confirmed);
        let (svc, _) = service_for(&fx);
        fx.store.yield_on_read();

        let (a, b) = tokio::join!(
            svc.transition_status(appt.uuid, StatusTransitionRequest::to(AppointmentStatus::NoShow)),
            svc.transition_status(appt.uuid, StatusTransitionRequest::to(AppointmentStatus::NoShow)),
        );
        let (won, lost) = match (a, b) {
            (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
            other => panic!("expected exactly one transition to win: {other:?}"),
        };
        assert_eq!(won.status, AppointmentStatus::NoShow);
        assert!(matches!(
            lost,
            AppError::InvalidTransition {
                current: AppointmentStatus::NoShow,
                requested: AppointmentStatus::NoShow,
            }
        ));
        assert_eq!(fx.store.customer(fx.customer.id).unwrap().no_show_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_row_untouched() {
        let mut fx = Fixture::standard();
        let appt = fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Completed);
        let (svc, _) = service_for(&fx);
        let err = svc
            .transition_status(appt.uuid, StatusTransitionRequest::to(AppointmentStatus::Confirmed))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(
            fx.store.appointment(appt.uuid).unwrap().status,
            AppointmentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_cancellation_policy_at_instant() {
        let mut fx = Fixture::standard();
        let start = fx.local(monday(), 10, 0);
        let appt = fx.add_appointment(start, 60, AppointmentStatus::Confirmed);
        let (svc, _) = service_for(&fx);

        let early = svc
            .cancellation_policy(appt.uuid, Some(start - Duration::hours(25)))
            .await
            .unwrap();
        assert!(early.can_cancel);
        assert!(early.cancellation_fee.is_none());
        assert_eq!(early.cancellation_window_ends_at, start - Duration::hours(24));
    }

    #[tokio::test]
    async fn test_check_conflicts_lists_overlaps_and_alternatives() {
        let mut fx = Fixture::standard();
        let busy = fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Confirmed);
        let (svc, _) = service_for(&fx);

        let res = svc
            .check_conflicts(&ConflictCheckRequest {
                staff_uuid: fx.staff.uuid,
                scheduled_datetime: fx.local(monday(), 9, 30),
                duration_minutes: 30,
                exclude_appointment_uuid: None,
            })
            .await
            .unwrap();
        assert!(res.has_conflict);
        assert_eq!(res.conflicts.len(), 1);
        assert_eq!(res.conflicts[0].uuid, busy.uuid);
        assert_eq!(res.alternative_slots.len(), 5);
        assert_eq!(res.alternative_slots[0], fx.local(monday(), 10, 0));

        let excluded = svc
            .check_conflicts(&ConflictCheckRequest {
                staff_uuid: fx.staff.uuid,
                scheduled_datetime: fx.local(monday(), 9, 30),
                duration_minutes: 30,
                exclude_appointment_uuid: Some(busy.uuid),
            })
            .await
            .unwrap();
        assert!(!excluded.has_conflict);
        assert!(excluded.alternative_slots.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_row_lock_has_one_winner() {
        let mut fx = Fixture::standard();
        let appt = fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Tentative);
        let (svc, _) = service_for(&fx);
        fx.store.yield_on_read();

        let (first, second) = tokio::join!(
            svc.lock(appt.uuid, "s1", None),
            svc.lock(appt.uuid, "s2", None),
        );
        let (first, first_status) = first.unwrap();
        let (second, second_status) = second.unwrap();
        assert!(first ^ second, "exactly one session should acquire");

        let winner = if first { "s1" } else { "s2" };
        let stored = fx.store.appointment(appt.uuid).unwrap();
        assert_eq!(stored.locked_by_session_id.as_deref(), Some(winner));
        assert_eq!(first_status.locked_by_session_id.as_deref(), Some(winner));
        assert_eq!(second_status.locked_by_session_id.as_deref(), Some(winner));
    }

    #[tokio::test]
    async fn test_row_lock_round_trip_and_reaper() {
        let mut fx = Fixture::standard();
        let appt = fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Tentative);
        let (svc, _) = service_for(&fx);

        let (ok, status) = svc.lock(appt.uuid, "s1", Some(10)).await.unwrap();
        assert!(ok && status.locked);
        let (ok, status) = svc.lock(appt.uuid, "s2", None).await.unwrap();
        assert!(!ok);
        assert_eq!(status.locked_by_session_id.as_deref(), Some("s1"));

        let (ok, _) = svc.unlock(appt.uuid, Some("s2")).await.unwrap();
        assert!(!ok);
        let (ok, status) = svc.unlock(appt.uuid, Some("s1")).await.unwrap();
        assert!(ok && !status.locked);

        // An already expired lock is cleared by the reaper
        svc.lock(appt.uuid, "s3", Some(1)).await.unwrap();
        let later = AppointmentService {
            clock: Arc::new(FixedClock(fx.now + Duration::minutes(5))),
            ..svc.clone()
        };
        assert!(!later.lock_status(appt.uuid).await.unwrap().locked);
        assert_eq!(later.reap_expired_locks().await.unwrap(), 1);
        assert!(!fx.store.appointment(appt.uuid).unwrap().slot_locked);
    }
}
