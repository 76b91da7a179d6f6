//! Scheduling facade used by the booking and staff-schedule endpoints

use chrono::{Datelike, Duration};
use uuid::Uuid;

use super::{
    availability::AvailabilityCalculator, conflicts::ConflictValidator, locks::SlotLockManager,
    working_hours::WorkingHoursResolver,
};
use crate::{
    config::SchedulingConfig,
    error::{AppError, AppResult},
    models::{
        enums::weekday_name,
        scheduling::{
            AppointmentValidationRequest, BreakHours, BusinessHours, BusinessHoursQuery,
            OpeningHours, ScheduledAppointment, ScheduledDay, SlotLockRequest, SlotLockResponse,
            StaffAvailabilityQuery, StaffSchedule, StaffScheduleQuery,
        },
        Owner, Slot, Staff, TimeWindow, ValidationResult,
    },
};

/// Longest date range a schedule request may span
const MAX_SCHEDULE_DAYS: i64 = 93;

#[derive(Clone)]
pub struct SchedulingService {
    calculator: AvailabilityCalculator,
    validator: ConflictValidator,
    locks: SlotLockManager,
    max_availability_days: i64,
}

impl SchedulingService {
    pub fn new(
        calculator: AvailabilityCalculator,
        validator: ConflictValidator,
        locks: SlotLockManager,
        config: &SchedulingConfig,
    ) -> Self {
        Self {
            calculator,
            validator,
            locks,
            max_availability_days: config.max_availability_days,
        }
    }

    pub async fn get_staff_availability(&self, query: &StaffAvailabilityQuery) -> AppResult<Vec<Slot>> {
        if query.end_datetime <= query.start_datetime {
            return Err(AppError::Validation(
                "end_datetime must be after start_datetime".to_string(),
            ));
        }
        if query.end_datetime - query.start_datetime > Duration::days(self.max_availability_days) {
            return Err(AppError::Validation(format!(
                "Availability range is limited to {} days",
                self.max_availability_days
            )));
        }
        self.calculator.compute(query).await
    }

    pub async fn validate_appointment(
        &self,
        request: &AppointmentValidationRequest,
    ) -> AppResult<ValidationResult> {
        self.validator.validate(request).await
    }

    /// Opening hours of a business on a local date
    pub async fn get_business_hours(&self, query: &BusinessHoursQuery) -> AppResult<BusinessHours> {
        let repo = self.calculator.repo();
        let holidays = self.calculator.holidays();
        let business = repo
            .find_business_by_uuid(query.business_uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Business {} not found", query.business_uuid)))?;

        let owner = Owner::Business(business.id);
        let resolver = WorkingHoursResolver::new(owner, business.tz(), repo.working_hours(owner).await?);
        let is_holiday = holidays.is_holiday(query.date);
        let record = resolver.for_date(query.date);

        let hours = match record {
            Some(r) if !is_holiday => Some(OpeningHours {
                start_time: r.start_time,
                end_time: r.end_time,
                duration_minutes: r.duration_minutes(),
                break_time: r
                    .break_times()
                    .filter(|_| query.include_breaks)
                    .map(|(start_time, end_time)| BreakHours { start_time, end_time }),
            }),
            _ => None,
        };

        Ok(BusinessHours {
            is_open: hours.is_some(),
            weekday: weekday_name(query.date.weekday()).to_string(),
            is_holiday,
            pre_holiday_cutoff: holidays.pre_holiday_cutoff_on(query.date),
            hours,
        })
    }

    /// Working hours, exceptions and appointments of a staff member over an
    /// inclusive range of local dates
    pub async fn get_staff_schedule(
        &self,
        staff_uuid: Uuid,
        query: &StaffScheduleQuery,
    ) -> AppResult<StaffSchedule> {
        if query.end_date < query.start_date {
            return Err(AppError::Validation("end_date must not be before start_date".to_string()));
        }
        if (query.end_date - query.start_date).num_days() >= MAX_SCHEDULE_DAYS {
            return Err(AppError::Validation(format!(
                "Schedule range is limited to {} days",
                MAX_SCHEDULE_DAYS
            )));
        }

        let repo = self.calculator.repo();
        let staff = repo
            .find_staff_by_uuid(staff_uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Staff member {} not found", staff_uuid)))?;
        let business = repo
            .find_business_by_id(staff.business_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Business {} not found", staff.business_id)))?;

        let range = TimeWindow {
            start: business.start_of_day(query.start_date),
            end: business.start_of_day(query.end_date + Duration::days(1)),
        };

        let owner = Owner::Staff(staff.id);
        let resolver = WorkingHoursResolver::new(owner, business.tz(), repo.working_hours(owner).await?);
        let working_hours = query
            .start_date
            .iter_days()
            .take_while(|d| *d <= query.end_date)
            .filter_map(|date| {
                resolver.for_date(date).map(|r| ScheduledDay {
                    date,
                    weekday: weekday_name(date.weekday()).to_string(),
                    start_time: r.start_time,
                    end_time: r.end_time,
                    break_start_time: r.break_start_time,
                    break_end_time: r.break_end_time,
                })
            })
            .collect();

        let time_off = if query.include_time_off {
            repo.approved_time_off(staff.id, range).await?
        } else {
            Vec::new()
        };
        let availability_overrides = if query.include_availability_overrides {
            repo.active_overrides(staff.id, range).await?
        } else {
            Vec::new()
        };
        let appointments = if query.include_appointments {
            let mut found = repo.non_cancelled_appointments(staff.id, range).await?;
            found.sort_by_key(|a| a.scheduled_datetime);
            found
                .into_iter()
                .map(|a| ScheduledAppointment {
                    uuid: a.uuid,
                    scheduled_datetime: a.scheduled_datetime,
                    estimated_end_datetime: a.estimated_end_datetime,
                    status: a.status,
                    service_id: a.service_id,
                    customer_id: a.customer_id,
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(StaffSchedule {
            staff_uuid,
            start_date: query.start_date,
            end_date: query.end_date,
            working_hours,
            time_off,
            availability_overrides,
            appointments,
        })
    }

    // ---- Out-of-band slot locks ----

    async fn slot_key(&self, request: &SlotLockRequest) -> AppResult<(Staff, String)> {
        let staff = self
            .calculator
            .repo()
            .find_staff_by_uuid(request.staff_uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Staff member {} not found", request.staff_uuid)))?;
        let key = SlotLockManager::key(staff.business_id, staff.id, request.start_datetime);
        Ok((staff, key))
    }

    /// Reserve a slot for a session; `false` when another session holds it
    pub async fn lock_slot(&self, request: &SlotLockRequest, session_id: &str) -> AppResult<(bool, SlotLockResponse)> {
        let (staff, key) = self.slot_key(request).await?;
        let acquired = self.locks.lock(&key, session_id).await?;
        if acquired {
            tracing::info!(staff_uuid = %staff.uuid, start = %request.start_datetime, session_id, "Slot reserved");
        }
        let holder = self.locks.holder(&key).await?;
        Ok((
            acquired,
            SlotLockResponse {
                locked: holder.is_some(),
                key,
                holder,
            },
        ))
    }

    /// Release a reservation; without a session this is a forced unlock
    pub async fn unlock_slot(
        &self,
        request: &SlotLockRequest,
        session_id: Option<&str>,
    ) -> AppResult<(bool, SlotLockResponse)> {
        let (_, key) = self.slot_key(request).await?;
        let released = self.locks.unlock(&key, session_id).await?;
        let holder = self.locks.holder(&key).await?;
        Ok((
            released,
            SlotLockResponse {
                locked: holder.is_some(),
                key,
                holder,
            },
        ))
    }

    pub async fn slot_lock_status(&self, request: &SlotLockRequest) -> AppResult<SlotLockResponse> {
        let (_, key) = self.slot_key(request).await?;
        let holder = self.locks.holder(&key).await?;
        Ok(SlotLockResponse {
            locked: holder.is_some(),
            key,
            holder,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    use super::*;
    use crate::models::AppointmentStatus;
    use crate::services::{
        clock::FixedClock,
        holidays::MockHolidayGate,
        locks::MemoryLockStore,
        test_support::{monday, Fixture},
    };

    fn facade(fx: &Fixture) -> SchedulingService {
        let locks = SlotLockManager::new(Arc::new(MemoryLockStore::new()), 5);
        SchedulingService::new(fx.calculator(), fx.validator(), locks, &fx.config())
    }

    fn hours_query(fx: &Fixture, date: NaiveDate) -> BusinessHoursQuery {
        BusinessHoursQuery {
            business_uuid: fx.business.uuid,
            date,
            include_breaks: true,
        }
    }

    #[tokio::test]
    async fn test_business_hours_on_open_day() {
        let fx = Fixture::standard();
        let hours = facade(&fx).get_business_hours(&hours_query(&fx, monday())).await.unwrap();
        assert!(hours.is_open);
        assert_eq!(hours.weekday, "monday");
        assert!(!hours.is_holiday);
        let opening = hours.hours.unwrap();
        assert_eq!(opening.duration_minutes, 480);
        assert_eq!(
            opening.break_time.map(|b| b.start_time),
            NaiveTime::from_hms_opt(12, 0, 0)
        );
    }

    #[tokio::test]
    async fn test_business_hours_closed_day_and_unknown_business() {
        let fx = Fixture::standard();
        let svc = facade(&fx);
        let sunday = monday().pred_opt().unwrap();
        let hours = svc.get_business_hours(&hours_query(&fx, sunday)).await.unwrap();
        assert!(!hours.is_open);
        assert!(hours.hours.is_none());

        let mut q = hours_query(&fx, monday());
        q.business_uuid = Uuid::new_v4();
        assert!(matches!(
            svc.get_business_hours(&q).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_business_hours_consult_holiday_gate() {
        let fx = Fixture::standard();
        let mut gate = MockHolidayGate::new();
        gate.expect_is_holiday().returning(|d| d == monday());
        gate.expect_pre_holiday_cutoff_on().returning(|_| None);

        let calculator = AvailabilityCalculator::new(
            fx.store.clone(),
            Arc::new(gate),
            Arc::new(FixedClock(fx.now)),
        );
        let validator = ConflictValidator::new(calculator.clone(), &fx.config());
        let locks = SlotLockManager::new(Arc::new(MemoryLockStore::new()), 5);
        let svc = SchedulingService::new(calculator, validator, locks, &fx.config());

        let hours = svc.get_business_hours(&hours_query(&fx, monday())).await.unwrap();
        assert!(hours.is_holiday);
        assert!(!hours.is_open);
    }

    #[tokio::test]
    async fn test_holiday_eve_reports_cutoff() {
        let mut fx = Fixture::standard();
        fx.holidays = vec![monday().succ_opt().unwrap()];
        let hours = facade(&fx).get_business_hours(&hours_query(&fx, monday())).await.unwrap();
        assert!(hours.is_open);
        assert_eq!(
            hours.pre_holiday_cutoff,
            Some(Utc.with_ymd_and_hms(2030, 3, 4, 15, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_staff_schedule_collects_everything() {
        let mut fx = Fixture::standard();
        fx.add_time_off(fx.local(monday(), 14, 0), fx.local(monday(), 15, 0));
        fx.add_appointment(fx.local(monday(), 11, 0), 60, AppointmentStatus::Confirmed);
        fx.add_appointment(fx.local(monday(), 9, 0), 60, AppointmentStatus::Tentative);
        fx.add_appointment(fx.local(monday(), 10, 0), 60, AppointmentStatus::Cancelled);

        let schedule = facade(&fx)
            .get_staff_schedule(
                fx.staff.uuid,
                &StaffScheduleQuery {
                    start_date: monday() - Duration::days(1),
                    end_date: monday() + Duration::days(1),
                    include_appointments: true,
                    include_time_off: true,
                    include_availability_overrides: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(schedule.working_hours.len(), 1);
        assert_eq!(schedule.working_hours[0].date, monday());
        assert_eq!(schedule.time_off.len(), 1);
        let starts: Vec<_> = schedule.appointments.iter().map(|a| a.scheduled_datetime).collect();
        assert_eq!(starts, vec![fx.local(monday(), 9, 0), fx.local(monday(), 11, 0)]);
    }

    #[tokio::test]
    async fn test_staff_schedule_rejects_reversed_range() {
        let fx = Fixture::standard();
        let err = facade(&fx)
            .get_staff_schedule(
                fx.staff.uuid,
                &StaffScheduleQuery {
                    start_date: monday(),
                    end_date: monday() - Duration::days(1),
                    include_appointments: true,
                    include_time_off: true,
                    include_availability_overrides: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_availability_rejects_empty_range() {
        let fx = Fixture::standard();
        let at = fx.local(monday(), 9, 0);
        let err = facade(&fx)
            .get_staff_availability(&StaffAvailabilityQuery {
                staff_uuid: fx.staff.uuid,
                start_datetime: at,
                end_datetime: at,
                service_uuid: None,
                include_busy_slots: false,
                slot_duration_minutes: 30,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_availability_range_is_capped() {
        let fx = Fixture::standard();
        let svc = facade(&fx);
        let start = fx.local(monday(), 0, 0);
        let mut query = StaffAvailabilityQuery {
            staff_uuid: fx.staff.uuid,
            start_datetime: start,
            end_datetime: start + Duration::days(3650),
            service_uuid: None,
            include_busy_slots: true,
            slot_duration_minutes: 5,
        };
        let err = svc.get_staff_availability(&query).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Exactly the configured maximum is still served
        query.end_datetime = start + Duration::days(fx.config().max_availability_days);
        query.slot_duration_minutes = 60;
        query.include_busy_slots = false;
        let slots = svc.get_staff_availability(&query).await.unwrap();
        assert!(!slots.is_empty());
    }

    #[tokio::test]
    async fn test_slot_reservation() {
        let fx = Fixture::standard();
        let svc = facade(&fx);
        let req = SlotLockRequest {
            staff_uuid: fx.staff.uuid,
            start_datetime: fx.local(monday(), 9, 0),
        };

        let (ok, res) = svc.lock_slot(&req, "s1").await.unwrap();
        assert!(ok && res.locked);
        let (ok, res) = svc.lock_slot(&req, "s2").await.unwrap();
        assert!(!ok);
        assert_eq!(res.holder.as_deref(), Some("s1"));

        let (released, _) = svc.unlock_slot(&req, Some("s2")).await.unwrap();
        assert!(!released);
        let (released, res) = svc.unlock_slot(&req, Some("s1")).await.unwrap();
        assert!(released && !res.locked);
        assert!(!svc.slot_lock_status(&req).await.unwrap().locked);
    }
}
