//! Availability calculator
//!
//! Lookups are batched: one [`ScheduleSnapshot`] is loaded per call and every
//! candidate window is evaluated against it in memory.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{
    clock::Clock, exceptions::ExceptionResolver, holidays::HolidayGate, policy::PolicyEvaluator,
    working_hours::WorkingHoursResolver,
};
use crate::{
    error::AppResult,
    models::{
        scheduling::{SlotMetadata, StaffAvailabilityQuery},
        Appointment, AvailabilityStatus, Business, ConflictType, OverrideEffect, Owner, Service,
        Slot, Staff, TimeWindow,
    },
    repository::SchedulingRepository,
};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Hours, exceptions and appointments of one staff member over a range
pub struct ScheduleSnapshot {
    pub business: Business,
    pub staff: Staff,
    pub business_hours: WorkingHoursResolver,
    pub staff_hours: WorkingHoursResolver,
    pub exceptions: ExceptionResolver,
    pub appointments: Vec<Appointment>,
}

/// Why a window falls outside business hours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    Holiday,
    PreHolidayCutoff(DateTime<Utc>),
    OutsideHours,
}

impl ScheduleSnapshot {
    pub async fn load(
        repo: &dyn SchedulingRepository,
        business: Business,
        staff: Staff,
        range: TimeWindow,
    ) -> AppResult<Self> {
        let tz = business.tz();
        let business_owner = Owner::Business(business.id);
        let staff_owner = Owner::Staff(staff.id);

        let business_hours = repo.working_hours(business_owner).await?;
        let staff_hours = repo.working_hours(staff_owner).await?;
        let time_off = repo.approved_time_off(staff.id, range).await?;
        let overrides = repo.active_overrides(staff.id, range).await?;
        let appointments = repo.non_cancelled_appointments(staff.id, range).await?;

        Ok(Self {
            business_hours: WorkingHoursResolver::new(business_owner, tz, business_hours),
            staff_hours: WorkingHoursResolver::new(staff_owner, tz, staff_hours),
            exceptions: ExceptionResolver::new(time_off, overrides),
            appointments,
            business,
            staff,
        })
    }

    /// Business-level closure: holiday on either endpoint, the holiday-eve
    /// cutoff, or the business's own hours
    pub fn business_closed(&self, holidays: &dyn HolidayGate, window: &TimeWindow) -> Option<ClosedReason> {
        if holidays.is_holiday(holidays.local_date(window.start))
            || holidays.is_holiday(holidays.local_date(window.end))
        {
            return Some(ClosedReason::Holiday);
        }
        if !self.business_hours.is_within(window) {
            return Some(ClosedReason::OutsideHours);
        }
        match holidays.pre_holiday_cutoff_utc(window.start) {
            Some(cutoff) if window.end > cutoff => Some(ClosedReason::PreHolidayCutoff(cutoff)),
            _ => None,
        }
    }

    pub fn staff_off_hours(&self, window: &TimeWindow) -> bool {
        !self.staff_hours.is_within(window)
    }

    /// Blocking appointments strictly overlapping the window
    pub fn overlapping_appointments<'a>(
        &'a self,
        window: &'a TimeWindow,
        exclude: Option<i32>,
    ) -> impl Iterator<Item = &'a Appointment> + 'a {
        self.appointments.iter().filter(move |a| {
            a.blocks_time() && Some(a.id) != exclude && a.window().overlaps(window)
        })
    }

    /// Every rule the window breaks, in evaluation order, without duplicates
    pub fn evaluate(
        &self,
        holidays: &dyn HolidayGate,
        window: &TimeWindow,
        policy: Option<(&PolicyEvaluator, DateTime<Utc>)>,
        exclude: Option<i32>,
    ) -> Vec<ConflictType> {
        let mut reasons = Vec::new();
        let mut push = |c: ConflictType| {
            if !reasons.contains(&c) {
                reasons.push(c);
            }
        };

        if self.business_closed(holidays, window).is_some() {
            push(ConflictType::OutsideWorkingHours);
        }
        if self.staff_off_hours(window) {
            push(ConflictType::OutsideWorkingHours);
        }
        if self.exceptions.has_time_off_conflict(window) {
            push(ConflictType::TimeOff);
        }
        if self.exceptions.override_effect(window.start) == OverrideEffect::Unavailable {
            push(ConflictType::AvailabilityOverride);
        }
        if self.overlapping_appointments(window, exclude).next().is_some() {
            push(ConflictType::ExistingAppointment);
        }
        if let Some((policy, now)) = policy {
            if !policy.lead_time_ok(now, window.start) {
                push(ConflictType::LeadTimeViolation);
            }
            if !policy.advance_booking_ok(now, window.start) {
                push(ConflictType::AdvanceBookingViolation);
            }
        }
        reasons
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Parameters of one walk over a range
#[derive(Debug, Clone, Copy)]
pub struct SweepParams<'a> {
    pub range: TimeWindow,
    /// Service mode: steps sized to the service and policy checks applied
    pub service: Option<&'a Service>,
    /// Add-on minutes added to the service duration
    pub extra_minutes: i64,
    pub slot_duration_minutes: i64,
    pub include_busy: bool,
    pub exclude_appointment: Option<i32>,
}

impl SweepParams<'_> {
    fn step_minutes(&self) -> i64 {
        match self.service {
            Some(service) => service.total_duration_minutes() as i64 + self.extra_minutes,
            None => self.slot_duration_minutes,
        }
    }
}

/// Walk the range in fixed steps and tag every candidate window
pub fn sweep(
    snapshot: &ScheduleSnapshot,
    holidays: &dyn HolidayGate,
    params: &SweepParams<'_>,
    now: DateTime<Utc>,
) -> Vec<Slot> {
    let step = params.step_minutes();
    if step <= 0 {
        return Vec::new();
    }
    let policy = params
        .service
        .map(|s| PolicyEvaluator::for_service(s, &snapshot.business.policy));

    let mut slots = Vec::new();
    let mut t = params.range.start;
    while t < params.range.end {
        let window = TimeWindow::from_duration(t, step);
        if params.service.is_some() && window.end > params.range.end {
            break;
        }

        let conflicts = snapshot.evaluate(
            holidays,
            &window,
            policy.as_ref().map(|p| (p, now)),
            params.exclude_appointment,
        );
        let status = if conflicts.is_empty() {
            AvailabilityStatus::Available
        } else {
            AvailabilityStatus::Unavailable
        };

        if status == AvailabilityStatus::Available || params.include_busy {
            slots.push(Slot {
                start_datetime: window.start,
                end_datetime: window.end,
                status,
                staff_uuid: snapshot.staff.uuid,
                service_uuid: params.service.map(|s| s.uuid),
                conflicts,
                metadata: SlotMetadata {
                    duration_minutes: step,
                    computed_at: now,
                },
            });
        }
        t = window.end;
    }
    slots
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Staff, business and (optional) service behind a computation
pub struct BookingContext {
    pub business: Business,
    pub staff: Staff,
    pub service: Option<Service>,
}

#[derive(Clone)]
pub struct AvailabilityCalculator {
    repo: Arc<dyn SchedulingRepository>,
    holidays: Arc<dyn HolidayGate>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityCalculator {
    pub fn new(
        repo: Arc<dyn SchedulingRepository>,
        holidays: Arc<dyn HolidayGate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, holidays, clock }
    }

    pub fn repo(&self) -> &dyn SchedulingRepository {
        self.repo.as_ref()
    }

    pub fn holidays(&self) -> &dyn HolidayGate {
        self.holidays.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolve the bookable staff member, its business and an optional
    /// active service of the same business. `None` when any is unknown.
    pub async fn context(
        &self,
        staff_uuid: Uuid,
        service_uuid: Option<Uuid>,
    ) -> AppResult<Option<BookingContext>> {
        let staff = match self.repo.find_staff_by_uuid(staff_uuid).await? {
            Some(staff) if staff.accepts_bookings() => staff,
            _ => {
                tracing::warn!(%staff_uuid, "Unknown or unbookable staff member");
                return Ok(None);
            }
        };

        let service = match service_uuid {
            Some(uuid) => match self.repo.find_service_by_uuid(uuid).await? {
                Some(service) if service.is_active && service.business_id == staff.business_id => {
                    Some(service)
                }
                _ => {
                    tracing::warn!(service_uuid = %uuid, "Unknown or inactive service");
                    return Ok(None);
                }
            },
            None => None,
        };

        let Some(business) = self.repo.find_business_by_id(staff.business_id).await? else {
            tracing::warn!(business_id = staff.business_id, "Staff member has no business");
            return Ok(None);
        };

        Ok(Some(BookingContext { business, staff, service }))
    }

    pub async fn snapshot(&self, ctx: &BookingContext, range: TimeWindow) -> AppResult<ScheduleSnapshot> {
        ScheduleSnapshot::load(self.repo.as_ref(), ctx.business.clone(), ctx.staff.clone(), range).await
    }

    /// Slots for a staff member over the query range. Unknown staff or
    /// service yields an empty list.
    pub async fn compute(&self, query: &StaffAvailabilityQuery) -> AppResult<Vec<Slot>> {
        let Some(range) = TimeWindow::new(query.start_datetime, query.end_datetime) else {
            return Ok(Vec::new());
        };
        let Some(ctx) = self.context(query.staff_uuid, query.service_uuid).await? else {
            return Ok(Vec::new());
        };

        let step = match &ctx.service {
            Some(service) => service.total_duration_minutes() as i64,
            None => query.slot_duration_minutes,
        };
        // Without a service the last window may run past the range end
        let loaded = TimeWindow {
            start: range.start,
            end: range.end + Duration::minutes(step.max(0)),
        };
        let snapshot = self.snapshot(&ctx, loaded).await?;

        let params = SweepParams {
            range,
            service: ctx.service.as_ref(),
            extra_minutes: 0,
            slot_duration_minutes: query.slot_duration_minutes,
            include_busy: query.include_busy_slots,
            exclude_appointment: None,
        };
        let slots = sweep(&snapshot, self.holidays.as_ref(), &params, self.clock.now());

        tracing::debug!(
            staff_uuid = %query.staff_uuid,
            slots = slots.len(),
            "Computed staff availability"
        );
        Ok(slots)
    }
}
