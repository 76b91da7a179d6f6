//! Conflict validator: checks one exact proposed appointment and suggests
//! alternatives when it cannot be booked

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{
    availability::{sweep, AvailabilityCalculator, BookingContext, ClosedReason, ScheduleSnapshot, SweepParams},
    policy::PolicyEvaluator,
};
use crate::{
    config::SchedulingConfig,
    error::AppResult,
    models::{
        scheduling::AppointmentValidationRequest, Business, ConflictType, OverrideEffect,
        SchedulingConflict, Service, ServiceAddon, TimeWindow, ValidationResult,
    },
};

#[derive(Clone)]
pub struct ConflictValidator {
    calculator: AvailabilityCalculator,
    search_days: i64,
    max_alternatives: usize,
}

/// A validation together with what was resolved along the way
pub struct Validated {
    pub result: ValidationResult,
    pub context: Option<(BookingContext, Vec<ServiceAddon>)>,
}

impl ConflictValidator {
    pub fn new(calculator: AvailabilityCalculator, config: &SchedulingConfig) -> Self {
        Self {
            calculator,
            search_days: config.alternative_search_days,
            max_alternatives: config.max_alternatives,
        }
    }

    pub async fn validate(&self, request: &AppointmentValidationRequest) -> AppResult<ValidationResult> {
        Ok(self.validate_excluding(request, None).await?.result)
    }

    /// Validate, ignoring the appointment with id `exclude` when looking for
    /// overlaps (used when moving an existing appointment)
    pub async fn validate_excluding(
        &self,
        request: &AppointmentValidationRequest,
        exclude: Option<i32>,
    ) -> AppResult<Validated> {
        let start = request.requested_datetime;
        let ctx = self
            .calculator
            .context(request.staff_uuid, Some(request.service_uuid))
            .await?;
        let Some((ctx, service)) = ctx.and_then(|c| c.service.clone().map(|s| (c, s))) else {
            return Ok(Validated {
                result: unknown_target(start),
                context: None,
            });
        };

        let addons = if request.addon_uuids.is_empty() {
            Vec::new()
        } else {
            self.calculator
                .repo()
                .find_addons(service.id, &request.addon_uuids)
                .await?
        };
        let requested: HashSet<Uuid> = request.addon_uuids.iter().copied().collect();
        if addons.len() != requested.len() {
            return Ok(Validated {
                result: unknown_addons(start, &requested, &addons),
                context: None,
            });
        }
        let total = total_minutes(&service, &addons);
        let result = self.validate_for(&ctx, &service, start, total, exclude).await?;
        Ok(Validated {
            result,
            context: Some((ctx, addons)),
        })
    }

    /// Validate a `total`-minute booking of `service` at `start` for a
    /// resolved staff member
    pub async fn validate_for(
        &self,
        ctx: &BookingContext,
        service: &Service,
        start: DateTime<Utc>,
        total: i64,
        exclude: Option<i32>,
    ) -> AppResult<ValidationResult> {
        let window = TimeWindow::from_duration(start, total);
        let search = self.search_range(&ctx.business, start);
        let loaded = TimeWindow {
            start: search.start.min(window.start),
            end: (search.end + Duration::minutes(total)).max(window.end),
        };
        let snapshot = self.calculator.snapshot(ctx, loaded).await?;
        let now = self.calculator.now();

        let policy = PolicyEvaluator::for_service(service, &ctx.business.policy);
        let conflicts = self.collect_conflicts(&snapshot, &window, &policy, now, exclude);

        let alternative_slots = if conflicts.is_empty() {
            Vec::new()
        } else {
            let params = SweepParams {
                range: search,
                service: Some(service),
                extra_minutes: total - service.total_duration_minutes() as i64,
                slot_duration_minutes: total,
                include_busy: false,
                exclude_appointment: exclude,
            };
            sweep(&snapshot, self.calculator.holidays(), &params, now)
                .into_iter()
                .filter(|s| s.start_datetime >= now && s.start_datetime != start)
                .take(self.max_alternatives)
                .collect()
        };

        if !conflicts.is_empty() {
            tracing::debug!(
                staff_uuid = %ctx.staff.uuid,
                %start,
                conflicts = conflicts.len(),
                "Requested appointment is not bookable"
            );
        }

        Ok(ValidationResult {
            is_valid: conflicts.is_empty(),
            conflicts,
            alternative_slots,
            total_duration_minutes: total,
            estimated_end_time: window.end,
        })
    }

    /// Free starts of `duration_minutes` windows near `requested`, without
    /// service policy checks
    pub async fn alternative_starts(
        &self,
        ctx: &BookingContext,
        requested: DateTime<Utc>,
        duration_minutes: i64,
        exclude: Option<i32>,
        limit: usize,
    ) -> AppResult<Vec<DateTime<Utc>>> {
        let search = self.search_range(&ctx.business, requested);
        let loaded = TimeWindow {
            start: search.start,
            end: search.end + Duration::minutes(duration_minutes),
        };
        let snapshot = self.calculator.snapshot(ctx, loaded).await?;
        let now = self.calculator.now();
        let params = SweepParams {
            range: search,
            service: None,
            extra_minutes: 0,
            slot_duration_minutes: duration_minutes,
            include_busy: false,
            exclude_appointment: exclude,
        };
        Ok(sweep(&snapshot, self.calculator.holidays(), &params, now)
            .into_iter()
            .map(|s| s.start_datetime)
            .filter(|t| *t >= now && *t != requested)
            .take(limit)
            .collect())
    }

    /// From business-local midnight of the requested day, `search_days` ahead
    fn search_range(&self, business: &Business, requested: DateTime<Utc>) -> TimeWindow {
        let day = requested.with_timezone(&business.tz()).date_naive();
        TimeWindow::from_duration(business.start_of_day(day), self.search_days.max(1) * 24 * 60)
    }

    /// Every broken rule, without short-circuiting
    fn collect_conflicts(
        &self,
        snapshot: &ScheduleSnapshot,
        window: &TimeWindow,
        policy: &PolicyEvaluator,
        now: DateTime<Utc>,
        exclude: Option<i32>,
    ) -> Vec<SchedulingConflict> {
        let holidays = self.calculator.holidays();
        let mut conflicts = Vec::new();

        if let Some(reason) = snapshot.business_closed(holidays, window) {
            let message = match reason {
                ClosedReason::Holiday => "Business is closed for a holiday".to_string(),
                ClosedReason::PreHolidayCutoff(cutoff) => {
                    format!("Business closes early at {} on the eve of a holiday", cutoff)
                }
                ClosedReason::OutsideHours => "Outside business hours".to_string(),
            };
            conflicts.push(SchedulingConflict::error(ConflictType::OutsideWorkingHours, message, window));
        }

        if snapshot.staff_off_hours(window) {
            conflicts.push(SchedulingConflict::error(
                ConflictType::OutsideWorkingHours,
                "Outside staff working hours",
                window,
            ));
        }

        if let Some(time_off) = snapshot.exceptions.time_off_conflict(window) {
            conflicts.push(
                SchedulingConflict::error(
                    ConflictType::TimeOff,
                    format!("Staff member is on {} time off", time_off.time_off_type),
                    &time_off.window(),
                )
                .with_entity(time_off.uuid),
            );
        }

        if let Some(o) = snapshot.exceptions.governing_override(window.start) {
            if o.effect() == OverrideEffect::Unavailable {
                let message = o
                    .title
                    .clone()
                    .unwrap_or_else(|| "Staff member is unavailable at this time".to_string());
                conflicts.push(
                    SchedulingConflict::error(
                        ConflictType::AvailabilityOverride,
                        message,
                        &TimeWindow { start: o.start_datetime, end: o.end_datetime },
                    )
                    .with_entity(o.uuid),
                );
            }
        }

        for appointment in snapshot.overlapping_appointments(window, exclude) {
            conflicts.push(
                SchedulingConflict::error(
                    ConflictType::ExistingAppointment,
                    "Overlaps an existing appointment",
                    &appointment.window(),
                )
                .with_entity(appointment.uuid),
            );
        }

        if !policy.lead_time_ok(now, window.start) {
            conflicts.push(SchedulingConflict::error(
                ConflictType::LeadTimeViolation,
                format!(
                    "Bookings require at least {} hours notice",
                    policy.min_lead_time_hours.unwrap_or_default()
                ),
                window,
            ));
        }

        if !policy.advance_booking_ok(now, window.start) {
            conflicts.push(SchedulingConflict::error(
                ConflictType::AdvanceBookingViolation,
                format!(
                    "Bookings open at most {} days ahead",
                    policy.max_advance_booking_days.unwrap_or_default()
                ),
                window,
            ));
        }

        conflicts
    }
}

/// Staff, service or business could not be resolved
fn unknown_target(start: DateTime<Utc>) -> ValidationResult {
    let window = TimeWindow { start, end: start };
    ValidationResult {
        is_valid: false,
        conflicts: vec![SchedulingConflict::error(
            ConflictType::StaffUnavailable,
            "Staff member or service not found",
            &window,
        )],
        alternative_slots: Vec::new(),
        total_duration_minutes: 0,
        estimated_end_time: start,
    }
}

/// One conflict per requested add-on the service does not offer
fn unknown_addons(
    start: DateTime<Utc>,
    requested: &HashSet<Uuid>,
    found: &[ServiceAddon],
) -> ValidationResult {
    let window = TimeWindow { start, end: start };
    let mut missing: Vec<Uuid> = requested
        .iter()
        .filter(|uuid| !found.iter().any(|a| a.uuid == **uuid))
        .copied()
        .collect();
    missing.sort();
    ValidationResult {
        is_valid: false,
        conflicts: missing
            .into_iter()
            .map(|uuid| {
                SchedulingConflict::error(
                    ConflictType::UnknownAddon,
                    "Add-on is not offered with this service",
                    &window,
                )
                .with_entity(uuid)
            })
            .collect(),
        alternative_slots: Vec::new(),
        total_duration_minutes: 0,
        estimated_end_time: start,
    }
}

/// Total minutes of a service with its add-ons
pub fn total_minutes(service: &Service, addons: &[ServiceAddon]) -> i64 {
    service.total_duration_minutes() as i64
        + addons.iter().map(|a| a.extra_duration_minutes as i64).sum::<i64>()
}
