//! Scheduling engine services

pub mod appointments;
pub mod availability;
pub mod clock;
pub mod conflicts;
pub mod exceptions;
pub mod holidays;
pub mod locks;
pub mod policy;
pub mod reaper;
pub mod redis;
pub mod scheduling;
pub mod working_hours;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use crate::{
    config::SchedulingConfig,
    error::AppResult,
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub scheduling: scheduling::SchedulingService,
    pub appointments: appointments::AppointmentService,
    pub locks: locks::SlotLockManager,
}

impl Services {
    /// Wire the engine over the PostgreSQL repository and a lock store
    pub fn new(
        repository: Repository,
        config: &SchedulingConfig,
        lock_store: Arc<dyn locks::LockStore>,
    ) -> AppResult<Self> {
        let scheduling_repo = Arc::new(repository.scheduling.clone());
        let appointment_repo = Arc::new(repository.appointments.clone());
        let holidays = Arc::new(holidays::CalendarHolidayGate::from_config(config)?);
        let clock = Arc::new(clock::SystemClock);

        let calculator = availability::AvailabilityCalculator::new(
            scheduling_repo.clone(),
            holidays,
            clock.clone(),
        );
        let validator = conflicts::ConflictValidator::new(calculator.clone(), config);
        let locks = locks::SlotLockManager::new(lock_store, config.slot_lock_ttl_minutes);

        Ok(Self {
            scheduling: scheduling::SchedulingService::new(
                calculator.clone(),
                validator.clone(),
                locks.clone(),
                config,
            ),
            appointments: appointments::AppointmentService::new(
                scheduling_repo,
                appointment_repo,
                calculator,
                validator,
                locks.clone(),
                clock,
                config,
            ),
            locks,
        })
    }
}
