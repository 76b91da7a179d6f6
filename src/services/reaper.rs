//! Background task clearing expired slot locks

use std::time::Duration;

use super::{appointments::AppointmentService, locks::SlotLockManager};

/// One sweep: expired appointment row locks, then expired key locks
pub async fn reap_once(appointments: &AppointmentService, locks: &SlotLockManager) {
    match appointments.reap_expired_locks().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "Cleared expired appointment locks"),
        Err(e) => tracing::warn!(error = %e, "Appointment lock reaper failed"),
    }
    match locks.purge_expired().await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(count = n, "Purged expired slot reservations"),
        Err(e) => tracing::warn!(error = %e, "Slot reservation purge failed"),
    }
}

pub async fn run_lock_reaper(appointments: AppointmentService, locks: SlotLockManager, every_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(every_secs.max(1)));
    loop {
        interval.tick().await;
        reap_once(&appointments, &locks).await;
    }
}
