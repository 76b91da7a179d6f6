//! Lead-time and advance-booking policy

use chrono::{DateTime, Duration, Utc};

use crate::models::{BusinessPolicy, Service};

/// Effective limits for one service, after falling back to the business
/// defaults. `None` means no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyEvaluator {
    pub min_lead_time_hours: Option<i32>,
    pub max_advance_booking_days: Option<i32>,
}

impl PolicyEvaluator {
    pub fn for_service(service: &Service, business: &BusinessPolicy) -> Self {
        Self {
            min_lead_time_hours: service.min_lead_time_hours.or(business.min_lead_time_hours),
            max_advance_booking_days: service
                .max_advance_booking_days
                .or(business.advance_booking_days()),
        }
    }

    /// `start >= now + lead time`; non-positive lead times always pass
    pub fn lead_time_ok(&self, now: DateTime<Utc>, start: DateTime<Utc>) -> bool {
        match self.min_lead_time_hours {
            Some(hours) if hours > 0 => start >= now + Duration::hours(hours as i64),
            _ => true,
        }
    }

    /// `start <= now + advance window`
    pub fn advance_booking_ok(&self, now: DateTime<Utc>, start: DateTime<Utc>) -> bool {
        match self.max_advance_booking_days {
            Some(days) => start <= now + Duration::days(days as i64),
            None => true,
        }
    }
}
