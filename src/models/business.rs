//! Businesses, their staff and customers

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Business
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Business {
    pub id: i32,
    pub uuid: Uuid,
    pub name: String,
    /// IANA timezone the business's working hours are expressed in
    pub timezone: String,
    pub policy: BusinessPolicy,
}

impl Business {
    /// Parsed timezone, falling back to UTC for unknown names
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// First instant of a local date, skipping forward over a DST gap
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let tz = self.tz();
        let mut local = date.and_time(chrono::NaiveTime::MIN);
        for _ in 0..4 {
            if let Some(start) = tz.from_local_datetime(&local).earliest() {
                return start.with_timezone(&Utc);
            }
            local += chrono::Duration::minutes(30);
        }
        Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
    }
}

/// Default booking policy of a business (stored as JSON)
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct BusinessPolicy {
    pub min_lead_time_hours: Option<i32>,
    pub max_lead_time_days: Option<i32>,
    pub max_advance_booking_days: Option<i32>,
    pub cancellation_window_hours: Option<i32>,
    pub deposit_required: bool,
    pub deposit_percentage: Option<Decimal>,
    pub no_show_fee: Option<Decimal>,
    pub late_arrival_grace_minutes: Option<i32>,
}

impl BusinessPolicy {
    /// Farthest bookable distance in days, if any
    pub fn advance_booking_days(&self) -> Option<i32> {
        self.max_advance_booking_days.or(self.max_lead_time_days)
    }
}

// ---------------------------------------------------------------------------
// Staff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Staff {
    pub id: i32,
    pub uuid: Uuid,
    pub business_id: i32,
    pub name: String,
    pub is_active: bool,
    pub is_bookable: bool,
}

impl Staff {
    pub fn accepts_bookings(&self) -> bool {
        self.is_active && self.is_bookable
    }
}

// ---------------------------------------------------------------------------
// Customer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Customer {
    pub id: i32,
    pub uuid: Uuid,
    pub business_id: i32,
    pub name: String,
    pub no_show_count: i32,
}
