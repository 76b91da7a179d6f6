//! Bookable services and their add-ons

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Service {
    pub id: i32,
    pub uuid: Uuid,
    pub business_id: i32,
    pub name: String,
    pub duration_minutes: i32,
    pub buffer_before_minutes: i32,
    pub buffer_after_minutes: i32,
    pub price: Decimal,
    pub is_active: bool,
    /// Overrides the business minimum lead time
    pub min_lead_time_hours: Option<i32>,
    /// Overrides the business advance booking window
    pub max_advance_booking_days: Option<i32>,
}

impl Service {
    /// Service duration including both buffers
    pub fn total_duration_minutes(&self) -> i32 {
        self.duration_minutes + self.buffer_before_minutes + self.buffer_after_minutes
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceAddon {
    pub id: i32,
    pub uuid: Uuid,
    pub service_id: i32,
    pub name: String,
    pub extra_duration_minutes: i32,
    pub price: Decimal,
    pub is_active: bool,
}
