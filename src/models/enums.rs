//! Closed domain enums and their storage codecs
//!
//! Every enum here is persisted as lowercase text. The string form is only
//! used at the storage edge and on the wire; the engine matches on variants.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};
use utoipa::ToSchema;

/// Implements `as_str`, `Display`, `FromStr` and the sqlx text codec for a
/// unit-only enum.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl sqlx::Type<Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $name {
            fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let s: String = Decode::<Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl Encode<'_, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <&str as Encode<Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Owner
// ---------------------------------------------------------------------------

/// Owner of a working-hours or time-off record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "owner_type", content = "owner_id", rename_all = "snake_case")]
pub enum Owner {
    Business(i32),
    Staff(i32),
}

impl Owner {
    /// Storage tag for the owner kind
    pub fn kind(&self) -> &'static str {
        match self {
            Owner::Business(_) => "business",
            Owner::Staff(_) => "staff",
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Owner::Business(id) | Owner::Staff(id) => *id,
        }
    }

    /// Rebuild an owner from its stored (`owner_type`, `owner_id`) pair
    pub fn from_parts(kind: &str, id: i32) -> Result<Self, String> {
        match kind.to_lowercase().as_str() {
            "business" => Ok(Owner::Business(id)),
            "staff" => Ok(Owner::Staff(id)),
            other => Err(format!("Invalid owner type: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Weekday codec
// ---------------------------------------------------------------------------

/// Stored weekday (0=Monday, 6=Sunday) to chrono weekday
pub fn weekday_from_i16(v: i16) -> Result<Weekday, String> {
    match v {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        other => Err(format!("Invalid weekday: {}", other)),
    }
}

pub fn weekday_to_i16(day: Weekday) -> i16 {
    day.num_days_from_monday() as i16
}

/// Lowercase English day name
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

// ---------------------------------------------------------------------------
// TimeOff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeOffStatus {
    Pending,
    Approved,
    Denied,
    Cancelled,
}

text_enum!(TimeOffStatus {
    Pending => "pending",
    Approved => "approved",
    Denied => "denied",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeOffType {
    Vacation,
    SickLeave,
    Personal,
    Training,
    Holiday,
    Maintenance,
    Other,
}

text_enum!(TimeOffType {
    Vacation => "vacation",
    SickLeave => "sick_leave",
    Personal => "personal",
    Training => "training",
    Holiday => "holiday",
    Maintenance => "maintenance",
    Other => "other",
});

// ---------------------------------------------------------------------------
// AvailabilityOverride
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverrideType {
    Available,
    Unavailable,
    CustomHours,
}

text_enum!(OverrideType {
    Available => "available",
    Unavailable => "unavailable",
    CustomHours => "custom_hours",
});

/// Effect of the overrides covering one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverrideEffect {
    Available,
    Unavailable,
    None,
}

// ---------------------------------------------------------------------------
// Appointment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Tentative,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

text_enum!(AppointmentStatus {
    Tentative => "tentative",
    Confirmed => "confirmed",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
    Rescheduled => "rescheduled",
});

impl AppointmentStatus {
    /// Statuses that occupy the staff member's time
    pub const BLOCKING: [AppointmentStatus; 3] = [
        AppointmentStatus::Tentative,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::NoShow
                | AppointmentStatus::Rescheduled
        )
    }

    pub fn blocks_time(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    /// Statuses reachable from this one
    pub fn allowed_transitions(&self) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;
        match self {
            Tentative => &[Confirmed, Cancelled, Rescheduled],
            Confirmed => &[InProgress, Cancelled, NoShow, Rescheduled],
            InProgress => &[Completed, Cancelled],
            Completed | Cancelled | NoShow | Rescheduled => &[],
        }
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    CustomerRequest,
    StaffUnavailable,
    BusinessClosure,
    Emergency,
    Weather,
    Other,
}

text_enum!(CancellationReason {
    CustomerRequest => "customer_request",
    StaffUnavailable => "staff_unavailable",
    BusinessClosure => "business_closure",
    Emergency => "emergency",
    Weather => "weather",
    Other => "other",
});

// ---------------------------------------------------------------------------
// Scheduling output
// ---------------------------------------------------------------------------

/// Slot status. The calculator only emits `Available` and `Unavailable`;
/// `Busy` and `Blocked` are accepted on the wire for callers that tag slots
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
    Busy,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ExistingAppointment,
    TimeOff,
    OutsideWorkingHours,
    InsufficientBuffer,
    LeadTimeViolation,
    AdvanceBookingViolation,
    AvailabilityOverride,
    StaffUnavailable,
    /// Requested add-on is unknown, inactive or belongs to another service
    UnknownAddon,
}

text_enum!(ConflictType {
    ExistingAppointment => "existing_appointment",
    TimeOff => "time_off",
    OutsideWorkingHours => "outside_working_hours",
    InsufficientBuffer => "insufficient_buffer",
    LeadTimeViolation => "lead_time_violation",
    AdvanceBookingViolation => "advance_booking_violation",
    AvailabilityOverride => "availability_override",
    StaffUnavailable => "staff_unavailable",
    UnknownAddon => "unknown_addon",
});
