//! Data models for the scheduling engine

pub mod appointment;
pub mod availability_override;
pub mod business;
pub mod enums;
pub mod scheduling;
pub mod service;
pub mod time_off;
pub mod time_window;
pub mod working_hours;

// Re-export commonly used types
pub use appointment::Appointment;
pub use availability_override::AvailabilityOverride;
pub use business::{Business, BusinessPolicy, Customer, Staff};
pub use enums::{AppointmentStatus, AvailabilityStatus, ConflictType, OverrideEffect, Owner};
pub use scheduling::{SchedulingConflict, Slot, ValidationResult};
pub use service::{Service, ServiceAddon};
pub use time_off::TimeOff;
pub use time_window::TimeWindow;
pub use working_hours::WorkingHours;
