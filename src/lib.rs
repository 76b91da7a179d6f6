//! Slotbook scheduling server
//!
//! Multi-tenant appointment booking engine: computes bookable slots from
//! working hours, time off, availability overrides, holidays and existing
//! appointments, validates proposed bookings, and drives the appointment
//! lifecycle behind a REST JSON API.

use std::sync::Arc;

use sqlx::{Pool, Postgres};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    pub pool: Pool<Postgres>,
}
