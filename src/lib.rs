//! Library loan desk
//!
//! Issues and returns loans against a shared pool of physical copies,
//! guaranteeing that a copy is never lent to two borrowers at once, and
//! reports on active and overdue loans over a REST JSON API.

use std::sync::Arc;

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
}
