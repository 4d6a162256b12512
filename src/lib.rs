//! Invite Tracker Library
//!
//! Resolves which invite a newly joined guild member used, from the
//! platform's invite and join events. This module exposes the components
//! for use by the binary and by tests.

pub mod config;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod platform;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult, PlatformError};
pub use services::InviteTracker;
