//! ShortHub Common Library
//!
//! Shared code for the ShortHub gateway and scheduler:
//! - Work item lifecycle engine and its read models
//! - Notification dispatcher (platform, email, WhatsApp)
//! - Drive storage connector and YouTube catalog client
//! - Channel registry, user directory and analytics
//! - Database entities and repository
//! - Error types, configuration, authentication and metrics

pub mod analytics;
pub mod auth;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod crypto;
pub mod db;
pub mod errors;
pub mod events;
pub mod jobs;
pub mod lifecycle;
pub mod loaders;
pub mod metrics;
pub mod notifications;
pub mod services;
pub mod storage;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};
pub use services::AppServices;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
