// Core modules
pub mod api;
pub mod db;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod settings;
pub mod strategy;

// Re-export commonly used types
pub use error::{BotError, GatewayError};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
