//! niche-playlist-forge
//!
//! Generates playlists of small-audience artists matching a requested genre,
//! popularity band, and language, by cross-referencing a metadata service, a
//! listener-statistics (scrobble) service, and a streaming service. There is
//! no HTTP surface here (out of scope) -- `main.rs` demonstrates the pipeline
//! directly.

pub mod config;
pub mod database;
pub mod error;
pub mod metrics;
pub mod models;
pub mod recovery;
pub mod services;

pub use config::{AppConfig, ConfigError, Environment};
pub use database::Database;
pub use error::{AppError, Result};
pub use models::*;
pub use services::Services;
