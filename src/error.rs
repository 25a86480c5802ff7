//! Error taxonomy for the niche-playlist pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of ways an external-service adapter call can fail.
///
/// `Transient` and `RateLimited` are retried by the adapter itself
/// (see `recovery::retry_with_backoff`); the rest propagate to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceErrorKind {
    Transient,
    NotFound,
    Unauthorized,
    RateLimited,
    Malformed,
    Other,
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceErrorKind::Transient => "transient",
            ServiceErrorKind::NotFound => "not_found",
            ServiceErrorKind::Unauthorized => "unauthorized",
            ServiceErrorKind::RateLimited => "rate_limited",
            ServiceErrorKind::Malformed => "malformed",
            ServiceErrorKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl ServiceErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceErrorKind::Transient | ServiceErrorKind::RateLimited)
    }
}

/// Error raised by a `ServiceAdapter` (metadata, scrobble, or streaming service).
#[derive(Debug, Error)]
#[error("{provider} adapter error ({kind}): {message}")]
pub struct ServiceError {
    pub provider: String,
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(provider: impl Into<String>, kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ServiceErrorKind::Transient, message)
    }

    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ServiceErrorKind::RateLimited, message)
    }
}

/// Request parameters outside the permitted domain (e.g. unknown genre).
/// Raised synchronously by `PlaylistRequest::create`; no persistent state written.
#[derive(Debug, Error)]
#[error("invalid request: {0}")]
pub struct ValidationError(pub String);

/// The finder's final gate failed: fewer than `MIN_SONGS_FOR_PLAYLIST_GEN` tracks survived.
#[derive(Debug, Error)]
#[error("not enough songs found ({found} of the required minimum {required})")]
pub struct NotEnoughSongs {
    pub found: usize,
    pub required: usize,
}

/// An adapter error occurred but the pipeline salvaged enough tracks to publish
/// a playlist anyway; surfaced to the caller as a warning, not a hard failure.
#[derive(Debug, Error)]
#[error("playlist created with partial failure: {0}")]
pub struct PartialFailure(pub String);

/// The one error type crossing module boundaries in this crate.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    NotEnoughSongs(#[from] NotEnoughSongs),

    #[error(transparent)]
    PartialFailure(#[from] PartialFailure),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code, mirrors the error variant name.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Service(e) => match e.kind {
                ServiceErrorKind::Transient => "SERVICE_TRANSIENT",
                ServiceErrorKind::NotFound => "SERVICE_NOT_FOUND",
                ServiceErrorKind::Unauthorized => "SERVICE_UNAUTHORIZED",
                ServiceErrorKind::RateLimited => "SERVICE_RATE_LIMITED",
                ServiceErrorKind::Malformed => "SERVICE_MALFORMED",
                ServiceErrorKind::Other => "SERVICE_ERROR",
            },
            AppError::NotEnoughSongs(_) => "NOT_ENOUGH_SONGS",
            AppError::PartialFailure(_) => "PARTIAL_FAILURE",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Short human message, the one shown to a caller that doesn't want the full chain.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.0.clone(),
            AppError::Service(e) => format!("{} is currently unavailable ({})", e.provider, e.kind),
            AppError::NotEnoughSongs(e) => {
                format!("only found {} of the required {} tracks", e.found, e.required)
            }
            AppError::PartialFailure(e) => e.0.clone(),
            AppError::Configuration(msg) => msg.clone(),
            AppError::Database(_) => "a database error occurred".to_string(),
            AppError::Internal(_) => "an unexpected error occurred".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
