use std::path::PathBuf;

use thiserror::Error;

use super::models::WeatherAlert;
use crate::providers::ProviderError;

#[derive(Debug, Error)]
pub enum ItineraryError {
    /// Absent, not owned by the caller, or in a status that forbids the
    /// operation. Deliberately indistinguishable so callers cannot probe
    /// for existence or ownership.
    #[error("itinerary not found or not accessible")]
    NotFoundOrForbidden,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("upstream {service} failure: {detail}")]
    Upstream {
        service: &'static str,
        detail: String,
    },
    #[error("itinerary was modified concurrently")]
    Conflict,
    #[error("weather risk too severe to confirm: {}", .0.title)]
    WeatherBlocked(WeatherAlert),
    #[error("weather warning requires acknowledgement: {}", .0.title)]
    WeatherAckRequired(WeatherAlert),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("itinerary store path not configured")]
    MissingStore,
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

impl ItineraryError {
    pub fn validation(detail: impl Into<String>) -> Self {
        ItineraryError::Validation(detail.into())
    }

    pub fn upstream(service: &'static str, source: ProviderError) -> Self {
        ItineraryError::Upstream {
            service,
            detail: source.to_string(),
        }
    }
}

pub type ItineraryResult<T> = std::result::Result<T, ItineraryError>;
