//! External collaborator contracts: routing, geocoding, weather and place
//! search. Internals of the providers are out of scope; only their structured
//! outputs cross this boundary.

pub mod http;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinate;
use crate::itinerary::models::{Severity, TravelMode};

pub use http::{
    HttpGeocodingProvider, HttpPlaceSearchProvider, HttpRoutingProvider, HttpWeatherProvider,
};
pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("no result for {0}")]
    NoResult(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Half-open UTC window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }
}

/// One computed leg between two consecutive stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub encoded_path: String,
    pub duration_s: i64,
    pub distance_m: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_steps: Vec<SubStep>,
}

/// Mixed-mode legs (typically transit) decompose into sub-steps, each with
/// its own path and mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStep {
    pub encoded_path: String,
    pub mode: TravelMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub severity: Severity,
    pub title: Option<String>,
    pub message: String,
    pub window: Option<DateRange>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub place_ref: String,
    pub description: String,
    pub coordinates: Option<Coordinate>,
}

#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Legs connect consecutive waypoints; `waypoints.len() - 1` legs expected.
    async fn compute_route(
        &self,
        waypoints: &[Coordinate],
        mode: TravelMode,
    ) -> ProviderResult<Vec<RouteLeg>>;
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn geocode(&self, address: &str) -> ProviderResult<Coordinate>;
    async fn reverse_geocode(&self, position: Coordinate) -> ProviderResult<String>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn forecast(
        &self,
        destination: &str,
        range: DateRange,
    ) -> ProviderResult<Vec<ForecastReport>>;
}

#[async_trait]
pub trait PlaceSearchProvider: Send + Sync {
    /// `session_token` groups the keystrokes of one logical search for the
    /// provider's session semantics; see [`crate::search::SearchSession`].
    async fn search(
        &self,
        query: &str,
        session_token: &str,
        location_bias: Option<Coordinate>,
    ) -> ProviderResult<Vec<Prediction>>;
}
