pub mod config;
pub mod geo;
pub mod itinerary;
pub mod polyline;
pub mod providers;
pub mod search;
pub mod sqlite;

pub use config::{
    load_wayplan_config, ConfigError, ConfigResult, ProvidersSection, RetrySection,
    StorageSection, WayplanConfig,
};
pub use geo::Coordinate;
pub use itinerary::{
    Day, DayPlan, DayRouteConsolidator, GateDecision, GenerateRequest, GenerationOutcome,
    Itinerary, ItineraryError, ItineraryManager, ItineraryResult, ItineraryStatus, PlaceEntry,
    RouteSegment, Severity, SqliteItineraryStore, SqliteItineraryStoreBuilder, StartLocation,
    TravelMode, WeatherAlert, WeatherGate,
};
pub use providers::{
    DateRange, ForecastReport, GeocodingProvider, HttpGeocodingProvider, HttpPlaceSearchProvider,
    HttpRoutingProvider, HttpWeatherProvider, PlaceSearchProvider, Prediction, ProviderError,
    ProviderResult, RetryPolicy, RouteLeg, RoutingProvider, SubStep, WeatherProvider,
};
pub use search::SearchSession;
