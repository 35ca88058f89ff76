pub mod consolidator;
pub mod error;
pub mod manager;
pub mod models;
pub mod store;
pub mod weather;

pub use consolidator::{DayPlan, DayRouteConsolidator};
pub use error::{ItineraryError, ItineraryResult};
pub use manager::{GenerateRequest, GenerationOutcome, ItineraryManager};
pub use models::{
    Day, Itinerary, ItineraryStatus, PlaceEntry, RouteSegment, Severity, StartLocation,
    TravelMode, WeatherAlert,
};
pub use store::{SqliteItineraryStore, SqliteItineraryStoreBuilder};
pub use weather::{GateDecision, WeatherGate};
