use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::warn;

use crate::geo::{haversine_m, Coordinate};
use crate::providers::{
    GeocodingProvider, ProviderError, ProviderResult, RetryPolicy, RouteLeg, RoutingProvider,
};

use super::error::{ItineraryError, ItineraryResult};
use super::models::{Day, PlaceEntry, RouteSegment, StartLocation, TravelMode};

/// Caller input for one day, before segments are computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayPlan {
    pub day_number: u32,
    pub travel_mode: TravelMode,
    pub start_location: StartLocation,
    pub places: Vec<PlaceEntry>,
    #[serde(default)]
    pub optimize: bool,
}

/// Turns day-grouped POIs into ordered, routed [`Day`]s.
///
/// Start-location geocoding sits on the critical path and aborts the request
/// when it fails; a routing failure only costs that day its segments.
pub struct DayRouteConsolidator {
    routing: Arc<dyn RoutingProvider>,
    geocoding: Arc<dyn GeocodingProvider>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl DayRouteConsolidator {
    pub fn new(
        routing: Arc<dyn RoutingProvider>,
        geocoding: Arc<dyn GeocodingProvider>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            routing,
            geocoding,
            retry,
            call_timeout,
        }
    }

    /// Fan-out across days, joined before persistence. Days are independent;
    /// results come back in input order.
    pub async fn consolidate(&self, plans: Vec<DayPlan>) -> ItineraryResult<Vec<Day>> {
        join_all(plans.into_iter().map(|plan| self.consolidate_day(plan)))
            .await
            .into_iter()
            .collect()
    }

    pub async fn consolidate_day(&self, plan: DayPlan) -> ItineraryResult<Day> {
        let DayPlan {
            day_number,
            travel_mode,
            mut start_location,
            mut places,
            optimize,
        } = plan;

        let start = match start_location.coordinates {
            Some(coordinates) => coordinates,
            None => {
                let resolved = self
                    .geocode(&start_location.name)
                    .await
                    .map_err(|source| ItineraryError::upstream("geocoding", source))?;
                start_location.coordinates = Some(resolved);
                resolved
            }
        };

        self.resolve_place_coordinates(day_number, &mut places).await;

        let mut ordered = if optimize {
            nearest_neighbor_order(start, places)
        } else {
            places
        };
        for (index, place) in ordered.iter_mut().enumerate() {
            place.order_index = index as u32;
            place.route_segment = None;
        }

        if !ordered.is_empty() {
            self.attach_segments(day_number, start, travel_mode, &mut ordered)
                .await;
        }

        Ok(Day {
            day_number,
            travel_mode,
            start_location,
            places: ordered,
        })
    }

    /// POI coordinates are best-effort: an unresolvable place keeps its
    /// identifying data and the day simply goes unrouted.
    async fn resolve_place_coordinates(&self, day_number: u32, places: &mut [PlaceEntry]) {
        for place in places.iter_mut() {
            if place.coordinates.is_some() {
                continue;
            }
            let query = place.address.as_deref().unwrap_or(&place.name);
            match self.geocode(query).await {
                Ok(coordinates) => place.coordinates = Some(coordinates),
                Err(error) => warn!(
                    target: "consolidator.geocoding",
                    day = day_number,
                    place_ref = %place.place_ref,
                    %error,
                    "could not resolve place coordinates"
                ),
            }
        }
    }

    async fn attach_segments(
        &self,
        day_number: u32,
        start: Coordinate,
        travel_mode: TravelMode,
        places: &mut [PlaceEntry],
    ) {
        let mut waypoints = Vec::with_capacity(places.len() + 1);
        waypoints.push(start);
        for place in places.iter() {
            match place.coordinates {
                Some(coordinates) => waypoints.push(coordinates),
                None => {
                    warn!(
                        target: "consolidator.routing",
                        day = day_number,
                        place_ref = %place.place_ref,
                        "place has no coordinates, skipping routing for this day"
                    );
                    return;
                }
            }
        }

        match self.compute_legs(&waypoints, travel_mode).await {
            Ok(legs) => {
                if legs.len() != places.len() {
                    warn!(
                        target: "consolidator.routing",
                        day = day_number,
                        expected = places.len(),
                        got = legs.len(),
                        "unexpected leg count, dropping segments for this day"
                    );
                    return;
                }
                // Leg 0 is the start→first-POI leg.
                for (place, leg) in places.iter_mut().zip(legs) {
                    place.route_segment = Some(RouteSegment::from_leg(leg, travel_mode));
                }
            }
            Err(error) => warn!(
                target: "consolidator.routing",
                day = day_number,
                %error,
                "routing failed, keeping places without segments"
            ),
        }
    }

    async fn geocode(&self, address: &str) -> ProviderResult<Coordinate> {
        let call_timeout = self.call_timeout;
        let geocoding = &self.geocoding;
        self.retry
            .run("geocoding.geocode", |_| async move {
                match timeout(call_timeout, geocoding.geocode(address)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(call_timeout)),
                }
            })
            .await
    }

    async fn compute_legs(
        &self,
        waypoints: &[Coordinate],
        mode: TravelMode,
    ) -> ProviderResult<Vec<RouteLeg>> {
        let call_timeout = self.call_timeout;
        let routing = &self.routing;
        self.retry
            .run("routing.compute_route", |_| async move {
                match timeout(call_timeout, routing.compute_route(waypoints, mode)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(call_timeout)),
                }
            })
            .await
    }
}

/// Deterministic greedy ordering: repeatedly pick the unvisited POI with the
/// least estimated travel cost from the current position, ties broken by
/// original index. Places without coordinates sort last in original order.
fn nearest_neighbor_order(start: Coordinate, places: Vec<PlaceEntry>) -> Vec<PlaceEntry> {
    let mut remaining = places;
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut current = start;

    while !remaining.is_empty() {
        let mut best_slot = 0usize;
        let mut best_cost = f64::INFINITY;
        for (slot, place) in remaining.iter().enumerate() {
            let cost = place
                .coordinates
                .map(|coordinates| haversine_m(current, coordinates))
                .unwrap_or(f64::INFINITY);
            if cost < best_cost {
                best_slot = slot;
                best_cost = cost;
            }
        }
        let place = remaining.remove(best_slot);
        if let Some(coordinates) = place.coordinates {
            current = coordinates;
        }
        ordered.push(place);
    }

    ordered
}
