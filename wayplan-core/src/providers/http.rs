//! HTTP implementations of the collaborator traits. One JSON endpoint per
//! provider, api key carried as a bearer header, every call bounded by the
//! configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::config::ProvidersSection;
use crate::geo::Coordinate;
use crate::itinerary::models::TravelMode;

use super::{
    DateRange, ForecastReport, GeocodingProvider, PlaceSearchProvider, Prediction, ProviderError,
    ProviderResult, RouteLeg, RoutingProvider, WeatherProvider,
};

#[derive(Debug, Clone)]
struct HttpClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    call_timeout: Duration,
}

impl HttpClient {
    fn new(endpoint: &str, config: &ProvidersSection) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key: config.api_key.clone(),
            call_timeout: config.request_timeout(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn post_json<Req, Resp>(&self, body: &Req) -> ProviderResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let request = self.authorize(self.client.post(&self.endpoint)).json(body);
        let response = match timeout(self.call_timeout, request.send()).await {
            Ok(response) => response?,
            Err(_) => return Err(ProviderError::Timeout(self.call_timeout)),
        };
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        let body = match timeout(self.call_timeout, response.bytes()).await {
            Ok(body) => body?,
            Err(_) => return Err(ProviderError::Timeout(self.call_timeout)),
        };
        Ok(serde_json::from_slice(&body)?)
    }
}

pub struct HttpRoutingProvider {
    http: HttpClient,
}

impl HttpRoutingProvider {
    pub fn new(config: &ProvidersSection) -> Self {
        Self {
            http: HttpClient::new(&config.routing_endpoint, config),
        }
    }
}

#[derive(Serialize)]
struct RouteRequest<'a> {
    waypoints: &'a [Coordinate],
    mode: TravelMode,
}

#[derive(Deserialize)]
struct RouteResponse {
    legs: Vec<RouteLeg>,
}

#[async_trait]
impl RoutingProvider for HttpRoutingProvider {
    async fn compute_route(
        &self,
        waypoints: &[Coordinate],
        mode: TravelMode,
    ) -> ProviderResult<Vec<RouteLeg>> {
        let response: RouteResponse = self.http.post_json(&RouteRequest { waypoints, mode }).await?;
        if response.legs.is_empty() {
            return Err(ProviderError::NoResult(format!(
                "route with {} waypoints",
                waypoints.len()
            )));
        }
        Ok(response.legs)
    }
}

pub struct HttpGeocodingProvider {
    http: HttpClient,
}

impl HttpGeocodingProvider {
    pub fn new(config: &ProvidersSection) -> Self {
        Self {
            http: HttpClient::new(&config.geocoding_endpoint, config),
        }
    }
}

#[derive(Serialize)]
struct GeocodeRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<Coordinate>,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    coordinates: Option<Coordinate>,
    address: Option<String>,
}

#[async_trait]
impl GeocodingProvider for HttpGeocodingProvider {
    async fn geocode(&self, address: &str) -> ProviderResult<Coordinate> {
        let response: GeocodeResponse = self
            .http
            .post_json(&GeocodeRequest {
                address: Some(address),
                position: None,
            })
            .await?;
        response
            .coordinates
            .ok_or_else(|| ProviderError::NoResult(address.to_string()))
    }

    async fn reverse_geocode(&self, position: Coordinate) -> ProviderResult<String> {
        let response: GeocodeResponse = self
            .http
            .post_json(&GeocodeRequest {
                address: None,
                position: Some(position),
            })
            .await?;
        response
            .address
            .ok_or_else(|| ProviderError::NoResult(format!("{},{}", position.lat, position.lng)))
    }
}

pub struct HttpWeatherProvider {
    http: HttpClient,
}

impl HttpWeatherProvider {
    pub fn new(config: &ProvidersSection) -> Self {
        Self {
            http: HttpClient::new(&config.weather_endpoint, config),
        }
    }
}

#[derive(Serialize)]
struct ForecastRequest<'a> {
    destination: &'a str,
    range: DateRange,
}

#[derive(Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    reports: Vec<ForecastReport>,
}

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn forecast(
        &self,
        destination: &str,
        range: DateRange,
    ) -> ProviderResult<Vec<ForecastReport>> {
        let response: ForecastResponse = self
            .http
            .post_json(&ForecastRequest { destination, range })
            .await?;
        Ok(response.reports)
    }
}

pub struct HttpPlaceSearchProvider {
    http: HttpClient,
}

impl HttpPlaceSearchProvider {
    pub fn new(config: &ProvidersSection) -> Self {
        Self {
            http: HttpClient::new(&config.places_endpoint, config),
        }
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    session_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location_bias: Option<Coordinate>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[async_trait]
impl PlaceSearchProvider for HttpPlaceSearchProvider {
    async fn search(
        &self,
        query: &str,
        session_token: &str,
        location_bias: Option<Coordinate>,
    ) -> ProviderResult<Vec<Prediction>> {
        let response: SearchResponse = self
            .http
            .post_json(&SearchRequest {
                query,
                session_token,
                location_bias,
            })
            .await?;
        Ok(response.predictions)
    }
}
