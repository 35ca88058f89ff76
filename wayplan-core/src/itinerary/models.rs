use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinate;
use crate::providers::{RouteLeg, SubStep};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItineraryStatus {
    Draft,
    Confirmed,
    Archived,
}

impl ItineraryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItineraryStatus::Draft => "draft",
            ItineraryStatus::Confirmed => "confirmed",
            ItineraryStatus::Archived => "archived",
        }
    }

    /// Status only ever moves forward: draft → confirmed → archived.
    pub fn can_transition(&self, next: ItineraryStatus) -> bool {
        matches!(
            (self, next),
            (ItineraryStatus::Draft, ItineraryStatus::Confirmed)
                | (ItineraryStatus::Confirmed, ItineraryStatus::Archived)
        )
    }
}

impl fmt::Display for ItineraryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItineraryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ItineraryStatus::Draft),
            "confirmed" => Ok(ItineraryStatus::Confirmed),
            "archived" => Ok(ItineraryStatus::Archived),
            other => Err(format!("unknown itinerary status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Driving,
    Walking,
    Bicycling,
    Transit,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Transit => "transit",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driving" => Ok(TravelMode::Driving),
            "walking" => Ok(TravelMode::Walking),
            "bicycling" => Ok(TravelMode::Bicycling),
            "transit" => Ok(TravelMode::Transit),
            other => Err(format!("unknown travel mode: {other}")),
        }
    }
}

/// Weather-risk classification. Ordering matters: `Danger` outranks
/// `Warning` outranks `Info` when collapsing several reports into one alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Danger,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherAlert {
    pub severity: Severity,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartLocation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
}

impl StartLocation {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coordinates: None,
        }
    }

    pub fn resolved(name: impl Into<String>, coordinates: Coordinate) -> Self {
        Self {
            name: name.into(),
            coordinates: Some(coordinates),
        }
    }
}

/// Leg connecting a place to the previous stop, cached on the place entry.
/// Invalidated whenever the day's place list or travel mode changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSegment {
    pub encoded_path: String,
    pub mode: TravelMode,
    pub duration_s: i64,
    pub distance_m: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_steps: Vec<SubStep>,
}

impl RouteSegment {
    pub fn from_leg(leg: RouteLeg, mode: TravelMode) -> Self {
        Self {
            encoded_path: leg.encoded_path,
            mode,
            duration_s: leg.duration_s,
            distance_m: leg.distance_m,
            sub_steps: leg.sub_steps,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceEntry {
    pub place_ref: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
    pub order_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_segment: Option<RouteSegment>,
}

impl PlaceEntry {
    pub fn new(place_ref: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            place_ref: place_ref.into(),
            name: name.into(),
            address: None,
            coordinates: None,
            order_index: 0,
            route_segment: None,
        }
    }

    pub fn at(mut self, coordinates: Coordinate) -> Self {
        self.coordinates = Some(coordinates);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Day {
    pub day_number: u32,
    pub travel_mode: TravelMode,
    pub start_location: StartLocation,
    pub places: Vec<PlaceEntry>,
}

impl Day {
    /// Drops cached segments; the consolidator must run again before the
    /// next read that needs them.
    pub fn invalidate_segments(&mut self) {
        for place in &mut self.places {
            place.route_segment = None;
        }
    }

    pub fn reindex(&mut self) {
        for (index, place) in self.places.iter_mut().enumerate() {
            place.order_index = index as u32;
        }
    }

    pub fn has_all_segments(&self) -> bool {
        self.places.iter().all(|place| place.route_segment.is_some())
    }
}

/// The root aggregate: a persisted multi-day travel plan. Owned exclusively
/// by `owner_id`; `version` guards against concurrent overwrite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Itinerary {
    pub route_id: String,
    pub owner_id: String,
    pub status: ItineraryStatus,
    pub destination: String,
    pub duration_days: u32,
    pub start_datetime: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub suggested_title: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub days: Vec<Day>,
    pub alerts: Vec<WeatherAlert>,
}

impl Itinerary {
    pub fn new(
        owner_id: impl Into<String>,
        destination: impl Into<String>,
        days: Vec<Day>,
    ) -> Self {
        Self {
            route_id: format!("it-{}", Uuid::new_v4().simple()),
            owner_id: owner_id.into(),
            status: ItineraryStatus::Draft,
            destination: destination.into(),
            duration_days: days.len() as u32,
            start_datetime: None,
            title: None,
            suggested_title: None,
            created_at: None,
            updated_at: None,
            version: 0,
            days,
            alerts: Vec::new(),
        }
    }

    /// Day indices must be exactly `{1, …, duration_days}`: contiguous,
    /// 1-based, no duplicates.
    pub fn validate_days(&self) -> Result<(), String> {
        if self.duration_days == 0 {
            return Err("duration must be at least one day".to_string());
        }
        if self.days.len() as u32 != self.duration_days {
            return Err(format!(
                "expected {} days, found {}",
                self.duration_days,
                self.days.len()
            ));
        }
        for (index, day) in self.days.iter().enumerate() {
            let expected = index as u32 + 1;
            if day.day_number != expected {
                return Err(format!(
                    "day at position {} numbered {}, expected {}",
                    index, day.day_number, expected
                ));
            }
        }
        Ok(())
    }

    pub fn day(&self, day_number: u32) -> Option<&Day> {
        self.days.iter().find(|day| day.day_number == day_number)
    }

    pub fn day_mut(&mut self, day_number: u32) -> Option<&mut Day> {
        self.days.iter_mut().find(|day| day.day_number == day_number)
    }

    /// `[start, start + duration_days)`, when a start is set.
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.start_datetime
            .map(|start| (start, start + Duration::days(self.duration_days as i64)))
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if self.status != ItineraryStatus::Confirmed {
            return false;
        }
        match self.date_range() {
            Some((from, to)) => from <= now && now < to,
            None => false,
        }
    }

    /// Title resolution for confirmation: explicit argument, else the stored
    /// title, else the suggested one. Blank strings never resolve.
    pub fn resolved_title(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.title.clone())
            .or_else(|| self.suggested_title.clone())
            .filter(|title| !title.trim().is_empty())
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: Option<NaiveDateTime> = row.get("created_at")?;
        let updated_at: Option<NaiveDateTime> = row.get("updated_at")?;
        let start_datetime: Option<NaiveDateTime> = row.get("start_datetime")?;
        let days_raw: String = row.get("days")?;
        let alerts_raw: Option<String> = row.get("alerts")?;

        let days: Vec<Day> = serde_json::from_str(&days_raw).map_err(json_column_error)?;
        let alerts: Vec<WeatherAlert> = match alerts_raw {
            Some(raw) => serde_json::from_str(&raw).map_err(json_column_error)?,
            None => Vec::new(),
        };

        Ok(Self {
            route_id: row.get("route_id")?,
            owner_id: row.get("owner_id")?,
            status: row
                .get::<_, String>("status")?
                .parse()
                .unwrap_or(ItineraryStatus::Draft),
            destination: row.get("destination")?,
            duration_days: row.get::<_, i64>("duration_days")? as u32,
            start_datetime: start_datetime.map(|dt| Utc.from_utc_datetime(&dt)),
            title: row.get("title")?,
            suggested_title: row.get("suggested_title")?,
            created_at: created_at.map(|dt| Utc.from_utc_datetime(&dt)),
            updated_at: updated_at.map(|dt| Utc.from_utc_datetime(&dt)),
            version: row.get("version")?,
            days,
            alerts,
        })
    }
}

fn json_column_error(err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}
