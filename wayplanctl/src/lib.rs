use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wayplan_core::{
    load_wayplan_config, Coordinate, DayPlan, DayRouteConsolidator, GenerationOutcome,
    HttpGeocodingProvider, HttpRoutingProvider, HttpWeatherProvider, Itinerary, ItineraryManager,
    ItineraryStatus, PlaceEntry, RetryPolicy, SqliteItineraryStore, StartLocation, TravelMode,
    WayplanConfig, WeatherGate,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] wayplan_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Core(#[from] wayplan_core::ItineraryError),
    #[error("authentication failed")]
    Authentication,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Itinerary planning command-line interface", long_about = None)]
pub struct Cli {
    /// Path to wayplan.toml
    #[arg(long, default_value = "configs/wayplan.toml")]
    pub config: PathBuf,
    /// Overrides the database path from the config
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Token for local authentication (when WAYPLANCTL_TOKEN is set)
    #[arg(long)]
    pub token: Option<String>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Itinerary lifecycle operations
    #[command(subcommand)]
    Itinerary(ItineraryCommands),
    /// Place mutations on a draft itinerary
    #[command(subcommand)]
    Place(PlaceCommands),
}

#[derive(Subcommand, Debug)]
pub enum ItineraryCommands {
    /// Builds and saves a draft from a plan file
    Generate(GenerateArgs),
    /// Lists itineraries for an owner
    List(ListArgs),
    /// Shows one itinerary in full
    Show(TargetArgs),
    /// Confirms a draft
    Confirm(ConfirmArgs),
    /// Archives a confirmed itinerary
    Archive(TargetArgs),
    /// Deletes a draft
    Delete(TargetArgs),
    /// Shows the itinerary currently in progress, if any
    Active(OwnerArgs),
    /// Recomputes route segments for days that lost them
    Refresh(TargetArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[arg(long)]
    pub owner: String,
    /// JSON plan file with destination, days and places
    #[arg(long)]
    pub plan: PathBuf,
    /// Keep the caller's place order instead of optimizing per day
    #[arg(long, default_value_t = false)]
    pub manual: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub owner: String,
    /// Filter by status (draft, confirmed, archived)
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Args, Debug)]
pub struct OwnerArgs {
    #[arg(long)]
    pub owner: String,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    #[arg(long)]
    pub owner: String,
    pub route_id: String,
}

#[derive(Args, Debug)]
pub struct ConfirmArgs {
    #[arg(long)]
    pub owner: String,
    pub route_id: String,
    /// Title to persist; falls back to the suggested title
    #[arg(long)]
    pub title: Option<String>,
    /// Acknowledge an outstanding weather warning
    #[arg(long, default_value_t = false)]
    pub ack_weather: bool,
}

#[derive(Subcommand, Debug)]
pub enum PlaceCommands {
    /// Appends or inserts a place into one day
    Add(PlaceAddArgs),
    /// Substitutes a place, keeping its slot
    Replace(PlaceReplaceArgs),
    /// Applies a new ordering to one day's places
    Reorder(PlaceReorderArgs),
    /// Removes places from one day
    Remove(PlaceRemoveArgs),
}

#[derive(Args, Debug)]
pub struct PlaceAddArgs {
    #[arg(long)]
    pub owner: String,
    pub route_id: String,
    #[arg(long)]
    pub day: u32,
    #[arg(long = "ref")]
    pub place_ref: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long, requires = "lng")]
    pub lat: Option<f64>,
    #[arg(long, requires = "lat")]
    pub lng: Option<f64>,
    /// Insertion slot; appends when omitted
    #[arg(long)]
    pub position: Option<usize>,
}

#[derive(Args, Debug)]
pub struct PlaceReplaceArgs {
    #[arg(long)]
    pub owner: String,
    pub route_id: String,
    #[arg(long)]
    pub day: u32,
    /// Place to be replaced
    #[arg(long)]
    pub old_ref: String,
    #[arg(long = "ref")]
    pub place_ref: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long, requires = "lng")]
    pub lat: Option<f64>,
    #[arg(long, requires = "lat")]
    pub lng: Option<f64>,
}

#[derive(Args, Debug)]
pub struct PlaceReorderArgs {
    #[arg(long)]
    pub owner: String,
    pub route_id: String,
    #[arg(long)]
    pub day: u32,
    /// Complete new ordering of the day's place refs
    #[arg(required = true)]
    pub refs: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PlaceRemoveArgs {
    #[arg(long)]
    pub owner: String,
    pub route_id: String,
    #[arg(long)]
    pub day: u32,
    #[arg(required = true)]
    pub refs: Vec<String>,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();
    enforce_token(&cli)?;
    let context = AppContext::new(&cli)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Itinerary(command) => match command {
            ItineraryCommands::Generate(args) => {
                let outcome = runtime.block_on(context.generate(args))?;
                render(&GenerateView::from(outcome), cli.format)
            }
            ItineraryCommands::List(args) => {
                let status = parse_status(args.status.as_deref())?;
                let rows = context.manager.list(&args.owner, status)?;
                render(&ItineraryList::from(rows), cli.format)
            }
            ItineraryCommands::Show(args) => {
                let itinerary = context.manager.get_by_id(&args.route_id, &args.owner)?;
                render(&ItineraryDetail(itinerary), cli.format)
            }
            ItineraryCommands::Confirm(args) => {
                let itinerary = runtime.block_on(context.manager.update_status(
                    &args.route_id,
                    &args.owner,
                    ItineraryStatus::Confirmed,
                    args.title.as_deref(),
                    args.ack_weather,
                ))?;
                render(&ItineraryDetail(itinerary), cli.format)
            }
            ItineraryCommands::Archive(args) => {
                let itinerary = runtime.block_on(context.manager.update_status(
                    &args.route_id,
                    &args.owner,
                    ItineraryStatus::Archived,
                    None,
                    false,
                ))?;
                render(&ItineraryDetail(itinerary), cli.format)
            }
            ItineraryCommands::Delete(args) => {
                context.manager.delete(&args.route_id, &args.owner)?;
                render(
                    &Ack {
                        status: "deleted".to_string(),
                        route_id: args.route_id.clone(),
                    },
                    cli.format,
                )
            }
            ItineraryCommands::Active(args) => {
                let active = context.manager.get_active(&args.owner, Utc::now())?;
                render(&ActiveView(active), cli.format)
            }
            ItineraryCommands::Refresh(args) => {
                let itinerary =
                    runtime.block_on(context.manager.refresh_routes(&args.route_id, &args.owner))?;
                render(&ItineraryDetail(itinerary), cli.format)
            }
        },
        Commands::Place(command) => {
            let itinerary = match command {
                PlaceCommands::Add(args) => context.manager.add_place(
                    &args.route_id,
                    &args.owner,
                    args.day,
                    build_place(
                        &args.place_ref,
                        &args.name,
                        args.address.as_deref(),
                        args.lat,
                        args.lng,
                    ),
                    args.position,
                )?,
                PlaceCommands::Replace(args) => context.manager.replace_place(
                    &args.route_id,
                    &args.owner,
                    args.day,
                    &args.old_ref,
                    build_place(
                        &args.place_ref,
                        &args.name,
                        args.address.as_deref(),
                        args.lat,
                        args.lng,
                    ),
                )?,
                PlaceCommands::Reorder(args) => context.manager.reorder_places(
                    &args.route_id,
                    &args.owner,
                    args.day,
                    &args.refs,
                )?,
                PlaceCommands::Remove(args) => context.manager.remove_places(
                    &args.route_id,
                    &args.owner,
                    args.day,
                    &args.refs,
                )?,
            };
            render(&ItineraryDetail(itinerary), cli.format)
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn enforce_token(cli: &Cli) -> Result<()> {
    if let Ok(expected) = std::env::var("WAYPLANCTL_TOKEN") {
        match &cli.token {
            Some(provided) if provided == &expected => Ok(()),
            _ => Err(AppError::Authentication),
        }
    } else {
        Ok(())
    }
}

fn parse_status(value: Option<&str>) -> Result<Option<ItineraryStatus>> {
    value
        .map(|raw| raw.parse().map_err(AppError::InvalidArgument))
        .transpose()
}

fn build_place(
    place_ref: &str,
    name: &str,
    address: Option<&str>,
    lat: Option<f64>,
    lng: Option<f64>,
) -> PlaceEntry {
    let mut place = PlaceEntry::new(place_ref, name);
    place.address = address.map(str::to_string);
    if let (Some(lat), Some(lng)) = (lat, lng) {
        place = place.at(Coordinate::new(lat, lng));
    }
    place
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

pub struct AppContext {
    pub manager: ItineraryManager,
}

impl AppContext {
    pub fn new(cli: &Cli) -> Result<Self> {
        let config = load_wayplan_config(&cli.config)?;
        Ok(Self {
            manager: build_manager(&config, cli.db.clone())?,
        })
    }

    async fn generate(&self, args: &GenerateArgs) -> Result<GenerationOutcome> {
        let raw = fs::read_to_string(&args.plan)?;
        let plan: PlanFile = serde_json::from_str(&raw)?;
        let request = plan.into_request(&args.owner);
        let outcome = if args.manual {
            self.manager.create(request).await?
        } else {
            self.manager.generate(request).await?
        };
        Ok(outcome)
    }
}

fn build_manager(config: &WayplanConfig, db: Option<PathBuf>) -> Result<ItineraryManager> {
    let db_path = db.unwrap_or_else(|| PathBuf::from(&config.storage.db_path));
    let store = SqliteItineraryStore::builder()
        .path(db_path)
        .create_if_missing(true)
        .build()?;
    store.initialize()?;

    let retry = RetryPolicy::new(config.retry.clone());
    let call_timeout = config.providers.request_timeout();
    let consolidator = DayRouteConsolidator::new(
        Arc::new(HttpRoutingProvider::new(&config.providers)),
        Arc::new(HttpGeocodingProvider::new(&config.providers)),
        retry.clone(),
        call_timeout,
    );
    let gate = WeatherGate::new(
        Arc::new(HttpWeatherProvider::new(&config.providers)),
        retry,
        call_timeout,
    );
    Ok(ItineraryManager::new(store, consolidator, gate))
}

/// Caller-facing plan document. Day numbers are implied by array order and
/// place slots carry no routing data.
#[derive(Debug, Deserialize)]
pub struct PlanFile {
    pub destination: String,
    #[serde(default)]
    pub start_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suggested_title: Option<String>,
    pub days: Vec<PlanDay>,
}

#[derive(Debug, Deserialize)]
pub struct PlanDay {
    pub travel_mode: TravelMode,
    pub start_location: StartLocation,
    #[serde(default)]
    pub places: Vec<PlanPlace>,
    #[serde(default)]
    pub optimize: bool,
}

#[derive(Debug, Deserialize)]
pub struct PlanPlace {
    pub place_ref: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinate>,
}

impl PlanFile {
    fn into_request(self, owner: &str) -> wayplan_core::GenerateRequest {
        wayplan_core::GenerateRequest {
            owner_id: owner.to_string(),
            destination: self.destination,
            start_datetime: self.start_datetime,
            suggested_title: self.suggested_title,
            days: self
                .days
                .into_iter()
                .map(|day| DayPlan {
                    day_number: 0,
                    travel_mode: day.travel_mode,
                    start_location: day.start_location,
                    places: day
                        .places
                        .into_iter()
                        .map(|place| {
                            let mut entry = PlaceEntry::new(place.place_ref, place.name);
                            entry.address = place.address;
                            entry.coordinates = place.coordinates;
                            entry
                        })
                        .collect(),
                    optimize: day.optimize,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: String,
    pub route_id: String,
}

impl DisplayFallback for Ack {
    fn display(&self) -> String {
        format!("{} {}", self.status, self.route_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerateView {
    Saved {
        itinerary: Itinerary,
    },
    NeedsAck {
        itinerary: Itinerary,
        alert: wayplan_core::WeatherAlert,
    },
    Rejected {
        alert: wayplan_core::WeatherAlert,
    },
}

impl From<GenerationOutcome> for GenerateView {
    fn from(outcome: GenerationOutcome) -> Self {
        match outcome {
            GenerationOutcome::Saved(itinerary) => GenerateView::Saved { itinerary },
            GenerationOutcome::NeedsAck(itinerary, alert) => {
                GenerateView::NeedsAck { itinerary, alert }
            }
            GenerationOutcome::Rejected(alert) => GenerateView::Rejected { alert },
        }
    }
}

impl DisplayFallback for GenerateView {
    fn display(&self) -> String {
        match self {
            GenerateView::Saved { itinerary } => {
                format!("saved as draft\n{}", summarize(itinerary))
            }
            GenerateView::NeedsAck { itinerary, alert } => format!(
                "saved as draft, weather warning pending acknowledgement\n[{}] {}: {}\n{}",
                alert.severity,
                alert.title,
                alert.message,
                summarize(itinerary)
            ),
            GenerateView::Rejected { alert } => format!(
                "rejected, nothing saved\n[{}] {}: {}",
                alert.severity, alert.title, alert.message
            ),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItineraryList {
    pub rows: Vec<Itinerary>,
}

impl From<Vec<Itinerary>> for ItineraryList {
    fn from(rows: Vec<Itinerary>) -> Self {
        Self { rows }
    }
}

impl DisplayFallback for ItineraryList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "no itineraries found".to_string();
        }
        self.rows
            .iter()
            .map(|itinerary| {
                format!(
                    "{} | {} | status={} | days={} | title={}",
                    itinerary.route_id,
                    itinerary.destination,
                    itinerary.status,
                    itinerary.duration_days,
                    itinerary
                        .title
                        .as_deref()
                        .or(itinerary.suggested_title.as_deref())
                        .unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ItineraryDetail(pub Itinerary);

impl DisplayFallback for ItineraryDetail {
    fn display(&self) -> String {
        summarize(&self.0)
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ActiveView(pub Option<Itinerary>);

impl DisplayFallback for ActiveView {
    fn display(&self) -> String {
        match &self.0 {
            Some(itinerary) => summarize(itinerary),
            None => "no active itinerary".to_string(),
        }
    }
}

fn summarize(itinerary: &Itinerary) -> String {
    let mut lines = vec![format!(
        "{} | {} | status={} | days={}",
        itinerary.route_id, itinerary.destination, itinerary.status, itinerary.duration_days
    )];
    if let Some(title) = itinerary
        .title
        .as_deref()
        .or(itinerary.suggested_title.as_deref())
    {
        lines.push(format!("title: {title}"));
    }
    if let Some(start) = itinerary.start_datetime {
        lines.push(format!("starts: {}", start.to_rfc3339()));
    }
    for alert in &itinerary.alerts {
        lines.push(format!(
            "alert [{}] {}: {}",
            alert.severity, alert.title, alert.message
        ));
    }
    for day in &itinerary.days {
        lines.push(format!(
            "day {} ({}) from {}:",
            day.day_number, day.travel_mode, day.start_location.name
        ));
        if day.places.is_empty() {
            lines.push("  (no places)".to_string());
        }
        for place in &day.places {
            let routed = match &place.route_segment {
                Some(segment) => format!(
                    "{}s / {:.0}m",
                    segment.duration_s, segment.distance_m
                ),
                None => "unrouted".to_string(),
            };
            lines.push(format!(
                "  {}. {} [{}] {}",
                place.order_index + 1,
                place.name,
                place.place_ref,
                routed
            ));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn plan_file_maps_to_a_request() {
        let raw = r#"{
            "destination": "Đà Nẵng",
            "suggested_title": "Beach week",
            "days": [
                {
                    "travel_mode": "walking",
                    "start_location": { "name": "Hotel Riverside" },
                    "places": [
                        { "place_ref": "p1", "name": "Dragon Bridge" },
                        {
                            "place_ref": "p2",
                            "name": "Han Market",
                            "coordinates": { "lat": 16.0678, "lng": 108.2208 }
                        }
                    ],
                    "optimize": true
                },
                {
                    "travel_mode": "driving",
                    "start_location": { "name": "Hotel Riverside" }
                }
            ]
        }"#;

        let plan: PlanFile = serde_json::from_str(raw).unwrap();
        let request = plan.into_request("u1");
        assert_eq!(request.owner_id, "u1");
        assert_eq!(request.days.len(), 2);
        assert!(request.days[0].optimize);
        assert_eq!(request.days[0].places[1].coordinates.unwrap().lat, 16.0678);
        assert!(request.days[1].places.is_empty());
        assert!(request.start_datetime.is_none());
    }

    #[test]
    fn status_filter_parses_or_rejects() {
        assert_eq!(
            parse_status(Some("confirmed")).unwrap(),
            Some(ItineraryStatus::Confirmed)
        );
        assert!(parse_status(None).unwrap().is_none());
        assert!(parse_status(Some("paused")).is_err());
    }
}
