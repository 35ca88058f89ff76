use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::sqlite::configure_connection;

use super::error::{ItineraryError, ItineraryResult};
use super::models::{Itinerary, ItineraryStatus};

const ITINERARY_SCHEMA: &str = include_str!("../../../sql/itineraries.sql");

#[derive(Debug, Clone)]
pub struct SqliteItineraryStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteItineraryStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteItineraryStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> ItineraryResult<SqliteItineraryStore> {
        let path = self.path.ok_or(ItineraryError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };

        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Ok(SqliteItineraryStore { path, flags })
    }
}

/// Itinerary documents keyed by `route_id`, queryable by `(owner_id, status)`.
/// Day and alert payloads are stored as JSON columns; scalar fields that
/// queries filter or sort on get their own columns.
#[derive(Debug, Clone)]
pub struct SqliteItineraryStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteItineraryStore {
    pub fn builder() -> SqliteItineraryStoreBuilder {
        SqliteItineraryStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> ItineraryResult<Self> {
        SqliteItineraryStoreBuilder::new().path(path).build()
    }

    fn open(&self) -> ItineraryResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            ItineraryError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| ItineraryError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> ItineraryResult<()> {
        let conn = self.open()?;
        conn.execute_batch(ITINERARY_SCHEMA)?;
        Ok(())
    }

    /// Persists a new aggregate and returns it with store-assigned
    /// timestamps filled in.
    pub fn insert(&self, itinerary: &Itinerary) -> ItineraryResult<Itinerary> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO itineraries (
                route_id, owner_id, status, destination, duration_days,
                start_datetime, title, suggested_title, version, days, alerts
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &itinerary.route_id,
                &itinerary.owner_id,
                itinerary.status.as_str(),
                &itinerary.destination,
                itinerary.duration_days as i64,
                itinerary.start_datetime.map(|dt| dt.naive_utc()),
                &itinerary.title,
                &itinerary.suggested_title,
                itinerary.version,
                serde_json::to_string(&itinerary.days)?,
                serialize_alerts(itinerary)?,
            ],
        )?;
        self.fetch_by_id(&itinerary.route_id)?
            .ok_or(ItineraryError::NotFoundOrForbidden)
    }

    pub fn fetch_by_id(&self, route_id: &str) -> ItineraryResult<Option<Itinerary>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT * FROM itineraries WHERE route_id = ?1")?;
        let itinerary = stmt
            .query_row([route_id], |row| Itinerary::from_row(row))
            .optional()?;
        Ok(itinerary)
    }

    pub fn fetch_owned(&self, route_id: &str, owner_id: &str) -> ItineraryResult<Option<Itinerary>> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT * FROM itineraries WHERE route_id = ?1 AND owner_id = ?2")?;
        let itinerary = stmt
            .query_row([route_id, owner_id], |row| Itinerary::from_row(row))
            .optional()?;
        Ok(itinerary)
    }

    /// Guarded write: the row is only updated when `version` still matches
    /// the value the aggregate was loaded with. A stale version on an
    /// existing row is a concurrent-modification conflict.
    pub fn update(&self, itinerary: &Itinerary) -> ItineraryResult<Itinerary> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE itineraries SET
                status = ?3,
                destination = ?4,
                duration_days = ?5,
                start_datetime = ?6,
                title = ?7,
                suggested_title = ?8,
                days = ?9,
                alerts = ?10,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
             WHERE route_id = ?1 AND version = ?2",
            params![
                &itinerary.route_id,
                itinerary.version,
                itinerary.status.as_str(),
                &itinerary.destination,
                itinerary.duration_days as i64,
                itinerary.start_datetime.map(|dt| dt.naive_utc()),
                &itinerary.title,
                &itinerary.suggested_title,
                serde_json::to_string(&itinerary.days)?,
                serialize_alerts(itinerary)?,
            ],
        )?;
        if affected == 0 {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM itineraries WHERE route_id = ?1",
                    [&itinerary.route_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match exists {
                Some(_) => ItineraryError::Conflict,
                None => ItineraryError::NotFoundOrForbidden,
            });
        }
        self.fetch_by_id(&itinerary.route_id)?
            .ok_or(ItineraryError::NotFoundOrForbidden)
    }

    /// One conditional statement so a missing row, a foreign owner and a
    /// non-draft status are indistinguishable to the caller.
    pub fn delete_draft(&self, route_id: &str, owner_id: &str) -> ItineraryResult<bool> {
        let conn = self.open()?;
        let affected = conn.execute(
            "DELETE FROM itineraries
             WHERE route_id = ?1 AND owner_id = ?2 AND status = 'draft'",
            [route_id, owner_id],
        )?;
        Ok(affected == 1)
    }

    pub fn list_by_owner(
        &self,
        owner_id: &str,
        status: Option<ItineraryStatus>,
    ) -> ItineraryResult<Vec<Itinerary>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM itineraries
             WHERE owner_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY (updated_at IS NULL) ASC, updated_at DESC, created_at DESC",
        )?;
        let rows = stmt
            .query_map(
                (owner_id, status.as_ref().map(ItineraryStatus::as_str)),
                |row| Itinerary::from_row(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Confirmed itineraries whose start is at or before `now`, newest start
    /// first. The caller applies the duration window.
    pub fn list_started_confirmed(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> ItineraryResult<Vec<Itinerary>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM itineraries
             WHERE owner_id = ?1
               AND status = 'confirmed'
               AND start_datetime IS NOT NULL
               AND start_datetime <= ?2
             ORDER BY start_datetime DESC",
        )?;
        let rows = stmt
            .query_map(params![owner_id, now.naive_utc()], |row| {
                Itinerary::from_row(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn serialize_alerts(itinerary: &Itinerary) -> ItineraryResult<Option<String>> {
    if itinerary.alerts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(&itinerary.alerts)?))
    }
}
