use chrono::{DateTime, Utc};
use tracing::info;

use super::consolidator::{DayPlan, DayRouteConsolidator};
use super::error::{ItineraryError, ItineraryResult};
use super::models::{Day, Itinerary, ItineraryStatus, PlaceEntry, WeatherAlert};
use super::store::SqliteItineraryStore;
use super::weather::{GateDecision, WeatherGate};

/// Request for the generated (AI-ordered) or manual path; the only
/// difference is whether day plans carry the optimize flag.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub owner_id: String,
    pub destination: String,
    pub start_datetime: Option<DateTime<Utc>>,
    pub suggested_title: Option<String>,
    pub days: Vec<DayPlan>,
}

#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    /// Draft persisted, no caller interaction needed.
    Saved(Itinerary),
    /// Draft persisted with a warning alert; confirmation will require an
    /// explicit acknowledgement.
    NeedsAck(Itinerary, WeatherAlert),
    /// Severity danger: nothing was persisted. The caller returns to the
    /// input step with the alert surfaced.
    Rejected(WeatherAlert),
}

/// The aggregate's single entry point: loads, validates ownership and
/// status, delegates day-level work, and persists all-or-nothing.
pub struct ItineraryManager {
    store: SqliteItineraryStore,
    consolidator: DayRouteConsolidator,
    gate: WeatherGate,
}

impl ItineraryManager {
    pub fn new(
        store: SqliteItineraryStore,
        consolidator: DayRouteConsolidator,
        gate: WeatherGate,
    ) -> Self {
        Self {
            store,
            consolidator,
            gate,
        }
    }

    /// Generate-and-save: weather gate, day consolidation fan-out, persist
    /// as draft. Day numbers are assigned from input order.
    pub async fn generate(&self, request: GenerateRequest) -> ItineraryResult<GenerationOutcome> {
        let GenerateRequest {
            owner_id,
            destination,
            start_datetime,
            suggested_title,
            mut days,
        } = request;

        if days.is_empty() {
            return Err(ItineraryError::validation("duration must be at least one day"));
        }
        for (index, plan) in days.iter_mut().enumerate() {
            plan.day_number = index as u32 + 1;
        }

        let decision = match start_datetime {
            Some(start) => {
                let window = WeatherGate::window_for(start, days.len() as u32);
                self.gate.evaluate(&destination, window).await
            }
            None => GateDecision::Proceed { alert: None },
        };
        if let GateDecision::Reject(alert) = &decision {
            info!(
                target: "itinerary.gate",
                owner = %owner_id,
                destination = %destination,
                "generation rejected by weather gate"
            );
            return Ok(GenerationOutcome::Rejected(alert.clone()));
        }

        let consolidated = self.consolidator.consolidate(days).await?;

        let mut itinerary = Itinerary::new(owner_id, destination, consolidated);
        itinerary.start_datetime = start_datetime;
        itinerary.suggested_title = suggested_title;
        if let Some(alert) = decision.alert() {
            itinerary.alerts.push(alert.clone());
        }
        itinerary
            .validate_days()
            .map_err(ItineraryError::Validation)?;

        let saved = self.store.insert(&itinerary)?;
        info!(
            target: "itinerary.lifecycle",
            route_id = %saved.route_id,
            days = saved.duration_days,
            "itinerary draft created"
        );

        Ok(match decision {
            GateDecision::NeedsAck(alert) => GenerationOutcome::NeedsAck(saved, alert),
            _ => GenerationOutcome::Saved(saved),
        })
    }

    /// Manual path: caller-curated ordering, so the optimize flag is
    /// stripped before consolidation.
    pub async fn create(&self, mut request: GenerateRequest) -> ItineraryResult<GenerationOutcome> {
        for plan in &mut request.days {
            plan.optimize = false;
        }
        self.generate(request).await
    }

    /// Forward-only status machine. Confirmation resolves the title and
    /// re-runs the weather gate; `ack_weather` carries the caller's explicit
    /// acknowledgement of a warning-severity alert.
    pub async fn update_status(
        &self,
        route_id: &str,
        owner_id: &str,
        new_status: ItineraryStatus,
        title: Option<&str>,
        ack_weather: bool,
    ) -> ItineraryResult<Itinerary> {
        let mut itinerary = self
            .store
            .fetch_owned(route_id, owner_id)?
            .ok_or(ItineraryError::NotFoundOrForbidden)?;

        if !itinerary.status.can_transition(new_status) {
            return Err(ItineraryError::Validation(format!(
                "illegal status transition {} -> {}",
                itinerary.status, new_status
            )));
        }

        if new_status == ItineraryStatus::Confirmed {
            let resolved = itinerary
                .resolved_title(title)
                .ok_or_else(|| ItineraryError::validation("a title is required to confirm"))?;

            if let Some(start) = itinerary.start_datetime {
                let window = WeatherGate::window_for(start, itinerary.duration_days);
                match self.gate.evaluate(&itinerary.destination, window).await {
                    GateDecision::Reject(alert) => {
                        return Err(ItineraryError::WeatherBlocked(alert));
                    }
                    GateDecision::NeedsAck(alert) if !ack_weather => {
                        return Err(ItineraryError::WeatherAckRequired(alert));
                    }
                    GateDecision::NeedsAck(alert) => itinerary.alerts = vec![alert],
                    GateDecision::Proceed { alert: Some(alert) } => itinerary.alerts = vec![alert],
                    GateDecision::Proceed { alert: None } => {}
                }
            }

            itinerary.title = Some(resolved);
        } else if let Some(title) = title {
            itinerary.title = Some(title.to_string());
        }

        itinerary.status = new_status;
        let saved = self.store.update(&itinerary)?;
        info!(
            target: "itinerary.lifecycle",
            route_id = %saved.route_id,
            status = %saved.status,
            "itinerary status updated"
        );
        Ok(saved)
    }

    /// Draft-and-owner only; everything else is the same opaque failure.
    pub fn delete(&self, route_id: &str, owner_id: &str) -> ItineraryResult<bool> {
        if self.store.delete_draft(route_id, owner_id)? {
            info!(target: "itinerary.lifecycle", route_id, "draft deleted");
            Ok(true)
        } else {
            Err(ItineraryError::NotFoundOrForbidden)
        }
    }

    pub fn list(
        &self,
        owner_id: &str,
        status: Option<ItineraryStatus>,
    ) -> ItineraryResult<Vec<Itinerary>> {
        self.store.list_by_owner(owner_id, status)
    }

    pub fn get_by_id(&self, route_id: &str, owner_id: &str) -> ItineraryResult<Itinerary> {
        self.store
            .fetch_owned(route_id, owner_id)?
            .ok_or(ItineraryError::NotFoundOrForbidden)
    }

    /// The confirmed itinerary whose date range contains `now`; latest start
    /// wins when ranges overlap. No alert, no side effect when none match.
    pub fn get_active(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> ItineraryResult<Option<Itinerary>> {
        let candidates = self.store.list_started_confirmed(owner_id, now)?;
        Ok(candidates
            .into_iter()
            .find(|itinerary| itinerary.is_active_at(now)))
    }

    pub fn add_place(
        &self,
        route_id: &str,
        owner_id: &str,
        day_number: u32,
        place: PlaceEntry,
        position: Option<usize>,
    ) -> ItineraryResult<Itinerary> {
        self.mutate_day(route_id, owner_id, day_number, |day| {
            let at = position.unwrap_or(day.places.len()).min(day.places.len());
            day.places.insert(at, place);
            Ok(())
        })
    }

    /// Substitutes in place, preserving the slot (and thus `order_index`).
    pub fn replace_place(
        &self,
        route_id: &str,
        owner_id: &str,
        day_number: u32,
        old_place_ref: &str,
        new_place: PlaceEntry,
    ) -> ItineraryResult<Itinerary> {
        self.mutate_day(route_id, owner_id, day_number, |day| {
            let slot = day
                .places
                .iter()
                .position(|place| place.place_ref == old_place_ref)
                .ok_or_else(|| {
                    ItineraryError::Validation(format!(
                        "place {old_place_ref} not found in day {day_number}"
                    ))
                })?;
            day.places[slot] = new_place;
            Ok(())
        })
    }

    /// `new_order` must be a permutation of the day's existing place refs.
    pub fn reorder_places(
        &self,
        route_id: &str,
        owner_id: &str,
        day_number: u32,
        new_order: &[String],
    ) -> ItineraryResult<Itinerary> {
        self.mutate_day(route_id, owner_id, day_number, |day| {
            let mut current: Vec<&str> = day
                .places
                .iter()
                .map(|place| place.place_ref.as_str())
                .collect();
            let mut requested: Vec<&str> = new_order.iter().map(String::as_str).collect();
            current.sort_unstable();
            requested.sort_unstable();
            if current != requested {
                return Err(ItineraryError::validation(
                    "new order is not a permutation of the day's places",
                ));
            }

            let mut pool = std::mem::take(&mut day.places);
            for place_ref in new_order {
                let slot = pool
                    .iter()
                    .position(|place| &place.place_ref == place_ref)
                    .ok_or_else(|| {
                        ItineraryError::validation(
                            "new order is not a permutation of the day's places",
                        )
                    })?;
                day.places.push(pool.remove(slot));
            }
            Ok(())
        })
    }

    /// Bulk removal; emptying the day is allowed, the day itself survives.
    pub fn remove_places(
        &self,
        route_id: &str,
        owner_id: &str,
        day_number: u32,
        place_refs: &[String],
    ) -> ItineraryResult<Itinerary> {
        self.mutate_day(route_id, owner_id, day_number, |day| {
            day.places
                .retain(|place| !place_refs.contains(&place.place_ref));
            Ok(())
        })
    }

    /// Lazy re-consolidation: recomputes segments for draft days that lost
    /// them to a mutation (or to a routing failure at generation time).
    pub async fn refresh_routes(
        &self,
        route_id: &str,
        owner_id: &str,
    ) -> ItineraryResult<Itinerary> {
        let mut itinerary = self.load_draft(route_id, owner_id)?;

        let stale: Vec<DayPlan> = itinerary
            .days
            .iter()
            .filter(|day| !day.places.is_empty() && !day.has_all_segments())
            .map(|day| DayPlan {
                day_number: day.day_number,
                travel_mode: day.travel_mode,
                start_location: day.start_location.clone(),
                places: day.places.clone(),
                optimize: false,
            })
            .collect();
        if stale.is_empty() {
            return Ok(itinerary);
        }

        for rebuilt in self.consolidator.consolidate(stale).await? {
            if let Some(day) = itinerary.day_mut(rebuilt.day_number) {
                *day = rebuilt;
            }
        }
        self.store.update(&itinerary)
    }

    /// All place mutations share one path: draft-only load, day-range
    /// validation, mutation, reindex, segment invalidation, guarded write.
    fn mutate_day<F>(
        &self,
        route_id: &str,
        owner_id: &str,
        day_number: u32,
        mutate: F,
    ) -> ItineraryResult<Itinerary>
    where
        F: FnOnce(&mut Day) -> ItineraryResult<()>,
    {
        let mut itinerary = self.load_draft(route_id, owner_id)?;

        if day_number < 1 || day_number > itinerary.duration_days {
            return Err(ItineraryError::Validation(format!(
                "day {} outside [1, {}]",
                day_number, itinerary.duration_days
            )));
        }
        let day = itinerary
            .day_mut(day_number)
            .ok_or(ItineraryError::NotFoundOrForbidden)?;

        mutate(day)?;
        day.reindex();
        day.invalidate_segments();

        self.store.update(&itinerary)
    }

    /// Mutations are restricted to drafts; a confirmed or archived itinerary
    /// answers exactly like a missing one.
    fn load_draft(&self, route_id: &str, owner_id: &str) -> ItineraryResult<Itinerary> {
        let itinerary = self
            .store
            .fetch_owned(route_id, owner_id)?
            .ok_or(ItineraryError::NotFoundOrForbidden)?;
        if itinerary.status != ItineraryStatus::Draft {
            return Err(ItineraryError::NotFoundOrForbidden);
        }
        Ok(itinerary)
    }
}
