use chrono::{Duration, Utc};
use wayplan_core::{
    Day, Itinerary, ItineraryError, ItineraryStatus, PlaceEntry, SqliteItineraryStore,
    StartLocation, TravelMode,
};

fn setup_store() -> SqliteItineraryStore {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("itineraries.sqlite");
    // Preserve the directory for the duration of the test run.
    #[allow(deprecated)]
    let _persist = dir.into_path();
    let store = SqliteItineraryStore::builder()
        .path(&path)
        .create_if_missing(true)
        .build()
        .unwrap();
    store.initialize().unwrap();
    store
}

fn sample_day(number: u32, places: &[&str]) -> Day {
    Day {
        day_number: number,
        travel_mode: TravelMode::Walking,
        start_location: StartLocation::named("Hotel Riverside"),
        places: places
            .iter()
            .enumerate()
            .map(|(index, place_ref)| {
                let mut place = PlaceEntry::new(*place_ref, *place_ref);
                place.order_index = index as u32;
                place
            })
            .collect(),
    }
}

fn sample_itinerary(owner: &str) -> Itinerary {
    let mut itinerary = Itinerary::new(
        owner,
        "Đà Nẵng",
        vec![
            sample_day(1, &["p1", "p2"]),
            sample_day(2, &["p3"]),
            sample_day(3, &[]),
        ],
    );
    itinerary.suggested_title = Some("Đà Nẵng getaway".to_string());
    itinerary
}

#[test]
fn insert_and_fetch_round_trip() {
    let store = setup_store();
    let itinerary = sample_itinerary("u1");

    let saved = store.insert(&itinerary).unwrap();
    assert!(saved.route_id.starts_with("it-"));
    assert!(saved.created_at.is_some());
    assert_eq!(saved.status, ItineraryStatus::Draft);
    assert_eq!(saved.duration_days, 3);
    assert_eq!(saved.days, itinerary.days);

    let fetched = store.fetch_owned(&saved.route_id, "u1").unwrap().unwrap();
    assert_eq!(fetched, saved);
    assert!(store.fetch_owned(&saved.route_id, "u2").unwrap().is_none());
}

#[test]
fn list_filters_by_owner_and_status() {
    let store = setup_store();
    let draft = store.insert(&sample_itinerary("u1")).unwrap();

    let mut confirmed = sample_itinerary("u1");
    confirmed.title = Some("Confirmed trip".to_string());
    let confirmed = store.insert(&confirmed).unwrap();
    let mut confirmed = confirmed.clone();
    confirmed.status = ItineraryStatus::Confirmed;
    store.update(&confirmed).unwrap();

    store.insert(&sample_itinerary("u2")).unwrap();

    let all = store.list_by_owner("u1", None).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|itinerary| itinerary.owner_id == "u1"));

    let drafts = store
        .list_by_owner("u1", Some(ItineraryStatus::Draft))
        .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].route_id, draft.route_id);

    let archived = store
        .list_by_owner("u1", Some(ItineraryStatus::Archived))
        .unwrap();
    assert!(archived.is_empty());
}

#[test]
fn delete_draft_only_succeeds_for_owner_and_status() {
    let store = setup_store();
    let draft = store.insert(&sample_itinerary("u1")).unwrap();

    // Wrong owner leaves the row untouched.
    assert!(!store.delete_draft(&draft.route_id, "intruder").unwrap());
    let untouched = store.fetch_by_id(&draft.route_id).unwrap().unwrap();
    assert_eq!(untouched, draft);

    // Missing rows answer identically.
    assert!(!store.delete_draft("it-missing", "u1").unwrap());

    // Confirmed itineraries are not deletable.
    let mut confirmed = draft.clone();
    confirmed.status = ItineraryStatus::Confirmed;
    confirmed.title = Some("Trip".to_string());
    let confirmed = store.update(&confirmed).unwrap();
    assert!(!store.delete_draft(&confirmed.route_id, "u1").unwrap());
    assert!(store.fetch_by_id(&confirmed.route_id).unwrap().is_some());

    let fresh = store.insert(&sample_itinerary("u1")).unwrap();
    assert!(store.delete_draft(&fresh.route_id, "u1").unwrap());
    assert!(store.fetch_by_id(&fresh.route_id).unwrap().is_none());
}

#[test]
fn stale_version_write_is_a_conflict() {
    let store = setup_store();
    let saved = store.insert(&sample_itinerary("u1")).unwrap();

    let mut first = saved.clone();
    let mut second = saved;

    first.title = Some("First writer".to_string());
    let updated = store.update(&first).unwrap();
    assert_eq!(updated.version, first.version + 1);

    second.title = Some("Second writer".to_string());
    match store.update(&second) {
        Err(ItineraryError::Conflict) => {}
        other => panic!("expected conflict, got {other:?}"),
    }

    // Losing writer changed nothing.
    let current = store.fetch_by_id(&updated.route_id).unwrap().unwrap();
    assert_eq!(current.title.as_deref(), Some("First writer"));
}

#[test]
fn update_of_missing_row_is_not_found() {
    let store = setup_store();
    let ghost = sample_itinerary("u1");
    match store.update(&ghost) {
        Err(ItineraryError::NotFoundOrForbidden) => {}
        other => panic!("expected not-found, got {other:?}"),
    }
}

#[test]
fn alerts_and_start_round_trip_through_columns() {
    let store = setup_store();
    let mut itinerary = sample_itinerary("u1");
    itinerary.start_datetime = Some(Utc::now() + Duration::days(7));
    itinerary.alerts.push(wayplan_core::WeatherAlert {
        severity: wayplan_core::Severity::Warning,
        title: "Heavy rain".to_string(),
        message: "Monsoon front over the coast".to_string(),
        from: None,
        to: None,
        tags: vec!["rain".to_string()],
    });

    let saved = store.insert(&itinerary).unwrap();
    assert_eq!(saved.alerts, itinerary.alerts);
    // Sub-second precision is not preserved by the timestamp column.
    let saved_start = saved.start_datetime.unwrap();
    let original_start = itinerary.start_datetime.unwrap();
    assert!((saved_start - original_start).num_seconds().abs() <= 1);
}
