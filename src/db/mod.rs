// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer: the `RideStore` repository and its backends.
//!
//! Reads are plain async lookups. Every write goes through
//! [`RideStore::apply`] as a [`Transaction`], so a multi-record change
//! (promoting a prototrip, importing a trip with its route) lands all at
//! once or not at all.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use crate::error::{AppError, Result};
use crate::models::{
    ActivityType, BoundingBox, CollectionOwner, ConnectedApp, Location, MotionActivity,
    PredictionAggregator, Promotion, Prototrip, RatingChoice, SensorDataCollection, Trip,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Collection names as constants.
pub mod collections {
    pub const TRIPS: &str = "trips";
    /// Route chunks, keyed by `{trip}_{chunk index}`
    pub const TRIP_LOCATIONS: &str = "trip_locations";
    pub const TRIP_ACTIVITIES: &str = "trip_activities";
    pub const SENSOR_DATA: &str = "sensor_data";
    pub const PREDICTION_AGGREGATORS: &str = "prediction_aggregators";
    pub const PROTOTRIPS: &str = "prototrips";
    pub const PROMOTIONS: &str = "promotions";
    pub const CONNECTED_APPS: &str = "connected_apps";
}

/// Identifiers are unique regardless of case.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// One write inside a [`Transaction`].
#[derive(Debug, Clone)]
pub enum Change {
    PutTrip(Trip),
    /// Removes the trip with its locations, activities, sensor data and aggregators.
    DeleteTrip(String),
    /// Replaces the trip's route.
    SetTripLocations {
        trip_uuid: String,
        locations: Vec<Location>,
    },
    AddActivity {
        trip_uuid: String,
        activity: MotionActivity,
    },
    PutSensorData(SensorDataCollection),
    DeleteSensorData(String),
    AddAggregator {
        trip_uuid: String,
        aggregator: PredictionAggregator,
    },
    PutPrototrip(Prototrip),
    /// Removes the prototrip and the sensor data it still owns.
    DeletePrototrip(String),
    PutPromotion(Promotion),
    DeletePromotion(String),
    PutConnectedApp(ConnectedApp),
    DeleteConnectedApp(String),
    /// Fails the transaction with [`AppError::Conflict`] unless the stored
    /// trip equals `expected` (`None` meaning absent) when it commits.
    /// Checked against the state before any change in the transaction.
    ExpectTrip {
        uuid: String,
        expected: Option<Box<Trip>>,
    },
}

/// A parent record that a child change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentRef<'a> {
    Trip(&'a str),
    Prototrip(&'a str),
}

impl ParentRef<'_> {
    fn key(&self) -> (bool, String) {
        match self {
            ParentRef::Trip(id) => (true, normalize_id(id)),
            ParentRef::Prototrip(id) => (false, normalize_id(id)),
        }
    }
}

/// An ordered list of changes applied atomically.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    changes: Vec<Change>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }

    pub fn with(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Stored-trip preconditions, in order.
    pub fn expectations(&self) -> impl Iterator<Item = (&str, Option<&Trip>)> {
        self.changes.iter().filter_map(|change| match change {
            Change::ExpectTrip { uuid, expected } => Some((uuid.as_str(), expected.as_deref())),
            _ => None,
        })
    }

    /// Parents referenced by child changes, in order of first reference.
    pub fn parent_refs(&self) -> Vec<ParentRef<'_>> {
        let mut refs = Vec::new();
        for change in &self.changes {
            let parent = match change {
                Change::SetTripLocations { trip_uuid, .. }
                | Change::AddActivity { trip_uuid, .. }
                | Change::AddAggregator { trip_uuid, .. } => ParentRef::Trip(trip_uuid),
                Change::PutSensorData(collection) => owner_ref(&collection.owner),
                _ => continue,
            };
            if !refs.contains(&parent) {
                refs.push(parent);
            }
        }
        refs
    }

    /// Check the whole transaction before anything is written.
    ///
    /// Changes are replayed in order: a child may refer to a parent created
    /// earlier in the same transaction, and a parent deleted earlier in it no
    /// longer counts. `parent_exists` answers for parents the transaction has
    /// not touched yet.
    pub fn validate<F>(&self, mut parent_exists: F) -> Result<()>
    where
        F: FnMut(ParentRef<'_>) -> bool,
    {
        let mut staged: HashMap<(bool, String), bool> = HashMap::new();

        for change in &self.changes {
            match change {
                Change::PutTrip(trip) => {
                    require_id("trip uuid", &trip.uuid)?;
                    staged.insert(ParentRef::Trip(&trip.uuid).key(), true);
                }
                Change::DeleteTrip(uuid) => {
                    staged.insert(ParentRef::Trip(uuid).key(), false);
                }
                Change::PutPrototrip(prototrip) => {
                    require_id("prototrip id", &prototrip.id)?;
                    staged.insert(ParentRef::Prototrip(&prototrip.id).key(), true);
                }
                Change::DeletePrototrip(id) => {
                    staged.insert(ParentRef::Prototrip(id).key(), false);
                }
                Change::PutPromotion(promotion) => require_id("promotion uuid", &promotion.uuid)?,
                Change::PutConnectedApp(app) => require_id("connected app uuid", &app.uuid)?,
                Change::PutSensorData(collection) => {
                    require_id("sensor data id", &collection.id)?;
                    check_parent(owner_ref(&collection.owner), &staged, &mut parent_exists)?;
                }
                Change::SetTripLocations { trip_uuid, .. }
                | Change::AddActivity { trip_uuid, .. }
                | Change::AddAggregator { trip_uuid, .. } => {
                    check_parent(ParentRef::Trip(trip_uuid), &staged, &mut parent_exists)?;
                }
                Change::DeleteSensorData(_)
                | Change::DeletePromotion(_)
                | Change::DeleteConnectedApp(_)
                | Change::ExpectTrip { .. } => {}
            }
        }
        Ok(())
    }
}

fn owner_ref(owner: &CollectionOwner) -> ParentRef<'_> {
    match owner {
        CollectionOwner::Trip(id) => ParentRef::Trip(id),
        CollectionOwner::Prototrip(id) => ParentRef::Prototrip(id),
    }
}

/// Compare a stored trip against an [`Change::ExpectTrip`] precondition.
pub fn check_expected_trip(uuid: &str, expected: Option<&Trip>, stored: Option<&Trip>) -> Result<()> {
    if expected == stored {
        return Ok(());
    }
    Err(AppError::Conflict(format!("Trip {uuid} changed concurrently")))
}

fn require_id(what: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{what} must not be empty")));
    }
    Ok(())
}

fn check_parent<F>(
    parent: ParentRef<'_>,
    staged: &HashMap<(bool, String), bool>,
    parent_exists: &mut F,
) -> Result<()>
where
    F: FnMut(ParentRef<'_>) -> bool,
{
    let alive = match staged.get(&parent.key()) {
        Some(alive) => *alive,
        None => parent_exists(parent),
    };
    if alive {
        return Ok(());
    }
    Err(match parent {
        ParentRef::Trip(id) => AppError::NotFound(format!("Trip {id}")),
        ParentRef::Prototrip(id) => AppError::NotFound(format!("Prototrip {id}")),
    })
}

/// Position in the trip ordering, used to resume a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripCursor {
    pub start_date: DateTime<Utc>,
    pub uuid: String,
}

impl TripCursor {
    pub fn after(trip: &Trip) -> Self {
        Self {
            start_date: trip.start_date,
            uuid: trip.uuid.clone(),
        }
    }
}

/// Filtered, ordered trip listing.
///
/// Trips are ordered newest first (ties broken by uuid, descending), or
/// oldest first when `oldest_first` is set.
#[derive(Debug, Clone, Default)]
pub struct TripQuery {
    pub activity_type: Option<ActivityType>,
    pub rating: Option<RatingChoice>,
    /// Exclusive lower bound on the start date
    pub started_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the start date
    pub started_before: Option<DateTime<Utc>>,
    /// Only trips strictly after this position in the ordering
    pub cursor: Option<TripCursor>,
    pub oldest_first: bool,
    pub limit: Option<usize>,
}

impl TripQuery {
    pub fn bike_trips() -> Self {
        Self::default().activity_type(ActivityType::Cycling)
    }

    pub fn activity_type(mut self, activity_type: ActivityType) -> Self {
        self.activity_type = Some(activity_type);
        self
    }

    pub fn rating(mut self, rating: RatingChoice) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn started_after(mut self, date: DateTime<Utc>) -> Self {
        self.started_after = Some(date);
        self
    }

    pub fn started_before(mut self, date: DateTime<Utc>) -> Self {
        self.started_before = Some(date);
        self
    }

    pub fn cursor(mut self, cursor: TripCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.oldest_first = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Ordering of two trips under this query.
    pub fn compare(&self, a: &Trip, b: &Trip) -> Ordering {
        let ascending = a
            .start_date
            .cmp(&b.start_date)
            .then_with(|| normalize_id(&a.uuid).cmp(&normalize_id(&b.uuid)));
        if self.oldest_first {
            ascending
        } else {
            ascending.reverse()
        }
    }

    pub fn matches(&self, trip: &Trip) -> bool {
        if self.activity_type.is_some_and(|t| t != trip.activity_type) {
            return false;
        }
        if self.rating.is_some_and(|r| r != trip.rating.choice) {
            return false;
        }
        if self.started_after.is_some_and(|after| trip.start_date <= after) {
            return false;
        }
        if self.started_before.is_some_and(|before| trip.start_date >= before) {
            return false;
        }
        match &self.cursor {
            Some(cursor) => {
                let position = Trip::new(cursor.uuid.clone(), cursor.start_date);
                self.compare(trip, &position) == Ordering::Greater
            }
            None => true,
        }
    }

    /// Filter, sort and truncate candidate trips.
    pub fn select(&self, candidates: impl IntoIterator<Item = Trip>) -> Vec<Trip> {
        let mut trips: Vec<Trip> = candidates.into_iter().filter(|t| self.matches(t)).collect();
        trips.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            trips.truncate(limit);
        }
        trips
    }
}

/// Repository over all persisted Ride Report records.
#[async_trait]
pub trait RideStore: Send + Sync {
    // ─── Reads ───────────────────────────────────────────────────

    /// Trip by uuid, ignoring case.
    async fn get_trip(&self, uuid: &str) -> Result<Option<Trip>>;

    async fn query_trips(&self, query: &TripQuery) -> Result<Vec<Trip>>;

    /// Trips for the given uuids, newest first. Unknown uuids are skipped.
    async fn trips_with_uuids(&self, uuids: &[String]) -> Result<Vec<Trip>> {
        let mut trips = Vec::with_capacity(uuids.len());
        for uuid in uuids {
            if let Some(trip) = self.get_trip(uuid).await? {
                if !trips.iter().any(|t: &Trip| normalize_id(&t.uuid) == normalize_id(&trip.uuid)) {
                    trips.push(trip);
                }
            }
        }
        let order = TripQuery::default();
        trips.sort_by(|a, b| order.compare(a, b));
        Ok(trips)
    }

    /// The trip's route, oldest fix first.
    async fn locations_for_trip(&self, uuid: &str) -> Result<Vec<Location>>;

    /// Trip locations inside `bounds`, across all trips.
    async fn locations_in_bounds(&self, bounds: &BoundingBox) -> Result<Vec<Location>>;

    async fn activities_for_trip(&self, uuid: &str) -> Result<Vec<MotionActivity>>;

    async fn sensor_data_for(&self, owner: &CollectionOwner) -> Result<Vec<SensorDataCollection>>;

    async fn aggregators_for_trip(&self, uuid: &str) -> Result<Vec<PredictionAggregator>>;

    async fn get_prototrip(&self, id: &str) -> Result<Option<Prototrip>>;

    /// Promotion by uuid, ignoring case.
    async fn get_promotion(&self, uuid: &str) -> Result<Option<Promotion>>;

    async fn all_promotions(&self) -> Result<Vec<Promotion>>;

    /// Connected app by uuid, ignoring case.
    async fn get_connected_app(&self, uuid: &str) -> Result<Option<ConnectedApp>>;

    async fn all_connected_apps(&self) -> Result<Vec<ConnectedApp>>;

    // ─── Writes ──────────────────────────────────────────────────

    /// Validate and apply every change, or none of them.
    async fn apply(&self, transaction: Transaction) -> Result<()>;

    async fn put_trip(&self, trip: Trip) -> Result<()> {
        self.apply(Transaction::new().with(Change::PutTrip(trip))).await
    }

    async fn delete_trip(&self, uuid: &str) -> Result<()> {
        self.apply(Transaction::new().with(Change::DeleteTrip(uuid.to_string())))
            .await
    }

    async fn put_prototrip(&self, prototrip: Prototrip) -> Result<()> {
        self.apply(Transaction::new().with(Change::PutPrototrip(prototrip)))
            .await
    }

    async fn put_sensor_data(&self, collection: SensorDataCollection) -> Result<()> {
        self.apply(Transaction::new().with(Change::PutSensorData(collection)))
            .await
    }

    async fn put_promotion(&self, promotion: Promotion) -> Result<()> {
        self.apply(Transaction::new().with(Change::PutPromotion(promotion)))
            .await
    }

    async fn delete_promotion(&self, uuid: &str) -> Result<()> {
        self.apply(Transaction::new().with(Change::DeletePromotion(uuid.to_string())))
            .await
    }

    async fn put_connected_app(&self, app: ConnectedApp) -> Result<()> {
        self.apply(Transaction::new().with(Change::PutConnectedApp(app)))
            .await
    }
}
