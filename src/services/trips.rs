// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trip lifecycle and queries over a `RideStore`.
//!
//! Handles:
//! - Listing and lookup (bike trips, the current week, today)
//! - Importing server payloads and summaries
//! - Promoting prototrips into trips
//! - Finalizing a trip from its route and classifier output
//! - Promotion banners and connected apps
//!
//! Edits to a stored trip commit with a [`Change::ExpectTrip`] on the copy
//! they started from. A concurrent edit makes the commit fail with
//! [`AppError::Conflict`], and the edit is replayed on a fresh read.

use crate::db::{normalize_id, Change, RideStore, Transaction, TripQuery};
use crate::error::{AppError, Result};
use crate::models::{
    location::locations_in_circle, ActivityType, BoundingBox, CollectionOwner, ConnectedApp,
    Coordinate, Location, MotionActivity, PredictionAggregator, Promotion, Rating, RatingChoice,
    RatingVersion, RideStats, SensorDataCollection, Trip,
};
use crate::services::weather::WeatherCondition;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

const WEEK_DAYS: i64 = 7;
const MAX_WRITE_ATTEMPTS: usize = 8;

#[derive(Clone)]
pub struct TripService {
    store: Arc<dyn RideStore>,
    rating_version: RatingVersion,
}

impl TripService {
    pub fn new(store: Arc<dyn RideStore>, rating_version: RatingVersion) -> Self {
        Self {
            store,
            rating_version,
        }
    }

    pub fn store(&self) -> &Arc<dyn RideStore> {
        &self.store
    }

    // ─── Queries ─────────────────────────────────────────────────

    /// Bike trips, newest first.
    pub async fn all_bike_trips(&self, limit: Option<usize>) -> Result<Vec<Trip>> {
        let mut query = TripQuery::bike_trips();
        if let Some(limit) = limit.filter(|&l| l > 0) {
            query = query.limit(limit);
        }
        self.store.query_trips(&query).await
    }

    pub async fn all_trips(&self) -> Result<Vec<Trip>> {
        self.store.query_trips(&TripQuery::default()).await
    }

    pub async fn trips_with_uuids(&self, uuids: &[String]) -> Result<Vec<Trip>> {
        self.store.trips_with_uuids(uuids).await
    }

    /// Trips that started in the seven days before `now`.
    pub async fn week_trips(&self, now: DateTime<Utc>) -> Result<Vec<Trip>> {
        let query = TripQuery::default().started_after(now - Duration::days(WEEK_DAYS));
        self.store.query_trips(&query).await
    }

    pub async fn trip_with_uuid(&self, uuid: &str) -> Result<Option<Trip>> {
        self.store.get_trip(uuid).await
    }

    async fn require_trip(&self, uuid: &str) -> Result<Trip> {
        self.store
            .get_trip(uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip {uuid}")))
    }

    /// Bike trips that started after local midnight of `now`'s day.
    pub async fn bike_trips_today<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<Vec<Trip>> {
        let query = TripQuery::bike_trips().started_after(beginning_of_day(now));
        self.store.query_trips(&query).await
    }

    /// True when `trip` is the only bike trip so far today.
    pub async fn is_first_bike_trip_today<Tz: TimeZone>(
        &self,
        trip: &Trip,
        now: &DateTime<Tz>,
    ) -> Result<bool> {
        let today = self.bike_trips_today(now).await?;
        let key = normalize_id(&trip.uuid);
        Ok(today.len() == 1 && normalize_id(&today[0].uuid) == key)
    }

    pub async fn least_recent_bike_trip(&self) -> Result<Option<Trip>> {
        let query = TripQuery::bike_trips().oldest_first().limit(1);
        Ok(self.store.query_trips(&query).await?.into_iter().next())
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<RideStats> {
        let trips = self.all_trips().await?;
        Ok(RideStats::from_trips(&trips, now))
    }

    /// Route locations within `radius` meters of `center`.
    pub async fn locations_near(&self, center: Coordinate, radius: f64) -> Result<Vec<Location>> {
        let bounds = BoundingBox::around(center, radius);
        let candidates = self.store.locations_in_bounds(&bounds).await?;
        Ok(locations_in_circle(&candidates, center, radius))
    }

    // ─── Writes ──────────────────────────────────────────────────

    /// Save `trip`; a synced trip that changed becomes unsynced.
    ///
    /// The comparison and the write commit together, so a concurrent
    /// change to the stored trip is compared against again.
    pub async fn save_and_mark_dirty(&self, trip: Trip) -> Result<Trip> {
        let mut attempt = 1;
        loop {
            let stored = self.store.get_trip(&trip.uuid).await?;
            let mut saved = trip.clone();
            mark_dirty(&mut saved, stored.as_ref());
            let transaction = Transaction::new()
                .with(Change::ExpectTrip {
                    uuid: trip.uuid.clone(),
                    expected: stored.map(Box::new),
                })
                .with(Change::PutTrip(saved.clone()));
            match self.store.apply(transaction).await {
                Ok(()) => return Ok(saved),
                Err(AppError::Conflict(reason)) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(trip = %trip.uuid, attempt, %reason, "Retrying trip save");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read-modify-write of one stored trip.
    ///
    /// `edit` runs on a fresh copy for every attempt and returns changes to
    /// commit along with the edited trip.
    async fn update_trip<F>(&self, uuid: &str, dirty: bool, mut edit: F) -> Result<Trip>
    where
        F: FnMut(&mut Trip) -> Result<Vec<Change>> + Send,
    {
        let mut attempt = 1;
        loop {
            let stored = self.require_trip(uuid).await?;
            let mut trip = stored.clone();
            let changes = edit(&mut trip)?;
            if dirty {
                mark_dirty(&mut trip, Some(&stored));
            }

            let mut transaction = Transaction::new().with(Change::ExpectTrip {
                uuid: stored.uuid.clone(),
                expected: Some(Box::new(stored)),
            });
            for change in changes {
                transaction.push(change);
            }
            transaction.push(Change::PutTrip(trip.clone()));

            match self.store.apply(transaction).await {
                Ok(()) => return Ok(trip),
                Err(AppError::Conflict(reason)) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(trip = uuid, attempt, %reason, "Retrying trip update");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create or replace a trip from a server payload, with its route.
    pub async fn import_trip_json(&self, value: &Value) -> Result<Trip> {
        let mut trip = match value
            .get("uuid")
            .and_then(Value::as_str)
            .filter(|uuid| !uuid.trim().is_empty())
        {
            Some(uuid) => match self.store.get_trip(uuid).await? {
                Some(mut existing) => {
                    existing.load_from_json(value)?;
                    existing
                }
                None => Trip::from_json(value)?,
            },
            None => Trip::from_json(value)?,
        };

        let locations = match value.get("locations") {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(Location::from_json)
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(AppError::BadRequest("locations must be an array".into())),
            None => None,
        };

        trip.is_synced = true;
        let mut transaction = Transaction::new();
        if let Some(locations) = locations {
            trip.are_locations_synced = true;
            trip.are_locations_not_yet_downloaded = false;
            transaction.push(Change::PutTrip(trip.clone()));
            transaction.push(Change::SetTripLocations {
                trip_uuid: trip.uuid.clone(),
                locations,
            });
        } else {
            transaction.push(Change::PutTrip(trip.clone()));
        }
        self.store.apply(transaction).await?;

        tracing::info!(trip = %trip.uuid, activity = ?trip.activity_type, "Imported trip");
        Ok(trip)
    }

    /// Apply a server summary to a stored trip.
    pub async fn apply_summary(&self, uuid: &str, summary: &Value) -> Result<Trip> {
        if !summary.is_object() {
            return Err(AppError::BadRequest("summary must be an object".into()));
        }
        self.update_trip(uuid, false, |trip| {
            trip.load_summary_from_json(summary);
            Ok(Vec::new())
        })
        .await
    }

    /// Apply a summary delivered by push notification.
    pub async fn apply_push_summary(&self, uuid: &str, summary: &Value) -> Result<Trip> {
        self.update_trip(uuid, false, |trip| {
            trip.load_summary_from_push(summary);
            Ok(Vec::new())
        })
        .await
    }

    /// Rate a trip under the profile's rating version.
    pub async fn set_rating(&self, uuid: &str, choice: RatingChoice) -> Result<Trip> {
        let rating = Rating::new(choice, self.rating_version);
        self.update_trip(uuid, true, |trip| {
            trip.rating = rating;
            Ok(Vec::new())
        })
        .await
    }

    pub async fn delete_trip(&self, uuid: &str) -> Result<()> {
        self.require_trip(uuid).await?;
        self.store.delete_trip(uuid).await?;
        tracing::info!(trip = uuid, "Deleted trip");
        Ok(())
    }

    /// Attach a motion activity; the trip needs syncing again.
    pub async fn record_activity(&self, uuid: &str, activity: MotionActivity) -> Result<()> {
        self.update_trip(uuid, false, |trip| {
            trip.is_synced = false;
            Ok(vec![Change::AddActivity {
                trip_uuid: trip.uuid.clone(),
                activity: activity.clone(),
            }])
        })
        .await
        .map(|_| ())
    }

    /// Store a sensor data collection under a trip.
    pub async fn add_sensor_data(
        &self,
        uuid: &str,
        mut collection: SensorDataCollection,
    ) -> Result<SensorDataCollection> {
        let trip = self.require_trip(uuid).await?;
        collection.owner = CollectionOwner::Trip(trip.uuid);
        self.store.put_sensor_data(collection.clone()).await?;
        Ok(collection)
    }

    pub async fn add_prediction_aggregator(
        &self,
        uuid: &str,
        mut aggregator: PredictionAggregator,
    ) -> Result<()> {
        let trip = self.require_trip(uuid).await?;
        aggregator.route_uuid = Some(trip.uuid.clone());
        self.store
            .apply(Transaction::new().with(Change::AddAggregator {
                trip_uuid: trip.uuid,
                aggregator,
            }))
            .await
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Turn a prototrip into a trip. Locations, activities and sensor data
    /// move over and the prototrip is deleted, all in one transaction.
    pub async fn promote_prototrip(&self, id: &str) -> Result<Trip> {
        let prototrip = self
            .store
            .get_prototrip(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prototrip {id}")))?;
        let start = prototrip.first_non_geofenced_location().ok_or_else(|| {
            AppError::BadRequest(format!("Prototrip {id} has no usable locations"))
        })?;

        let mut trip = Trip::new(uuid::Uuid::new_v4().to_string(), start.date);
        trip.end_date = prototrip
            .locations
            .iter()
            .map(|loc| loc.date)
            .max()
            .unwrap_or(start.date);
        trip.length = Trip::length_from_locations(&sorted_by_date(&prototrip.locations));

        let collections = self
            .store
            .sensor_data_for(&CollectionOwner::Prototrip(prototrip.id.clone()))
            .await?;

        let mut transaction = Transaction::new()
            .with(Change::PutTrip(trip.clone()))
            .with(Change::SetTripLocations {
                trip_uuid: trip.uuid.clone(),
                locations: prototrip.locations.clone(),
            });
        for activity in &prototrip.activities {
            transaction.push(Change::AddActivity {
                trip_uuid: trip.uuid.clone(),
                activity: activity.clone(),
            });
        }
        let moved = collections.len();
        for mut collection in collections {
            collection.owner = CollectionOwner::Trip(trip.uuid.clone());
            transaction.push(Change::PutSensorData(collection));
        }
        transaction.push(Change::DeletePrototrip(prototrip.id.clone()));
        self.store.apply(transaction).await?;

        tracing::info!(
            prototrip = %prototrip.id,
            trip = %trip.uuid,
            locations = prototrip.locations.len(),
            sensor_collections = moved,
            "Promoted prototrip"
        );
        Ok(trip)
    }

    /// Close out a trip once recording stops.
    ///
    /// Length and dates come from the route. An unclassified trip takes the
    /// aggregate of its complete prediction aggregators.
    pub async fn finalize_trip(
        &self,
        uuid: &str,
        weather: Option<&WeatherCondition>,
    ) -> Result<Trip> {
        self.require_trip(uuid).await?;
        let locations = self.store.locations_for_trip(uuid).await?;
        let aggregators = self.store.aggregators_for_trip(uuid).await?;
        let classified = aggregate_activity_type(&aggregators);

        let trip = self
            .update_trip(uuid, true, |trip| {
                if let (Some(first), Some(last)) = (locations.first(), locations.last()) {
                    trip.length = Trip::length_from_locations(&locations);
                    trip.start_date = first.date;
                    trip.end_date = last.date;
                }
                if trip.activity_type == ActivityType::Unknown {
                    if let Some(activity_type) = classified {
                        trip.activity_type = activity_type;
                    }
                }
                if let Some(condition) = weather {
                    trip.climacon = Some(condition.climacon().to_string());
                    trip.temperature = Some(condition.temperature_f);
                }
                Ok(Vec::new())
            })
            .await?;
        tracing::info!(
            trip = %trip.uuid,
            length = trip.length,
            activity = ?trip.activity_type,
            "Finalized trip"
        );
        Ok(trip)
    }

    // ─── Promotions ──────────────────────────────────────────────

    /// Create or update one promotion from its JSON payload.
    pub async fn upsert_promotion(&self, uuid: &str, value: &Value) -> Result<Promotion> {
        let mut promotion = self
            .store
            .get_promotion(uuid)
            .await?
            .unwrap_or_else(|| Promotion::new(uuid));
        promotion.update_with_json(value);
        self.store.put_promotion(promotion.clone()).await?;
        Ok(promotion)
    }

    /// Replace the promotion set with the server's list. Listed promotions
    /// are created or updated; the rest are removed.
    ///
    /// Two overlapping syncs resolve last writer wins: the server list is
    /// authoritative and the next sync converges.
    pub async fn sync_promotions(&self, values: &[Value]) -> Result<Vec<Promotion>> {
        let mut transaction = Transaction::new();
        let mut synced = Vec::with_capacity(values.len());
        let mut kept = HashSet::new();

        for value in values {
            let uuid = Promotion::uuid_from_json(value)?;
            let mut promotion = self
                .store
                .get_promotion(uuid)
                .await?
                .unwrap_or_else(|| Promotion::new(uuid));
            promotion.update_with_json(value);
            kept.insert(normalize_id(uuid));
            transaction.push(Change::PutPromotion(promotion.clone()));
            synced.push(promotion);
        }

        for stale in self.store.all_promotions().await? {
            if !kept.contains(&normalize_id(&stale.uuid)) {
                transaction.push(Change::DeletePromotion(stale.uuid));
            }
        }

        self.store.apply(transaction).await?;
        tracing::info!(count = synced.len(), "Synced promotions");
        Ok(synced)
    }

    pub async fn active_promotions(&self, now: DateTime<Utc>) -> Result<Vec<Promotion>> {
        Ok(self
            .store
            .all_promotions()
            .await?
            .into_iter()
            .filter(|p| p.is_active(now))
            .collect())
    }

    /// The promotion to show: the first one in its date window, unless the
    /// rider dismissed it or already connected the app it advertises.
    pub async fn eligible_promotion(&self, now: DateTime<Utc>) -> Result<Option<Promotion>> {
        let first = self.store.all_promotions().await?.into_iter().find(|p| {
            p.start_date.map_or(true, |start| start <= now)
                && p.end_date.map_or(true, |end| now <= end)
        });
        let Some(promotion) = first.filter(|p| !p.is_user_dismissed) else {
            return Ok(None);
        };
        if let Some(app_uuid) = &promotion.connected_app_uuid {
            let connected = self
                .store
                .get_connected_app(app_uuid)
                .await?
                .is_some_and(|app| app.is_connected);
            if connected {
                return Ok(None);
            }
        }
        Ok(Some(promotion))
    }

    pub async fn dismiss_promotion(&self, uuid: &str) -> Result<Promotion> {
        let mut promotion = self
            .store
            .get_promotion(uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Promotion {uuid}")))?;
        promotion.is_user_dismissed = true;
        self.store.put_promotion(promotion.clone()).await?;
        Ok(promotion)
    }

    // ─── Connected apps ──────────────────────────────────────────

    pub async fn connected_apps(&self) -> Result<Vec<ConnectedApp>> {
        self.store.all_connected_apps().await
    }

    /// Take the server's list of apps linked to the profile. Listed apps
    /// are created or updated and marked connected; stored apps missing
    /// from the list stay known but are no longer connected.
    pub async fn sync_connected_apps(&self, values: &[Value]) -> Result<Vec<ConnectedApp>> {
        let mut transaction = Transaction::new();
        let mut synced = Vec::with_capacity(values.len());
        let mut listed = HashSet::new();

        for value in values {
            let uuid = ConnectedApp::uuid_from_json(value)?;
            let mut app = self
                .store
                .get_connected_app(uuid)
                .await?
                .unwrap_or_else(|| ConnectedApp::new(uuid));
            app.update_with_json(value);
            app.is_connected = true;
            listed.insert(normalize_id(uuid));
            transaction.push(Change::PutConnectedApp(app.clone()));
            synced.push(app);
        }

        for mut app in self.store.all_connected_apps().await? {
            if app.is_connected && !listed.contains(&normalize_id(&app.uuid)) {
                app.is_connected = false;
                transaction.push(Change::PutConnectedApp(app));
            }
        }

        self.store.apply(transaction).await?;
        tracing::info!(count = synced.len(), "Synced connected apps");
        Ok(synced)
    }
}

/// A synced trip that differs from `stored` becomes unsynced.
fn mark_dirty(trip: &mut Trip, stored: Option<&Trip>) {
    let changed = match stored {
        Some(stored) => {
            let mut stored = stored.clone();
            stored.is_synced = trip.is_synced;
            stored != *trip
        }
        None => true,
    };
    if changed && trip.is_synced {
        trip.is_synced = false;
        tracing::debug!(trip = %trip.uuid, "Trip marked dirty");
    }
}

/// Start of `now`'s calendar day in its own time zone.
fn beginning_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
        // Midnight can fall in a DST gap; count back from now instead.
        .unwrap_or_else(|| {
            now.with_timezone(&Utc) - Duration::seconds(i64::from(now.num_seconds_from_midnight()))
        })
}

fn sorted_by_date(locations: &[Location]) -> Vec<Location> {
    let mut sorted = locations.to_vec();
    sorted.sort_by_key(|loc| loc.date);
    sorted
}

/// Classification pooled across every complete aggregator.
fn aggregate_activity_type(aggregators: &[PredictionAggregator]) -> Option<ActivityType> {
    let mut pooled = PredictionAggregator::new(None);
    for aggregator in aggregators {
        let mut aggregator = aggregator.clone();
        aggregator.update_aggregate_predicted_activity();
        if aggregator.is_complete() {
            pooled.predictions.extend(aggregator.predictions);
        }
    }
    if pooled.predictions.is_empty() {
        return None;
    }
    pooled.update_aggregate_predicted_activity();
    pooled
        .aggregate_predicted_activity
        .map(|a| a.activity_type)
        .filter(|&t| t != ActivityType::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{LocationSource, Prediction, Prototrip};
    use chrono::FixedOffset;
    use std::collections::BTreeMap;

    fn service() -> TripService {
        TripService::new(Arc::new(MemoryStore::new()), RatingVersion::V1)
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 5, 10, hour, minute, 0).unwrap()
    }

    fn location(date: DateTime<Utc>, latitude: f64, source: LocationSource) -> Location {
        Location {
            date,
            latitude,
            longitude: -122.68,
            altitude: 0.0,
            course: 0.0,
            speed: 5.0,
            horizontal_accuracy: 5.0,
            vertical_accuracy: 3.0,
            source,
        }
    }

    fn bike_trip(uuid: &str, start: DateTime<Utc>) -> Trip {
        let mut trip = Trip::new(uuid, start);
        trip.activity_type = ActivityType::Cycling;
        trip
    }

    fn complete_aggregator(activity_type: ActivityType) -> PredictionAggregator {
        let mut aggregator = PredictionAggregator::new(None);
        for i in 0..PredictionAggregator::MAXIMUM_SAMPLE_BEFORE_FAILURE {
            let mut prediction = Prediction::new(at(8, 0) + Duration::seconds(i as i64));
            prediction.set_predicted_activities(&BTreeMap::from([(activity_type, 0.9)]));
            aggregator.predictions.push(prediction);
        }
        aggregator
    }

    #[tokio::test]
    async fn test_save_and_mark_dirty_only_when_changed() {
        let service = service();
        let mut trip = bike_trip("t1", at(8, 0));
        trip.is_synced = true;
        service.store().put_trip(trip.clone()).await.unwrap();

        let unchanged = service.save_and_mark_dirty(trip.clone()).await.unwrap();
        assert!(unchanged.is_synced);

        trip.length = 1200.0;
        let changed = service.save_and_mark_dirty(trip).await.unwrap();
        assert!(!changed.is_synced);
        assert!(!service.trip_with_uuid("T1").await.unwrap().unwrap().is_synced);
    }

    #[tokio::test]
    async fn test_bike_trips_today_uses_local_midnight() {
        let service = service();
        // 06:30 UTC is 23:30 the previous day at UTC-7.
        service.store().put_trip(bike_trip("late", at(6, 30))).await.unwrap();
        service.store().put_trip(bike_trip("early", at(7, 30))).await.unwrap();

        let pdt = FixedOffset::west_opt(7 * 3600).unwrap();
        let now = at(20, 0).with_timezone(&pdt);
        let today = service.bike_trips_today(&now).await.unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].uuid, "early");

        let early = service.trip_with_uuid("early").await.unwrap().unwrap();
        assert!(service.is_first_bike_trip_today(&early, &now).await.unwrap());
    }

    #[tokio::test]
    async fn test_least_recent_and_week_trips() {
        let service = service();
        let now = at(12, 0);
        service.store().put_trip(bike_trip("old", now - Duration::days(30))).await.unwrap();
        service.store().put_trip(bike_trip("new", now - Duration::days(1))).await.unwrap();

        let oldest = service.least_recent_bike_trip().await.unwrap().unwrap();
        assert_eq!(oldest.uuid, "old");
        let week = service.week_trips(now).await.unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].uuid, "new");
    }

    #[tokio::test]
    async fn test_import_trip_json_with_locations() {
        let service = service();
        let payload = serde_json::json!({
            "uuid": "ABC",
            "startDate": "2017-05-10 08:00:00+0000",
            "activityType": 2,
            "rating": 1,
            "length": 1500.0,
            "locations": [
                {"date": "2017-05-10 08:05:00.000+0000", "latitude": 45.53, "longitude": -122.68,
                 "course": 1.0, "speed": 4.0, "horizontalAccuracy": 5.0, "source": 1},
                {"date": "2017-05-10 08:00:00.000+0000", "latitude": 45.52, "longitude": -122.68,
                 "course": 1.0, "speed": 4.0, "horizontalAccuracy": 5.0, "source": 1}
            ]
        });

        let trip = service.import_trip_json(&payload).await.unwrap();
        assert!(trip.is_synced);
        assert!(trip.are_locations_synced);
        assert_eq!(trip.rating.choice, RatingChoice::Good);

        let route = service.store().locations_for_trip("abc").await.unwrap();
        assert_eq!(route.len(), 2);
        assert!(route[0].date < route[1].date);
    }

    #[tokio::test]
    async fn test_import_rejects_incomplete_payload() {
        let service = service();
        let payload = serde_json::json!({
            "uuid": "x",
            "startDate": "2017-05-10 08:00:00+0000",
            "activityType": 2
        });
        let err = service.import_trip_json(&payload).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(service.trip_with_uuid("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_promote_prototrip_moves_everything() {
        let service = service();
        let mut prototrip = Prototrip::new(at(7, 55));
        prototrip.locations = vec![
            location(at(7, 58), 45.50, LocationSource::Geofence),
            location(at(8, 10), 45.52, LocationSource::ActiveGps),
            location(at(8, 1), 45.51, LocationSource::ActiveGps),
        ];
        prototrip.activities.push(MotionActivity::new(at(8, 0), Default::default()));
        service.store().put_prototrip(prototrip.clone()).await.unwrap();
        let collection =
            SensorDataCollection::new(CollectionOwner::Prototrip(prototrip.id.clone()));
        service.store().put_sensor_data(collection).await.unwrap();

        let trip = service.promote_prototrip(&prototrip.id).await.unwrap();

        assert_eq!(trip.start_date, at(8, 1));
        assert_eq!(trip.end_date, at(8, 10));
        assert!(trip.length > 0.0);
        let store = service.store();
        assert!(store.get_prototrip(&prototrip.id).await.unwrap().is_none());
        assert_eq!(store.locations_for_trip(&trip.uuid).await.unwrap().len(), 3);
        assert_eq!(store.activities_for_trip(&trip.uuid).await.unwrap().len(), 1);
        let owner = CollectionOwner::Trip(trip.uuid.clone());
        assert_eq!(store.sensor_data_for(&owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_classifies_unknown_trip() {
        let service = service();
        let trip = Trip::new("t", at(9, 0));
        let transaction = Transaction::new()
            .with(Change::PutTrip(trip))
            .with(Change::SetTripLocations {
                trip_uuid: "t".into(),
                locations: vec![
                    location(at(8, 0), 45.50, LocationSource::ActiveGps),
                    location(at(8, 20), 45.52, LocationSource::ActiveGps),
                ],
            })
            .with(Change::AddAggregator {
                trip_uuid: "t".into(),
                aggregator: complete_aggregator(ActivityType::Cycling),
            });
        service.store().apply(transaction).await.unwrap();

        let weather = WeatherCondition {
            condition_code: 800,
            description: "clear sky".into(),
            temperature_f: 64.0,
        };
        let trip = service.finalize_trip("t", Some(&weather)).await.unwrap();

        assert_eq!(trip.activity_type, ActivityType::Cycling);
        assert_eq!(trip.start_date, at(8, 0));
        assert_eq!(trip.end_date, at(8, 20));
        assert!((trip.length - 2224.0).abs() < 5.0);
        assert_eq!(trip.climacon.as_deref(), Some("☀️"));
        assert_eq!(trip.temperature, Some(64.0));
    }

    #[test]
    fn test_incomplete_aggregators_do_not_classify() {
        let mut short = PredictionAggregator::new(None);
        short.add_unknown_type_prediction(at(8, 0));
        assert_eq!(aggregate_activity_type(&[short]), None);
        assert_eq!(
            aggregate_activity_type(&[complete_aggregator(ActivityType::Bus)]),
            Some(ActivityType::Bus)
        );
    }

    #[tokio::test]
    async fn test_promotion_sync_and_dismiss() {
        let service = service();
        service.store().put_promotion(Promotion::new("stale")).await.unwrap();

        let now = at(12, 0);
        let synced = service
            .sync_promotions(&[
                serde_json::json!({"uuid": "P1", "text": "Ride!", "begins": "2017-05-01 00:00:00+0000"}),
                serde_json::json!({"uuid": "P2", "ends": "2017-05-01 00:00:00+0000"}),
            ])
            .await
            .unwrap();
        assert_eq!(synced.len(), 2);
        assert!(service.store().get_promotion("stale").await.unwrap().is_none());

        let active = service.active_promotions(now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].uuid, "P1");

        let eligible = service.eligible_promotion(now).await.unwrap().unwrap();
        assert_eq!(eligible.uuid, "P1");

        service.dismiss_promotion("p1").await.unwrap();
        assert!(service.eligible_promotion(now).await.unwrap().is_none());
        assert!(service.active_promotions(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connected_app_hides_its_promotion() {
        let service = service();
        let now = at(12, 0);
        service
            .sync_promotions(&[serde_json::json!({
                "uuid": "P1",
                "text": "Link your bike club",
                "application_uuid": "APP-1"
            })])
            .await
            .unwrap();
        assert!(service.eligible_promotion(now).await.unwrap().is_some());

        let synced = service
            .sync_connected_apps(&[serde_json::json!({"uuid": "app-1", "name": "Bike Club"})])
            .await
            .unwrap();
        assert!(synced[0].is_connected);
        assert!(service.eligible_promotion(now).await.unwrap().is_none());

        // Dropped from the profile: known, but disconnected.
        service.sync_connected_apps(&[]).await.unwrap();
        let apps = service.connected_apps().await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name.as_deref(), Some("Bike Club"));
        assert!(!apps[0].is_connected);
        assert!(service.eligible_promotion(now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_activity_marks_unsynced() {
        let service = service();
        let mut trip = bike_trip("t1", at(8, 0));
        trip.is_synced = true;
        service.store().put_trip(trip).await.unwrap();

        service
            .record_activity("T1", MotionActivity::new(at(8, 5), Default::default()))
            .await
            .unwrap();
        assert!(!service.trip_with_uuid("t1").await.unwrap().unwrap().is_synced);
        assert_eq!(service.store().activities_for_trip("t1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_trip_is_not_found() {
        let service = service();
        let err = service.set_rating("nope", RatingChoice::Good).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = service.delete_trip("nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
