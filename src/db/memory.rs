// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store used for local development and tests.

use crate::db::{check_expected_trip, normalize_id, Change, ParentRef, RideStore, Transaction, TripQuery};
use crate::error::Result;
use crate::models::{
    BoundingBox, CollectionOwner, ConnectedApp, Location, MotionActivity, PredictionAggregator, Promotion,
    Prototrip, SensorDataCollection, Trip,
};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

/// Keys are normalized ids. Readers hold the commit lock shared, so a
/// transaction is never observed half applied.
#[derive(Default)]
pub struct MemoryStore {
    trips: DashMap<String, Trip>,
    locations: DashMap<String, Vec<Location>>,
    activities: DashMap<String, Vec<MotionActivity>>,
    sensor_data: DashMap<String, SensorDataCollection>,
    aggregators: DashMap<String, Vec<PredictionAggregator>>,
    prototrips: DashMap<String, Prototrip>,
    promotions: DashMap<String, Promotion>,
    connected_apps: DashMap<String, ConnectedApp>,
    commit_lock: RwLock<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn parent_exists(&self, parent: ParentRef<'_>) -> bool {
        match parent {
            ParentRef::Trip(id) => self.trips.contains_key(&normalize_id(id)),
            ParentRef::Prototrip(id) => self.prototrips.contains_key(&normalize_id(id)),
        }
    }

    fn remove_owned_sensor_data(&self, owner: &CollectionOwner) {
        let owner_key = normalize_id(owner.id());
        self.sensor_data.retain(|_, collection| {
            !(std::mem::discriminant(&collection.owner) == std::mem::discriminant(owner)
                && normalize_id(collection.owner.id()) == owner_key)
        });
    }

    fn apply_change(&self, change: Change) {
        match change {
            Change::PutTrip(trip) => {
                self.trips.insert(normalize_id(&trip.uuid), trip);
            }
            Change::DeleteTrip(uuid) => {
                let key = normalize_id(&uuid);
                self.trips.remove(&key);
                self.locations.remove(&key);
                self.activities.remove(&key);
                self.aggregators.remove(&key);
                self.remove_owned_sensor_data(&CollectionOwner::Trip(uuid));
            }
            Change::SetTripLocations {
                trip_uuid,
                mut locations,
            } => {
                locations.sort_by_key(|loc| loc.date);
                self.locations.insert(normalize_id(&trip_uuid), locations);
            }
            Change::AddActivity {
                trip_uuid,
                activity,
            } => {
                self.activities
                    .entry(normalize_id(&trip_uuid))
                    .or_default()
                    .push(activity);
            }
            Change::PutSensorData(collection) => {
                self.sensor_data
                    .insert(normalize_id(&collection.id), collection);
            }
            Change::DeleteSensorData(id) => {
                self.sensor_data.remove(&normalize_id(&id));
            }
            Change::AddAggregator {
                trip_uuid,
                aggregator,
            } => {
                self.aggregators
                    .entry(normalize_id(&trip_uuid))
                    .or_default()
                    .push(aggregator);
            }
            Change::PutPrototrip(prototrip) => {
                self.prototrips
                    .insert(normalize_id(&prototrip.id), prototrip);
            }
            Change::DeletePrototrip(id) => {
                self.prototrips.remove(&normalize_id(&id));
                self.remove_owned_sensor_data(&CollectionOwner::Prototrip(id));
            }
            Change::PutPromotion(promotion) => {
                self.promotions
                    .insert(normalize_id(&promotion.uuid), promotion);
            }
            Change::DeletePromotion(uuid) => {
                self.promotions.remove(&normalize_id(&uuid));
            }
            Change::PutConnectedApp(app) => {
                self.connected_apps.insert(normalize_id(&app.uuid), app);
            }
            Change::DeleteConnectedApp(uuid) => {
                self.connected_apps.remove(&normalize_id(&uuid));
            }
            Change::ExpectTrip { .. } => {}
        }
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn get_trip(&self, uuid: &str) -> Result<Option<Trip>> {
        let _read = self.commit_lock.read().await;
        Ok(self.trips.get(&normalize_id(uuid)).map(|t| t.clone()))
    }

    async fn query_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        let _read = self.commit_lock.read().await;
        let candidates: Vec<Trip> = self.trips.iter().map(|t| t.clone()).collect();
        Ok(query.select(candidates))
    }

    async fn locations_for_trip(&self, uuid: &str) -> Result<Vec<Location>> {
        let _read = self.commit_lock.read().await;
        Ok(self
            .locations
            .get(&normalize_id(uuid))
            .map(|locs| locs.clone())
            .unwrap_or_default())
    }

    async fn locations_in_bounds(&self, bounds: &BoundingBox) -> Result<Vec<Location>> {
        let _read = self.commit_lock.read().await;
        Ok(self
            .locations
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|loc| bounds.contains(&loc.coordinate()))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    async fn activities_for_trip(&self, uuid: &str) -> Result<Vec<MotionActivity>> {
        let _read = self.commit_lock.read().await;
        Ok(self
            .activities
            .get(&normalize_id(uuid))
            .map(|a| a.clone())
            .unwrap_or_default())
    }

    async fn sensor_data_for(&self, owner: &CollectionOwner) -> Result<Vec<SensorDataCollection>> {
        let _read = self.commit_lock.read().await;
        let owner_key = normalize_id(owner.id());
        let mut collections: Vec<SensorDataCollection> = self
            .sensor_data
            .iter()
            .filter(|c| {
                std::mem::discriminant(&c.owner) == std::mem::discriminant(owner)
                    && normalize_id(c.owner.id()) == owner_key
            })
            .map(|c| c.clone())
            .collect();
        collections.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(collections)
    }

    async fn aggregators_for_trip(&self, uuid: &str) -> Result<Vec<PredictionAggregator>> {
        let _read = self.commit_lock.read().await;
        Ok(self
            .aggregators
            .get(&normalize_id(uuid))
            .map(|a| a.clone())
            .unwrap_or_default())
    }

    async fn get_prototrip(&self, id: &str) -> Result<Option<Prototrip>> {
        let _read = self.commit_lock.read().await;
        Ok(self.prototrips.get(&normalize_id(id)).map(|p| p.clone()))
    }

    async fn get_promotion(&self, uuid: &str) -> Result<Option<Promotion>> {
        let _read = self.commit_lock.read().await;
        Ok(self.promotions.get(&normalize_id(uuid)).map(|p| p.clone()))
    }

    async fn all_promotions(&self) -> Result<Vec<Promotion>> {
        let _read = self.commit_lock.read().await;
        let mut promotions: Vec<Promotion> = self.promotions.iter().map(|p| p.clone()).collect();
        promotions.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.uuid.cmp(&b.uuid)));
        Ok(promotions)
    }

    async fn get_connected_app(&self, uuid: &str) -> Result<Option<ConnectedApp>> {
        let _read = self.commit_lock.read().await;
        Ok(self.connected_apps.get(&normalize_id(uuid)).map(|a| a.clone()))
    }

    async fn all_connected_apps(&self) -> Result<Vec<ConnectedApp>> {
        let _read = self.commit_lock.read().await;
        let mut apps: Vec<ConnectedApp> = self.connected_apps.iter().map(|a| a.clone()).collect();
        apps.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        Ok(apps)
    }

    async fn apply(&self, transaction: Transaction) -> Result<()> {
        let _write = self.commit_lock.write().await;
        for (uuid, expected) in transaction.expectations() {
            let stored = self.trips.get(&normalize_id(uuid)).map(|t| t.clone());
            check_expected_trip(uuid, expected, stored.as_ref())?;
        }
        transaction.validate(|parent| self.parent_exists(parent))?;

        let count = transaction.len();
        for change in transaction.into_changes() {
            self.apply_change(change);
        }
        tracing::debug!(changes = count, "Applied transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TripCursor;
    use crate::error::AppError;
    use crate::models::{ActivityType, LocationSource};
    use chrono::{DateTime, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 4, 2, 9, 0, 0).unwrap()
    }

    fn location(minute: i64) -> Location {
        Location {
            date: start() + chrono::Duration::minutes(minute),
            latitude: 45.52,
            longitude: -122.68,
            altitude: 10.0,
            course: 90.0,
            speed: 4.0,
            horizontal_accuracy: 5.0,
            vertical_accuracy: 3.0,
            source: LocationSource::ActiveGps,
        }
    }

    #[tokio::test]
    async fn test_uuid_lookup_ignores_case() {
        let store = MemoryStore::new();
        store.put_trip(Trip::new("AbC-1", start())).await.unwrap();

        let found = store.get_trip("abc-1").await.unwrap().unwrap();
        assert_eq!(found.uuid, "AbC-1");

        store.put_trip(Trip::new("ABC-1", start())).await.unwrap();
        let all = store.query_trips(&TripQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_transaction_applies_nothing() {
        let store = MemoryStore::new();
        let tx = Transaction::new()
            .with(Change::PutTrip(Trip::new("t1", start())))
            .with(Change::SetTripLocations {
                trip_uuid: "t1".into(),
                locations: vec![location(1)],
            })
            .with(Change::AddActivity {
                trip_uuid: "nope".into(),
                activity: MotionActivity::new(start(), Default::default()),
            });

        let err = store.apply(tx).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.get_trip("t1").await.unwrap().is_none());
        assert!(store.locations_for_trip("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_expectation_applies_nothing() {
        let store = MemoryStore::new();
        let original = Trip::new("t1", start());
        store.put_trip(original.clone()).await.unwrap();

        let mut rated = original.clone();
        rated.rating.choice = crate::models::RatingChoice::Good;
        store.put_trip(rated.clone()).await.unwrap();

        let mut stale_edit = original.clone();
        stale_edit.length = 1200.0;
        let tx = Transaction::new()
            .with(Change::ExpectTrip {
                uuid: "T1".into(),
                expected: Some(Box::new(original)),
            })
            .with(Change::PutTrip(stale_edit));
        let err = store.apply(tx).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.get_trip("t1").await.unwrap().unwrap(), rated);

        let tx = Transaction::new()
            .with(Change::ExpectTrip {
                uuid: "t2".into(),
                expected: None,
            })
            .with(Change::PutTrip(Trip::new("t2", start())));
        store.apply(tx).await.unwrap();
        assert!(store.get_trip("t2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_trip_cascades() {
        let store = MemoryStore::new();
        let mut collection = SensorDataCollection::new(CollectionOwner::Trip("T1".into()));
        collection.locations.push(location(0));
        let tx = Transaction::new()
            .with(Change::PutTrip(Trip::new("t1", start())))
            .with(Change::SetTripLocations {
                trip_uuid: "t1".into(),
                locations: vec![location(2), location(1)],
            })
            .with(Change::PutSensorData(collection))
            .with(Change::AddAggregator {
                trip_uuid: "t1".into(),
                aggregator: PredictionAggregator::new(Some("t1".into())),
            });
        store.apply(tx).await.unwrap();

        let route = store.locations_for_trip("T1").await.unwrap();
        assert!(route[0].date < route[1].date);
        let owner = CollectionOwner::Trip("t1".into());
        assert_eq!(store.sensor_data_for(&owner).await.unwrap().len(), 1);

        store.delete_trip("T1").await.unwrap();
        assert!(store.locations_for_trip("t1").await.unwrap().is_empty());
        assert!(store.sensor_data_for(&owner).await.unwrap().is_empty());
        assert!(store.aggregators_for_trip("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_pages_with_cursor() {
        let store = MemoryStore::new();
        for (i, activity) in [ActivityType::Cycling, ActivityType::Walking, ActivityType::Cycling]
            .into_iter()
            .enumerate()
        {
            let mut trip = Trip::new(format!("trip-{i}"), start() + chrono::Duration::hours(i as i64));
            trip.activity_type = activity;
            store.put_trip(trip).await.unwrap();
        }

        let page = store
            .query_trips(&TripQuery::bike_trips().limit(1))
            .await
            .unwrap();
        assert_eq!(page[0].uuid, "trip-2");

        let next = store
            .query_trips(&TripQuery::bike_trips().cursor(TripCursor::after(&page[0])))
            .await
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].uuid, "trip-0");
    }
}
