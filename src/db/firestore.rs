// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed `RideStore`.
//!
//! Layout:
//! - `trips/{uuid_lower}`: the trip plus index fields for listing
//! - `trip_locations/{uuid_lower}_{chunk}`: the route, split into chunks
//! - `trip_activities`, `prediction_aggregators`, `sensor_data`: child
//!   records that carry their parent's normalized id
//! - `prototrips/{id_lower}`, `promotions/{uuid_lower}`,
//!   `connected_apps/{uuid_lower}`
//!
//! `apply` does its reads through the Firestore transaction it commits
//! with, so a document that changes between planning and commit aborts
//! the commit and surfaces as [`AppError::Conflict`].

use crate::db::{
    check_expected_trip, collections, normalize_id, Change, RideStore, Transaction, TripQuery,
};
use crate::error::{AppError, Result};
use crate::models::{
    BoundingBox, CollectionOwner, ConnectedApp, Location, MotionActivity, PredictionAggregator, Promotion,
    Prototrip, SensorDataCollection, Trip,
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const MAX_CONCURRENT_DB_OPS: usize = 50;
// Firestore limits a transaction to 500 writes.
const MAX_TRANSACTION_WRITES: usize = 500;
const LOCATIONS_PER_CHUNK: usize = 400;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TripDocument {
    uuid_lower: String,
    /// `{offset start_ms:020}_{uuid_lower}`; orders and pages trip listings
    sort_key: String,
    start_ms: i64,
    activity_type: i16,
    rating: i16,
    trip: Trip,
}

impl TripDocument {
    fn new(trip: Trip) -> Self {
        let uuid_lower = normalize_id(&trip.uuid);
        let start_ms = trip.start_date.timestamp_millis();
        Self {
            sort_key: sort_key(start_ms, &uuid_lower),
            uuid_lower,
            start_ms,
            activity_type: trip.activity_type.raw(),
            rating: trip.rating.choice.raw(),
            trip,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocationChunk {
    trip_uuid_lower: String,
    index: usize,
    min_latitude: f64,
    max_latitude: f64,
    locations: Vec<Location>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActivityDocument {
    doc_id: String,
    trip_uuid_lower: String,
    start_ms: i64,
    activity: MotionActivity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AggregatorDocument {
    doc_id: String,
    trip_uuid_lower: String,
    added_ms: i64,
    aggregator: PredictionAggregator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SensorDocument {
    doc_id: String,
    owner_kind: String,
    owner_id_lower: String,
    collection: SensorDataCollection,
}

impl SensorDocument {
    fn new(collection: SensorDataCollection) -> Self {
        let (kind, id) = owner_fields(&collection.owner);
        Self {
            doc_id: normalize_id(&collection.id),
            owner_kind: kind.to_string(),
            owner_id_lower: id,
            collection,
        }
    }
}

fn owner_fields(owner: &CollectionOwner) -> (&'static str, String) {
    match owner {
        CollectionOwner::Trip(id) => ("trip", normalize_id(id)),
        CollectionOwner::Prototrip(id) => ("prototrip", normalize_id(id)),
    }
}

/// `ms` shifted into `u64` so that string order matches numeric order,
/// negative (pre-1970) times included.
fn offset_ms(ms: i64) -> u64 {
    (ms as u64) ^ (1 << 63)
}

fn sort_key(start_ms: i64, uuid_lower: &str) -> String {
    format!("{:020}_{}", offset_ms(start_ms), uuid_lower)
}

/// Smallest sort key among trips starting at `ms`.
fn sort_key_floor(ms: i64) -> String {
    format!("{:020}", offset_ms(ms))
}

fn chunk_id(trip_uuid_lower: &str, index: usize) -> String {
    format!("{}_{:04}", trip_uuid_lower, index)
}

fn database_error(context: &'static str) -> impl Fn(firestore::errors::FirestoreError) -> AppError {
    move |e| AppError::Database(format!("{context}: {e}"))
}

/// A commit aborted by contention means a document read in the
/// transaction changed underneath it.
fn commit_error(e: firestore::errors::FirestoreError) -> AppError {
    match &e {
        firestore::errors::FirestoreError::DatabaseError(db_err)
            if db_err.public.code == "Aborted" =>
        {
            AppError::Conflict(format!("Transaction aborted by a concurrent write: {e}"))
        }
        _ => AppError::Database(format!("Transaction commit failed: {e}")),
    }
}

/// One write staged for a Firestore transaction.
enum Write {
    Update {
        collection: &'static str,
        doc_id: String,
        body: serde_json::Value,
    },
    Delete {
        collection: &'static str,
        doc_id: String,
    },
}

impl Write {
    fn target(&self) -> (&'static str, &str) {
        match self {
            Write::Update {
                collection, doc_id, ..
            }
            | Write::Delete { collection, doc_id } => (*collection, doc_id.as_str()),
        }
    }
}

/// Document writes for one transaction, plus what earlier changes staged.
#[derive(Default)]
struct WritePlan {
    writes: Vec<Write>,
    /// trip -> chunk count after the changes so far
    chunk_counts: HashMap<String, usize>,
    /// sensor doc -> (owner kind, owner id), `None` once deleted
    sensor_owners: HashMap<String, Option<(String, String)>>,
    /// (trip, collection, doc id) of children added in this transaction
    staged_children: Vec<(String, &'static str, String)>,
}

impl WritePlan {
    fn update<T: Serialize>(&mut self, collection: &'static str, doc_id: String, body: &T) -> Result<()> {
        let body = serde_json::to_value(body)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Document encoding failed: {e}")))?;
        self.writes.push(Write::Update {
            collection,
            doc_id,
            body,
        });
        Ok(())
    }

    fn delete(&mut self, collection: &'static str, doc_id: String) {
        self.writes.push(Write::Delete { collection, doc_id });
    }

    fn stage_child(&mut self, trip_uuid_lower: &str, collection: &'static str, doc_id: &str) {
        self.staged_children
            .push((trip_uuid_lower.to_string(), collection, doc_id.to_string()));
    }

    fn take_staged_children(&mut self, trip_uuid_lower: &str) -> Vec<(&'static str, String)> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.staged_children)
            .into_iter()
            .partition(|(trip, _, _)| trip == trip_uuid_lower);
        self.staged_children = kept;
        taken
            .into_iter()
            .map(|(_, collection, doc_id)| (collection, doc_id))
            .collect()
    }

    /// Writes with only the last one kept for each document.
    fn into_writes(self) -> Vec<Write> {
        let mut seen = HashSet::new();
        let mut kept: Vec<Write> = self
            .writes
            .into_iter()
            .rev()
            .filter(|write| {
                let (collection, doc_id) = write.target();
                seen.insert((collection, doc_id.to_string()))
            })
            .collect();
        kept.reverse();
        kept
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // The emulator accepts any token, so skip local credential discovery.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn get_document<T>(&self, collection: &'static str, id: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(&normalize_id(id))
            .await
            .map_err(database_error("Document read failed"))
    }

    /// All documents in `collection` whose `field` equals `value`.
    async fn children<T>(&self, collection: &'static str, field: &'static str, value: String) -> Result<Vec<T>>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| q.for_all([q.field(field).eq(value.clone())]))
            .obj()
            .query()
            .await
            .map_err(database_error("Child query failed"))
    }

    async fn location_chunks(&self, trip_uuid_lower: &str) -> Result<Vec<LocationChunk>> {
        let mut chunks: Vec<LocationChunk> = self
            .children(
                collections::TRIP_LOCATIONS,
                "trip_uuid_lower",
                trip_uuid_lower.to_string(),
            )
            .await?;
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    async fn sensor_documents(&self, owner: &CollectionOwner) -> Result<Vec<SensorDocument>> {
        let (kind, id) = owner_fields(owner);
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SENSOR_DATA)
            .filter(move |q| {
                q.for_all([
                    q.field("owner_kind").eq(kind),
                    q.field("owner_id_lower").eq(id.clone()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(database_error("Sensor data query failed"))
    }

    /// Existence of every parent a transaction refers to, keyed like `ParentRef::key`.
    async fn existing_parents(&self, transaction: &Transaction) -> Result<HashSet<(bool, String)>> {
        let refs: Vec<(bool, String)> = transaction.parent_refs().iter().map(|p| p.key()).collect();

        let found = stream::iter(refs)
            .map(|(is_trip, id)| async move {
                let exists = if is_trip {
                    self.get_document::<TripDocument>(collections::TRIPS, &id)
                        .await?
                        .is_some()
                } else {
                    self.get_document::<Prototrip>(collections::PROTOTRIPS, &id)
                        .await?
                        .is_some()
                };
                Ok::<_, AppError>(exists.then_some((is_trip, id)))
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<Option<(bool, String)>>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        Ok(found.into_iter().flatten().collect())
    }

    /// Expand changes into document writes, reading what cascades need.
    ///
    /// Cascades see the effect of earlier changes in the same transaction,
    /// and each document is written at most once (the last write wins).
    async fn plan_writes(&self, changes: Vec<Change>) -> Result<Vec<Write>> {
        let mut plan = WritePlan::default();

        for change in changes {
            match change {
                Change::PutTrip(trip) => {
                    let doc = TripDocument::new(trip);
                    plan.update(collections::TRIPS, doc.uuid_lower.clone(), &doc)?;
                }
                Change::DeleteTrip(uuid) => {
                    let key = normalize_id(&uuid);
                    for index in self.chunk_indexes(&key, &plan).await? {
                        plan.delete(collections::TRIP_LOCATIONS, chunk_id(&key, index));
                    }
                    plan.chunk_counts.insert(key.clone(), 0);

                    let activities: Vec<ActivityDocument> = self
                        .children(collections::TRIP_ACTIVITIES, "trip_uuid_lower", key.clone())
                        .await?;
                    for activity in activities {
                        plan.delete(collections::TRIP_ACTIVITIES, activity.doc_id);
                    }
                    let aggregators: Vec<AggregatorDocument> = self
                        .children(
                            collections::PREDICTION_AGGREGATORS,
                            "trip_uuid_lower",
                            key.clone(),
                        )
                        .await?;
                    for aggregator in aggregators {
                        plan.delete(collections::PREDICTION_AGGREGATORS, aggregator.doc_id);
                    }
                    for (collection, doc_id) in plan.take_staged_children(&key) {
                        plan.delete(collection, doc_id);
                    }

                    self.cascade_sensor_data(&CollectionOwner::Trip(uuid), &mut plan)
                        .await?;
                    plan.delete(collections::TRIPS, key);
                }
                Change::SetTripLocations {
                    trip_uuid,
                    mut locations,
                } => {
                    let key = normalize_id(&trip_uuid);
                    let previous = self.chunk_indexes(&key, &plan).await?;
                    locations.sort_by_key(|loc| loc.date);

                    let mut written = 0;
                    for (index, chunk) in locations.chunks(LOCATIONS_PER_CHUNK).enumerate() {
                        let (min_latitude, max_latitude) = chunk.iter().fold(
                            (f64::INFINITY, f64::NEG_INFINITY),
                            |(lo, hi), loc| (lo.min(loc.latitude), hi.max(loc.latitude)),
                        );
                        let doc = LocationChunk {
                            trip_uuid_lower: key.clone(),
                            index,
                            min_latitude,
                            max_latitude,
                            locations: chunk.to_vec(),
                        };
                        plan.update(collections::TRIP_LOCATIONS, chunk_id(&key, index), &doc)?;
                        written = index + 1;
                    }
                    for index in previous.into_iter().filter(|&i| i >= written) {
                        plan.delete(collections::TRIP_LOCATIONS, chunk_id(&key, index));
                    }
                    plan.chunk_counts.insert(key, written);
                }
                Change::AddActivity {
                    trip_uuid,
                    activity,
                } => {
                    let doc = ActivityDocument {
                        doc_id: uuid::Uuid::new_v4().to_string(),
                        trip_uuid_lower: normalize_id(&trip_uuid),
                        start_ms: activity.start_date.timestamp_millis(),
                        activity,
                    };
                    plan.stage_child(&doc.trip_uuid_lower, collections::TRIP_ACTIVITIES, &doc.doc_id);
                    plan.update(collections::TRIP_ACTIVITIES, doc.doc_id.clone(), &doc)?;
                }
                Change::AddAggregator {
                    trip_uuid,
                    aggregator,
                } => {
                    let doc = AggregatorDocument {
                        doc_id: uuid::Uuid::new_v4().to_string(),
                        trip_uuid_lower: normalize_id(&trip_uuid),
                        added_ms: chrono::Utc::now().timestamp_millis(),
                        aggregator,
                    };
                    plan.stage_child(
                        &doc.trip_uuid_lower,
                        collections::PREDICTION_AGGREGATORS,
                        &doc.doc_id,
                    );
                    plan.update(collections::PREDICTION_AGGREGATORS, doc.doc_id.clone(), &doc)?;
                }
                Change::PutSensorData(collection) => {
                    let doc = SensorDocument::new(collection);
                    plan.sensor_owners.insert(
                        doc.doc_id.clone(),
                        Some((doc.owner_kind.clone(), doc.owner_id_lower.clone())),
                    );
                    plan.update(collections::SENSOR_DATA, doc.doc_id.clone(), &doc)?;
                }
                Change::DeleteSensorData(id) => {
                    let doc_id = normalize_id(&id);
                    plan.sensor_owners.insert(doc_id.clone(), None);
                    plan.delete(collections::SENSOR_DATA, doc_id);
                }
                Change::PutPrototrip(prototrip) => {
                    let id = normalize_id(&prototrip.id);
                    plan.update(collections::PROTOTRIPS, id, &prototrip)?;
                }
                Change::DeletePrototrip(id) => {
                    let doc_id = normalize_id(&id);
                    self.cascade_sensor_data(&CollectionOwner::Prototrip(id), &mut plan)
                        .await?;
                    plan.delete(collections::PROTOTRIPS, doc_id);
                }
                Change::PutPromotion(promotion) => {
                    let id = normalize_id(&promotion.uuid);
                    plan.update(collections::PROMOTIONS, id, &promotion)?;
                }
                Change::DeletePromotion(uuid) => {
                    plan.delete(collections::PROMOTIONS, normalize_id(&uuid));
                }
                Change::PutConnectedApp(app) => {
                    let id = normalize_id(&app.uuid);
                    plan.update(collections::CONNECTED_APPS, id, &app)?;
                }
                Change::DeleteConnectedApp(uuid) => {
                    plan.delete(collections::CONNECTED_APPS, normalize_id(&uuid));
                }
                // Checked in `prepare`; nothing to write.
                Change::ExpectTrip { .. } => {}
            }
        }
        Ok(plan.into_writes())
    }

    /// Check preconditions, validate, and plan the writes of `transaction`.
    /// Called on a store whose reads are bound to the commit transaction.
    async fn prepare(&self, transaction: Transaction) -> Result<Vec<Write>> {
        for (uuid, expected) in transaction.expectations() {
            let stored = self.get_trip(uuid).await?;
            check_expected_trip(uuid, expected, stored.as_ref())?;
        }

        let existing = self.existing_parents(&transaction).await?;
        transaction.validate(|parent| existing.contains(&parent.key()))?;

        let writes = self.plan_writes(transaction.into_changes()).await?;
        if writes.len() > MAX_TRANSACTION_WRITES {
            return Err(AppError::BadRequest(format!(
                "Transaction needs {} writes; the limit is {}",
                writes.len(),
                MAX_TRANSACTION_WRITES
            )));
        }
        Ok(writes)
    }

    /// Chunk indexes a trip has as of the changes planned so far.
    async fn chunk_indexes(&self, trip_uuid_lower: &str, plan: &WritePlan) -> Result<Vec<usize>> {
        if let Some(&count) = plan.chunk_counts.get(trip_uuid_lower) {
            return Ok((0..count).collect());
        }
        Ok(self
            .location_chunks(trip_uuid_lower)
            .await?
            .into_iter()
            .map(|c| c.index)
            .collect())
    }

    /// Delete sensor data owned by `owner`, stored or staged earlier in the plan.
    async fn cascade_sensor_data(&self, owner: &CollectionOwner, plan: &mut WritePlan) -> Result<()> {
        let (kind, id) = owner_fields(owner);
        let mut doomed: Vec<String> = self
            .sensor_documents(owner)
            .await?
            .into_iter()
            .map(|doc| doc.doc_id)
            .filter(|doc_id| !plan.sensor_owners.contains_key(doc_id))
            .collect();
        doomed.extend(
            plan.sensor_owners
                .iter()
                .filter(|(_, staged)| {
                    staged
                        .as_ref()
                        .map_or(false, |(k, i)| k == kind && *i == id)
                })
                .map(|(doc_id, _)| doc_id.clone()),
        );

        for doc_id in doomed {
            plan.sensor_owners.insert(doc_id.clone(), None);
            plan.delete(collections::SENSOR_DATA, doc_id);
        }
        Ok(())
    }
}

#[async_trait]
impl RideStore for FirestoreStore {
    async fn get_trip(&self, uuid: &str) -> Result<Option<Trip>> {
        Ok(self
            .get_document::<TripDocument>(collections::TRIPS, uuid)
            .await?
            .map(|doc| doc.trip))
    }

    async fn query_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        let descending = !query.oldest_first;
        let activity_type = query.activity_type.map(|t| i64::from(t.raw()));
        let rating = query.rating.map(|r| i64::from(r.raw()));
        let after_floor = query
            .started_after
            .map(|d| sort_key_floor(d.timestamp_millis() + 1));
        let before_floor = query
            .started_before
            .map(|d| sort_key_floor(d.timestamp_millis()));
        let cursor_key = query.cursor.as_ref().map(|c| {
            sort_key(c.start_date.timestamp_millis(), &normalize_id(&c.uuid))
        });

        let select = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TRIPS)
            .filter(move |q| {
                let cursor = cursor_key.clone().and_then(|key| {
                    if descending {
                        q.field("sort_key").less_than(key)
                    } else {
                        q.field("sort_key").greater_than(key)
                    }
                });
                q.for_all([
                    activity_type.and_then(|t| q.field("activity_type").eq(t)),
                    rating.and_then(|r| q.field("rating").eq(r)),
                    after_floor
                        .clone()
                        .and_then(|key| q.field("sort_key").greater_than_or_equal(key)),
                    before_floor
                        .clone()
                        .and_then(|key| q.field("sort_key").less_than(key)),
                    cursor,
                ])
            })
            .order_by([(
                "sort_key",
                if descending {
                    firestore::FirestoreQueryDirection::Descending
                } else {
                    firestore::FirestoreQueryDirection::Ascending
                },
            )]);

        let select = match query.limit {
            Some(limit) => select.limit(limit as u32),
            None => select,
        };

        let docs: Vec<TripDocument> = select
            .obj()
            .query()
            .await
            .map_err(database_error("Trip query failed"))?;

        // Index fields are millisecond resolution; refine exactly.
        Ok(query.select(docs.into_iter().map(|doc| doc.trip)))
    }

    async fn locations_for_trip(&self, uuid: &str) -> Result<Vec<Location>> {
        let chunks = self.location_chunks(&normalize_id(uuid)).await?;
        Ok(chunks.into_iter().flat_map(|c| c.locations).collect())
    }

    async fn locations_in_bounds(&self, bounds: &BoundingBox) -> Result<Vec<Location>> {
        let min_latitude = bounds.min_latitude;
        let chunks: Vec<LocationChunk> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TRIP_LOCATIONS)
            .filter(move |q| q.for_all([q.field("max_latitude").greater_than_or_equal(min_latitude)]))
            .obj()
            .query()
            .await
            .map_err(database_error("Location query failed"))?;

        Ok(chunks
            .into_iter()
            .filter(|c| c.min_latitude <= bounds.max_latitude)
            .flat_map(|c| c.locations)
            .filter(|loc| bounds.contains(&loc.coordinate()))
            .collect())
    }

    async fn activities_for_trip(&self, uuid: &str) -> Result<Vec<MotionActivity>> {
        let mut docs: Vec<ActivityDocument> = self
            .children(collections::TRIP_ACTIVITIES, "trip_uuid_lower", normalize_id(uuid))
            .await?;
        docs.sort_by_key(|d| d.start_ms);
        Ok(docs.into_iter().map(|d| d.activity).collect())
    }

    async fn sensor_data_for(&self, owner: &CollectionOwner) -> Result<Vec<SensorDataCollection>> {
        let mut docs = self.sensor_documents(owner).await?;
        docs.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        Ok(docs.into_iter().map(|d| d.collection).collect())
    }

    async fn aggregators_for_trip(&self, uuid: &str) -> Result<Vec<PredictionAggregator>> {
        let mut docs: Vec<AggregatorDocument> = self
            .children(
                collections::PREDICTION_AGGREGATORS,
                "trip_uuid_lower",
                normalize_id(uuid),
            )
            .await?;
        docs.sort_by_key(|d| d.added_ms);
        Ok(docs.into_iter().map(|d| d.aggregator).collect())
    }

    async fn get_prototrip(&self, id: &str) -> Result<Option<Prototrip>> {
        self.get_document(collections::PROTOTRIPS, id).await
    }

    async fn get_promotion(&self, uuid: &str) -> Result<Option<Promotion>> {
        self.get_document(collections::PROMOTIONS, uuid).await
    }

    async fn all_promotions(&self) -> Result<Vec<Promotion>> {
        let mut promotions: Vec<Promotion> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PROMOTIONS)
            .obj()
            .query()
            .await
            .map_err(database_error("Promotion query failed"))?;
        promotions.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.uuid.cmp(&b.uuid)));
        Ok(promotions)
    }

    async fn get_connected_app(&self, uuid: &str) -> Result<Option<ConnectedApp>> {
        self.get_document(collections::CONNECTED_APPS, uuid).await
    }

    async fn all_connected_apps(&self) -> Result<Vec<ConnectedApp>> {
        let mut apps: Vec<ConnectedApp> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::CONNECTED_APPS)
            .obj()
            .query()
            .await
            .map_err(database_error("Connected app query failed"))?;
        apps.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        Ok(apps)
    }

    async fn apply(&self, transaction: Transaction) -> Result<()> {
        let client = self.get_client()?;
        let mut db_transaction = client
            .begin_transaction()
            .await
            .map_err(database_error("Failed to begin transaction"))?;

        let reader = Self {
            client: Some(client.clone_with_consistency_selector(
                firestore::FirestoreConsistencySelector::Transaction(
                    db_transaction.transaction_id().clone(),
                ),
            )),
        };
        let change_count = transaction.len();
        let writes = match reader.prepare(transaction).await {
            Ok(writes) => writes,
            Err(e) => {
                let _ = db_transaction.rollback().await;
                return Err(e);
            }
        };

        let write_count = writes.len();
        for write in writes {
            let staged = match write {
                Write::Update {
                    collection,
                    doc_id,
                    body,
                } => client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .document_id(&doc_id)
                    .object(&body)
                    .add_to_transaction(&mut db_transaction)
                    .map(|_| ()),
                Write::Delete { collection, doc_id } => client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut db_transaction)
                    .map(|_| ()),
            };
            if let Err(e) = staged {
                let _ = db_transaction.rollback().await;
                return Err(AppError::Database(format!(
                    "Failed to add write to transaction: {}",
                    e
                )));
            }
        }

        db_transaction.commit().await.map_err(commit_error)?;

        tracing::info!(
            changes = change_count,
            writes = write_count,
            "Transaction committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityType;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_sort_keys_order_like_trip_query() {
        let early = sort_key(1_000, "b");
        let tie = sort_key(1_000, "c");
        let late = sort_key(20_000, "a");
        assert!(early < tie);
        assert!(tie < late);

        // Every trip starting at 1000ms sorts at or after the floor.
        assert!(sort_key_floor(1_000) < early);
        assert!(sort_key_floor(1_001) > tie);
    }

    #[test]
    fn test_sort_keys_order_before_1970() {
        let keys = [
            sort_key(i64::MIN, "a"),
            sort_key(-2_000, "a"),
            sort_key(-1_000, "a"),
            sort_key(-1, "a"),
            sort_key(0, "a"),
            sort_key(1, "a"),
            sort_key(i64::MAX, "a"),
        ];
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(keys.iter().all(|key| key.len() == 20 + 2));

        assert!(sort_key_floor(-1_000) < sort_key(-1_000, "a"));
        assert!(sort_key_floor(-999) > sort_key(-1_000, "z"));
    }

    #[test]
    fn test_trip_document_index_fields() {
        let mut trip = Trip::new("MiXeD", Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap());
        trip.activity_type = ActivityType::Bus;
        let doc = TripDocument::new(trip);

        assert_eq!(doc.uuid_lower, "mixed");
        assert_eq!(doc.activity_type, 5);
        assert!(doc.sort_key.ends_with("_mixed"));
        assert_eq!(doc.sort_key.len(), 20 + 1 + 5);
    }

    #[test]
    fn test_write_plan_keeps_last_write_per_document() {
        let mut plan = WritePlan::default();
        plan.update(collections::TRIPS, "a".into(), &serde_json::json!({"v": 1}))
            .unwrap();
        plan.delete(collections::TRIPS, "b".into());
        plan.delete(collections::TRIPS, "a".into());
        plan.update(collections::PROMOTIONS, "a".into(), &serde_json::json!({}))
            .unwrap();

        let targets: Vec<(&'static str, String)> = plan
            .into_writes()
            .iter()
            .map(|w| {
                let (collection, doc_id) = w.target();
                (collection, doc_id.to_string())
            })
            .collect();
        assert_eq!(
            targets,
            vec![
                (collections::TRIPS, "b".to_string()),
                (collections::TRIPS, "a".to_string()),
                (collections::PROMOTIONS, "a".to_string()),
            ]
        );
    }

    #[test]
    fn test_staged_children_taken_per_trip() {
        let mut plan = WritePlan::default();
        plan.stage_child("t1", collections::TRIP_ACTIVITIES, "x");
        plan.stage_child("t2", collections::TRIP_ACTIVITIES, "y");

        assert_eq!(
            plan.take_staged_children("t1"),
            vec![(collections::TRIP_ACTIVITIES, "x".to_string())]
        );
        assert!(plan.take_staged_children("t1").is_empty());
        assert_eq!(plan.staged_children.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_store_reports_database_error() {
        let store = FirestoreStore::new_mock();
        let err = store.get_trip("t").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
