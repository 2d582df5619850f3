// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated riders.

use crate::db::{TripCursor, TripQuery};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{
    ActivityType, CollectionOwner, ConnectedApp, Coordinate, Location, MotionActivity, PredictionAggregator,
    Promotion, RatingChoice, RideStats, SensorDataCollection, Trip, TripReward,
};
use crate::services::WeatherCondition;
use crate::text::DefaultEmojiSupport;
use crate::time_utils::{format_utc_rfc3339, interval_string};
use crate::units::{distance_string, UnitLocale};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::decompression::RequestDecompressionLayer;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 100;
const CURSOR_PARTS: usize = 3;
/// Decompressed size limit for trip and sensor uploads.
const UPLOAD_BODY_LIMIT: usize = 16 * 1024 * 1024;
/// Concurrent route fetches when building GeoJSON.
const MAX_CONCURRENT_ROUTE_READS: usize = 16;
const POLYLINE_PRECISION: u32 = 5;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        // Trips
        .route("/api/trips", get(list_trips))
        .route(
            "/api/trips",
            post(upload_trip)
                .layer::<_, std::convert::Infallible>(RequestDecompressionLayer::new())
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/trips/date/{date}", get(trips_on_date))
        .route("/api/trips/geojson", get(trips_geojson))
        .route("/api/trips/{uuid}", get(get_trip).delete(delete_trip))
        .route("/api/trips/{uuid}/summary", put(put_summary))
        .route("/api/trips/{uuid}/push-summary", put(put_push_summary))
        .route("/api/trips/{uuid}/rating", put(put_rating))
        .route("/api/trips/{uuid}/activities", post(post_activity))
        .route("/api/trips/{uuid}/predictions", post(post_prediction_aggregator))
        .route(
            "/api/trips/{uuid}/sensor-data",
            post(post_sensor_data)
                .layer::<_, std::convert::Infallible>(RequestDecompressionLayer::new())
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/trips/{uuid}/finalize", post(finalize_trip))
        .route("/api/prototrips/{id}/promote", post(promote_prototrip))
        // Locations & stats
        .route("/api/locations/near", get(locations_near))
        .route("/api/stats", get(get_stats))
        // Promotions
        .route("/api/promotions", get(active_promotions).put(sync_promotions))
        .route("/api/promotions/eligible", get(eligible_promotion))
        .route("/api/promotions/{uuid}", put(put_promotion))
        .route("/api/promotions/{uuid}/dismiss", post(dismiss_promotion))
        // Connected apps
        .route(
            "/api/connected-apps",
            get(list_connected_apps).put(sync_connected_apps),
        )
}

// ─── DTOs ────────────────────────────────────────────────────

/// Trip row in listings.
#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TripSummary {
    pub uuid: String,
    pub activity_type: i16,
    /// "Bike Ride", "Drive", ...
    pub activity: String,
    pub emoji: String,
    pub rating: i16,
    pub rating_emoji: String,
    pub length_meters: f64,
    /// Localized distance, e.g. "2.4 miles"
    pub distance: String,
    pub start_date: String,
    pub end_date: String,
    /// "HH:MM"
    pub duration: String,
    pub climacon: Option<String>,
    pub temperature: Option<f64>,
    pub area_description: String,
    pub display_string: String,
    pub is_synced: bool,
}

impl TripSummary {
    pub fn from_trip(trip: &Trip, locale: &UnitLocale) -> Self {
        Self {
            uuid: trip.uuid.clone(),
            activity_type: trip.activity_type.raw(),
            activity: trip.activity_type.noun().to_string(),
            emoji: trip.activity_type.emoji().to_string(),
            rating: trip.rating.choice.raw(),
            rating_emoji: trip.rating.emoji().to_string(),
            length_meters: trip.length,
            distance: distance_string(trip.length, locale, false),
            start_date: format_utc_rfc3339(trip.start_date),
            end_date: format_utc_rfc3339(trip.end_date),
            duration: interval_string(trip.duration()),
            climacon: trip.climacon.clone(),
            temperature: trip.temperature,
            area_description: trip.area_description(),
            display_string: trip.display_string(locale),
            is_synced: trip.is_synced,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RewardView {
    /// Always drawable by the client
    pub emoji: String,
    pub description: String,
    pub reward_uuid: Option<String>,
    pub icon_url: Option<String>,
}

impl From<&TripReward> for RewardView {
    fn from(reward: &TripReward) -> Self {
        Self {
            emoji: reward.display_safe_emoji(&DefaultEmojiSupport).to_string(),
            description: reward.description_text.clone(),
            reward_uuid: reward.reward_uuid.clone(),
            icon_url: reward.icon_url.clone(),
        }
    }
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TripDetail {
    #[serde(flatten)]
    pub summary: TripSummary,
    pub full_display_string: String,
    pub weather: String,
    pub calories: String,
    /// Encoded polyline of the route (precision 5)
    pub polyline: String,
    #[cfg_attr(
        feature = "binding-generation",
        ts(type = "Array<Record<string, unknown>>")
    )]
    pub locations: Vec<Value>,
    pub rewards: Vec<RewardView>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TripsResponse {
    pub trips: Vec<TripSummary>,
    pub next_cursor: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LocationsResponse {
    pub count: u32,
    #[cfg_attr(
        feature = "binding-generation",
        ts(type = "Array<Record<string, unknown>>")
    )]
    pub locations: Vec<Value>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SensorDataResponse {
    pub id: String,
    pub trip_uuid: String,
}

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PromotionResponse {
    pub uuid: String,
    pub text: Option<String>,
    pub button_title: Option<String>,
    pub banner_image_url: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_user_dismissed: bool,
    pub connected_app_uuid: Option<String>,
}

impl From<Promotion> for PromotionResponse {
    fn from(promotion: Promotion) -> Self {
        Self {
            uuid: promotion.uuid,
            text: promotion.text,
            button_title: promotion.button_title,
            banner_image_url: promotion.banner_image_url,
            start_date: promotion.start_date.map(format_utc_rfc3339),
            end_date: promotion.end_date.map(format_utc_rfc3339),
            is_user_dismissed: promotion.is_user_dismissed,
            connected_app_uuid: promotion.connected_app_uuid,
        }
    }
}

// ─── Cursor ──────────────────────────────────────────────────

fn parse_cursor(cursor: Option<&str>) -> Result<Option<TripCursor>> {
    cursor
        .map(|raw| {
            let invalid_cursor = || AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;

            let parts: Vec<&str> = decoded_str.splitn(CURSOR_PARTS, ':').collect();
            if parts.len() != CURSOR_PARTS || parts[2].is_empty() {
                return Err(invalid_cursor());
            }

            let seconds = parts[0].parse::<i64>().map_err(|_| invalid_cursor())?;
            let nanos = parts[1].parse::<u32>().map_err(|_| invalid_cursor())?;
            let start_date =
                chrono::DateTime::from_timestamp(seconds, nanos).ok_or_else(invalid_cursor)?;

            Ok(TripCursor {
                start_date,
                uuid: parts[2].to_string(),
            })
        })
        .transpose()
}

fn encode_cursor(cursor: &TripCursor) -> String {
    let payload = format!(
        "{}:{}:{}",
        cursor.start_date.timestamp(),
        cursor.start_date.timestamp_subsec_nanos(),
        cursor.uuid
    );
    URL_SAFE_NO_PAD.encode(payload)
}

// ─── Trips ───────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct TripsQuery {
    /// Raw activity type
    #[validate(range(min = 0, max = 8))]
    activity_type: Option<i16>,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_page_size")]
    limit: u32,
    /// Cursor for forward pagination (opaque token).
    cursor: Option<String>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// List trips newest first with cursor pagination.
async fn list_trips(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<TripsQuery>,
) -> Result<Json<TripsResponse>> {
    params.validate()?;
    let limit = params.limit.min(MAX_PAGE_SIZE) as usize;

    tracing::debug!(
        profile = %user.profile_id,
        activity_type = ?params.activity_type,
        cursor = ?params.cursor,
        limit,
        "Listing trips"
    );

    // Fetch one extra item to determine if another page is available.
    let mut query = TripQuery::default().limit(limit + 1);
    if let Some(raw) = params.activity_type {
        query = query.activity_type(ActivityType::from(raw));
    }
    if let Some(cursor) = parse_cursor(params.cursor.as_deref())? {
        query = query.cursor(cursor);
    }

    let mut trips = state.trips.store().query_trips(&query).await?;
    let has_more = trips.len() > limit;
    if has_more {
        trips.truncate(limit);
    }

    let next_cursor = if has_more {
        trips.last().map(|t| encode_cursor(&TripCursor::after(t)))
    } else {
        None
    };

    let locale = &state.config.locale;
    Ok(Json(TripsResponse {
        trips: trips
            .iter()
            .map(|t| TripSummary::from_trip(t, locale))
            .collect(),
        next_cursor,
    }))
}

/// Trips that started on a UTC calendar day.
async fn trips_on_date(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<Vec<TripSummary>>> {
    let day = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest("Date must be YYYY-MM-DD".to_string()))?;
    let start = day.and_time(NaiveTime::MIN).and_utc();

    // started_after is exclusive; back off one millisecond to include midnight.
    let query = TripQuery::default()
        .started_after(start - Duration::milliseconds(1))
        .started_before(start + Duration::days(1));
    let trips = state.trips.store().query_trips(&query).await?;

    let locale = &state.config.locale;
    Ok(Json(
        trips
            .iter()
            .map(|t| TripSummary::from_trip(t, locale))
            .collect(),
    ))
}

/// Bike trip routes as a GeoJSON FeatureCollection of LineStrings.
async fn trips_geojson(State(state): State<Arc<AppState>>) -> Result<Json<geojson::FeatureCollection>> {
    let trips = state.trips.all_bike_trips(None).await?;
    let store = state.trips.store();

    let routes: Vec<(Trip, Vec<Location>)> = stream::iter(trips)
        .map(|trip| async move {
            let locations = store.locations_for_trip(&trip.uuid).await?;
            Ok::<_, AppError>((trip, locations))
        })
        .buffered(MAX_CONCURRENT_ROUTE_READS)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_>>()?;

    let features = routes
        .iter()
        .filter_map(|(trip, locations)| route_feature(trip, locations, &state.config.locale))
        .collect::<Vec<_>>();

    tracing::debug!(features = features.len(), "Built trip GeoJSON");

    Ok(Json(geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }))
}

/// A route needs two points to be a LineString.
fn route_feature(
    trip: &Trip,
    locations: &[Location],
    locale: &UnitLocale,
) -> Option<geojson::Feature> {
    if locations.len() < 2 {
        return None;
    }
    let line: Vec<Vec<f64>> = locations
        .iter()
        .map(|loc| vec![loc.longitude, loc.latitude])
        .collect();

    let mut properties = geojson::JsonObject::new();
    properties.insert("uuid".to_string(), Value::from(trip.uuid.clone()));
    properties.insert("rating".to_string(), Value::from(trip.rating.choice.raw()));
    properties.insert("length".to_string(), Value::from(trip.length));
    properties.insert(
        "start_date".to_string(),
        Value::from(format_utc_rfc3339(trip.start_date)),
    );
    properties.insert("display".to_string(), Value::from(trip.display_string(locale)));

    Some(geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::LineString(line))),
        id: Some(geojson::feature::Id::String(trip.uuid.clone())),
        properties: Some(properties),
        foreign_members: None,
    })
}

fn encode_route_polyline(locations: &[Location]) -> Result<String> {
    let coords = locations.iter().map(|loc| geo::Coord {
        x: loc.longitude,
        y: loc.latitude,
    });
    polyline::encode_coordinates(coords, POLYLINE_PRECISION)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Polyline encoding failed: {}", e)))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<TripDetail>> {
    let trip = state
        .trips
        .trip_with_uuid(&uuid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trip {uuid}")))?;
    let locations = state.trips.store().locations_for_trip(&trip.uuid).await?;

    let locale = &state.config.locale;
    Ok(Json(TripDetail {
        summary: TripSummary::from_trip(&trip, locale),
        full_display_string: trip.full_display_string(locale),
        weather: trip.weather_string(),
        calories: trip.calorie_string(),
        polyline: encode_route_polyline(&locations)?,
        locations: locations.iter().map(Location::json_dictionary).collect(),
        rewards: trip.rewards.iter().map(RewardView::from).collect(),
    }))
}

/// Upload a trip payload with its route. Bodies may be gzip-encoded.
async fn upload_trip(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<TripSummary>)> {
    let trip = state.trips.import_trip_json(&payload).await?;
    tracing::info!(profile = %user.profile_id, trip = %trip.uuid, "Trip uploaded");
    Ok((
        StatusCode::CREATED,
        Json(TripSummary::from_trip(&trip, &state.config.locale)),
    ))
}

async fn delete_trip(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uuid): Path<String>,
) -> Result<StatusCode> {
    tracing::info!(profile = %user.profile_id, trip = %uuid, "Trip deletion requested");
    state.trips.delete_trip(&uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_summary(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(summary): Json<Value>,
) -> Result<Json<TripSummary>> {
    let trip = state.trips.apply_summary(&uuid, &summary).await?;
    Ok(Json(TripSummary::from_trip(&trip, &state.config.locale)))
}

async fn put_push_summary(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(summary): Json<Value>,
) -> Result<Json<TripSummary>> {
    let trip = state.trips.apply_push_summary(&uuid, &summary).await?;
    Ok(Json(TripSummary::from_trip(&trip, &state.config.locale)))
}

#[derive(Deserialize, Validate)]
struct RatingRequest {
    /// 0 not set, 1 good, 2 bad, 3 mixed
    #[validate(range(min = 0, max = 3))]
    rating: i16,
}

async fn put_rating(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(request): Json<RatingRequest>,
) -> Result<Json<TripSummary>> {
    request.validate()?;
    let trip = state
        .trips
        .set_rating(&uuid, RatingChoice::from(request.rating))
        .await?;
    Ok(Json(TripSummary::from_trip(&trip, &state.config.locale)))
}

async fn post_activity(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(activity): Json<MotionActivity>,
) -> Result<StatusCode> {
    state.trips.record_activity(&uuid, activity).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_prediction_aggregator(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(payload): Json<Value>,
) -> Result<StatusCode> {
    let aggregator = PredictionAggregator::from_json(&payload)?;
    state
        .trips
        .add_prediction_aggregator(&uuid, aggregator)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Attach a sensor data collection. Bodies may be gzip-encoded.
async fn post_sensor_data(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<SensorDataResponse>)> {
    let collection =
        SensorDataCollection::from_json(&payload, CollectionOwner::Trip(uuid.clone()))?;
    let stored = state.trips.add_sensor_data(&uuid, collection).await?;
    tracing::debug!(trip = %uuid, collection = %stored.id, "Stored sensor data");
    Ok((
        StatusCode::CREATED,
        Json(SensorDataResponse {
            id: stored.id,
            trip_uuid: stored.owner.id().to_string(),
        }),
    ))
}

/// Weather at the start of the route, when a key is configured.
/// Lookup failures are logged and the trip is finalized without weather.
async fn start_weather(state: &AppState, uuid: &str) -> Result<Option<WeatherCondition>> {
    if !state.weather.is_configured() {
        return Ok(None);
    }
    let locations = state.trips.store().locations_for_trip(uuid).await?;
    let Some(start) = locations.first() else {
        return Ok(None);
    };
    match state.weather.current_conditions(&start.coordinate()).await {
        Ok(condition) => Ok(Some(condition)),
        Err(e) => {
            tracing::warn!(error = %e, trip = uuid, "Finalizing trip without weather");
            Ok(None)
        }
    }
}

async fn finalize_trip(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<TripSummary>> {
    let weather = start_weather(&state, &uuid).await?;
    let trip = state.trips.finalize_trip(&uuid, weather.as_ref()).await?;
    Ok(Json(TripSummary::from_trip(&trip, &state.config.locale)))
}

async fn promote_prototrip(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TripSummary>)> {
    let trip = state.trips.promote_prototrip(&id).await?;
    tracing::info!(profile = %user.profile_id, prototrip = %id, trip = %trip.uuid, "Prototrip promoted");
    Ok((
        StatusCode::CREATED,
        Json(TripSummary::from_trip(&trip, &state.config.locale)),
    ))
}

// ─── Locations & Stats ───────────────────────────────────────

#[derive(Deserialize, Validate)]
struct NearQuery {
    #[validate(range(min = -90.0, max = 90.0))]
    lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    lon: f64,
    /// Meters
    #[validate(range(min = 1.0, max = 50000.0))]
    #[serde(default = "default_radius")]
    radius: f64,
}

fn default_radius() -> f64 {
    100.0
}

/// Route locations from any trip within `radius` meters.
async fn locations_near(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearQuery>,
) -> Result<Json<LocationsResponse>> {
    params.validate()?;
    let center = Coordinate::new(params.lat, params.lon);
    let locations = state.trips.locations_near(center, params.radius).await?;

    Ok(Json(LocationsResponse {
        count: locations.len() as u32,
        locations: locations.iter().map(Location::json_dictionary).collect(),
    }))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<RideStats>> {
    Ok(Json(state.trips.stats(Utc::now()).await?))
}

// ─── Promotions ──────────────────────────────────────────────

async fn active_promotions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PromotionResponse>>> {
    let promotions = state.trips.active_promotions(Utc::now()).await?;
    Ok(Json(promotions.into_iter().map(Into::into).collect()))
}

#[derive(Deserialize)]
struct PromotionSyncRequest {
    promotions: Vec<Value>,
}

/// Replace the promotion set with the listed promotions.
async fn sync_promotions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PromotionSyncRequest>,
) -> Result<Json<Vec<PromotionResponse>>> {
    let promotions = state.trips.sync_promotions(&request.promotions).await?;
    Ok(Json(promotions.into_iter().map(Into::into).collect()))
}

async fn eligible_promotion(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<PromotionResponse>>> {
    let promotion = state.trips.eligible_promotion(Utc::now()).await?;
    Ok(Json(promotion.map(Into::into)))
}

async fn put_promotion(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<PromotionResponse>> {
    if !payload.is_object() {
        return Err(AppError::BadRequest("promotion must be an object".to_string()));
    }
    let promotion = state.trips.upsert_promotion(&uuid, &payload).await?;
    Ok(Json(promotion.into()))
}

async fn dismiss_promotion(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<PromotionResponse>> {
    let promotion = state.trips.dismiss_promotion(&uuid).await?;
    Ok(Json(promotion.into()))
}

// ─── Connected apps ──────────────────────────────────────────

async fn list_connected_apps(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConnectedApp>>> {
    Ok(Json(state.trips.connected_apps().await?))
}

#[derive(Deserialize)]
struct ConnectedAppSyncRequest {
    connected_apps: Vec<Value>,
}

/// Apps linked to the profile; apps not listed become disconnected.
async fn sync_connected_apps(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConnectedAppSyncRequest>,
) -> Result<Json<Vec<ConnectedApp>>> {
    Ok(Json(
        state.trips.sync_connected_apps(&request.connected_apps).await?,
    ))
}
