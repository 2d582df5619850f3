// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recorded trips, their server summaries and rewards.

use crate::models::{json_str, ActivityType, Coordinate, Location, ModelError, Rating, RatingVersion};
use crate::text::{contains_unsupported_emoji, DefaultEmojiSupport, EmojiSupport};
use crate::time_utils::parse_json_date;
use crate::units::{distance_string, UnitLocale};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// A reward earned on a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripReward {
    pub emoji: String,
    pub description_text: String,
    #[serde(default)]
    pub reward_uuid: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub earned_at: Option<Coordinate>,
}

impl TripReward {
    pub fn new(emoji: impl Into<String>, description_text: impl Into<String>) -> Self {
        Self {
            emoji: emoji.into(),
            description_text: description_text.into(),
            reward_uuid: None,
            icon_url: None,
            earned_at: None,
        }
    }

    /// Parse a reward dictionary. `earned_at_coordinate` is `[longitude, latitude]`.
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let description = json_str(value, "description")?;
        let emoji = json_str(value, "emoji")?;
        let mut reward = Self::new(emoji, description);

        let reward_uuid = value.get("reward_uuid").and_then(Value::as_str);
        let icon_url = value.get("icon_url").and_then(Value::as_str);
        if let (Some(reward_uuid), Some(icon_url)) = (reward_uuid, icon_url) {
            reward.reward_uuid = Some(reward_uuid.to_string());
            reward.icon_url = Some(icon_url.to_string());
        }

        if let Some([lon, lat]) = value
            .get("earned_at_coordinate")
            .and_then(Value::as_array)
            .map(|coords| coords.iter().filter_map(Value::as_f64).collect::<Vec<_>>())
            .as_deref()
        {
            reward.earned_at = Some(Coordinate::new(*lat, *lon));
        }

        Ok(reward)
    }

    /// Rewards redeemable in a connected app carry an icon instead of an emoji.
    pub fn has_icon(&self) -> bool {
        self.reward_uuid.is_some() && self.icon_url.is_some()
    }

    /// An emoji the renderer can always draw for this reward.
    pub fn display_safe_emoji(&self, support: &dyn EmojiSupport) -> &str {
        if self.has_icon() {
            "💵"
        } else if self.emoji.is_empty() || contains_unsupported_emoji(&self.emoji, support) {
            "🏆"
        } else {
            &self.emoji
        }
    }

    /// Reward entry in a local notification payload.
    pub fn notification_dictionary(&self) -> Value {
        json!({
            "reward_uuid": self.reward_uuid,
            "emoji": self.display_safe_emoji(&DefaultEmojiSupport),
            "description": self.description_text,
        })
    }
}

/// A recorded trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub uuid: String,
    pub creation_date: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub activity_type: ActivityType,
    pub rating: Rating,
    /// Meters.
    pub length: f64,
    #[serde(default)]
    pub climacon: Option<String>,
    /// Degrees Fahrenheit.
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub starting_placemark_name: Option<String>,
    #[serde(default)]
    pub ending_placemark_name: Option<String>,
    #[serde(default)]
    pub has_smoothed: bool,
    #[serde(default)]
    pub is_synced: bool,
    #[serde(default)]
    pub are_locations_synced: bool,
    #[serde(default)]
    pub are_locations_not_yet_downloaded: bool,
    #[serde(default)]
    pub is_summary_synced: bool,
    #[serde(default)]
    pub is_saved_to_health_kit: bool,
    #[serde(default)]
    pub health_kit_uuid: Option<String>,
    #[serde(default)]
    pub display_data_url: Option<String>,
    #[serde(default)]
    pub calories_burned: f64,
    #[serde(default)]
    pub rewards: Vec<TripReward>,
}

impl Trip {
    pub fn new(uuid: impl Into<String>, start_date: DateTime<Utc>) -> Self {
        Self {
            uuid: uuid.into(),
            creation_date: start_date,
            start_date,
            end_date: start_date,
            activity_type: ActivityType::Unknown,
            rating: Rating::default(),
            length: 0.0,
            climacon: None,
            temperature: None,
            starting_placemark_name: None,
            ending_placemark_name: None,
            has_smoothed: false,
            is_synced: false,
            are_locations_synced: false,
            are_locations_not_yet_downloaded: false,
            is_summary_synced: false,
            is_saved_to_health_kit: false,
            health_kit_uuid: None,
            display_data_url: None,
            calories_burned: 0.0,
            rewards: Vec::new(),
        }
    }

    /// Build a trip from an uploaded payload: `uuid` and `startDate` plus
    /// everything [`Trip::load_from_json`] reads.
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        let uuid = json_str(value, "uuid")?;
        if uuid.trim().is_empty() {
            return Err(ModelError::MissingField("uuid"));
        }
        let start_raw = json_str(value, "startDate")?;
        let start_date =
            parse_json_date(start_raw).ok_or_else(|| ModelError::InvalidDate(start_raw.to_string()))?;

        let mut trip = Self::new(uuid, start_date);
        trip.load_from_json(value)?;
        Ok(trip)
    }

    /// Seconds between start and end.
    pub fn duration(&self) -> f64 {
        (self.start_date - self.end_date).num_milliseconds().abs() as f64 / 1000.0
    }

    /// Apply a server trip payload.
    ///
    /// `activityType`, `rating` and `length` are required together. Servers
    /// that predate rating versions omit `ratingVersion`, which means V1.
    pub fn load_from_json(&mut self, value: &Value) -> Result<(), ModelError> {
        let activity_raw = value
            .get("activityType")
            .and_then(Value::as_i64)
            .ok_or(ModelError::MissingField("activityType"))?;
        let activity_type = ActivityType::ALL
            .into_iter()
            .find(|t| i64::from(t.raw()) == activity_raw)
            .ok_or(ModelError::MissingField("activityType"))?;
        let rating_raw = value
            .get("rating")
            .and_then(Value::as_i64)
            .ok_or(ModelError::MissingField("rating"))?;
        let length = value
            .get("length")
            .and_then(Value::as_f64)
            .ok_or(ModelError::MissingField("length"))?;
        let version_raw = value
            .get("ratingVersion")
            .and_then(Value::as_i64)
            .unwrap_or(i64::from(RatingVersion::V1.raw()));

        let date = |key: &'static str| -> Result<Option<DateTime<Utc>>, ModelError> {
            match value.get(key).and_then(Value::as_str) {
                Some(raw) => parse_json_date(raw)
                    .map(Some)
                    .ok_or_else(|| ModelError::InvalidDate(raw.to_string())),
                None => Ok(None),
            }
        };
        let start_date = date("startDate")?;
        let end_date = date("endDate")?;

        self.rating = Rating::from_raw(rating_raw, version_raw, RatingVersion::V1);
        self.activity_type = activity_type;
        self.length = length;
        if let Some(start) = start_date {
            self.start_date = start;
        }
        if let Some(end) = end_date {
            self.end_date = end;
        }
        if let Some(url) = value.get("displayDataURL").and_then(Value::as_str) {
            self.display_data_url = Some(url.to_string());
        }
        if let Some(summary) = value.get("summary").filter(|s| s.is_object()) {
            self.load_summary_from_json(summary);
        }
        Ok(())
    }

    /// Apply a trip summary returned by the server.
    pub fn load_summary_from_json(&mut self, summary: &Value) {
        if let Some(ready) = summary.get("ready").and_then(Value::as_bool) {
            self.is_summary_synced = ready;
        }
        self.temperature = summary
            .get("temperature")
            .and_then(Value::as_i64)
            .map(|t| t as f64);
        self.apply_summary_fields(summary);
    }

    /// Apply a summary delivered in a push payload. Push summaries are final.
    pub fn load_summary_from_push(&mut self, summary: &Value) {
        self.is_summary_synced = true;
        self.temperature = summary.get("temperature").and_then(Value::as_f64);
        self.apply_summary_fields(summary);
    }

    fn apply_summary_fields(&mut self, summary: &Value) {
        let string = |key: &str| summary.get(key).and_then(Value::as_str);

        if let Some(climacon) = string("weatherEmoji") {
            self.climacon = Some(climacon.to_string());
        }
        if let Some(name) = string("startPlaceName") {
            self.starting_placemark_name = Some(name.to_string());
        }
        if let Some(name) = string("endPlaceName") {
            self.ending_placemark_name = Some(name.to_string());
        }

        self.rewards.clear();
        match (string("rewardEmoji"), string("rewardDescription")) {
            (Some(emoji), Some(description)) if !emoji.is_empty() && !description.is_empty() => {
                self.rewards.push(TripReward::new(emoji, description));
            }
            _ => {
                if let Some(rewards) = summary.get("rewards").and_then(Value::as_array) {
                    self.rewards
                        .extend(rewards.iter().filter_map(|r| TripReward::from_json(r).ok()));
                }
            }
        }
    }

    /// Total haversine length of a route in meters.
    pub fn length_from_locations(locations: &[Location]) -> f64 {
        locations
            .windows(2)
            .map(|pair| pair[0].distance_to(&pair[1]))
            .sum()
    }

    pub fn area_description(&self) -> String {
        match (
            self.starting_placemark_name.as_deref(),
            self.ending_placemark_name.as_deref(),
        ) {
            (Some(start), Some(end)) if start == end => format!("in {start}"),
            (Some(start), Some(end)) => format!("from {start} to {end}"),
            (Some(start), None) => format!("from {start}"),
            (None, Some(end)) => format!("to {end}"),
            (None, None) => String::new(),
        }
    }

    /// Area description with a leading space, or nothing.
    fn area_suffix(&self) -> String {
        let area = self.area_description();
        if area.is_empty() {
            area
        } else {
            format!(" {area}")
        }
    }

    fn climacon_str(&self) -> &str {
        self.climacon.as_deref().unwrap_or_default()
    }

    fn distance(&self, locale: &UnitLocale) -> String {
        distance_string(self.length, locale, false)
    }

    /// Body of the ride-completion notification.
    pub fn notification_string(&self, locale: &UnitLocale) -> String {
        let mut message = format!(
            "{} {} {}{}.",
            self.climacon_str(),
            self.activity_type.emoji(),
            self.distance(locale),
            self.area_suffix()
        );

        if let Some(reward) = self.rewards.first() {
            message.push(' ');
            message.push_str(reward.display_safe_emoji(&DefaultEmojiSupport));
            message.push(' ');
            message.push_str(&reward.description_text);
        }

        if self.rewards.len() > 1 {
            let count = match self.rewards.len() {
                2 => "2️⃣".to_string(),
                3 => "3️⃣".to_string(),
                4 => "4️⃣".to_string(),
                5 => "5️⃣".to_string(),
                6 => "6️⃣".to_string(),
                7 => "7️⃣".to_string(),
                8 => "8️⃣".to_string(),
                9 => "9️⃣".to_string(),
                10 => "🔟".to_string(),
                n => n.to_string(),
            };
            message.push_str(&format!(" ❎{count} combo!"));
        }

        message
    }

    /// Payload attached to the ride-completion notification.
    pub fn notification_user_info<Tz>(&self, tz: &Tz) -> Value
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let rewards: Vec<Value> = self
            .rewards
            .iter()
            .map(TripReward::notification_dictionary)
            .collect();
        json!({
            "uuid": self.uuid,
            "description": self.display_string_with_time(tz),
            "length": self.length,
            "rewards": rewards,
        })
    }

    pub fn display_string(&self, locale: &UnitLocale) -> String {
        format!("{}{}.", self.distance(locale), self.area_suffix())
    }

    pub fn display_string_with_time<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        format!("{}{}.", self.time_string(tz), self.area_suffix())
    }

    pub fn full_display_string(&self, locale: &UnitLocale) -> String {
        let mut description = format!(
            "{} {}{}.",
            self.climacon_str(),
            self.distance(locale),
            self.area_suffix()
        );
        for reward in &self.rewards {
            description.push_str("\n\n");
            description.push_str(reward.display_safe_emoji(&DefaultEmojiSupport));
            description.push(' ');
            description.push_str(&reward.description_text);
        }
        description
    }

    pub fn share_string(&self, locale: &UnitLocale) -> String {
        format!(
            "{} {} Rode {}{} with @RideReportApp!",
            self.climacon_str(),
            self.activity_type.emoji(),
            self.distance(locale),
            self.area_suffix()
        )
    }

    pub fn weather_string(&self) -> String {
        let temperature = self
            .temperature
            .map(|t| format!("{t:.0}°F"))
            .unwrap_or_default();
        format!("{}{}", self.climacon_str(), temperature)
    }

    pub fn calorie_string(&self) -> String {
        format!("{:.0}cal", self.calories_burned)
    }

    /// Start time as `h:mma` with lowercase am/pm, e.g. `8:05am`.
    pub fn time_string<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        self.start_date
            .with_timezone(tz)
            .format("%-I:%M%P")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LocationSource, RatingChoice};
    use chrono::FixedOffset;

    fn bike_trip() -> Trip {
        let start = Utc.with_ymd_and_hms(2017, 6, 1, 15, 5, 0).unwrap();
        let mut trip = Trip::new("TRIP-1", start);
        trip.end_date = start + chrono::Duration::minutes(12);
        trip.activity_type = ActivityType::Cycling;
        trip.length = 2414.0;
        trip
    }

    fn en_us() -> UnitLocale {
        UnitLocale::parse("en_US")
    }

    #[test]
    fn test_notification_string_without_extras() {
        let trip = bike_trip();
        assert_eq!(trip.notification_string(&en_us()), " 🚲 1.5 miles.");
    }

    #[test]
    fn test_notification_string_with_rewards() {
        let mut trip = bike_trip();
        trip.climacon = Some("☀️".into());
        trip.starting_placemark_name = Some("Downtown".into());
        trip.ending_placemark_name = Some("Downtown".into());
        trip.rewards.push(TripReward::new("🏅", "Early bird"));

        assert_eq!(
            trip.notification_string(&en_us()),
            "☀️ 🚲 1.5 miles in Downtown. 🏅 Early bird"
        );

        trip.rewards.push(TripReward::new("🩰", "Dancer"));
        assert_eq!(
            trip.notification_string(&en_us()),
            "☀️ 🚲 1.5 miles in Downtown. 🏅 Early bird ❎2️⃣ combo!"
        );
        assert_eq!(
            trip.full_display_string(&en_us()),
            "☀️ 1.5 miles in Downtown.\n\n🏅 Early bird\n\n🏆 Dancer"
        );

        for i in 0..10 {
            trip.rewards.push(TripReward::new("⭐", format!("Star {i}")));
        }
        assert!(trip.notification_string(&en_us()).ends_with(" ❎12 combo!"));
    }

    #[test]
    fn test_area_description() {
        let mut trip = bike_trip();
        assert_eq!(trip.area_description(), "");
        trip.starting_placemark_name = Some("Pearl".into());
        assert_eq!(trip.area_description(), "from Pearl");
        trip.ending_placemark_name = Some("Alberta".into());
        assert_eq!(trip.area_description(), "from Pearl to Alberta");
        assert_eq!(trip.display_string(&en_us()), "1.5 miles from Pearl to Alberta.");
        trip.starting_placemark_name = None;
        assert_eq!(trip.area_description(), "to Alberta");
        assert_eq!(
            trip.share_string(&en_us()),
            " 🚲 Rode 1.5 miles to Alberta with @RideReportApp!"
        );
    }

    #[test]
    fn test_time_and_weather_strings() {
        let mut trip = bike_trip();
        let pacific = FixedOffset::west_opt(7 * 3600).unwrap();
        assert_eq!(trip.time_string(&pacific), "8:05am");
        assert_eq!(trip.display_string_with_time(&Utc), "3:05pm.");

        assert_eq!(trip.weather_string(), "");
        trip.climacon = Some("🌧".into());
        trip.temperature = Some(54.4);
        assert_eq!(trip.weather_string(), "🌧54°F");

        trip.calories_burned = 212.6;
        assert_eq!(trip.calorie_string(), "213cal");
        assert_eq!(trip.duration(), 720.0);
    }

    #[test]
    fn test_load_from_json() {
        let mut trip = bike_trip();
        trip.rewards.push(TripReward::new("🐢", "stale"));
        trip.load_from_json(&json!({
            "activityType": 5,
            "rating": 2,
            "length": 5000.5,
            "displayDataURL": "https://example.com/trip.json",
            "summary": {
                "ready": true,
                "weatherEmoji": "⛅️",
                "temperature": 61,
                "startPlaceName": "Home",
                "endPlaceName": "Work",
                "rewards": [
                    {"description": "Rain rider", "emoji": "☔️", "earned_at_coordinate": [-122.6, 45.5]},
                    {"description": "Coffee", "emoji": "☕️", "reward_uuid": "r-1", "icon_url": "https://example.com/i.png"},
                    {"emoji": "no description"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(trip.activity_type, ActivityType::Bus);
        assert_eq!(trip.rating.choice, RatingChoice::Bad);
        assert_eq!(trip.rating.version, RatingVersion::V1);
        assert_eq!(trip.length, 5000.5);
        assert!(trip.is_summary_synced);
        assert_eq!(trip.temperature, Some(61.0));
        assert_eq!(trip.rewards.len(), 2);
        assert_eq!(
            trip.rewards[0].earned_at,
            Some(Coordinate::new(45.5, -122.6))
        );
        assert_eq!(trip.rewards[1].display_safe_emoji(&DefaultEmojiSupport), "💵");
    }

    #[test]
    fn test_load_from_json_requires_classification() {
        let mut trip = bike_trip();
        let err = trip
            .load_from_json(&json!({"activityType": 2, "length": 10.0}))
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingField("rating")));
        assert_eq!(trip.length, 2414.0);

        assert!(trip
            .load_from_json(&json!({"activityType": 42, "rating": 0, "length": 1.0}))
            .is_err());
    }

    #[test]
    fn test_load_from_json_out_of_range_integers() {
        let mut trip = bike_trip();
        trip.load_from_json(&json!({
            "activityType": 2,
            "rating": 65537,
            "ratingVersion": 65536,
            "length": 10.0
        }))
        .unwrap();
        assert_eq!(trip.rating.choice, RatingChoice::NotSet);
        assert_eq!(trip.rating.version, RatingVersion::V1);

        // 65538 would truncate to Cycling
        let err = trip
            .load_from_json(&json!({"activityType": 65538, "rating": 1, "length": 99.0}))
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingField("activityType")));
        assert_eq!(trip.length, 10.0);
        assert_eq!(trip.rating.choice, RatingChoice::NotSet);
    }

    #[test]
    fn test_summary_single_reward_replaces_list() {
        let mut trip = bike_trip();
        trip.temperature = Some(70.0);
        trip.load_summary_from_json(&json!({
            "rewardEmoji": "🎉",
            "rewardDescription": "First ride!",
            "rewards": [{"description": "ignored", "emoji": "x"}]
        }));

        assert_eq!(trip.rewards, vec![TripReward::new("🎉", "First ride!")]);
        assert_eq!(trip.temperature, None);
        assert!(!trip.is_summary_synced);

        trip.load_summary_from_push(&json!({"temperature": 48.7, "rewardEmoji": "", "rewardDescription": "x"}));
        assert!(trip.is_summary_synced);
        assert_eq!(trip.temperature, Some(48.7));
        assert!(trip.rewards.is_empty());
    }

    #[test]
    fn test_from_json_requires_identity() {
        let payload = json!({
            "uuid": "abc",
            "startDate": "2017-06-01 15:05:00+0000",
            "activityType": 2,
            "rating": 1,
            "ratingVersion": 1,
            "length": 800.0
        });
        let trip = Trip::from_json(&payload).unwrap();
        assert_eq!(trip.uuid, "abc");
        assert_eq!(trip.rating, Rating::new(RatingChoice::Good, RatingVersion::V2Beta));

        assert!(Trip::from_json(&json!({"uuid": " ", "startDate": "2017-06-01 15:05:00+0000"})).is_err());
    }

    #[test]
    fn test_length_from_locations() {
        let start = Utc.with_ymd_and_hms(2017, 6, 1, 15, 5, 0).unwrap();
        let fix = |lat: f64, secs: i64| Location {
            date: start + chrono::Duration::seconds(secs),
            latitude: lat,
            longitude: -122.6,
            altitude: 0.0,
            course: 0.0,
            speed: 5.0,
            horizontal_accuracy: 5.0,
            vertical_accuracy: 5.0,
            source: LocationSource::ActiveGps,
        };
        let route = vec![fix(45.50, 0), fix(45.51, 60), fix(45.52, 120)];

        let length = Trip::length_from_locations(&route);
        assert!((length - 2223.9).abs() < 5.0, "length was {length}");
        assert_eq!(Trip::length_from_locations(&route[..1]), 0.0);
    }
}
