use std::fmt;

use bridge_proto::PluginArgs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{args, field, to_args};
use crate::error::{PluginError, PluginResult};
use crate::PluginClient;

const PLUGIN: &str = "geolocation";
const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_high_accuracy: Option<bool>,
    /// Milliseconds the shell may spend acquiring a fix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_age: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Coords {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
    #[serde(default)]
    accuracy: f64,
    altitude: Option<f64>,
    altitude_accuracy: Option<f64>,
    heading: Option<f64>,
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    coords: Option<Coords>,
    timestamp: Option<i64>,
    #[serde(flatten)]
    flat: Coords,
}

/// A location fix. Shells report either `{coords: {...}, timestamp}` or the
/// coordinate fields at the top level; both decode to the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawPosition")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub altitude_accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    /// Unix milliseconds; absent when the shell did not report one.
    pub timestamp: Option<i64>,
}

impl From<RawPosition> for Position {
    fn from(raw: RawPosition) -> Self {
        let coords = raw.coords.unwrap_or(raw.flat);
        Self {
            latitude: coords.latitude,
            longitude: coords.longitude,
            accuracy: coords.accuracy,
            altitude: coords.altitude,
            altitude_accuracy: coords.altitude_accuracy,
            heading: coords.heading,
            speed: coords.speed,
            timestamp: raw.timestamp,
        }
    }
}

impl Position {
    /// Great-circle distance in metres (haversine).
    pub fn distance_to(&self, other: &Position) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    pub fn maps_url(&self) -> String {
        format!(
            "https://www.google.com/maps?q={:.6},{:.6}",
            self.latitude, self.longitude
        )
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

pub struct Geolocation<'a> {
    client: &'a PluginClient,
}

impl<'a> Geolocation<'a> {
    pub(crate) fn new(client: &'a PluginClient) -> Self {
        Self { client }
    }

    pub async fn current_position(&self, options: &PositionOptions) -> PluginResult<Position> {
        self.client
            .invoke_as(PLUGIN, "getCurrentPosition", to_args(PLUGIN, options)?)
            .await
    }

    /// Starts a watch on the shell and returns its id.
    pub async fn watch_position(&self, options: &PositionOptions) -> PluginResult<String> {
        let result = self
            .client
            .invoke(PLUGIN, "watchPosition", to_args(PLUGIN, options)?)
            .await?;
        match field(&result, "id") {
            Some(Value::String(id)) => Ok(id),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(PluginError::Execution {
                plugin: PLUGIN.to_string(),
                command: "watchPosition".to_string(),
                message: "shell did not return a watch id".to_string(),
            }),
        }
    }

    pub async fn clear_watch(&self, watch_id: &str) -> PluginResult<Value> {
        if watch_id.is_empty() {
            return Err(PluginError::validation(PLUGIN, "watch id must not be empty"));
        }
        self.client
            .invoke(PLUGIN, "clearWatch", args([("id", json!(watch_id))]))
            .await
    }

    pub async fn is_location_enabled(&self) -> PluginResult<bool> {
        let result = self
            .client
            .invoke(PLUGIN, "isLocationEnabled", PluginArgs::new())
            .await?;
        Ok(field(&result, "enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    pub async fn open_location_settings(&self) -> PluginResult<Value> {
        self.client
            .invoke(PLUGIN, "openLocationSettings", PluginArgs::new())
            .await
    }

    pub async fn request_permissions(&self) -> PluginResult<PluginArgs> {
        self.client.request_permissions(PLUGIN).await
    }

    pub async fn check_permissions(&self) -> PluginResult<PluginArgs> {
        self.client.check_permissions(PLUGIN).await
    }
}
