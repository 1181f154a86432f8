use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_proto::PluginArgs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{args, decode, field, to_args};
use crate::error::{PluginError, PluginResult};
use crate::PluginClient;

const PLUGIN: &str = "camera";
const DEFAULT_PICK_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultType {
    Base64,
    #[default]
    Uri,
    DataUrl,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_editing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<ResultType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_to_gallery: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_orientation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_aspect_ratio: Option<bool>,
}

impl PhotoOptions {
    fn validate(&self) -> PluginResult<()> {
        if let Some(quality) = self.quality {
            if quality > 100 {
                return Err(PluginError::validation(
                    PLUGIN,
                    format!("quality must be between 0 and 100, got {quality}"),
                ));
            }
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(PluginError::validation(PLUGIN, "width and height must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawPhoto {
    data: Option<String>,
    format: Option<ResultType>,
    path: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    exif: Option<Value>,
}

/// A photo as reported by the shell. `data` holds the encoded image or, for
/// `uri` results, the file location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPhoto")]
pub struct CameraPhoto {
    pub data: String,
    pub format: ResultType,
    pub path: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub exif: Option<Value>,
}

impl From<RawPhoto> for CameraPhoto {
    fn from(raw: RawPhoto) -> Self {
        let data = raw.data.or_else(|| raw.path.clone()).unwrap_or_default();
        Self {
            data,
            format: raw.format.unwrap_or_default(),
            path: raw.path,
            width: raw.width,
            height: raw.height,
            exif: raw.exif,
        }
    }
}

impl CameraPhoto {
    pub fn dimensions(&self) -> (Option<u32>, Option<u32>) {
        (self.width, self.height)
    }

    /// Raw image bytes for inline results. `Ok(None)` for `uri` results, which
    /// only name a file on the device.
    pub fn decode_base64(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        let encoded = match self.format {
            ResultType::Uri => return Ok(None),
            ResultType::Base64 => self.data.as_str(),
            ResultType::DataUrl => self
                .data
                .split_once(";base64,")
                .map(|(_, payload)| payload)
                .unwrap_or(self.data.as_str()),
        };
        STANDARD.decode(encoded).map(Some)
    }
}

pub struct Camera<'a> {
    client: &'a PluginClient,
}

impl<'a> Camera<'a> {
    pub(crate) fn new(client: &'a PluginClient) -> Self {
        Self { client }
    }

    pub async fn take_photo(&self, options: &PhotoOptions) -> PluginResult<CameraPhoto> {
        options.validate()?;
        self.client
            .invoke_as(PLUGIN, "takePhoto", to_args(PLUGIN, options)?)
            .await
    }

    pub async fn pick_photo(&self, options: &PhotoOptions) -> PluginResult<CameraPhoto> {
        options.validate()?;
        self.client
            .invoke_as(PLUGIN, "pickPhoto", to_args(PLUGIN, options)?)
            .await
    }

    /// Picks up to `limit` photos from the gallery; `None` uses the shell default of 10.
    pub async fn pick_multiple_photos(&self, limit: Option<u32>) -> PluginResult<Vec<CameraPhoto>> {
        let limit = limit.unwrap_or(DEFAULT_PICK_LIMIT);
        if limit == 0 {
            return Err(PluginError::validation(PLUGIN, "limit must be at least 1"));
        }
        let result = self
            .client
            .invoke(PLUGIN, "pickMultiplePhotos", args([("limit", json!(limit))]))
            .await?;
        match field(&result, "photos") {
            Some(photos) => decode(PLUGIN, photos),
            None => Ok(Vec::new()),
        }
    }

    pub async fn request_permissions(&self) -> PluginResult<PluginArgs> {
        self.client.request_permissions(PLUGIN).await
    }

    pub async fn check_permissions(&self) -> PluginResult<PluginArgs> {
        self.client.check_permissions(PLUGIN).await
    }
}
