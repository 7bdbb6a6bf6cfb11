use crate::audio::SAMPLE_RATE_HZ;
use crate::config::CaptureSettings;
use crate::error::CaptureError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SERVICE_TYPE_SPEECH_TRANSCRIBER: i32 = 4;
pub const DEFAULT_AUDIO_FORMAT: &str = "pcm";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitializeOptions {
    pub appkey: Option<String>,
    pub token: Option<String>,
    pub workspace: Option<String>,
}

impl InitializeOptions {
    pub fn new(appkey: &str, token: &str, workspace: &str) -> Self {
        Self {
            appkey: Some(appkey.to_string()),
            token: Some(token.to_string()),
            workspace: Some(workspace.to_string()),
        }
    }

    pub fn validate(&self) -> Result<Credentials, CaptureError> {
        let fields = [
            ("appkey", &self.appkey),
            ("token", &self.token),
            ("workspace", &self.workspace),
        ];
        let missing = fields
            .iter()
            .filter(|(_, value)| {
                value
                    .as_deref()
                    .map(|raw| raw.trim().is_empty())
                    .unwrap_or(true)
            })
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(CaptureError::MissingParameter(missing));
        }

        Ok(Credentials {
            appkey: trimmed(&self.appkey),
            token: trimmed(&self.token),
            workspace: trimmed(&self.workspace),
        })
    }
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().unwrap_or_default().trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub appkey: String,
    pub token: String,
    pub workspace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
    pub sample_rate: Option<u32>,
    pub format: Option<String>,
    pub enable_intermediate_result: Option<bool>,
    pub enable_punctuation_prediction: Option<bool>,
    pub enable_inverse_text_normalization: Option<bool>,
}

pub fn build_init_params(
    credentials: &Credentials,
    settings: &CaptureSettings,
    device_id: &str,
) -> String {
    json!({
        "appkey": credentials.appkey,
        "token": credentials.token,
        "device_id": device_id,
        "url": settings.endpoint_url,
        "workspace": credentials.workspace,
        "service_mode": settings.service_mode.code(),
    })
    .to_string()
}

pub fn build_recognition_params(options: &RecordingOptions) -> String {
    json!({
        "nls_config": {
            "sample_rate": options.sample_rate.unwrap_or(SAMPLE_RATE_HZ),
            "sr_format": options.format.as_deref().unwrap_or(DEFAULT_AUDIO_FORMAT),
            "enable_intermediate_result": options.enable_intermediate_result.unwrap_or(true),
            "enable_punctuation_prediction": options.enable_punctuation_prediction.unwrap_or(true),
            "enable_inverse_text_normalization": options
                .enable_inverse_text_normalization
                .unwrap_or(true),
        },
        "service_type": SERVICE_TYPE_SPEECH_TRANSCRIBER,
    })
    .to_string()
}

pub fn build_dialog_params(credentials: &Credentials) -> String {
    json!({ "token": credentials.token }).to_string()
}

pub fn resolve_device_id(settings: &CaptureSettings) -> String {
    if let Some(device_id) = settings.device_id.as_deref() {
        return device_id.to_string();
    }
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    format!("speech_capture_{millis}")
}
