use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_ENDPOINT_URL: &str = "wss://nls-gateway.cn-shanghai.aliyuncs.com:443/ws/v1";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceMode {
    FullMix,
    FullCloud,
    FullLocal,
    AsrMix,
    AsrCloud,
    AsrLocal,
}

impl ServiceMode {
    pub fn code(self) -> i32 {
        match self {
            ServiceMode::FullMix => 0,
            ServiceMode::FullCloud => 1,
            ServiceMode::FullLocal => 2,
            ServiceMode::AsrMix => 3,
            ServiceMode::AsrCloud => 4,
            ServiceMode::AsrLocal => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VadMode {
    Vad,
    PushToTalk,
}

impl VadMode {
    pub fn code(self) -> i32 {
        match self {
            VadMode::Vad => 0,
            VadMode::PushToTalk => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SdkLogLevel {
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
    None,
}

impl SdkLogLevel {
    pub fn code(self) -> i32 {
        match self {
            SdkLogLevel::Verbose => 0,
            SdkLogLevel::Debug => 1,
            SdkLogLevel::Info => 2,
            SdkLogLevel::Warning => 3,
            SdkLogLevel::Error => 4,
            SdkLogLevel::None => 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureSettings {
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    #[serde(default = "default_service_mode")]
    pub service_mode: ServiceMode,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_vad_mode")]
    pub vad_mode: VadMode,
    #[serde(default = "default_sdk_log_level")]
    pub sdk_log_level: SdkLogLevel,
    #[serde(default = "default_save_sdk_log")]
    pub save_sdk_log: bool,
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    #[serde(default)]
    pub microphone_id: Option<String>,
    #[serde(default)]
    pub debug_wav_dir: Option<PathBuf>,
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.to_string()
}

fn default_service_mode() -> ServiceMode {
    ServiceMode::FullCloud
}

fn default_vad_mode() -> VadMode {
    VadMode::PushToTalk
}

fn default_sdk_log_level() -> SdkLogLevel {
    SdkLogLevel::Verbose
}

fn default_save_sdk_log() -> bool {
    true
}

fn default_sample_rate_hz() -> u32 {
    crate::audio::SAMPLE_RATE_HZ
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            service_mode: default_service_mode(),
            device_id: None,
            vad_mode: default_vad_mode(),
            sdk_log_level: default_sdk_log_level(),
            save_sdk_log: default_save_sdk_log(),
            sample_rate_hz: default_sample_rate_hz(),
            microphone_id: None,
            debug_wav_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_full_cloud_push_to_talk() {
        let settings = CaptureSettings::default();
        assert_eq!(settings.endpoint_url, DEFAULT_ENDPOINT_URL);
        assert_eq!(settings.service_mode.code(), 1);
        assert_eq!(settings.vad_mode.code(), 1);
        assert_eq!(settings.sdk_log_level, SdkLogLevel::Verbose);
        assert!(settings.save_sdk_log);
        assert_eq!(settings.sample_rate_hz, 16_000);
        assert!(settings.device_id.is_none());
        assert!(settings.microphone_id.is_none());
        assert!(settings.debug_wav_dir.is_none());
    }

    #[test]
    fn sparse_settings_payload_deserializes_to_defaults() {
        let json = r#"{
  "endpoint_url": "wss://example.invalid/ws/v1",
  "microphone_id": "1"
}"#;

        let parsed: CaptureSettings =
            serde_json::from_str(json).expect("sparse settings payload should deserialize");
        assert_eq!(parsed.endpoint_url, "wss://example.invalid/ws/v1");
        assert_eq!(parsed.microphone_id.as_deref(), Some("1"));
        assert_eq!(parsed.service_mode, ServiceMode::FullCloud);
        assert_eq!(parsed.vad_mode, VadMode::PushToTalk);
        assert_eq!(parsed.sample_rate_hz, 16_000);
    }
}
