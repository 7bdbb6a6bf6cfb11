use crate::config::{CaptureSettings, SdkLogLevel, ServiceMode, VadMode};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureSettingsPatch {
    pub endpoint_url: Option<String>,
    pub service_mode: Option<ServiceMode>,
    pub device_id: Option<Option<String>>,
    pub vad_mode: Option<VadMode>,
    pub sdk_log_level: Option<SdkLogLevel>,
    pub save_sdk_log: Option<bool>,
    pub microphone_id: Option<Option<String>>,
    pub debug_wav_dir: Option<Option<PathBuf>>,
}

pub fn default_settings_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("speech-capture").join("settings.json")
}

pub fn load_or_default(path: &Path) -> CaptureSettings {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str::<CaptureSettings>(&contents).unwrap_or_default(),
        Err(_) => CaptureSettings::default(),
    }
}

pub fn save(path: &Path, settings: &CaptureSettings) -> Result<(), StoreError> {
    let parent = path.parent().ok_or(StoreError::NoParent("settings"))?;
    fs::create_dir_all(parent)?;
    let contents = serde_json::to_string_pretty(settings)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn apply_patch(settings: &CaptureSettings, patch: CaptureSettingsPatch) -> CaptureSettings {
    CaptureSettings {
        endpoint_url: patch
            .endpoint_url
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| settings.endpoint_url.clone()),
        service_mode: patch.service_mode.unwrap_or(settings.service_mode),
        device_id: patch
            .device_id
            .map(normalize_optional)
            .unwrap_or_else(|| settings.device_id.clone()),
        vad_mode: patch.vad_mode.unwrap_or(settings.vad_mode),
        sdk_log_level: patch.sdk_log_level.unwrap_or(settings.sdk_log_level),
        save_sdk_log: patch.save_sdk_log.unwrap_or(settings.save_sdk_log),
        sample_rate_hz: settings.sample_rate_hz,
        microphone_id: patch
            .microphone_id
            .map(normalize_optional)
            .unwrap_or_else(|| settings.microphone_id.clone()),
        debug_wav_dir: patch
            .debug_wav_dir
            .map(|value| value.filter(|path| !path.as_os_str().is_empty()))
            .unwrap_or_else(|| settings.debug_wav_dir.clone()),
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
