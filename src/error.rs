use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::io;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("missing required parameters: {}", .0.join(", "))]
    MissingParameter(Vec<&'static str>),

    #[error("speech sdk is not initialized; call initialize first")]
    NotInitialized,

    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("no recording session is active")]
    NotRecording,

    #[error("microphone permission is required")]
    PermissionRequired,

    #[error("speech sdk initialization failed with code {0}")]
    SdkInitFailed(i32),

    #[error("speech sdk {operation} failed with code {code}")]
    SdkOperationFailed { operation: &'static str, code: i32 },

    #[error("audio input initialization failed: {0}")]
    AudioInitFailed(String),

    #[error("recording failed: {0}")]
    RecordingFailed(String),
}

impl CaptureError {
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::MissingParameter(_) => "MISSING_PARAMETER",
            CaptureError::NotInitialized => "NOT_INITIALIZED",
            CaptureError::AlreadyRecording => "ALREADY_RECORDING",
            CaptureError::NotRecording => "NOT_RECORDING",
            CaptureError::PermissionRequired => "PERMISSION_REQUIRED",
            CaptureError::SdkInitFailed(_) => "SDK_INIT_FAILED",
            CaptureError::SdkOperationFailed { .. } => "SDK_OPERATION_FAILED",
            CaptureError::AudioInitFailed(_) => "AUDIO_INIT_FAILED",
            CaptureError::RecordingFailed(_) => "RECORDING_FAILED",
        }
    }
}

// Rejections cross the bridge as `{ code, message }`.
impl Serialize for CaptureError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CaptureError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no input microphone is available")]
    NoInputDevice,

    #[error("microphone not found for id {0}")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    DeviceEnumeration(String),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    StreamBuild(String),

    #[error("audio input stream closed")]
    StreamClosed,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} path has no parent directory")]
    NoParent(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("system clock is before the unix epoch")]
    Clock,
}
