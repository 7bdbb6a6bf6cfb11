use crate::config::{SdkLogLevel, VadMode};
use crossbeam_channel::{bounded, Sender};
use serde::Deserialize;

pub const SUCCESS: i32 = 0;

// Listener callbacks may arrive from inside any of these calls. stop_dialog in
// particular may pull audio before it returns, so it is never called from the
// thread that answers those pulls.
pub trait RecognitionSdk: Send + Sync {
    fn initialize(
        &self,
        params: &str,
        listener: SdkListener,
        log_level: SdkLogLevel,
        save_log: bool,
    ) -> i32;

    fn set_params(&self, params: &str) -> i32;

    fn start_dialog(&self, vad_mode: VadMode, dialog_params: &str) -> i32;

    fn stop_dialog(&self) -> i32;

    fn release(&self) -> i32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    Open,
    Pause,
    Close,
}

impl AudioState {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AudioState::Open),
            1 => Some(AudioState::Pause),
            2 => Some(AudioState::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NuiEvent {
    VadStart,
    VadEnd,
    AsrPartialResult,
    AsrResult,
    AsrError,
    DialogError,
    MicError,
    SentenceStart,
    SentenceEnd,
    TranscriberComplete,
    TranscriberStarted,
    Other(i32),
}

impl NuiEvent {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => NuiEvent::VadStart,
            2 => NuiEvent::VadEnd,
            8 => NuiEvent::AsrPartialResult,
            9 => NuiEvent::AsrResult,
            10 => NuiEvent::AsrError,
            11 => NuiEvent::DialogError,
            19 => NuiEvent::MicError,
            23 => NuiEvent::SentenceStart,
            24 => NuiEvent::SentenceEnd,
            27 => NuiEvent::TranscriberComplete,
            32 => NuiEvent::TranscriberStarted,
            other => NuiEvent::Other(other),
        }
    }
}

#[derive(Debug)]
pub enum SdkMessage {
    AudioStateChanged(AudioState),
    NeedAudioData { len: usize, reply: Sender<Vec<u8>> },
    Event {
        event: NuiEvent,
        code: i32,
        asr_result: Option<String>,
    },
    RmsChanged(f32),
}

#[derive(Debug, Clone)]
pub struct SdkListener {
    tx: Sender<SdkMessage>,
}

impl SdkListener {
    pub fn new(tx: Sender<SdkMessage>) -> Self {
        Self { tx }
    }

    pub fn audio_state_changed(&self, state: AudioState) {
        self.post(SdkMessage::AudioStateChanged(state));
    }

    // Blocks until the worker replies. An empty buffer means no audio.
    pub fn need_audio_data(&self, len: usize) -> Vec<u8> {
        let (reply, response) = bounded(1);
        if self
            .tx
            .send(SdkMessage::NeedAudioData { len, reply })
            .is_err()
        {
            return Vec::new();
        }
        response.recv().unwrap_or_default()
    }

    pub fn event(&self, event: NuiEvent, code: i32, asr_result: Option<String>) {
        self.post(SdkMessage::Event {
            event,
            code,
            asr_result,
        });
    }

    pub fn rms_changed(&self, value: f32) {
        self.post(SdkMessage::RmsChanged(value));
    }

    fn post(&self, message: SdkMessage) {
        if self.tx.send(message).is_err() {
            log::debug!("dropping sdk callback after plugin shutdown");
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AsrEnvelope {
    payload: Option<AsrEnvelopePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct AsrEnvelopePayload {
    result: Option<String>,
    confidence: Option<f64>,
    begin_time: Option<i64>,
    time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsrPayload {
    pub text: String,
    pub confidence: Option<f64>,
    pub begin_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl AsrPayload {
    pub fn parse(raw: &str) -> Option<Self> {
        if let Ok(envelope) = serde_json::from_str::<AsrEnvelope>(raw) {
            let payload = envelope.payload?;
            let text = payload.result?;
            return Some(Self {
                text,
                confidence: payload.confidence,
                begin_time: payload.begin_time,
                end_time: payload.time,
            });
        }

        let text = raw.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            confidence: None,
            begin_time: None,
            end_time: None,
        })
    }
}
