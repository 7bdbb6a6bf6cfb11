use crate::sdk::AsrPayload;
use crossbeam_channel::Sender;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

pub const PARTIAL_RESULT_EVENT: &str = "onPartialResult";
pub const FINAL_RESULT_EVENT: &str = "onFinalResult";
pub const ERROR_EVENT: &str = "onError";

const DEFAULT_PARTIAL_CONFIDENCE: f64 = 0.95;
const DEFAULT_FINAL_CONFIDENCE: f64 = 0.98;
const FALLBACK_SENTENCE_MS: i64 = 1_000;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PartialResult {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub text: String,
    pub confidence: f64,
    pub begin_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SpeechError {
    pub code: String,
    pub message: String,
}

impl SpeechError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    PartialResult(PartialResult),
    FinalResult(FinalResult),
    Error(SpeechError),
}

impl RecognitionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RecognitionEvent::PartialResult(_) => PARTIAL_RESULT_EVENT,
            RecognitionEvent::FinalResult(_) => FINAL_RESULT_EVENT,
            RecognitionEvent::Error(_) => ERROR_EVENT,
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            RecognitionEvent::PartialResult(result) => serde_json::to_value(result),
            RecognitionEvent::FinalResult(result) => serde_json::to_value(result),
            RecognitionEvent::Error(error) => serde_json::to_value(error),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    pub fn partial(payload: AsrPayload) -> Self {
        RecognitionEvent::PartialResult(PartialResult {
            text: payload.text,
            confidence: payload.confidence.unwrap_or(DEFAULT_PARTIAL_CONFIDENCE),
        })
    }

    // Missing or inverted timing falls back to a one-second window ending now.
    pub fn sentence(payload: AsrPayload) -> Self {
        let (begin_time, end_time) = match (payload.begin_time, payload.end_time) {
            (Some(begin), Some(end)) if end > begin => (begin, end),
            _ => {
                let now = now_unix_ms();
                (now, now + FALLBACK_SENTENCE_MS)
            }
        };
        RecognitionEvent::FinalResult(FinalResult {
            text: payload.text,
            confidence: payload.confidence.unwrap_or(DEFAULT_FINAL_CONFIDENCE),
            begin_time,
            end_time,
        })
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        RecognitionEvent::Error(SpeechError::new(code, message))
    }
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RecognitionEvent);
}

#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<RecognitionEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<RecognitionEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: RecognitionEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("event receiver dropped; discarding recognition event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn payload(text: &str, begin: Option<i64>, end: Option<i64>) -> AsrPayload {
        AsrPayload {
            text: text.to_string(),
            confidence: None,
            begin_time: begin,
            end_time: end,
        }
    }

    #[test]
    fn final_result_serializes_camel_case_keys() {
        let event = RecognitionEvent::sentence(payload("done", Some(100), Some(900)));
        assert_eq!(event.name(), "onFinalResult");
        assert_eq!(
            event.payload(),
            serde_json::json!({
                "text": "done",
                "confidence": 0.98,
                "beginTime": 100,
                "endTime": 900
            })
        );
    }

    #[test]
    fn final_result_without_timing_spans_one_second() {
        match RecognitionEvent::sentence(payload("done", None, None)) {
            RecognitionEvent::FinalResult(result) => {
                assert_eq!(result.end_time - result.begin_time, 1_000);
            }
            other => panic!("expected final result, got {other:?}"),
        }
    }

    #[test]
    fn inverted_timing_is_replaced() {
        match RecognitionEvent::sentence(payload("done", Some(500), Some(500))) {
            RecognitionEvent::FinalResult(result) => assert!(result.end_time > result.begin_time),
            other => panic!("expected final result, got {other:?}"),
        }
    }

    #[test]
    fn partial_result_uses_default_confidence() {
        let event = RecognitionEvent::partial(payload("hel", None, None));
        assert_eq!(event.name(), "onPartialResult");
        assert_eq!(event.payload()["confidence"], 0.95);
    }

    #[test]
    fn channel_sink_forwards_events() {
        let (tx, rx) = unbounded();
        let sink = ChannelSink::new(tx);
        sink.emit(RecognitionEvent::error("MIC_ERROR", "microphone error"));

        let received = rx.try_recv().expect("event should be forwarded");
        assert_eq!(received.name(), "onError");
        assert_eq!(received.payload()["code"], "MIC_ERROR");
    }
}
