use crate::audio::{AudioFormat, AudioSource, DEFAULT_READ_TIMEOUT};
use crate::capture::{lock, CaptureSlot};
use crate::config::CaptureSettings;
use crate::error::CaptureError;
use crate::events::{EventSink, RecognitionEvent};
use crate::params::{
    build_dialog_params, build_init_params, build_recognition_params, resolve_device_id,
    Credentials, InitializeOptions, RecordingOptions,
};
use crate::permission::{PermissionContinuation, PermissionProvider, PermissionResult};
use crate::runtime_log::RuntimeJournal;
use crate::sdk::{
    AsrPayload, AudioState, NuiEvent, RecognitionSdk, SdkListener, SdkMessage, SUCCESS,
};
use crate::settings_store::{self, CaptureSettingsPatch};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};

pub const ASR_ERROR: &str = "ASR_ERROR";
pub const MIC_ERROR: &str = "MIC_ERROR";
pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";

pub struct Collaborators {
    pub sdk: Arc<dyn RecognitionSdk>,
    pub audio: Arc<dyn AudioSource>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub events: Arc<dyn EventSink>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PluginStatus {
    pub initialized: bool,
    pub recording: bool,
}

struct Worker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(shared: Weak<Shared>, messages: Receiver<SdkMessage>) -> Self {
        let (shutdown, shutdown_rx) = unbounded::<()>();
        let handle = thread::spawn(move || run_worker(shared, messages, shutdown_rx));
        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    // Waits for the loop to exit, including a read already in progress.
    fn stop(mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::warn!("speech capture worker panicked");
            }
        }
    }
}

fn run_worker(shared: Weak<Shared>, messages: Receiver<SdkMessage>, shutdown: Receiver<()>) {
    loop {
        select! {
            recv(messages) -> message => {
                let Ok(message) = message else { break };
                let Some(shared) = shared.upgrade() else { break };
                shared.handle_sdk_message(message);
            }
            recv(shutdown) -> _ => break,
        }
    }
    log::debug!("speech capture worker stopped");
}

struct SdkSession {
    credentials: Credentials,
    worker: Worker,
}

#[derive(Default)]
struct ControlState {
    session: Option<SdkSession>,
}

struct Shared {
    sdk: Arc<dyn RecognitionSdk>,
    audio: Arc<dyn AudioSource>,
    permissions: Arc<dyn PermissionProvider>,
    events: Arc<dyn EventSink>,
    journal: RuntimeJournal,
    settings: Mutex<CaptureSettings>,
    format: Mutex<AudioFormat>,
    control: Mutex<ControlState>,
    recording: AtomicBool,
    generation: AtomicU64,
    capture: CaptureSlot,
}

#[derive(Clone)]
pub struct SpeechCapturePlugin {
    shared: Arc<Shared>,
}

impl SpeechCapturePlugin {
    pub fn new(
        collaborators: Collaborators,
        settings: CaptureSettings,
        journal: RuntimeJournal,
    ) -> Self {
        let format = audio_format_for(&settings, None);
        Self {
            shared: Arc::new(Shared {
                sdk: collaborators.sdk,
                audio: collaborators.audio,
                permissions: collaborators.permissions,
                events: collaborators.events,
                journal,
                settings: Mutex::new(settings),
                format: Mutex::new(format),
                control: Mutex::new(ControlState::default()),
                recording: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                capture: CaptureSlot::new(),
            }),
        }
    }

    pub fn status(&self) -> PluginStatus {
        let control = lock(&self.shared.control);
        PluginStatus {
            initialized: control.session.is_some(),
            recording: self.shared.recording.load(Ordering::SeqCst),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> CaptureSettings {
        lock(&self.shared.settings).clone()
    }

    pub fn update_settings(&self, patch: CaptureSettingsPatch) -> CaptureSettings {
        let mut settings = lock(&self.shared.settings);
        *settings = settings_store::apply_patch(&settings, patch);
        settings.clone()
    }

    pub fn journal(&self) -> &RuntimeJournal {
        &self.shared.journal
    }

    pub fn initialize(&self, options: InitializeOptions) -> Result<(), CaptureError> {
        let credentials = options.validate()?;
        let shared = &self.shared;

        let mut control = lock(&shared.control);
        if let Some(previous) = control.session.take() {
            log::info!("re-initializing speech sdk; closing previous session");
            shared.end_session(previous);
        }

        let settings = lock(&shared.settings).clone();
        let device_id = resolve_device_id(&settings);
        let init_params = build_init_params(&credentials, &settings, &device_id);

        let (tx, rx) = unbounded();
        let worker = Worker::spawn(Arc::downgrade(shared), rx);
        let code = shared.sdk.initialize(
            &init_params,
            SdkListener::new(tx),
            settings.sdk_log_level,
            settings.save_sdk_log,
        );
        if code != SUCCESS {
            worker.stop();
            shared.journal.record(
                "error",
                "initialize",
                &format!("sdk initialization failed with code {code}"),
            );
            return Err(CaptureError::SdkInitFailed(code));
        }

        control.session = Some(SdkSession {
            credentials,
            worker,
        });
        log::info!("speech sdk initialized for device {device_id}");
        shared
            .journal
            .record("info", "initialize", "speech sdk initialized");
        Ok(())
    }

    // Missing permission is requested on the way out. Nothing starts when it
    // is granted; the host calls start again.
    pub fn start_recording(&self, options: RecordingOptions) -> Result<(), CaptureError> {
        self.ensure_can_start()?;

        if !self.shared.permissions.check().granted {
            log::info!("microphone permission missing; requesting it");
            let shared = Arc::clone(&self.shared);
            self.shared
                .permissions
                .request(PermissionContinuation::new(move |result| {
                    shared.permission_resolved(result);
                }));
            return Err(CaptureError::PermissionRequired);
        }

        self.begin_session(options)
    }

    pub fn stop_recording(&self) -> Result<(), CaptureError> {
        let shared = &self.shared;
        let control = lock(&shared.control);
        if !shared.recording.load(Ordering::SeqCst) {
            return Err(CaptureError::NotRecording);
        }

        let code = match control.session {
            Some(_) => shared.sdk.stop_dialog(),
            None => SUCCESS,
        };
        shared.recording.store(false, Ordering::SeqCst);
        shared.capture.release();
        shared
            .journal
            .record("info", "recording.stop", "recognition dialog stopped");

        if code != SUCCESS {
            return Err(CaptureError::SdkOperationFailed {
                operation: "stop_dialog",
                code,
            });
        }
        Ok(())
    }

    pub fn check_permission(&self) -> PermissionResult {
        self.shared.permissions.check()
    }

    pub fn request_permission(&self, continuation: PermissionContinuation) {
        let current = self.shared.permissions.check();
        if current.granted {
            continuation.resolve(current);
            return;
        }
        self.shared.permissions.request(continuation);
    }

    // Idempotent, and safe before initialize.
    pub fn teardown(&self) {
        let shared = &self.shared;
        let mut control = lock(&shared.control);
        match control.session.take() {
            Some(session) => shared.end_session(session),
            None => {
                shared.recording.store(false, Ordering::SeqCst);
                shared.capture.release();
            }
        }
        shared
            .journal
            .record("info", "teardown", "speech capture released");
    }

    fn ensure_can_start(&self) -> Result<(), CaptureError> {
        let control = lock(&self.shared.control);
        if self.shared.recording.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRecording);
        }
        if control.session.is_none() {
            return Err(CaptureError::NotInitialized);
        }
        Ok(())
    }

    fn begin_session(&self, mut options: RecordingOptions) -> Result<(), CaptureError> {
        let shared = &self.shared;
        let control = lock(&shared.control);
        if shared.recording.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRecording);
        }
        let session = control
            .session
            .as_ref()
            .ok_or(CaptureError::NotInitialized)?;

        let settings = lock(&shared.settings).clone();
        let sample_rate = options.sample_rate.unwrap_or(settings.sample_rate_hz);
        options.sample_rate = Some(sample_rate);
        *lock(&shared.format) = audio_format_for(&settings, Some(sample_rate));

        let code = shared.sdk.set_params(&build_recognition_params(&options));
        if code != SUCCESS {
            return Err(CaptureError::SdkOperationFailed {
                operation: "set_params",
                code,
            });
        }

        shared.recording.store(true, Ordering::SeqCst);
        shared.generation.fetch_add(1, Ordering::SeqCst);
        let code = shared
            .sdk
            .start_dialog(settings.vad_mode, &build_dialog_params(&session.credentials));
        if code != SUCCESS {
            shared.recording.store(false, Ordering::SeqCst);
            shared.capture.release();
            shared.journal.record(
                "error",
                "recording.start",
                &format!("start_dialog failed with code {code}"),
            );
            return Err(CaptureError::SdkOperationFailed {
                operation: "start_dialog",
                code,
            });
        }

        log::info!("recognition dialog started at {sample_rate} Hz");
        shared
            .journal
            .record("info", "recording.start", "recognition dialog started");
        Ok(())
    }
}

fn audio_format_for(settings: &CaptureSettings, sample_rate_hz: Option<u32>) -> AudioFormat {
    AudioFormat {
        sample_rate_hz: sample_rate_hz.unwrap_or(settings.sample_rate_hz),
        microphone_id: settings.microphone_id.clone(),
        read_timeout: DEFAULT_READ_TIMEOUT,
        ..AudioFormat::default()
    }
}

impl Shared {
    // Caller holds the control lock. The SDK is released before the worker is
    // joined so callbacks still in flight get answered.
    fn end_session(&self, session: SdkSession) {
        if self.recording.swap(false, Ordering::SeqCst) {
            let code = self.sdk.stop_dialog();
            if code != SUCCESS {
                log::warn!("stop_dialog during teardown returned {code}");
            }
        }
        self.capture.release();

        let code = self.sdk.release();
        if code != SUCCESS {
            log::warn!("sdk release returned {code}");
        }
        session.worker.stop();
    }

    fn permission_resolved(&self, result: PermissionResult) {
        if result.granted {
            log::info!("microphone permission granted");
            self.journal
                .record("info", "permission", "microphone permission granted");
        } else {
            self.publish_error(
                PERMISSION_DENIED,
                "microphone permission was denied".to_string(),
            );
        }
    }

    fn handle_sdk_message(self: &Arc<Self>, message: SdkMessage) {
        match message {
            SdkMessage::AudioStateChanged(AudioState::Open) => self.open_capture(),
            SdkMessage::AudioStateChanged(state) => {
                if self.capture.release() {
                    log::debug!("audio capture released on {state:?}");
                }
            }
            SdkMessage::NeedAudioData { len, reply } => {
                let (data, failure) = self.pull_audio(len);
                let _ = reply.send(data);
                if let Some(error) = failure {
                    self.abort_session(error.code(), error.to_string(), true);
                }
            }
            SdkMessage::Event {
                event,
                code,
                asr_result,
            } => self.translate_event(event, code, asr_result),
            // Reserved for level meters in the UI.
            SdkMessage::RmsChanged(_) => {}
        }
    }

    fn open_capture(self: &Arc<Self>) {
        let format = lock(&self.format).clone();
        let debug_wav_dir = lock(&self.settings).debug_wav_dir.clone();
        match self.capture.open_while(
            &self.recording,
            self.audio.as_ref(),
            &format,
            debug_wav_dir.as_deref(),
        ) {
            Ok(true) => log::debug!("audio capture opened at {} Hz", format.sample_rate_hz),
            Ok(false) => log::debug!("ignoring audio open outside a recording session"),
            Err(error) => {
                let error = CaptureError::AudioInitFailed(error.to_string());
                self.abort_session(error.code(), error.to_string(), true)
            }
        }
    }

    fn pull_audio(&self, len: usize) -> (Vec<u8>, Option<CaptureError>) {
        if !self.recording.load(Ordering::SeqCst) {
            return (Vec::new(), None);
        }
        match self.capture.read(len) {
            Ok(data) => (data, None),
            Err(error) => (
                Vec::new(),
                Some(CaptureError::RecordingFailed(error.to_string())),
            ),
        }
    }

    fn translate_event(self: &Arc<Self>, event: NuiEvent, code: i32, asr_result: Option<String>) {
        let payload = || asr_result.as_deref().and_then(AsrPayload::parse);
        match event {
            NuiEvent::AsrPartialResult => {
                if let Some(payload) = payload() {
                    self.events.emit(RecognitionEvent::partial(payload));
                }
            }
            NuiEvent::SentenceEnd => {
                if let Some(payload) = payload() {
                    self.events.emit(RecognitionEvent::sentence(payload));
                }
            }
            NuiEvent::AsrError => {
                self.abort_session(ASR_ERROR, format!("recognition error, code {code}"), false)
            }
            NuiEvent::MicError => {
                self.abort_session(MIC_ERROR, "microphone error".to_string(), false)
            }
            other => log::trace!("ignoring sdk event {other:?} ({code})"),
        }
    }

    // Runs on the worker. The SDK may pull audio while it winds a dialog
    // down, so stop_dialog goes to its own thread and the worker keeps serving.
    fn abort_session(self: &Arc<Self>, code: &str, message: String, stop_dialog: bool) {
        let was_recording = self.recording.swap(false, Ordering::SeqCst);
        self.capture.release();
        if !(was_recording && stop_dialog) {
            self.publish_error(code, message);
            return;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let shared = Arc::clone(self);
        let code = code.to_string();
        thread::spawn(move || {
            shared.stop_aborted_dialog(generation, &code);
            shared.publish_error(&code, message);
        });
    }

    fn stop_aborted_dialog(&self, generation: u64, code: &str) {
        let control = lock(&self.control);
        if control.session.is_none() || self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("skipping stop_dialog after {code}; session already moved on");
            return;
        }
        let result = self.sdk.stop_dialog();
        if result != SUCCESS {
            log::warn!("stop_dialog after {code} returned {result}");
        }
    }

    fn publish_error(&self, code: &str, message: String) {
        log::warn!("{code}: {message}");
        self.journal.record("error", code, &message);
        self.events.emit(RecognitionEvent::error(code, message));
    }
}
