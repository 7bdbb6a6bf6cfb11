use crate::audio::{AudioFormat, AudioInput, AudioSource};
use crate::capture::lock;
use crate::config::{SdkLogLevel, VadMode};
use crate::error::AudioError;
use crate::permission::{PermissionContinuation, PermissionProvider, PermissionResult};
use crate::sdk::{RecognitionSdk, SdkListener, SUCCESS};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

type SlowReads = Arc<Mutex<Option<(Duration, Sender<()>)>>>;

pub struct MemorySource {
    fill: u8,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
    fail_opens: AtomicBool,
    fail_reads: Arc<AtomicBool>,
    slow_reads: SlowReads,
}

impl MemorySource {
    pub fn new(fill: u8) -> Self {
        Self {
            fill,
            opens: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            fail_opens: AtomicBool::new(false),
            fail_reads: Arc::new(AtomicBool::new(false)),
            slow_reads: Arc::new(Mutex::new(None)),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn live_inputs(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    // Every later read, on open handles too, signals once it has started and
    // then holds the slot for `delay`.
    pub fn slow_reads(&self, delay: Duration) -> Receiver<()> {
        let (started, rx) = unbounded();
        *lock(&self.slow_reads) = Some((delay, started));
        rx
    }
}

impl AudioSource for MemorySource {
    fn open(&self, _format: &AudioFormat) -> Result<Box<dyn AudioInput>, AudioError> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(AudioError::NoInputDevice);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryInput {
            fill: self.fill,
            live: Arc::clone(&self.live),
            fail_reads: Arc::clone(&self.fail_reads),
            slow_reads: Arc::clone(&self.slow_reads),
        }))
    }
}

struct MemoryInput {
    fill: u8,
    live: Arc<AtomicUsize>,
    fail_reads: Arc<AtomicBool>,
    slow_reads: SlowReads,
}

impl AudioInput for MemoryInput {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, AudioError> {
        let slow = lock(&self.slow_reads).clone();
        if let Some((delay, started)) = slow {
            let _ = started.send(());
            thread::sleep(delay);
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AudioError::StreamClosed);
        }
        buffer.fill(self.fill);
        Ok(buffer.len())
    }
}

impl Drop for MemoryInput {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// Records every call and hands the listener back to the test, which then
// plays the part of the SDK's callback threads.
#[derive(Default)]
pub struct ScriptedSdk {
    listener: Mutex<Option<SdkListener>>,
    calls: Mutex<Vec<String>>,
    init_code: AtomicI32,
    start_code: AtomicI32,
    stop_code: AtomicI32,
    pull_on_stop: AtomicBool,
}

impl ScriptedSdk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> SdkListener {
        lock(&self.listener)
            .clone()
            .expect("sdk should have been initialized with a listener")
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, name: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.starts_with(name))
            .count()
    }

    pub fn fail_initialize(&self, code: i32) {
        self.init_code.store(code, Ordering::SeqCst);
    }

    pub fn fail_start_dialog(&self, code: i32) {
        self.start_code.store(code, Ordering::SeqCst);
    }

    pub fn fail_stop_dialog(&self, code: i32) {
        self.stop_code.store(code, Ordering::SeqCst);
    }

    // stop_dialog pulls one more buffer before returning, the way the vendor
    // audio thread drains while a dialog winds down.
    pub fn pull_on_stop(&self, pull: bool) {
        self.pull_on_stop.store(pull, Ordering::SeqCst);
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

impl RecognitionSdk for ScriptedSdk {
    fn initialize(
        &self,
        params: &str,
        listener: SdkListener,
        _log_level: SdkLogLevel,
        _save_log: bool,
    ) -> i32 {
        self.record(format!("initialize {params}"));
        let code = self.init_code.load(Ordering::SeqCst);
        if code == SUCCESS {
            *lock(&self.listener) = Some(listener);
        }
        code
    }

    fn set_params(&self, params: &str) -> i32 {
        self.record(format!("set_params {params}"));
        SUCCESS
    }

    fn start_dialog(&self, vad_mode: VadMode, dialog_params: &str) -> i32 {
        self.record(format!("start_dialog {} {dialog_params}", vad_mode.code()));
        self.start_code.load(Ordering::SeqCst)
    }

    fn stop_dialog(&self) -> i32 {
        self.record("stop_dialog".to_string());
        if self.pull_on_stop.load(Ordering::SeqCst) {
            let listener = lock(&self.listener).clone();
            if let Some(listener) = listener {
                listener.need_audio_data(16);
            }
        }
        self.stop_code.load(Ordering::SeqCst)
    }

    fn release(&self) -> i32 {
        self.record("release".to_string());
        lock(&self.listener).take();
        SUCCESS
    }
}

// `request` answers immediately with the configured outcome and remembers it
// for later checks.
pub struct StaticPermissions {
    current: Mutex<PermissionResult>,
    on_request: PermissionResult,
    requests: AtomicUsize,
}

impl StaticPermissions {
    pub fn new(current: PermissionResult, on_request: PermissionResult) -> Self {
        Self {
            current: Mutex::new(current),
            on_request,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionResult::granted(), PermissionResult::granted())
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionProvider for StaticPermissions {
    fn check(&self) -> PermissionResult {
        *lock(&self.current)
    }

    fn request(&self, continuation: PermissionContinuation) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *lock(&self.current) = self.on_request;
        continuation.resolve(self.on_request);
    }
}
