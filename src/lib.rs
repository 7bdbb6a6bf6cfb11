pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod params;
pub mod permission;
pub mod plugin;
pub mod runtime_log;
pub mod sdk;
pub mod settings_store;

#[cfg(test)]
mod testing;

pub use config::CaptureSettings;
pub use error::CaptureError;
pub use events::{EventSink, RecognitionEvent};
pub use params::{InitializeOptions, RecordingOptions};
pub use permission::{PermissionContinuation, PermissionProvider, PermissionResult};
pub use plugin::{Collaborators, PluginStatus, SpeechCapturePlugin};
pub use sdk::{RecognitionSdk, SdkListener};

#[cfg(feature = "host")]
use audio::AudioSource;
#[cfg(feature = "host")]
use runtime_log as log_store;
#[cfg(feature = "host")]
use runtime_log::RuntimeJournal;
#[cfg(feature = "host")]
use settings_store::CaptureSettingsPatch;
#[cfg(feature = "host")]
use std::path::PathBuf;
#[cfg(feature = "host")]
use std::sync::Arc;
#[cfg(feature = "host")]
use tauri::plugin::{Builder, TauriPlugin};
#[cfg(feature = "host")]
use tauri::{AppHandle, Emitter, Manager, Runtime, State};

#[cfg(feature = "host")]
struct TauriEventSink<R: Runtime> {
    app: AppHandle<R>,
}

#[cfg(feature = "host")]
impl<R: Runtime> EventSink for TauriEventSink<R> {
    fn emit(&self, event: RecognitionEvent) {
        if let Err(error) = self.app.emit(event.name(), event.payload()) {
            log::warn!("failed to emit {}: {error}", event.name());
        }
    }
}

#[cfg(feature = "host")]
struct SettingsState {
    path: PathBuf,
}

#[cfg(feature = "host")]
#[tauri::command]
fn health_check() -> &'static str {
    "ok"
}

#[cfg(feature = "host")]
#[tauri::command]
fn initialize(
    plugin: State<'_, SpeechCapturePlugin>,
    appkey: Option<String>,
    token: Option<String>,
    workspace: Option<String>,
) -> Result<(), CaptureError> {
    plugin.initialize(InitializeOptions {
        appkey,
        token,
        workspace,
    })
}

#[cfg(feature = "host")]
#[tauri::command]
fn start_recording(
    plugin: State<'_, SpeechCapturePlugin>,
    options: Option<RecordingOptions>,
) -> Result<(), CaptureError> {
    plugin.start_recording(options.unwrap_or_default())
}

#[cfg(feature = "host")]
#[tauri::command]
fn stop_recording(plugin: State<'_, SpeechCapturePlugin>) -> Result<(), CaptureError> {
    plugin.stop_recording()
}

#[cfg(feature = "host")]
#[tauri::command]
fn get_status(plugin: State<'_, SpeechCapturePlugin>) -> PluginStatus {
    plugin.status()
}

#[cfg(feature = "host")]
#[tauri::command]
fn check_permission(plugin: State<'_, SpeechCapturePlugin>) -> PermissionResult {
    plugin.check_permission()
}

#[cfg(feature = "host")]
#[tauri::command]
async fn request_permission(
    plugin: State<'_, SpeechCapturePlugin>,
) -> Result<PermissionResult, CaptureError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    plugin.request_permission(PermissionContinuation::new(move |result| {
        let _ = tx.send(result);
    }));
    // A provider that drops the continuation never answered; treat as denied.
    Ok(rx.await.unwrap_or_else(|_| PermissionResult::denied()))
}

#[cfg(feature = "host")]
#[tauri::command]
fn get_settings(plugin: State<'_, SpeechCapturePlugin>) -> CaptureSettings {
    plugin.settings()
}

#[cfg(feature = "host")]
#[tauri::command]
fn update_settings(
    plugin: State<'_, SpeechCapturePlugin>,
    settings_state: State<'_, SettingsState>,
    patch: CaptureSettingsPatch,
) -> Result<CaptureSettings, String> {
    let updated = plugin.update_settings(patch);
    settings_store::save(&settings_state.path, &updated).map_err(|error| error.to_string())?;
    plugin
        .journal()
        .record("info", "settings.update", "updated capture settings");
    Ok(updated)
}

#[cfg(feature = "host")]
#[tauri::command]
fn get_runtime_logs(
    plugin: State<'_, SpeechCapturePlugin>,
    limit: Option<usize>,
) -> Result<Vec<String>, String> {
    let Some(path) = plugin.journal().path() else {
        return Ok(Vec::new());
    };
    let normalized_limit = limit.unwrap_or(40).clamp(1, 200);
    log_store::read_recent(path, normalized_limit).map_err(|error| error.to_string())
}

#[cfg(feature = "host")]
#[tauri::command]
fn clear_runtime_logs(plugin: State<'_, SpeechCapturePlugin>) -> Result<(), String> {
    match plugin.journal().path() {
        Some(path) => log_store::clear(path).map_err(|error| error.to_string()),
        None => Ok(()),
    }
}

#[cfg(feature = "host")]
pub fn init<R: Runtime>(
    sdk: Arc<dyn RecognitionSdk>,
    audio: Arc<dyn AudioSource>,
    permissions: Arc<dyn PermissionProvider>,
) -> TauriPlugin<R> {
    Builder::new("speech-capture")
        .invoke_handler(tauri::generate_handler![
            health_check,
            initialize,
            start_recording,
            stop_recording,
            get_status,
            check_permission,
            request_permission,
            get_settings,
            update_settings,
            get_runtime_logs,
            clear_runtime_logs
        ])
        .setup(move |app, _api| {
            let settings_path = settings_store::default_settings_path();
            let settings = settings_store::load_or_default(&settings_path);
            let journal = RuntimeJournal::new(log_store::default_log_path());
            journal.record("info", "plugin.start", "speech capture plugin loaded");

            let plugin = SpeechCapturePlugin::new(
                Collaborators {
                    sdk,
                    audio,
                    permissions,
                    events: Arc::new(TauriEventSink { app: app.clone() }),
                },
                settings,
                journal,
            );
            app.manage(plugin);
            app.manage(SettingsState {
                path: settings_path,
            });
            Ok(())
        })
        .on_drop(|app| {
            if let Some(plugin) = app.try_state::<SpeechCapturePlugin>() {
                plugin.teardown();
            }
        })
        .build()
}

#[cfg(all(feature = "host", feature = "microphone"))]
pub fn init_with_microphone<R: Runtime>(sdk: Arc<dyn RecognitionSdk>) -> TauriPlugin<R> {
    init(
        sdk,
        Arc::new(audio::CpalSource),
        Arc::new(permission::DevicePermissions),
    )
}

#[cfg(test)]
mod tests {
    const BUILD_SCRIPT: &str = include_str!("../build.rs");
    const DEFAULT_PERMISSIONS: &str = include_str!("../permissions/default.toml");

    const HOST_COMMANDS: &[&str] = &[
        "health_check",
        "initialize",
        "start_recording",
        "stop_recording",
        "get_status",
        "check_permission",
        "request_permission",
        "get_settings",
        "update_settings",
        "get_runtime_logs",
        "clear_runtime_logs",
    ];

    fn permission_id(command: &str) -> String {
        format!("allow-{}", command.replace('_', "-"))
    }

    #[test]
    fn every_host_command_is_declared_to_the_acl() {
        for command in HOST_COMMANDS {
            assert!(
                BUILD_SCRIPT.contains(&format!("\"{command}\"")),
                "{command} missing from build.rs"
            );
        }
    }

    #[test]
    fn default_permissions_cover_the_recording_lifecycle() {
        for command in [
            "initialize",
            "start_recording",
            "stop_recording",
            "check_permission",
            "request_permission",
            "get_status",
        ] {
            assert!(DEFAULT_PERMISSIONS.contains(&permission_id(command)));
        }
        assert!(!DEFAULT_PERMISSIONS.contains(&permission_id("update_settings")));
        assert!(!DEFAULT_PERMISSIONS.contains(&permission_id("clear_runtime_logs")));
    }
}
