const COMMANDS: &[&str] = &[
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

fn main() {
    tauri_plugin::Builder::new(COMMANDS).build();
}
