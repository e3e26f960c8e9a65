// src/desktop.rs
//
// Tauri front end. Link events reach the webview as `message` events and the
// webview sends intents back through the `send_message` command, both in the
// `{"type": ..., "state": ...}` shape.

use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager, State};

use crate::device_scan::SystemPortLister;
use crate::io::serial::SerialOpener;
use crate::logging;
use crate::messages::{Intent, NotificationSink, SinkEvent};
use crate::settings::{self, LinkSettings};
use crate::supervisor::{LinkState, LinkSupervisor, SupervisorHandle};

/// Event name the webview listens on.
const MESSAGE_EVENT: &str = "message";

struct TauriSink {
    app: AppHandle,
}

impl NotificationSink for TauriSink {
    fn notify(&self, event: SinkEvent) {
        if let Err(e) = self.app.emit(MESSAGE_EVENT, event) {
            tlog!("[desktop] Failed to emit {:?}: {}", event, e);
        }
    }
}

#[tauri::command]
async fn send_message(
    supervisor: State<'_, SupervisorHandle>,
    message: Intent,
) -> Result<(), String> {
    supervisor.submit(message).await
}

#[tauri::command]
fn link_state(supervisor: State<'_, SupervisorHandle>) -> LinkState {
    supervisor.state()
}

fn load_app_settings(app: &AppHandle) -> LinkSettings {
    let path = match app.path().app_config_dir() {
        Ok(dir) => dir.join("settings.json"),
        Err(e) => {
            tlog!("[setup] Failed to get app config dir: {}", e);
            return LinkSettings::default();
        }
    };

    match settings::load_settings(&path) {
        Ok(s) => s,
        Err(e) => {
            tlog!("[setup] {}, using defaults", e);
            LinkSettings::default()
        }
    }
}

pub fn run_desktop() {
    let builder = tauri::Builder::default().setup(|app| {
        let link_settings = load_app_settings(app.handle());

        if let Some(dir) = link_settings.log_dir.as_deref() {
            if let Err(e) = logging::init_file_logging(std::path::Path::new(dir)) {
                tlog!("[setup] {}", e);
            }
        }

        let config = link_settings.supervisor_config()?;
        let sink = Arc::new(TauriSink {
            app: app.handle().clone(),
        });
        let (supervisor, handle) = LinkSupervisor::new(
            config,
            Arc::new(SystemPortLister),
            Arc::new(SerialOpener),
            sink,
        );
        app.manage(handle);
        tauri::async_runtime::spawn(supervisor.run());

        Ok(())
    });

    let builder = builder.invoke_handler(tauri::generate_handler![send_message, link_state]);

    builder
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let tauri::RunEvent::ExitRequested { .. } = event {
                if let Some(handle) = app.try_state::<SupervisorHandle>() {
                    let handle = handle.inner().clone();
                    tauri::async_runtime::block_on(handle.shutdown());
                }
                logging::stop_file_logging();
            }
        });
}
