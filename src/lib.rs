#[macro_use]
mod logging;

pub mod console;
#[cfg(feature = "desktop")]
mod desktop;
pub mod device_scan;
pub mod io;
pub mod messages;
pub mod settings;
pub mod supervisor;

pub use messages::{Intent, NotificationSink, SinkEvent};
pub use supervisor::{LinkState, LinkSupervisor, SupervisorConfig, SupervisorHandle};

/// Start MotorLink: the Tauri window with the `desktop` feature, the
/// stdin/stdout console otherwise.
#[cfg(feature = "desktop")]
pub fn run() {
    desktop::run_desktop();
}

#[cfg(not(feature = "desktop"))]
pub fn run() {
    if let Err(e) = console::run_console() {
        tlog!("[console] {}", e);
        std::process::exit(1);
    }
}
