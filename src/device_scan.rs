// Controller discovery
//
// Enumerates host serial ports and picks the first one whose USB
// manufacturer string contains the vendor signature ("stm" for the
// STM32-based controller). Polling repeats on a fixed interval until a
// candidate turns up; each empty tick tells the front end we are still
// searching.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::io::IoError;
use crate::messages::{NotificationSink, SinkEvent};

// ============================================================================
// Types
// ============================================================================

/// A serial device that passed the vendor filter but has not been opened yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub path: String,
    pub manufacturer_hint: String,
}

/// One enumerated port. Only USB ports carry a manufacturer string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub manufacturer: Option<String>,
}

/// Source of serial port listings.
#[async_trait]
pub trait PortLister: Send + Sync {
    async fn list_ports(&self) -> Result<Vec<SerialPortInfo>, IoError>;
}

// ============================================================================
// Host enumeration
// ============================================================================

/// Lists ports through the serialport crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemPortLister;

/// Blocking enumeration. On macOS, filters out /dev/tty.* devices and only
/// keeps /dev/cu.* devices; the tty devices block on open waiting for
/// carrier detect.
fn enumerate_ports() -> Result<Vec<SerialPortInfo>, IoError> {
    let ports = serialport::available_ports()
        .map_err(|e| IoError::configuration(format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let manufacturer = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => info.manufacturer,
                _ => None,
            };
            SerialPortInfo {
                port_name: p.port_name,
                manufacturer,
            }
        })
        .collect())
}

#[async_trait]
impl PortLister for SystemPortLister {
    async fn list_ports(&self) -> Result<Vec<SerialPortInfo>, IoError> {
        // Enumeration walks sysfs / IOKit / SetupAPI synchronously
        tokio::task::spawn_blocking(enumerate_ports)
            .await
            .map_err(|e| IoError::configuration(format!("Enumeration task failed: {}", e)))?
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// Case-insensitive manufacturer match. `signature` must already be lowercase.
fn matches_vendor(info: &SerialPortInfo, signature: &str) -> bool {
    info.manufacturer
        .as_deref()
        .map(|m| m.to_lowercase().contains(signature))
        .unwrap_or(false)
}

/// Single-shot vendor scan over a port lister.
pub struct DeviceScanner {
    lister: Arc<dyn PortLister>,
    vendor_signature: String,
}

impl DeviceScanner {
    pub fn new(lister: Arc<dyn PortLister>, vendor_signature: &str) -> Self {
        Self {
            lister,
            vendor_signature: vendor_signature.to_lowercase(),
        }
    }

    /// List ports once and return the first vendor match.
    ///
    /// Enumeration errors count as "nothing found"; the next poll tick is
    /// the retry.
    pub async fn scan_once(&self) -> Option<DeviceCandidate> {
        let ports = match self.lister.list_ports().await {
            Ok(ports) => ports,
            Err(e) => {
                tlog!("[device_scan] Enumeration failed, treating as empty: {}", e);
                return None;
            }
        };

        ports
            .into_iter()
            .find(|p| matches_vendor(p, &self.vendor_signature))
            .map(|p| DeviceCandidate {
                path: p.port_name,
                manufacturer_hint: p.manufacturer.unwrap_or_default(),
            })
    }
}

// ============================================================================
// Poller
// ============================================================================

/// Repeating scan that stops itself once a candidate is found.
pub struct DevicePoller {
    scanner: Arc<DeviceScanner>,
    task: Option<JoinHandle<()>>,
}

impl DevicePoller {
    pub fn new(scanner: Arc<DeviceScanner>) -> Self {
        Self {
            scanner,
            task: None,
        }
    }

    /// Scan every `interval` until a candidate turns up, then call
    /// `on_found` once and stop. Ticks without a match emit `ARM false`.
    ///
    /// The first scan happens one interval after the call. A poll that is
    /// already running is stopped first.
    pub fn start_polling<F>(
        &mut self,
        interval: Duration,
        sink: Arc<dyn NotificationSink>,
        on_found: F,
    ) where
        F: FnOnce(DeviceCandidate) + Send + 'static,
    {
        self.stop();

        let period = interval.max(Duration::from_millis(1));
        let scanner = self.scanner.clone();

        tlog!("[device_scan] Polling every {} ms", period.as_millis());

        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match scanner.scan_once().await {
                    Some(candidate) => {
                        tlog!(
                            "[device_scan] Found {} (manufacturer: {})",
                            candidate.path,
                            candidate.manufacturer_hint
                        );
                        on_found(candidate);
                        break;
                    }
                    None => sink.notify(SinkEvent::Arm { state: false }),
                }
            }
        }));
    }

    /// Stop polling. Calling this when nothing is running is a no-op.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                tlog!("[device_scan] Polling stopped");
            }
            task.abort();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.task
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for DevicePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
