// src/io/serial/transport.rs
//
// Serial transport for the controller link.
// Opening the port and every read and write run on tokio's blocking pool.
// Reads are forwarded as raw chunks; writes use a cloned port handle.

use async_trait::async_trait;
use std::io::{Read, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;

use super::utils::{self, SerialConfig};
use crate::io::error::IoError;
use crate::io::{Transport, TransportLink, TransportOpener};

// ============================================================================
// Constants
// ============================================================================

/// Port timeout. Bounds how long the reader takes to notice cancellation
/// and how long a write can stall.
const PORT_TIMEOUT: Duration = Duration::from_millis(10);

/// Inbound chunks buffered between the reader and the supervisor.
const INBOUND_CHANNEL_CAPACITY: usize = 64;

const READ_BUFFER_SIZE: usize = 256;

// ============================================================================
// Serial Transport
// ============================================================================

/// An open serial link to the controller.
pub struct SerialTransport {
    path: String,
    writer: Option<Box<dyn serialport::SerialPort>>,
    cancel_flag: Arc<AtomicBool>,
    reader_handle: Option<tokio::task::JoinHandle<()>>,
}

/// Open the port and clone a write handle. Blocks on the device.
fn open_port(
    path: &str,
    config: &SerialConfig,
) -> Result<(Box<dyn serialport::SerialPort>, Box<dyn serialport::SerialPort>), IoError> {
    let port = serialport::new(path, config.baud_rate)
        .data_bits(utils::to_serialport_data_bits(config.data_bits))
        .stop_bits(utils::to_serialport_stop_bits(config.stop_bits))
        .parity(utils::to_serialport_parity(&config.parity))
        .timeout(PORT_TIMEOUT)
        .open()
        .map_err(|e| IoError::connection(path, e.to_string()))?;

    // Separate handle for writes so the reader never holds up a frame
    let writer = port
        .try_clone()
        .map_err(|e| IoError::connection(path, format!("clone handle: {}", e)))?;

    Ok((port, writer))
}

impl SerialTransport {
    /// Open `path` with the given line settings and start the reader.
    pub async fn open(path: &str, config: &SerialConfig) -> Result<TransportLink, IoError> {
        config.validate()?;

        let (port, writer) = {
            let owned_path = path.to_string();
            let owned_config = config.clone();
            tokio::task::spawn_blocking(move || open_port(&owned_path, &owned_config))
                .await
                .map_err(|e| IoError::connection(path, format!("open task failed: {}", e)))??
        };

        tlog!("[serial] Opened {} at {}", path, config.describe());

        let cancel_flag = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let reader_handle = spawn_reader(path.to_string(), port, cancel_flag.clone(), inbound_tx);

        let transport = SerialTransport {
            path: path.to_string(),
            writer: Some(writer),
            cancel_flag,
            reader_handle: Some(reader_handle),
        };

        Ok(TransportLink {
            transport: Box::new(transport),
            inbound: inbound_rx,
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn path(&self) -> &str {
        &self.path
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), IoError> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| IoError::closed(&self.path))?;
        let frame = frame.to_vec();

        // The write timeout bounds how long this can take on a stalled port
        let (writer, result) = tokio::task::spawn_blocking(move || {
            let result = writer.write_all(&frame).and_then(|_| writer.flush());
            (writer, result)
        })
        .await
        .map_err(|e| IoError::write(&self.path, format!("write task failed: {}", e)))?;

        self.writer = Some(writer);
        result.map_err(|e| IoError::write(&self.path, e.to_string()))
    }

    async fn close(&mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        self.writer = None;

        if let Some(handle) = self.reader_handle.take() {
            if let Err(e) = handle.await {
                tlog!("[serial] Reader task for {} panicked: {:?}", self.path, e);
            }
            tlog!("[serial] Closed {}", self.path);
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        // Unclosed transports still stop their reader
        self.cancel_flag.store(true, Ordering::Relaxed);
    }
}

/// Opens real serial ports.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialOpener;

#[async_trait]
impl TransportOpener for SerialOpener {
    async fn open(&self, path: &str, config: &SerialConfig) -> Result<TransportLink, IoError> {
        SerialTransport::open(path, config).await
    }
}

// ============================================================================
// Reader
// ============================================================================

fn spawn_reader(
    path: String,
    port: Box<dyn serialport::SerialPort>,
    cancel_flag: Arc<AtomicBool>,
    inbound_tx: mpsc::Sender<Vec<u8>>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || run_reader_blocking(path, port, cancel_flag, inbound_tx))
}

/// Blocking read loop. Exits on cancellation, on a non-timeout I/O error, or
/// when the supervisor drops the inbound receiver.
fn run_reader_blocking(
    path: String,
    mut port: Box<dyn serialport::SerialPort>,
    cancel_flag: Arc<AtomicBool>,
    inbound_tx: mpsc::Sender<Vec<u8>>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let reason;

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            reason = "stopped".to_string();
            break;
        }

        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                if inbound_tx.blocking_send(buf[..n].to_vec()).is_err() {
                    reason = "listener detached".to_string();
                    break;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                reason = IoError::read(&path, e.to_string()).to_string();
                break;
            }
        }
    }

    tlog!("[serial] Reader for {} exiting ({})", path, reason);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_device_is_connection_error() {
        let result =
            SerialTransport::open("/dev/motorlink-does-not-exist", &SerialConfig::default()).await;
        match result {
            Err(IoError::Connection { device, .. }) => {
                assert_eq!(device, "/dev/motorlink-does-not-exist");
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opening a missing device should fail"),
        }
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let config = SerialConfig {
            data_bits: 12,
            ..SerialConfig::default()
        };
        let result = SerialOpener.open("/dev/ttyACM0", &config).await;
        assert!(matches!(result, Err(IoError::Configuration(_))));
    }
}
