// src/io/mock.rs
//
// In-memory port lister and transport used by the unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::device_scan::{PortLister, SerialPortInfo};
use crate::io::{IoError, SerialConfig, Transport, TransportLink, TransportOpener};

/// Build a USB port listing.
pub fn usb_port(path: &str, manufacturer: Option<&str>) -> SerialPortInfo {
    SerialPortInfo {
        port_name: path.to_string(),
        manufacturer: manufacturer.map(str::to_string),
    }
}

// ============================================================================
// Port lister
// ============================================================================

/// Lister returning a swappable port list, optionally failing a few calls.
pub struct ScriptedLister {
    ports: Mutex<Vec<SerialPortInfo>>,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedLister {
    pub fn new(ports: Vec<SerialPortInfo>) -> Self {
        Self {
            ports: Mutex::new(ports),
            failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_ports(&self, ports: Vec<SerialPortInfo>) {
        *self.ports.lock().unwrap() = ports;
    }

    /// Make the next `n` calls fail with an enumeration error.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortLister for ScriptedLister {
    async fn list_ports(&self) -> Result<Vec<SerialPortInfo>, IoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(IoError::configuration("enumeration failed"));
        }
        Ok(self.ports.lock().unwrap().clone())
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
struct MockState {
    opens: usize,
    closes: usize,
    live: usize,
    max_live: usize,
    open_failures: usize,
    fail_writes: bool,
    opened_paths: Vec<String>,
    writes: Vec<Vec<u8>>,
    inbound: Option<mpsc::Sender<Vec<u8>>>,
}

/// Opener that records everything written and lets tests inject inbound bytes.
#[derive(Clone, Default)]
pub struct MockOpener {
    state: Arc<Mutex<MockState>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` opens fail.
    pub fn fail_opens(&self, n: usize) {
        self.state.lock().unwrap().open_failures = n;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    /// Transports opened and not yet closed.
    pub fn live(&self) -> usize {
        self.state.lock().unwrap().live
    }

    pub fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    pub fn opened_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().opened_paths.clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Push bytes into the inbound stream of the current link.
    /// Returns false when no link is listening.
    pub fn inject(&self, bytes: &[u8]) -> bool {
        let tx = self.state.lock().unwrap().inbound.clone();
        match tx {
            Some(tx) => tx.try_send(bytes.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Close the inbound stream of the current link, as a dying reader would.
    pub fn end_inbound(&self) {
        self.state.lock().unwrap().inbound = None;
    }
}

#[async_trait]
impl TransportOpener for MockOpener {
    async fn open(&self, path: &str, config: &SerialConfig) -> Result<TransportLink, IoError> {
        config.validate()?;

        let mut state = self.state.lock().unwrap();
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(IoError::connection(path, "mock open failure"));
        }

        state.opens += 1;
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        state.opened_paths.push(path.to_string());

        let (tx, rx) = mpsc::channel(16);
        state.inbound = Some(tx);

        Ok(TransportLink {
            transport: Box::new(MockTransport {
                path: path.to_string(),
                state: self.state.clone(),
                closed: false,
            }),
            inbound: rx,
        })
    }
}

struct MockTransport {
    path: String,
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

#[async_trait]
impl Transport for MockTransport {
    fn path(&self) -> &str {
        &self.path
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), IoError> {
        if self.closed {
            return Err(IoError::closed(&self.path));
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(IoError::write(&self.path, "mock write failure"));
        }
        state.writes.push(frame.to_vec());
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.state.lock().unwrap();
        state.live -= 1;
        state.closes += 1;
        state.inbound = None;
    }
}
