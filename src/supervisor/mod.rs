// Link supervisor
//
// Owns the controller link from discovery to teardown:
//
//   Searching ──candidate, open ok──► Connected ──watchdog expiry──► Disconnected
//       ▲   └──open / handshake fails──────────────────────────────────┐   │
//       └────────────────────────────── restart discovery ◄────────────┴───┘
//
// Every input (intents, discovered candidates, inbound chunks, watchdog
// expiry) is handled by one event loop, so heartbeat resets and expiry can
// never interleave.

mod watchdog;

pub use watchdog::HeartbeatWatchdog;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::device_scan::{DeviceCandidate, DevicePoller, DeviceScanner, PortLister};
use crate::io::codec::{decode_inbound, encode_handshake};
use crate::io::{InboundRx, SerialConfig, Transport, TransportLink, TransportOpener};
use crate::messages::{Intent, NotificationSink, SinkEvent};

/// Pending intents queued for the supervisor.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Types and Configuration
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Searching,
    Connected,
    Disconnected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How often discovery rescans while searching.
    pub discovery_interval: Duration,
    /// Silence after which the link is declared lost.
    pub heartbeat_timeout: Duration,
    /// Case-insensitive manufacturer substring identifying the controller.
    pub vendor_signature: String,
    /// Line settings used for every open.
    pub serial: SerialConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_millis(2000),
            heartbeat_timeout: Duration::from_millis(3000),
            vendor_signature: "stm".to_string(),
            serial: SerialConfig::default(),
        }
    }
}

enum SupervisorCommand {
    Intent(Intent),
    Shutdown,
}

/// Cloneable entry point for front ends. Dropping every handle stops the
/// supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorCommand>,
    state: watch::Receiver<LinkState>,
}

impl SupervisorHandle {
    /// Queue an intent. Intents are dropped silently while no link is up;
    /// the only error is a supervisor that has already stopped.
    pub async fn submit(&self, intent: Intent) -> Result<(), String> {
        self.tx
            .send(SupervisorCommand::Intent(intent))
            .await
            .map_err(|_| "Link supervisor is not running".to_string())
    }

    /// Most recent link state published by the supervisor.
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Ask the supervisor to close the link and exit.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SupervisorCommand::Shutdown).await;
    }
}

struct ActiveLink {
    transport: Box<dyn Transport>,
    /// `None` once the reader has ended; the watchdog then decides.
    inbound: Option<InboundRx>,
}

// ============================================================================
// Supervisor
// ============================================================================

pub struct LinkSupervisor {
    config: SupervisorConfig,
    state: LinkState,
    state_tx: watch::Sender<LinkState>,
    poller: DevicePoller,
    opener: Arc<dyn TransportOpener>,
    sink: Arc<dyn NotificationSink>,
    watchdog: HeartbeatWatchdog,
    link: Option<ActiveLink>,
    found_tx: mpsc::UnboundedSender<DeviceCandidate>,
    found_rx: mpsc::UnboundedReceiver<DeviceCandidate>,
    commands: mpsc::Receiver<SupervisorCommand>,
}

impl LinkSupervisor {
    pub fn new(
        config: SupervisorConfig,
        lister: Arc<dyn PortLister>,
        opener: Arc<dyn TransportOpener>,
        sink: Arc<dyn NotificationSink>,
    ) -> (Self, SupervisorHandle) {
        let scanner = Arc::new(DeviceScanner::new(lister, &config.vendor_signature));
        let (found_tx, found_rx) = mpsc::unbounded_channel();
        let (tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (state_tx, state) = watch::channel(LinkState::Searching);

        let supervisor = Self {
            watchdog: HeartbeatWatchdog::new(config.heartbeat_timeout),
            config,
            state: LinkState::Searching,
            state_tx,
            poller: DevicePoller::new(scanner),
            opener,
            sink,
            link: None,
            found_tx,
            found_rx,
            commands,
        };
        (supervisor, SupervisorHandle { tx, state })
    }

    /// Create the supervisor and run it on the current tokio runtime.
    pub fn spawn(
        config: SupervisorConfig,
        lister: Arc<dyn PortLister>,
        opener: Arc<dyn TransportOpener>,
        sink: Arc<dyn NotificationSink>,
    ) -> (SupervisorHandle, JoinHandle<()>) {
        let (supervisor, handle) = Self::new(config, lister, opener, sink);
        (handle, tokio::spawn(supervisor.run()))
    }

    /// Run until shut down. Cycles Searching/Connected/Disconnected for as
    /// long as it lives.
    pub async fn run(mut self) {
        tlog!(
            "[supervisor] Starting (vendor '{}', scan {} ms, heartbeat timeout {} ms, {})",
            self.config.vendor_signature,
            self.config.discovery_interval.as_millis(),
            self.config.heartbeat_timeout.as_millis(),
            self.config.serial.describe()
        );

        self.enter_searching();

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(SupervisorCommand::Intent(intent)) => self.handle_intent(intent).await,
                    Some(SupervisorCommand::Shutdown) | None => break,
                },
                chunk = next_inbound(&mut self.link) => match chunk {
                    Some(bytes) => self.handle_inbound(&bytes),
                    None => self.handle_inbound_closed(),
                },
                candidate = self.found_rx.recv() => {
                    if let Some(candidate) = candidate {
                        self.handle_candidate(candidate).await;
                    }
                }
                _ = self.watchdog.expired() => self.handle_watchdog_expired().await,
            }
        }

        self.shutdown().await;
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn set_state(&mut self, state: LinkState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn enter_searching(&mut self) {
        debug_assert!(self.link.is_none(), "discovery restarted with a link open");
        self.watchdog.cancel();
        self.set_state(LinkState::Searching);

        let found_tx = self.found_tx.clone();
        self.poller.start_polling(
            self.config.discovery_interval,
            self.sink.clone(),
            move |candidate| {
                let _ = found_tx.send(candidate);
            },
        );
    }

    fn enter_connected(&mut self, path: &str) {
        self.watchdog.cancel();
        self.set_state(LinkState::Connected);
        self.sink.notify(SinkEvent::Arm { state: true });
        self.watchdog.arm();
        tlog!("[supervisor] Connected to {}", path);
    }

    /// Tear down whatever is open, report the link as down, and go back to
    /// searching.
    async fn enter_disconnected(&mut self) {
        self.watchdog.cancel();
        self.set_state(LinkState::Disconnected);
        self.sink.notify(SinkEvent::Arm { state: false });
        self.close_link().await;
        self.enter_searching();
    }

    async fn close_link(&mut self) {
        if let Some(ActiveLink {
            mut transport,
            inbound,
        }) = self.link.take()
        {
            // Detach the listener first so a reader blocked on a full
            // channel can exit
            drop(inbound);
            transport.close().await;
            tlog!("[supervisor] Link to {} closed", transport.path());
        }
    }

    async fn shutdown(&mut self) {
        self.poller.stop();
        self.watchdog.cancel();
        self.close_link().await;
        tlog!("[supervisor] Stopped");
    }

    // ------------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------------

    async fn handle_candidate(&mut self, candidate: DeviceCandidate) {
        self.poller.stop();

        if self.state != LinkState::Searching || self.link.is_some() {
            tlog!(
                "[supervisor] Ignoring candidate {} while {:?}",
                candidate.path,
                self.state
            );
            return;
        }

        let TransportLink {
            mut transport,
            inbound,
        } = match self.opener.open(&candidate.path, &self.config.serial).await {
            Ok(link) => link,
            Err(e) => {
                tlog!("[supervisor] Open failed: {}", e);
                self.enter_disconnected().await;
                return;
            }
        };

        if let Err(e) = transport.write(&encode_handshake()).await {
            tlog!("[supervisor] Handshake failed: {}", e);
            drop(inbound);
            transport.close().await;
            self.enter_disconnected().await;
            return;
        }

        self.link = Some(ActiveLink {
            transport,
            inbound: Some(inbound),
        });
        self.enter_connected(&candidate.path);
    }

    fn handle_inbound(&mut self, bytes: &[u8]) {
        if self.state != LinkState::Connected {
            return;
        }
        if decode_inbound(bytes).is_some() {
            self.watchdog.arm();
            self.sink.notify(SinkEvent::Ack);
        }
    }

    fn handle_inbound_closed(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.inbound = None;
            tlog!(
                "[supervisor] Inbound stream from {} ended, waiting for watchdog",
                link.transport.path()
            );
        }
    }

    async fn handle_watchdog_expired(&mut self) {
        tlog!(
            "[supervisor] No heartbeat for {} ms, link lost",
            self.watchdog.timeout().as_millis()
        );
        self.enter_disconnected().await;
    }

    async fn handle_intent(&mut self, intent: Intent) {
        let link = match self.link.as_mut() {
            Some(link) if self.state == LinkState::Connected => link,
            _ => {
                tlog!("[supervisor] No link, dropping {:?}", intent);
                return;
            }
        };

        let frame = intent.to_command().encode();
        if let Err(e) = link.transport.write(&frame).await {
            tlog!("[supervisor] Failed to send {:?}: {}", intent, e);
        }
    }
}

/// Next chunk from the active link, pending forever when there is none.
async fn next_inbound(link: &mut Option<ActiveLink>) -> Option<Vec<u8>> {
    match link.as_mut().and_then(|l| l.inbound.as_mut()) {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
