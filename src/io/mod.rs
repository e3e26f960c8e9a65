// src/io/mod.rs
//
// Transport abstraction for the controller link.
//
// The supervisor only needs four capabilities from a link: open it, write a
// frame, receive inbound byte chunks, close it. Opens and writes are async so
// blocking device calls stay off the runtime workers. `TransportOpener` produces a
// `TransportLink` that bundles the write/close half with its own inbound
// channel, so dropping the link detaches the listener as well.

use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod codec;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;
pub mod serial;

pub use error::IoError;
pub use serial::{Parity, SerialConfig};

/// Inbound byte chunks of a single link. Closes when the reader stops.
pub type InboundRx = mpsc::Receiver<Vec<u8>>;

/// Write/close half of an open link.
#[async_trait]
pub trait Transport: Send {
    /// Device path this transport was opened on.
    fn path(&self) -> &str;

    /// Write one complete frame.
    async fn write(&mut self, frame: &[u8]) -> Result<(), IoError>;

    /// Release the device. Must be safe to call more than once.
    async fn close(&mut self);
}

/// An opened transport plus the inbound stream that belongs to it.
pub struct TransportLink {
    pub transport: Box<dyn Transport>,
    pub inbound: InboundRx,
}

/// Opens transports for a device path.
#[async_trait]
pub trait TransportOpener: Send + Sync {
    async fn open(&self, path: &str, config: &SerialConfig) -> Result<TransportLink, IoError>;
}
