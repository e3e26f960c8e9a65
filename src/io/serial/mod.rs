// src/io/serial/mod.rs
//
// Serial port driver for the controller link.
//
// Features:
// - Port open with fixed line settings (19200 8N1 by default)
// - Background blocking reader that forwards raw chunks to the supervisor
// - Frame writes from the supervisor's event loop

pub mod transport;
pub(crate) mod utils;

pub use transport::{SerialOpener, SerialTransport};
pub use utils::{parse_parity, Parity, SerialConfig};
