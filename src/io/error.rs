// src/io/error.rs
//
// Typed transport errors. Command boundaries still speak `String`, so every
// variant converts with `String::from`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    /// The device could not be opened or configured.
    #[error("{device}: connection failed: {message}")]
    Connection { device: String, message: String },

    /// A frame could not be written to the device.
    #[error("{device}: write failed: {message}")]
    Write { device: String, message: String },

    /// The inbound byte stream failed.
    #[error("{device}: read failed: {message}")]
    Read { device: String, message: String },

    /// Invalid settings (bad baud rate, unknown parity, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The transport was already closed.
    #[error("{device}: transport closed")]
    Closed { device: String },
}

impl IoError {
    pub fn connection(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn write(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Write {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn read(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Read {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        IoError::Configuration(message.into())
    }

    pub fn closed(device: impl Into<String>) -> Self {
        IoError::Closed {
            device: device.into(),
        }
    }
}

impl From<IoError> for String {
    fn from(e: IoError) -> Self {
        e.to_string()
    }
}
