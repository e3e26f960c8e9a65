// src/messages.rs
//
// Typed messages crossing the boundary between the link core and whatever
// front end is attached (console, desktop webview).
//
// Core -> front end:  {"type":"ARM","state":true}   {"type":"ACK"}
// Front end -> core:  {"type":"MOTOR","state":true} {"type":"FREQ","state":75}

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::io::codec::Command;

/// Notification emitted by the link core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum SinkEvent {
    /// Link went up (`true`) or is down / still searching (`false`).
    Arm { state: bool },
    /// A heartbeat arrived while connected.
    Ack,
}

/// User intent handed to the link core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Intent {
    Motor { state: bool },
    /// Target frequency in Hz. Range checking is the sender's job.
    Freq { state: u32 },
}

impl Intent {
    pub fn to_command(&self) -> Command {
        match *self {
            Intent::Motor { state } => Command::Motor(state),
            Intent::Freq { state } => Command::Frequency(state),
        }
    }
}

/// Receiver of link notifications. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: SinkEvent);
}

/// Sink that forwards events into an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: SinkEvent) {
        // A front end that went away is not the core's problem
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_event_json_shape() {
        assert_eq!(
            serde_json::to_string(&SinkEvent::Arm { state: true }).unwrap(),
            r#"{"type":"ARM","state":true}"#
        );
        assert_eq!(
            serde_json::to_string(&SinkEvent::Ack).unwrap(),
            r#"{"type":"ACK"}"#
        );
    }

    #[test]
    fn test_intent_from_json() {
        let motor: Intent = serde_json::from_str(r#"{"type":"MOTOR","state":false}"#).unwrap();
        assert_eq!(motor, Intent::Motor { state: false });

        let freq: Intent = serde_json::from_str(r#"{"type":"FREQ","state":75}"#).unwrap();
        assert_eq!(freq, Intent::Freq { state: 75 });
        assert_eq!(freq.to_command().encode(), b"F075");
    }

    #[test]
    fn test_intent_rejects_unknown_type() {
        assert!(serde_json::from_str::<Intent>(r#"{"type":"PARE"}"#).is_err());
        assert!(serde_json::from_str::<Intent>(r#"{"type":"FREQ","state":-5}"#).is_err());
    }

    #[test]
    fn test_channel_sink_forwards_and_survives_closed_receiver() {
        let (sink, mut rx) = ChannelSink::new();
        sink.notify(SinkEvent::Ack);
        assert_eq!(rx.try_recv().unwrap(), SinkEvent::Ack);

        drop(rx);
        sink.notify(SinkEvent::Arm { state: false });
    }
}
