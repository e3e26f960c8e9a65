// src/io/codec.rs
//
// Wire codec for the controller's ASCII command protocol.
//
// Outbound frames (4 bytes, no terminator):
//   R...      handshake / reset request, sent once per link
//   L...      enable motor output
//   D...      disable motor output
//   Fnnn      set target frequency, nnn = zero-padded decimal Hz
//
// Inbound:
//   H<any>    heartbeat, anything else is line noise and ignored

/// Handshake frame written as soon as a link opens.
pub const HANDSHAKE_FRAME: &[u8] = b"R...";
/// Motor enable frame.
pub const MOTOR_ENABLE_FRAME: &[u8] = b"L...";
/// Motor disable frame.
pub const MOTOR_DISABLE_FRAME: &[u8] = b"D...";
/// Opcode prefix of the frequency frame.
pub const FREQUENCY_OPCODE: u8 = b'F';
/// First byte of every heartbeat frame.
pub const HEARTBEAT_MARKER: u8 = b'H';

/// Width of the decimal field in a frequency frame.
const FREQUENCY_DIGITS: u32 = 3;

/// An outbound command, already past caller-side validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Handshake,
    Motor(bool),
    Frequency(u32),
}

impl Command {
    /// Encode the command into its wire frame.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Command::Handshake => encode_handshake(),
            Command::Motor(on) => encode_motor(on),
            Command::Frequency(hz) => encode_frequency(hz),
        }
    }
}

/// A heartbeat received from the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatEvent;

pub fn encode_handshake() -> Vec<u8> {
    HANDSHAKE_FRAME.to_vec()
}

pub fn encode_motor(on: bool) -> Vec<u8> {
    if on {
        MOTOR_ENABLE_FRAME.to_vec()
    } else {
        MOTOR_DISABLE_FRAME.to_vec()
    }
}

/// Encode a frequency frame (`F` + three zero-padded digits).
///
/// The encoder does not range-check: callers reject anything outside
/// 40..=120 Hz before it gets here. Only 0..=999 has a defined encoding;
/// larger values keep their last three digits so the frame is always
/// exactly four bytes.
pub fn encode_frequency(hz: u32) -> Vec<u8> {
    let field = hz % 10u32.pow(FREQUENCY_DIGITS);
    let mut frame = Vec::with_capacity(1 + FREQUENCY_DIGITS as usize);
    frame.push(FREQUENCY_OPCODE);
    frame.extend_from_slice(format!("{:03}", field).as_bytes());
    frame
}

/// Decode an inbound chunk.
///
/// Returns a heartbeat when the chunk starts with the marker, `None` for
/// everything else (including empty chunks).
pub fn decode_inbound(bytes: &[u8]) -> Option<HeartbeatEvent> {
    match bytes.first() {
        Some(&HEARTBEAT_MARKER) => Some(HeartbeatEvent),
        _ => None,
    }
}
