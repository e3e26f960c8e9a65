// src/io/serial/utils.rs
//
// Line settings for the controller link and their conversion to the
// serialport crate's types.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, StopBits};

use crate::io::error::IoError;

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// Single-letter form used in `8N1`-style log lines.
    pub fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Line configuration used when opening the controller's port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl Default for SerialConfig {
    /// 19200 8N1, the controller firmware's fixed setting.
    fn default() -> Self {
        Self {
            baud_rate: 19200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        }
    }
}

impl SerialConfig {
    /// Short `19200 8N1` description for logs.
    pub fn describe(&self) -> String {
        format!(
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }

    /// Reject settings the serialport crate cannot express.
    pub fn validate(&self) -> Result<(), IoError> {
        if self.baud_rate == 0 {
            return Err(IoError::configuration("baud rate must be non-zero"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(IoError::configuration(format!(
                "invalid data bits {} (expected 5-8)",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(IoError::configuration(format!(
                "invalid stop bits {} (expected 1 or 2)",
                self.stop_bits
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type
pub fn to_serialport_parity(p: &Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Parse a parity string ("none", "odd", "even"), case-insensitive
pub fn parse_parity(s: &str) -> Result<Parity, IoError> {
    match s.to_lowercase().as_str() {
        "none" | "n" => Ok(Parity::None),
        "odd" | "o" => Ok(Parity::Odd),
        "even" | "e" => Ok(Parity::Even),
        other => Err(IoError::configuration(format!("unknown parity '{}'", other))),
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert stop bits count to serialport crate's StopBits type
pub fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_19200_8n1() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.describe(), "19200 8N1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SerialConfig::default();
        config.data_bits = 9;
        assert!(config.validate().is_err());

        let mut config = SerialConfig::default();
        config.stop_bits = 0;
        assert!(config.validate().is_err());

        let mut config = SerialConfig::default();
        config.baud_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_parity() {
        assert_eq!(parse_parity("none").unwrap(), Parity::None);
        assert_eq!(parse_parity("ODD").unwrap(), Parity::Odd);
        assert_eq!(parse_parity("e").unwrap(), Parity::Even);
        assert!(parse_parity("mark").is_err());
    }

    #[test]
    fn test_to_serialport_parity() {
        assert!(matches!(to_serialport_parity(&Parity::None), SpParity::None));
        assert!(matches!(to_serialport_parity(&Parity::Odd), SpParity::Odd));
        assert!(matches!(to_serialport_parity(&Parity::Even), SpParity::Even));
    }

    #[test]
    fn test_to_serialport_data_bits() {
        assert!(matches!(to_serialport_data_bits(5), DataBits::Five));
        assert!(matches!(to_serialport_data_bits(7), DataBits::Seven));
        assert!(matches!(to_serialport_data_bits(8), DataBits::Eight));
    }

    #[test]
    fn test_to_serialport_stop_bits() {
        assert!(matches!(to_serialport_stop_bits(1), StopBits::One));
        assert!(matches!(to_serialport_stop_bits(2), StopBits::Two));
    }
}
