//! Command codes of the Aquatron instrument protocol.
//!
//! The command byte sits right after the frame header:
//!
//! ```text
//! AA  <cmd>  <len>  <payload>  <checksum>  55
//!     ^^^^^
//! ```
//!
//! # Directions
//!
//! Host to instrument:
//! - `GetDeviceReady` (0x02)
//! - `SendSwParameters` (0x04)
//! - `SetDeviceSettings` (0x06)
//! - `GetDeviceSettings` (0x07)
//! - `GetFeedbackInfo` (0x09)
//!
//! Instrument to host:
//! - `DeviceOnline` (0x01), the periodic heartbeat
//! - `DeviceIsReady` (0x03)
//! - `DataAck` (0x05)
//! - `DeviceSettings` (0x08)
//! - `FeedbackInfo` (0x0A)
//! - `AdcData` (0x0B) and `StatData` (0x0C), unsolicited telemetry
//!
//! ```
//! use aquatron_protocol::CommandCode;
//!
//! let cmd = CommandCode::from_u8(0x03).unwrap();
//! assert_eq!(cmd, CommandCode::DeviceIsReady);
//! assert_eq!(cmd.as_u8(), 0x03);
//! assert!(CommandCode::from_u8(0x7F).is_none());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandCode {
    DeviceOnline,
    GetDeviceReady,
    DeviceIsReady,
    SendSwParameters,
    DataAck,
    SetDeviceSettings,
    GetDeviceSettings,
    DeviceSettings,
    GetFeedbackInfo,
    FeedbackInfo,
    AdcData,
    StatData,
}

impl CommandCode {
    pub const ALL: [CommandCode; 12] = [
        CommandCode::DeviceOnline,
        CommandCode::GetDeviceReady,
        CommandCode::DeviceIsReady,
        CommandCode::SendSwParameters,
        CommandCode::DataAck,
        CommandCode::SetDeviceSettings,
        CommandCode::GetDeviceSettings,
        CommandCode::DeviceSettings,
        CommandCode::GetFeedbackInfo,
        CommandCode::FeedbackInfo,
        CommandCode::AdcData,
        CommandCode::StatData,
    ];

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::DeviceOnline => 0x01,
            Self::GetDeviceReady => 0x02,
            Self::DeviceIsReady => 0x03,
            Self::SendSwParameters => 0x04,
            Self::DataAck => 0x05,
            Self::SetDeviceSettings => 0x06,
            Self::GetDeviceSettings => 0x07,
            Self::DeviceSettings => 0x08,
            Self::GetFeedbackInfo => 0x09,
            Self::FeedbackInfo => 0x0A,
            Self::AdcData => 0x0B,
            Self::StatData => 0x0C,
        }
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.as_u8() == code)
    }

    /// Commands that deliver work to the instrument and are therefore
    /// bracketed by the ready handshake.
    pub fn requires_handshake(&self) -> bool {
        matches!(self, Self::SendSwParameters | Self::SetDeviceSettings)
    }

    /// Whether the host is the sender of this command.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            Self::GetDeviceReady
                | Self::SendSwParameters
                | Self::SetDeviceSettings
                | Self::GetDeviceSettings
                | Self::GetFeedbackInfo
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceOnline => "device-online",
            Self::GetDeviceReady => "get-device-ready",
            Self::DeviceIsReady => "device-is-ready",
            Self::SendSwParameters => "send-sw-parameters",
            Self::DataAck => "data-ack",
            Self::SetDeviceSettings => "set-device-settings",
            Self::GetDeviceSettings => "get-device-settings",
            Self::DeviceSettings => "device-settings",
            Self::GetFeedbackInfo => "get-feedback-info",
            Self::FeedbackInfo => "feedback-info",
            Self::AdcData => "adc-data",
            Self::StatData => "stat-data",
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.as_u8())
    }
}

impl From<CommandCode> for u8 {
    fn from(cmd: CommandCode) -> u8 {
        cmd.as_u8()
    }
}
