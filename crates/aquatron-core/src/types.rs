use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical transport identity, as reported in `via` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "ws")]
    WebSocket,
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "serial")]
    Serial,
    #[serde(rename = "bluetooth")]
    Bluetooth,
}

impl TransportKind {
    /// Auto-mode priority order.
    pub const PRIORITY: [TransportKind; 4] = [
        TransportKind::WebSocket,
        TransportKind::Tcp,
        TransportKind::Serial,
        TransportKind::Bluetooth,
    ];

    /// Short wire name used in events and send outcomes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => "ws",
            Self::Tcp => "tcp",
            Self::Serial => "serial",
            Self::Bluetooth => "bluetooth",
        }
    }

    /// Human-readable name used in "not connected" errors.
    pub fn label(&self) -> &'static str {
        match self {
            Self::WebSocket => "WiFi/WebSocket",
            Self::Tcp => "TCP",
            Self::Serial => "UART/Serial",
            Self::Bluetooth => "Bluetooth",
        }
    }

    /// Prefix of the status codes emitted on connect/disconnect.
    pub fn status_prefix(&self) -> &'static str {
        match self {
            Self::WebSocket => "ws",
            Self::Tcp => "tcp",
            Self::Serial => "serial",
            Self::Bluetooth => "ble",
        }
    }

    /// Stable slot index (position in [`TransportKind::PRIORITY`]).
    pub fn index(&self) -> usize {
        match self {
            Self::WebSocket => 0,
            Self::Tcp => 1,
            Self::Serial => 2,
            Self::Bluetooth => 3,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide transport selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TransportMode {
    Wifi,
    Uart,
    Tcp,
    Bluetooth,
    #[default]
    Auto,
}

impl TransportMode {
    /// Normalize a user-supplied transport name.
    ///
    /// Matching is case-insensitive and accepts the common aliases
    /// (`ws`, `websocket`, `serial`, `com`, `net`, `ble`). Returns `None`
    /// for anything else.
    ///
    /// # Examples
    ///
    /// ```
    /// use aquatron_core::TransportMode;
    ///
    /// assert_eq!(TransportMode::normalize("WebSocket"), Some(TransportMode::Wifi));
    /// assert_eq!(TransportMode::normalize("COM"), Some(TransportMode::Uart));
    /// assert_eq!(TransportMode::normalize("carrier-pigeon"), None);
    /// ```
    pub fn normalize(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "wifi" | "ws" | "websocket" => Some(Self::Wifi),
            "uart" | "serial" | "com" => Some(Self::Uart),
            "tcp" | "net" => Some(Self::Tcp),
            "bluetooth" | "ble" => Some(Self::Bluetooth),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    /// Canonical name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::Uart => "uart",
            Self::Tcp => "tcp",
            Self::Bluetooth => "bluetooth",
            Self::Auto => "auto",
        }
    }

    /// The single transport this mode pins, or `None` for auto.
    pub fn target(&self) -> Option<TransportKind> {
        match self {
            Self::Wifi => Some(TransportKind::WebSocket),
            Self::Uart => Some(TransportKind::Serial),
            Self::Tcp => Some(TransportKind::Tcp),
            Self::Bluetooth => Some(TransportKind::Bluetooth),
            Self::Auto => None,
        }
    }

    /// Compact encoding for atomic storage.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Wifi => 0,
            Self::Uart => 1,
            Self::Tcp => 2,
            Self::Bluetooth => 3,
            Self::Auto => 4,
        }
    }

    /// Inverse of [`TransportMode::as_u8`]; unknown values decode as auto.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Wifi,
            1 => Self::Uart,
            2 => Self::Tcp,
            3 => Self::Bluetooth,
            _ => Self::Auto,
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::normalize(s).ok_or_else(|| Error::InvalidTransportMode(s.to_string()))
    }
}

impl TryFrom<String> for TransportMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Per-element drive profile used by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementProfile {
    pub vout_base: f32,
    pub freq: u32,
}

impl ElementProfile {
    pub const ZERO: ElementProfile = ElementProfile {
        vout_base: 0.0,
        freq: 0,
    };
}

/// Drive profiles keyed by element symbol.
const ELEMENT_PROFILES: &[(&str, ElementProfile)] = &[
    ("Li", ElementProfile { vout_base: 1.20, freq: 1000 }),
    ("Na", ElementProfile { vout_base: 1.35, freq: 1200 }),
    ("K", ElementProfile { vout_base: 1.50, freq: 1400 }),
    ("Mg", ElementProfile { vout_base: 1.65, freq: 1600 }),
    ("Ca", ElementProfile { vout_base: 1.80, freq: 1800 }),
    ("Fe", ElementProfile { vout_base: 2.05, freq: 2200 }),
    ("Cu", ElementProfile { vout_base: 2.20, freq: 2400 }),
    ("Zn", ElementProfile { vout_base: 2.35, freq: 2600 }),
    ("Pb", ElementProfile { vout_base: 2.80, freq: 3200 }),
    ("Cd", ElementProfile { vout_base: 2.95, freq: 3400 }),
    ("Hg", ElementProfile { vout_base: 3.10, freq: 3600 }),
    ("As", ElementProfile { vout_base: 3.25, freq: 3800 }),
];

/// Look up the drive profile for an element symbol.
///
/// Unknown symbols map to [`ElementProfile::ZERO`]; this is not an error.
///
/// # Examples
///
/// ```
/// use aquatron_core::{ElementProfile, element_profile};
///
/// assert_eq!(element_profile("Li").freq, 1000);
/// assert_eq!(element_profile("Xx"), ElementProfile::ZERO);
/// ```
pub fn element_profile(symbol: &str) -> ElementProfile {
    ELEMENT_PROFILES
        .iter()
        .find(|(sym, _)| *sym == symbol)
        .map(|(_, profile)| *profile)
        .unwrap_or(ElementProfile::ZERO)
}

/// One element requested in a SW-parameters command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub symbol: String,
    pub quantity: u16,
}

impl ElementSpec {
    pub fn new(symbol: impl Into<String>, quantity: u16) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
        }
    }

    /// Drive profile for this element's symbol.
    pub fn profile(&self) -> ElementProfile {
        element_profile(&self.symbol)
    }
}

impl FromStr for ElementSpec {
    type Err = Error;

    /// Parse `SYMBOL:QUANTITY`, e.g. `Li:5`.
    fn from_str(s: &str) -> Result<Self> {
        let (symbol, quantity) = s
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("Expected SYMBOL:QUANTITY, got '{s}'")))?;
        let quantity = quantity
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid quantity in '{s}'")))?;
        Ok(Self::new(symbol.trim(), quantity))
    }
}

/// Output waveform mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Harmonic {
    #[default]
    Full,
    Half,
    Quarter,
}

impl Harmonic {
    pub fn code(&self) -> u8 {
        match self {
            Self::Full => 0,
            Self::Half => 1,
            Self::Quarter => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Full),
            1 => Some(Self::Half),
            2 => Some(Self::Quarter),
            _ => None,
        }
    }
}

impl FromStr for Harmonic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "0" => Ok(Self::Full),
            "half" | "1" => Ok(Self::Half),
            "quarter" | "2" => Ok(Self::Quarter),
            _ => Err(Error::Config(format!("Invalid harmonic mode '{s}'"))),
        }
    }
}

/// One row of the device vout table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoutEntry {
    pub symbol: String,
    pub vout_base: f32,
    pub freq: u32,
}

impl VoutEntry {
    /// Build a row from the static element profile table.
    pub fn for_element(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let profile = element_profile(&symbol);
        Self {
            symbol,
            vout_base: profile.vout_base,
            freq: profile.freq,
        }
    }
}

/// Settings written to the instrument.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub freefall: i16,
    pub hptf: i16,
    pub harmonic: Harmonic,
    pub duration_ms: u16,
    #[serde(default)]
    pub vout_table: Vec<VoutEntry>,
}
