use std::net::SocketAddr;
use std::path::PathBuf;

use aquatron_core::{ElementSpec, Harmonic};
use clap::{Args, Parser, Subcommand};

/// Talk to an Aquatron instrument over serial, TCP, WebSocket or BLE.
///
/// Without `--config` the link is configured from the environment
/// (`SERIAL_PORT`, `TCP_HOST`/`TCP_PORT`, `WS_URL`, ...).
#[derive(Parser, Debug)]
#[command(name = "aquatron", version, long_about = None)]
pub struct Cli {
    /// TOML link configuration
    #[arg(short, long, global = true, env = "AQUATRON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Global transport mode (wifi, uart, tcp, bluetooth, auto)
    #[arg(short, long, global = true)]
    pub mode: Option<String>,

    /// Per-call transport override
    #[arg(short, long, global = true)]
    pub transport: Option<String>,

    /// How long to wait for a transport to come up, in milliseconds
    #[arg(long, global = true, default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every device event as a JSON line until interrupted
    Monitor,

    /// Probe readiness (status timeout)
    Status,

    /// Explicit ready request
    Ready,

    /// Read the device settings
    Settings,

    /// Write device settings
    SetSettings(SettingsArgs),

    /// Read the closed-loop feedback statistics
    Feedback,

    /// Send SW parameters, e.g. `sw-params Li:5 Na:2`
    SwParams {
        #[arg(required = true, num_args = 1..)]
        elements: Vec<ElementSpec>,
    },

    /// Send bytes as-is, or a framed command with `--cmd`
    Raw {
        /// Hex bytes, e.g. `AA0200A855` or `aa 02 00 a8 55`
        hex: String,

        /// Frame the hex as the payload of this command code
        #[arg(long, value_parser = parse_u8)]
        cmd: Option<u8>,
    },

    /// Serve an emulated instrument on a TCP port
    Emulate(EmulateArgs),
}

#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub freefall: i16,

    #[arg(long, allow_hyphen_values = true)]
    pub hptf: i16,

    /// full, half or quarter
    #[arg(long, default_value = "full")]
    pub harmonic: Harmonic,

    #[arg(long)]
    pub duration_ms: u16,

    /// Element symbols for the vout table, filled from the built-in profiles
    #[arg(long, value_delimiter = ',')]
    pub vout: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EmulateArgs {
    #[arg(long, default_value = "127.0.0.1:3333")]
    pub listen: SocketAddr,

    /// Heartbeat interval in milliseconds (0 disables heartbeats)
    #[arg(long, default_value_t = 2000)]
    pub heartbeat_ms: u64,

    /// Device id announced in heartbeat and ready frames, as hex
    #[arg(long, default_value = "01")]
    pub device_id: String,

    /// Never answer with DEVICE_IS_READY
    #[arg(long)]
    pub silent: bool,
}

/// Parse `0x0B`, `0B` or `11`.
fn parse_u8(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None if value.chars().any(|c| c.is_ascii_alphabetic()) => u8::from_str_radix(value, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid command code '{value}': {e}"))
}

/// Parse hex bytes, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("invalid hex digit '{bad}' in '{input}'"));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{input}'"));
    }

    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).map_err(|e| e.to_string())?;
            u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte '{pair}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case("AA0200A855", vec![0xAA, 0x02, 0x00, 0xA8, 0x55])]
    #[case("aa 02 00 a8 55", vec![0xAA, 0x02, 0x00, 0xA8, 0x55])]
    #[case("0x0b", vec![0x0B])]
    #[case("", vec![])]
    fn test_parse_hex(#[case] input: &str, #[case] expected: Vec<u8>) {
        assert_eq!(parse_hex(input).unwrap(), expected);
    }

    #[rstest]
    #[case("ABC")]
    #[case("ZZ")]
    #[case("aéb")]
    #[case("éé")]
    #[case("0x+1")]
    fn test_parse_hex_rejects(#[case] input: &str) {
        assert!(parse_hex(input).is_err());
    }

    #[rstest]
    #[case("0x0B", 0x0B)]
    #[case("0C", 0x0C)]
    #[case("4", 4)]
    fn test_parse_u8(#[case] input: &str, #[case] expected: u8) {
        assert_eq!(parse_u8(input).unwrap(), expected);
    }

    #[test]
    fn test_sw_params_arguments() {
        let cli = Cli::try_parse_from(["aquatron", "sw-params", "Li:5", "Na:2", "-t", "uart"]).unwrap();
        assert_eq!(cli.transport.as_deref(), Some("uart"));
        match cli.command {
            Command::SwParams { elements } => {
                assert_eq!(elements, vec![ElementSpec::new("Li", 5), ElementSpec::new("Na", 2)]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_set_settings_arguments() {
        let cli = Cli::try_parse_from([
            "aquatron",
            "set-settings",
            "--freefall",
            "-2",
            "--hptf",
            "10",
            "--harmonic",
            "half",
            "--duration-ms",
            "1000",
            "--vout",
            "Li,Na",
        ])
        .unwrap();
        match cli.command {
            Command::SetSettings(args) => {
                assert_eq!(args.freefall, -2);
                assert_eq!(args.harmonic, Harmonic::Half);
                assert_eq!(args.vout, vec!["Li", "Na"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
