mod cli;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use aquatron_core::{DeviceSettings, VoutEntry};
use aquatron_device::{CallOptions, DeviceLink, LinkConfig};
use aquatron_emulator::{EmulatorServer, Instrument};
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, EmulateArgs, SettingsArgs, parse_hex};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Command::Emulate(args) = &cli.command {
        return emulate(args).await;
    }
    run_link(cli).await
}

fn load_config(cli: &Cli) -> Result<LinkConfig> {
    let config = match &cli.config {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LinkConfig::from_env().context("reading link configuration from the environment")?,
    };
    if !config.has_transport() {
        bail!("no transport configured; set SERIAL_PORT, TCP_HOST/TCP_PORT or WS_URL, or pass --config");
    }
    Ok(config)
}

async fn run_link(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let (link, handle) = DeviceLink::builder(config).start();
    let shutdown = handle.shutdown_token();

    let result: Result<()> = async {
        if let Some(mode) = &cli.mode {
            link.set_transport_mode(mode)?;
        }
        let via = link
            .wait_until_connected(Duration::from_millis(cli.connect_timeout_ms))
            .await
            .context("no transport came up")?;
        info!(via = %via, "Connected");

        let mut options = CallOptions::new().with_cancel(shutdown.child_token());
        if let Some(transport) = &cli.transport {
            options = options.with_transport(transport.clone());
        }
        execute(&link, &cli.command, &options).await
    }
    .await;

    handle.shutdown().await;
    result
}

async fn execute(link: &DeviceLink, command: &Command, options: &CallOptions) -> Result<()> {
    match command {
        Command::Monitor => monitor(link).await,
        Command::Status => print_json(&link.get_device_status(options).await?),
        Command::Ready => print_json(&link.request_device_ready(options).await?),
        Command::Settings => print_json(&link.get_device_settings(options).await?),
        Command::SetSettings(args) => {
            print_json(&link.set_device_settings(&settings_from(args), options).await?)
        }
        Command::Feedback => print_json(&link.get_feedback_info(options).await?),
        Command::SwParams { elements } => {
            print_json(&link.send_sw_parameters(elements, options).await?)
        }
        Command::Raw { hex, cmd } => {
            let bytes = parse_hex(hex).map_err(anyhow::Error::msg)?;
            match cmd {
                Some(cmd) => print_json(&link.send_command(*cmd, &bytes, options).await?),
                None => print_json(&link.send_raw(&bytes, options).await),
            }
        }
        Command::Emulate(_) => bail!("emulate does not use the device link"),
    }
}

async fn monitor(link: &DeviceLink) -> Result<()> {
    let mut events = link.subscribe();
    print_json(&link.transport_status())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Monitor fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn settings_from(args: &SettingsArgs) -> DeviceSettings {
    DeviceSettings {
        freefall: args.freefall,
        hptf: args.hptf,
        harmonic: args.harmonic,
        duration_ms: args.duration_ms,
        vout_table: args.vout.iter().map(VoutEntry::for_element).collect(),
    }
}

async fn emulate(args: &EmulateArgs) -> Result<()> {
    let device_id = parse_hex(&args.device_id).map_err(anyhow::Error::msg)?;
    let instrument = Instrument::builder()
        .with_device_id(device_id)
        .answer_ready(!args.silent)
        .build();

    let mut server = EmulatorServer::new(instrument);
    if args.heartbeat_ms > 0 {
        server = server.with_heartbeat(Duration::from_millis(args.heartbeat_ms));
    }

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    let shutdown = CancellationToken::new();
    let serve = tokio::spawn(server.serve(listener, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    shutdown.cancel();
    serve.await??;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
