// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Standalone monitoring entry point: connects both PLCs and the telemetry
// socket, runs the background loops and persists buffered readings until
// interrupted. Acquisition sequencing is driven by the control plane
// through the library API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::signal;

use furnace_control::buffer::AcquisitionBuffer;
use furnace_control::config::Config;
use furnace_control::daemon::BackgroundTaskRunner;
use furnace_control::furnace::FurnaceController;
use furnace_control::modbus::{shared, MockTransport, SharedTransport, TcpTransport};
use furnace_control::sink::JsonlSink;
use furnace_control::telemetry::{PacketDecoder, PacketLayout, TelemetryClient};
use furnace_control::trigger::TriggerSynchronizer;

/// Supervisory control for a laboratory furnace and camera experiment rig
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Use in-memory mock PLCs instead of real Modbus connections
    #[arg(long, default_value_t = false)]
    mock: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn plc_addr(address: &str, port: u16) -> Result<SocketAddr> {
    format!("{address}:{port}")
        .parse()
        .with_context(|| format!("invalid PLC address {address}:{port}"))
}

fn transport(args: &Args, addr: SocketAddr, timeout: Duration) -> SharedTransport {
    if args.mock {
        shared(MockTransport::new())
    } else {
        shared(TcpTransport::new(addr, timeout))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(validate_path) = args.validate_config {
        let config = Config::from_file(&validate_path)?;
        config.validate()?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let config = Config::from_file(&config_path)?;

    let request_timeout = Duration::from_millis(config.modbus.request_timeout_ms);
    let furnace_addr = plc_addr(&config.modbus.furnace_address, config.modbus.furnace_port)?;
    let trigger_addr = plc_addr(&config.modbus.trigger_address, config.modbus.trigger_port)?;
    let telemetry_addr = plc_addr(&config.telemetry.address, config.telemetry.port)?;

    let furnace = FurnaceController::new(
        transport(&args, furnace_addr, request_timeout),
        config.acquisition.max_setpoint_step,
    );
    if let Err(e) = furnace.connect().await {
        warn!("furnace PLC unreachable, starting disconnected: {e}");
    }

    let trigger_transport = transport(&args, trigger_addr, request_timeout);
    if let Err(e) = trigger_transport.lock().await.connect().await {
        warn!("trigger PLC unreachable, starting disconnected: {e}");
    }
    let timer_names: Vec<String> = config
        .triggers
        .timers
        .iter()
        .map(|t| t.name.clone())
        .collect();
    let mut triggers =
        TriggerSynchronizer::new(trigger_transport, &timer_names, &config.triggers.reference)?;
    for timer in &config.triggers.timers {
        if let Err(e) = triggers.set_frequency(&timer.name, timer.frequency_hz).await {
            warn!("could not set initial frequency for '{}': {e}", timer.name);
        }
    }
    // Come up in the free-running preview state.
    if let Err(e) = triggers.set_preview(true).await {
        warn!("could not enable preview: {e}");
    }
    if let Err(e) = triggers.set_all_enabled(true).await {
        warn!("could not enable trigger timers: {e}");
    }

    let layout = if config.telemetry.diagnostics {
        PacketLayout::Diagnostic
    } else {
        PacketLayout::Legacy
    };
    let mut runner = BackgroundTaskRunner::new(
        furnace.clone(),
        TelemetryClient::new(telemetry_addr, layout.packet_size(), config.stream_interval()),
        PacketDecoder::new(layout),
        AcquisitionBuffer::new(config.buffer_threshold()),
        Box::new(JsonlSink::new(&config.acquisition.filepath)),
        config.read_interval(),
        config.stream_interval(),
    );
    if let Err(e) = runner.connect_telemetry().await {
        warn!("telemetry socket unreachable, stream loop will idle: {e}");
    }

    runner.start_read_loop();
    runner.start_stream_loop();
    info!("furnace control running, press Ctrl+C to stop");

    signal::ctrl_c().await?;
    info!("shutting down");

    runner.shutdown().await;
    if let Err(e) = triggers.set_all_enabled(false).await {
        warn!("could not disable trigger timers: {e}");
    }
    if let Err(e) = furnace.stop_all_heating().await {
        warn!("could not disable heating on shutdown: {e}");
    }
    furnace.disconnect().await;
    Ok(())
}
