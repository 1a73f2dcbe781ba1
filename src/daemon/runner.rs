// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Background task runner
//!
//! Drives the two periodic loops of the control system:
//! - the read loop polls the furnace PLC registers at a slow interval and
//!   refreshes the shared snapshot
//! - the stream loop drains the telemetry socket at twice the sample rate,
//!   decodes packets into the acquisition buffer and flushes full batches
//!   to the persistence sink
//!
//! The loops are independently startable and stoppable through atomic
//! flags checked once per sleep interval, so a stop request takes effect
//! within one interval and never interrupts an iteration halfway. A fatal
//! telemetry socket failure stops both loops rather than leaving a session
//! silently half-open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::buffer::{AcquisitionBuffer, SECONDARY_GROUP};
use crate::error::TransportError;
use crate::furnace::{FurnaceController, FurnaceState};
use crate::sink::PersistenceSink;
use crate::telemetry::{PacketDecoder, TelemetryClient};

pub type SharedBuffer = Arc<Mutex<AcquisitionBuffer>>;
pub type SharedSink = Arc<Mutex<Box<dyn PersistenceSink>>>;

pub struct BackgroundTaskRunner {
    furnace: FurnaceController,
    telemetry: Arc<Mutex<TelemetryClient>>,
    decoder: Arc<Mutex<PacketDecoder>>,
    buffer: SharedBuffer,
    sink: SharedSink,
    read_interval: Duration,
    stream_interval: Duration,
    read_enabled: Arc<AtomicBool>,
    stream_enabled: Arc<AtomicBool>,
    read_handle: Option<JoinHandle<()>>,
    stream_handle: Option<JoinHandle<()>>,
}

impl BackgroundTaskRunner {
    pub fn new(
        furnace: FurnaceController,
        telemetry: TelemetryClient,
        decoder: PacketDecoder,
        buffer: AcquisitionBuffer,
        sink: Box<dyn PersistenceSink>,
        read_interval: Duration,
        stream_interval: Duration,
    ) -> Self {
        Self {
            furnace,
            telemetry: Arc::new(Mutex::new(telemetry)),
            decoder: Arc::new(Mutex::new(decoder)),
            buffer: Arc::new(Mutex::new(buffer)),
            sink: Arc::new(Mutex::new(sink)),
            read_interval,
            stream_interval,
            read_enabled: Arc::new(AtomicBool::new(false)),
            stream_enabled: Arc::new(AtomicBool::new(false)),
            read_handle: None,
            stream_handle: None,
        }
    }

    /// Handle to the acquisition buffer, for event recording.
    pub fn buffer(&self) -> SharedBuffer {
        self.buffer.clone()
    }

    /// Handle to the persistence sink, for retargeting.
    pub fn sink(&self) -> SharedSink {
        self.sink.clone()
    }

    pub fn is_read_running(&self) -> bool {
        self.read_enabled.load(Ordering::Relaxed)
    }

    pub fn is_stream_running(&self) -> bool {
        self.stream_enabled.load(Ordering::Relaxed)
    }

    /// Connect the telemetry socket and reset the decoder's counter history.
    pub async fn connect_telemetry(&self) -> Result<(), TransportError> {
        self.telemetry.lock().await.connect().await?;
        self.decoder.lock().await.reset_session();
        Ok(())
    }

    pub async fn close_telemetry(&self) {
        if let Err(e) = self.telemetry.lock().await.close().await {
            warn!("telemetry close failed: {e}");
        }
    }

    pub fn start_read_loop(&mut self) {
        if self.read_enabled.swap(true, Ordering::SeqCst) {
            warn!("read loop is already running");
            return;
        }
        info!("starting register read loop ({:?} interval)", self.read_interval);
        let furnace = self.furnace.clone();
        let enabled = self.read_enabled.clone();
        let interval = self.read_interval;
        self.read_handle = Some(tokio::spawn(read_loop(furnace, enabled, interval)));
    }

    /// Request the read loop to stop; observed by the next iteration.
    pub fn stop_read_loop(&self) {
        self.read_enabled.store(false, Ordering::SeqCst);
    }

    pub fn start_stream_loop(&mut self) {
        if self.stream_enabled.swap(true, Ordering::SeqCst) {
            warn!("stream loop is already running");
            return;
        }
        info!(
            "starting telemetry stream loop ({:?} interval)",
            self.stream_interval
        );
        let ctx = StreamContext {
            furnace: self.furnace.clone(),
            telemetry: self.telemetry.clone(),
            decoder: self.decoder.clone(),
            buffer: self.buffer.clone(),
            sink: self.sink.clone(),
            enabled: self.stream_enabled.clone(),
            read_enabled: self.read_enabled.clone(),
            interval: self.stream_interval,
        };
        self.stream_handle = Some(tokio::spawn(stream_loop(ctx)));
    }

    /// Request the stream loop to stop; observed by the next iteration.
    pub fn stop_stream_loop(&self) {
        self.stream_enabled.store(false, Ordering::SeqCst);
    }

    /// Stop both loops and wait for their tasks to finish.
    pub async fn shutdown(&mut self) {
        self.stop_read_loop();
        self.stop_stream_loop();
        if let Some(handle) = self.read_handle.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.stream_handle.take() {
            let _ = handle.await;
        }
        self.close_telemetry().await;
    }
}

async fn read_loop(furnace: FurnaceController, enabled: Arc<AtomicBool>, interval: Duration) {
    while enabled.load(Ordering::SeqCst) {
        sleep(interval).await;
        if !enabled.load(Ordering::SeqCst) {
            break;
        }
        // Polling stays suspended while disconnected; reconnecting is an
        // explicit operator action, never automatic.
        if !furnace.is_connected().await {
            continue;
        }
        if let Err(e) = furnace.poll_registers().await {
            warn!("register poll failed, suspending until reconnect: {e}");
            furnace.disconnect().await;
        }
    }
    info!("register read loop stopped");
}

struct StreamContext {
    furnace: FurnaceController,
    telemetry: Arc<Mutex<TelemetryClient>>,
    decoder: Arc<Mutex<PacketDecoder>>,
    buffer: SharedBuffer,
    sink: SharedSink,
    enabled: Arc<AtomicBool>,
    read_enabled: Arc<AtomicBool>,
    interval: Duration,
}

async fn stream_loop(ctx: StreamContext) {
    while ctx.enabled.load(Ordering::SeqCst) {
        sleep(ctx.interval).await;
        if !ctx.enabled.load(Ordering::SeqCst) {
            break;
        }

        let received = ctx.telemetry.lock().await.recv_packet().await;
        let bytes = match received {
            Ok(None) => continue,
            Ok(Some(bytes)) => bytes,
            Err(TransportError::NotConnected) => continue,
            Err(e) => {
                // A dead telemetry socket mid-acquisition invalidates the
                // session; stop both loops so it cannot limp on half-open.
                error!("telemetry socket failed: {e}; stopping both loops");
                ctx.enabled.store(false, Ordering::SeqCst);
                ctx.read_enabled.store(false, Ordering::SeqCst);
                break;
            }
        };

        let reading = match ctx.decoder.lock().await.decode(&bytes) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("telemetry packet dropped: {e}");
                continue;
            }
        };

        let mut buffer = ctx.buffer.lock().await;
        buffer.append(&reading);
        if buffer.is_full() {
            let state = ctx.furnace.state().await;
            let mut sink = ctx.sink.lock().await;
            if let Err(e) = buffer.flush(sink.as_mut()) {
                warn!("buffer flush failed: {e}");
            }
            if let Err(e) = sink.write(SECONDARY_GROUP, &slow_record(&state)) {
                warn!("slow record write failed: {e}");
            }
            if let Err(e) = buffer.flush_events(sink.as_mut()) {
                warn!("event flush failed: {e}");
            }
        }
    }
    info!("telemetry stream loop stopped");
}

/// One low-frequency snapshot of the control-plane values, emitted per
/// buffer flush alongside the fast temperature batch.
fn slow_record(state: &FurnaceState) -> Vec<(String, Vec<f64>)> {
    [
        ("setpoint_a", state.pid_a.setpoint),
        ("setpoint_b", state.pid_b.setpoint),
        ("output_a", state.pid_a.output),
        ("output_b", state.pid_b.output),
        ("gradient_actual", state.gradient.actual),
        ("aspc_midpoint", state.aspc.midpoint),
        ("motor_lvdt", state.motor.lvdt),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), vec![f64::from(value)]))
    .collect()
}
