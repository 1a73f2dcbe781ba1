// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Telemetry stream configuration

use serde::{Deserialize, Serialize};

/// Configuration for the telemetry TCP stream.
///
/// The furnace PLC pushes temperature packets on a socket next to its
/// Modbus port. The sample frequency must match the PLC's configured rate:
/// the stream loop polls at half the sample period to avoid backlog, and
/// the buffer flush threshold is one second's worth of samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Address of the telemetry socket, normally the furnace PLC.
    pub address: String,

    /// TCP port of the telemetry socket.
    pub port: u16,

    /// Samples per second pushed by the PLC.
    pub sample_frequency_hz: f64,

    /// When true, the PLC is flashed with the extended packet layout that
    /// carries full PID diagnostics per sample.
    pub diagnostics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            address: "192.168.0.159".to_string(),
            port: 4444,
            sample_frequency_hz: 50.0,
            diagnostics: false,
        }
    }
}
