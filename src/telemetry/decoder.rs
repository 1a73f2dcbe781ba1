// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Telemetry packet decoder
//!
//! The PLC pushes fixed-size binary packets of little-endian 32-bit floats
//! with no framing delimiter. Two layouts exist: the legacy three-float
//! packet (counter and both thermocouple temperatures) and the diagnostic
//! layout mirroring the firmware buffer struct, which adds the full PID
//! state for both heater channels. The layout is chosen at construction and
//! fixes the packet size; decoding is pure and does no I/O.

use serde::Serialize;

use crate::error::DecodeError;

/// Size in bytes of one little-endian f32 field.
const FIELD_SIZE: usize = 4;

/// Wire layout of the telemetry packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLayout {
    /// counter, temperature_a, temperature_b
    Legacy,
    /// counter plus temperature, output, kp, ki, kd, last_input,
    /// output_sum and setpoint for each of the two PID channels.
    Diagnostic,
}

impl PacketLayout {
    /// Exact packet size in bytes.
    pub const fn packet_size(self) -> usize {
        match self {
            PacketLayout::Legacy => 3 * FIELD_SIZE,
            PacketLayout::Diagnostic => 17 * FIELD_SIZE,
        }
    }
}

/// Full PID state for one heater channel, present in diagnostic packets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidDiagnostics {
    pub temperature: f32,
    pub output: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub last_input: f32,
    pub output_sum: f32,
    pub setpoint: f32,
}

/// One decoded telemetry sample. Immutable once decoded; ownership moves
/// into the acquisition buffer on arrival.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryReading {
    /// Monotonic frame counter assigned by the PLC.
    pub counter: u64,
    pub temperature_a: f32,
    pub temperature_b: f32,
    /// Extended fields, only present with [`PacketLayout::Diagnostic`].
    pub diagnostics_a: Option<PidDiagnostics>,
    pub diagnostics_b: Option<PidDiagnostics>,
}

/// Stateful decoder for one telemetry session.
///
/// Tracks the last frame counter seen so a regression (corrupted or
/// re-ordered stream) is reported instead of silently accepted.
pub struct PacketDecoder {
    layout: PacketLayout,
    last_counter: Option<u64>,
}

impl PacketDecoder {
    pub fn new(layout: PacketLayout) -> Self {
        Self {
            layout,
            last_counter: None,
        }
    }

    /// Exact number of bytes one receive must request.
    pub fn packet_size(&self) -> usize {
        self.layout.packet_size()
    }

    /// Forget the counter history, called at the start of a new session.
    pub fn reset_session(&mut self) {
        self.last_counter = None;
    }

    /// Decode one packet. Fails if the byte length does not match the
    /// layout exactly or if the frame counter went backwards.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<TelemetryReading, DecodeError> {
        let expected = self.layout.packet_size();
        if bytes.len() != expected {
            return Err(DecodeError::Length {
                expected,
                got: bytes.len(),
            });
        }

        let field = |index: usize| -> f32 {
            let start = index * FIELD_SIZE;
            let mut raw = [0u8; FIELD_SIZE];
            raw.copy_from_slice(&bytes[start..start + FIELD_SIZE]);
            f32::from_le_bytes(raw)
        };

        let counter = field(0) as u64;
        if let Some(previous) = self.last_counter {
            if counter < previous {
                return Err(DecodeError::CounterRegression {
                    previous,
                    current: counter,
                });
            }
        }
        self.last_counter = Some(counter);

        let reading = match self.layout {
            PacketLayout::Legacy => TelemetryReading {
                counter,
                temperature_a: field(1),
                temperature_b: field(2),
                diagnostics_a: None,
                diagnostics_b: None,
            },
            PacketLayout::Diagnostic => {
                let channel = |base: usize| PidDiagnostics {
                    temperature: field(base),
                    output: field(base + 1),
                    kp: field(base + 2),
                    ki: field(base + 3),
                    kd: field(base + 4),
                    last_input: field(base + 5),
                    output_sum: field(base + 6),
                    setpoint: field(base + 7),
                };
                let a = channel(1);
                let b = channel(9);
                TelemetryReading {
                    counter,
                    temperature_a: a.temperature,
                    temperature_b: b.temperature,
                    diagnostics_a: Some(a),
                    diagnostics_b: Some(b),
                }
            }
        };
        Ok(reading)
    }
}
