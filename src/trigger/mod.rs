// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Trigger PLC timers
//!
//! Each named trigger is a PLC-side timer that pulses a camera at a
//! configured frequency until its frame target is reached. The timers live
//! on a dedicated PLC with its own register map; [`sync::TriggerSynchronizer`]
//! keeps their frequencies and targets mutually consistent.
//!
//! The frequency holding register carries the half period in microseconds,
//! computed with two floor divisions. That rounding is lossy for
//! frequencies that do not divide 1 MHz evenly, but it is what the firmware
//! expects, so it must not be changed unilaterally.

pub mod sync;

pub use sync::TriggerSynchronizer;

use serde::Serialize;

use crate::error::TransportError;
use crate::modbus::ModbusTransport;
use crate::registers::TriggerAddresses;

/// Half period in microseconds for a pulse frequency, with the firmware's
/// floor-division rounding.
pub fn half_period_us(frequency: f64) -> f64 {
    ((1_000_000.0 / frequency).floor() / 2.0).floor()
}

/// Process-lifetime mirror of one PLC timer.
#[derive(Debug, Clone, Serialize)]
pub struct Trigger {
    pub name: String,
    #[serde(skip)]
    addrs: TriggerAddresses,
    /// Pulse frequency in Hz, 0.0 until first set.
    pub frequency: f64,
    /// Frame target, 0 means uncapped.
    pub target: u64,
    pub enabled: bool,
}

impl Trigger {
    pub fn new(name: impl Into<String>, addrs: TriggerAddresses) -> Self {
        Self {
            name: name.into(),
            addrs,
            frequency: 0.0,
            target: 0,
            enabled: false,
        }
    }

    /// Write the timer's frequency register and remember the value.
    /// The caller validates positivity.
    pub async fn write_frequency(
        &mut self,
        transport: &mut dyn ModbusTransport,
        frequency: f64,
    ) -> Result<(), TransportError> {
        transport
            .write_float(self.addrs.freq_hold, half_period_us(frequency) as f32)
            .await?;
        self.frequency = frequency;
        Ok(())
    }

    /// Write the timer's frame target register and remember the value.
    pub async fn write_target(
        &mut self,
        transport: &mut dyn ModbusTransport,
        target: u64,
    ) -> Result<(), TransportError> {
        transport
            .write_float(self.addrs.target_hold, target as f32)
            .await?;
        self.target = target;
        Ok(())
    }

    /// Arm or stop the timer through its one-shot coils. The firmware
    /// clears the coil after acting on it.
    pub async fn set_enabled(
        &mut self,
        transport: &mut dyn ModbusTransport,
        enabled: bool,
    ) -> Result<(), TransportError> {
        let coil = if enabled {
            self.addrs.enable_coil
        } else {
            self.addrs.disable_coil
        };
        transport.write_coil(coil, true).await?;
        self.enabled = enabled;
        Ok(())
    }

    /// Read the timer's running status coil.
    pub async fn is_running(
        &self,
        transport: &mut dyn ModbusTransport,
    ) -> Result<bool, TransportError> {
        transport.read_coil(self.addrs.running_coil).await
    }
}
