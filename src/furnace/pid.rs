// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PID heater channel control
//!
//! Each of the two heater channels runs a PID loop on the PLC itself; this
//! module only reads the loop state back and writes tuning values. Setpoint
//! changes are rate-limited by a configurable maximum step so a typo cannot
//! command a thermal shock, and are applied through the setpoint update
//! strobe so the firmware picks both registers up atomically.

use serde::Serialize;

use super::strobe;
use crate::error::{ControlError, TransportError, ValidationError};
use crate::modbus::ModbusTransport;
use crate::registers::PidAddresses;

/// Last polled state of one PID heater channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PidStatus {
    pub enabled: bool,
    pub setpoint: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub output: f32,
    pub output_sum: f32,
    pub temperature: f32,
}

/// Register operations for one PID heater channel.
#[derive(Debug, Clone, Copy)]
pub struct PidChannel {
    addrs: PidAddresses,
    max_setpoint_step: f32,
}

impl PidChannel {
    pub fn new(addrs: PidAddresses, max_setpoint_step: f32) -> Self {
        Self {
            addrs,
            max_setpoint_step,
        }
    }

    /// Read the channel's coil and registers into `status`.
    pub async fn refresh(
        &self,
        transport: &mut dyn ModbusTransport,
        status: &mut PidStatus,
    ) -> Result<(), TransportError> {
        status.enabled = transport.read_coil(self.addrs.enable_coil).await?;
        status.temperature = transport.read_float_input(self.addrs.thermocouple_inp).await?;
        status.output = transport.read_float_input(self.addrs.output_inp).await?;
        status.output_sum = transport.read_float_input(self.addrs.outputsum_inp).await?;
        status.setpoint = transport.read_float_holding(self.addrs.setpoint_hold).await?;
        status.kp = transport.read_float_holding(self.addrs.kp_hold).await?;
        status.ki = transport.read_float_holding(self.addrs.ki_hold).await?;
        status.kd = transport.read_float_holding(self.addrs.kd_hold).await?;
        Ok(())
    }

    pub async fn set_enabled(
        &self,
        transport: &mut dyn ModbusTransport,
        enabled: bool,
    ) -> Result<(), TransportError> {
        transport.write_coil(self.addrs.enable_coil, enabled).await
    }

    /// Write a new setpoint and strobe the update coil.
    ///
    /// Rejected without touching the PLC when the change from `current`
    /// exceeds the maximum step.
    pub async fn set_setpoint(
        &self,
        transport: &mut dyn ModbusTransport,
        current: f32,
        wanted: f32,
    ) -> Result<(), ControlError> {
        let step = (wanted - current).abs();
        if step > self.max_setpoint_step {
            return Err(ValidationError::SetpointStepTooLarge {
                step,
                max: self.max_setpoint_step,
            }
            .into());
        }
        transport.write_float(self.addrs.setpoint_hold, wanted).await?;
        strobe(transport, self.addrs.setpoint_update_coil).await?;
        Ok(())
    }

    /// Write the three PID gains. Gains take effect on the next loop pass,
    /// no strobe involved.
    pub async fn set_gains(
        &self,
        transport: &mut dyn ModbusTransport,
        kp: f32,
        ki: f32,
        kd: f32,
    ) -> Result<(), TransportError> {
        transport.write_float(self.addrs.kp_hold, kp).await?;
        transport.write_float(self.addrs.ki_hold, ki).await?;
        transport.write_float(self.addrs.kd_hold, kd).await?;
        Ok(())
    }
}
