// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sample motor control
//!
//! Drives the linear sample stage. Position is read back through an LVDT
//! displacement sensor; direction is a plain coil with no strobe.

use serde::Serialize;

use crate::error::TransportError;
use crate::modbus::ModbusTransport;
use crate::registers::MotorAddresses;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MotorStatus {
    pub enabled: bool,
    /// True drives the stage up, false down.
    pub direction: bool,
    pub speed: f32,
    /// LVDT displacement reading.
    pub lvdt: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct MotorControl {
    addrs: MotorAddresses,
}

impl MotorControl {
    pub fn new(addrs: MotorAddresses) -> Self {
        Self { addrs }
    }

    pub async fn refresh(
        &self,
        transport: &mut dyn ModbusTransport,
        status: &mut MotorStatus,
    ) -> Result<(), TransportError> {
        status.enabled = transport.read_coil(self.addrs.enable_coil).await?;
        status.direction = transport.read_coil(self.addrs.direction_coil).await?;
        status.speed = transport.read_float_holding(self.addrs.speed_hold).await?;
        status.lvdt = transport.read_float_input(self.addrs.lvdt_inp).await?;
        Ok(())
    }

    pub async fn set_enabled(
        &self,
        transport: &mut dyn ModbusTransport,
        enabled: bool,
    ) -> Result<(), TransportError> {
        transport.write_coil(self.addrs.enable_coil, enabled).await
    }

    pub async fn set_direction(
        &self,
        transport: &mut dyn ModbusTransport,
        up: bool,
    ) -> Result<(), TransportError> {
        transport.write_coil(self.addrs.direction_coil, up).await
    }

    pub async fn set_speed(
        &self,
        transport: &mut dyn ModbusTransport,
        speed: f32,
    ) -> Result<(), TransportError> {
        transport.write_float(self.addrs.speed_hold, speed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::MockTransport;
    use crate::registers::MOTOR;

    #[tokio::test]
    async fn setters_land_in_their_addresses() {
        let mut mock = MockTransport::new();
        let control = MotorControl::new(MOTOR);

        control.set_enabled(&mut mock, true).await.unwrap();
        control.set_direction(&mut mock, false).await.unwrap();
        control.set_speed(&mut mock, 1.25).await.unwrap();

        assert!(mock.coil(MOTOR.enable_coil));
        assert!(!mock.coil(MOTOR.direction_coil));
        assert_eq!(mock.float_holding(MOTOR.speed_hold), 1.25);
    }

    #[tokio::test]
    async fn refresh_reads_lvdt() {
        let mut mock = MockTransport::new();
        mock.set_float_input(MOTOR.lvdt_inp, -0.35);

        let control = MotorControl::new(MOTOR);
        let mut status = MotorStatus::default();
        control.refresh(&mut mock, &mut status).await.unwrap();

        assert_eq!(status.lvdt, -0.35);
    }
}
