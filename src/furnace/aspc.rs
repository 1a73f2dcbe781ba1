// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Auto set-point control
//!
//! Ramps both heater setpoints at a configured rate, heating or cooling,
//! centred on the midpoint the PLC reports. The rate shares its update
//! strobe with the sample-frequency register, so a rate change and a
//! frequency change are applied through the same coil.

use serde::Serialize;

use super::strobe;
use crate::error::TransportError;
use crate::modbus::ModbusTransport;
use crate::registers::AspcAddresses;

/// Last polled state of auto set-point control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AspcStatus {
    pub enabled: bool,
    /// True when ramping up, false when cooling.
    pub heating: bool,
    /// Setpoint change per second.
    pub rate: f32,
    /// Midpoint between the two current setpoints, reported by the PLC.
    pub midpoint: f32,
    /// Degrees of setpoint movement per camera frame.
    pub img_degree: f32,
}

/// Register operations for auto set-point control.
#[derive(Debug, Clone, Copy)]
pub struct AspcControl {
    addrs: AspcAddresses,
}

impl AspcControl {
    pub fn new(addrs: AspcAddresses) -> Self {
        Self { addrs }
    }

    pub async fn refresh(
        &self,
        transport: &mut dyn ModbusTransport,
        status: &mut AspcStatus,
    ) -> Result<(), TransportError> {
        status.enabled = transport.read_coil(self.addrs.enable_coil).await?;
        status.heating = transport.read_coil(self.addrs.heating_coil).await?;
        status.rate = transport.read_float_holding(self.addrs.rate_hold).await?;
        status.midpoint = transport.read_float_input(self.addrs.midpt_inp).await?;
        status.img_degree = transport.read_float_holding(self.addrs.imgdegree_hold).await?;
        Ok(())
    }

    pub async fn set_enabled(
        &self,
        transport: &mut dyn ModbusTransport,
        enabled: bool,
    ) -> Result<(), TransportError> {
        transport.write_coil(self.addrs.enable_coil, enabled).await
    }

    pub async fn set_heating(
        &self,
        transport: &mut dyn ModbusTransport,
        heating: bool,
    ) -> Result<(), TransportError> {
        transport.write_coil(self.addrs.heating_coil, heating).await
    }

    pub async fn set_rate(
        &self,
        transport: &mut dyn ModbusTransport,
        rate: f32,
    ) -> Result<(), TransportError> {
        transport.write_float(self.addrs.rate_hold, rate).await?;
        strobe(transport, self.addrs.update_coil).await
    }

    pub async fn set_img_degree(
        &self,
        transport: &mut dyn ModbusTransport,
        img_degree: f32,
    ) -> Result<(), TransportError> {
        transport.write_float(self.addrs.imgdegree_hold, img_degree).await?;
        strobe(transport, self.addrs.update_coil).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::MockTransport;
    use crate::registers::{self, ASPC};

    #[tokio::test]
    async fn rate_change_strobes_shared_update_coil() {
        let mut mock = MockTransport::new();
        let control = AspcControl::new(ASPC);

        control.set_rate(&mut mock, 0.5).await.unwrap();

        assert_eq!(mock.float_holding(ASPC.rate_hold), 0.5);
        assert_eq!(mock.coil_writes(registers::FREQ_ASPC_UPDATE_COIL), 1);
    }

    #[tokio::test]
    async fn refresh_reads_both_coils() {
        let mut mock = MockTransport::new();
        mock.set_coil(ASPC.enable_coil, true);
        mock.set_coil(ASPC.heating_coil, false);
        mock.set_float_input(ASPC.midpt_inp, 350.0);

        let control = AspcControl::new(ASPC);
        let mut status = AspcStatus::default();
        control.refresh(&mut mock, &mut status).await.unwrap();

        assert!(status.enabled);
        assert!(!status.heating);
        assert_eq!(status.midpoint, 350.0);
    }
}
