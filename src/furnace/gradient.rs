// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Thermal gradient control
//!
//! Maintains a wanted temperature difference between the two heaters over a
//! known physical distance. The high-heater selection is a coil read back as
//! an index (0 selects heater A, 1 selects heater B). Wanted value, distance
//! and high-heater changes all go through the gradient update strobe.

use serde::Serialize;

use super::strobe;
use crate::error::TransportError;
use crate::modbus::ModbusTransport;
use crate::registers::GradientAddresses;

/// Last polled state of the gradient control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GradientStatus {
    pub enabled: bool,
    /// Measured temperature difference per unit distance.
    pub actual: f32,
    /// Difference the PLC is currently steering towards.
    pub theoretical: f32,
    pub wanted: f32,
    pub distance: f32,
    /// 0 selects heater A as the hot end, 1 selects heater B.
    pub high_heater: u8,
}

/// Register operations for the gradient control.
#[derive(Debug, Clone, Copy)]
pub struct GradientControl {
    addrs: GradientAddresses,
}

impl GradientControl {
    pub fn new(addrs: GradientAddresses) -> Self {
        Self { addrs }
    }

    pub async fn refresh(
        &self,
        transport: &mut dyn ModbusTransport,
        status: &mut GradientStatus,
    ) -> Result<(), TransportError> {
        status.enabled = transport.read_coil(self.addrs.enable_coil).await?;
        status.actual = transport.read_float_input(self.addrs.actual_inp).await?;
        status.theoretical = transport.read_float_input(self.addrs.theory_inp).await?;
        status.wanted = transport.read_float_holding(self.addrs.wanted_hold).await?;
        status.distance = transport.read_float_holding(self.addrs.distance_hold).await?;
        status.high_heater = transport.read_coil_as_index(self.addrs.high_coil).await?;
        Ok(())
    }

    pub async fn set_enabled(
        &self,
        transport: &mut dyn ModbusTransport,
        enabled: bool,
    ) -> Result<(), TransportError> {
        transport.write_coil(self.addrs.enable_coil, enabled).await
    }

    pub async fn set_wanted(
        &self,
        transport: &mut dyn ModbusTransport,
        wanted: f32,
    ) -> Result<(), TransportError> {
        transport.write_float(self.addrs.wanted_hold, wanted).await?;
        strobe(transport, self.addrs.update_coil).await
    }

    pub async fn set_distance(
        &self,
        transport: &mut dyn ModbusTransport,
        distance: f32,
    ) -> Result<(), TransportError> {
        transport.write_float(self.addrs.distance_hold, distance).await?;
        strobe(transport, self.addrs.update_coil).await
    }

    /// Select which heater is the hot end, 0 for A and anything else for B.
    pub async fn set_high_heater(
        &self,
        transport: &mut dyn ModbusTransport,
        index: u8,
    ) -> Result<(), TransportError> {
        transport.write_coil(self.addrs.high_coil, index != 0).await?;
        strobe(transport, self.addrs.update_coil).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::MockTransport;
    use crate::registers::{self, GRADIENT};

    #[tokio::test]
    async fn refresh_projects_high_coil_onto_index() {
        let mut mock = MockTransport::new();
        mock.set_coil(GRADIENT.high_coil, true);
        mock.set_float_input(GRADIENT.actual_inp, 3.5);
        mock.set_float_holding(GRADIENT.wanted_hold, 4.0);

        let control = GradientControl::new(GRADIENT);
        let mut status = GradientStatus::default();
        control.refresh(&mut mock, &mut status).await.unwrap();

        assert_eq!(status.high_heater, 1);
        assert_eq!(status.actual, 3.5);
        assert_eq!(status.wanted, 4.0);
    }

    #[tokio::test]
    async fn every_setter_strobes_the_update_coil() {
        let mut mock = MockTransport::new();
        let control = GradientControl::new(GRADIENT);

        control.set_wanted(&mut mock, 5.0).await.unwrap();
        control.set_distance(&mut mock, 25.0).await.unwrap();
        control.set_high_heater(&mut mock, 0).await.unwrap();

        assert_eq!(mock.coil_writes(registers::GRADIENT_UPDATE_COIL), 3);
        assert_eq!(mock.float_holding(GRADIENT.wanted_hold), 5.0);
        assert_eq!(mock.float_holding(GRADIENT.distance_hold), 25.0);
        assert!(!mock.coil(GRADIENT.high_coil));
    }
}
