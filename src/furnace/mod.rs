// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Furnace PLC control
//!
//! One submodule per hardware subsystem (the two PID heater channels, the
//! thermal gradient, auto set-point control and the sample motor), each
//! pairing a status snapshot with the register operations that refresh and
//! change it. [`controller::FurnaceController`] aggregates them behind a
//! shared transport and owns the acquisition coil.

pub mod aspc;
pub mod controller;
pub mod gradient;
pub mod motor;
pub mod pid;

pub use aspc::{AspcControl, AspcStatus};
pub use controller::{FurnaceController, FurnaceState, HeaterChannel};
pub use gradient::{GradientControl, GradientStatus};
pub use motor::{MotorControl, MotorStatus};
pub use pid::{PidChannel, PidStatus};

use crate::error::TransportError;
use crate::modbus::ModbusTransport;

/// Strobe an update coil. The firmware applies pending holding-register
/// values when the coil goes high and clears it itself.
pub(crate) async fn strobe(
    transport: &mut dyn ModbusTransport,
    coil: u16,
) -> Result<(), TransportError> {
    transport.write_coil(coil, true).await
}
