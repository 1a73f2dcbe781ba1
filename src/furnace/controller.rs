// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Furnace controller
//!
//! Aggregates the subsystem controls behind one shared transport and one
//! shared state snapshot. The register read loop calls [`FurnaceController::poll_registers`]
//! to refresh the snapshot in a single transport pass; user-facing setters
//! validate against the snapshot before writing.
//!
//! The controller also owns the acquisition coil. The coil on the PLC and
//! the in-process `acquiring` flag must agree at all times, so the flag is
//! only flipped after the coil write succeeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use tokio::sync::RwLock;

use super::{strobe, AspcControl, AspcStatus, GradientControl, GradientStatus};
use super::{MotorControl, MotorStatus, PidChannel, PidStatus};
use crate::error::{ControlError, TransportError, ValidationError};
use crate::modbus::SharedTransport;
use crate::registers::{
    self, ASPC, COUNTER_INP, FURNACE_FREQ_HOLD, GRADIENT, MOTOR, PID_A, PID_B, THERMOCOUPLE_C_INP,
    THERMOCOUPLE_D_INP,
};

/// Which heater channel a PID operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaterChannel {
    A,
    B,
}

/// Snapshot of everything the furnace PLC reports, refreshed by the read
/// loop and cloned out to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FurnaceState {
    pub connected: bool,
    pub acquiring: bool,
    /// PLC loop counter.
    pub counter: f32,
    pub thermocouple_c: f32,
    pub thermocouple_d: f32,
    pub sample_frequency: f32,
    pub pid_a: PidStatus,
    pub pid_b: PidStatus,
    pub gradient: GradientStatus,
    pub aspc: AspcStatus,
    pub motor: MotorStatus,
}

#[derive(Clone)]
pub struct FurnaceController {
    transport: SharedTransport,
    state: Arc<RwLock<FurnaceState>>,
    acquiring: Arc<AtomicBool>,
    pid_a: PidChannel,
    pid_b: PidChannel,
    gradient: GradientControl,
    aspc: AspcControl,
    motor: MotorControl,
}

impl FurnaceController {
    pub fn new(transport: SharedTransport, max_setpoint_step: f32) -> Self {
        Self {
            transport,
            state: Arc::new(RwLock::new(FurnaceState::default())),
            acquiring: Arc::new(AtomicBool::new(false)),
            pid_a: PidChannel::new(PID_A, max_setpoint_step),
            pid_b: PidChannel::new(PID_B, max_setpoint_step),
            gradient: GradientControl::new(GRADIENT),
            aspc: AspcControl::new(ASPC),
            motor: MotorControl::new(MOTOR),
        }
    }

    /// Clone of the last polled snapshot.
    pub async fn state(&self) -> FurnaceState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquiring.load(Ordering::SeqCst)
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.lock().await.connect().await?;
        self.state.write().await.connected = true;
        info!("furnace PLC connected");
        Ok(())
    }

    /// Close the transport and flag the snapshot as stale.
    ///
    /// Also used by the read loop after a poll failure; polling stays
    /// suspended until an explicit [`FurnaceController::connect`].
    pub async fn disconnect(&self) {
        if let Err(e) = self.transport.lock().await.close().await {
            warn!("furnace PLC close failed: {e}");
        }
        self.state.write().await.connected = false;
    }

    /// Refresh the whole snapshot in one transport pass.
    ///
    /// Holds the transport for the duration of the pass so a concurrent
    /// setter cannot interleave, then publishes the new snapshot atomically.
    pub async fn poll_registers(&self) -> Result<FurnaceState, TransportError> {
        let mut next = *self.state.read().await;
        {
            let mut guard = self.transport.lock().await;
            let transport = guard.as_mut();
            next.counter = transport.read_float_input(COUNTER_INP).await?;
            next.thermocouple_c = transport.read_float_input(THERMOCOUPLE_C_INP).await?;
            next.thermocouple_d = transport.read_float_input(THERMOCOUPLE_D_INP).await?;
            next.sample_frequency = transport.read_float_holding(FURNACE_FREQ_HOLD).await?;
            self.pid_a.refresh(transport, &mut next.pid_a).await?;
            self.pid_b.refresh(transport, &mut next.pid_b).await?;
            self.gradient.refresh(transport, &mut next.gradient).await?;
            self.aspc.refresh(transport, &mut next.aspc).await?;
            self.motor.refresh(transport, &mut next.motor).await?;
        }
        next.connected = true;
        next.acquiring = self.is_acquiring();
        *self.state.write().await = next;
        Ok(next)
    }

    /// Drive the acquisition coil, keeping the in-process flag consistent.
    ///
    /// The coil is written first; if the write fails the flag keeps its
    /// previous value, so flag and coil always agree.
    pub async fn set_acquisition(&self, active: bool) -> Result<(), TransportError> {
        self.transport
            .lock()
            .await
            .write_coil(registers::ACQUISITION_COIL, active)
            .await?;
        self.acquiring.store(active, Ordering::SeqCst);
        self.state.write().await.acquiring = active;
        Ok(())
    }

    fn pid(&self, channel: HeaterChannel) -> &PidChannel {
        match channel {
            HeaterChannel::A => &self.pid_a,
            HeaterChannel::B => &self.pid_b,
        }
    }

    /// Change one heater setpoint, validated against the last polled value.
    pub async fn set_setpoint(
        &self,
        channel: HeaterChannel,
        wanted: f32,
    ) -> Result<(), ControlError> {
        let current = {
            let state = self.state.read().await;
            match channel {
                HeaterChannel::A => state.pid_a.setpoint,
                HeaterChannel::B => state.pid_b.setpoint,
            }
        };
        {
            let mut guard = self.transport.lock().await;
            self.pid(channel)
                .set_setpoint(guard.as_mut(), current, wanted)
                .await?;
        }
        // Cache the accepted value so a follow-up change is validated
        // against it before the next poll lands.
        let mut state = self.state.write().await;
        match channel {
            HeaterChannel::A => state.pid_a.setpoint = wanted,
            HeaterChannel::B => state.pid_b.setpoint = wanted,
        }
        info!("heater {channel:?} setpoint set to {wanted}");
        Ok(())
    }

    pub async fn set_pid_enabled(
        &self,
        channel: HeaterChannel,
        enabled: bool,
    ) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.pid(channel).set_enabled(guard.as_mut(), enabled).await
    }

    pub async fn set_pid_gains(
        &self,
        channel: HeaterChannel,
        kp: f32,
        ki: f32,
        kd: f32,
    ) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.pid(channel).set_gains(guard.as_mut(), kp, ki, kd).await
    }

    pub async fn set_gradient_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.gradient.set_enabled(guard.as_mut(), enabled).await
    }

    pub async fn set_gradient_wanted(&self, wanted: f32) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.gradient.set_wanted(guard.as_mut(), wanted).await
    }

    pub async fn set_gradient_distance(&self, distance: f32) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.gradient.set_distance(guard.as_mut(), distance).await
    }

    pub async fn set_gradient_high_heater(&self, index: u8) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.gradient.set_high_heater(guard.as_mut(), index).await
    }

    pub async fn set_aspc_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.aspc.set_enabled(guard.as_mut(), enabled).await
    }

    pub async fn set_aspc_heating(&self, heating: bool) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.aspc.set_heating(guard.as_mut(), heating).await
    }

    pub async fn set_aspc_rate(&self, rate: f32) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.aspc.set_rate(guard.as_mut(), rate).await
    }

    pub async fn set_aspc_img_degree(&self, img_degree: f32) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.aspc.set_img_degree(guard.as_mut(), img_degree).await
    }

    pub async fn set_motor_enabled(&self, enabled: bool) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.motor.set_enabled(guard.as_mut(), enabled).await
    }

    pub async fn set_motor_direction(&self, up: bool) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.motor.set_direction(guard.as_mut(), up).await
    }

    pub async fn set_motor_speed(&self, speed: f32) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        self.motor.set_speed(guard.as_mut(), speed).await
    }

    /// Change the PLC sample frequency. Shares its update strobe with the
    /// auto set-point rate.
    pub async fn set_sample_frequency(&self, frequency: f32) -> Result<(), ControlError> {
        if frequency <= 0.0 {
            return Err(ValidationError::NonPositiveFrequency(f64::from(frequency)).into());
        }
        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut();
        transport.write_float(FURNACE_FREQ_HOLD, frequency).await?;
        strobe(transport, registers::FREQ_ASPC_UPDATE_COIL).await?;
        Ok(())
    }

    /// Disable every heat source and the motor, in one transport pass.
    /// Used on shutdown.
    pub async fn stop_all_heating(&self) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut();
        self.pid_a.set_enabled(transport, false).await?;
        self.pid_b.set_enabled(transport, false).await?;
        self.gradient.set_enabled(transport, false).await?;
        self.aspc.set_enabled(transport, false).await?;
        self.motor.set_enabled(transport, false).await?;
        info!("all heating and motion disabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::{shared, MockTransport, SharedMock};
    use tokio::sync::Mutex;

    async fn setup(max_step: f32) -> (FurnaceController, Arc<Mutex<MockTransport>>) {
        let (facade, handle) = SharedMock::new();
        let controller = FurnaceController::new(shared(facade), max_step);
        (controller, handle)
    }

    #[tokio::test]
    async fn poll_snapshots_all_subsystems_in_one_pass() {
        let (controller, mock) = setup(25.0).await;
        {
            let mut m = mock.lock().await;
            m.set_float_input(COUNTER_INP, 42.0);
            m.set_float_input(THERMOCOUPLE_C_INP, 24.5);
            m.set_float_holding(FURNACE_FREQ_HOLD, 50.0);
            m.set_coil(PID_A.enable_coil, true);
            m.set_float_holding(PID_A.setpoint_hold, 400.0);
            m.set_coil(GRADIENT.high_coil, true);
            m.set_float_holding(MOTOR.speed_hold, 0.5);
        }

        let state = controller.poll_registers().await.unwrap();
        assert_eq!(state.counter, 42.0);
        assert_eq!(state.thermocouple_c, 24.5);
        assert_eq!(state.sample_frequency, 50.0);
        assert!(state.pid_a.enabled);
        assert_eq!(state.pid_a.setpoint, 400.0);
        assert_eq!(state.gradient.high_heater, 1);
        assert_eq!(state.motor.speed, 0.5);
        assert!(state.connected);
        assert_eq!(controller.state().await, state);
    }

    #[tokio::test]
    async fn acquisition_flag_stays_consistent_with_coil_on_failure() {
        let (controller, mock) = setup(25.0).await;

        controller.set_acquisition(true).await.unwrap();
        assert!(controller.is_acquiring());
        assert!(mock.lock().await.coil(registers::ACQUISITION_COIL));

        mock.lock().await.fail_after(1);
        assert!(controller.set_acquisition(false).await.is_err());
        // Write failed: coil unchanged on the device, flag unchanged here.
        assert!(controller.is_acquiring());
        assert!(mock.lock().await.coil(registers::ACQUISITION_COIL));

        controller.set_acquisition(false).await.unwrap();
        assert!(!controller.is_acquiring());
        assert!(!mock.lock().await.coil(registers::ACQUISITION_COIL));
    }

    #[tokio::test]
    async fn setpoint_validated_against_cached_state() {
        let (controller, mock) = setup(10.0).await;
        mock.lock().await.set_float_holding(PID_A.setpoint_hold, 100.0);
        controller.poll_registers().await.unwrap();

        let err = controller
            .set_setpoint(HeaterChannel::A, 115.0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::Validation(ValidationError::SetpointStepTooLarge { .. })
        ));

        controller.set_setpoint(HeaterChannel::A, 108.0).await.unwrap();
        // The accepted value becomes the new baseline before the next poll.
        controller.set_setpoint(HeaterChannel::A, 117.0).await.unwrap();
        assert_eq!(mock.lock().await.float_holding(PID_A.setpoint_hold), 117.0);
    }

    #[tokio::test]
    async fn non_positive_sample_frequency_is_rejected() {
        let (controller, mock) = setup(25.0).await;
        assert!(controller.set_sample_frequency(0.0).await.is_err());
        assert!(controller.set_sample_frequency(-5.0).await.is_err());
        assert!(mock.lock().await.writes.is_empty());
        controller.set_sample_frequency(50.0).await.unwrap();
        assert_eq!(mock.lock().await.float_holding(FURNACE_FREQ_HOLD), 50.0);
    }

    #[tokio::test]
    async fn stop_all_heating_clears_every_enable_coil() {
        let (controller, mock) = setup(25.0).await;
        {
            let mut m = mock.lock().await;
            m.set_coil(PID_A.enable_coil, true);
            m.set_coil(PID_B.enable_coil, true);
            m.set_coil(GRADIENT.enable_coil, true);
            m.set_coil(ASPC.enable_coil, true);
            m.set_coil(MOTOR.enable_coil, true);
        }

        controller.stop_all_heating().await.unwrap();

        let m = mock.lock().await;
        for addr in [
            PID_A.enable_coil,
            PID_B.enable_coil,
            GRADIENT.enable_coil,
            ASPC.enable_coil,
            MOTOR.enable_coil,
        ] {
            assert!(!m.coil(addr));
        }
    }
}
