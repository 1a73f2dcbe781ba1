// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Trigger synchronization
//!
//! All timers must finish an acquisition in the same wall-clock duration as
//! the reference trigger, so every non-reference target is derived from the
//! reference target scaled by the frequency ratio. Frequency changes inside
//! a linked group propagate to every member and force a target recompute,
//! since the ratios just moved. Freerun uncaps every timer (target 0) and
//! restores the exact previous targets on exit.
//!
//! Every batch of register writes ends with a pulse on the value-updated
//! coil so the firmware latches the whole batch at once.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::error::{ControlError, TransportError, ValidationError};
use crate::modbus::{ModbusTransport, SharedTransport};
use crate::registers::{
    trigger_addresses, TRIG_DISABLE_ALL_COIL, TRIG_ENABLE_ALL_COIL, TRIG_PREVIEW_COIL,
    TRIG_VAL_UPDATED_COIL,
};
use crate::trigger::Trigger;

pub struct TriggerSynchronizer {
    transport: SharedTransport,
    triggers: HashMap<String, Trigger>,
    /// Names in construction order, for deterministic write ordering.
    order: Vec<String>,
    reference: String,
    /// Members of the linked group. Linking does not force immediate
    /// frequency equality; only later frequency changes propagate.
    linked: HashSet<String>,
    /// Targets captured when freerun was enabled.
    saved_targets: HashMap<String, u64>,
    freerun: bool,
}

impl TriggerSynchronizer {
    /// Build one timer per name, in order, from the trigger PLC register
    /// map. `reference` must be one of the names.
    pub fn new(
        transport: SharedTransport,
        names: &[String],
        reference: &str,
    ) -> Result<Self, ValidationError> {
        if !names.iter().any(|n| n == reference) {
            return Err(ValidationError::UnknownTrigger(reference.to_string()));
        }
        let triggers = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                (
                    name.clone(),
                    Trigger::new(name.clone(), trigger_addresses(i as u16)),
                )
            })
            .collect();
        Ok(Self {
            transport,
            triggers,
            order: names.to_vec(),
            reference: reference.to_string(),
            linked: HashSet::new(),
            saved_targets: HashMap::new(),
            freerun: false,
        })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn frequency(&self, name: &str) -> Option<f64> {
        self.triggers.get(name).map(|t| t.frequency)
    }

    pub fn target(&self, name: &str) -> Option<u64> {
        self.triggers.get(name).map(|t| t.target)
    }

    pub fn is_freerun(&self) -> bool {
        self.freerun
    }

    fn require(&self, name: &str) -> Result<(), ValidationError> {
        if self.triggers.contains_key(name) {
            Ok(())
        } else {
            Err(ValidationError::UnknownTrigger(name.to_string()))
        }
    }

    async fn pulse_updated(transport: &mut dyn ModbusTransport) -> Result<(), TransportError> {
        transport.write_coil(TRIG_VAL_UPDATED_COIL, true).await
    }

    /// Change one trigger's frequency.
    ///
    /// Propagates to the whole linked group when the trigger is a member,
    /// then recomputes every target from the reference (the ratios changed),
    /// then latches the batch.
    pub async fn set_frequency(&mut self, name: &str, hz: f64) -> Result<(), ControlError> {
        if hz <= 0.0 {
            return Err(ValidationError::NonPositiveFrequency(hz).into());
        }
        self.require(name)?;

        let affected: Vec<String> = if self.linked.contains(name) {
            self.order
                .iter()
                .filter(|n| self.linked.contains(*n))
                .cloned()
                .collect()
        } else {
            vec![name.to_string()]
        };

        let reference_target = self
            .triggers
            .get(&self.reference)
            .map(|t| t.target)
            .unwrap_or(0);

        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut();
        for affected_name in &affected {
            if let Some(trigger) = self.triggers.get_mut(affected_name) {
                trigger.write_frequency(transport, hz).await?;
            }
        }

        // Ratios moved, so every derived target is stale. Freerun keeps
        // targets pinned at zero regardless.
        let reference_frequency = self
            .triggers
            .get(&self.reference)
            .map(|t| t.frequency)
            .unwrap_or(0.0);
        if !self.freerun && reference_frequency > 0.0 {
            for trigger_name in &self.order {
                if let Some(trigger) = self.triggers.get_mut(trigger_name) {
                    let scaled = scale_target(
                        reference_target,
                        trigger.frequency,
                        reference_frequency,
                    );
                    trigger.write_target(transport, scaled).await?;
                }
            }
        }
        Self::pulse_updated(transport).await?;
        debug!("trigger '{name}' frequency set to {hz} Hz ({} affected)", affected.len());
        Ok(())
    }

    /// Set the reference trigger's frame target and derive all others.
    ///
    /// target_i = round(ref_value * f_i / f_ref). Fails before any write
    /// when the reference frequency is still unknown.
    pub async fn set_target(&mut self, reference_value: u64) -> Result<(), ControlError> {
        let reference_frequency = self
            .triggers
            .get(&self.reference)
            .map(|t| t.frequency)
            .unwrap_or(0.0);
        if reference_frequency <= 0.0 {
            return Err(ValidationError::ReferenceFrequencyUnset(self.reference.clone()).into());
        }

        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut();
        for trigger_name in &self.order {
            if let Some(trigger) = self.triggers.get_mut(trigger_name) {
                let scaled = scale_target(reference_value, trigger.frequency, reference_frequency);
                trigger.write_target(transport, scaled).await?;
            }
        }
        Self::pulse_updated(transport).await?;
        info!("trigger targets derived from reference value {reference_value}");
        Ok(())
    }

    /// Set every timer's frame target from a wall-clock duration.
    ///
    /// Each timer gets target = round(seconds * its own frequency), so all
    /// timers run for the same elapsed time regardless of rate. Timers with
    /// no frequency yet get a zero (uncapped) target.
    pub async fn set_duration(&mut self, seconds: f64) -> Result<(), ControlError> {
        if seconds <= 0.0 {
            return Err(ValidationError::NonPositiveDuration(seconds).into());
        }

        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut();
        for trigger_name in &self.order {
            if let Some(trigger) = self.triggers.get_mut(trigger_name) {
                let target = (seconds * trigger.frequency).round() as u64;
                trigger.write_target(transport, target).await?;
            }
        }
        Self::pulse_updated(transport).await?;
        info!("trigger targets derived from {seconds} s duration");
        Ok(())
    }

    /// Enter or leave freerun.
    ///
    /// Entering snapshots every target and writes zeros (uncapped); leaving
    /// restores the snapshot exactly. Re-entering while already in freerun
    /// is a no-op so the snapshot cannot be clobbered with zeros.
    pub async fn set_freerun(&mut self, enabled: bool) -> Result<(), ControlError> {
        if enabled == self.freerun {
            return Ok(());
        }

        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut();
        if enabled {
            self.saved_targets = self
                .triggers
                .iter()
                .map(|(name, t)| (name.clone(), t.target))
                .collect();
            for trigger_name in &self.order {
                if let Some(trigger) = self.triggers.get_mut(trigger_name) {
                    trigger.write_target(transport, 0).await?;
                }
            }
        } else {
            for trigger_name in &self.order {
                if let Some(trigger) = self.triggers.get_mut(trigger_name) {
                    let saved = self.saved_targets.get(trigger_name).copied().unwrap_or(0);
                    trigger.write_target(transport, saved).await?;
                }
            }
        }
        Self::pulse_updated(transport).await?;
        self.freerun = enabled;
        info!("freerun {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Write a zero target to every timer, uncapping them. Used by the
    /// acquisition stop sequence; unlike freerun this does not snapshot
    /// anything, the targets are simply gone.
    pub async fn clear_targets(&mut self) -> Result<(), TransportError> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut();
        for trigger_name in &self.order {
            if let Some(trigger) = self.triggers.get_mut(trigger_name) {
                trigger.write_target(transport, 0).await?;
            }
        }
        Self::pulse_updated(transport).await
    }

    /// Add both triggers to the linked group.
    pub fn link_triggers(&mut self, a: &str, b: &str) -> Result<(), ValidationError> {
        self.require(a)?;
        self.require(b)?;
        self.linked.insert(a.to_string());
        self.linked.insert(b.to_string());
        Ok(())
    }

    /// Remove both triggers from the linked group.
    pub fn unlink_triggers(&mut self, a: &str, b: &str) -> Result<(), ValidationError> {
        self.require(a)?;
        self.require(b)?;
        self.linked.remove(a);
        self.linked.remove(b);
        Ok(())
    }

    /// Arm or stop one timer.
    pub async fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ControlError> {
        self.require(name)?;
        let mut guard = self.transport.lock().await;
        if let Some(trigger) = self.triggers.get_mut(name) {
            trigger.set_enabled(guard.as_mut(), enabled).await?;
        }
        Ok(())
    }

    /// Arm or stop every timer through the global one-shot coils.
    pub async fn set_all_enabled(&mut self, enabled: bool) -> Result<(), TransportError> {
        let coil = if enabled {
            TRIG_ENABLE_ALL_COIL
        } else {
            TRIG_DISABLE_ALL_COIL
        };
        self.transport.lock().await.write_coil(coil, true).await?;
        for trigger in self.triggers.values_mut() {
            trigger.enabled = enabled;
        }
        Ok(())
    }

    /// Read one timer's running status coil from the PLC.
    pub async fn running(&self, name: &str) -> Result<bool, ControlError> {
        self.require(name)?;
        let mut guard = self.transport.lock().await;
        match self.triggers.get(name) {
            Some(trigger) => Ok(trigger.is_running(guard.as_mut()).await?),
            None => Ok(false),
        }
    }

    /// Drive the preview coil, which lets cameras stream frames without an
    /// acquisition running.
    pub async fn set_preview(&self, on: bool) -> Result<(), TransportError> {
        self.transport
            .lock()
            .await
            .write_coil(TRIG_PREVIEW_COIL, on)
            .await
    }
}

fn scale_target(reference_value: u64, frequency: f64, reference_frequency: f64) -> u64 {
    (reference_value as f64 * frequency / reference_frequency).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::{shared, MockTransport, SharedMock};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    async fn setup(names: &[&str], reference: &str) -> (TriggerSynchronizer, Arc<Mutex<MockTransport>>) {
        let (facade, handle) = SharedMock::new();
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let sync = TriggerSynchronizer::new(shared(facade), &names, reference).unwrap();
        (sync, handle)
    }

    #[tokio::test]
    async fn targets_scale_by_frequency_ratio() {
        let (mut sync, mock) = setup(&["furnace", "cam1"], "furnace").await;
        sync.set_frequency("furnace", 10.0).await.unwrap();
        sync.set_frequency("cam1", 5.0).await.unwrap();

        sync.set_target(1000).await.unwrap();

        assert_eq!(sync.target("furnace"), Some(1000));
        assert_eq!(sync.target("cam1"), Some(500));
        let m = mock.lock().await;
        assert_eq!(m.float_holding(trigger_addresses(0).target_hold), 1000.0);
        assert_eq!(m.float_holding(trigger_addresses(1).target_hold), 500.0);
    }

    #[tokio::test]
    async fn target_before_any_frequency_is_a_recoverable_error() {
        let (mut sync, mock) = setup(&["furnace", "cam1"], "furnace").await;
        let err = sync.set_target(1000).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Validation(ValidationError::ReferenceFrequencyUnset(_))
        ));
        assert!(mock.lock().await.writes.is_empty());
    }

    #[tokio::test]
    async fn non_positive_frequency_is_rejected() {
        let (mut sync, _mock) = setup(&["furnace"], "furnace").await;
        assert!(sync.set_frequency("furnace", 0.0).await.is_err());
        assert!(sync.set_frequency("furnace", -1.0).await.is_err());
        assert_eq!(sync.frequency("furnace"), Some(0.0));
    }

    #[tokio::test]
    async fn unknown_trigger_is_rejected() {
        let (mut sync, _mock) = setup(&["furnace"], "furnace").await;
        assert!(matches!(
            sync.set_frequency("nope", 10.0).await,
            Err(ControlError::Validation(ValidationError::UnknownTrigger(_)))
        ));
    }

    #[tokio::test]
    async fn freerun_round_trip_restores_exact_targets() {
        let (mut sync, _mock) = setup(&["a", "b"], "a").await;
        sync.set_frequency("a", 10.0).await.unwrap();
        sync.set_frequency("b", 20.0).await.unwrap();
        sync.set_target(100).await.unwrap();
        assert_eq!(sync.target("a"), Some(100));
        assert_eq!(sync.target("b"), Some(200));

        sync.set_freerun(true).await.unwrap();
        assert_eq!(sync.target("a"), Some(0));
        assert_eq!(sync.target("b"), Some(0));

        // Enabling twice must not clobber the snapshot with zeros.
        sync.set_freerun(true).await.unwrap();

        sync.set_freerun(false).await.unwrap();
        assert_eq!(sync.target("a"), Some(100));
        assert_eq!(sync.target("b"), Some(200));
    }

    #[tokio::test]
    async fn linked_triggers_share_frequency_changes() {
        let (mut sync, _mock) = setup(&["furnace", "cam1", "cam2"], "furnace").await;
        sync.set_frequency("furnace", 10.0).await.unwrap();
        sync.set_frequency("cam1", 5.0).await.unwrap();
        sync.set_frequency("cam2", 5.0).await.unwrap();

        sync.link_triggers("cam1", "cam2").unwrap();
        // Linking alone changes nothing.
        assert_eq!(sync.frequency("cam2"), Some(5.0));

        sync.set_frequency("cam1", 20.0).await.unwrap();
        assert_eq!(sync.frequency("cam1"), Some(20.0));
        assert_eq!(sync.frequency("cam2"), Some(20.0));
        assert_eq!(sync.frequency("furnace"), Some(10.0));

        sync.unlink_triggers("cam1", "cam2").unwrap();
        sync.set_frequency("cam1", 30.0).await.unwrap();
        assert_eq!(sync.frequency("cam2"), Some(20.0));
    }

    #[tokio::test]
    async fn frequency_change_rescales_existing_targets() {
        let (mut sync, _mock) = setup(&["furnace", "cam1"], "furnace").await;
        sync.set_frequency("furnace", 10.0).await.unwrap();
        sync.set_frequency("cam1", 5.0).await.unwrap();
        sync.set_target(1000).await.unwrap();

        // Doubling the camera frequency doubles its derived target.
        sync.set_frequency("cam1", 10.0).await.unwrap();
        assert_eq!(sync.target("cam1"), Some(1000));
        assert_eq!(sync.target("furnace"), Some(1000));
    }

    #[tokio::test]
    async fn batches_end_with_the_value_updated_pulse() {
        let (mut sync, mock) = setup(&["furnace"], "furnace").await;
        sync.set_frequency("furnace", 10.0).await.unwrap();
        sync.set_target(50).await.unwrap();
        assert_eq!(mock.lock().await.coil_writes(TRIG_VAL_UPDATED_COIL), 2);
    }

    #[tokio::test]
    async fn duration_scales_targets_by_each_frequency() {
        let (mut sync, mock) = setup(&["furnace", "cam1"], "furnace").await;
        sync.set_frequency("furnace", 10.0).await.unwrap();
        sync.set_frequency("cam1", 5.0).await.unwrap();
        mock.lock().await.writes.clear();

        sync.set_duration(4.0).await.unwrap();

        assert_eq!(sync.target("furnace"), Some(40));
        assert_eq!(sync.target("cam1"), Some(20));
        let m = mock.lock().await;
        assert_eq!(m.float_holding(trigger_addresses(0).target_hold), 40.0);
        assert_eq!(m.float_holding(trigger_addresses(1).target_hold), 20.0);
        assert_eq!(m.coil_writes(TRIG_VAL_UPDATED_COIL), 1);
    }

    #[tokio::test]
    async fn non_positive_duration_is_rejected() {
        let (mut sync, mock) = setup(&["furnace"], "furnace").await;
        sync.set_frequency("furnace", 10.0).await.unwrap();
        mock.lock().await.writes.clear();

        assert!(sync.set_duration(0.0).await.is_err());
        assert!(sync.set_duration(-2.0).await.is_err());
        assert!(mock.lock().await.writes.is_empty());
    }

    #[tokio::test]
    async fn running_reads_the_status_coil() {
        let (sync, mock) = setup(&["furnace", "cam1"], "furnace").await;
        mock.lock()
            .await
            .set_coil(trigger_addresses(1).running_coil, true);

        assert!(!sync.running("furnace").await.unwrap());
        assert!(sync.running("cam1").await.unwrap());
        assert!(sync.running("nope").await.is_err());
    }

    #[tokio::test]
    async fn global_enable_uses_one_shot_coils() {
        let (mut sync, mock) = setup(&["furnace", "cam1"], "furnace").await;
        sync.set_all_enabled(true).await.unwrap();
        sync.set_all_enabled(false).await.unwrap();
        let m = mock.lock().await;
        assert_eq!(m.coil_writes(TRIG_ENABLE_ALL_COIL), 1);
        assert_eq!(m.coil_writes(TRIG_DISABLE_ALL_COIL), 1);
    }
}
