// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition orchestration
//!
//! Sequences an acquisition run across the furnace PLC, the trigger timers
//! and the external camera and metadata collaborators. The state machine is
//! `Idle -> Starting -> Acquiring -> Stopping -> Idle`.
//!
//! Ordering on start is mandatory: every camera must be armed before the
//! timers are enabled, otherwise the first trigger pulses land on cameras
//! that are not capturing yet and frames are dropped. A failing camera is
//! skipped so it cannot abort the others, but if not a single subsystem
//! arms, the timers stay off and the start fails.
//!
//! The acquisition coil on the PLC and the in-process acquiring flag are
//! only ever changed together through [`FurnaceController::set_acquisition`];
//! no path through this module can leave them disagreeing.

use async_trait::async_trait;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::daemon::{SharedBuffer, SharedSink};
use crate::error::AcquisitionError;
use crate::furnace::FurnaceController;
use crate::trigger::TriggerSynchronizer;

/// Camera subsystem contract, addressed by camera name. Implemented by the
/// external capture service adapter.
#[async_trait]
pub trait CameraControl: Send + Sync {
    fn name(&self) -> &str;
    async fn is_connected(&self) -> bool;
    async fn is_capturing(&self) -> bool;
    async fn connect(&mut self) -> anyhow::Result<()>;
    async fn end_capture(&mut self) -> anyhow::Result<()>;
    async fn capture(&mut self) -> anyhow::Result<()>;
    /// Switch between hardware-trigger and internal pacing.
    async fn set_trigger_source(&mut self, external: bool) -> anyhow::Result<()>;
    async fn set_frame_count(&mut self, frames: u64) -> anyhow::Result<()>;
    async fn stop_execute(&mut self) -> anyhow::Result<()>;
}

/// Metadata collaborator contract.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, field: &str) -> Option<Value>;
    async fn set(&mut self, field: &str, value: Value) -> anyhow::Result<()>;
    async fn flush_to_storage(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AcquisitionState {
    Idle,
    Starting,
    Acquiring,
    Stopping,
}

pub struct AcquisitionOrchestrator {
    furnace: FurnaceController,
    triggers: Arc<Mutex<TriggerSynchronizer>>,
    cameras: Vec<Box<dyn CameraControl>>,
    metadata: Box<dyn MetadataStore>,
    sink: SharedSink,
    buffer: SharedBuffer,
    campaign: String,
    acquisition_number: u32,
    state: AcquisitionState,
}

impl AcquisitionOrchestrator {
    pub fn new(
        furnace: FurnaceController,
        triggers: Arc<Mutex<TriggerSynchronizer>>,
        cameras: Vec<Box<dyn CameraControl>>,
        metadata: Box<dyn MetadataStore>,
        sink: SharedSink,
        buffer: SharedBuffer,
        campaign: impl Into<String>,
    ) -> Self {
        Self {
            furnace,
            triggers,
            cameras,
            metadata,
            sink,
            buffer,
            campaign: campaign.into(),
            acquisition_number: 0,
            state: AcquisitionState::Idle,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Campaign name with spaces replaced, suffixed with the zero-padded
    /// acquisition number.
    fn experiment_id(&self) -> String {
        format!(
            "{}_{:04}",
            self.campaign.replace(' ', "_"),
            self.acquisition_number
        )
    }

    /// Run the acquisition start sequence.
    ///
    /// Only valid from `Idle`; starting while a run is active is a warning,
    /// not an error. Transport failures surface to the caller and leave the
    /// system not acquiring.
    pub async fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.state != AcquisitionState::Idle {
            warn!("start requested while {:?}, ignoring", self.state);
            return Ok(());
        }
        self.state = AcquisitionState::Starting;

        let result = self.run_start_sequence().await;
        match &result {
            Ok(()) => self.state = AcquisitionState::Acquiring,
            Err(e) => {
                error!("acquisition start failed: {e}");
                self.state = AcquisitionState::Idle;
            }
        }
        result
    }

    async fn set_metadata(&mut self, field: &str, value: Value) -> Result<(), AcquisitionError> {
        self.metadata
            .set(field, value)
            .await
            .map_err(|e| AcquisitionError::Metadata(e.to_string()))
    }

    async fn run_start_sequence(&mut self) -> Result<(), AcquisitionError> {
        self.acquisition_number += 1;
        let experiment_id = self.experiment_id();
        info!("starting acquisition '{experiment_id}'");

        self.set_metadata("experiment_id", Value::String(experiment_id.clone()))
            .await?;
        self.set_metadata("acquisition_num", Value::from(self.acquisition_number))
            .await?;

        // Temperature profile metadata, from the last polled snapshot.
        let state = self.furnace.state().await;
        self.set_metadata("thermal_gradient_kmm", Value::from(state.gradient.wanted))
            .await?;
        self.set_metadata(
            "thermal_gradient_distance",
            Value::from(state.gradient.distance),
        )
        .await?;
        self.set_metadata("cooling_rate", Value::from(state.aspc.rate))
            .await?;
        self.set_metadata(
            "start_time",
            Value::String(chrono::Utc::now().to_rfc3339()),
        )
        .await?;

        if let Err(e) = self.sink.lock().await.retarget(&experiment_id) {
            return Err(AcquisitionError::Metadata(e.to_string()));
        }

        // Quiesce the timers while the cameras are being armed.
        {
            let mut triggers = self.triggers.lock().await;
            triggers.set_all_enabled(false).await?;
            triggers.set_preview(false).await?;
        }

        let mut armed = 0usize;
        for camera in &mut self.cameras {
            let target = {
                let triggers = self.triggers.lock().await;
                triggers.target(camera.name()).unwrap_or(0)
            };
            match arm_camera(camera.as_mut(), target).await {
                Ok(()) => armed += 1,
                Err(e) => warn!("camera '{}' failed to arm, skipping: {e}", camera.name()),
            }
        }
        if !self.cameras.is_empty() && armed == 0 {
            return Err(AcquisitionError::NoSubsystemReady);
        }

        self.furnace.set_acquisition(true).await?;
        let frame = self.furnace.state().await.counter as u64;
        self.buffer
            .lock()
            .await
            .push_event(frame, "acquisition", 1.0);

        // Enable last, after every camera is armed and the coil is set.
        self.triggers.lock().await.set_all_enabled(true).await?;
        info!("acquisition '{experiment_id}' running ({armed} cameras armed)");
        Ok(())
    }

    /// Run the acquisition stop sequence.
    ///
    /// Idempotent: stopping while `Idle` is a no-op. On a transport failure
    /// the state stays `Stopping` so a retry re-runs the sequence.
    pub async fn stop(&mut self) -> Result<(), AcquisitionError> {
        if self.state == AcquisitionState::Idle {
            return Ok(());
        }
        self.state = AcquisitionState::Stopping;

        let result = self.run_stop_sequence().await;
        match &result {
            Ok(()) => self.state = AcquisitionState::Idle,
            Err(e) => error!("acquisition stop failed: {e}"),
        }
        result
    }

    async fn run_stop_sequence(&mut self) -> Result<(), AcquisitionError> {
        self.triggers.lock().await.set_all_enabled(false).await?;

        for camera in &mut self.cameras {
            if let Err(e) = disarm_camera(camera.as_mut()).await {
                warn!("camera '{}' failed to disarm, skipping: {e}", camera.name());
            }
        }

        {
            let mut triggers = self.triggers.lock().await;
            triggers.clear_targets().await?;
            triggers.set_preview(true).await?;
        }

        let frame = self.furnace.state().await.counter as u64;
        self.furnace.set_acquisition(false).await?;
        self.buffer
            .lock()
            .await
            .push_event(frame, "acquisition", 0.0);

        self.set_metadata("stop_time", Value::String(chrono::Utc::now().to_rfc3339()))
            .await?;
        if let Err(e) = self.metadata.flush_to_storage().await {
            return Err(AcquisitionError::Metadata(e.to_string()));
        }

        // Back to the free-running preview state.
        self.triggers.lock().await.set_all_enabled(true).await?;
        info!("acquisition stopped");
        Ok(())
    }
}

/// Arm one camera: connect if needed, clear a stale capture, switch to the
/// hardware trigger, load the frame target and start capturing.
async fn arm_camera(camera: &mut dyn CameraControl, target: u64) -> anyhow::Result<()> {
    if !camera.is_connected().await {
        camera.connect().await?;
    }
    if camera.is_capturing().await {
        camera.end_capture().await?;
    }
    camera.set_trigger_source(true).await?;
    camera.set_frame_count(target).await?;
    camera.capture().await?;
    Ok(())
}

/// Return one camera to the idle preview state: end any capture, drop the
/// frame cap, re-arm and tell the capture collaborator to stop executing.
async fn disarm_camera(camera: &mut dyn CameraControl) -> anyhow::Result<()> {
    if camera.is_capturing().await {
        camera.end_capture().await?;
        camera.set_frame_count(0).await?;
        camera.capture().await?;
    }
    camera.stop_execute().await?;
    Ok(())
}
