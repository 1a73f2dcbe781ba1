// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end tests for the acquisition start/stop sequencing, driven
//! against mock PLCs and mock camera/metadata collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use furnace_control::buffer::AcquisitionBuffer;
use furnace_control::error::AcquisitionError;
use furnace_control::furnace::FurnaceController;
use furnace_control::modbus::{shared, MockTransport, SharedMock, WriteOp};
use furnace_control::orchestrator::{
    AcquisitionOrchestrator, AcquisitionState, CameraControl, MetadataStore,
};
use furnace_control::registers::{
    trigger_addresses, ACQUISITION_COIL, ASPC, GRADIENT, TRIG_DISABLE_ALL_COIL,
    TRIG_ENABLE_ALL_COIL, TRIG_PREVIEW_COIL,
};
use furnace_control::sink::{MemorySink, PersistenceSink};
use furnace_control::trigger::TriggerSynchronizer;

#[derive(Default)]
struct CameraState {
    connected: bool,
    capturing: bool,
    frame_count: u64,
    external_trigger: bool,
    stop_executes: u32,
    fail_all: bool,
    ops: Vec<String>,
}

#[derive(Clone)]
struct MockCamera {
    name: String,
    state: Arc<Mutex<CameraState>>,
}

impl MockCamera {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(CameraState::default())),
        }
    }

    fn failing(name: &str) -> Self {
        let camera = Self::new(name);
        camera.state.try_lock().unwrap().fail_all = true;
        camera
    }
}

#[async_trait]
impl CameraControl for MockCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    async fn is_capturing(&self) -> bool {
        self.state.lock().await.capturing
    }

    async fn connect(&mut self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_all {
            anyhow::bail!("camera offline");
        }
        state.connected = true;
        state.ops.push("connect".into());
        Ok(())
    }

    async fn end_capture(&mut self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.capturing = false;
        state.ops.push("end_capture".into());
        Ok(())
    }

    async fn capture(&mut self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_all {
            anyhow::bail!("camera offline");
        }
        state.capturing = true;
        state.ops.push("capture".into());
        Ok(())
    }

    async fn set_trigger_source(&mut self, external: bool) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.external_trigger = external;
        state.ops.push(format!("trigger_source:{external}"));
        Ok(())
    }

    async fn set_frame_count(&mut self, frames: u64) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.frame_count = frames;
        state.ops.push(format!("frame_count:{frames}"));
        Ok(())
    }

    async fn stop_execute(&mut self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.stop_executes += 1;
        state.ops.push("stop_execute".into());
        Ok(())
    }
}

#[derive(Default)]
struct MetadataState {
    fields: HashMap<String, Value>,
    flushes: u32,
}

#[derive(Clone, Default)]
struct MockMetadata {
    state: Arc<Mutex<MetadataState>>,
}

#[async_trait]
impl MetadataStore for MockMetadata {
    async fn get(&self, field: &str) -> Option<Value> {
        self.state.lock().await.fields.get(field).cloned()
    }

    async fn set(&mut self, field: &str, value: Value) -> anyhow::Result<()> {
        self.state.lock().await.fields.insert(field.to_string(), value);
        Ok(())
    }

    async fn flush_to_storage(&mut self) -> anyhow::Result<()> {
        self.state.lock().await.flushes += 1;
        Ok(())
    }
}

struct Rig {
    orchestrator: AcquisitionOrchestrator,
    furnace: FurnaceController,
    furnace_mock: Arc<Mutex<MockTransport>>,
    trigger_mock: Arc<Mutex<MockTransport>>,
    metadata: MockMetadata,
    sink: Arc<std::sync::Mutex<MemorySink>>,
}

/// Wire a full rig: mock furnace PLC, mock trigger PLC with two camera
/// timers at half the furnace rate, memory sink, mock collaborators.
async fn rig(cameras: Vec<MockCamera>) -> Rig {
    let (furnace_facade, furnace_mock) = SharedMock::new();
    let furnace = FurnaceController::new(shared(furnace_facade), 25.0);

    let (trigger_facade, trigger_mock) = SharedMock::new();
    let names: Vec<String> = ["furnace", "cam1", "cam2"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut triggers =
        TriggerSynchronizer::new(shared(trigger_facade), &names, "furnace").unwrap();
    triggers.set_frequency("furnace", 10.0).await.unwrap();
    triggers.set_frequency("cam1", 5.0).await.unwrap();
    triggers.set_frequency("cam2", 5.0).await.unwrap();
    triggers.set_target(1000).await.unwrap();
    // Forget setup-time writes so tests assert on sequence writes only.
    trigger_mock.lock().await.writes.clear();

    let metadata = MockMetadata::default();
    let sink = Arc::new(std::sync::Mutex::new(MemorySink::new()));
    let boxed_cameras: Vec<Box<dyn CameraControl>> = cameras
        .into_iter()
        .map(|c| Box::new(c) as Box<dyn CameraControl>)
        .collect();

    let orchestrator = AcquisitionOrchestrator::new(
        furnace.clone(),
        Arc::new(Mutex::new(triggers)),
        boxed_cameras,
        Box::new(metadata.clone()),
        Arc::new(Mutex::new(Box::new(sink.clone()) as Box<dyn PersistenceSink>)),
        Arc::new(Mutex::new(AcquisitionBuffer::new(100))),
        "my campaign",
    );
    Rig {
        orchestrator,
        furnace,
        furnace_mock,
        trigger_mock,
        metadata,
        sink,
    }
}

async fn coil_and_flag(rig: &Rig) -> (bool, bool) {
    (
        rig.furnace_mock.lock().await.coil(ACQUISITION_COIL),
        rig.furnace.is_acquiring(),
    )
}

#[tokio::test]
async fn start_arms_cameras_then_coil_then_timers() {
    let cam1 = MockCamera::new("cam1");
    let cam2 = MockCamera::new("cam2");
    let mut rig = rig(vec![cam1.clone(), cam2.clone()]).await;

    rig.orchestrator.start().await.unwrap();
    assert_eq!(rig.orchestrator.state(), AcquisitionState::Acquiring);
    assert_eq!(coil_and_flag(&rig).await, (true, true));

    // Each camera got the full arming sequence with its own scaled target.
    let state = cam1.state.lock().await;
    assert_eq!(
        state.ops,
        vec!["connect", "trigger_source:true", "frame_count:500", "capture"]
    );
    assert!(state.capturing);
    drop(state);
    assert_eq!(cam2.state.lock().await.frame_count, 500);

    // On the trigger PLC: quiesce first, enable-all strictly last.
    let writes = rig.trigger_mock.lock().await.writes.clone();
    assert_eq!(
        writes.first(),
        Some(&WriteOp::Coil(TRIG_DISABLE_ALL_COIL, true))
    );
    assert_eq!(writes.get(1), Some(&WriteOp::Coil(TRIG_PREVIEW_COIL, false)));
    assert_eq!(
        writes.last(),
        Some(&WriteOp::Coil(TRIG_ENABLE_ALL_COIL, true))
    );

    // The experiment id embeds the sanitized campaign and run number.
    assert_eq!(
        rig.metadata.get("experiment_id").await,
        Some(Value::String("my_campaign_0001".into()))
    );
    assert_eq!(
        rig.sink.lock().unwrap().retargets,
        vec!["my_campaign_0001".to_string()]
    );
}

#[tokio::test]
async fn one_failing_camera_is_skipped_but_run_proceeds() {
    let good = MockCamera::new("cam1");
    let bad = MockCamera::failing("cam2");
    let mut rig = rig(vec![good.clone(), bad.clone()]).await;

    rig.orchestrator.start().await.unwrap();
    assert_eq!(rig.orchestrator.state(), AcquisitionState::Acquiring);
    assert!(good.state.lock().await.capturing);
    assert!(!bad.state.lock().await.capturing);
}

#[tokio::test]
async fn no_camera_ready_blocks_timer_enable() {
    let bad1 = MockCamera::failing("cam1");
    let bad2 = MockCamera::failing("cam2");
    let mut rig = rig(vec![bad1, bad2]).await;

    let err = rig.orchestrator.start().await.unwrap_err();
    assert!(matches!(err, AcquisitionError::NoSubsystemReady));
    assert_eq!(rig.orchestrator.state(), AcquisitionState::Idle);
    assert_eq!(coil_and_flag(&rig).await, (false, false));
    // The timers were never re-enabled.
    assert_eq!(
        rig.trigger_mock.lock().await.coil_writes(TRIG_ENABLE_ALL_COIL),
        0
    );
}

#[tokio::test]
async fn stop_returns_to_preview_and_flushes_metadata() {
    let cam = MockCamera::new("cam1");
    let mut rig = rig(vec![cam.clone()]).await;

    rig.orchestrator.start().await.unwrap();
    rig.orchestrator.stop().await.unwrap();
    assert_eq!(rig.orchestrator.state(), AcquisitionState::Idle);
    assert_eq!(coil_and_flag(&rig).await, (false, false));

    let state = cam.state.lock().await;
    // Mid-capture camera was ended, uncapped, re-armed and stopped.
    let tail: Vec<_> = state.ops.iter().rev().take(4).rev().cloned().collect();
    assert_eq!(tail, vec!["end_capture", "frame_count:0", "capture", "stop_execute"]);
    drop(state);

    assert_eq!(rig.metadata.state.lock().await.flushes, 1);
    // Preview re-enabled, targets cleared on the trigger PLC.
    let trigger_mock = rig.trigger_mock.lock().await;
    assert!(trigger_mock.coil(TRIG_PREVIEW_COIL));
    assert_eq!(trigger_mock.float_holding(trigger_addresses(0).target_hold), 0.0);
}

#[tokio::test]
async fn run_metadata_captures_profile_and_timestamps() {
    let mut rig = rig(vec![MockCamera::new("cam1")]).await;
    {
        let mut m = rig.furnace_mock.lock().await;
        m.set_float_holding(GRADIENT.wanted_hold, 4.0);
        m.set_float_holding(GRADIENT.distance_hold, 25.0);
        m.set_float_holding(ASPC.rate_hold, 0.5);
    }
    rig.furnace.poll_registers().await.unwrap();

    rig.orchestrator.start().await.unwrap();

    assert_eq!(
        rig.metadata.get("acquisition_num").await,
        Some(Value::from(1u32))
    );
    assert_eq!(
        rig.metadata.get("thermal_gradient_kmm").await,
        Some(Value::from(4.0f32))
    );
    assert_eq!(
        rig.metadata.get("thermal_gradient_distance").await,
        Some(Value::from(25.0f32))
    );
    assert_eq!(
        rig.metadata.get("cooling_rate").await,
        Some(Value::from(0.5f32))
    );
    assert!(rig.metadata.get("start_time").await.is_some());
    assert!(rig.metadata.get("stop_time").await.is_none());

    rig.orchestrator.stop().await.unwrap();
    assert!(rig.metadata.get("stop_time").await.is_some());
    assert_eq!(rig.metadata.state.lock().await.flushes, 1);
}

#[tokio::test]
async fn stop_while_idle_is_a_no_op() {
    let mut rig = rig(vec![MockCamera::new("cam1")]).await;
    rig.trigger_mock.lock().await.writes.clear();

    rig.orchestrator.stop().await.unwrap();
    assert_eq!(rig.orchestrator.state(), AcquisitionState::Idle);
    assert!(rig.trigger_mock.lock().await.writes.is_empty());
    assert_eq!(rig.metadata.state.lock().await.flushes, 0);
}

#[tokio::test]
async fn coil_and_flag_agree_through_injected_faults() {
    let mut rig = rig(vec![MockCamera::new("cam1")]).await;

    // Fault on the acquisition coil write during start.
    rig.furnace_mock.lock().await.fail_after(1);
    assert!(rig.orchestrator.start().await.is_err());
    assert_eq!(rig.orchestrator.state(), AcquisitionState::Idle);
    assert_eq!(coil_and_flag(&rig).await, (false, false));

    // Clean start.
    rig.orchestrator.start().await.unwrap();
    assert_eq!(coil_and_flag(&rig).await, (true, true));

    // Fault during stop: the coil clear fails, both stay true together.
    rig.furnace_mock.lock().await.fail_after(1);
    assert!(rig.orchestrator.stop().await.is_err());
    assert_eq!(coil_and_flag(&rig).await, (true, true));
    assert_eq!(rig.orchestrator.state(), AcquisitionState::Stopping);

    // Retrying the stop completes the sequence.
    rig.orchestrator.stop().await.unwrap();
    assert_eq!(rig.orchestrator.state(), AcquisitionState::Idle);
    assert_eq!(coil_and_flag(&rig).await, (false, false));

    // A second run gets the next experiment id.
    rig.orchestrator.start().await.unwrap();
    assert_eq!(coil_and_flag(&rig).await, (true, true));
    assert_eq!(
        rig.metadata.get("experiment_id").await,
        Some(Value::String("my_campaign_0003".into()))
    );
}
