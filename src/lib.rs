// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Supervisory control for a laboratory furnace and camera experiment rig
//!
//! The system talks to two Modbus/TCP PLCs (furnace and trigger timers)
//! and a telemetry push socket, keeps their state mirrored in-process, and
//! sequences synchronized acquisitions across the furnace, the trigger
//! timers and external camera collaborators.
//!
//! Layering, bottom up:
//! - [`modbus`]: float/coil codec and the transport abstraction
//! - [`registers`]: the PLC address map
//! - [`telemetry`]: packet decoding and the stream client
//! - [`furnace`], [`trigger`]: per-subsystem control logic
//! - [`buffer`], [`sink`]: buffered persistence of telemetry
//! - [`daemon`]: the two background loops
//! - [`orchestrator`]: the acquisition start/stop state machine

pub mod buffer;
pub mod config;
pub mod daemon;
pub mod error;
pub mod furnace;
pub mod modbus;
pub mod orchestrator;
pub mod registers;
pub mod sink;
pub mod telemetry;
pub mod trigger;
