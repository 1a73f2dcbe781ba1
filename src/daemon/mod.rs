// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Background services
//!
//! Hosts the [`runner::BackgroundTaskRunner`] that owns the register read
//! loop and the telemetry stream loop.

pub mod runner;

pub use runner::{BackgroundTaskRunner, SharedBuffer, SharedSink};
