// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Telemetry packet decoding and stream transport

pub mod decoder;
pub mod stream;

pub use decoder::{PacketDecoder, PacketLayout, PidDiagnostics, TelemetryReading};
pub use stream::TelemetryClient;
